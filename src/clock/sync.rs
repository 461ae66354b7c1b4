use chrono::{
    DateTime, Datelike, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Weekday,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ClockInitError {
    #[error("invalid server time '{input}', expected H:MM:SS")]
    Malformed { input: String },
    #[error("server time '{input}' is out of range")]
    OutOfRange { input: String },
    #[error("server time '{input}' does not exist today in the local timezone")]
    NonexistentLocalTime { input: String },
}

/// Local time corrected by the server offset, as seen by one tick.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SynchronizedNow {
    at: NaiveDateTime,
}

impl SynchronizedNow {
    pub fn from_naive(at: NaiveDateTime) -> Self {
        Self { at }
    }

    pub fn weekday(&self) -> Weekday {
        self.at.weekday()
    }

    pub fn hour(&self) -> u32 {
        self.at.hour()
    }

    pub fn minute(&self) -> u32 {
        self.at.minute()
    }

    pub fn second(&self) -> u32 {
        self.at.second()
    }

    /// Minutes since midnight; seconds are dropped.
    pub fn minutes_of_day(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }

    pub fn seconds_of_day(&self) -> u32 {
        self.minutes_of_day() * 60 + self.second()
    }

    pub fn clock_text(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TickOutcome {
    Continue(SynchronizedNow),
    /// The corrected date moved to another weekday since the first tick.
    /// Returned once; the schedule on display is stale.
    ReloadRequired {
        started_on: Weekday,
        now: SynchronizedNow,
    },
    /// A reload was already requested and nothing further is produced.
    Halted,
}

#[derive(Debug, Clone)]
pub struct ClockSynchronizer {
    synchronized: bool,
    offset: chrono::Duration,
    first_weekday: Option<Weekday>,
    reload_requested: bool,
}

impl ClockSynchronizer {
    /// Computes the offset between the server's time-of-day, placed on the
    /// local date of `local_now`, and `local_now` itself.
    pub fn initialize<Tz>(
        server_time_of_day: &str,
        local_now: &DateTime<Tz>,
    ) -> Result<Self, ClockInitError>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let server_time = parse_server_time(server_time_of_day)?;
        let naive = local_now.date_naive().and_time(server_time);
        let server_at = resolve_local_datetime(&local_now.timezone(), naive).ok_or_else(|| {
            ClockInitError::NonexistentLocalTime {
                input: server_time_of_day.to_string(),
            }
        })?;

        Ok(Self {
            synchronized: true,
            offset: server_at - *local_now,
            first_weekday: None,
            reload_requested: false,
        })
    }

    pub fn unsynchronized() -> Self {
        Self {
            synchronized: false,
            offset: chrono::Duration::zero(),
            first_weekday: None,
            reload_requested: false,
        }
    }

    /// Synchronized clock with a known offset, e.g. one carried over from a
    /// previous session.
    pub fn with_offset(offset: chrono::Duration) -> Self {
        Self {
            synchronized: true,
            offset,
            first_weekday: None,
            reload_requested: false,
        }
    }

    /// Fresh tick state for the next session, keeping the offset.
    pub fn resumed(&self) -> Self {
        if self.synchronized {
            Self::with_offset(self.offset)
        } else {
            Self::unsynchronized()
        }
    }

    pub fn offset(&self) -> chrono::Duration {
        self.offset
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Corrected time for `local_now` without advancing tick state.
    pub fn corrected_now<Tz>(&self, local_now: &DateTime<Tz>) -> SynchronizedNow
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        SynchronizedNow::from_naive((*local_now + self.offset).naive_local())
    }

    pub fn tick<Tz>(&mut self, local_now: &DateTime<Tz>) -> TickOutcome
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        if self.reload_requested {
            return TickOutcome::Halted;
        }

        let now = self.corrected_now(local_now);
        match self.first_weekday {
            None => self.first_weekday = Some(now.weekday()),
            Some(started_on) if started_on != now.weekday() => {
                self.reload_requested = true;
                return TickOutcome::ReloadRequired { started_on, now };
            }
            Some(_) => {}
        }
        TickOutcome::Continue(now)
    }
}

pub fn parse_server_time(input: &str) -> Result<NaiveTime, ClockInitError> {
    let malformed = || ClockInitError::Malformed {
        input: input.to_string(),
    };

    let parts = input.trim().split(':').collect::<Vec<_>>();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let mut values = [0_u32; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(malformed());
        }
        *slot = part.parse().map_err(|_| malformed())?;
    }

    NaiveTime::from_hms_opt(values[0], values[1], values[2]).ok_or_else(|| {
        ClockInitError::OutOfRange {
            input: input.to_string(),
        }
    })
}

fn resolve_local_datetime<Tz>(timezone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, _second) => Some(first),
        LocalResult::None => None,
    }
}
