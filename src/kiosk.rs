use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc, Weekday};
use log::{debug, info, trace, warn};

use crate::api::{ApiSharedState, BoardStatus, GroupSnapshot, RuntimeSnapshot};
use crate::clock::source::TimeSource;
use crate::clock::sync::{ClockSynchronizer, SynchronizedNow, TickOutcome};
use crate::highlight::engine::{
    EndTimeMode, HighlightEngine, PassSummary, RowClassification, RowGroup,
};
use crate::render::{BoardContext, render_board, render_error_board};
use crate::schedule::model::{
    ConsultationSchedule, ScheduleLoadError, load_consultations, load_schedule,
    weekday_display_name,
};
use crate::schedule::view::{
    ScheduleData, ViewSelection, VisibilityWindow, build_row_groups,
    todays_consultations_visible,
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub schedule_path: PathBuf,
    pub consultations_path: Option<PathBuf>,
    pub server_time: Option<String>,
    pub selection: ViewSelection,
    pub refresh_interval: Duration,
    pub end_time_mode: EndTimeMode,
    pub window: VisibilityWindow,
    pub max_ticks: Option<u64>,
}

pub fn load_data(config: &KioskConfig) -> Result<ScheduleData, ScheduleLoadError> {
    let schedule = load_schedule(&config.schedule_path)?;
    let consultations = match &config.consultations_path {
        Some(path) => load_consultations(path)?,
        None => ConsultationSchedule::default(),
    };
    Ok(ScheduleData {
        schedule,
        consultations,
    })
}

/// Synchronizer for `server_time`, or the local clock when it is absent or
/// cannot be used.
pub fn synchronizer_for<Tz>(
    server_time: Option<&str>,
    local_now: &DateTime<Tz>,
) -> ClockSynchronizer
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let Some(server_time) = server_time else {
        return ClockSynchronizer::unsynchronized();
    };
    match ClockSynchronizer::initialize(server_time, local_now) {
        Ok(clock) => {
            info!(
                "clock synchronized to {server_time} (offset {} ms)",
                clock.offset().num_milliseconds()
            );
            clock
        }
        Err(err) => {
            warn!("{err}; falling back to the local clock");
            ClockSynchronizer::unsynchronized()
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReloadReason {
    DayRollover { started_on: Weekday, now: SynchronizedNow },
    RefreshInterval { now: SynchronizedNow },
}

impl ReloadReason {
    pub fn now(&self) -> SynchronizedNow {
        match self {
            ReloadReason::DayRollover { now, .. } | ReloadReason::RefreshInterval { now } => *now,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StepOutcome {
    Highlighted {
        now: SynchronizedNow,
        summary: PassSummary,
        changed: bool,
    },
    Reload(ReloadReason),
    Idle,
}

/// One loaded schedule plus the clock it is shown against. Ends with a
/// reload.
pub struct KioskSession {
    data: ScheduleData,
    clock: ClockSynchronizer,
    selection: ViewSelection,
    window: VisibilityWindow,
    engine: HighlightEngine,
    refresh_interval: chrono::Duration,
    started_at: Option<DateTime<Utc>>,
    groups: Vec<RowGroup>,
    consultations_shown: Option<bool>,
    last_classes: Vec<Vec<RowClassification>>,
}

impl KioskSession {
    pub fn new(data: ScheduleData, clock: ClockSynchronizer, config: &KioskConfig) -> Self {
        let refresh_interval = chrono::Duration::from_std(config.refresh_interval)
            .unwrap_or(chrono::Duration::MAX);
        Self {
            data,
            clock,
            selection: config.selection.clone(),
            window: config.window,
            engine: HighlightEngine::new(config.end_time_mode),
            refresh_interval,
            started_at: None,
            groups: Vec::new(),
            consultations_shown: None,
            last_classes: Vec::new(),
        }
    }

    pub fn clock(&self) -> &ClockSynchronizer {
        &self.clock
    }

    pub fn groups(&self) -> &[RowGroup] {
        &self.groups
    }

    /// One 1-second tick: advance the clock, rebuild rows if the view changed,
    /// reclassify every group.
    pub fn step<Tz>(&mut self, local_now: &DateTime<Tz>) -> StepOutcome
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let now = match self.clock.tick(local_now) {
            TickOutcome::Continue(now) => now,
            TickOutcome::ReloadRequired { started_on, now } => {
                return StepOutcome::Reload(ReloadReason::DayRollover { started_on, now });
            }
            TickOutcome::Halted => return StepOutcome::Idle,
        };

        let instant = local_now.with_timezone(&Utc);
        let started_at = *self.started_at.get_or_insert(instant);
        if instant - started_at >= self.refresh_interval {
            return StepOutcome::Reload(ReloadReason::RefreshInterval { now });
        }

        let consultations_shown = todays_consultations_visible(&self.data, &now, self.window);
        let rebuilt = self.consultations_shown != Some(consultations_shown);
        if rebuilt {
            self.groups = build_row_groups(&self.data, &self.selection, &now, self.window);
            self.consultations_shown = Some(consultations_shown);
            debug!("view rebuilt with {} groups", self.groups.len());
        }

        let summary = self.engine.apply(&now, &mut self.groups);
        let classes = self
            .groups
            .iter()
            .map(RowGroup::classifications)
            .collect::<Vec<_>>();
        let changed = rebuilt || classes != self.last_classes;
        self.last_classes = classes;
        trace!("tick {} current={} next={}", now.clock_text(), summary.current, summary.next);

        StepOutcome::Highlighted {
            now,
            summary,
            changed,
        }
    }

    pub fn board(&self, now: &SynchronizedNow, source_label: &str) -> String {
        render_board(
            &BoardContext {
                now,
                source_label,
                offset: self.clock.offset(),
                synchronized: self.clock.is_synchronized(),
                mode: self.engine.mode(),
            },
            &self.groups,
        )
    }

    pub fn snapshot(&self, now: &SynchronizedNow, source_label: &str) -> RuntimeSnapshot {
        RuntimeSnapshot {
            clock_text: now.clock_text(),
            weekday: weekday_display_name(now.weekday()).to_string(),
            offset_ms: self.clock.offset().num_milliseconds(),
            synchronized: self.clock.is_synchronized(),
            source_label: source_label.to_string(),
            status: BoardStatus::Running,
            error: None,
            reload_count: 0,
            groups: self.groups.iter().map(GroupSnapshot::from_group).collect(),
            updated_unix_ms: Local::now().timestamp_millis(),
        }
    }
}

fn publish(
    api: Option<&Arc<Mutex<ApiSharedState>>>,
    update: impl FnOnce(&mut RuntimeSnapshot),
) {
    let Some(api) = api else {
        return;
    };
    match api.lock() {
        Ok(mut guard) => update(&mut guard.runtime),
        Err(_) => warn!("api state lock poisoned; snapshot not published"),
    }
}

fn fail_with_error_board(
    err: ScheduleLoadError,
    api: Option<&Arc<Mutex<ApiSharedState>>>,
) -> anyhow::Error {
    let message = err.to_string();
    print!("{}", render_error_board(&message));
    publish(api, |runtime| {
        runtime.status = BoardStatus::Error;
        runtime.error = Some(message.clone());
        runtime.groups.clear();
        runtime.updated_unix_ms = Local::now().timestamp_millis();
    });
    anyhow::Error::new(err).context("failed to load schedule data")
}

/// Renders a single board as it looks at the synchronized `at` time and
/// returns without starting the loop.
pub fn render_once(config: &KioskConfig, at: &str, source: &dyn TimeSource) -> Result<String> {
    let data = load_data(config).map_err(|err| fail_with_error_board(err, None))?;
    let local_now = source.now()?;
    let clock = ClockSynchronizer::initialize(at, &local_now)
        .with_context(|| format!("invalid --at time '{at}'"))?;
    let mut session = KioskSession::new(data, clock, config);
    match session.step(&local_now) {
        StepOutcome::Highlighted { now, .. } => Ok(session.board(&now, source.label())),
        other => anyhow::bail!("unexpected first tick outcome {other:?}"),
    }
}

/// Runs sessions back to back until `max_ticks` is reached or the data can no
/// longer be loaded.
pub fn run(
    config: &KioskConfig,
    source: &dyn TimeSource,
    api: Option<Arc<Mutex<ApiSharedState>>>,
) -> Result<()> {
    let api = api.as_ref();
    let mut carried_clock: Option<ClockSynchronizer> = None;
    let mut reload_count = 0_u64;
    let mut ticks = 0_u64;

    loop {
        let data = load_data(config).map_err(|err| fail_with_error_board(err, api))?;
        let clock = match carried_clock.take() {
            Some(clock) => clock,
            None => synchronizer_for(config.server_time.as_deref(), &source.now()?),
        };
        let mut session = KioskSession::new(data, clock, config);
        info!(
            "session started (reloads so far: {reload_count}, source {})",
            source.label()
        );

        let mut next_tick = Instant::now();
        let reason = loop {
            match session.step(&source.now()?) {
                StepOutcome::Highlighted {
                    now,
                    summary,
                    changed,
                } => {
                    if changed {
                        info!(
                            "highlight changed at {}: {} current, {} next across {} groups",
                            now.clock_text(),
                            summary.current,
                            summary.next,
                            summary.groups
                        );
                        debug!("{} groups on screen", session.groups().len());
                        print!("{}", session.board(&now, source.label()));
                    }
                    let mut snapshot = session.snapshot(&now, source.label());
                    snapshot.reload_count = reload_count;
                    publish(api, |runtime| *runtime = snapshot);
                }
                StepOutcome::Reload(reason) => break reason,
                StepOutcome::Idle => {}
            }

            ticks += 1;
            if config.max_ticks.is_some_and(|max| ticks >= max) {
                info!("stopping after {ticks} ticks");
                return Ok(());
            }
            next_tick = next_deadline(next_tick, Instant::now());
            sleep_until(next_tick);
        };

        match reason {
            ReloadReason::DayRollover { started_on, now } => info!(
                "day changed from {} to {}; reloading",
                weekday_display_name(started_on),
                weekday_display_name(now.weekday())
            ),
            ReloadReason::RefreshInterval { .. } => info!(
                "refresh interval elapsed at {}; reloading",
                reason.now().clock_text()
            ),
        }
        publish(api, |runtime| runtime.status = BoardStatus::Reloading);

        carried_clock = Some(session.clock().resumed());
        reload_count += 1;
    }
}

/// Next tick deadline; after a stall the schedule restarts from `now` instead
/// of replaying the missed ticks.
fn next_deadline(previous: Instant, now: Instant) -> Instant {
    (previous + TICK_INTERVAL).max(now)
}

pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }
    std::thread::sleep(deadline.saturating_duration_since(now));
}
