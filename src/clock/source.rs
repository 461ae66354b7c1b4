use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeSourceKind {
    Monotonic,
    Wall,
}

/// Local clock readings fed into the synchronizer on every tick.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Result<DateTime<Local>>;
    fn label(&self) -> &'static str;
}

pub struct SelectedTimeSource {
    pub source: Box<dyn TimeSource>,
    pub label: &'static str,
}

pub fn select_source(kind: TimeSourceKind) -> SelectedTimeSource {
    match kind {
        TimeSourceKind::Monotonic => SelectedTimeSource {
            source: Box::new(MonotonicTimeSource::new()),
            label: MONOTONIC_LABEL,
        },
        TimeSourceKind::Wall => SelectedTimeSource {
            source: Box::new(WallTimeSource),
            label: WALL_LABEL,
        },
    }
}

const MONOTONIC_LABEL: &str = "LOCAL_MONOTONIC";
const WALL_LABEL: &str = "LOCAL_WALL";

/// Reads the wall clock directly. Follows any adjustment made to the system
/// clock, including backwards steps.
pub struct WallTimeSource;

impl TimeSource for WallTimeSource {
    fn now(&self) -> Result<DateTime<Local>> {
        Ok(Local::now())
    }

    fn label(&self) -> &'static str {
        WALL_LABEL
    }
}

/// Wall clock anchored once, then advanced by the monotonic clock.
///
/// System clock steps after startup do not leak into the ticks, and readings
/// never go backwards.
pub struct MonotonicTimeSource {
    wall_anchor: DateTime<Local>,
    monotonic_anchor: Instant,
    last_output: Mutex<DateTime<Local>>,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        let wall_anchor = Local::now();
        Self {
            wall_anchor,
            monotonic_anchor: Instant::now(),
            last_output: Mutex::new(wall_anchor),
        }
    }

    fn clamp_output_monotonic(&self, proposed: DateTime<Local>) -> Result<DateTime<Local>> {
        let mut guard = self
            .last_output
            .lock()
            .map_err(|_| anyhow!("failed to lock monotonic time source state"))?;
        if proposed < *guard {
            return Ok(*guard);
        }
        *guard = proposed;
        Ok(proposed)
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Result<DateTime<Local>> {
        let elapsed = chrono::Duration::from_std(self.monotonic_anchor.elapsed())
            .map_err(|err| anyhow!("monotonic elapsed time out of range: {err}"))?;
        let proposed = self
            .wall_anchor
            .checked_add_signed(elapsed)
            .ok_or_else(|| anyhow!("monotonic time source overflowed"))?;
        self.clamp_output_monotonic(proposed)
    }

    fn label(&self) -> &'static str {
        MONOTONIC_LABEL
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn monotonic_source_never_goes_backwards() {
        let source = MonotonicTimeSource::new();
        let first = source.now().expect("first sample");
        thread::sleep(Duration::from_millis(2));
        let second = source.now().expect("second sample");
        assert!(second >= first);
    }

    #[test]
    fn monotonic_source_starts_near_wall_clock() {
        let source = MonotonicTimeSource::new();
        let sample = source.now().expect("sample");
        let drift = (Local::now() - sample).num_seconds().abs();
        assert!(drift <= 1);
    }

    #[test]
    fn selected_source_reports_its_label() {
        let selected = select_source(TimeSourceKind::Wall);
        assert_eq!(selected.label, "LOCAL_WALL");
        assert_eq!(selected.source.label(), selected.label);

        let selected = select_source(TimeSourceKind::Monotonic);
        assert_eq!(selected.source.label(), "LOCAL_MONOTONIC");
    }
}
