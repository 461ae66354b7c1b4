use serde::Serialize;

use crate::clock::sync::SynchronizedNow;
use crate::highlight::parse::parse_optional_time;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowClassification {
    #[default]
    None,
    Current,
    Next,
}

/// Where a row's end time comes from.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum EndTimeMode {
    /// Rows without a parseable end time are never highlighted.
    #[default]
    Explicit,
    /// Rows without a parseable end time end `default_minutes` after their start.
    FixedDuration { default_minutes: u32 },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TimetableRow {
    pub cells: Vec<String>,
    pub column: usize,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    classification: RowClassification,
}

impl TimetableRow {
    pub fn new(cells: Vec<String>, start_time: Option<String>, end_time: Option<String>) -> Self {
        Self {
            cells,
            column: 0,
            start_time,
            end_time,
            classification: RowClassification::None,
        }
    }

    pub fn in_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn classification(&self) -> RowClassification {
        self.classification
    }

    pub fn label(&self) -> String {
        self.cells.join(" | ")
    }

    /// `(start, end)` in minutes since midnight, or `None` when the row cannot
    /// take part in highlighting.
    pub fn window(&self, mode: EndTimeMode) -> Option<(u32, u32)> {
        let start = parse_optional_time(self.start_time.as_deref())?;
        let end = match (parse_optional_time(self.end_time.as_deref()), mode) {
            (Some(end), _) => end,
            (None, EndTimeMode::Explicit) => return None,
            (None, EndTimeMode::FixedDuration { default_minutes }) => start + default_minutes,
        };
        Some((start, end))
    }
}

/// Rows classified together. Groups never influence each other.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RowGroup {
    pub id: String,
    pub title: String,
    pub columns: usize,
    pub rows: Vec<TimetableRow>,
}

impl RowGroup {
    pub fn new(id: impl Into<String>, title: impl Into<String>, rows: Vec<TimetableRow>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            columns: 1,
            rows,
        }
    }

    /// One logical group rendered across several physical columns.
    pub fn from_columns(
        id: impl Into<String>,
        title: impl Into<String>,
        columns: Vec<Vec<TimetableRow>>,
    ) -> Self {
        let column_count = columns.len().max(1);
        let rows = columns
            .into_iter()
            .enumerate()
            .flat_map(|(column, rows)| rows.into_iter().map(move |row| row.in_column(column)))
            .collect();
        Self {
            id: id.into(),
            title: title.into(),
            columns: column_count,
            rows,
        }
    }

    pub fn rows_with(
        &self,
        classification: RowClassification,
    ) -> impl Iterator<Item = &TimetableRow> + '_ {
        self.rows
            .iter()
            .filter(move |row| row.classification == classification)
    }

    pub fn classifications(&self) -> Vec<RowClassification> {
        self.rows.iter().map(TimetableRow::classification).collect()
    }
}

/// Recomputes the classification of every row in `group` from scratch.
///
/// Current: `start <= now < end`. Next: every row sharing the smallest start
/// strictly after `now`.
pub fn classify(now_minutes: u32, group: &mut RowGroup, mode: EndTimeMode) {
    for row in &mut group.rows {
        row.classification = RowClassification::None;
    }

    let windows = group
        .rows
        .iter()
        .map(|row| row.window(mode))
        .collect::<Vec<_>>();
    let next_start = windows
        .iter()
        .flatten()
        .map(|(start, _)| *start)
        .filter(|start| *start > now_minutes)
        .min();

    for (row, window) in group.rows.iter_mut().zip(windows) {
        let Some((start, end)) = window else {
            continue;
        };
        if start <= now_minutes && now_minutes < end {
            row.classification = RowClassification::Current;
        } else if Some(start) == next_start {
            row.classification = RowClassification::Next;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PassSummary {
    pub groups: usize,
    pub current: usize,
    pub next: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightEngine {
    mode: EndTimeMode,
}

impl HighlightEngine {
    pub fn new(mode: EndTimeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> EndTimeMode {
        self.mode
    }

    pub fn apply(&self, now: &SynchronizedNow, groups: &mut [RowGroup]) -> PassSummary {
        let now_minutes = now.minutes_of_day();
        let mut summary = PassSummary::default();
        for group in groups.iter_mut() {
            classify(now_minutes, group, self.mode);
            summary.groups += 1;
            summary.current += group.rows_with(RowClassification::Current).count();
            summary.next += group.rows_with(RowClassification::Next).count();
        }
        summary
    }
}
