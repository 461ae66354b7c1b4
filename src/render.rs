use std::fmt::Write as _;

use crate::clock::sync::SynchronizedNow;
use crate::highlight::engine::{EndTimeMode, RowClassification, RowGroup};
use crate::highlight::parse::format_minutes;
use crate::schedule::model::weekday_display_name;

const CURRENT_MARKER: &str = ">>";
const NEXT_MARKER: &str = "->";
const PLAIN_MARKER: &str = "  ";

pub struct BoardContext<'a> {
    pub now: &'a SynchronizedNow,
    pub source_label: &'a str,
    pub offset: chrono::Duration,
    pub synchronized: bool,
    pub mode: EndTimeMode,
}

/// Plain-text board: clock header, then every group with its row markers.
pub fn render_board(context: &BoardContext<'_>, groups: &[RowGroup]) -> String {
    let mut out = String::new();
    let sync_note = if context.synchronized {
        format!("offset {:+}s", context.offset.num_seconds())
    } else {
        "unsynchronized".to_string()
    };
    let _ = writeln!(
        out,
        "{}  {}  [{}, {}]",
        context.now.clock_text(),
        weekday_display_name(context.now.weekday()),
        context.source_label,
        sync_note
    );

    if groups.is_empty() {
        let _ = writeln!(out, "\n(nothing to show)");
        return out;
    }

    for group in groups {
        let _ = writeln!(out, "\n{}", group.title);
        if group.rows.is_empty() {
            let _ = writeln!(out, "   (no lessons)");
            continue;
        }
        for row in &group.rows {
            let marker = match row.classification() {
                RowClassification::Current => CURRENT_MARKER,
                RowClassification::Next => NEXT_MARKER,
                RowClassification::None => PLAIN_MARKER,
            };
            if group.columns > 1 {
                let _ = writeln!(out, "{marker} [{}] {}", row.column + 1, row.label());
            } else {
                let _ = writeln!(out, "{marker} {}", row.label());
            }
        }

        let next_start = group
            .rows_with(RowClassification::Next)
            .filter_map(|row| row.window(context.mode))
            .map(|(start, _)| start)
            .min();
        if let Some(start) = next_start {
            let _ = writeln!(out, "   next at {}", format_minutes(start));
        }
    }
    out
}

/// Static board shown when the data could not be loaded.
pub fn render_error_board(message: &str) -> String {
    format!("!! schedule unavailable\n!! {message}\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::highlight::engine::{TimetableRow, classify};

    fn now() -> SynchronizedNow {
        SynchronizedNow::from_naive(
            NaiveDate::from_ymd_opt(2026, 3, 2)
                .and_then(|date| date.and_hms_opt(8, 20, 5))
                .expect("valid"),
        )
    }

    fn row(label: &str, start: &str, end: &str) -> TimetableRow {
        TimetableRow::new(
            vec![label.to_string()],
            Some(start.to_string()),
            Some(end.to_string()),
        )
    }

    #[test]
    fn board_marks_current_and_next_rows() {
        let now = now();
        let mut groups = vec![
            RowGroup::new(
                "week-monday",
                "Monday",
                vec![row("Maths", "8:00", "8:40"), row("Physics", "8:50", "9:30")],
            ),
            RowGroup::new("week-tuesday", "Tuesday", Vec::new()),
        ];
        for group in &mut groups {
            classify(now.minutes_of_day(), group, EndTimeMode::Explicit);
        }

        let board = render_board(
            &BoardContext {
                now: &now,
                source_label: "LOCAL_WALL",
                offset: chrono::Duration::seconds(90),
                synchronized: true,
                mode: EndTimeMode::Explicit,
            },
            &groups,
        );
        assert!(board.starts_with("08:20:05  Monday  [LOCAL_WALL, offset +90s]"));
        assert!(board.contains(">> Maths\n"));
        assert!(board.contains("-> Physics\n"));
        assert!(board.contains("   next at 8:50\n"));
        assert!(board.contains("Tuesday\n   (no lessons)"));
    }

    #[test]
    fn multi_column_groups_show_column_numbers() {
        let now = now();
        let group = RowGroup::from_columns(
            "consultations-today",
            "Consultations",
            vec![
                vec![row("Ivanova", "14:00", "15:00")],
                vec![row("Petrov", "14:00", "14:45")],
            ],
        );
        let board = render_board(
            &BoardContext {
                now: &now,
                source_label: "LOCAL_MONOTONIC",
                offset: chrono::Duration::zero(),
                synchronized: false,
                mode: EndTimeMode::Explicit,
            },
            &[group],
        );
        assert!(board.contains("[LOCAL_MONOTONIC, unsynchronized]"));
        assert!(board.contains("   [1] Ivanova"));
        assert!(board.contains("   [2] Petrov"));
    }

    #[test]
    fn error_board_carries_message() {
        let board = render_error_board("invalid JSON in schedule data at line 1, column 3");
        assert!(board.contains("schedule unavailable"));
        assert!(board.contains("line 1, column 3"));
    }
}
