use std::collections::BTreeSet;

use chrono::Weekday;

use crate::clock::sync::SynchronizedNow;
use crate::highlight::engine::{RowGroup, TimetableRow};
use crate::highlight::parse::parse_optional_time;
use crate::schedule::model::{
    Consultation, ConsultationSchedule, Lesson, PLACEHOLDER_SUBJECT, WeeklySchedule,
    weekday_display_name,
};

#[derive(Debug, Clone, Default)]
pub struct ScheduleData {
    pub schedule: WeeklySchedule,
    pub consultations: ConsultationSchedule,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ViewSelection {
    pub class_label: Option<String>,
    pub consultation_day: Option<Weekday>,
}

/// How long today's consultations stay on screen around their time span.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VisibilityWindow {
    pub before_start_min: u32,
    pub after_end_min: u32,
}

impl Default for VisibilityWindow {
    fn default() -> Self {
        Self {
            before_start_min: 75,
            after_end_min: 30,
        }
    }
}

/// Builds every row-group the current view shows, in display order.
///
/// Today's lessons appear twice (weekly card and focused card); each copy is
/// its own group.
pub fn build_row_groups(
    data: &ScheduleData,
    selection: &ViewSelection,
    now: &SynchronizedNow,
    window: VisibilityWindow,
) -> Vec<RowGroup> {
    let mut groups = Vec::new();
    let today = now.weekday();

    if let Some(class_label) = selection.class_label.as_deref() {
        for day in data.schedule.days_in_order() {
            groups.push(lesson_group(
                format!("week-{}", day_slug(day)),
                weekday_display_name(day).to_string(),
                data.schedule.lessons(day, class_label),
            ));
        }
        groups.push(lesson_group(
            format!("today-{}", day_slug(today)),
            format!("Today, {} ({class_label})", weekday_display_name(today)),
            data.schedule.lessons(today, class_label),
        ));
    }

    if todays_consultations_visible(data, now, window) {
        let todays_consultations = data.consultations.for_day(today);
        let split = todays_consultations.len().div_ceil(2);
        let (left, right) = todays_consultations.split_at(split);
        groups.push(RowGroup::from_columns(
            "consultations-today",
            format!("Consultations, {}", weekday_display_name(today)),
            vec![consultation_rows(left), consultation_rows(right)],
        ));
    }

    if let Some(day) = selection.consultation_day {
        groups.push(RowGroup::new(
            format!("consultations-{}", day_slug(day)),
            format!("Consultations, {}", weekday_display_name(day)),
            consultation_rows(data.consultations.for_day(day)),
        ));
    }

    groups
}

fn lesson_group(id: String, title: String, lessons: Option<&[Lesson]>) -> RowGroup {
    let lessons = lessons.unwrap_or_default();
    let rows = if lessons.iter().all(Lesson::is_placeholder) {
        Vec::new()
    } else {
        lessons.iter().map(lesson_row).collect()
    };
    RowGroup::new(id, title, rows)
}

fn lesson_row(lesson: &Lesson) -> TimetableRow {
    let cabinet = lesson
        .cabinet
        .as_deref()
        .filter(|cabinet| !cabinet.trim().is_empty())
        .unwrap_or(PLACEHOLDER_SUBJECT);
    TimetableRow::new(
        vec![
            lesson.lesson_number.to_string(),
            lesson.display_time.clone(),
            lesson.subject.clone(),
            cabinet.to_string(),
        ],
        lesson.start_time.clone(),
        lesson.end_time.clone(),
    )
}

fn consultation_rows(entries: &[Consultation]) -> Vec<TimetableRow> {
    entries
        .iter()
        .map(|entry| {
            TimetableRow::new(
                vec![entry.time.clone(), entry.teacher.clone(), entry.room.clone()],
                entry.start_time.clone(),
                entry.end_time.clone(),
            )
        })
        .collect()
}

/// Whether today's consultation list belongs on screen at `now`.
///
/// Only entries with both times define the span; without any such entry the
/// list stays visible all day.
pub fn todays_consultations_visible(
    data: &ScheduleData,
    now: &SynchronizedNow,
    window: VisibilityWindow,
) -> bool {
    let entries = data.consultations.for_day(now.weekday());
    if entries.is_empty() {
        return false;
    }

    let spans = entries
        .iter()
        .filter_map(|entry| {
            let start = parse_optional_time(entry.start_time.as_deref())?;
            let end = parse_optional_time(entry.end_time.as_deref())?;
            Some((start, end))
        })
        .collect::<Vec<_>>();
    let (Some(first_start), Some(last_end)) = (
        spans.iter().map(|(start, _)| *start).min(),
        spans.iter().map(|(_, end)| *end).max(),
    ) else {
        return true;
    };

    let from = first_start.saturating_sub(window.before_start_min) * 60;
    let until = last_end.saturating_add(window.after_end_min) * 60;
    (from..=until).contains(&now.seconds_of_day())
}

/// Grade numbers taken from the leading digits of class labels.
pub fn grades(schedule: &WeeklySchedule) -> Vec<u32> {
    let grades = schedule
        .class_labels()
        .filter_map(|label| {
            let digits = label
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            digits.parse::<u32>().ok()
        })
        .collect::<BTreeSet<_>>();
    grades.into_iter().collect()
}

pub fn classes_for_grade(schedule: &WeeklySchedule, grade: u32) -> Vec<String> {
    let prefix = format!("{grade} ");
    let classes = schedule
        .class_labels()
        .filter(|label| label.starts_with(&prefix))
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    classes.into_iter().collect()
}

fn day_slug(day: Weekday) -> String {
    weekday_display_name(day).to_lowercase()
}
