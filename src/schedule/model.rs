use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use serde::Deserialize;
use thiserror::Error;

pub const PLACEHOLDER_SUBJECT: &str = "—";

#[derive(Debug, Error)]
pub enum ScheduleLoadError {
    #[error("unable to read {kind} file {}: {source}", path.display())]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {kind} data at line {line}, column {column}: {message}")]
    InvalidJson {
        kind: &'static str,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unknown weekday '{name}' in {kind} data")]
    UnknownWeekday { kind: &'static str, name: String },
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum LessonNumber {
    Number(i64),
    Text(String),
}

impl fmt::Display for LessonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LessonNumber::Number(value) => write!(f, "{value}"),
            LessonNumber::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct Lesson {
    pub lesson_number: LessonNumber,
    #[serde(default)]
    pub display_time: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub cabinet: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl Lesson {
    pub fn is_placeholder(&self) -> bool {
        let subject = self.subject.trim();
        subject.is_empty() || subject == PLACEHOLDER_SUBJECT
    }
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
enum ClassDayFile {
    Wrapped { lessons: Vec<Lesson> },
    Bare(Vec<Lesson>),
}

#[derive(Debug, Clone, Deserialize)]
struct DayScheduleFile {
    #[serde(default)]
    portrait_view: BTreeMap<String, ClassDayFile>,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct Consultation {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub teacher: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub room: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DaySchedule {
    /// Lessons per class label.
    pub classes: BTreeMap<String, Vec<Lesson>>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct WeeklySchedule {
    pub days: HashMap<Weekday, DaySchedule>,
}

impl WeeklySchedule {
    pub fn lessons(&self, day: Weekday, class_label: &str) -> Option<&[Lesson]> {
        self.days
            .get(&day)?
            .classes
            .get(class_label)
            .map(Vec::as_slice)
    }

    /// Weekdays present in the data, Monday first.
    pub fn days_in_order(&self) -> Vec<Weekday> {
        let mut days = self.days.keys().copied().collect::<Vec<_>>();
        days.sort_by_key(Weekday::num_days_from_monday);
        days
    }

    pub fn class_labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.days
            .values()
            .flat_map(|day| day.classes.keys().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConsultationSchedule {
    pub days: HashMap<Weekday, Vec<Consultation>>,
}

impl ConsultationSchedule {
    pub fn for_day(&self, day: Weekday) -> &[Consultation] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn days_in_order(&self) -> Vec<Weekday> {
        let mut days = self
            .days
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(day, _)| *day)
            .collect::<Vec<_>>();
        days.sort_by_key(Weekday::num_days_from_monday);
        days
    }
}

pub fn load_schedule(path: &Path) -> Result<WeeklySchedule, ScheduleLoadError> {
    let content = read_data_file("schedule", path)?;
    parse_schedule_text(&content)
}

pub fn load_consultations(path: &Path) -> Result<ConsultationSchedule, ScheduleLoadError> {
    let content = read_data_file("consultations", path)?;
    parse_consultations_text(&content)
}

pub fn parse_schedule_text(content: &str) -> Result<WeeklySchedule, ScheduleLoadError> {
    let raw = parse_json::<BTreeMap<String, DayScheduleFile>>("schedule", content)?;
    let mut days = HashMap::new();
    for (name, day) in raw {
        let weekday = weekday_for("schedule", &name)?;
        let classes = day
            .portrait_view
            .into_iter()
            .map(|(label, class_day)| {
                let lessons = match class_day {
                    ClassDayFile::Wrapped { lessons } | ClassDayFile::Bare(lessons) => lessons,
                };
                (label, lessons)
            })
            .collect();
        days.insert(weekday, DaySchedule { classes });
    }
    Ok(WeeklySchedule { days })
}

pub fn parse_consultations_text(content: &str) -> Result<ConsultationSchedule, ScheduleLoadError> {
    let raw = parse_json::<BTreeMap<String, Vec<Consultation>>>("consultations", content)?;
    let mut days = HashMap::new();
    for (name, entries) in raw {
        days.insert(weekday_for("consultations", &name)?, entries);
    }
    Ok(ConsultationSchedule { days })
}

fn read_data_file(kind: &'static str, path: &Path) -> Result<String, ScheduleLoadError> {
    fs::read_to_string(path).map_err(|source| ScheduleLoadError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json<T>(kind: &'static str, content: &str) -> Result<T, ScheduleLoadError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str::<T>(content).map_err(|err| ScheduleLoadError::InvalidJson {
        kind,
        line: err.line(),
        column: err.column(),
        message: err.to_string(),
    })
}

fn weekday_for(kind: &'static str, name: &str) -> Result<Weekday, ScheduleLoadError> {
    parse_weekday_name(name).ok_or_else(|| ScheduleLoadError::UnknownWeekday {
        kind,
        name: name.to_string(),
    })
}

const WEEKDAY_NAMES: [(Weekday, &str, &str, &str); 7] = [
    (Weekday::Mon, "monday", "mon", "понедельник"),
    (Weekday::Tue, "tuesday", "tue", "вторник"),
    (Weekday::Wed, "wednesday", "wed", "среда"),
    (Weekday::Thu, "thursday", "thu", "четверг"),
    (Weekday::Fri, "friday", "fri", "пятница"),
    (Weekday::Sat, "saturday", "sat", "суббота"),
    (Weekday::Sun, "sunday", "sun", "воскресенье"),
];

/// Accepts English full or short names and Russian names, in any case.
pub fn parse_weekday_name(input: &str) -> Option<Weekday> {
    let needle = input.trim().to_lowercase();
    WEEKDAY_NAMES
        .iter()
        .find(|(_, full, short, russian)| {
            needle == *full || needle == *short || needle == *russian
        })
        .map(|(day, ..)| *day)
}

pub fn weekday_display_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
        Raw::Null(()) => String::new(),
    })
}
