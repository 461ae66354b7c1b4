use std::sync::LazyLock;

use regex::Regex;

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[.:](\d{2})").expect("time pattern is valid"));

/// Minutes since midnight of the first `H:MM` / `H.MM` found anywhere in
/// `input`. Hours and minutes are not range checked.
pub fn parse_time_to_minutes(input: &str) -> Option<u32> {
    let captures = TIME_PATTERN.captures(input)?;
    let hours = captures.get(1)?.as_str().parse::<u32>().ok()?;
    let minutes = captures.get(2)?.as_str().parse::<u32>().ok()?;
    Some(hours * 60 + minutes)
}

pub fn parse_optional_time(input: Option<&str>) -> Option<u32> {
    input.and_then(parse_time_to_minutes)
}

pub fn format_minutes(minutes: u32) -> String {
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_and_dot_separators() {
        assert_eq!(parse_time_to_minutes("8:05"), Some(485));
        assert_eq!(parse_time_to_minutes("08.05"), Some(485));
        assert_eq!(parse_time_to_minutes("23:59"), Some(1439));
        assert_eq!(parse_time_to_minutes("0:00"), Some(0));
    }

    #[test]
    fn unparseable_inputs_yield_none() {
        assert_eq!(parse_time_to_minutes("abc"), None);
        assert_eq!(parse_time_to_minutes(""), None);
        assert_eq!(parse_time_to_minutes("8:5"), None);
        assert_eq!(parse_time_to_minutes("8-05"), None);
        assert_eq!(parse_optional_time(None), None);
    }

    #[test]
    fn finds_the_first_time_inside_surrounding_text() {
        assert_eq!(parse_time_to_minutes("from 9:15 to 9:55"), Some(555));
        assert_eq!(parse_time_to_minutes("8:30-9:10"), Some(510));
        assert_eq!(parse_optional_time(Some(" 14.15 ")), Some(855));
    }

    #[test]
    fn formats_minutes_without_hour_padding() {
        assert_eq!(format_minutes(485), "8:05");
        assert_eq!(format_minutes(1439), "23:59");
    }
}
