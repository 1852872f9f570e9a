//! Turkish time phrase parsing for alarms and reminders.
//!
//! A phrase is tried against an ordered chain of parse attempts; the first one
//! that produces a time wins:
//!
//! 1. `Relative`: "10 dakika sonra", "2 saat sonra"
//! 2. `AbsoluteNumeric`: "07:30", "14.20", "19 45"
//! 3. `NamedHour`: "saat 7", "saat 9 buçuk"
//! 4. `BareFallback`: "akşam 8'de", "7 buçuk" (only with a period-of-day or half-past marker)
//!
//! Non-relative results then get the PM correction ("akşam", "gece",
//! "öğleden sonra" move hours below 12 into the afternoon) and the "yarın"
//! day offset. Parsing is total: anything unrecognized yields `None`.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime, Timelike};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)\s*(dakika|dk|saat)\s*sonra").expect("valid regex")
});
static ABSOLUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,2})[.:\s]([0-9]{2})").expect("valid regex"));
static NAMED_HOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"saat\s*([0-9]{1,2})").expect("valid regex"));
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,2})").expect("valid regex"));

const PM_MARKERS: [&str; 3] = ["akşam", "gece", "öğleden sonra"];
const HALF_MARKERS: [&str; 2] = ["buçuk", "yarım"];
const TOMORROW: &str = "yarın";

/// A resolved clock time. `day_offset` counts days after today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSpec {
    pub hour: u32,
    pub minute: u32,
    pub day_offset: u32,
}

impl TimeSpec {
    pub fn new(hour: u32, minute: u32, day_offset: u32) -> Self {
        Self {
            hour,
            minute,
            day_offset,
        }
    }

    /// "HH:MM"
    pub fn clock_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

/// The individual attempts, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAttempt {
    Relative,
    AbsoluteNumeric,
    NamedHour,
    BareFallback,
}

impl ParseAttempt {
    pub const CHAIN: [ParseAttempt; 4] = [
        ParseAttempt::Relative,
        ParseAttempt::AbsoluteNumeric,
        ParseAttempt::NamedHour,
        ParseAttempt::BareFallback,
    ];
}

/// Markers found anywhere in the phrase.
#[derive(Debug, Clone, Copy)]
struct Markers {
    pm: bool,
    half: bool,
    tomorrow: bool,
}

impl Markers {
    fn scan(phrase: &str) -> Self {
        Self {
            pm: PM_MARKERS.iter().any(|m| phrase.contains(m)),
            half: HALF_MARKERS.iter().any(|m| phrase.contains(m)),
            tomorrow: phrase.contains(TOMORROW),
        }
    }
}

/// Parse a (case-folded) phrase relative to `now`.
pub fn parse(phrase: &str, now: NaiveDateTime) -> Option<TimeSpec> {
    let markers = Markers::scan(phrase);

    let (attempt, spec) = ParseAttempt::CHAIN
        .iter()
        .find_map(|&attempt| try_attempt(attempt, phrase, now, markers).map(|s| (attempt, s)))?;

    if spec.hour > 23 || spec.minute > 59 {
        debug!(
            "Rejecting out-of-range time {}:{} from {attempt:?} in '{phrase}'",
            spec.hour, spec.minute
        );
        return None;
    }

    debug!("Parsed '{phrase}' via {attempt:?} → {spec:?}");
    Some(spec)
}

fn try_attempt(
    attempt: ParseAttempt,
    phrase: &str,
    now: NaiveDateTime,
    markers: Markers,
) -> Option<TimeSpec> {
    match attempt {
        ParseAttempt::Relative => relative(phrase, now),
        ParseAttempt::AbsoluteNumeric => {
            let caps = ABSOLUTE.captures(phrase)?;
            let hour = caps[1].parse().ok()?;
            let minute = caps[2].parse().ok()?;
            Some(finish(hour, minute, markers))
        }
        ParseAttempt::NamedHour => {
            let caps = NAMED_HOUR.captures(phrase)?;
            let hour = caps[1].parse().ok()?;
            Some(finish(hour, half_minute(markers), markers))
        }
        ParseAttempt::BareFallback => {
            if !(markers.pm || markers.half) {
                return None;
            }
            let caps = BARE_NUMBER.captures(phrase)?;
            let hour = caps[1].parse().ok()?;
            Some(finish(hour, half_minute(markers), markers))
        }
    }
}

fn relative(phrase: &str, now: NaiveDateTime) -> Option<TimeSpec> {
    let caps = RELATIVE.captures(phrase)?;
    let amount: i64 = caps[1].parse().ok()?;
    let delta = if &caps[2] == "saat" {
        Duration::try_hours(amount)?
    } else {
        Duration::try_minutes(amount)?
    };
    let at = now.checked_add_signed(delta)?;
    let day_offset = (at.date() - now.date()).num_days();
    Some(TimeSpec::new(
        at.hour(),
        at.minute(),
        u32::try_from(day_offset).ok()?,
    ))
}

fn half_minute(markers: Markers) -> u32 {
    if markers.half {
        30
    } else {
        0
    }
}

fn finish(hour: u32, minute: u32, markers: Markers) -> TimeSpec {
    let hour = if markers.pm && hour < 12 { hour + 12 } else { hour };
    TimeSpec::new(hour, minute, u32::from(markers.tomorrow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn relative_minutes() {
        assert_eq!(
            parse("10 dakika sonra", at(10, 0)),
            Some(TimeSpec::new(10, 10, 0))
        );
        assert_eq!(parse("5 dk sonra uyandır", at(9, 58)), Some(TimeSpec::new(10, 3, 0)));
    }

    #[test]
    fn relative_hours_cross_midnight() {
        assert_eq!(parse("2 saat sonra", at(23, 15)), Some(TimeSpec::new(1, 15, 1)));
    }

    #[test]
    fn relative_ignores_tomorrow_marker() {
        assert_eq!(
            parse("yarın 30 dakika sonra", at(8, 0)),
            Some(TimeSpec::new(8, 30, 0))
        );
    }

    #[test]
    fn absolute_numeric_forms() {
        assert_eq!(parse("alarm kur 07:30", at(0, 0)), Some(TimeSpec::new(7, 30, 0)));
        assert_eq!(parse("14.20 için", at(0, 0)), Some(TimeSpec::new(14, 20, 0)));
        assert_eq!(parse("19 45", at(0, 0)), Some(TimeSpec::new(19, 45, 0)));
    }

    #[test]
    fn absolute_ignores_half_marker() {
        assert_eq!(parse("07:15 buçuk", at(0, 0)), Some(TimeSpec::new(7, 15, 0)));
    }

    #[test]
    fn evening_phrase() {
        assert_eq!(parse("akşam 8'de", at(11, 11)), Some(TimeSpec::new(20, 0, 0)));
        assert_eq!(parse("akşam 8'de", at(3, 0)), Some(TimeSpec::new(20, 0, 0)));
    }

    #[test]
    fn half_past_without_pm_marker() {
        assert_eq!(parse("7 buçuk", at(22, 0)), Some(TimeSpec::new(7, 30, 0)));
    }

    #[test]
    fn named_hour() {
        assert_eq!(parse("saat 9", at(0, 0)), Some(TimeSpec::new(9, 0, 0)));
        assert_eq!(parse("saat 9 buçukta", at(0, 0)), Some(TimeSpec::new(9, 30, 0)));
        assert_eq!(
            parse("öğleden sonra saat 3", at(0, 0)),
            Some(TimeSpec::new(15, 0, 0))
        );
    }

    #[test]
    fn pm_correction_keeps_afternoon_hours() {
        assert_eq!(parse("gece saat 12", at(0, 0)), Some(TimeSpec::new(12, 0, 0)));
        assert_eq!(parse("akşam 21:10", at(0, 0)), Some(TimeSpec::new(21, 10, 0)));
    }

    #[test]
    fn tomorrow_sets_day_offset() {
        assert_eq!(
            parse("yarın saat 8 toplantı", at(0, 0)),
            Some(TimeSpec::new(8, 0, 1))
        );
    }

    #[test]
    fn bare_number_needs_marker() {
        assert_eq!(parse("8 de uyandır", at(0, 0)), None);
    }

    #[test]
    fn unresolved_phrases() {
        assert_eq!(parse("alarm kur", at(0, 0)), None);
        assert_eq!(parse("", at(0, 0)), None);
        assert_eq!(parse("yarım saat sonra", at(0, 0)), None);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(parse("25:99", at(0, 0)), None);
        assert_eq!(parse("saat 24", at(0, 0)), None);
        assert_eq!(parse("23:60", at(0, 0)), None);
    }

    #[test]
    fn clock_label_pads() {
        assert_eq!(TimeSpec::new(7, 5, 0).clock_label(), "07:05");
    }
}
