/// Time normalization and display helpers.
///
/// Appointment times reach the core in several shapes: store-native
/// timestamps, already-typed instants, epoch milliseconds and free-form
/// strings. Everything is collapsed into a UTC `Instant` here; local
/// wall-clock concerns (day bounds, day keys, display) go through `Local`.

use chrono::{
    DateTime, Duration, Local, LocalResult, Locale, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use serde_json::{json, Value};
use std::sync::Mutex;

/// Timezone-aware point in time used throughout the crate.
pub type Instant = DateTime<Utc>;

/// Any of the representations a stored or submitted time may take.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    Null,
    /// Store-native timestamp.
    Timestamp { seconds: i64, nanoseconds: u32 },
    Instant(Instant),
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    Text(String),
}

impl From<&Value> for TimeValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => TimeValue::Null,
            Value::Object(map) => match map.get("seconds").and_then(Value::as_i64) {
                Some(seconds) => TimeValue::Timestamp {
                    seconds,
                    nanoseconds: map
                        .get("nanoseconds")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(0),
                },
                None => TimeValue::Null,
            },
            Value::Number(n) => match n.as_i64() {
                Some(ms) => TimeValue::Millis(ms),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| TimeValue::Millis(f.trunc() as i64))
                    .unwrap_or(TimeValue::Null),
            },
            Value::String(s) => TimeValue::Text(s.clone()),
            Value::Bool(_) | Value::Array(_) => TimeValue::Null,
        }
    }
}

impl From<Instant> for TimeValue {
    fn from(instant: Instant) -> Self {
        TimeValue::Instant(instant)
    }
}

/// Collapse a time representation into an instant.
///
/// Rules apply in order: null, store timestamp, typed instant, epoch
/// milliseconds, then general parsing. Anything unparseable yields `None`.
pub fn to_instant(value: &TimeValue) -> Option<Instant> {
    match value {
        TimeValue::Null => None,
        TimeValue::Timestamp {
            seconds,
            nanoseconds,
        } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
        TimeValue::Instant(instant) => Some(*instant),
        TimeValue::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        TimeValue::Text(text) => parse_instant(text),
    }
}

/// Normalize a raw document field.
pub fn value_to_instant(value: &Value) -> Option<Instant> {
    to_instant(&TimeValue::from(value))
}

/// Encode an instant as a store-native timestamp.
pub fn timestamp_value(instant: Instant) -> Value {
    json!({
        "seconds": instant.timestamp(),
        "nanoseconds": instant.timestamp_subsec_nanos(),
    })
}

const LOCAL_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// General date parsing.
///
/// Strings carrying an offset are taken as-is. Date-times without an offset
/// are local wall-clock times, while a bare date means UTC midnight.
pub fn parse_instant(text: &str) -> Option<Instant> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return local_to_instant(naive);
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Resolve a local wall-clock time, picking the earlier instant when the
/// time is ambiguous and skipping forward over a DST gap.
pub fn local_to_instant(naive: NaiveDateTime) -> Option<Instant> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => Local
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Instant of local midnight at the start of `date`.
pub fn start_of_local_day(date: NaiveDate) -> Instant {
    let naive = date.and_time(NaiveTime::MIN);
    local_to_instant(naive).unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Half-open `[start of today, start of tomorrow)` in local wall-clock time.
pub fn day_bounds(now: DateTime<Local>) -> (Instant, Instant) {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    (start_of_local_day(today), start_of_local_day(tomorrow))
}

/// Local calendar date of an instant.
pub fn local_date(instant: Instant) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// `YYYY-MM-DD` key of the local day an instant falls on.
pub fn local_date_key(instant: Instant) -> String {
    local_date(instant).format("%Y-%m-%d").to_string()
}

/// Resolve a locale tag such as `es-AR` or `en_US`, falling back to POSIX.
pub fn parse_locale(tag: &str) -> Locale {
    let normalized = tag.trim().replace('-', "_");
    Locale::try_from(normalized.as_str()).unwrap_or(Locale::POSIX)
}

/// Hour and minute of an instant in local time; empty for a missing time.
pub fn format_time(instant: Option<Instant>, locale: Locale) -> String {
    match instant {
        Some(instant) => instant
            .with_timezone(&Local)
            .format_localized("%H:%M", locale)
            .to_string(),
        None => String::new(),
    }
}

/// Long weekday and date, e.g. `Monday, 10 Jun 2024`.
pub fn format_day(instant: Option<Instant>, locale: Locale) -> String {
    match instant {
        Some(instant) => instant
            .with_timezone(&Local)
            .format_localized("%A, %d %b %Y", locale)
            .to_string(),
        None => String::new(),
    }
}

/// `09:00–09:30`, or just the start time when there is no end.
pub fn format_range(start: Option<Instant>, end: Option<Instant>, locale: Locale) -> String {
    if start.is_none() {
        return String::new();
    }
    let s = format_time(start, locale);
    let e = format_time(end, locale);
    if e.is_empty() {
        s
    } else {
        format!("{}\u{2013}{}", s, e)
    }
}

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_utc(&self) -> Instant {
        self.now().with_timezone(&Utc)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    /// Clock at a local wall-clock time.
    pub fn at_local(naive: NaiveDateTime) -> Self {
        let instant = local_to_instant(naive).unwrap_or_else(|| Utc.from_utc_datetime(&naive));
        Self::new(instant.with_timezone(&Local))
    }

    pub fn set(&self, now: DateTime<Local>) {
        *crate::lock(&self.now) = now;
    }

    /// Move the clock forward; a step past chrono's range leaves it as is.
    pub fn advance(&self, by: Duration) {
        let mut now = crate::lock(&self.now);
        if let Some(next) = now.checked_add_signed(by) {
            *now = next;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *crate::lock(&self.now)
    }
}
