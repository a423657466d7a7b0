//! (De)serializes [`Duration`] as a human readable string such as `"2s"` or `"500ms"`.
//!
//! Plain integers are accepted on input and read as seconds.

use serde::{
    Deserializer, Serializer,
    de::{self, Visitor},
};
use std::{fmt, time::Duration};

/// Serializes a [`Duration`] as whole seconds when possible, otherwise as milliseconds.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    } else {
        serializer.serialize_str(&format!("{millis}ms"))
    }
}

/// Deserializes a [`Duration`] from `"<n>s"`, `"<n>ms"` or a bare number of seconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

/// Parses `"<n>s"`, `"<n>ms"` or `"<n>"` (seconds).
pub fn parse(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (digits, to_duration): (&str, fn(u64) -> Duration) =
        if let Some(millis) = value.strip_suffix("ms") {
            (millis, Duration::from_millis)
        } else if let Some(secs) = value.strip_suffix('s') {
            (secs, Duration::from_secs)
        } else {
            (value, Duration::from_secs)
        };

    digits
        .trim()
        .parse::<u64>()
        .map(to_duration)
        .map_err(|_| format!("invalid duration `{value}`, expected e.g. `2s` or `500ms`"))
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a duration such as `2s`, `500ms` or a number of seconds")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_secs)
            .map_err(|_| E::custom("duration must not be negative"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse(value).map_err(E::custom)
    }
}
