use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Unit suffix accepted in delay and spacing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ms" => Some(TimeUnit::Milliseconds),
            "s" => Some(TimeUnit::Seconds),
            "m" => Some(TimeUnit::Minutes),
            "h" => Some(TimeUnit::Hours),
            _ => None,
        }
    }

    pub fn to_millis(&self, value: u64) -> u64 {
        let factor = match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        };
        value.saturating_mul(factor)
    }

    pub fn to_duration(&self, value: u64) -> Duration {
        Duration::from_millis(self.to_millis(value))
    }

    /// Splits `"200ms"`, `"5s"`, `"2m"` or `"1h"` into value and unit.
    ///
    /// Suffixes are lowercase and follow the digits with no space.
    pub fn parse_duration(s: &str) -> Option<(u64, TimeUnit)> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit())?;
        if split == 0 {
            return None;
        }
        let (digits, suffix) = s.split_at(split);
        let value = digits.parse::<u64>().ok()?;
        Some((value, Self::from_suffix(suffix)?))
    }
}

/// Parses a delay: a bare integer is milliseconds, otherwise a suffixed
/// shorthand accepted by [`TimeUnit::parse_duration`].
pub fn parse_delay(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(millis) = s.parse::<u64>() {
        return Some(Duration::from_millis(millis));
    }
    TimeUnit::parse_duration(s).map(|(value, unit)| unit.to_duration(value))
}

/// Serde adapter for delay parameters given as milliseconds or shorthand.
pub fn deserialize_delay<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(millis) => Ok(Duration::from_millis(millis)),
        Raw::Text(text) => parse_delay(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid delay `{text}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand() {
        assert_eq!(TimeUnit::parse_duration("200ms"), Some((200, TimeUnit::Milliseconds)));
        assert_eq!(TimeUnit::parse_duration("5s"), Some((5, TimeUnit::Seconds)));
        assert_eq!(TimeUnit::parse_duration(" 2m "), Some((2, TimeUnit::Minutes)));
        assert_eq!(TimeUnit::parse_duration("1h"), Some((1, TimeUnit::Hours)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(TimeUnit::parse_duration("ms"), None);
        assert_eq!(TimeUnit::parse_duration("200"), None);
        assert_eq!(TimeUnit::parse_duration("5S"), None);
        assert_eq!(TimeUnit::parse_duration("5 s"), None);
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("50"), Some(Duration::from_millis(50)));
        assert_eq!(parse_delay("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_delay("soon"), None);
    }

    #[test]
    fn test_to_millis_saturates() {
        assert_eq!(TimeUnit::Hours.to_millis(u64::MAX), u64::MAX);
        assert_eq!(TimeUnit::Minutes.to_millis(2), 120_000);
    }
}
