//! Error types for the schedule module

use thiserror::Error;

/// Result type for schedule operations
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Schedule configuration and calculation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    /// Interval is not a positive, finite number of hours
    #[error("Invalid interval '{hours}' hours: {reason}")]
    InvalidInterval { hours: f64, reason: String },

    /// A daily time entry is not in HH:MM form
    #[error("Invalid daily time '{value}' at position {position}. Expected HH:MM")]
    InvalidTime { position: usize, value: String },

    /// Timezone name is not a known IANA zone
    #[error("Invalid timezone: {tz}")]
    InvalidTimezone { tz: String },

    /// No daily time is configured for a batch position
    #[error("No daily time configured for position {position} ({configured} configured)")]
    MissingTime { position: usize, configured: usize },

    /// The daily-time schedule has no entries at all
    #[error("Daily-times schedule requires at least one time")]
    NoTimes,

    /// A local time could not be mapped to an instant on any nearby day
    #[error("Cannot resolve local time {time} in {tz}")]
    UnresolvableTime { time: String, tz: String },
}

impl ScheduleError {
    /// Create an invalid interval error
    pub fn invalid_interval(hours: f64, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            hours,
            reason: reason.into(),
        }
    }

    /// Create an invalid time error
    pub fn invalid_time(position: usize, value: impl Into<String>) -> Self {
        Self::InvalidTime {
            position,
            value: value.into(),
        }
    }

    /// Create an invalid timezone error
    pub fn invalid_timezone(tz: impl Into<String>) -> Self {
        Self::InvalidTimezone { tz: tz.into() }
    }

    /// Schedule errors are configuration problems; retrying does not help
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_time_message() {
        let err = ScheduleError::invalid_time(2, "25:99");
        assert!(err.to_string().contains("25:99"));
        assert!(err.to_string().contains("HH:MM"));
    }

    #[test]
    fn test_missing_time_message() {
        let err = ScheduleError::MissingTime {
            position: 4,
            configured: 2,
        };
        assert!(err.to_string().contains("position 4"));
        assert!(!err.is_recoverable());
    }
}
