//! Publish-time calculation
//!
//! Turns a schedule configuration and a batch position into the delay before
//! that item's publish attempt. The calculation is pure: "now" is passed in.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{ScheduleError, ScheduleResult};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Upper bound for a fixed interval (one year)
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// How many consecutive days are tried when a local time falls into a DST gap
const DAY_SEARCH_LIMIT: usize = 4;

// ============================================================================
// Configuration
// ============================================================================

/// Inter-item pacing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Every item is published as soon as the previous one settles
    #[default]
    Immediate,
    /// Items after the first wait a fixed number of hours
    FixedInterval,
    /// Item `n` is published at the `n`-th configured time of day
    DailyTimes,
}

impl ScheduleMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::FixedInterval => "fixed_interval",
            Self::DailyTimes => "daily_times",
        }
    }
}

impl std::fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What to do when a batch position has no configured daily time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTimePolicy {
    /// Publish immediately and log a warning
    #[default]
    Immediate,
    /// Refuse the batch (at start) or fail the calculation
    Reject,
    /// Reuse the configured times round-robin
    Cycle,
}

/// Schedule configuration supplied with each batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Pacing mode
    #[serde(default)]
    pub mode: ScheduleMode,

    /// Hours between items for [`ScheduleMode::FixedInterval`]
    #[serde(default = "default_interval_hours")]
    pub interval_hours: f64,

    /// Times of day ("HH:MM") indexed by batch position
    #[serde(default)]
    pub daily_times: Vec<String>,

    /// IANA timezone the daily times are expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Fallback for positions without a daily time
    #[serde(default)]
    pub missing_time_policy: MissingTimePolicy,
}

fn default_interval_hours() -> f64 {
    1.0
}

fn default_timezone() -> String {
    "Asia/Seoul".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Immediate,
            interval_hours: default_interval_hours(),
            daily_times: Vec::new(),
            timezone: default_timezone(),
            missing_time_policy: MissingTimePolicy::default(),
        }
    }
}

impl ScheduleConfig {
    /// Publish everything back to back
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Publish the first item now, then one every `hours`
    pub fn fixed_interval(hours: f64) -> Self {
        Self {
            mode: ScheduleMode::FixedInterval,
            interval_hours: hours,
            ..Default::default()
        }
    }

    /// Publish item `n` at `times[n]`
    pub fn daily_times<I, S>(times: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ScheduleMode::DailyTimes,
            daily_times: times.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the timezone
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Set the missing-time policy
    pub fn with_missing_time_policy(mut self, policy: MissingTimePolicy) -> Self {
        self.missing_time_policy = policy;
        self
    }

    /// Validate the configuration on its own
    pub fn validate(&self) -> ScheduleResult<()> {
        match self.mode {
            ScheduleMode::Immediate => Ok(()),
            ScheduleMode::FixedInterval => {
                if !self.interval_hours.is_finite() || self.interval_hours <= 0.0 {
                    return Err(ScheduleError::invalid_interval(
                        self.interval_hours,
                        "must be a positive number",
                    ));
                }
                if self.interval_hours > MAX_INTERVAL_HOURS {
                    return Err(ScheduleError::invalid_interval(
                        self.interval_hours,
                        format!("must not exceed {MAX_INTERVAL_HOURS} hours"),
                    ));
                }
                Ok(())
            }
            ScheduleMode::DailyTimes => {
                self.parse_timezone()?;
                self.parse_daily_times()?;
                if self.daily_times.is_empty()
                    && self.missing_time_policy == MissingTimePolicy::Cycle
                {
                    return Err(ScheduleError::NoTimes);
                }
                Ok(())
            }
        }
    }

    /// Validate the configuration against a concrete batch size
    ///
    /// Under [`MissingTimePolicy::Reject`] every position after the first must
    /// have a daily time.
    pub fn validate_for_batch(&self, len: usize) -> ScheduleResult<()> {
        self.validate()?;

        if self.mode == ScheduleMode::DailyTimes
            && self.missing_time_policy == MissingTimePolicy::Reject
            && len > 1
            && self.daily_times.len() < len
        {
            return Err(ScheduleError::MissingTime {
                position: self.daily_times.len().max(1),
                configured: self.daily_times.len(),
            });
        }

        Ok(())
    }

    /// Parse the timezone name
    pub fn parse_timezone(&self) -> ScheduleResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::invalid_timezone(&self.timezone))
    }

    /// Parse every daily time
    pub fn parse_daily_times(&self) -> ScheduleResult<Vec<NaiveTime>> {
        self.daily_times
            .iter()
            .enumerate()
            .map(|(position, value)| parse_time(position, value))
            .collect()
    }
}

fn parse_time(position: usize, value: &str) -> ScheduleResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ScheduleError::invalid_time(position, value))
}

// ============================================================================
// Calculated Delay
// ============================================================================

/// Why a delay has the value it has
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelaySource {
    /// Position 0 always publishes immediately
    FirstItem,
    /// Immediate mode
    Immediate,
    /// Fixed interval mode
    Interval,
    /// Next occurrence of a configured time of day
    DailyTime { at: DateTime<Utc> },
    /// No daily time for this position; published immediately
    MissingTimeFallback,
}

/// Result of a schedule calculation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDelay {
    /// How long to wait before processing the item
    pub delay: Duration,
    /// Which rule produced the delay
    pub source: DelaySource,
}

impl ScheduledDelay {
    fn zero(source: DelaySource) -> Self {
        Self {
            delay: Duration::ZERO,
            source,
        }
    }

    /// Delay in whole milliseconds
    pub fn as_millis(&self) -> u128 {
        self.delay.as_millis()
    }

    /// Instant the item is projected to be processed at
    pub fn publish_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match &self.source {
            DelaySource::DailyTime { at } => *at,
            _ => chrono::Duration::from_std(self.delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now),
        }
    }

    /// Whether the missing-time fallback was applied
    pub fn is_fallback(&self) -> bool {
        self.source == DelaySource::MissingTimeFallback
    }
}

// ============================================================================
// Calculation
// ============================================================================

/// Compute the delay before the item at `position` is processed
///
/// Position 0 is always immediate. The returned delay is never negative.
pub fn delay(
    config: &ScheduleConfig,
    position: usize,
    now: DateTime<Utc>,
) -> ScheduleResult<ScheduledDelay> {
    if position == 0 {
        return Ok(ScheduledDelay::zero(DelaySource::FirstItem));
    }

    match config.mode {
        ScheduleMode::Immediate => Ok(ScheduledDelay::zero(DelaySource::Immediate)),
        ScheduleMode::FixedInterval => {
            config.validate()?;
            let millis = (config.interval_hours * MILLIS_PER_HOUR).round() as u64;
            Ok(ScheduledDelay {
                delay: Duration::from_millis(millis),
                source: DelaySource::Interval,
            })
        }
        ScheduleMode::DailyTimes => daily_time_delay(config, position, now),
    }
}

fn daily_time_delay(
    config: &ScheduleConfig,
    position: usize,
    now: DateTime<Utc>,
) -> ScheduleResult<ScheduledDelay> {
    let tz = config.parse_timezone()?;
    let configured = config.daily_times.len();

    let entry = match config.daily_times.get(position) {
        Some(value) => Some((position, value)),
        None => match config.missing_time_policy {
            MissingTimePolicy::Cycle if configured > 0 => {
                let index = position % configured;
                Some((index, &config.daily_times[index]))
            }
            MissingTimePolicy::Reject | MissingTimePolicy::Cycle => {
                return Err(ScheduleError::MissingTime {
                    position,
                    configured,
                });
            }
            MissingTimePolicy::Immediate => None,
        },
    };

    let Some((index, value)) = entry else {
        tracing::warn!(
            position = position,
            configured = configured,
            "No daily time configured for position, publishing immediately"
        );
        return Ok(ScheduledDelay::zero(DelaySource::MissingTimeFallback));
    };

    let time = parse_time(index, value)?;
    let target = next_occurrence(tz, time, now)?;
    let delay = (target - now).to_std().unwrap_or(Duration::ZERO);

    Ok(ScheduledDelay {
        delay,
        source: DelaySource::DailyTime { at: target },
    })
}

/// First instant strictly after `now` at which the local clock in `tz` reads `time`
///
/// Today is tried first, then the following days. Days on which the local time
/// does not exist (DST gap) are skipped; ambiguous times take the earlier
/// instant.
pub fn next_occurrence(tz: Tz, time: NaiveTime, now: DateTime<Utc>) -> ScheduleResult<DateTime<Utc>> {
    let mut date: NaiveDate = now.with_timezone(&tz).date_naive();

    for _ in 0..DAY_SEARCH_LIMIT {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return Ok(candidate);
            }
        }

        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    Err(ScheduleError::UnresolvableTime {
        time: time.format("%H:%M").to_string(),
        tz: tz.name().to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
