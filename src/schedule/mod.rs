//! Publish pacing
//!
//! Decides how long each item of a batch waits before it is processed.
//!
//! | Mode | Position 0 | Position n > 0 |
//! |------|-----------|----------------|
//! | `immediate` | 0 | 0 |
//! | `fixed_interval` | 0 | `interval_hours` |
//! | `daily_times` | 0 | until the next `daily_times[n]` in `timezone` |
//!
//! Positions without a daily time follow [`MissingTimePolicy`].

pub mod calculator;
pub mod error;

pub use calculator::{
    delay, next_occurrence, DelaySource, MissingTimePolicy, ScheduleConfig, ScheduleMode,
    ScheduledDelay, MAX_INTERVAL_HOURS,
};
pub use error::{ScheduleError, ScheduleResult};
