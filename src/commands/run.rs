use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use autopost::config::{ChannelKind, Config};
use autopost::queue::QueueEvent;
use autopost::schedule::{ScheduleConfig, ScheduleMode};
use autopost::utils::format_duration;

use super::Components;

/// Parameters for a one-shot batch
pub struct RunParams {
    pub config: Option<PathBuf>,
    pub items: Vec<String>,
    pub items_file: Option<PathBuf>,
    pub interval_hours: Option<f64>,
    pub daily_times: Vec<String>,
    pub timezone: Option<String>,
    pub approve: bool,
    pub live: bool,
}

/// Run one batch with console approval
///
/// Exits when the batch completes; Ctrl-C cancels it.
pub async fn run(params: RunParams) -> Result<()> {
    let mut config = Config::load(params.config.as_deref()).context("Failed to load configuration")?;
    if params.live {
        config.queue.make_live = true;
    }

    let mut items = params.items;
    if let Some(path) = &params.items_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read items file: {}", path.display()))?;
        items.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    let schedule = build_schedule(&config.schedule, &params.daily_times, params.interval_hours, params.timezone);

    let components = Components::build(&config, ChannelKind::Console)?;
    components.attach_console_input();

    let queue = components.queue.clone();
    let mut events = queue.subscribe();

    let ack = queue
        .start(items, schedule.clone(), params.approve)
        .await
        .context("Batch rejected")?;

    println!("Batch {} started: {} items ({})", ack.run_id, ack.total, schedule.mode);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                match queue.cancel().await {
                    Ok(cancelled) => println!("Cancelled after {} items", cancelled.processed),
                    Err(e) => tracing::warn!(error = %e, "Cancel failed"),
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if event.is_final() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    println!();
    println!("{}", queue.status().await.display());
    Ok(())
}

fn build_schedule(
    defaults: &ScheduleConfig,
    daily_times: &[String],
    interval_hours: Option<f64>,
    timezone: Option<String>,
) -> ScheduleConfig {
    let mut schedule = if !daily_times.is_empty() {
        ScheduleConfig {
            mode: ScheduleMode::DailyTimes,
            daily_times: daily_times.to_vec(),
            ..defaults.clone()
        }
    } else if let Some(hours) = interval_hours {
        ScheduleConfig {
            mode: ScheduleMode::FixedInterval,
            interval_hours: hours,
            ..defaults.clone()
        }
    } else {
        defaults.clone()
    };

    if let Some(tz) = timezone {
        schedule = schedule.with_timezone(tz);
    }
    schedule
}

fn print_event(event: &QueueEvent) {
    match event {
        QueueEvent::Waiting {
            cursor,
            total,
            item,
            publish_at,
            delay_ms,
            ..
        } => {
            if *delay_ms > 0 {
                println!(
                    "[{}/{}] '{}' scheduled at {} (in {})",
                    cursor + 1,
                    total,
                    item,
                    publish_at.to_rfc3339(),
                    format_duration(std::time::Duration::from_millis(*delay_ms))
                );
            }
        }
        QueueEvent::Processing { cursor, total, item, .. } => {
            println!("[{}/{}] Processing '{}'", cursor + 1, total, item);
        }
        QueueEvent::ItemSettled { cursor, total, result, .. } => {
            println!("[{}/{}] {}", cursor + 1, total, result.outcome.label());
        }
        QueueEvent::Completed { processed, total, .. } => {
            println!("Batch completed: {processed}/{total}");
        }
        QueueEvent::Cancelled { processed, total, .. } => {
            println!("Batch cancelled: {processed}/{total}");
        }
    }
}
