use anyhow::{Context, Result};
use std::path::PathBuf;

use autopost::config::Config;
use autopost::generator::{ContentGenerator, LlmGenerator};
use autopost::utils::webhook::WebhookClient;

/// Load and validate configuration, optionally probing the endpoints
pub async fn check_config(path: Option<PathBuf>, probe: bool) -> Result<()> {
    let config = Config::load(path.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    println!("Configuration OK");
    println!("{:-<40}", "");
    println!("Max Batch Size: {}", config.queue.max_batch_size);
    println!("Publish Mode: {}", if config.queue.make_live { "live" } else { "draft" });
    println!("Approval Timeout: {}s", config.approval.approval_timeout_secs);
    println!("Reply Timeout: {}s", config.approval.reply_timeout_secs);
    println!("Schedule: {} ({})", config.schedule.mode, config.schedule.timezone);
    println!("Generator: {} @ {}", config.generator.model, config.generator.endpoint);
    println!("Publisher: {}", config.publisher.url);
    println!("Operator Channel: {}", config.channel.kind.as_str());
    if let Some(dir) = &config.attachments.dir {
        println!("Attachments: {}", dir.display());
    }
    println!("Server: {}", config.server.bind_address);

    if probe {
        println!();
        let generator = LlmGenerator::with_config(config.generator.clone())?;
        let generator_up = generator.is_available().await;
        println!("Generator reachable: {}", if generator_up { "yes" } else { "no" });

        let publisher = WebhookClient::new(config.publisher.clone())?;
        let publisher_up = publisher.is_reachable().await;
        println!("Publisher reachable: {}", if publisher_up { "yes" } else { "no" });

        if let Some(webhook) = &config.channel.webhook {
            let bridge_up = WebhookClient::new(webhook.clone())?.is_reachable().await;
            println!("Operator bridge reachable: {}", if bridge_up { "yes" } else { "no" });
        }
    }

    Ok(())
}
