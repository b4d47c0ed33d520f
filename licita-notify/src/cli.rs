use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use licita_notify::config::EngineConfig;
use licita_notify::logging::init_logging;
use licita_notify::rules::evaluate;
use licita_notify::NotificationEngine;

#[derive(Debug, Parser)]
#[command(author, version, about = "Rule-driven notification engine for procurement alerts", long_about = None)]
pub struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true, env = "LICITA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dispatcher until Ctrl-C.
    Run,

    /// Fire one event through the rule set.
    Trigger {
        /// Event name, e.g. `opportunity.created`.
        #[arg(short, long)]
        event: String,

        /// Event payload as a JSON object.
        #[arg(short, long, default_value = "{}")]
        data: String,

        /// User the event concerns.
        #[arg(short, long)]
        user: Option<String>,

        /// Dispatch until the queue is idle, then print stats.
        #[arg(long)]
        drain: bool,

        /// Upper bound for `--drain`, in seconds.
        #[arg(long, default_value_t = 60)]
        drain_timeout: u64,

        /// Only report which rules would match.
        #[arg(long, conflicts_with = "drain")]
        dry_run: bool,
    },

    /// Validate the configuration and exit.
    Check,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Check => {
            config.validate()?;
            NotificationEngine::builder(config.clone()).build()?;
            println!(
                "Configuration OK: {} rules, {} templates, {} contacts",
                config.rules.len(),
                config.templates.len(),
                config.contacts.len()
            );
            Ok(())
        }
        Command::Run => {
            let (logging, _guard) = init_logging(&config.logging)?;
            let cancel = CancellationToken::new();
            logging.start_retention_cleanup(cancel.clone());

            let engine = NotificationEngine::builder(config).build()?;
            engine.start();

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");

            engine.stop().await;
            cancel.cancel();
            let stats = engine.queue().get_queue_stats().await?;
            info!(?stats, "Final queue state");
            Ok(())
        }
        Command::Trigger {
            event,
            data,
            user,
            drain,
            drain_timeout,
            dry_run,
        } => {
            let (_logging, _guard) = init_logging(&config.logging)?;
            let data: Value = serde_json::from_str(&data).context("--data is not valid JSON")?;
            let engine = NotificationEngine::builder(config).build()?;

            if dry_run {
                let matches: Vec<Value> = engine
                    .rules()
                    .list_rules()
                    .into_iter()
                    .filter(|rule| rule.enabled && rule.event == event)
                    .map(|rule| {
                        json!({
                            "rule_id": rule.id,
                            "matches": evaluate(&rule.conditions, &data),
                            "channels": rule.channels,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "event": event, "rules": matches }))?);
                return Ok(());
            }

            let outcome = engine.trigger_event(&event, &data, user.as_deref()).await;
            let stats = if drain {
                engine.drain(Duration::from_secs(drain_timeout)).await?
            } else {
                engine.queue().get_queue_stats().await?
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "outcome": outcome, "stats": stats }))?
            );
            Ok(())
        }
    }
}
