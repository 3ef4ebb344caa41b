//! CLI for dlq-hero
//!
//! Every command runs against the local broker store named by `--store`
//! (or `broker.store_path` from configuration).

use std::path::PathBuf;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use dlq_hero::admin::{BulkAction, collect_stats, render_stats_table, run_bulk};
use dlq_hero::broker::{BrokerDirectory, LocalBroker, ReceiveMode};
use dlq_hero::config::{Settings, load_config};
use dlq_hero::persistence::{default_drain_file_name, latest_drain_file, list_candidate_files};
use dlq_hero::pipeline::{Target, drain_dead_letters, publish_records};
use dlq_hero::utils::{Error, logging};

#[derive(Parser)]
#[command(name = "dlq-hero", version, about = "Drain, republish and bulk-manage dead letters")]
struct Cli {
    /// Local broker store to operate on
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show active and dead-letter counts for every subscription
    Stats {
        /// Only list subscriptions that have dead letters
        #[arg(long)]
        dlq_only: bool,
    },
    /// List topics
    Topics,
    /// List the subscriptions of a topic
    Subscriptions { topic: String },
    /// Drain a subscription's dead letters into a record file
    Drain {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        subscription: String,
        /// Destination file (default: a timestamped name in the output directory)
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Mode::PeekLock)]
        mode: Mode,
    },
    /// Publish a record file onto a topic
    Publish {
        #[arg(long)]
        topic: String,
        /// Source file (default: the newest drain file for the topic)
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List record files in the output directory
    ListFiles,
    /// Resend dead letters on every subscription back to their active queue
    ResendAll,
    /// Permanently delete dead letters on every subscription
    ClearAll,
    /// Create a topic subscription in the local store
    Create {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        subscription: String,
    },
    /// Move active messages to the dead-letter queue
    DeadLetter {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        subscription: String,
        #[arg(long, default_value_t = usize::MAX)]
        max: usize,
        #[arg(long, default_value = "ManualDeadLetter")]
        reason: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Copy: messages stay on the broker
    PeekLock,
    /// Move: messages are deleted from the broker as they are received
    ReceiveAndDelete,
}

impl From<Mode> for ReceiveMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::PeekLock => ReceiveMode::PeekLock,
            Mode::ReceiveAndDelete => ReceiveMode::ReceiveAndDelete,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(&config.logging.level);

    if let Err(e) = run(cli, config).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = cli
        .store
        .unwrap_or_else(|| PathBuf::from(&config.broker.store_path));
    let broker = LocalBroker::open(&store, &config.broker)?;
    let output = PathBuf::from(&config.output.directory);

    match cli.command {
        Command::Stats { dlq_only } => {
            let rows = collect_stats(&broker, dlq_only).await?;
            print!("{}", render_stats_table(&rows));
        }
        Command::Topics => {
            for topic in broker.list_topics().await? {
                println!("{topic}");
            }
        }
        Command::Subscriptions { topic } => {
            for subscription in broker.list_subscriptions(&topic).await? {
                println!("{subscription}");
            }
        }
        Command::Drain {
            topic,
            subscription,
            file,
            mode,
        } => {
            let target = Target::new(topic, subscription);
            let mode = ReceiveMode::from(mode);
            let path = file.unwrap_or_else(|| {
                output.join(default_drain_file_name(
                    &target.topic,
                    &target.subscription,
                    &Local::now(),
                ))
            });
            let report =
                drain_dead_letters(&broker, &broker, &target, &path, mode, &config.pipeline)
                    .await?;
            println!(
                "{}: wrote {} of {} dead letters ({}) to {}",
                target,
                report.written,
                report.target,
                mode.label(),
                path.display()
            );
            if let Some(e) = report.errors.into_iter().next() {
                return Err(e.into());
            }
        }
        Command::Publish { topic, file } => {
            let path = match file {
                Some(path) => path,
                None => {
                    let pairs = known_pairs(&broker).await?;
                    latest_drain_file(&output, &topic, &pairs)
                        .await?
                        .ok_or_else(|| {
                            Error::NotFound(format!(
                                "drain file for topic '{topic}' in {} (pass --file)",
                                output.display()
                            ))
                        })?
                }
            };

            let report = publish_records(&broker, &topic, &path, &config.pipeline).await?;
            println!(
                "{}: sent {} of {} records in {} batches from {}",
                topic,
                report.sent,
                report.read,
                report.batches,
                path.display()
            );
            if let Some(e) = report.errors.into_iter().next() {
                return Err(e.into());
            }
        }
        Command::ListFiles => {
            let files = list_candidate_files(&output).await?;
            if files.is_empty() {
                info!("No record files in {}", output.display());
            }
            for file in files {
                println!("{file}");
            }
        }
        Command::ResendAll => bulk(&broker, BulkAction::Resend).await?,
        Command::ClearAll => bulk(&broker, BulkAction::Clear).await?,
        Command::Create {
            topic,
            subscription,
        } => {
            if broker.create_subscription(&topic, &subscription)? {
                println!("created {topic}/{subscription}");
            } else {
                println!("{topic}/{subscription} already exists");
            }
        }
        Command::DeadLetter {
            topic,
            subscription,
            max,
            reason,
            description,
        } => {
            let moved = broker.dead_letter(
                &topic,
                &subscription,
                max,
                &reason,
                description.as_deref(),
            )?;
            println!("dead-lettered {moved} messages on {topic}/{subscription}");
        }
    }

    Ok(())
}

async fn known_pairs(broker: &LocalBroker) -> dlq_hero::utils::Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for topic in broker.list_topics().await? {
        for subscription in broker.list_subscriptions(&topic).await? {
            pairs.push((topic.clone(), subscription));
        }
    }
    Ok(pairs)
}

async fn bulk(broker: &LocalBroker, action: BulkAction) -> Result<(), Box<dyn std::error::Error>> {
    let report = run_bulk(broker, broker, action).await?;
    println!(
        "{}: {} messages across {} subscriptions ({} skipped, {} failed)",
        action,
        report.total,
        report.processed,
        report.skipped,
        report.failures.len()
    );
    if !report.failures.is_empty() {
        return Err(format!("{} subscriptions failed to {action}", report.failures.len()).into());
    }
    Ok(())
}
