mod catalog;
mod content;
mod generator;
mod job;
mod publish;
mod settings;
mod state;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use catalog::{Catalog, FeedCatalog};
use generator::ChatGenerator;
use job::RunOptions;
use publish::DirectoryPublisher;
use settings::Settings;
use state::{SetOutcome, StateStore};

#[derive(Parser)]
#[command(name = "seo_refresh", about = "Scheduled SEO rewrite of catalog descriptions")]
struct Cli {
    /// Config file (default: ./seo_refresh.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite and publish every catalog item not yet done
    Run {
        /// Max items to rewrite this pass
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Run even if a pass already completed today
        #[arg(long)]
        force: bool,
    },
    /// Strip ld+json and n/a tech-details rows from existing descriptions
    Clean,
    /// Normalize a saved model answer and print the resulting HTML
    Normalize {
        file: PathBuf,
        /// Catalog id: also append the related items block for this product
        #[arg(long)]
        id: Option<String>,
    },
    /// Show related items for a catalog product
    Similar {
        id: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Read or write cross-run state
    State {
        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand)]
enum StateAction {
    Get { key: String },
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run { limit, force } => {
            let mut state = StateStore::from_settings(&settings.state);
            let catalog = FeedCatalog::new(&settings.catalog.feed);
            let generator = ChatGenerator::from_settings(&settings.generator)?;
            let publisher = DirectoryPublisher::new(&settings.publish.out_dir);
            let mut opts = RunOptions::from_settings(&settings, chrono::Local::now().date_naive());
            opts.limit = limit;
            opts.force = force;

            let stats =
                job::run_pass(&mut state, &catalog, &generator, &publisher, &opts).await?;
            if stats.skipped {
                println!("Already ran today. Use --force to run again.");
            } else {
                println!(
                    "Done: {} pending, {} published, {} failed.",
                    stats.pending, stats.published, stats.failed
                );
            }
            Ok(())
        }
        Commands::Clean => {
            let catalog = FeedCatalog::new(&settings.catalog.feed);
            let publisher = DirectoryPublisher::new(&settings.publish.out_dir);
            let opts = RunOptions::from_settings(&settings, chrono::Local::now().date_naive());
            let count = job::clean_pass(&catalog, &publisher, &opts).await?;
            println!("Cleaned {} descriptions.", count);
            Ok(())
        }
        Commands::Normalize { file, id } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let html = match id {
                Some(id) => {
                    let items = FeedCatalog::new(&settings.catalog.feed).items().await?;
                    let Some(item) = items.iter().find(|i| i.id == id) else {
                        bail!("No catalog item with id {}", id);
                    };
                    content::compose(&raw, item, &items, &settings.content)
                }
                None => content::prepare(&raw),
            };
            println!("{}", html);
            Ok(())
        }
        Commands::Similar { id, limit } => {
            let items = FeedCatalog::new(&settings.catalog.feed).items().await?;
            let Some(item) = items.iter().find(|i| i.id == id) else {
                bail!("No catalog item with id {}", id);
            };
            let ranked = content::similar::rank(
                item,
                &items,
                limit.unwrap_or(settings.content.max_similar),
            );
            println!("Related to {} ({}):", item.title, item.id);
            for (i, r) in ranked.iter().enumerate() {
                println!("{:>3} | {:>2} | {:<10} | {}", i + 1, r.score, r.item.id, r.item.title);
            }
            Ok(())
        }
        Commands::State { action } => {
            let mut state = StateStore::from_settings(&settings.state);
            match action {
                StateAction::Get { key } => match state.get(&key).await {
                    Some(value) => println!("{}", value),
                    None => println!("(unset)"),
                },
                StateAction::Set { key, value } => match state.set(&key, &value).await {
                    SetOutcome::Persisted => println!("{} = {}", key, value),
                    SetOutcome::Degraded => println!("{} = {} (not persisted)", key, value),
                },
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
