use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photoroute_core::{Config, DetectionKind, FaceCache, PhotoRecord, PhotoRecorder};

#[derive(Parser)]
#[command(name = "photoroute", about = "Inspect photos routed by photoroutd")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List processed photos, newest first
    List {
        /// Only show one kind (none, wajah, angka, campuran, error, skipped)
        #[arg(short, long)]
        kind: Option<DetectionKind>,
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// List face identities and pending unknown sightings
    Identities,
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    match cli.command {
        Commands::List { kind, limit } => {
            let recorder = PhotoRecorder::open(&config.db_path)
                .with_context(|| format!("opening {}", config.db_path.display()))?;
            let rows = match kind {
                Some(kind) => recorder.list_by_kind(kind)?,
                None => recorder.list_all()?,
            };
            if rows.is_empty() {
                println!("No photos recorded");
            }
            for row in rows.iter().take(limit) {
                println!("{}", format_record(row));
            }
        }
        Commands::Identities => {
            let cache = match FaceCache::read(&config.cache_path) {
                Ok(cache) => cache,
                Err(e) => {
                    tracing::debug!(error = %e, "face cache unavailable");
                    println!("No face cache at {}", config.cache_path.display());
                    return Ok(());
                }
            };
            for name in &cache.names {
                match cache.unknown_counts.get(name) {
                    Some(seen) => println!("{name}  (unknown, seen {seen}x)"),
                    None => println!("{name}"),
                }
            }
            println!("{} identities", cache.names.len());
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn format_record(row: &PhotoRecord) -> String {
    format!(
        "{:>6}  {}  {:<8}  {:<7}  {}  {}",
        row.id,
        row.detected_at,
        row.kind,
        row.status,
        row.filename,
        row.path.as_deref().unwrap_or("-"),
    )
}
