use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scirag_cli::{ingest_jsonl, serve, ApiClient, AppState};
use scirag_core::config::Config;

#[derive(Parser)]
#[command(name = "scirag")]
#[command(about = "Retrieval and streamed, cited answers over a textbook corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ranked chunks for a query, from a running service
    Search(QueryArgs),

    /// Stream a cited answer from a running service
    Ask(QueryArgs),

    /// Import chunks from a JSONL file into the configured store
    Ingest {
        file: PathBuf,
    },
}

#[derive(Args)]
struct QueryArgs {
    text: String,

    #[arg(long)]
    top_k: Option<usize>,

    /// Service base URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Print raw JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { bind } => {
            let mut settings = Config::load()?.settings()?;
            if let Some(bind) = bind { settings.server.bind = bind; }
            serve(AppState::from_settings(settings).await?).await?;
        }
        Commands::Search(args) => {
            let hits = ApiClient::new(&args.url).search(&args.text, args.top_k).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    let preview: String = hit.body.chars().take(160).collect();
                    println!("{}. [{:.3}] {} / {} #{} (id={})", i + 1, hit.score, hit.book_title, hit.section, hit.chunk_idx, hit.id);
                    println!("   {}", preview.replace('\n', " "));
                }
            }
        }
        Commands::Ask(args) => {
            let mut stdout = std::io::stdout();
            let sources = ApiClient::new(&args.url)
                .ask(&args.text, args.top_k, |delta| {
                    if args.json { return Ok(()); }
                    write!(stdout, "{delta}").and_then(|()| stdout.flush()).map_err(|e| {
                        tracing::debug!(error = %e, "stdout closed while streaming the answer");
                        anyhow::Error::new(e).context("writing answer to stdout")
                    })
                })
                .await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                println!();
                if !sources.is_empty() { println!("\nSources:"); }
                for s in &sources {
                    println!("  [{}] {} / {} #{} (id={})", s.citation, s.book_title, s.section, s.chunk_idx, s.id);
                }
            }
        }
        Commands::Ingest { file } => {
            let settings = Config::load()?.settings()?;
            let state = AppState::from_settings(settings).await?;
            let report = ingest_jsonl(&state.ingestor, &file).await?;
            println!("Inserted {} chunks ({} duplicates skipped) from {}", report.inserted, report.duplicates, file.display());
        }
    }
    Ok(())
}
