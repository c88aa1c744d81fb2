use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lexdb_core::config::{expand_path, Config};
use lexdb_core::error::Error;
use lexdb_rag::{AnswerStatus, LegalRag};

/// Index legal acts and answer questions grounded in their sections.
#[derive(Parser, Debug)]
#[command(name = "lexdb", version, about)]
struct Cli {
    /// Collection to index into and query (overrides `data.collection`).
    #[arg(short, long, global = true, env = "LEXDB_COLLECTION")]
    collection: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed and store every structured file in FOLDER.
    Index {
        /// Defaults to `data.folder`.
        folder: Option<PathBuf>,
    },
    /// Answer a question from the indexed acts.
    Ask {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Show the closest sections without generating an answer.
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Print every section of an act, in section order.
    Show { title: String },
    /// List act titles found in the metadata folder.
    Titles,
    /// Entry count and layout of the collection.
    Stats,
    /// Drop the collection.
    Reset,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut cfg = Config::load()?.app()?;
    if let Some(name) = &cli.collection {
        cfg.data.collection.clone_from(name);
    }
    let default_top_k = cfg.query.top_k;
    let rag = LegalRag::from_config(cfg).await?;

    match run(&rag, cli.command, cli.json, default_top_k).await {
        Err(Error::NotIndexed(name)) => {
            eprintln!("Collection '{name}' has not been indexed yet.");
            eprintln!("Run `lexdb index <FOLDER>` first.");
            std::process::exit(2);
        }
        other => Ok(other?),
    }
}

async fn run(rag: &LegalRag, command: Command, json: bool, default_top_k: usize) -> lexdb_core::Result<()> {
    let collection = rag.config().data.collection.clone();
    match command {
        Command::Index { folder } => {
            let folder = folder.unwrap_or_else(|| expand_path(&rag.config().data.folder));
            let report = rag.build_index(&folder, &collection).await?;
            if json {
                print_json(&report);
            } else {
                println!(
                    "Indexed {} chunks from {} files into '{collection}' ({} files skipped, {} rows rejected)",
                    report.chunks_indexed, report.files_indexed, report.files_skipped, report.rows_rejected
                );
            }
        }
        Command::Ask { query, top_k } => {
            let answer = rag.answer(&query, top_k.unwrap_or(default_top_k)).await?;
            if json {
                print_json(&answer);
                return Ok(());
            }
            println!("{}", answer.text);
            if answer.status != AnswerStatus::NoRelevantContent {
                println!("\nSources:");
                for hit in &answer.hits {
                    let m = &hit.metadata;
                    println!("  - {} s.{} {} ({:.3})", m.act_title, m.section_number, m.section_name, hit.score);
                }
            }
        }
        Command::Search { query, top_k } => {
            let result = rag.search(&query, top_k.unwrap_or(default_top_k)).await?;
            if json {
                print_json(&result);
                return Ok(());
            }
            if result.is_empty() {
                println!("No matching sections.");
            }
            for (i, hit) in result.iter().enumerate() {
                let m = &hit.metadata;
                println!(
                    "{}. [{:.4}] {} - Section {}: {}",
                    i + 1,
                    hit.score,
                    m.act_title,
                    m.section_number,
                    m.section_name
                );
                println!("   {}", hit.document.replace('\n', " "));
            }
        }
        Command::Show { title } => match rag.load_full_document(&title)? {
            Some(doc) if json => print_json(&doc),
            Some(doc) => println!("{}", doc.render()),
            None => {
                eprintln!("No act titled '{title}' in {}", rag.config().data.metadata_folder);
                std::process::exit(1);
            }
        },
        Command::Titles => {
            let titles = rag.list_titles()?;
            if json {
                print_json(&titles);
            } else {
                for t in titles {
                    println!("{t}");
                }
            }
        }
        Command::Stats => {
            let stats = rag.stats().await?;
            if json {
                print_json(&stats);
            } else {
                println!("collection: {}", stats.name);
                println!("backend:    {}", stats.backend.as_str());
                println!("metric:     {}", stats.metric.as_str());
                println!("dimension:  {}", stats.dim);
                println!("entries:    {}", stats.entries);
                println!("embedder:   {}", stats.embedding_model);
            }
        }
        Command::Reset => {
            if rag.reset().await? {
                println!("Dropped collection '{collection}'");
            } else {
                println!("Collection '{collection}' did not exist");
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}
