use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hilite::{locate, Document, HighlightStore, JsonFileStore, Orchestrator, SelectionRange};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "hilite",
    about = "Create, restore, and manage text highlights on saved HTML pages"
)]
struct Cli {
    /// HTML page to operate on
    #[arg(long, env = "HILITE_PAGE")]
    page: PathBuf,

    /// JSON store holding persisted highlight records
    #[arg(long, env = "HILITE_STORE", default_value = "hilite-store.json")]
    store: PathBuf,

    /// URL identifying the page (highlights are keyed by it)
    #[arg(long, env = "HILITE_URL")]
    url: Url,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Highlight the first occurrence of a text snippet on the page
    Mark {
        /// Text to locate and highlight
        #[arg(long)]
        text: String,

        /// Fill color for the highlight
        #[arg(long, default_value = "yellow")]
        color: String,
    },
    /// Re-anchor every persisted highlight onto the page
    Restore,
    /// Show persisted highlights and whether each is live on the page
    List,
    /// Delete one highlight by id
    Delete {
        /// Highlight id to remove
        #[arg(long)]
        id: String,
    },
    /// Remove every highlight for this page
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let html = fs::read_to_string(&cli.page)
        .with_context(|| format!("failed to read page {}", cli.page.display()))?;
    let mut document = Document::parse_html(&html);
    let mut engine = Orchestrator::new(JsonFileStore::new(&cli.store), &cli.url);

    match cli.command {
        Command::Mark { text, color } => {
            let Some(hit) = locate::find_exact(&document, document.root(), &text) else {
                bail!("text {text:?} not found on {}", cli.page.display());
            };
            let range = SelectionRange::TextSpan {
                node: hit.node,
                start: hit.start,
                end: hit.end,
            };
            let id = engine
                .create_highlight(&mut document, &range, &color)
                .context("failed to create highlight")?;
            write_page(&cli.page, &document)?;
            println!("Created {id} ({color}) on {}", engine.document_key());
        }
        Command::Restore => {
            let outcome = engine
                .reconcile(&mut document)
                .context("failed to reconcile highlights")?;
            write_page(&cli.page, &document)?;
            println!(
                "Restored {} highlight(s), {} already live, {} lost.",
                outcome.anchored.len(),
                outcome.already_live,
                outcome.lost.len()
            );
            for id in &outcome.lost {
                println!("  lost: {id}");
            }
        }
        Command::List => {
            let records = engine
                .store()
                .get(engine.document_key())
                .context("failed to read store")?;
            if records.is_empty() {
                println!("No highlights recorded for {}.", engine.document_key());
                return Ok(());
            }
            for rec in records {
                let live = if hilite::highlight::is_present(&document, &rec.id) {
                    "live"
                } else {
                    "not anchored"
                };
                println!("{}  [{}]  {}  {:?}", rec.id, rec.color, live, rec.text);
            }
        }
        Command::Delete { id } => {
            let outcome = engine
                .delete_highlight(&mut document, &id)
                .context("failed to delete highlight")?;
            write_page(&cli.page, &document)?;
            println!(
                "Removed {} record(s), {} remaining.",
                outcome.removed, outcome.remaining
            );
        }
        Command::Clear => {
            let cleared = engine
                .clear_all(&mut document)
                .context("failed to clear highlights")?;
            write_page(&cli.page, &document)?;
            println!("Cleared {cleared} highlight(s).");
        }
    }

    Ok(())
}

fn write_page(path: &Path, document: &Document) -> Result<()> {
    fs::write(path, document.to_html())
        .with_context(|| format!("failed to write page {}", path.display()))
}
