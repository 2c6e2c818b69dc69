use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use rickmorty_llm::app::AppContext;
use rickmorty_llm::config;
use rickmorty_llm::detail::DetailState;
use rickmorty_llm::model::{Character, CharacterStatus};

#[derive(Debug, Parser)]
#[command(author, version, about = "Browse the Rick and Morty catalog and ask an LLM about characters")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List characters page by page
    List {
        /// Number of pages to load
        #[arg(long, default_value = "1")]
        pages: u32,
        /// Only show favorited characters
        #[arg(long)]
        favorites: bool,
        /// Bypass the local cache for the first page
        #[arg(long)]
        refresh: bool,
    },
    /// Show one character
    Show {
        id: String,
        /// Bypass the local cache
        #[arg(long)]
        refresh: bool,
    },
    /// Summarize a character, reusing a stored summary unless forced
    Summarize {
        id: String,
        #[arg(long)]
        force: bool,
    },
    /// Ask a free-text question about a character
    Ask {
        id: String,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Toggle a character in the favorites set
    Favorite { id: String },
    /// Drop the stored summary for a character
    ClearSummary { id: String },
    /// Drop every cached GraphQL response
    ClearCache,
    /// Print a sample config file
    PrintConfigExample,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if matches!(args.command, Command::PrintConfigExample) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let ctx = AppContext::init(&cfg, &database_url).await?;

    match args.command {
        Command::List {
            pages,
            favorites,
            refresh,
        } => list(&ctx, pages, favorites, refresh).await,
        Command::Show { id, refresh } => {
            let detail = ctx.detail_controller();
            detail.load(&id).await;
            if refresh {
                detail.refresh().await;
            }
            let state = detail.snapshot();
            print_detail(&state, ctx.favorites.contains(&id))?;
            if state.summary.is_some() {
                if let Some(entry) = ctx.summaries.read_entry(&id).await? {
                    println!("(summary stored {})", entry.updated_at.format("%Y-%m-%d %H:%M UTC"));
                }
            }
            Ok(())
        }
        Command::Summarize { id, force } => {
            let detail = ctx.detail_controller();
            detail.load(&id).await;
            detail.summarize(force).await;
            let state = detail.snapshot();
            if let Some(error) = state.error {
                bail!(error);
            }
            match state.summary {
                Some(summary) => println!("{summary}"),
                None => bail!("no summary available for {id}"),
            }
            Ok(())
        }
        Command::Ask { id, question } => {
            let detail = ctx.detail_controller();
            detail.load(&id).await;
            detail.ask(&question.join(" ")).await;
            let state = detail.snapshot();
            if let Some(error) = state.error {
                bail!(error);
            }
            match state.answer {
                Some(answer) => println!("{answer}"),
                None => bail!("no answer for {id}"),
            }
            Ok(())
        }
        Command::Favorite { id } => {
            let now_favorite = ctx.favorites.toggle(&id).await?;
            info!(id = %id, favorite = now_favorite, "favorites updated");
            println!(
                "{id} {}",
                if now_favorite { "added to favorites" } else { "removed from favorites" }
            );
            Ok(())
        }
        Command::ClearSummary { id } => {
            if ctx.clear_summary(&id).await? {
                println!("cleared summary for {id}");
            } else {
                println!("no stored summary for {id}");
            }
            Ok(())
        }
        Command::ClearCache => {
            let removed = ctx.graphql.clear_cache().await?;
            println!("removed {removed} cached responses");
            Ok(())
        }
        Command::PrintConfigExample => Ok(()),
    }
}

async fn list(ctx: &AppContext, pages: u32, favorites_only: bool, refresh: bool) -> Result<()> {
    let controller = ctx.list_controller();
    controller.load_pages(pages, refresh).await;

    if controller.should_show_error_state() {
        bail!(controller.error_message().unwrap_or_default());
    }
    let shown = controller.filtered_items(favorites_only, |id| ctx.favorites.contains(id));
    for character in &shown {
        let favorite = character
            .id
            .as_deref()
            .is_some_and(|id| ctx.favorites.contains(id));
        println!("{}", list_line(character, favorite));
    }
    if let Some(error) = controller.error_message() {
        eprintln!("warning: {error}");
    }
    info!(
        shown = shown.len(),
        more = controller.has_next_page(),
        phase = ?controller.snapshot().phase(),
        "listed characters"
    );
    Ok(())
}

fn list_line(c: &Character, favorite: bool) -> String {
    format!(
        "{} {:>4}  {} [{}]",
        if favorite { "*" } else { " " },
        c.id.as_deref().unwrap_or("-"),
        c.display_name(),
        c.status_kind().as_ref().map_or("?", CharacterStatus::marker)
    )
}

fn print_detail(state: &DetailState, favorite: bool) -> Result<()> {
    let Some(c) = &state.character else {
        bail!(state
            .error
            .clone()
            .unwrap_or_else(|| "character not found".to_string()));
    };
    println!("{}{}", c.display_name(), if favorite { " *" } else { "" });
    let rows = [
        ("Status", c.status.as_deref()),
        ("Species", c.species.as_deref()),
        ("Type", c.subtype.as_deref().filter(|t| !t.is_empty())),
        ("Gender", c.gender.as_deref()),
        ("Origin", c.origin_name()),
        ("Location", c.location_name()),
        ("Image", c.image.as_deref()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("  {label:<9} {value}");
        }
    }
    let episodes = c.episode_names();
    if !episodes.is_empty() {
        println!("  Episodes  {} ({})", episodes.len(), episodes.join(", "));
    }
    if let Some(summary) = &state.summary {
        println!("\n{summary}");
    }
    if let Some(error) = &state.error {
        eprintln!("warning: {error}");
    }
    Ok(())
}
