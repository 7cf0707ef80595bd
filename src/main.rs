use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use newsdesk::app::App;
use newsdesk::config::Config;
use newsdesk::feed::{Category, HeadlinesClient};
use newsdesk::storage::FavoritesStore;

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("newsdesk");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Categorized top headlines with local favorites")]
struct Args {
    /// Headline category to fetch
    #[arg(long, short, default_value = "general")]
    category: Category,

    /// Filter headlines by a case-insensitive title substring
    #[arg(long, short, value_name = "TEXT")]
    search: Option<String>,

    /// Show only favorited articles
    #[arg(long)]
    favorites_only: bool,

    /// Toggle favorite status for an article URL (repeatable), then show the feed
    #[arg(long, value_name = "URL")]
    favorite: Vec<String>,

    /// Maximum number of headlines to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // Favorites live here; keep the directory user-only on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config =
        Config::load(&config_dir.join("config.toml")).context("Failed to load configuration")?;

    let Some(api_key) = config.resolve_api_key() else {
        eprintln!("Error: No API key configured.");
        eprintln!();
        eprintln!("Set the NEWSDESK_API_KEY environment variable, or add to {}:", config_dir.join("config.toml").display());
        eprintln!("  api_key = \"<your key>\"");
        std::process::exit(1);
    };

    let client = HeadlinesClient::new(
        &config.base_url,
        config.country.clone(),
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create headlines client")?;

    let favorites_store = FavoritesStore::new(config_dir.join("favorites.json"));
    let mut app = App::load(
        client,
        favorites_store,
        config.clear_search_on_category_change,
    )
    .await;

    // Apply favorite toggles before rendering, so the feed reflects them.
    for url in &args.favorite {
        match app.toggle_favorite(url).await {
            Ok(true) => println!("Favorited {url}"),
            Ok(false) => println!("Unfavorited {url}"),
            Err(e) => eprintln!("Warning: favorite change for {url} was not saved: {e}"),
        }
    }

    app.state.change_category(args.category);
    if let Some(search) = args.search {
        app.state.set_search(search);
    }
    app.state.favorites_only = args.favorites_only;

    // A failed fetch is recoverable: report it and fall through to the
    // (empty) view, like pull-to-refresh surfacing "No articles found."
    if let Err(e) = app.refresh().await {
        eprintln!("Fetch failed: {e}");
    }

    let visible = app.filtered_articles();
    if visible.is_empty() {
        println!("No articles found.");
        return Ok(());
    }

    for article in visible.iter().take(args.limit) {
        let marker = if app.state.is_favorite(&article.url) {
            "*"
        } else {
            " "
        };
        let published = article
            .published_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??".to_string());
        println!("{marker} {published}  {}", article.title);
        println!("    {} · {}", article.source_name, article.url);
    }

    Ok(())
}
