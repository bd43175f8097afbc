//! Notebase CLI - serve and inspect a notebase workspace.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use notebase_core::{NotebaseConfig, Store};
use notebase_server::NotebaseServer;
use notebase_store::SqliteStore;
use notebase_view::ViewResolver;

/// Notebase - pages, linked notes and typed databases
#[derive(Parser)]
#[command(name = "notebase")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: user config dir, then ./notebase.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run the HTTP API
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8080
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List pages
    Pages,

    /// List databases with their schema size
    Databases,

    /// Resolve a saved view and print it as JSON
    Resolve {
        /// Database id
        #[arg(value_name = "DATABASE")]
        database_id: String,

        /// View id
        #[arg(value_name = "VIEW")]
        view_id: String,
    },

    /// List the pages linking to a page
    Backlinks {
        /// Page id
        page: String,
    },
}

/// Config precedence: explicit file, default lookup, environment, then flags.
fn resolve_config(cli: &Cli) -> Result<NotebaseConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => NotebaseConfig::load(path)?,
        None => NotebaseConfig::load_default()?,
    };
    config.apply_env_overrides();

    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Commands::Serve {
        bind: Some(bind), ..
    } = &cli.command
    {
        config.server.bind_address = bind.clone();
    }

    Ok(config)
}

fn setup_logging(verbose: bool, default_filter: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    setup_logging(cli.verbose, &config.logging.filter);
    debug!("Using database at {:?}", config.database.path);

    match cli.command {
        Commands::Init => {
            SqliteStore::open_with_config(&config.database)?;
            println!("Initialized database at: {}", config.database.path.display());
        }
        Commands::Serve { .. } => {
            NotebaseServer::new(&config)?.serve().await?;
        }
        Commands::Pages => {
            let store = SqliteStore::open_with_config(&config.database)?;
            list_pages(&store).await?;
        }
        Commands::Databases => {
            let store = SqliteStore::open_with_config(&config.database)?;
            list_databases(&store).await?;
        }
        Commands::Resolve {
            database_id,
            view_id,
        } => {
            let store = Arc::new(SqliteStore::open_with_config(&config.database)?);
            let resolver = ViewResolver::new(store);
            let resolved = resolver.resolve(&database_id, &view_id).await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Commands::Backlinks { page } => {
            let store = SqliteStore::open_with_config(&config.database)?;
            backlinks(&store, &page).await?;
        }
    }

    Ok(())
}

async fn list_pages(store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    let pages = store.list_pages().await?;
    if pages.is_empty() {
        println!("No pages.");
        return Ok(());
    }

    for page in pages {
        let marker = if page.is_archived { " (archived)" } else { "" };
        println!("{}  {}{}", page.id, page.title, marker);
    }
    Ok(())
}

async fn list_databases(store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
    let databases = store.list_databases().await?;
    if databases.is_empty() {
        println!("No databases.");
        return Ok(());
    }

    for database in databases {
        println!(
            "{}  {} ({}) - {} properties, {} views",
            database.id,
            database.title,
            database.slug,
            database.properties.len(),
            database.views.len()
        );
        for view in &database.views {
            println!("    {}  {} [{}]", view.id, view.name, view.view_type);
        }
    }
    Ok(())
}

async fn backlinks(store: &SqliteStore, page_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sources = store.list_backlinks(page_id).await?;
    if sources.is_empty() {
        println!("No pages link to {}.", page_id);
        return Ok(());
    }

    for page in sources {
        println!("{}  {}", page.id, page.title);
    }
    Ok(())
}
