use hindsight::cli::{Cli, Commands, ConfigAction, SearchArgs};
use hindsight::config::Config;
use hindsight::embedding::{EmbeddingProvider, OllamaProvider};
use hindsight::error::{HindsightError, Result};
use hindsight::recall::{AuthorRole, GroupingOptions, RecallEngine, SearchRequest};
use hindsight::storage::{ArchiveStore, VectorStore};
use hindsight::tags::ProjectTagClassifier;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search(args) => {
            cmd_search(cli.config, args)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Tags => {
            cmd_tags(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "hindsight=debug"
    } else {
        "hindsight=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_search(config_path: Option<PathBuf>, args: SearchArgs) -> Result<()> {
    let config = load_config(config_path)?;

    let role = args
        .role
        .as_deref()
        .map(|role| role.parse::<AuthorRole>())
        .transpose()?;
    let grouping = if args.group || args.convos.is_some() || args.per_convo.is_some() {
        Some(GroupingOptions {
            max_conversations: args.convos,
            hits_per_conversation: args.per_convo,
        })
    } else {
        None
    };

    let request = SearchRequest {
        query: args.query,
        role,
        since: args.since,
        until: args.until,
        project: args.project,
        lexical_limit: args.fts,
        semantic_limit: args.sem,
        top: args.top,
        grouping,
        timeout: args.timeout.map(Duration::from_secs),
    };

    let archive = Arc::new(ArchiveStore::open(
        &expand_path(&config.stores.archive_db)?,
        config.search.snippet.clone(),
    )?);
    let vectors = Arc::new(VectorStore::open(&expand_path(&config.stores.semantic_db)?)?);
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        OllamaProvider::new(&config.embedding).map_err(|e| HindsightError::Provider {
            message: e.to_string(),
        })?,
    );

    let classifier = Arc::new(ProjectTagClassifier::load(&expand_path(
        &config.tags.rules_file,
    )?));
    if classifier.is_degraded() {
        tracing::warn!("Tag rules degraded: {}", classifier.origin());
    }

    let engine = RecallEngine::new(
        archive,
        vectors,
        provider,
        classifier,
        config.search.clone(),
        Duration::from_secs(config.embedding.timeout_secs),
    );

    // The engine is async for the embedding call and the parallel legs;
    // everything around it stays synchronous.
    let rt = tokio::runtime::Runtime::new().map_err(|e| HindsightError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let outcome = rt.block_on(engine.search(&request))?;

    let json = serde_json::to_string_pretty(&outcome).map_err(|e| HindsightError::Json {
        source: e,
        context: "Failed to serialize search results".to_string(),
    })?;
    println!("{}", json);

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Hindsight Status");
    println!("================");

    let archive_path = expand_path(&config.stores.archive_db)?;
    let archive = ArchiveStore::open(&archive_path, config.search.snippet.clone())?;
    let stats = archive.stats()?;
    println!("\nArchive: {}", archive_path.display());
    println!("  Messages:      {}", stats.message_count);
    println!("  Conversations: {}", stats.conversation_count);
    println!("  Indexed rows:  {}", stats.indexed_count);

    let semantic_path = expand_path(&config.stores.semantic_db)?;
    let vectors = VectorStore::open(&semantic_path)?;
    let stats = vectors.stats()?;
    println!("\nVector store: {}", semantic_path.display());
    println!("  Documents: {}", stats.document_count);
    println!("  Vectors:   {}", stats.vector_count);

    println!("\nEmbedding provider:");
    println!("  Endpoint: {}", config.embedding.endpoint);
    println!("  Model:    {}", config.embedding.model);
    println!("  Timeout:  {}s", config.embedding.timeout_secs);

    let classifier = ProjectTagClassifier::load(&expand_path(&config.tags.rules_file)?);
    println!("\nTag rules: {}", classifier.origin());
    println!("  Rules in effect: {}", classifier.rules().len());

    Ok(())
}

fn cmd_tags(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let classifier = ProjectTagClassifier::load(&expand_path(&config.tags.rules_file)?);

    println!("Tag rules: {}", classifier.origin());

    if classifier.rules().is_empty() {
        println!("\nNo rules in effect; hits will carry no project tags.");
        return Ok(());
    }

    println!();
    for rule in classifier.rules() {
        println!("  {} <- {}", rule.tag, rule.patterns.join(", "));
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| HindsightError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HindsightError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());

            // An empty rule file keeps the classifier out of degraded mode
            // until real rules are written.
            let rules_path = expand_path(&config.tags.rules_file)?;
            if force || !rules_path.exists() {
                if let Some(parent) = rules_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| HindsightError::Io {
                        source: e,
                        context: format!("Failed to create rules directory: {:?}", parent),
                    })?;
                }
                std::fs::write(&rules_path, "{\n  \"projects\": []\n}\n").map_err(|e| {
                    HindsightError::Io {
                        source: e,
                        context: format!("Failed to write tag rules: {:?}", rules_path),
                    }
                })?;
                println!("✓ Tag rule template installed at: {}", rules_path.display());
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'hindsight config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| HindsightError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| HindsightError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
