//! JaltolAI - conversational assistant for village-level hydrology
//!
//! Serves a chat endpoint backed by an LLM agent whose tools compute annual
//! rainfall and evapotranspiration from satellite raster archives.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Startup or runtime error (configuration, archive, bind failure, etc.)

mod agent;
mod analysis;
mod archive;
mod cli;
mod config;
mod error;
mod location;
mod models;
mod server;
mod session;
#[cfg(test)]
mod testing;

use agent::{AgentConfig, ConversationAgent, IndicatorTool, OpenAiClient, ToolRegistry};
use analysis::GeoTemporalAggregator;
use anyhow::{Context, Result};
use archive::{ArchiveReference, EarthEngineArchive};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use location::NominatimGeocoder;
use models::Indicator;
use server::AppState;
use session::{MemoryCodec, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("JaltolAI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args) {
        error!("JaltolAI failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle --init-config: generate a default .jaltol.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Set OPENAI_API_KEY, EARTHENGINE_TOKEN, EARTHENGINE_PROJECT and");
    println!("   JALTOL_SESSION_SECRET, or add them to the file.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Build everything, then answer one question or serve HTTP.
fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    // Blocking HTTP clients must be created and dropped outside the async runtime.
    let sessions = Arc::new(build_sessions(&config)?);

    if let Some(question) = args.ask.as_deref() {
        return ask_once(&sessions, question);
    }

    let state = Arc::new(AppState::new(Arc::clone(&sessions), &config.server));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(server::serve(&config.server, state));
    drop(runtime);
    result
}

/// Load configuration: file, then environment, then CLI flags.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => match Config::load_default()? {
            Some(config) => {
                info!("Loaded {}", DEFAULT_CONFIG_FILE);
                config
            }
            None => Config::default(),
        },
    };

    config.apply_env();
    config.merge_with_args(args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Wire the archive, geocoder, tools and model into a session manager.
fn build_sessions(config: &Config) -> Result<SessionManager> {
    let settings = config.analysis.settings()?;

    let archive = Arc::new(EarthEngineArchive::new(&config.archive)?);
    let geocoder = Arc::new(NominatimGeocoder::new(&config.geocoder)?);
    let aggregator = GeoTemporalAggregator::new(Arc::clone(&archive));

    let mut registry = ToolRegistry::new();
    for indicator in Indicator::all() {
        let asset = config.archive.asset_for(indicator);
        let reference = ArchiveReference::fetch(archive.as_ref(), asset)
            .with_context(|| format!("Failed to open {} archive {}", indicator, asset))?;
        registry.register(Arc::new(IndicatorTool::new(
            indicator,
            reference,
            aggregator.clone(),
            Arc::clone(&geocoder),
            settings,
        )));
    }
    info!(
        "Registered {} tools ({} {} windows, spatial {})",
        registry.len(),
        settings.span,
        settings.step,
        settings.spatial_reducer
    );

    let client = Arc::new(OpenAiClient::new(&config.model)?);
    info!("Using model {}", client.model());

    let agent = ConversationAgent::new(
        AgentConfig {
            max_iterations: config.model.max_iterations,
        },
        client.clone(),
        Arc::new(registry),
    );
    let secret = config.session.secret.as_deref().unwrap_or_default();

    Ok(SessionManager::new(
        agent,
        client,
        MemoryCodec::new(secret),
        config.model.memory_token_limit,
    ))
}

/// Answer a single question from the command line.
fn ask_once(sessions: &SessionManager, question: &str) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = sessions.query(None, question);
    spinner.finish_and_clear();

    println!("{}", outcome.text);
    Ok(())
}
