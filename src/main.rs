use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunr_search::config::{AppConfig, CliConfig, FileConfig};
use tunr_search::{
    CommandProviderRunner, LocalEmbedder, SearchPipeline, SearchResult, SqliteCacheStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().context("Error resolving current directory")?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    /// Free-text description of the music to find.
    #[clap(required = true)]
    pub query: Vec<String>,

    /// Path to a TOML config file. Values in the file override flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite cache database.
    #[clap(long, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Sentence embedding model name.
    #[clap(long)]
    pub model: Option<String>,

    /// Relax the source policy and ask providers for more results.
    #[clap(long)]
    pub expanded: bool,

    /// Number of results to request, overriding any count in the query.
    #[clap(long)]
    pub limit: Option<usize>,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

fn format_result(result: &SearchResult, rank: usize) -> String {
    let year = result
        .year
        .as_deref()
        .filter(|y| !y.is_empty())
        .map(|y| format!(" ({})", y))
        .unwrap_or_default();
    format!(
        "{}. {} — {}{} score={:.3} strict={:.2}",
        rank, result.song, result.artist, year, result.score, result.strict_ratio
    )
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db.clone(),
        model_name: cli_args.model.clone(),
        limit: cli_args.limit,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening cache database at {:?}...", config.db_path);
    let store = SqliteCacheStore::new(&config.db_path)?;

    info!("Loading embedding model {}...", config.model_name);
    let embedder = LocalEmbedder::new(&config.model_name, true)?;

    let runner =
        CommandProviderRunner::new(config.providers.commands.clone(), config.runner_settings())?;
    for (label, command) in runner.commands() {
        info!("Provider {}: {}", label, command);
    }

    let pipeline = SearchPipeline::new(&store, &embedder, &runner, config.pipeline_settings());
    let query = cli_args.query.join(" ");

    let spinner = create_spinner("starting");
    let mut progress = |stage: &str| spinner.set_message(stage.to_string());
    let mut on_result = |result: &SearchResult, rank: usize, _total: usize| {
        spinner.suspend(|| println!("{}", format_result(result, rank)));
    };

    let outcome = pipeline.run(
        &query,
        cli_args.expanded,
        Some(&mut progress),
        Some(&mut on_result),
    );
    spinner.finish_and_clear();
    let outcome = outcome?;

    if outcome.results.is_empty() {
        println!("No results.");
    }
    println!(
        "\nrun {} ({})",
        outcome.run_id,
        if outcome.cached { "cached" } else { "fresh" }
    );

    Ok(())
}
