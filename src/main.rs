//! waypoint CLI - Places autocomplete against a configured endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;
use waypoint::autocomplete::TokioScheduler;
use waypoint::models::{ErrorLog, JsonlErrorLog, TracingErrorLog};
use waypoint::{AutocompleteController, AutocompleteSettings, Config, Key, Suggestion, SuggestionService};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Resilient places autocomplete for trip planning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply if it does not exist)
    #[arg(short, long, global = true, default_value = "waypoint.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up suggestions for one query
    Suggest {
        /// Text to complete
        query: String,

        /// Print suggestions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drive the autocomplete widget from stdin
    ///
    /// Plain lines are typed into the field. Commands: :down :up :enter :esc
    /// :retry :clear :submit :quit
    Interactive,

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# waypoint configuration file

[places]
endpoint = "http://localhost:3000/api/places/autocomplete"
# API key (can also use WAYPOINT_PLACES_API_KEY env var)
# api_key = "${PLACES_API_KEY}"
timeout_ms = 8000

[places.headers]
# x-client = "waypoint"

[retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 5000
backoff_factor = 2.0
max_jitter_ms = 1000

[autocomplete]
debounce_ms = 300
max_manual_retries = 2

[logging]
# error_log = "logs/errors.jsonl"
"#;
    println!("{example}");
}

/// Load the config file, falling back to defaults when it is absent.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn build_error_log(config: &Config) -> Result<Arc<dyn ErrorLog>> {
    match &config.logging.error_log {
        Some(path) => {
            let log = JsonlErrorLog::open(path)
                .with_context(|| format!("Failed to open error log {path:?}"))?;
            Ok(Arc::new(log))
        }
        None => Ok(Arc::new(TracingErrorLog)),
    }
}

fn build_service(config: &Config) -> Result<SuggestionService> {
    let error_log = build_error_log(config)?;
    SuggestionService::from_config(config, error_log).context("Failed to create places client")
}

fn print_suggestion(suggestion: &Suggestion, marker: &str) {
    let city = if suggestion.is_city() { "" } else { " (not a city)" };
    println!("{marker}{}{city}", suggestion.display());
}

fn render(controller: &AutocompleteController) {
    let state = controller.state();
    println!("[{}]", state.raw_query());

    if state.is_loading() {
        println!("  searching...");
    }
    if !state.is_open() {
        return;
    }
    if let Some(message) = controller.error_message() {
        let hint = if controller.can_retry() { " (:retry)" } else { "" };
        println!("  ! {message}{hint}");
        return;
    }
    for (i, suggestion) in state.suggestions().iter().enumerate() {
        let marker = if state.selected_index() == Some(i) { "  > " } else { "    " };
        print_suggestion(suggestion, marker);
    }
}

async fn run_interactive(config: &Config) -> Result<()> {
    let service = Arc::new(build_service(config)?);
    let mut controller = AutocompleteController::new(
        service,
        Arc::new(TokioScheduler),
        AutocompleteSettings::from(&config.autocomplete),
    )
    .on_city_select(|s| println!("Selected: {} ({})", s.description, s.place_id))
    .on_search(|q| println!("Search: {q}"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match line.trim() {
            ":quit" | ":q" => break,
            ":down" => controller.key(Key::ArrowDown),
            ":up" => controller.key(Key::ArrowUp),
            ":enter" => controller.key(Key::Enter),
            ":esc" => controller.key(Key::Escape),
            ":retry" => controller.retry(),
            ":clear" => controller.clear(),
            ":submit" => controller.submit(),
            _ => controller.input(line.as_str()),
        }
        controller.settle().await;
        render(&controller);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => print_example_config(),

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            info!("Configuration is valid");
            info!("  Endpoint: {}", config.places.endpoint);
            info!(
                "  API key: {}",
                if config.resolve_api_key().is_some() { "set" } else { "none" }
            );
            info!(
                "  Retry: {} attempts, {}ms base, {}ms cap",
                config.retry.max_attempts, config.retry.base_delay_ms, config.retry.max_delay_ms
            );
            info!("  Debounce: {}ms", config.autocomplete.debounce_ms);
        }

        Commands::Suggest { query, json } => {
            let config = load_config(&cli.config)?;
            let service = build_service(&config)?;

            match service.get_suggestions(&query).await {
                Ok(suggestions) if json => {
                    println!("{}", serde_json::to_string_pretty(&suggestions)?);
                }
                Ok(suggestions) if suggestions.is_empty() => println!("No suggestions"),
                Ok(suggestions) => {
                    for suggestion in &suggestions {
                        print_suggestion(suggestion, "");
                    }
                }
                Err(error) => {
                    eprintln!("{}", error.user_facing_message());
                    std::process::exit(1);
                }
            }
        }

        Commands::Interactive => {
            let config = load_config(&cli.config)?;
            run_interactive(&config).await?;
        }
    }

    Ok(())
}
