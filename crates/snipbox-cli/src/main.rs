use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use snipbox_core::config::{ConfigLoader, ENV_NETWORK};
use snipbox_core::engine::prepare;
use snipbox_core::{
    CacheConfig, DependencyCache, EngineConfig, ExecutionEngine, ExecutionRequest,
    LanguageRegistry, NetworkPolicy,
};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

#[derive(Parser, Debug)]
#[clap(
    name = "snipbox",
    author,
    version,
    about = "Run untrusted code snippets in throwaway containers"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, global = true, default_value = "info")]
    log_level: String,

    #[clap(
        long,
        global = true,
        help = "Container network policy: 'none' or 'default'. Required unless set in the configuration file"
    )]
    network: Option<NetworkPolicy>,

    #[clap(long, global = true, help = "Wall-clock budget in seconds")]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a snippet and print the result as JSON
    Run {
        #[clap(long, short = 'L')]
        language: String,

        #[clap(help = "Source file; reads stdin when absent or '-'")]
        file: Option<PathBuf>,
    },
    /// Show what would run, without starting a container
    Plan {
        #[clap(long, short = 'L')]
        language: String,

        file: Option<PathBuf>,
    },
    /// List supported languages
    Languages,
    /// Manage the dependency cache
    Cache {
        #[clap(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show the cache directory and its size per language
    Info,
    /// Remove every cached package
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .target(env_logger::Target::Stderr)
        .init();

    match &cli.command {
        Commands::Run { language, file } => {
            let config = engine_config(&cli).await?;
            let engine = ExecutionEngine::from_config(&config)?;
            let request = ExecutionRequest::new(read_source(file.as_ref()).await?, language);

            let result = engine.execute(&request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Plan { language, file } => {
            let registry = registry(&cli).await?;
            let request = ExecutionRequest::new(read_source(file.as_ref()).await?, language);
            let planned = prepare(&registry, &request)?;
            println!("{}", serde_json::to_string_pretty(&planned)?);
            Ok(())
        }
        Commands::Languages => {
            let registry = registry(&cli).await?;
            for profile in registry.profiles() {
                println!("{:<12} {}", profile.language_id, profile.image);
            }
            Ok(())
        }
        Commands::Cache { action } => handle_cache_command(&cli, action).await,
    }
}

async fn file_config(cli: &Cli) -> Result<Option<EngineConfig>> {
    match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path.display());
            let config = ConfigLoader::from_file(path)
                .await
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

/// Configuration for an actual run. The network policy has no default: it
/// must come from the file, the environment, or `--network`.
async fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match file_config(cli).await? {
        Some(config) => config,
        None => {
            let network = match cli.network {
                Some(network) => network,
                None => std::env::var(ENV_NETWORK)
                    .ok()
                    .map(|value| value.parse::<NetworkPolicy>())
                    .transpose()
                    .map_err(|e| anyhow::anyhow!("{}: {}", ENV_NETWORK, e))?
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "No network policy chosen. Pass --network none|default, set {} or use --config",
                            ENV_NETWORK
                        )
                    })?,
            };
            let mut config = EngineConfig::new(network);
            ConfigLoader::apply_env_overrides(&mut config)?;
            config
        }
    };

    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(timeout) = cli.timeout {
        config.limits.timeout_secs = timeout;
    }
    config.validate()?;
    Ok(config)
}

async fn registry(cli: &Cli) -> Result<LanguageRegistry> {
    let registry = LanguageRegistry::builtin()?;
    match file_config(cli).await? {
        Some(config) => Ok(registry.with_definitions(config.languages)?),
        None => Ok(registry),
    }
}

async fn read_source(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .context("Failed to read snippet from stdin")?;
            Ok(source)
        }
    }
}

async fn handle_cache_command(cli: &Cli, action: &CacheCommands) -> Result<()> {
    let cache_config = match file_config(cli).await? {
        Some(config) => config.cache,
        None => CacheConfig::default(),
    };
    let cache = DependencyCache::new(cache_config.resolved_root());

    match action {
        CacheCommands::Info => {
            println!("Dependency cache directory: {}", cache.root().display());
            if !cache_config.enabled {
                println!("Caching is disabled in the configuration.");
            }
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("No cached dependencies found.");
            } else {
                for entry in &entries {
                    println!(
                        "  {:<12} {:>10}  {}",
                        entry.language_id,
                        human_size(entry.size_bytes),
                        entry.path.display()
                    );
                }
                println!("Total: {}", human_size(cache.total_size()?));
            }
        }
        CacheCommands::Clear => {
            cache.clear()?;
            println!("Dependency cache cleared.");
        }
    }

    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
