use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aoba::channel::telegram::{TelegramAdapter, TelegramEchoSink};
use aoba::{
    AobaConfig, CooldownStore, FeatureRegistry, InMemoryRepeatStore, ObservationStore,
    PostgresRepeatStore, Reaper, RepeatEngine,
};

/// Env var naming the config file when `--config` is not given.
const CONFIG_PATH_ENV: &str = "AOBA_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "aoba.toml";

#[derive(Parser)]
#[command(name = "aoba", about = "Group chat bot that joins in when people repeat themselves")]
struct Args {
    /// Path to aoba.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config)?;
    config.apply_env(|key| std::env::var(key).ok());

    if args.check_config {
        println!("configuration OK");
        return Ok(());
    }

    if !config.telegram.enabled {
        bail!("telegram channel is disabled; no message source to serve");
    }
    let token = config.telegram.token.clone().ok_or_else(|| {
        anyhow!(
            "Telegram enabled but no token: set telegram.token or {}",
            aoba::config::BOT_TOKEN_ENV
        )
    })?;
    let bot = teloxide::Bot::new(token);

    let (observations, cooldowns) = open_store(config.database.url.as_deref()).await?;
    let cancel = CancellationToken::new();

    let mut registry = FeatureRegistry::new();
    let reaper = if config.repeat.enabled {
        let sink = Arc::new(TelegramEchoSink::new(bot.clone()));
        let engine = RepeatEngine::new(
            &config.repeat,
            observations.clone(),
            cooldowns.clone(),
            sink,
        );
        registry.register(Arc::new(engine))?;
        let reaper = Reaper::new(&config.repeat, observations, cooldowns);
        Some(reaper.spawn(cancel.child_token()))
    } else {
        tracing::info!("repeat feature disabled");
        None
    };

    let adapter = TelegramAdapter::connect(bot, config.telegram.clone(), Arc::new(registry))
        .await
        .context("failed to start telegram adapter")?;
    let result = Arc::new(adapter).run(cancel.clone()).await;

    cancel.cancel();
    if let Some(handle) = reaper {
        handle.stop().await;
    }
    tracing::info!("aoba stopped");
    result.context("telegram adapter failed")
}

/// An explicitly named file must exist; the default path may be absent.
fn load_config(flag: Option<PathBuf>) -> Result<AobaConfig> {
    let explicit = flag.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = match explicit {
        Some(path) => AobaConfig::from_file(&path)?,
        None => AobaConfig::from_file_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    Ok(config)
}

async fn open_store(
    url: Option<&str>,
) -> Result<(Arc<dyn ObservationStore>, Arc<dyn CooldownStore>)> {
    match url {
        Some(url) => {
            let store = PostgresRepeatStore::connect(url)
                .await
                .context("failed to connect to database")?;
            store.run_migration().await?;
            tracing::info!("using PostgreSQL repeat store");
            let store = Arc::new(store);
            let observations: Arc<dyn ObservationStore> = store.clone();
            let cooldowns: Arc<dyn CooldownStore> = store;
            Ok((observations, cooldowns))
        }
        None => {
            tracing::warn!("no database configured, repeat state is kept in memory only");
            let store = Arc::new(InMemoryRepeatStore::new());
            let observations: Arc<dyn ObservationStore> = store.clone();
            let cooldowns: Arc<dyn CooldownStore> = store;
            Ok((observations, cooldowns))
        }
    }
}
