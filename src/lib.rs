pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::notify::Notifier;
use crate::core::session::{SessionRegistry, UserId};
use crate::core::{ConversionEngine, RateCache};
use crate::providers::{CbuRateSource, LogNotifier, TelegramNotifier};
use crate::store::DiskSubscriberStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

pub enum AppCommand {
    Rates,
    Convert {
        amount: String,
        from: String,
        to: Vec<String>,
    },
    Session,
    Serve,
    Subscribe(UserId),
    Unsubscribe(UserId),
    Subscribers,
}

/// Wires the CBU source, the shared cache and the engine from configuration.
pub fn build_engine(config: &AppConfig) -> ConversionEngine {
    let cbu = &config.providers.cbu;
    let source = CbuRateSource::new(&cbu.base_url, Duration::from_secs(cbu.timeout_secs));
    ConversionEngine::new(RateCache::new(Arc::new(source), config.cache.policy()))
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    match &config.telegram.bot_token {
        Some(token) => {
            info!("Daily digest goes to Telegram");
            Ok(Arc::new(TelegramNotifier::new(
                &config.telegram.api_url,
                token,
                TELEGRAM_TIMEOUT,
            )?))
        }
        None => {
            info!("No Telegram token configured, daily digest goes to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<DiskSubscriberStore>> {
    Ok(Arc::new(DiskSubscriberStore::open(&config.data_path()?)?))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(?config_path, "Loaded config");

    let timezone = config.notification.timezone()?;
    match command {
        AppCommand::Rates => cli::rates::run(&build_engine(&config), timezone).await,
        AppCommand::Convert { amount, from, to } => {
            cli::convert::run(
                &build_engine(&config),
                config.session.limits(),
                timezone,
                &amount,
                &from,
                &to,
            )
            .await
        }
        AppCommand::Session => {
            let registry =
                SessionRegistry::new(config.session.limits(), config.session.idle_timeout());
            cli::session::run(&build_engine(&config), &registry).await
        }
        AppCommand::Serve => {
            let store = open_store(&config)?;
            let notifier = build_notifier(&config)?;
            cli::serve::run(&config, build_engine(&config), store, notifier).await
        }
        AppCommand::Subscribe(user) => {
            cli::subscribers::subscribe(&*open_store(&config)?, user).await
        }
        AppCommand::Unsubscribe(user) => {
            cli::subscribers::unsubscribe(&*open_store(&config)?, user).await
        }
        AppCommand::Subscribers => cli::subscribers::list(&*open_store(&config)?).await,
    }
}
