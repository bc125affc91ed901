// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Moderation pipeline (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory, seed files)
// - `discord/` = Discord-specific adapters (commands, events, gateway)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{
    AuditSink, Counters, ModerationConfig, ModerationPorts, ModerationService, ModerationStore,
    NewRule, NgWordMatcher, RuleStore,
};
use crate::discord::moderation::message_handler;
use crate::discord::moderation::DiscordGateway;
use crate::discord::{Data, Error};
use crate::infra::moderation::seed_files::{load_ng_words, load_rule_seed};
use crate::infra::moderation::{InMemoryModerationStore, SqliteModerationStore};
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Event handler for non-command Discord events.
/// Every guild message goes through the moderation pipeline here.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        message_handler::handle_message(new_message, data).await;
    }
    Ok(())
}

/// Read an optional env var, falling back to `default` when it is unset or
/// does not parse.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn load_config() -> ModerationConfig {
    let defaults = ModerationConfig::default();
    ModerationConfig {
        spam_threshold: env_or("SPAM_THRESHOLD", defaults.spam_threshold),
        history_ttl: Duration::from_secs(env_or(
            "HISTORY_TTL_SECS",
            defaults.history_ttl.as_secs(),
        )),
        sweep_interval: Duration::from_secs(env_or(
            "HISTORY_SWEEP_SECS",
            defaults.sweep_interval.as_secs(),
        )),
        default_mute_minutes: env_or("DEFAULT_MUTE_MINUTES", defaults.default_mute_minutes),
        external_call_timeout: Duration::from_secs(env_or(
            "EXTERNAL_CALL_TIMEOUT_SECS",
            defaults.external_call_timeout.as_secs(),
        )),
    }
}

async fn seed_rules() -> anyhow::Result<Vec<NewRule>> {
    match std::env::var("RULES_SEED_FILE") {
        Ok(path) => load_rule_seed(&PathBuf::from(path)).await,
        Err(_) => Ok(NewRule::defaults()),
    }
}

async fn ng_word_matcher() -> anyhow::Result<NgWordMatcher> {
    match std::env::var("NG_WORDS_FILE") {
        Ok(path) => Ok(NgWordMatcher::new(load_ng_words(&PathBuf::from(path)).await?)),
        Err(_) => Ok(NgWordMatcher::default()),
    }
}

/// One backend seen through each of the storage ports.
struct StoreHandles {
    rules: Arc<dyn RuleStore>,
    audit: Arc<dyn AuditSink>,
    counters: Arc<dyn Counters>,
}

impl StoreHandles {
    fn from_store<S: ModerationStore + 'static>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            rules: store.clone(),
            audit: store.clone(),
            counters: store,
        }
    }
}

/// Build the store picked by `MODERATION_STORE` (`sqlite` by default).
async fn open_store(data_dir: &str) -> anyhow::Result<StoreHandles> {
    let seed = seed_rules().await?;
    let kind = std::env::var("MODERATION_STORE").unwrap_or_else(|_| "sqlite".to_string());

    match kind.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory moderation store; rules and logs reset on restart");
            Ok(StoreHandles::from_store(InMemoryModerationStore::new(seed)))
        }
        "sqlite" => {
            let store =
                SqliteModerationStore::new(&format!("{}/moderation.db", data_dir)).await?;
            store.seed_rules(&seed).await?;
            Ok(StoreHandles::from_store(store))
        }
        other => anyhow::bail!("Unknown MODERATION_STORE {:?} (expected sqlite or memory)", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").map_err(|_| {
        anyhow::anyhow!(
            "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token."
        )
    })?;
    let prefix = std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir)?;

    let config = load_config();
    tracing::info!(?config, "Moderation config loaded");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let store = open_store(&data_dir).await?;
    let ng_words = ng_word_matcher().await?;
    tracing::info!(terms = ng_words.term_count(), "Banned word list loaded");

    // REST client for moderation actions, separate from the gateway client.
    let http = Arc::new(serenity::Http::new(&token));
    let gateway = Arc::new(DiscordGateway::new(http));

    let ports = ModerationPorts {
        remover: gateway.clone(),
        notifier: gateway.clone(),
        members: gateway,
        audit: store.audit,
        counters: store.counters,
    };
    let moderation = Arc::new(ModerationService::new(store.rules, ports, ng_words, config));
    moderation.spawn_sweeper();

    // Create the data structure that will be shared across all commands
    let data = Data {
        moderation: Arc::clone(&moderation),
        prefix: prefix.clone(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            // Event handler for messages and other events
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Connected as {}", ready.user.name);

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;

    // Ctrl-C: close the gateway, then stop the pipeline's background work.
    let shard_manager = client.shard_manager.clone();
    let shutdown_service = Arc::clone(&moderation);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        tracing::info!("Shutting down");
        shard_manager.shutdown_all().await;
        shutdown_service.shutdown();
    });

    client.start().await?;
    Ok(())
}
