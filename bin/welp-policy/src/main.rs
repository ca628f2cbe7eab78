//! # welp-policy
//!
//! The entry point that assembles the policy engine on top of the in-memory
//! store and runs one command against a seed file.

mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{Actor, Cli, Command};
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use welp_config::{LogSettings, Settings};
use welp_core::{ContentId, PolicyEngine, PolicyError, Principal, ResponseId, UserId};
use welp_store_memory::{MemoryStore, OutboxNotifier, Seed};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    welp_config::load_env_file();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    init_tracing(&settings.log);

    let seed_path = cli.seed.clone().unwrap_or_else(|| settings.seed.path.clone());
    let seed = if seed_path.exists() {
        Seed::read(&seed_path)?
    } else {
        tracing::warn!(path = %seed_path.display(), "seed file not found, starting empty");
        Seed::default()
    };

    // 1. Initialize the store (it serves as both repo and entitlement lookup)
    let store = Arc::new(MemoryStore::from_seed(seed));
    let notifier = Arc::new(OutboxNotifier::new());

    // 2. Assemble the engine
    let engine = PolicyEngine::new(store.clone(), store.clone(), notifier.clone(), settings.engine.engine_config());

    let mutates = cli.command.mutates();
    match run(&engine, &store, cli.command).await {
        Ok(output) => {
            print_json(&output)?;
            for notification in notifier.drain() {
                tracing::info!(?notification, "would notify");
            }
            if mutates {
                store.to_seed().write(&seed_path)?;
                tracing::debug!(path = %seed_path.display(), "seed written back");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => match err.downcast::<PolicyError>() {
            Ok(policy) => {
                print_json(&json!({
                    "error": policy.code(),
                    "message": policy.to_string(),
                    "retry": policy.retry_hint(),
                }))?;
                Ok(ExitCode::from(2))
            }
            Err(other) => Err(other),
        },
    }
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn principal(store: &MemoryStore, actor: Actor) -> anyhow::Result<Principal> {
    let user = match actor.user {
        Some(id) => match store.user(UserId(id)) {
            Some(user) => Some(user),
            None => bail!("unknown user {id}"),
        },
        None => None,
    };
    Ok(Principal { user, guest_token: actor.guest_token })
}

async fn run(engine: &PolicyEngine, store: &MemoryStore, command: Command) -> anyhow::Result<serde_json::Value> {
    let output = match command {
        Command::Decide { actor, review } => {
            let decision = engine.decide(&principal(store, actor)?, ContentId(review)).await?;
            serde_json::to_value(decision)?
        }
        Command::Claim { actor, review, kind } => {
            let state = engine.claim(&principal(store, actor)?, ContentId(review), kind.into()).await?;
            serde_json::to_value(state)?
        }
        Command::Unclaim { actor, review } => {
            engine.unclaim(&principal(store, actor)?, ContentId(review)).await?;
            json!({ "state": "unclaimed" })
        }
        Command::Respond { actor, review, body } => {
            let response = engine.append_response(&principal(store, actor)?, ContentId(review), &body).await?;
            serde_json::to_value(response)?
        }
        Command::Edit { actor, review, response, body } => {
            let edited = engine
                .edit_response(&principal(store, actor)?, ContentId(review), ResponseId(response), &body)
                .await?;
            serde_json::to_value(edited)?
        }
        Command::Withdraw { actor, review, response } => {
            let removed = engine
                .withdraw_response(&principal(store, actor)?, ContentId(review), ResponseId(response))
                .await?;
            serde_json::to_value(removed)?
        }
        Command::React { actor, review, kind } => {
            let outcome = engine.toggle_reaction(&principal(store, actor)?, ContentId(review), kind.into()).await?;
            serde_json::to_value(outcome)?
        }
        Command::Reset { actor, review, trigger } => {
            let archive = engine
                .reset_thread(&principal(store, actor)?, ContentId(review), ResponseId(trigger))
                .await?;
            serde_json::to_value(archive)?
        }
        Command::Archived { actor, review } => {
            let response = engine.get_archived_response(&principal(store, actor)?, ContentId(review)).await?;
            serde_json::to_value(response)?
        }
        Command::AckArchive { actor, review } => {
            let cleared = engine.acknowledge_archive(&principal(store, actor)?, ContentId(review)).await?;
            json!({ "cleared": cleared })
        }
        Command::Thread { actor, review } => {
            let thread = engine.thread(&principal(store, actor)?, ContentId(review)).await?;
            serde_json::to_value(thread)?
        }
        Command::Counts { review } => serde_json::to_value(engine.reaction_counts(ContentId(review)).await?)?,
    };
    Ok(output)
}
