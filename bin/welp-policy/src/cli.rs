//! Command-line surface of the `welp-policy` sandbox.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;
use welp_core::{ClaimKind, ReactionKind};

#[derive(Parser, Debug)]
#[command(
    name = "welp-policy",
    version,
    about = "Evaluate and apply review interaction policies against a seed file"
)]
pub struct Cli {
    /// Settings file; defaults to ./welp.toml when present.
    #[arg(long, env = "WELP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed file to load (and write back after mutations). Overrides `seed.path`.
    #[arg(long)]
    pub seed: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// The caller a command runs as.
#[derive(Args, Debug, Clone)]
pub struct Actor {
    /// Signed-in user; omit to act anonymously.
    #[arg(long)]
    pub user: Option<Uuid>,

    /// Guest access token presented for the review.
    #[arg(long)]
    pub guest_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every decision (view, respond, react, claim, unclaim) for a review.
    Decide {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
    },
    Claim {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        #[arg(long, value_enum, default_value_t = ClaimKindArg::DirectClaim)]
        kind: ClaimKindArg,
    },
    Unclaim {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
    },
    /// Append a response to the review's thread.
    Respond {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        #[arg(long)]
        body: String,
    },
    Edit {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        #[arg(long)]
        response: Uuid,
        #[arg(long)]
        body: String,
    },
    /// Withdraw your own latest response.
    Withdraw {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        #[arg(long)]
        response: Uuid,
    },
    React {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        #[arg(long, value_enum)]
        kind: ReactionArg,
    },
    /// Archive and clear a thread (admins only).
    Reset {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
        /// Response that triggered the reset.
        #[arg(long)]
        trigger: Uuid,
    },
    /// Show your last response from before the latest reset.
    Archived {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
    },
    AckArchive {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
    },
    /// Print the live response thread.
    Thread {
        #[command(flatten)]
        actor: Actor,
        #[arg(long)]
        review: Uuid,
    },
    Counts {
        #[arg(long)]
        review: Uuid,
    },
}

impl Command {
    /// Whether the command changes state and the seed file must be rewritten.
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            Command::Decide { .. } | Command::Archived { .. } | Command::Thread { .. } | Command::Counts { .. }
        )
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKindArg {
    DirectClaim,
    CreditUnlock,
    SubscriptionResponse,
}

impl From<ClaimKindArg> for ClaimKind {
    fn from(arg: ClaimKindArg) -> Self {
        match arg {
            ClaimKindArg::DirectClaim => ClaimKind::DirectClaim,
            ClaimKindArg::CreditUnlock => ClaimKind::CreditUnlock,
            ClaimKindArg::SubscriptionResponse => ClaimKind::SubscriptionResponse,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionArg {
    Like,
    Funny,
    OhNo,
}

impl From<ReactionArg> for ReactionKind {
    fn from(arg: ReactionArg) -> Self {
        match arg {
            ReactionArg::Like => ReactionKind::Like,
            ReactionArg::Funny => ReactionKind::Funny,
            ReactionArg::OhNo => ReactionKind::OhNo,
        }
    }
}
