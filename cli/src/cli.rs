//! # CLI Interface
//!
//! Argument structure for `txgroup`, via `clap` derive. Connection and
//! account secrets fall back to environment variables, which `main` loads
//! from a `.env` file first:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `LEDGER_SERVER` | Node URL including scheme |
//! | `LEDGER_PORT` | Node port |
//! | `LEDGER_TOKEN` | Node API token |
//! | `CREATOR_SEED` | Hex seed of the funded creator account |
//! | `ACC1_SEED` | Hex seed of the second account |
//! | `APP_ID` | Existing counter application to reuse |

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use txgroup_protocol::config::DEFAULT_CONFIRMATION_ROUNDS;

/// Build and submit atomic transaction groups.
#[derive(Parser, Debug)]
#[command(
    name = "txgroup",
    about = "Build and submit atomic transaction groups",
    version,
    propagate_version = true
)]
pub struct TxGroupCli {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Log format: `pretty` or `json`.
    #[arg(long, global = true, env = "TXGROUP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach the ledger.
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Node URL, including scheme. The node must accept this tool's
    /// canonical group encoding; stock nodes expect msgpack.
    #[arg(long, global = true, env = "LEDGER_SERVER", default_value = "http://localhost")]
    pub server: String,

    /// Node port. Omit when the URL already carries one.
    #[arg(long, global = true, env = "LEDGER_PORT")]
    pub port: Option<u16>,

    /// Node API token.
    #[arg(
        long,
        global = true,
        env = "LEDGER_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub token: String,

    /// Run against an in-process sandbox ledger instead of a node. Missing
    /// accounts are generated and funded.
    #[arg(long, global = true)]
    pub sandbox: bool,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile and deploy the counter application.
    Deploy(DeployArgs),
    /// Call the counter from a fresh unfunded account, with the creator
    /// paying both fees in the same atomic group.
    Increment(IncrementArgs),
    /// Create a test asset owned by the creator.
    CreateAsset(CreateAssetArgs),
    /// Opt the second account in to an asset.
    OptIn(OptInArgs),
    /// Print an application's global state.
    State(StateArgs),
    /// Generate a keypair and print its address and seed.
    Keygen,
    /// Print version information and exit.
    Version,
}

/// Counter program sources.
#[derive(Args, Debug, Clone)]
pub struct ProgramArgs {
    /// Approval program source.
    #[arg(long, default_value = "artifacts/sc_approval.teal")]
    pub approval: PathBuf,

    /// Clear-state program source.
    #[arg(long, default_value = "artifacts/sc_clearstate.teal")]
    pub clear: PathBuf,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Hex seed of the creator account.
    #[arg(long, env = "CREATOR_SEED", hide_env_values = true)]
    pub creator_seed: Option<String>,

    #[command(flatten)]
    pub programs: ProgramArgs,

    /// Global uint slots.
    #[arg(long, default_value_t = 1)]
    pub global_ints: u64,

    /// Global byte-slice slots.
    #[arg(long, default_value_t = 0)]
    pub global_bytes: u64,

    /// Rounds to wait for confirmation.
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_ROUNDS)]
    pub max_rounds: u64,
}

#[derive(Args, Debug)]
pub struct IncrementArgs {
    #[arg(long, env = "CREATOR_SEED", hide_env_values = true)]
    pub creator_seed: Option<String>,

    /// Hex seed of the payment receiver. A fresh account when omitted.
    #[arg(long, env = "ACC1_SEED", hide_env_values = true)]
    pub receiver_seed: Option<String>,

    /// Counter application to call. Deployed first when omitted.
    #[arg(long, env = "APP_ID")]
    pub app_id: Option<u64>,

    #[command(flatten)]
    pub programs: ProgramArgs,

    /// Application method argument.
    #[arg(long, default_value = "Add")]
    pub method: String,

    /// Payment amount in micro-units.
    #[arg(long, default_value_t = 1_000_000)]
    pub amount: u64,

    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_ROUNDS)]
    pub max_rounds: u64,
}

#[derive(Args, Debug)]
pub struct CreateAssetArgs {
    #[arg(long, env = "CREATOR_SEED", hide_env_values = true)]
    pub creator_seed: Option<String>,

    #[arg(long, default_value_t = 1_000_000)]
    pub total: u64,

    #[arg(long, default_value_t = 0)]
    pub decimals: u32,

    #[arg(long, default_value = "TA")]
    pub unit_name: String,

    #[arg(long, default_value = "TESTASSET")]
    pub asset_name: String,

    #[arg(long, default_value = "website")]
    pub url: String,

    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_ROUNDS)]
    pub max_rounds: u64,
}

#[derive(Args, Debug)]
pub struct OptInArgs {
    #[arg(long, env = "ACC1_SEED", hide_env_values = true)]
    pub account_seed: Option<String>,

    /// Asset to opt in to.
    #[arg(long)]
    pub asset_id: u64,

    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_ROUNDS)]
    pub max_rounds: u64,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    #[arg(long, env = "APP_ID")]
    pub app_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TxGroupCli::command().debug_assert();
    }

    #[test]
    fn increment_defaults() {
        let cli = TxGroupCli::try_parse_from([
            "txgroup",
            "--sandbox",
            "increment",
            "--app-id",
            "12",
        ])
        .unwrap();
        assert!(cli.ledger.sandbox);
        match cli.command {
            Commands::Increment(args) => {
                assert_eq!(args.app_id, Some(12));
                assert_eq!(args.method, "Add");
                assert_eq!(args.amount, 1_000_000);
                assert_eq!(args.max_rounds, DEFAULT_CONFIRMATION_ROUNDS);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = TxGroupCli::try_parse_from(["txgroup", "state", "--app-id", "3", "--port", "4001"])
            .unwrap();
        assert_eq!(cli.ledger.port, Some(4001));
    }
}
