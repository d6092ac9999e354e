// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # txgroup
//!
//! Entry point for the `txgroup` binary. Loads `.env`, parses arguments,
//! initializes logging, connects to a node (or spins up a sandbox ledger)
//! and runs one subcommand:
//!
//! - `deploy`       compile and create the counter application
//! - `increment`    atomic pair: unfunded app call + fee-covering payment
//! - `create-asset` create a test asset
//! - `opt-in`       opt an account in to an asset
//! - `state`        print an application's global state
//! - `keygen`       generate a keypair
//! - `version`      print version information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use txgroup_protocol::crypto::{Address, Keypair};
use txgroup_protocol::network::{
    ConfirmationEffects, ConfirmationResult, HttpLedgerClient, LedgerClient, ProgramCompiler,
    SandboxConfig, SandboxLedger, Submitter, TealValue,
};
use txgroup_protocol::transaction::{
    sign, AssetParams, AtomicComposer, Authority, FeeRole, StateSchema, TransactionBuilder,
    UnsignedTransaction,
};

use cli::{Commands, LedgerArgs, TxGroupCli};
use logging::LogFormat;

/// Round length of the `--sandbox` ledger. Short, since nobody else is
/// producing blocks.
const SANDBOX_ROUND_TIME: Duration = Duration::from_millis(250);

/// Balance given to generated sandbox accounts.
const SANDBOX_FUNDING: u64 = 100_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = TxGroupCli::parse();
    logging::init_logging(
        logging::DEFAULT_DIRECTIVE,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    match cli.command {
        Commands::Keygen => {
            keygen();
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
        command => {
            let backend = Backend::connect(&cli.ledger)?;
            run(&backend, command).await
        }
    }
}

async fn run(backend: &Backend, command: Commands) -> Result<()> {
    match command {
        Commands::Deploy(args) => {
            let creator = backend.account(args.creator_seed.as_deref(), "CREATOR_SEED")?;
            let app_id = deploy_counter(
                backend,
                &creator,
                &args.programs,
                StateSchema::new(args.global_ints, args.global_bytes),
                args.max_rounds,
            )
            .await?;
            println!("Deployed app id: {}", app_id);
            Ok(())
        }
        Commands::Increment(args) => increment(backend, args).await,
        Commands::CreateAsset(args) => create_asset(backend, args).await,
        Commands::OptIn(args) => opt_in(backend, args).await,
        Commands::State(args) => print_global_state(backend, args.app_id).await,
        Commands::Keygen | Commands::Version => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The ledger connection for one invocation.
struct Backend {
    client: Arc<dyn LedgerClient>,
    compiler: Arc<dyn ProgramCompiler>,
    sandbox: Option<Arc<SandboxLedger>>,
    submitter: Submitter,
}

impl Backend {
    fn connect(args: &LedgerArgs) -> Result<Self> {
        if args.sandbox {
            let sandbox = Arc::new(SandboxLedger::new(SandboxConfig {
                round_time: SANDBOX_ROUND_TIME,
                ..SandboxConfig::default()
            }));
            tracing::info!("using in-process sandbox ledger");
            return Ok(Self {
                client: sandbox.clone(),
                compiler: sandbox.clone(),
                submitter: Submitter::new(sandbox.clone()),
                sandbox: Some(sandbox),
            });
        }

        let http = Arc::new(
            HttpLedgerClient::new(&args.server, args.port, &args.token)
                .context("failed to create ledger client")?,
        );
        tracing::info!(url = %http.base_url(), "using ledger node");
        Ok(Self {
            client: http.clone(),
            compiler: http.clone(),
            submitter: Submitter::new(http),
            sandbox: None,
        })
    }

    /// Loads an account from a hex seed. In sandbox mode a missing seed
    /// yields a fresh, funded account.
    fn account(&self, seed: Option<&str>, env_name: &str) -> Result<Keypair> {
        let keypair = match (seed, &self.sandbox) {
            (Some(seed), _) => {
                Keypair::from_hex(seed).with_context(|| format!("invalid {}", env_name))?
            }
            (None, Some(_)) => Keypair::generate(),
            (None, None) => bail!("missing account: set {} or pass its flag", env_name),
        };
        if let Some(sandbox) = &self.sandbox {
            sandbox.fund(&keypair.address(), SANDBOX_FUNDING);
        }
        Ok(keypair)
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read program source {}", path.display()))
}

/// Submits a single transaction signed by `owner` and waits for it.
async fn submit_single(
    backend: &Backend,
    tx: UnsignedTransaction,
    owner: &Keypair,
    max_rounds: u64,
) -> Result<ConfirmationEffects> {
    let stx = sign(tx, &Authority::SimpleKey(owner.clone()))?;
    let result = backend.submitter.submit_and_wait(&[stx], max_rounds).await?;
    confirmed_effects(result, max_rounds)
}

fn confirmed_effects(result: ConfirmationResult, max_rounds: u64) -> Result<ConfirmationEffects> {
    match result {
        ConfirmationResult::Confirmed { round, effects } => {
            println!("Confirmed in round {}", round);
            Ok(effects)
        }
        ConfirmationResult::Rejected { reason } => bail!("rejected by ledger: {}", reason),
        ConfirmationResult::TimedOut { last_round } => bail!(
            "not confirmed within {} rounds (last round seen: {})",
            max_rounds,
            last_round.map_or_else(|| "none".to_string(), |r| r.to_string())
        ),
    }
}

async fn deploy_counter(
    backend: &Backend,
    creator: &Keypair,
    programs: &cli::ProgramArgs,
    global_schema: StateSchema,
    max_rounds: u64,
) -> Result<u64> {
    let approval = backend
        .compiler
        .compile(&read_source(&programs.approval).await?)
        .await
        .context("failed to compile approval program")?;
    let clear = backend
        .compiler
        .compile(&read_source(&programs.clear).await?)
        .await
        .context("failed to compile clear-state program")?;

    let params = backend
        .client
        .suggested_params()
        .await
        .context("failed to fetch suggested parameters")?;
    let tx = TransactionBuilder::app_create(creator.address(), approval, clear)
        .global_schema(global_schema)
        .build(&params)?;

    let effects = submit_single(backend, tx, creator, max_rounds).await?;
    effects
        .created_app_id
        .context("confirmation did not report a created application")
}

async fn increment(backend: &Backend, args: cli::IncrementArgs) -> Result<()> {
    let creator = backend.account(args.creator_seed.as_deref(), "CREATOR_SEED")?;
    let receiver = match args.receiver_seed.as_deref() {
        Some(seed) => Keypair::from_hex(seed).context("invalid ACC1_SEED")?.address(),
        None => Keypair::generate().address(),
    };

    let app_id = match args.app_id {
        Some(id) => id,
        None => {
            let id = deploy_counter(
                backend,
                &creator,
                &args.programs,
                StateSchema::new(1, 0),
                args.max_rounds,
            )
            .await?;
            println!("Deployed app id: {}", id);
            id
        }
    };

    // Never funded: its fee is covered by the creator's payment.
    let sender = Keypair::generate();
    println!("Sender: {}", sender.address());

    let params = backend
        .client
        .suggested_params()
        .await
        .context("failed to fetch suggested parameters")?;

    let call = TransactionBuilder::app_call(sender.address(), app_id)
        .app_arg(args.method.into_bytes())
        .fee_role(FeeRole::Dependent)
        .build(&params)?;
    let payment = TransactionBuilder::payment(creator.address(), receiver, args.amount)
        .fee_role(FeeRole::Payer { covers: 1 })
        .build(&params)?;

    let signed = AtomicComposer::new()
        .add(call, Authority::SimpleKey(sender))
        .add(payment, Authority::SimpleKey(creator))
        .build(params.min_fee)?;
    if let Some(group) = signed[0].transaction().group {
        println!("Group id: {}", group);
    }

    let result = backend
        .submitter
        .submit_and_wait(&signed, args.max_rounds)
        .await?;
    let effects = confirmed_effects(result, args.max_rounds)?;
    for delta in &effects.global_state_delta {
        tracing::debug!(key = delta.key(), "global state changed");
    }

    print_global_state(backend, app_id).await
}

async fn create_asset(backend: &Backend, args: cli::CreateAssetArgs) -> Result<()> {
    let creator = backend.account(args.creator_seed.as_deref(), "CREATOR_SEED")?;
    let owner = Some(creator.address());
    let params = backend.client.suggested_params().await?;

    let tx = TransactionBuilder::asset_create(
        creator.address(),
        AssetParams {
            total: args.total,
            decimals: args.decimals,
            default_frozen: false,
            unit_name: args.unit_name,
            asset_name: args.asset_name,
            url: args.url,
            metadata_hash: None,
            manager: owner,
            reserve: owner,
            freeze: owner,
            clawback: owner,
        },
    )
    .build(&params)?;

    let effects = submit_single(backend, tx, &creator, args.max_rounds).await?;
    let asset_id = effects
        .created_asset_id
        .context("confirmation did not report a created asset")?;
    println!("Created asset id: {}", asset_id);
    Ok(())
}

async fn opt_in(backend: &Backend, args: cli::OptInArgs) -> Result<()> {
    let account = backend.account(args.account_seed.as_deref(), "ACC1_SEED")?;
    let params = backend.client.suggested_params().await?;
    let tx = TransactionBuilder::asset_opt_in(account.address(), args.asset_id).build(&params)?;
    submit_single(backend, tx, &account, args.max_rounds).await?;
    println!("{} opted in to asset {}", account.address(), args.asset_id);
    Ok(())
}

async fn print_global_state(backend: &Backend, app_id: u64) -> Result<()> {
    let state = backend
        .client
        .application_state(app_id)
        .await
        .with_context(|| format!("failed to read application {}", app_id))?;

    println!("Application {} (creator {})", state.app_id, state.creator);
    if state.global_state.is_empty() {
        println!("  (no global state)");
    }
    for (key, value) in &state.global_state {
        match value {
            TealValue::Uint(v) => println!("  {} = {}", key, v),
            TealValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => println!("  {} = \"{}\"", key, s),
                Err(_) => println!("  {} = 0x{}", key, hex::encode(b)),
            },
        }
    }
    tracing::debug!(state = %serde_json::to_string(&state)?, "global state");
    Ok(())
}

fn keygen() {
    let keypair = Keypair::generate();
    let address: Address = keypair.address();
    println!("Address : {}", address);
    println!("Seed    : {}", hex::encode(keypair.secret_key_bytes()));
}

fn print_version() {
    println!("txgroup {}", env!("CARGO_PKG_VERSION"));
    println!("rustc   {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
