//! Terminal walkthrough of an atomic fee-covering group.
//!
//! Deploys the counter application on an in-process sandbox ledger, then
//! has a brand-new account with zero balance call it, while the funded
//! creator pays both fees in the same atomic group. Finishes by showing
//! that a signature taken before grouping is refused. The output uses ANSI
//! escape codes for colored terminal rendering.
//!
//! Run with:
//!   cargo run -p txgroup-protocol --example demo

use std::sync::Arc;
use std::time::{Duration, Instant};

use txgroup_protocol::crypto::{Address, Keypair};
use txgroup_protocol::network::{
    ConfirmationResult, LedgerClient, ProgramCompiler, SandboxConfig, SandboxLedger, Submitter,
};
use txgroup_protocol::transaction::{
    assemble, sign, AtomicComposer, Authority, FeeRole, SignedTransaction, StateSchema,
    TransactionBuilder,
};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    TXGROUP  --  Atomic Fee-Covering Group Demo                     {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn refused(text: &str) {
    println!("{RED}  [REFUSED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn address_display(name: &str, addr: &Address, color: &str) {
    let text = addr.to_string();
    let prefix = &text[..10];
    let suffix = &text[text.len().saturating_sub(8)..];
    println!("  {color}{BOLD}{name}{RESET}  {DIM}{prefix}...{suffix}{RESET}");
}

fn balance_row(name: &str, balance: u64, color: &str) {
    println!("  {color}{BOLD}{name:<12}{RESET}  {WHITE}{balance:>12}{RESET} {DIM}micro-units{RESET}");
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let demo_start = Instant::now();
    banner();

    let ledger = Arc::new(SandboxLedger::new(SandboxConfig {
        round_time: Duration::from_millis(200),
        ..SandboxConfig::default()
    }));
    let submitter = Submitter::new(ledger.clone());

    // -----------------------------------------------------------------------
    // Step 1: Accounts
    // -----------------------------------------------------------------------

    section(1, "Accounts");
    let creator = Keypair::generate();
    let caller = Keypair::generate();
    ledger.fund(&creator.address(), 10_000_000);

    address_display("Creator", &creator.address(), BLUE);
    address_display("Caller ", &caller.address(), MAGENTA);
    println!();
    balance_row("Creator", ledger.balance(&creator.address()), BLUE);
    balance_row("Caller", ledger.balance(&caller.address()), MAGENTA);

    // -----------------------------------------------------------------------
    // Step 2: Deploy
    // -----------------------------------------------------------------------

    section(2, "Deploy the counter application");
    subsection("Compiling approval and clear-state programs...");
    let approval = ledger
        .compile("#pragma version 6\ntxna ApplicationArgs 0\n")
        .await
        .expect("approval program compiles");
    let clear = ledger
        .compile("#pragma version 6\nint 1\n")
        .await
        .expect("clear program compiles");

    let params = ledger.suggested_params().await.expect("suggested params");
    let create = TransactionBuilder::app_create(creator.address(), approval, clear)
        .global_schema(StateSchema::new(1, 0))
        .build(&params)
        .expect("valid app create");
    let create = sign(create, &Authority::SimpleKey(creator.clone())).expect("signed");

    let t = Instant::now();
    let app_id = match submitter.submit_and_wait(&[create], 10).await {
        Ok(ConfirmationResult::Confirmed { round, effects }) => {
            info("Confirmed round", &round.to_string());
            effects.created_app_id.expect("app id reported")
        }
        other => panic!("deployment failed: {:?}", other),
    };
    timing("deploy + confirm", t.elapsed());
    info("App id", &app_id.to_string());
    success("Counter deployed");

    // -----------------------------------------------------------------------
    // Step 3: Atomic group
    // -----------------------------------------------------------------------

    section(3, "Unfunded call, fee covered by the creator");
    let params = ledger.suggested_params().await.expect("suggested params");
    let call = TransactionBuilder::app_call(caller.address(), app_id)
        .app_arg(b"Add".to_vec())
        .fee_role(FeeRole::Dependent)
        .build(&params)
        .expect("valid app call");
    let payment = TransactionBuilder::payment(creator.address(), caller.address(), 1_000_000)
        .fee_role(FeeRole::Payer { covers: 1 })
        .build(&params)
        .expect("valid payment");
    info("Call fee", &call.fee.to_string());
    info("Payment fee", &payment.fee.to_string());

    let t = Instant::now();
    let signed = AtomicComposer::new()
        .add(call.clone(), Authority::SimpleKey(caller.clone()))
        .add(payment.clone(), Authority::SimpleKey(creator.clone()))
        .build(params.min_fee)
        .expect("group composes");
    timing("fee check + assemble + sign", t.elapsed());
    if let Some(group) = signed[0].transaction().group {
        info("Group id", &group.to_string()[..16]);
    }

    let result = submitter
        .submit_and_wait(&signed, 10)
        .await
        .expect("group submits");
    assert!(result.is_confirmed(), "group did not confirm: {:?}", result);
    let state = ledger
        .application_state(app_id)
        .await
        .expect("application exists");
    info(
        "Counter",
        &state.global_uint("count").unwrap_or_default().to_string(),
    );
    println!();
    balance_row("Creator", ledger.balance(&creator.address()), BLUE);
    balance_row("Caller", ledger.balance(&caller.address()), MAGENTA);
    success("Both members committed together");

    // -----------------------------------------------------------------------
    // Step 4: Signing too early
    // -----------------------------------------------------------------------

    section(4, "Signatures taken before grouping");
    subsection("Signing each member alone, then splicing in the group id...");
    let params = ledger.suggested_params().await.expect("suggested params");
    let call = TransactionBuilder::app_call(caller.address(), app_id)
        .app_arg(b"Add".to_vec())
        .fee_role(FeeRole::Dependent)
        .build(&params)
        .expect("valid app call");
    let payment = TransactionBuilder::payment(creator.address(), caller.address(), 1)
        .fee_role(FeeRole::Payer { covers: 1 })
        .build(&params)
        .expect("valid payment");
    let early = [
        sign(call.clone(), &Authority::SimpleKey(caller)).expect("signed"),
        sign(payment.clone(), &Authority::SimpleKey(creator)).expect("signed"),
    ];
    let spliced: Vec<SignedTransaction> = assemble(vec![call, payment])
        .expect("assembles")
        .into_members()
        .into_iter()
        .zip(early)
        .map(|(tx, stx)| SignedTransaction::from_parts(tx, stx.into_parts().1))
        .collect();

    match submitter.submit(&spliced).await {
        Err(e) => refused(&e.to_string()),
        Ok(handle) => panic!("ledger accepted stale proofs: {}", handle.tracked()),
    }
    success("Ledger refused the group; the counter is unchanged");

    println!();
    timing("total", demo_start.elapsed());
}
