//! chainwalker CLI: walk and listen to a Signum node from the terminal.
//!
//! Usage:
//! ```bash
//! # Catch up from a height to the current tip
//! chainwalker walk --node http://localhost:8125 --from 552000
//!
//! # Follow new blocks as they are forged
//! chainwalker listen --node http://localhost:8125 --interval 2
//!
//! # Inspect or reset the stored cursor
//! chainwalker status --cache ./chainwalker.cache.json
//! chainwalker reset
//! ```

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use chainwalker::{
    handler_fn, Block, Transaction, WalkContext, Walker, WalkerBuilder, WalkerConfig, WalkerError,
};
use chainwalker_core::ledger;
use chainwalker_core::progress::{ProgressStore, DEFAULT_CACHE_FILE};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "walk" => cmd_walk(&args[2..]).await,
        "listen" => cmd_listen(&args[2..]).await,
        "sync" => cmd_sync(&args[2..]).await,
        "status" => cmd_status(&args[2..]).await,
        "reset" => cmd_reset(&args[2..]).await,
        "info" => cmd_info(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainwalker {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainwalker {}", env!("CARGO_PKG_VERSION"));
    println!("Walk and listen to the Signum blockchain\n");
    println!("USAGE:");
    println!("    chainwalker <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    walk       Process blocks from --from up to the current tip");
    println!("    listen     Poll for new blocks until Ctrl-C");
    println!("    sync       Walk to the tip, then keep listening");
    println!("    status     Print the stored cursor");
    println!("    reset      Reset the stored cursor to height 0");
    println!("    info       Print the effective configuration and the node's tip");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --node <URL>        Signum node URL  [default: http://localhost:8125]");
    println!("    --from <HEIGHT>     Start height for walk/sync");
    println!("    --config <FILE>     Load settings from a JSON file");
    println!("    --cache <PATH>      Cursor file  [default: {DEFAULT_CACHE_FILE}]");
    println!("    --memory            Keep the cursor in memory only");
    println!("    --interval <SECS>   Listen polling interval");
    println!("    --retries <N>       Retries for a failing walk cycle");
    println!("    --verbose           Trace-level logging");
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_walk(args: &[String]) -> Result<(), String> {
    let from = parse_number::<u64>(args, "--from")?;
    let walker = build_walker(args)?;
    walk_guarded(&walker, from, true)
        .await
        .map_err(|e| e.to_string())
}

async fn cmd_listen(args: &[String]) -> Result<(), String> {
    let walker = build_walker(args)?;
    walker.listen().await.map_err(|e| e.to_string())?;
    wait_for_ctrl_c().await;
    walker.stop().await;
    Ok(())
}

async fn cmd_sync(args: &[String]) -> Result<(), String> {
    let from = parse_number::<u64>(args, "--from")?;
    let walker = build_walker(args)?;
    walk_guarded(&walker, from, false)
        .await
        .map_err(|e| e.to_string())?;
    if walker.is_stop_requested() {
        return Ok(());
    }

    walker.listen().await.map_err(|e| e.to_string())?;
    wait_for_ctrl_c().await;
    walker.stop().await;
    Ok(())
}

async fn cmd_status(args: &[String]) -> Result<(), String> {
    let path = cache_path(args)?;
    if !path.exists() {
        println!("No progress recorded at {}", path.display());
        return Ok(());
    }

    let mut store = ProgressStore::file(&path);
    let record = store.read().await.map_err(|e| e.to_string())?;
    println!("Cursor file:      {}", path.display());
    println!("  Last height:    {}", record.last_confirmed_height);
    println!("  Last updated:   {}", record.last_updated.to_rfc3339());
    if record.last_error.is_empty() {
        println!("  Last error:     -");
    } else {
        println!("  Last error:     {}", record.last_error);
    }
    println!("  Owed txs:       {}", record.pending_transaction_ids.len());
    for id in &record.pending_transaction_ids {
        println!("                  {id}");
    }
    Ok(())
}

async fn cmd_reset(args: &[String]) -> Result<(), String> {
    let path = cache_path(args)?;
    let mut store = ProgressStore::file(&path);
    store.reset(true).await.map_err(|e| e.to_string())?;
    println!("Cursor reset: {}", path.display());
    Ok(())
}

async fn cmd_info(args: &[String]) -> Result<(), String> {
    let config = load_config(args)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?
    );

    let walker = WalkerBuilder::from_config(config)
        .build()
        .map_err(|e| e.to_string())?;
    let client = walker.ledger();
    match ledger::tip_height(client.as_ref()).await {
        Ok(tip) => println!("Node {} is at height {tip}", client.endpoint()),
        Err(e) => println!("{e}"),
    }
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Build a walker whose handlers print one line per dispatch.
fn build_walker(args: &[String]) -> Result<Arc<Walker>, String> {
    let config = load_config(args)?;
    let walker = WalkerBuilder::from_config(config)
        .build()
        .map_err(|e| e.to_string())?;

    walker
        .on_pending_transactions(handler_fn(|txs: Vec<Transaction>, _ctx: WalkContext| async move {
            if !txs.is_empty() {
                println!("pending     {} unconfirmed transaction(s)", txs.len());
            }
            Ok::<_, WalkerError>(())
        }))
        .on_transaction(handler_fn(|tx: Transaction, _ctx: WalkContext| async move {
            println!(
                "tx          {} type {}/{} from {}",
                tx.id,
                tx.tx_type,
                tx.subtype,
                tx.sender_rs.as_deref().or(tx.sender.as_deref()).unwrap_or("?")
            );
            Ok::<_, WalkerError>(())
        }))
        .on_block(handler_fn(|block: Block, _ctx: WalkContext| async move {
            println!(
                "block       #{} {} ({} txs)",
                block.height,
                block.id,
                block.transactions.len()
            );
            Ok::<_, WalkerError>(())
        }))
        .on_before_quit(handler_fn(|_ctx: WalkContext| async move {
            tracing::info!("bye");
            Ok::<_, WalkerError>(())
        }));

    Ok(Arc::new(walker))
}

/// Defaults, then `--config`, then individual flags.
fn load_config(args: &[String]) -> Result<WalkerConfig, String> {
    let mut config = match parse_flag(args, "--config") {
        Some(file) => WalkerConfig::from_json_file(file).map_err(|e| e.to_string())?,
        None => WalkerConfig::default(),
    };

    if let Some(node) = parse_flag(args, "--node") {
        config.node_host = node;
    }
    if let Some(path) = parse_flag(args, "--cache") {
        config.cache_path = Some(PathBuf::from(path));
    }
    if has_flag(args, "--memory") {
        config.cache_path = None;
    }
    if let Some(secs) = parse_number::<u64>(args, "--interval")? {
        config.poll_interval_ms = secs.saturating_mul(1_000);
    }
    if let Some(retries) = parse_number::<u32>(args, "--retries")? {
        config.max_retries = retries;
    }
    if has_flag(args, "--verbose") {
        config.verbose = true;
    }
    Ok(config)
}

fn cache_path(args: &[String]) -> Result<PathBuf, String> {
    let config = load_config(args)?;
    config
        .cache_file()
        .ok_or_else(|| "no cursor file configured".to_string())
}

/// Walk with Ctrl-C wired to `stop`.
///
/// The walker is stopped afterwards when `stop_after` is set, when the walk
/// failed, or when Ctrl-C arrived. Otherwise it stays usable for `listen`.
async fn walk_guarded(
    walker: &Arc<Walker>,
    from: Option<u64>,
    stop_after: bool,
) -> Result<(), WalkerError> {
    let watcher = stop_on_ctrl_c(walker.clone());
    let result = walker.walk(from).await;
    watcher.abort();
    if stop_after || result.is_err() || walker.is_stop_requested() {
        walker.stop().await;
    }
    result
}

fn stop_on_ctrl_c(walker: Arc<Walker>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if wait_for_ctrl_c().await {
            walker.stop().await;
        }
    })
}

/// Returns `false` if the signal handler could not be installed.
async fn wait_for_ctrl_c() -> bool {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        return false;
    }
    tracing::info!("Ctrl-C received");
    true
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_number<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, String> {
    match parse_flag(args, flag) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("{flag} expects a number, got '{raw}'")),
        None => Ok(None),
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
