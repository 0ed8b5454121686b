mod common;

use std::sync::Arc;
use std::time::Duration;

use chainwalker::{handler_fn, Block, WalkContext, Walker, WalkerBuilder, WalkerError, WalkerState};
use common::{Recorder, Shared, TIP};

fn memory_walker(ledger: Arc<chainwalker::MockLedger>) -> Walker {
    WalkerBuilder::new()
        .memory_only()
        .retry_backoff_ms(10)
        .poll_interval_ms(1_000)
        .ledger(ledger)
        .build()
        .unwrap()
}

// ─── walk ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn walk_delivers_every_block_up_to_tip() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker.on_block(Shared(rec.clone()));

    walker.walk(Some(552090)).await.unwrap();

    assert_eq!(
        rec.calls_of("block"),
        ["552091", "552092", "552093", "552094", "552095", "552096"]
    );
    assert_eq!(walker.progress().await.last_confirmed_height, TIP);
    assert_eq!(walker.state(), WalkerState::Idle);
}

#[tokio::test]
async fn walk_at_tip_dispatches_nothing() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker.on_block(Shared(rec.clone()));

    walker.walk(Some(TIP)).await.unwrap();

    assert!(rec.calls().is_empty());
}

#[tokio::test]
async fn transactions_are_delivered_newest_first() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker.on_transaction(Shared(rec.clone()));

    walker.walk(Some(552095)).await.unwrap();

    assert_eq!(
        rec.calls_of("tx"),
        [
            "7662865350688097936",
            "8814437006846802213",
            "106950754532245231",
            "17251203728311469714",
            "8795182883781041709",
            "10223472264931791821",
        ]
    );
}

#[tokio::test]
async fn equal_timestamps_keep_node_order() {
    let ledger = common::ledger();
    ledger.set_tip(Some(552094));
    let walker = memory_walker(ledger);
    let rec = Recorder::new();
    walker.on_transaction(Shared(rec.clone()));

    walker.walk(Some(552092)).await.unwrap();

    assert_eq!(
        rec.calls_of("tx"),
        [
            "12138612333627809376",
            "558973604337360685",
            "263011623990690313",
            "1649891197739725755",
        ]
    );
}

#[tokio::test]
async fn handler_order_within_a_block() {
    let ledger = common::ledger();
    ledger.set_tip(Some(552092));
    let walker = memory_walker(ledger);
    let rec = Recorder::new();
    walker
        .on_pending_transactions(Shared(rec.clone()))
        .on_transaction(Shared(rec.clone()))
        .on_block(Shared(rec.clone()));

    walker.walk(Some(552091)).await.unwrap();

    assert_eq!(
        rec.calls(),
        ["pending:1", "tx:15735764943213866385", "block:552092"]
    );
}

#[tokio::test]
async fn block_handler_sees_full_transaction_list() {
    let ledger = common::ledger();
    let walker = memory_walker(ledger);
    let sizes = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = sizes.clone();
    walker.on_block(handler_fn(move |block: Block, _ctx: WalkContext| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push((block.height, block.transactions.len()));
            Ok::<_, WalkerError>(())
        }
    }));

    walker.walk(Some(552092)).await.unwrap();

    assert_eq!(
        *sizes.lock().unwrap(),
        [(552093u64, 4usize), (552094, 0), (552095, 0), (552096, 6)]
    );
}

#[tokio::test]
async fn walk_resumes_from_durable_cursor() {
    let cache = common::temp_cache("resume/chainwalker.cache.json");

    let ledger = common::ledger();
    ledger.set_tip(Some(552093));
    let first = WalkerBuilder::new()
        .cache_path(&cache)
        .ledger(ledger.clone())
        .build()
        .unwrap();
    let rec = Recorder::new();
    first.on_block(Shared(rec.clone()));
    first.walk(Some(552090)).await.unwrap();
    assert_eq!(rec.calls_of("block"), ["552091", "552092", "552093"]);

    // A fresh walker on the same file continues after 552093 even though an
    // older start height is requested.
    ledger.set_tip(None);
    let second = WalkerBuilder::new()
        .cache_path(&cache)
        .ledger(ledger)
        .build()
        .unwrap();
    let rec = Recorder::new();
    second.on_block(Shared(rec.clone()));
    second.walk(Some(552090)).await.unwrap();
    assert_eq!(rec.calls_of("block"), ["552094", "552095", "552096"]);

    let text = std::fs::read_to_string(&cache).unwrap();
    assert!(text.contains("\n\t\"lastConfirmedHeight\": 552096"));
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["lastError"], "");
    assert!(json["pendingTransactionIds"].as_object().unwrap().is_empty());
    assert!(json["lastUpdated"].is_string());
}

#[tokio::test]
async fn corrupt_cursor_file_fails_walk_and_listen_before_any_dispatch() {
    let cache = common::temp_cache("corrupt/chainwalker.cache.json");
    std::fs::create_dir_all(cache.parent().unwrap()).unwrap();
    std::fs::write(&cache, "not json").unwrap();

    let walker = WalkerBuilder::new()
        .cache_path(&cache)
        .retry_backoff_ms(10)
        .ledger(common::ledger())
        .build()
        .unwrap();
    let rec = Recorder::new();
    walker
        .on_pending_transactions(Shared(rec.clone()))
        .on_transaction(Shared(rec.clone()))
        .on_block(Shared(rec.clone()));

    let err = walker.walk(Some(552090)).await.unwrap_err();
    assert!(matches!(err, WalkerError::Storage(_)), "{err}");
    assert_eq!(walker.state(), WalkerState::Idle);

    let err = walker.listen().await.unwrap_err();
    assert!(matches!(err, WalkerError::Storage(_)), "{err}");
    assert_eq!(walker.state(), WalkerState::Idle);

    assert!(rec.calls().is_empty());
    assert_eq!(std::fs::read_to_string(&cache).unwrap(), "not json");
}

#[tokio::test]
async fn repeated_walk_continues_from_cursor() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker.on_block(Shared(rec.clone()));

    walker.walk(Some(552090)).await.unwrap();
    let before = rec.calls().len();
    walker.walk(Some(552090)).await.unwrap();

    assert_eq!(rec.calls().len(), before);
}

#[tokio::test]
async fn walk_from_genesis_on_sparse_ledger_reports_missing_block() {
    let walker = memory_walker(common::ledger());
    walker.on_block(Shared(Recorder::new()));

    let err = walker.walk(None).await.unwrap_err();

    assert!(matches!(err, WalkerError::Ledger(_)));
    assert!(err.to_string().contains("block 1 below tip"));
}

// ─── failures and retries ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failing_handler_keeps_owed_transactions_for_the_next_walk() {
    let walker = WalkerBuilder::new()
        .memory_only()
        .max_retries(2)
        .retry_backoff_ms(100)
        .ledger(common::ledger())
        .build()
        .unwrap();
    let rec = Recorder::new();
    rec.fail_on_tx(Some("17251203728311469714"));
    walker.on_transaction(Shared(rec.clone()));

    let err = walker.walk(Some(552095)).await.unwrap_err();
    assert!(matches!(err, WalkerError::Handler { ref handler, .. } if handler == "transaction"));
    assert!(err.to_string().contains("cannot index 17251203728311469714"));

    let progress = walker.progress().await;
    assert_eq!(progress.last_confirmed_height, 552095);
    assert!(!progress.last_error.is_empty());
    assert_eq!(
        progress.pending_transaction_ids.iter().map(String::as_str).collect::<Vec<_>>(),
        ["10223472264931791821", "17251203728311469714", "8795182883781041709"]
    );

    rec.fail_on_tx(None);
    walker.walk(Some(552095)).await.unwrap();

    // The three newest went through on the first attempt and are not repeated.
    assert_eq!(
        rec.calls_of("tx"),
        [
            "7662865350688097936",
            "8814437006846802213",
            "106950754532245231",
            "17251203728311469714",
            "8795182883781041709",
            "10223472264931791821",
        ]
    );
    let progress = walker.progress().await;
    assert_eq!(progress.last_confirmed_height, TIP);
    assert!(progress.pending_transaction_ids.is_empty());
    assert!(progress.last_error.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_ledger_failures_are_retried() {
    let ledger = common::ledger();
    ledger.fail_block_fetches(2);
    let walker = WalkerBuilder::new()
        .memory_only()
        .max_retries(3)
        .ledger(ledger.clone())
        .build()
        .unwrap();
    let rec = Recorder::new();
    walker.on_block(Shared(rec.clone()));

    walker.walk(Some(552095)).await.unwrap();

    assert_eq!(rec.calls_of("block"), ["552096"]);
    assert_eq!(ledger.requested_heights(), [552096, 552096, 552096]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_the_last_error() {
    let ledger = common::ledger();
    ledger.fail_block_fetches(10);
    let walker = WalkerBuilder::new()
        .memory_only()
        .max_retries(2)
        .ledger(ledger.clone())
        .build()
        .unwrap();
    walker.on_block(Shared(Recorder::new()));

    let err = walker.walk(Some(552095)).await.unwrap_err();

    assert!(matches!(err, WalkerError::Ledger(_)));
    assert_eq!(ledger.requested_heights().len(), 3);
    assert_eq!(walker.progress().await.last_confirmed_height, 552095);
}

#[tokio::test]
async fn unreachable_node_fails_walk() {
    let walker = memory_walker(Arc::new(chainwalker::MockLedger::new()));
    walker.on_block(Shared(Recorder::new()));

    let err = walker.walk(Some(1)).await.unwrap_err();

    assert!(matches!(err, WalkerError::NodeUnreachable { .. }));
}

#[tokio::test]
async fn walk_and_listen_require_a_handler() {
    let walker = memory_walker(common::ledger());
    walker.on_before_quit(Shared(Recorder::new()));

    let err = walker.walk(Some(552090)).await.unwrap_err();
    assert!(err.to_string().contains("No handler set"));

    let err = walker.listen().await.unwrap_err();
    assert!(err.to_string().contains("No handler set"));
    assert_eq!(walker.state(), WalkerState::Idle);
}

// ─── listen ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn listen_starts_at_tip_and_picks_up_new_blocks() {
    let ledger = common::ledger();
    ledger.set_tip(Some(552094));
    let walker = memory_walker(ledger.clone());
    let rec = Recorder::new();
    walker
        .on_pending_transactions(Shared(rec.clone()))
        .on_block(Shared(rec.clone()));

    walker.listen().await.unwrap();
    assert_eq!(walker.state(), WalkerState::Listening);
    assert_eq!(walker.progress().await.last_confirmed_height, 552094);

    // Two more blocks get "mined".
    ledger.set_tip(None);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    walker.stop().await;

    assert_eq!(rec.calls_of("block"), ["552095", "552096"]);
    assert_eq!(rec.calls_of("pending"), ["1", "1", "1"]);
    assert_eq!(walker.progress().await.last_confirmed_height, TIP);
}

#[tokio::test(start_paused = true)]
async fn listen_retries_a_failed_block_on_the_next_tick() {
    let ledger = common::ledger();
    ledger.set_tip(Some(552095));
    let walker = memory_walker(ledger.clone());
    let rec = Recorder::new();
    rec.fail_on_tx(Some("7662865350688097936"));
    walker.on_transaction(Shared(rec.clone()));

    walker.listen().await.unwrap();
    ledger.set_tip(None);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(rec.calls_of("tx").is_empty());
    assert_eq!(walker.progress().await.last_confirmed_height, 552095);

    rec.fail_on_tx(None);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    walker.stop().await;

    assert_eq!(rec.calls_of("tx").len(), 6);
    assert_eq!(walker.progress().await.last_confirmed_height, TIP);
}

#[tokio::test(start_paused = true)]
async fn listen_at_tip_leaves_cursor_alone() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker
        .on_transaction(Shared(rec.clone()))
        .on_block(Shared(rec.clone()));

    walker.listen().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    walker.stop().await;

    assert!(rec.calls().is_empty());
    let progress = walker.progress().await;
    assert_eq!(progress.last_confirmed_height, TIP);
    assert!(progress.last_error.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_listen_is_a_no_op() {
    let walker = memory_walker(common::ledger());
    walker.on_block(Shared(Recorder::new()));

    walker.listen().await.unwrap();
    walker.listen().await.unwrap();
    assert_eq!(walker.state(), WalkerState::Listening);

    walker.stop().await;
}

// ─── stop ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_quits_once() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::new();
    walker
        .on_block(Shared(rec.clone()))
        .on_before_quit(Shared(rec.clone()));

    walker.listen().await.unwrap();
    walker.stop().await;
    walker.stop().await;

    assert_eq!(walker.state(), WalkerState::Stopped);
    assert_eq!(rec.calls_of("quit").len(), 1);

    // Nothing runs after stop.
    walker.listen().await.unwrap();
    walker.walk(Some(552090)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(walker.state(), WalkerState::Stopped);
    assert!(rec.calls_of("block").is_empty());
}

#[tokio::test]
async fn failing_before_quit_does_not_fail_stop() {
    let walker = memory_walker(common::ledger());
    let rec = Recorder::failing_before_quit();
    walker
        .on_block(Shared(rec.clone()))
        .on_before_quit(Shared(rec.clone()));

    walker.stop().await;

    assert_eq!(rec.calls_of("quit").len(), 1);
    assert_eq!(walker.state(), WalkerState::Stopped);
}

#[tokio::test]
async fn stop_from_a_handler_ends_the_walk_after_the_current_block() {
    let walker = Arc::new(memory_walker(common::ledger()));
    let heights = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = heights.clone();
    let handle = Arc::downgrade(&walker);
    walker.on_block(handler_fn(move |block: Block, _ctx: WalkContext| {
        let handle = handle.clone();
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(block.height);
            if block.height == 552094 {
                if let Some(walker) = handle.upgrade() {
                    walker.stop().await;
                }
            }
            Ok::<_, WalkerError>(())
        }
    }));
    let rec = Recorder::new();
    walker.on_transaction(Shared(rec.clone()));

    walker.walk(Some(552090)).await.unwrap();

    assert_eq!(*heights.lock().unwrap(), [552091u64, 552092, 552093, 552094]);
    assert_eq!(walker.progress().await.last_confirmed_height, 552094);
    assert_eq!(walker.state(), WalkerState::Stopped);
    assert_eq!(
        rec.calls_of("tx").last().map(String::as_str),
        Some("1649891197739725755")
    );
}

#[tokio::test]
async fn block_handler_stopping_at_552094_after_walk_from_552091() {
    let walker = Arc::new(memory_walker(common::ledger()));
    let heights = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = heights.clone();
    let handle = Arc::downgrade(&walker);
    walker.on_block(handler_fn(move |block: Block, _ctx: WalkContext| {
        let handle = handle.clone();
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(block.height);
            if block.height == 552094 {
                if let Some(walker) = handle.upgrade() {
                    walker.stop().await;
                }
            }
            Ok::<_, WalkerError>(())
        }
    }));

    walker.walk(Some(552091)).await.unwrap();

    // 552091 counts as already processed, so delivery starts one above it.
    assert_eq!(*heights.lock().unwrap(), [552092u64, 552093, 552094]);
    assert_eq!(walker.progress().await.last_confirmed_height, 552094);
    assert_eq!(walker.state(), WalkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_awaited_in_a_listen_handler_returns() {
    let ledger = common::ledger();
    ledger.set_tip(Some(552094));
    let walker = Arc::new(memory_walker(ledger.clone()));
    let heights = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = heights.clone();
    let handle = Arc::downgrade(&walker);
    walker.on_block(handler_fn(move |block: Block, _ctx: WalkContext| {
        let handle = handle.clone();
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(block.height);
            if let Some(walker) = handle.upgrade() {
                walker.stop().await;
            }
            Ok::<_, WalkerError>(())
        }
    }));
    let rec = Recorder::new();
    walker.on_before_quit(Shared(rec.clone()));

    walker.listen().await.unwrap();
    ledger.set_tip(None);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(*heights.lock().unwrap(), [552095u64]);
    assert_eq!(walker.state(), WalkerState::Stopped);
    assert_eq!(rec.calls_of("quit").len(), 1);
    assert_eq!(walker.progress().await.last_confirmed_height, 552095);
}
