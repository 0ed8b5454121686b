//! A slice of the Signum mainnet (blocks 552091..=552096) for walker tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainwalker::{
    BeforeQuitHandler, Block, BlockHandler, MockLedger, PendingTransactionsHandler, Transaction,
    TransactionHandler, WalkContext, WalkerError,
};
use serde_json::{json, Value};

pub const TIP: u64 = 552096;

fn tx(id: &str, timestamp: u64, height: u64, block: &str, sender: &str) -> Value {
    json!({
        "transaction": id,
        "type": 0,
        "subtype": 0,
        "timestamp": timestamp,
        "sender": sender,
        "height": height,
        "block": block,
        "feeNQT": "735000"
    })
}

fn block(height: u64, id: &str, previous: &str, timestamp: u64, txs: Vec<Value>) -> Block {
    let count = txs.len();
    serde_json::from_value(json!({
        "block": id,
        "height": height,
        "timestamp": timestamp,
        "numberOfTransactions": count,
        "previousBlock": previous,
        "transactions": txs,
    }))
    .expect("fixture block")
}

pub fn blocks() -> Vec<Block> {
    let b91 = "1379510165939113907";
    let b92 = "13539317506821899530";
    let b93 = "16260159774112415092";
    let b94 = "2562584151028582598";
    let b95 = "9753034175613557925";
    let b96 = "8109072569051160171";

    vec![
        block(
            552091,
            b91,
            "4207429470446418417",
            277842038,
            vec![tx("1853345557145247142", 277841787, 552091, b91, "12534133003000836563")],
        ),
        block(552092, b92, b91, 277842281, {
            let mut t = tx(
                "15735764943213866385",
                277842281,
                552092,
                b92,
                "12534133003000836563",
            );
            t["recipient"] = json!("8749786126809286749");
            vec![t]
        }),
        block(
            552093,
            b93,
            b92,
            277842554,
            [
                "12138612333627809376",
                "558973604337360685",
                "263011623990690313",
                "1649891197739725755",
            ]
            .iter()
            .map(|id| tx(id, 277842523, 552093, b93, "13379979993382958865"))
            .collect(),
        ),
        block(552094, b94, b93, 277842692, vec![]),
        block(552095, b95, b94, 277842955, vec![]),
        block(
            552096,
            b96,
            b95,
            277843250,
            [
                ("10223472264931791821", 277843131),
                ("8795182883781041709", 277843193),
                ("17251203728311469714", 277843227),
                ("7662865350688097936", 277843250),
                ("8814437006846802213", 277843250),
                ("106950754532245231", 277843250),
            ]
            .iter()
            .map(|(id, ts)| tx(id, *ts, 552096, b96, "12534133003000836563"))
            .collect(),
        ),
    ]
}

pub fn pending() -> Vec<Transaction> {
    vec![serde_json::from_value(json!({
        "transaction": "15297390838354430326",
        "type": 0,
        "subtype": 0,
        "timestamp": 277843842,
        "sender": "13566984861616173366",
        "feeNQT": "735000"
    }))
    .expect("fixture pending transaction")]
}

pub fn ledger() -> Arc<MockLedger> {
    let ledger = MockLedger::with_blocks(blocks());
    ledger.set_pending(pending());
    Arc::new(ledger)
}

pub fn temp_cache(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("chainwalker-it-{}-{nanos}", std::process::id()))
        .join(name)
}

/// Records every handler call as `kind:detail`.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    fail_on_tx: Mutex<Option<String>>,
    fail_quit: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_before_quit() -> Arc<Self> {
        Arc::new(Self {
            fail_quit: true,
            ..Default::default()
        })
    }

    /// Fail whenever transaction `id` is dispatched, until cleared with `None`.
    pub fn fail_on_tx(&self, id: Option<&str>) {
        *self.fail_on_tx.lock().unwrap() = id.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}:");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Forwards to a shared [`Recorder`] so tests keep a handle to it.
pub struct Shared(pub Arc<Recorder>);

#[async_trait]
impl TransactionHandler for Shared {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        _ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        let fail = self.0.fail_on_tx.lock().unwrap().clone();
        if fail.as_deref() == Some(tx.id.as_str()) {
            return Err(WalkerError::Other(format!("cannot index {}", tx.id)));
        }
        self.0.push(format!("tx:{}", tx.id));
        Ok(())
    }
}

#[async_trait]
impl BlockHandler for Shared {
    async fn handle_block(&self, block: &Block, _ctx: &WalkContext) -> Result<(), WalkerError> {
        self.0.push(format!("block:{}", block.height));
        Ok(())
    }
}

#[async_trait]
impl PendingTransactionsHandler for Shared {
    async fn handle_pending(
        &self,
        txs: &[Transaction],
        _ctx: &WalkContext,
    ) -> Result<(), WalkerError> {
        self.0.push(format!("pending:{}", txs.len()));
        Ok(())
    }
}

#[async_trait]
impl BeforeQuitHandler for Shared {
    async fn before_quit(&self, _ctx: &WalkContext) -> Result<(), WalkerError> {
        self.0.push("quit:".to_string());
        if self.0.fail_quit {
            return Err(WalkerError::Other("database already closed".into()));
        }
        Ok(())
    }
}
