//! Ledger entities and the context handed to handlers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ledger::LedgerClient;

// ─── Transaction ─────────────────────────────────────────────────────────────

/// A transaction as reported by the node (`getBlock` / `getUnconfirmedTransactions`).
///
/// Only the fields the walker or typical handlers look at are typed; the rest of
/// the node payload is kept in `extra` so it can be forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction id (numeric string).
    #[serde(rename = "transaction")]
    pub id: String,
    /// Chain timestamp (seconds since the Signum genesis).
    pub timestamp: u64,
    #[serde(rename = "type", default)]
    pub tx_type: u8,
    #[serde(default)]
    pub subtype: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(rename = "senderRS", default, skip_serializing_if = "Option::is_none")]
    pub sender_rs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(rename = "recipientRS", default, skip_serializing_if = "Option::is_none")]
    pub recipient_rs: Option<String>,
    /// Height of the containing block; absent for unconfirmed transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    /// Id of the containing block; absent for unconfirmed transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    /// Free-form attachment payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sorts transactions newest first.
///
/// The sort is stable, so transactions sharing a timestamp keep the order in
/// which the node returned them.
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

// ─── Block ───────────────────────────────────────────────────────────────────

/// A block including its transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block id (numeric string).
    #[serde(rename = "block")]
    pub id: String,
    pub height: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub number_of_transactions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_block: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ─── WalkContext ─────────────────────────────────────────────────────────────

/// Which operation produced a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkMode {
    /// Bounded catch-up from a start height to the tip.
    Walk,
    /// Periodic polling from the tip onwards.
    Listen,
}

impl fmt::Display for WalkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Walk => write!(f, "walk"),
            Self::Listen => write!(f, "listen"),
        }
    }
}

/// Context passed to every handler.
#[derive(Clone)]
pub struct WalkContext {
    /// The ledger client the walker reads from, for follow-up queries.
    pub ledger: Arc<dyn LedgerClient>,
    pub mode: WalkMode,
}

impl WalkContext {
    pub fn new(ledger: Arc<dyn LedgerClient>, mode: WalkMode) -> Self {
        Self { ledger, mode }
    }
}

impl fmt::Debug for WalkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkContext")
            .field("ledger", &self.ledger.endpoint())
            .field("mode", &self.mode)
            .finish()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
