//! Output types of the three tracers and their JSON wire shapes.

use std::collections::BTreeMap;

use bytes::Bytes;
use ethereum_types::{Address, H256, U64, U256};
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::serde_utils::HexBytes;

/// Trace entry `type` in the flattened call trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    Call,
    Create,
    Suicide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAction {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::u64::hex_str_opt"
    )]
    pub gas: Option<u64>,
    #[serde(with = "crate::serde_utils::bytes")]
    pub input: Bytes,
    pub call_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAction {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::u64::hex_str_opt"
    )]
    pub gas: Option<u64>,
    #[serde(with = "crate::serde_utils::bytes")]
    pub init: Bytes,
    pub creation_method: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuicideAction {
    pub address: Address,
    pub refund_address: Address,
    pub balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Action {
    Call(CallAction),
    Create(CreateAction),
    Suicide(SuicideAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::u64::hex_str_opt"
    )]
    pub gas_used: Option<u64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::bytes::opt"
    )]
    pub output: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::u64::hex_str_opt"
    )]
    pub gas_used: Option<u64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::serde_utils::bytes::opt"
    )]
    pub code: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// `result` of a trace entry. Self-destructs carry an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TraceResult {
    Call(CallResult),
    Create(CreateResult),
    Suicide,
}

/// One frame of the flattened Parity-style call trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    #[serde(rename = "type")]
    pub trace_type: TraceType,
    pub action: Action,
    /// Omitted when the frame's error was translated to a Parity message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TraceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Child indices from the root down to this frame.
    pub trace_address: Vec<usize>,
    pub subtraces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<H256>,
}

/// Pre-execution view of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub balance: U256,
    pub nonce: u64,
    #[serde(with = "crate::serde_utils::bytes")]
    pub code: Bytes,
    pub storage: BTreeMap<H256, H256>,
}

pub type Prestate = BTreeMap<Address, AccountSnapshot>;

/// Per-field change marker of the state diff.
///
/// Serializes as `"="`, `{"+": v}`, `{"-": v}` or `{"*": {"from": a, "to": b}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta<T> {
    Same,
    Born(T),
    Died(T),
    Changed { from: T, to: T },
}

impl<T: PartialEq> Delta<T> {
    /// `Same` when both sides match, `Changed` otherwise.
    pub fn compare(from: T, to: T) -> Self {
        if from == to {
            Delta::Same
        } else {
            Delta::Changed { from, to }
        }
    }

    pub fn is_same(&self) -> bool {
        matches!(self, Delta::Same)
    }
}

#[derive(Serialize)]
struct FromTo<'a, T> {
    from: &'a T,
    to: &'a T,
}

impl<T: Serialize> Serialize for Delta<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Delta::Same => serializer.serialize_str("="),
            Delta::Born(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("+", value)?;
                map.end()
            }
            Delta::Died(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("-", value)?;
                map.end()
            }
            Delta::Changed { from, to } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("*", &FromTo { from, to })?;
                map.end()
            }
        }
    }
}

/// Net change of one account over the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountDiff {
    pub balance: Delta<U256>,
    pub nonce: Delta<U64>,
    pub code: Delta<HexBytes>,
    pub storage: BTreeMap<H256, Delta<H256>>,
}

pub type StateDiff = BTreeMap<Address, AccountDiff>;

/// Result of any of the tracers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TraceOutput {
    CallStack(Vec<TraceEntry>),
    Prestate(Prestate),
    StateDiff(StateDiff),
}
