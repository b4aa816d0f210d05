//! Hook inputs handed to the tracers by the host interpreter.

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};

use crate::opcodes::Opcode;

/// Upper bound on the bytes a single memory read may zero-pad beyond the
/// interpreter's current memory. Stack operands are untrusted.
pub const MAX_MEMORY_SLICE: usize = 16 * 1024 * 1024;

/// Kind of a call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallKind {
    #[default]
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    SelfDestruct,
}

impl CallKind {
    pub fn from_opcode(op: Opcode) -> Option<Self> {
        let kind = match op {
            Opcode::CALL => CallKind::Call,
            Opcode::CALLCODE => CallKind::CallCode,
            Opcode::DELEGATECALL => CallKind::DelegateCall,
            Opcode::STATICCALL => CallKind::StaticCall,
            Opcode::CREATE => CallKind::Create,
            Opcode::CREATE2 => CallKind::Create2,
            Opcode::SELFDESTRUCT => CallKind::SelfDestruct,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_create(self) -> bool {
        matches!(self, CallKind::Create | CallKind::Create2)
    }

    /// One of the four message-call kinds.
    pub fn is_call(self) -> bool {
        matches!(
            self,
            CallKind::Call | CallKind::CallCode | CallKind::DelegateCall | CallKind::StaticCall
        )
    }

    /// Lower-case opcode name, as used in `callType` and `creationMethod`.
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Call => "call",
            CallKind::CallCode => "callcode",
            CallKind::DelegateCall => "delegatecall",
            CallKind::StaticCall => "staticcall",
            CallKind::Create => "create",
            CallKind::Create2 => "create2",
            CallKind::SelfDestruct => "selfdestruct",
        }
    }
}

/// Kind of the outermost message of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxKind {
    #[default]
    Call,
    Create,
    Create2,
}

impl TxKind {
    pub fn is_create(self) -> bool {
        matches!(self, TxKind::Create | TxKind::Create2)
    }
}

impl From<TxKind> for CallKind {
    fn from(kind: TxKind) -> Self {
        match kind {
            TxKind::Call => CallKind::Call,
            TxKind::Create => CallKind::Create,
            TxKind::Create2 => CallKind::Create2,
        }
    }
}

/// Context passed to `init`, before the first opcode runs.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    pub from: Address,
    /// Executing address of the outermost frame (the new contract for creations).
    pub to: Address,
    pub coinbase: Address,
    /// Recipient of a message-call transaction. `None` for creations.
    pub call_target: Option<Address>,
}

/// Interpreter state for a single opcode, borrowed for the duration of the hook.
#[derive(Debug, Clone, Copy)]
pub struct StepFrame<'a> {
    pub op: Opcode,
    pub pc: u64,
    /// Gas remaining before the opcode executes.
    pub gas: u64,
    /// Gas charged for the opcode.
    pub cost: u64,
    /// Call depth, 1 for the outermost frame.
    pub depth: usize,
    /// Operand stack, bottom first. The top of the stack is the last element.
    pub stack: &'a [U256],
    pub memory: &'a [u8],
    /// Address whose storage the current frame operates on.
    pub contract: Address,
    /// Set when the opcode failed.
    pub error: Option<&'a str>,
    /// Set when a call opcode failed before entering the callee.
    pub call_error: Option<&'a str>,
}

impl StepFrame<'_> {
    /// Stack item `n` positions below the top.
    pub fn peek(&self, n: usize) -> Option<U256> {
        let index = self.stack.len().checked_sub(n.checked_add(1)?)?;
        self.stack.get(index).copied()
    }

    pub fn peek_address(&self, n: usize) -> Option<Address> {
        self.peek(n).map(word_to_address)
    }

    pub fn peek_word(&self, n: usize) -> Option<H256> {
        self.peek(n).map(|value| H256::from(value.to_big_endian()))
    }

    /// Copy of `memory[offset..offset + len]`, zero-padded past the end of the
    /// current memory.
    pub fn memory_slice(&self, offset: U256, len: U256) -> Bytes {
        if len.is_zero() {
            return Bytes::new();
        }
        let len = usize::try_from(len)
            .unwrap_or(MAX_MEMORY_SLICE)
            .min(MAX_MEMORY_SLICE);
        let mut data = vec![0u8; len];
        if let Ok(start) = usize::try_from(offset) {
            if let Some(available) = self.memory.get(start..) {
                let copied = available.len().min(len);
                data[..copied].copy_from_slice(&available[..copied]);
            }
        }
        Bytes::from(data)
    }
}

/// Lower 20 bytes of a stack word.
pub fn word_to_address(value: U256) -> Address {
    let bytes = value.to_big_endian();
    Address::from_slice(&bytes[12..])
}

/// A frame being opened, for hosts reporting call boundaries.
#[derive(Debug, Clone, Default)]
pub struct EnterFrame {
    pub kind: CallKind,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub gas: u64,
    /// `None` for DELEGATECALL and STATICCALL.
    pub value: Option<U256>,
}

/// Outcome of the frame most recently opened with `enter`.
#[derive(Debug, Clone, Default)]
pub struct ExitResult {
    pub gas_used: u64,
    pub output: Bytes,
    pub error: Option<String>,
}

/// Block and transaction identifiers copied onto every call trace entry.
#[derive(Debug, Clone, Default)]
pub struct TraceMeta {
    pub block_hash: Option<H256>,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
    pub transaction_position: Option<u64>,
}

/// Context passed to `result`, after the transaction has fully executed.
#[derive(Debug, Clone)]
pub struct ResultContext {
    pub kind: TxKind,
    pub from: Address,
    pub to: Address,
    pub coinbase: Address,
    pub input: Bytes,
    pub output: Bytes,
    pub gas_limit: u64,
    /// Gas available to the outermost frame once intrinsic gas was charged.
    pub gas: u64,
    pub gas_used: u64,
    pub gas_price: U256,
    pub value: U256,
    pub refund: u64,
    pub error: Option<String>,
    pub has_sufficient_balance_for_gas: bool,
    pub has_sufficient_balance_for_value_and_gas: bool,
    pub meta: TraceMeta,
}

impl Default for ResultContext {
    fn default() -> Self {
        Self {
            kind: TxKind::Call,
            from: Address::zero(),
            to: Address::zero(),
            coinbase: Address::zero(),
            input: Bytes::new(),
            output: Bytes::new(),
            gas_limit: 0,
            gas: 0,
            gas_used: 0,
            gas_price: U256::zero(),
            value: U256::zero(),
            refund: 0,
            error: None,
            has_sufficient_balance_for_gas: true,
            has_sufficient_balance_for_value_and_gas: true,
            meta: TraceMeta::default(),
        }
    }
}
