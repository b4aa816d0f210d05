//! Shared test helpers: an in-memory host and an opcode step builder.

use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use rustc_hash::FxHashMap;

use crate::{
    error::DatabaseError,
    frame::StepFrame,
    host::{AddressDerivation, Database},
    opcodes::Opcode,
};

/// Transaction sender.
pub const SENDER: u64 = 0x100;
/// Block coinbase.
pub const COINBASE: u64 = 0xc0;
/// Contract the transaction calls.
pub const CONTRACT: u64 = 0x42;
/// Second contract, called from `CONTRACT`.
pub const CALLEE: u64 = 0x43;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn word(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn address_word(address: Address) -> U256 {
    U256::from_big_endian(H256::from(address).as_bytes())
}

#[derive(Debug, Clone, Default)]
pub struct MockAccount {
    pub balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    pub storage: FxHashMap<H256, H256>,
}

/// World state backed by a hash map. Missing accounts read as empty.
#[derive(Debug, Default)]
pub struct MockHost {
    pub accounts: FxHashMap<Address, MockAccount>,
    pub fail_reads: bool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, address: Address, balance: u64, nonce: u64, code: &[u8]) -> Self {
        self.accounts.insert(
            address,
            MockAccount {
                balance: U256::from(balance),
                nonce,
                code: Bytes::copy_from_slice(code),
                storage: FxHashMap::default(),
            },
        );
        self
    }

    pub fn set_balance(&mut self, address: Address, balance: u64) {
        self.accounts.entry(address).or_default().balance = U256::from(balance);
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.accounts.entry(address).or_default().nonce = nonce;
    }

    pub fn set_code(&mut self, address: Address, code: &[u8]) {
        self.accounts.entry(address).or_default().code = Bytes::copy_from_slice(code);
    }

    pub fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        self.accounts
            .entry(address)
            .or_default()
            .storage
            .insert(key, value);
    }

    fn account(&self, address: Address) -> Result<Option<&MockAccount>, DatabaseError> {
        if self.fail_reads {
            return Err(DatabaseError::AccountUnavailable(address));
        }
        Ok(self.accounts.get(&address))
    }
}

impl Database for MockHost {
    fn get_balance(&self, address: Address) -> Result<U256, DatabaseError> {
        Ok(self.account(address)?.map(|a| a.balance).unwrap_or_default())
    }

    fn get_nonce(&self, address: Address) -> Result<u64, DatabaseError> {
        Ok(self.account(address)?.map(|a| a.nonce).unwrap_or_default())
    }

    fn get_code(&self, address: Address) -> Result<Bytes, DatabaseError> {
        Ok(self
            .account(address)?
            .map(|a| a.code.clone())
            .unwrap_or_default())
    }

    fn get_storage(&self, address: Address, key: H256) -> Result<H256, DatabaseError> {
        Ok(self
            .account(address)?
            .and_then(|a| a.storage.get(&key).copied())
            .unwrap_or_default())
    }

    fn exists(&self, address: Address) -> Result<bool, DatabaseError> {
        Ok(self.account(address)?.is_some())
    }

    fn is_empty(&self, address: Address) -> Result<bool, DatabaseError> {
        Ok(self
            .account(address)?
            .is_none_or(|a| a.balance.is_zero() && a.nonce == 0 && a.code.is_empty()))
    }
}

/// Deterministic stand-ins for the RLP/keccak address derivations.
impl AddressDerivation for MockHost {
    fn create_address(&self, deployer: Address, nonce: u64) -> Address {
        addr(0xc1_0000_0000 | (deployer.to_low_u64_be() << 8) | nonce)
    }

    fn create2_address(&self, deployer: Address, salt: H256, init_code: &[u8]) -> Address {
        let len = u64::try_from(init_code.len()).expect("small init code");
        addr(0xc2_0000_0000 | (deployer.to_low_u64_be() << 16) | (salt.to_low_u64_be() << 8) | len)
    }
}

/// Owned interpreter state for one opcode, lent out as a [`StepFrame`].
#[derive(Debug, Clone)]
pub struct Step {
    pub op: Opcode,
    pub depth: usize,
    pub contract: Address,
    pub gas: u64,
    pub cost: u64,
    /// Bottom first, like the interpreter's stack.
    pub stack: Vec<U256>,
    pub memory: Vec<u8>,
    pub error: Option<String>,
    pub call_error: Option<String>,
}

impl Step {
    pub fn new(op: Opcode, depth: usize, contract: Address) -> Self {
        Self {
            op,
            depth,
            contract,
            gas: 0,
            cost: 0,
            stack: Vec::new(),
            memory: Vec::new(),
            error: None,
            call_error: None,
        }
    }

    pub fn gas(mut self, gas: u64, cost: u64) -> Self {
        self.gas = gas;
        self.cost = cost;
        self
    }

    /// Stack items listed from the top down.
    pub fn stack(mut self, top_first: &[U256]) -> Self {
        self.stack = top_first.iter().rev().copied().collect();
        self
    }

    pub fn memory(mut self, memory: &[u8]) -> Self {
        self.memory = memory.to_vec();
        self
    }

    pub fn error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn call_error(mut self, error: &str) -> Self {
        self.call_error = Some(error.to_string());
        self
    }

    pub fn frame(&self) -> StepFrame<'_> {
        StepFrame {
            op: self.op,
            pc: 0,
            gas: self.gas,
            cost: self.cost,
            depth: self.depth,
            stack: &self.stack,
            memory: &self.memory,
            contract: self.contract,
            error: self.error.as_deref(),
            call_error: self.call_error.as_deref(),
        }
    }
}

/// CALL operands: gas, to, value, in offset, in size, out offset, out size.
pub fn call_stack(to: Address, value: u64, in_offset: u64, in_size: u64) -> Vec<U256> {
    vec![
        U256::from(50_000),
        address_word(to),
        U256::from(value),
        U256::from(in_offset),
        U256::from(in_size),
        U256::zero(),
        U256::zero(),
    ]
}

/// DELEGATECALL/STATICCALL operands: gas, to, in offset, in size, out offset, out size.
pub fn static_call_stack(to: Address) -> Vec<U256> {
    vec![
        U256::from(50_000),
        address_word(to),
        U256::zero(),
        U256::zero(),
        U256::zero(),
        U256::zero(),
    ]
}
