//! Records the pre-execution state of every account and storage slot a
//! transaction touches.

use std::collections::btree_map::Entry;

use ethereum_types::{Address, H256};
use tracing::debug;

use crate::{
    error::TracerError,
    frame::{EnterFrame, ResultContext, StepFrame, TxContext},
    host::Host,
    opcodes::Opcode,
    types::{AccountSnapshot, Prestate},
};

#[derive(Debug, Default)]
pub struct PrestateTracer {
    prestate: Prestate,
    stepped: bool,
}

impl PrestateTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots `address` the first time it is seen.
    pub fn lookup_account(&mut self, address: Address, host: &dyn Host) -> Result<(), TracerError> {
        if let Entry::Vacant(entry) = self.prestate.entry(address) {
            entry.insert(AccountSnapshot {
                balance: host.get_balance(address)?,
                nonce: host.get_nonce(address)?,
                code: host.get_code(address)?,
                storage: Default::default(),
            });
        }
        Ok(())
    }

    /// Snapshots slot `key` of `address` the first time it is seen.
    pub fn lookup_storage(
        &mut self,
        address: Address,
        key: H256,
        host: &dyn Host,
    ) -> Result<(), TracerError> {
        self.lookup_account(address, host)?;
        if let Some(account) = self.prestate.get_mut(&address) {
            if let Entry::Vacant(slot) = account.storage.entry(key) {
                slot.insert(host.get_storage(address, key)?);
            }
        }
        Ok(())
    }

    pub fn init(&mut self, ctx: &TxContext, host: &dyn Host) -> Result<(), TracerError> {
        self.lookup_account(ctx.from, host)?;
        self.lookup_account(ctx.coinbase, host)?;
        if let Some(target) = ctx.call_target {
            self.lookup_account(target, host)?;
        }
        Ok(())
    }

    pub fn step(&mut self, frame: &StepFrame<'_>, host: &dyn Host) -> Result<(), TracerError> {
        if !self.stepped {
            self.stepped = true;
            self.lookup_account(frame.contract, host)?;
        }
        if frame.error.is_some() {
            return Ok(());
        }

        let op = frame.op;
        if op.reads_external_account() || op == Opcode::SELFDESTRUCT {
            if let Some(address) = frame.peek_address(0) {
                self.lookup_account(address, host)?;
            }
        } else if op == Opcode::CREATE {
            let nonce = host.get_nonce(frame.contract)?;
            let address = host.create_address(frame.contract, nonce);
            self.lookup_account(address, host)?;
        } else if op == Opcode::CREATE2 {
            let salt = frame.peek_word(3).unwrap_or_default();
            let init_code = frame.memory_slice(
                frame.peek(1).unwrap_or_default(),
                frame.peek(2).unwrap_or_default(),
            );
            let address = host.create2_address(frame.contract, salt, &init_code);
            self.lookup_account(address, host)?;
        } else if op.is_call() {
            if let Some(address) = frame.peek_address(1) {
                self.lookup_account(address, host)?;
            }
        } else if op == Opcode::SLOAD || op == Opcode::SSTORE {
            if let Some(key) = frame.peek_word(0) {
                self.lookup_storage(frame.contract, key, host)?;
            }
        }
        Ok(())
    }

    pub fn enter(&mut self, frame: &EnterFrame, host: &dyn Host) -> Result<(), TracerError> {
        self.lookup_account(frame.from, host)?;
        self.lookup_account(frame.to, host)
    }

    pub fn result(mut self, ctx: &ResultContext) -> Prestate {
        if ctx.kind.is_create() && self.prestate.remove(&ctx.to).is_some() {
            debug!(address = ?ctx.to, "Removed created contract from prestate");
        }
        self.prestate
    }
}
