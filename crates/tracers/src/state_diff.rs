//! Per-account state diff of a single transaction.
//!
//! The tracer sees the world state only after the host has already charged the
//! gas prepayment, bumped the sender nonce and moved the call value. `result`
//! backs those setup effects out of the first observed values so the diff
//! reflects the state before the transaction was applied.

use std::collections::{BTreeMap, btree_map::Entry};

use bytes::Bytes;
use ethereum_types::{Address, H256, U64, U256};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::{
    config::TracerConfig,
    error::TracerError,
    frame::{CallKind, EnterFrame, ExitResult, ResultContext, StepFrame, TxContext},
    host::Host,
    opcodes::Opcode,
    serde_utils::HexBytes,
    types::{AccountDiff, Delta, StateDiff},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lifecycle {
    #[default]
    Changed,
    Born,
    Died,
}

#[derive(Debug, Clone, Default)]
struct Change<T> {
    from: T,
    to: T,
}

impl<T: Clone> Change<T> {
    fn new(value: T) -> Self {
        Self {
            from: value.clone(),
            to: value,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SlotChange {
    from: H256,
    to: H256,
    /// Held a non-zero value at some point during the transaction.
    ever_nonzero: bool,
}

impl SlotChange {
    fn new(from: H256, to: H256) -> Self {
        Self {
            from,
            to,
            ever_nonzero: !from.is_zero() || !to.is_zero(),
        }
    }

    fn observe(&mut self, value: H256) {
        self.ever_nonzero |= !value.is_zero();
        self.to = value;
    }
}

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    balance: Change<U256>,
    nonce: Change<u64>,
    code: Change<Bytes>,
    storage: BTreeMap<H256, SlotChange>,
    lifecycle: Lifecycle,
    /// Created and destroyed in the same transaction, or pruned as empty.
    remove: bool,
    /// Values were settled by `result` and must not be refreshed.
    is_final: bool,
    /// Touched by a frame that failed.
    has_error: bool,
}

impl AccountRecord {
    fn observe(&mut self, address: Address, host: &dyn Host) -> Result<(), TracerError> {
        let nonce = host.get_nonce(address)?;
        if nonce < self.nonce.from {
            debug!(address = ?address, "Account nonce went backwards, treating it as pruned");
            self.remove = true;
        }
        self.balance.to = host.get_balance(address)?;
        self.nonce.to = nonce;
        self.code.to = host.get_code(address)?;
        Ok(())
    }

    fn original_is_empty(&self) -> bool {
        self.balance.from.is_zero() && self.nonce.from == 0 && self.code.from.is_empty()
    }

    fn current_is_empty(&self) -> bool {
        self.balance.to.is_zero() && self.nonce.to == 0 && self.code.to.is_empty()
    }
}

#[derive(Debug)]
pub struct StateDiffTracer {
    accounts: BTreeMap<Address, AccountRecord>,
    precompiles: FxHashSet<Address>,
    last_accessed: Option<Address>,
    /// Callees of the frames opened with `enter`.
    callees: Vec<Address>,
    /// The outermost frame failed. Accounts touched from now on are flagged.
    failed: bool,
    stepped: bool,
}

impl StateDiffTracer {
    pub fn new(config: &TracerConfig) -> Self {
        Self {
            accounts: BTreeMap::new(),
            precompiles: config.precompile_set(),
            last_accessed: None,
            callees: Vec::new(),
            failed: false,
            stepped: false,
        }
    }

    /// Snapshots `address` on first reference and refreshes its current values
    /// afterwards. `lifecycle` records a creation or self-destruct.
    fn lookup_account(
        &mut self,
        address: Address,
        lifecycle: Option<Lifecycle>,
        host: &dyn Host,
    ) -> Result<(), TracerError> {
        let record = match self.accounts.entry(address) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let record = AccountRecord {
                    balance: Change::new(host.get_balance(address)?),
                    nonce: Change::new(host.get_nonce(address)?),
                    code: Change::new(host.get_code(address)?),
                    ..Default::default()
                };
                entry.insert(record)
            }
        };
        if !record.is_final {
            record.observe(address, host)?;
        }
        match lifecycle {
            Some(Lifecycle::Died) if record.lifecycle == Lifecycle::Born => {
                debug!(address = ?address, "Account created and destroyed in the same transaction");
                record.lifecycle = Lifecycle::Died;
                record.remove = true;
            }
            Some(lifecycle) => record.lifecycle = lifecycle,
            None => {}
        }
        if self.failed {
            record.has_error = true;
        }
        self.last_accessed = Some(address);
        Ok(())
    }

    /// Records slot `key` of `address`. `written` is the value being stored,
    /// otherwise the current value is read back.
    fn lookup_storage(
        &mut self,
        address: Address,
        key: H256,
        written: Option<H256>,
        host: &dyn Host,
    ) -> Result<(), TracerError> {
        if !self.accounts.contains_key(&address) {
            self.lookup_account(address, None, host)?;
        }
        let current = match written {
            Some(value) => value,
            None => host.get_storage(address, key)?,
        };
        let Some(record) = self.accounts.get_mut(&address) else {
            return Ok(());
        };
        match record.storage.entry(key) {
            Entry::Occupied(mut slot) => slot.get_mut().observe(current),
            Entry::Vacant(slot) => {
                let original = host.get_storage(address, key)?;
                slot.insert(SlotChange::new(original, current));
            }
        }
        Ok(())
    }

    fn flag_failure(&mut self, depth: usize) {
        if let Some(record) = self
            .last_accessed
            .and_then(|address| self.accounts.get_mut(&address))
        {
            record.has_error = true;
        }
        if depth <= 1 {
            self.failed = true;
        }
    }

    /// Observes the sender and recipient before any opcode runs. The coinbase
    /// is left for `result`, once the fee has been credited.
    pub fn init(&mut self, ctx: &TxContext, host: &dyn Host) -> Result<(), TracerError> {
        self.lookup_account(ctx.from, None, host)?;
        self.lookup_account(ctx.call_target.unwrap_or(ctx.to), None, host)
    }

    pub fn step(&mut self, frame: &StepFrame<'_>, host: &dyn Host) -> Result<(), TracerError> {
        if !self.stepped {
            self.stepped = true;
            self.lookup_account(frame.contract, None, host)?;
        }
        if frame.error.is_some() {
            self.flag_failure(frame.depth);
            return Ok(());
        }

        let op = frame.op;
        if op.reads_external_account() {
            if let Some(address) = frame.peek_address(0) {
                self.lookup_account(address, None, host)?;
            }
        } else if op == Opcode::CREATE {
            let nonce = host.get_nonce(frame.contract)?;
            let address = host.create_address(frame.contract, nonce);
            self.lookup_account(address, Some(Lifecycle::Born), host)?;
        } else if op == Opcode::CREATE2 {
            let salt = frame.peek_word(3).unwrap_or_default();
            let init_code = frame.memory_slice(
                frame.peek(1).unwrap_or_default(),
                frame.peek(2).unwrap_or_default(),
            );
            let address = host.create2_address(frame.contract, salt, &init_code);
            self.lookup_account(address, Some(Lifecycle::Born), host)?;
        } else if op.is_call() {
            if let Some(address) = frame.peek_address(1) {
                if !self.precompiles.contains(&address) {
                    self.lookup_account(address, None, host)?;
                }
            }
        } else if op == Opcode::SLOAD {
            if let Some(key) = frame.peek_word(0) {
                self.lookup_storage(frame.contract, key, None, host)?;
            }
        } else if op == Opcode::SSTORE {
            if let (Some(key), Some(value)) = (frame.peek_word(0), frame.peek_word(1)) {
                self.lookup_storage(frame.contract, key, Some(value), host)?;
            }
        } else if op == Opcode::SELFDESTRUCT {
            if let Some(beneficiary) = frame.peek_address(0) {
                self.lookup_account(beneficiary, None, host)?;
            }
            self.lookup_account(frame.contract, Some(Lifecycle::Died), host)?;
        }
        Ok(())
    }

    pub fn fault(&mut self, frame: &StepFrame<'_>) {
        self.flag_failure(frame.depth);
    }

    pub fn enter(&mut self, frame: &EnterFrame, host: &dyn Host) -> Result<(), TracerError> {
        match frame.kind {
            CallKind::SelfDestruct => {
                self.lookup_account(frame.to, None, host)?;
                self.lookup_account(frame.from, Some(Lifecycle::Died), host)?;
            }
            CallKind::Create | CallKind::Create2 => {
                self.lookup_account(frame.to, Some(Lifecycle::Born), host)?;
            }
            _ if self.precompiles.contains(&frame.to) => {}
            _ => self.lookup_account(frame.to, None, host)?,
        }
        self.callees.push(frame.to);
        Ok(())
    }

    pub fn exit(&mut self, result: &ExitResult) {
        let Some(callee) = self.callees.pop() else {
            return;
        };
        if result.error.is_some() {
            if let Some(record) = self.accounts.get_mut(&callee) {
                record.has_error = true;
            }
        }
    }

    /// Settles the transaction's setup effects and renders the diff.
    pub fn result(
        mut self,
        ctx: &ResultContext,
        host: &dyn Host,
    ) -> Result<StateDiff, TracerError> {
        if !ctx.has_sufficient_balance_for_gas && !ctx.value.is_zero() {
            debug!(from = ?ctx.from, "Sender cannot pay for gas, transaction not applied");
            return Ok(StateDiff::new());
        }

        let sender_seen = self.accounts.contains_key(&ctx.from);
        let coinbase_seen = self.accounts.contains_key(&ctx.coinbase);
        self.lookup_account(ctx.from, None, host)?;
        self.lookup_account(ctx.to, None, host)?;
        self.lookup_account(ctx.coinbase, None, host)?;

        let gas_used_total = ctx
            .gas_limit
            .saturating_sub(ctx.gas)
            .saturating_add(ctx.gas_used)
            .saturating_add(ctx.refund);
        let fees = U256::from(gas_used_total).saturating_mul(ctx.gas_price);
        let full_gas_cost = U256::from(ctx.gas_limit).saturating_mul(ctx.gas_price);
        let value_moved = ctx.has_sufficient_balance_for_value_and_gas && ctx.from != ctx.to;

        if let Some(sender) = self.accounts.get_mut(&ctx.from) {
            sender.has_error = false;
            // A sender first read here already got its unused gas back, and
            // the fee it paid is its own when it is also the coinbase.
            if ctx.has_sufficient_balance_for_gas {
                let paid = match (sender_seen, ctx.from == ctx.coinbase) {
                    (true, _) => full_gas_cost,
                    (false, false) => fees,
                    (false, true) => U256::zero(),
                };
                sender.balance.from = sender.balance.from.saturating_add(paid);
            }
            if value_moved {
                sender.balance.from = sender.balance.from.saturating_add(ctx.value);
            }
            sender.nonce.from = sender.nonce.from.saturating_sub(1);
        }

        if let Some(recipient) = self.accounts.get_mut(&ctx.to) {
            if ctx.has_sufficient_balance_for_value_and_gas {
                recipient.has_error = false;
            }
            if value_moved {
                recipient.balance.from = recipient.balance.from.saturating_sub(ctx.value);
            }
        }

        if let Some(coinbase) = self.accounts.get_mut(&ctx.coinbase) {
            coinbase.has_error = false;
            if ctx.coinbase != ctx.from && !coinbase_seen {
                coinbase.balance.from = coinbase.balance.from.saturating_sub(fees);
            }
        }

        for address in [ctx.from, ctx.to, ctx.coinbase] {
            if let Some(record) = self.accounts.get_mut(&address) {
                record.is_final = true;
            }
        }

        if ctx.kind.is_create() {
            if let Some(created) = self.accounts.get_mut(&ctx.to) {
                if created.lifecycle == Lifecycle::Died {
                    created.remove = true;
                } else {
                    created.lifecycle = Lifecycle::Born;
                }
            }
        }

        self.format(host)
    }

    fn format(self, host: &dyn Host) -> Result<StateDiff, TracerError> {
        let mut diff = StateDiff::new();
        for (address, mut record) in self.accounts {
            if !record.is_final {
                record.observe(address, host)?;
            }
            if record.has_error || record.remove {
                debug!(address = ?address, "Leaving account out of state diff");
                continue;
            }
            // Self-destructed accounts keep their code until the block is finalized.
            if record.lifecycle != Lifecycle::Died
                && (!host.exists(address)? || host.is_empty(address)?)
            {
                continue;
            }
            if record.lifecycle == Lifecycle::Changed && record.original_is_empty() {
                record.lifecycle = Lifecycle::Born;
            }

            let mut storage = BTreeMap::new();
            for (key, mut slot) in std::mem::take(&mut record.storage) {
                slot.observe(host.get_storage(address, key)?);
                if !slot.ever_nonzero {
                    continue;
                }
                let delta = match record.lifecycle {
                    Lifecycle::Born if !slot.to.is_zero() => Delta::Born(slot.to),
                    Lifecycle::Died if !slot.from.is_zero() => Delta::Died(slot.from),
                    Lifecycle::Changed if slot.from != slot.to => Delta::Changed {
                        from: slot.from,
                        to: slot.to,
                    },
                    _ => continue,
                };
                storage.insert(key, delta);
            }

            let account = match record.lifecycle {
                Lifecycle::Born => {
                    if record.current_is_empty() && storage.is_empty() {
                        continue;
                    }
                    AccountDiff {
                        balance: Delta::Born(record.balance.to),
                        nonce: Delta::Born(U64::from(record.nonce.to)),
                        code: Delta::Born(HexBytes(record.code.to)),
                        storage,
                    }
                }
                Lifecycle::Died => {
                    if record.original_is_empty() && storage.is_empty() {
                        continue;
                    }
                    AccountDiff {
                        balance: Delta::Died(record.balance.from),
                        nonce: Delta::Died(U64::from(record.nonce.from)),
                        code: Delta::Died(HexBytes(record.code.from)),
                        storage,
                    }
                }
                Lifecycle::Changed => {
                    let account = AccountDiff {
                        balance: Delta::compare(record.balance.from, record.balance.to),
                        nonce: Delta::compare(
                            U64::from(record.nonce.from),
                            U64::from(record.nonce.to),
                        ),
                        code: Delta::compare(
                            HexBytes(record.code.from),
                            HexBytes(record.code.to),
                        ),
                        storage,
                    };
                    if account.balance.is_same()
                        && account.nonce.is_same()
                        && account.code.is_same()
                        && account.storage.is_empty()
                    {
                        continue;
                    }
                    account
                }
            };
            diff.insert(address, account);
        }
        Ok(diff)
    }
}
