//! Parity/OpenEthereum style call tracer.
//!
//! Rebuilds the call tree of a transaction either from opcode steps or from
//! enter/exit call boundaries, and flattens it into a depth-first list of
//! [`TraceEntry`] values addressed by `traceAddress`.

use bytes::Bytes;
use ethereum_types::{Address, U256};
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::{
    config::TracerConfig,
    error::TracerError,
    frame::{CallKind, EnterFrame, ExitResult, ResultContext, StepFrame, TraceMeta, word_to_address},
    host::Host,
    opcodes::Opcode,
    types::{
        Action, CallAction, CallResult, CreateAction, CreateResult, SuicideAction, TraceEntry,
        TraceResult, TraceType,
    },
};

const EXECUTION_REVERTED: &str = "execution reverted";
const OUT_OF_GAS: &str = "out of gas";

/// Interpreter errors with a fixed Parity counterpart.
const PARITY_ERRORS: &[(&str, &str)] = &[
    ("contract creation code storage out of gas", "Out of gas"),
    ("out of gas", "Out of gas"),
    ("gas uint64 overflow", "Out of gas"),
    ("max code size exceeded", "Out of gas"),
    ("invalid jump destination", "Bad jump destination"),
    ("execution reverted", "Reverted"),
    ("return data out of bounds", "Out of bounds"),
    ("stack limit reached 1024 (1023)", "Out of stack"),
    ("precompiled failed", "Built-in failed"),
    ("invalid input length", "Built-in failed"),
];

/// Interpreter error prefixes with a Parity counterpart.
const PARITY_ERROR_PREFIXES: &[(&str, &str)] = &[
    ("invalid opcode:", "Bad instruction"),
    ("stack underflow", "Stack underflow"),
];

/// Parity message for an interpreter error, if one exists.
pub fn parity_error(error: &str) -> Option<&'static str> {
    PARITY_ERRORS
        .iter()
        .find(|(geth, _)| *geth == error)
        .or_else(|| {
            PARITY_ERROR_PREFIXES
                .iter()
                .find(|(prefix, _)| error.starts_with(prefix))
        })
        .map(|(_, parity)| *parity)
}

/// One node of the call tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFrame {
    pub kind: CallKind,
    pub from: Address,
    /// Unknown for a creation until the new address is returned.
    pub to: Option<Address>,
    pub input: Bytes,
    pub output: Option<Bytes>,
    /// `None` for DELEGATECALL/STATICCALL, which report the caller's value.
    pub value: Option<U256>,
    /// Gas handed to the callee.
    pub gas: Option<u64>,
    pub gas_used: Option<u64>,
    pub error: Option<String>,
    pub calls: Vec<CallFrame>,
    gas_in: u64,
    gas_cost: u64,
}

#[derive(Debug)]
pub struct CallStackTracer {
    /// Open frames. Index 0 is the transaction's outermost frame.
    stack: Vec<CallFrame>,
    /// A frame was pushed by the previous step and has not executed yet.
    descended: bool,
    precompiles: FxHashSet<Address>,
    skip_call_errors: Vec<String>,
}

impl CallStackTracer {
    pub fn new(config: &TracerConfig) -> Self {
        Self {
            stack: vec![CallFrame::default()],
            descended: false,
            precompiles: config.precompile_set(),
            skip_call_errors: config.skip_call_errors.clone(),
        }
    }

    /// The nested call tree as built so far.
    pub fn call_tree(&self) -> Option<&CallFrame> {
        self.stack.first()
    }

    pub fn step(&mut self, frame: &StepFrame<'_>, host: &dyn Host) -> Result<(), TracerError> {
        if self.descended {
            if frame.depth >= self.stack.len() {
                if let Some(top) = self.stack.last_mut() {
                    top.gas = Some(frame.gas);
                }
            }
            self.descended = false;
        }

        // Back in a caller: every deeper frame has returned.
        while self.stack.len() > 1 && frame.depth < self.stack.len() {
            self.finish_returned(frame);
        }

        if frame.error.is_some() {
            self.fault(frame);
            return Ok(());
        }

        let op = frame.op;
        if op.is_create() {
            self.push_create(frame);
        } else if op == Opcode::SELFDESTRUCT {
            let balance = host.get_balance(frame.contract)?;
            if let Some(top) = self.stack.last_mut() {
                top.calls.push(CallFrame {
                    kind: CallKind::SelfDestruct,
                    from: frame.contract,
                    to: frame.peek_address(0),
                    value: Some(balance),
                    gas_in: frame.gas,
                    gas_cost: frame.cost,
                    ..Default::default()
                });
            }
        } else if op.is_call() {
            self.push_call(frame);
        } else if op == Opcode::REVERT {
            if let Some(top) = self.stack.last_mut() {
                top.error = Some(EXECUTION_REVERTED.to_string());
            }
        } else if op == Opcode::RETURN {
            let output = frame.memory_slice(
                frame.peek(0).unwrap_or_default(),
                frame.peek(1).unwrap_or_default(),
            );
            if let Some(top) = self.stack.last_mut() {
                top.output = Some(output);
            }
        }
        Ok(())
    }

    fn push_create(&mut self, frame: &StepFrame<'_>) {
        let Some(kind) = CallKind::from_opcode(frame.op) else {
            return;
        };
        let input = frame.memory_slice(
            frame.peek(1).unwrap_or_default(),
            frame.peek(2).unwrap_or_default(),
        );
        self.stack.push(CallFrame {
            kind,
            from: frame.contract,
            input,
            value: frame.peek(0),
            gas_in: frame.gas,
            gas_cost: frame.cost,
            ..Default::default()
        });
        self.descended = true;
    }

    fn push_call(&mut self, frame: &StepFrame<'_>) {
        let Some(kind) = CallKind::from_opcode(frame.op) else {
            return;
        };
        let Some(to) = frame.peek_address(1) else {
            return;
        };
        if self.precompiles.contains(&to) {
            trace!(to = ?to, "Skipping call to precompile");
            return;
        }
        // DELEGATECALL and STATICCALL carry no value operand.
        let offset = match kind {
            CallKind::DelegateCall | CallKind::StaticCall => 0,
            _ => 1,
        };
        let input = frame.memory_slice(
            frame.peek(2 + offset).unwrap_or_default(),
            frame.peek(3 + offset).unwrap_or_default(),
        );
        let value = match kind {
            CallKind::Call | CallKind::CallCode => frame.peek(2),
            _ => None,
        };
        self.stack.push(CallFrame {
            kind,
            from: frame.contract,
            to: Some(to),
            input,
            value,
            gas_in: frame.gas,
            gas_cost: frame.cost,
            ..Default::default()
        });
        self.descended = true;
    }

    /// Pops the top frame once its caller resumes, settling gas and the callee
    /// address from the value the call left on the caller's stack.
    fn finish_returned(&mut self, frame: &StepFrame<'_>) {
        let Some(mut call) = self.stack.pop() else {
            return;
        };
        let ret = frame.peek(0).unwrap_or_default();

        if call.kind.is_create() {
            let used = call
                .gas_in
                .saturating_sub(call.gas_cost)
                .saturating_sub(frame.gas);
            call.gas_used = Some(used);
            if !ret.is_zero() {
                call.to = Some(word_to_address(ret));
            } else if call.error.is_none() {
                if call.gas != Some(used) {
                    debug!(from = ?call.from, "Dropping failed creation");
                    return;
                }
                call.error = Some(OUT_OF_GAS.to_string());
            }
        } else {
            let spent = i128::from(call.gas_in) - i128::from(call.gas_cost);
            match call.gas {
                Some(granted) => {
                    let used = spent + i128::from(granted) - i128::from(frame.gas);
                    if let Ok(used) = u64::try_from(used) {
                        call.gas_used = Some(used);
                    }
                }
                None => {
                    // The callee ran no code, so its allowance was never observed.
                    let gas = (spent - i128::from(frame.gas)).unsigned_abs();
                    call.gas = Some(u64::try_from(gas).unwrap_or(u64::MAX));
                    call.gas_used = Some(0);
                }
            }
            if ret.is_zero() && call.error.is_none() {
                if call.gas.is_none() || call.gas != call.gas_used {
                    debug!(to = ?call.to, "Dropping failed call");
                    return;
                }
                call.error = Some(OUT_OF_GAS.to_string());
            }
            if call.output.is_none() {
                call.output = Some(Bytes::new());
            }
        }

        if let Some(parent) = self.stack.last_mut() {
            parent.calls.push(call);
        }
    }

    /// Marks the executing frame as failed and closes it.
    pub fn fault(&mut self, frame: &StepFrame<'_>) {
        if self.stack.last().is_none_or(|top| top.error.is_some()) {
            return;
        }
        let Some(mut call) = self.stack.pop() else {
            return;
        };

        if let Some(call_error) = frame.call_error {
            if self.is_skipped_error(call_error) {
                debug!(error = call_error, "Discarding frame for skipped call error");
                if self.stack.is_empty() {
                    self.stack.push(call);
                }
                return;
            }
        }

        let error = frame
            .call_error
            .or(frame.error)
            .unwrap_or("execution aborted");
        debug!(pc = frame.pc, op = %frame.op, error, "Frame failed");
        call.error = Some(error.to_string());
        match call.gas {
            Some(granted) => call.gas_used = Some(granted),
            None => call.gas = Some(frame.gas),
        }
        match self.stack.last_mut() {
            Some(parent) => parent.calls.push(call),
            None => self.stack.push(call),
        }
    }

    fn is_skipped_error(&self, error: &str) -> bool {
        self.skip_call_errors
            .iter()
            .any(|skip| error.contains(skip.as_str()))
    }

    pub fn enter(&mut self, frame: &EnterFrame) {
        self.stack.push(CallFrame {
            kind: frame.kind,
            from: frame.from,
            to: Some(frame.to),
            input: frame.input.clone(),
            value: frame.value,
            gas: Some(frame.gas),
            ..Default::default()
        });
    }

    pub fn exit(&mut self, result: &ExitResult) {
        if self.stack.len() <= 1 {
            warn!("Call exit without a matching enter");
            return;
        }
        let Some(mut call) = self.stack.pop() else {
            return;
        };
        if call.kind.is_call() && call.to.is_some_and(|to| self.precompiles.contains(&to)) {
            trace!(to = ?call.to, "Skipping call to precompile");
            return;
        }
        if let Some(error) = result.error.as_deref() {
            if self.is_skipped_error(error) {
                debug!(error, "Discarding frame for skipped call error");
                return;
            }
        }

        call.gas_used = Some(result.gas_used);
        match &result.error {
            None => call.output = Some(result.output.clone()),
            Some(error) => {
                call.error = Some(error.clone());
                if call.kind.is_create() {
                    call.to = None;
                }
            }
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.calls.push(call);
        }
    }

    /// Completes the outermost frame from the transaction result and flattens
    /// the tree.
    pub fn result(self, ctx: &ResultContext) -> Vec<TraceEntry> {
        let mut stack = self.stack;
        while stack.len() > 1 {
            let Some(open) = stack.pop() else {
                break;
            };
            debug!(kind = open.kind.as_str(), "Closing frame left open at end of trace");
            if let Some(parent) = stack.last_mut() {
                parent.calls.push(open);
            }
        }
        let outer = stack.pop().unwrap_or_default();

        let error = outer.error.or_else(|| ctx.error.clone());
        let keep_output = match &error {
            None => true,
            Some(error) => error == EXECUTION_REVERTED && !ctx.output.is_empty(),
        };
        let root = CallFrame {
            kind: ctx.kind.into(),
            from: ctx.from,
            to: Some(ctx.to),
            input: ctx.input.clone(),
            output: keep_output.then(|| ctx.output.clone()),
            value: Some(ctx.value),
            gas: Some(ctx.gas),
            gas_used: Some(ctx.gas_used),
            error,
            calls: outer.calls,
            ..Default::default()
        };

        let mut entries = Vec::new();
        flatten(root, Vec::new(), None, &ctx.meta, &mut entries);
        entries
    }
}

/// Appends `call` and then its descendants, depth first, to `out`.
fn flatten(
    call: CallFrame,
    trace_address: Vec<usize>,
    parent_value: Option<U256>,
    meta: &TraceMeta,
    out: &mut Vec<TraceEntry>,
) {
    let value = match call.kind {
        CallKind::DelegateCall | CallKind::StaticCall => call.value.or(parent_value),
        _ => call.value,
    };

    let CallFrame {
        kind,
        from,
        to,
        input,
        output,
        gas,
        gas_used,
        error,
        calls,
        ..
    } = call;

    let (trace_type, action, result) = match kind {
        CallKind::Create | CallKind::Create2 => (
            TraceType::Create,
            Action::Create(CreateAction {
                from,
                value,
                gas,
                init: input,
                creation_method: kind.as_str(),
            }),
            TraceResult::Create(CreateResult {
                gas_used,
                code: output,
                address: to,
            }),
        ),
        CallKind::SelfDestruct => (
            TraceType::Suicide,
            Action::Suicide(SuicideAction {
                address: from,
                refund_address: to.unwrap_or_default(),
                balance: value.unwrap_or_default(),
            }),
            TraceResult::Suicide,
        ),
        _ => (
            TraceType::Call,
            Action::Call(CallAction {
                from,
                to,
                value,
                gas,
                input,
                call_type: kind.as_str(),
            }),
            TraceResult::Call(CallResult { gas_used, output }),
        ),
    };

    let (error, result) = match error {
        Some(error) => match parity_error(&error) {
            Some(parity) => (Some(parity.to_string()), None),
            None => (Some(error), Some(result)),
        },
        None => (None, Some(result)),
    };

    out.push(TraceEntry {
        trace_type,
        action,
        result,
        error,
        trace_address: trace_address.clone(),
        subtraces: calls.len(),
        transaction_position: meta.transaction_position,
        transaction_hash: meta.transaction_hash,
        block_number: meta.block_number,
        block_hash: meta.block_hash,
    });

    for (index, child) in calls.into_iter().enumerate() {
        let mut child_address = trace_address.clone();
        child_address.push(index);
        flatten(child, child_address, value, meta, out);
    }
}
