//! The closed set of tracers behind one hook interface.
//!
//! Hosts drive a [`Tracer`] with `init` (optional), then either `step`/`fault`
//! for every opcode or `enter`/`exit` for every call boundary, and finish with
//! `result`, which consumes the tracer.

use tracing::debug;

use crate::{
    call_tracer::CallStackTracer,
    config::{TracerConfig, TracerKind},
    error::TracerError,
    frame::{EnterFrame, ExitResult, ResultContext, StepFrame, TxContext},
    host::Host,
    prestate::PrestateTracer,
    state_diff::StateDiffTracer,
    types::TraceOutput,
};

#[derive(Debug)]
pub enum Tracer {
    CallStack(CallStackTracer),
    Prestate(PrestateTracer),
    StateDiff(StateDiffTracer),
}

impl Tracer {
    pub fn new(config: &TracerConfig) -> Self {
        match config.tracer {
            TracerKind::CallStack => Tracer::CallStack(CallStackTracer::new(config)),
            TracerKind::Prestate => Tracer::Prestate(PrestateTracer::new()),
            TracerKind::StateDiff => Tracer::StateDiff(StateDiffTracer::new(config)),
        }
    }

    pub fn kind(&self) -> TracerKind {
        match self {
            Tracer::CallStack(_) => TracerKind::CallStack,
            Tracer::Prestate(_) => TracerKind::Prestate,
            Tracer::StateDiff(_) => TracerKind::StateDiff,
        }
    }

    pub fn init(&mut self, ctx: &TxContext, host: &dyn Host) -> Result<(), TracerError> {
        match self {
            Tracer::CallStack(_) => Ok(()),
            Tracer::Prestate(tracer) => tracer.init(ctx, host),
            Tracer::StateDiff(tracer) => tracer.init(ctx, host),
        }
    }

    pub fn step(&mut self, frame: &StepFrame<'_>, host: &dyn Host) -> Result<(), TracerError> {
        match self {
            Tracer::CallStack(tracer) => tracer.step(frame, host),
            Tracer::Prestate(tracer) => tracer.step(frame, host),
            Tracer::StateDiff(tracer) => tracer.step(frame, host),
        }
    }

    /// Reports a failing opcode. Hosts use either this or `step` with
    /// `frame.error` set, never both for the same opcode.
    pub fn fault(&mut self, frame: &StepFrame<'_>) {
        match self {
            Tracer::CallStack(tracer) => tracer.fault(frame),
            Tracer::Prestate(_) => {}
            Tracer::StateDiff(tracer) => tracer.fault(frame),
        }
    }

    pub fn enter(&mut self, frame: &EnterFrame, host: &dyn Host) -> Result<(), TracerError> {
        match self {
            Tracer::CallStack(tracer) => {
                tracer.enter(frame);
                Ok(())
            }
            Tracer::Prestate(tracer) => tracer.enter(frame, host),
            Tracer::StateDiff(tracer) => tracer.enter(frame, host),
        }
    }

    pub fn exit(&mut self, result: &ExitResult) {
        match self {
            Tracer::CallStack(tracer) => tracer.exit(result),
            Tracer::Prestate(_) => {}
            Tracer::StateDiff(tracer) => tracer.exit(result),
        }
    }

    pub fn result(self, ctx: &ResultContext, host: &dyn Host) -> Result<TraceOutput, TracerError> {
        debug!(tracer = ?self.kind(), error = ?ctx.error, "Finalizing trace");
        let output = match self {
            Tracer::CallStack(tracer) => TraceOutput::CallStack(tracer.result(ctx)),
            Tracer::Prestate(tracer) => TraceOutput::Prestate(tracer.result(ctx)),
            Tracer::StateDiff(tracer) => TraceOutput::StateDiff(tracer.result(ctx, host)?),
        };
        Ok(output)
    }
}
