//! Transaction tracers for the Parity/OpenEthereum trace formats.
//!
//! Three passive tracers observe a single transaction through interpreter hooks
//! and render a JSON-serializable result:
//!
//! - [`CallStackTracer`]: flattened call trace with `traceAddress` addressing.
//! - [`PrestateTracer`]: pre-execution values of every touched account and slot.
//! - [`StateDiffTracer`]: net per-account changes with `+`/`-`/`*`/`=` markers.
//!
//! The host provides world-state reads and contract address derivation through
//! the [`Host`] trait.

pub mod call_tracer;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod opcodes;
pub mod prestate;
pub mod serde_utils;
pub mod state_diff;
pub mod tracer;
pub mod types;

pub use call_tracer::{CallFrame, CallStackTracer};
pub use config::{TracerConfig, TracerKind};
pub use error::{DatabaseError, TracerError};
pub use frame::{
    CallKind, EnterFrame, ExitResult, ResultContext, StepFrame, TraceMeta, TxContext, TxKind,
};
pub use host::{AddressDerivation, Database, Host};
pub use opcodes::Opcode;
pub use prestate::PrestateTracer;
pub use state_diff::StateDiffTracer;
pub use tracer::Tracer;
pub use types::{
    AccountDiff, AccountSnapshot, Delta, Prestate, StateDiff, TraceEntry, TraceOutput,
};

#[cfg(test)]
mod tests;
