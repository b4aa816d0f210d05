//! Tracer selection and options.
//!
//! `TracerConfig` is read either from the JSON `tracerConfig` object of a
//! debug/trace request or from a TOML file:
//!
//! ```toml
//! tracer = "stateDiffTracer"
//! precompiles = ["0x0000000000000000000000000000000000000001"]
//! skipCallErrors = ["insufficient balance for transfer"]
//! ```

use ethereum_types::Address;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::TracerError;

/// Highest precompile address active by default (0x0a, point evaluation).
pub const DEFAULT_LAST_PRECOMPILE: u64 = 0x0a;

/// Call-level errors whose failed frames are left out of the call trace.
pub const DEFAULT_SKIP_CALL_ERRORS: &[&str] = &["insufficient balance for transfer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TracerKind {
    #[default]
    #[serde(rename = "callParityTracer", alias = "callTracerParity")]
    CallStack,
    #[serde(rename = "prestateTracer")]
    Prestate,
    #[serde(rename = "stateDiffTracer")]
    StateDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TracerConfig {
    pub tracer: TracerKind,
    /// Addresses treated as precompiled contracts. Calls to them are not traced.
    pub precompiles: Vec<Address>,
    pub skip_call_errors: Vec<String>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            tracer: TracerKind::default(),
            precompiles: (1..=DEFAULT_LAST_PRECOMPILE)
                .map(Address::from_low_u64_be)
                .collect(),
            skip_call_errors: DEFAULT_SKIP_CALL_ERRORS
                .iter()
                .map(|err| err.to_string())
                .collect(),
        }
    }
}

impl TracerConfig {
    pub fn with_tracer(tracer: TracerKind) -> Self {
        Self {
            tracer,
            ..Default::default()
        }
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, TracerError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self, TracerError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TracerError> {
        let mut seen = FxHashSet::default();
        for address in &self.precompiles {
            if address.is_zero() {
                return Err(TracerError::Config(
                    "precompiles must not contain the zero address".to_string(),
                ));
            }
            if !seen.insert(*address) {
                return Err(TracerError::Config(format!(
                    "precompile {address:#x} listed twice"
                )));
            }
        }
        if self.skip_call_errors.iter().any(|err| err.trim().is_empty()) {
            return Err(TracerError::Config(
                "skipCallErrors entries must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn precompile_set(&self) -> FxHashSet<Address> {
        self.precompiles.iter().copied().collect()
    }
}
