//! Errors surfaced by the mocknet runtime.
//!
//! Host functions raise [`MocknetError`]s through wasmtime as traps. When the
//! guest call unwinds, [`MocknetError::from_trap`] recovers the original error
//! and records it as the `cause` of a [`MocknetError::ContractCrashed`], so a
//! caller can tell a failed nested query apart from a guest `unreachable`.

use serde_json::Value;
use thiserror::Error;

use crate::runtime::{CodeId, LinkerError};

#[derive(Error, Debug)]
pub enum MocknetError {
    #[error("Unknown code id: {0}")]
    UnknownCodeId(CodeId),

    #[error("Unknown contract: {0}")]
    UnknownContract(String),

    #[error("Instantiate message is missing")]
    MissingInitMessage,

    #[error("Region overflow: {needed} bytes do not fit a region of capacity {capacity}")]
    RegionOverflow { needed: usize, capacity: u32 },

    #[error("Invalid region at {ptr:#x}: {reason}")]
    InvalidRegion { ptr: u32, reason: String },

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Contract {address} returned an error: {payload}")]
    ContractError { address: String, payload: Value },

    #[error("Contract {address} crashed: {message}")]
    ContractCrashed {
        address: String,
        message: String,
        #[source]
        cause: Option<Box<MocknetError>>,
    },

    #[error("Guest does not export `{0}`")]
    MissingExport(String),

    #[error("Failed to compile code {code_id}: {message}")]
    Compile { code_id: CodeId, message: String },

    #[error("Failed to instantiate guest module: {0}")]
    Instantiation(String),

    #[error("Guest trapped: {0}")]
    Trap(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },

    #[error("Code hash mismatch: expected {expected}, found {actual}")]
    CodeHashMismatch { expected: String, actual: String },

    #[error("Sub-message dispatch exceeded the maximum depth of {max}")]
    DispatchDepthExceeded { max: usize },

    #[error("Contract {0} is already executing")]
    ContractBusy(String),

    #[error("Contract aborted: {0}")]
    Aborted(String),

    #[error("Invalid WASM module: {0}")]
    InvalidModule(String),

    #[error("Code id {0} is already in use")]
    DuplicateCodeId(CodeId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("The mocknet this contract belongs to has been dropped")]
    ChainDropped,

    #[error(transparent)]
    Linker(#[from] LinkerError),
}

impl MocknetError {
    /// Convert the error a guest call unwound with into a crash report.
    ///
    /// Errors raised by our own host functions are recovered intact and kept
    /// as the `cause`; anything else (an `unreachable`, an out-of-bounds
    /// access) only contributes its message.
    pub(crate) fn from_trap(address: &str, error: anyhow::Error) -> Self {
        match error.downcast::<MocknetError>() {
            Ok(cause) => cause.into_crash(address),
            Err(trap) => MocknetError::ContractCrashed {
                address: address.to_string(),
                message: trap.root_cause().to_string(),
                cause: None,
            },
        }
    }

    /// Attribute a failure that happened while running `address` to that contract.
    pub(crate) fn into_crash(self, address: &str) -> Self {
        match self {
            crash @ MocknetError::ContractCrashed { .. } if crash.crashed_address() == Some(address) => crash,
            cause => MocknetError::ContractCrashed {
                address: address.to_string(),
                message: cause.to_string(),
                cause: Some(Box::new(cause)),
            },
        }
    }

    fn crashed_address(&self) -> Option<&str> {
        match self {
            MocknetError::ContractCrashed { address, .. } => Some(address),
            _ => None,
        }
    }

    /// The innermost error of a chain of crashes.
    pub fn root_cause(&self) -> &MocknetError {
        let mut current = self;
        while let MocknetError::ContractCrashed { cause: Some(cause), .. } = current {
            current = cause;
        }
        current
    }

    /// Whether the failure originated inside a guest rather than in the host.
    pub fn is_contract_failure(&self) -> bool {
        matches!(
            self,
            MocknetError::ContractError { .. } | MocknetError::ContractCrashed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_survive_a_trap() {
        let trap = anyhow::Error::new(MocknetError::UnsupportedQuery("bank".into()))
            .context("wasm backtrace");
        let crashed = MocknetError::from_trap("secret1a", trap);

        match &crashed {
            MocknetError::ContractCrashed { address, cause, .. } => {
                assert_eq!(address, "secret1a");
                assert!(matches!(
                    cause.as_deref(),
                    Some(MocknetError::UnsupportedQuery(_))
                ));
            }
            other => panic!("expected a crash, got {other:?}"),
        }
    }

    #[test]
    fn foreign_traps_keep_their_message() {
        let crashed = MocknetError::from_trap("secret1a", anyhow::anyhow!("unreachable executed"));
        match crashed {
            MocknetError::ContractCrashed { message, cause, .. } => {
                assert_eq!(message, "unreachable executed");
                assert!(cause.is_none());
            }
            other => panic!("expected a crash, got {other:?}"),
        }
    }

    #[test]
    fn nested_crashes_are_walked_to_the_root() {
        let inner = MocknetError::Aborted("panicked".into()).into_crash("secret1b");
        let outer = inner.into_crash("secret1a");
        assert!(matches!(outer.root_cause(), MocknetError::Aborted(_)));
        assert!(outer.is_contract_failure());
    }

    #[test]
    fn crash_is_not_rewrapped_for_the_same_contract() {
        let crash = MocknetError::Trap("oops".into()).into_crash("secret1a");
        let again = crash.into_crash("secret1a");
        assert!(matches!(
            again,
            MocknetError::ContractCrashed { cause: Some(ref c), .. } if matches!(**c, MocknetError::Trap(_))
        ));
    }
}
