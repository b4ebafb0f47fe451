//! Sub-message dispatch.
//!
//! After a successful instantiate or execute, the messages in the response
//! are run in order, each as a call from the emitting contract. A failure
//! aborts the remaining messages and is returned to the top-level caller;
//! effects of the messages that already ran are kept.

use std::sync::Arc;

use mocknet_std::{Binary, Coin, CosmosMsg, WasmMsg};
use serde_json::Value;
use tracing::{debug, warn};

use super::registry::CodeId;
use super::{Chain, InstantiateOptions};
use crate::error::MocknetError;

/// A sub-message the mocknet knows how to run.
#[derive(Debug, Clone, PartialEq)]
pub enum SubMessage {
    Instantiate {
        code_id: CodeId,
        callback_code_hash: String,
        label: String,
        msg: Value,
        funds: Vec<Coin>,
    },
    Execute {
        contract_addr: String,
        callback_code_hash: String,
        msg: Value,
        funds: Vec<Coin>,
    },
    /// Anything else; logged and skipped.
    Unsupported(Value),
}

impl SubMessage {
    /// Classify one entry of `Response::messages`.
    ///
    /// Accepts both bare messages and the `{"id":..,"msg":{..}}` wrapper.
    /// A `wasm.instantiate` or `wasm.execute` that is malformed is an error
    /// rather than something to skip.
    pub fn parse(message: &Value) -> Result<Self, MocknetError> {
        let inner = match message.get("msg") {
            Some(wrapped) if message.get("wasm").is_none() && wrapped.is_object() => wrapped,
            _ => message,
        };

        let understood = inner
            .get("wasm")
            .is_some_and(|wasm| wasm.get("instantiate").is_some() || wasm.get("execute").is_some());
        if !understood {
            return Ok(SubMessage::Unsupported(message.clone()));
        }

        let CosmosMsg::Wasm(wasm) = serde_json::from_value::<CosmosMsg>(inner.clone())
            .map_err(|e| MocknetError::Protocol(format!("malformed wasm sub-message: {e}")))?;
        Ok(match wasm {
            WasmMsg::Instantiate {
                code_id,
                callback_code_hash,
                label,
                msg,
                send,
            } => SubMessage::Instantiate {
                code_id,
                callback_code_hash,
                label,
                msg: decode_msg(&msg)?,
                funds: send,
            },
            WasmMsg::Execute {
                contract_addr,
                callback_code_hash,
                msg,
                send,
            } => SubMessage::Execute {
                contract_addr,
                callback_code_hash,
                msg: decode_msg(&msg)?,
                funds: send,
            },
        })
    }
}

fn decode_msg(msg: &Binary) -> Result<Value, MocknetError> {
    msg.decode_json()
        .map_err(|e| MocknetError::Protocol(format!("sub-message payload is not JSON: {e}")))
}

/// Fails when a non-empty expected hash disagrees with the actual one.
pub(crate) fn check_code_hash(expected: &str, actual: &str) -> Result<(), MocknetError> {
    if expected.is_empty() || expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(MocknetError::CodeHashMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

pub(crate) struct CallDispatcher<'a> {
    chain: &'a Arc<Chain>,
    /// Depth of the call whose response is being dispatched.
    depth: usize,
}

impl<'a> CallDispatcher<'a> {
    pub(crate) fn new(chain: &'a Arc<Chain>, depth: usize) -> Self {
        Self { chain, depth }
    }

    pub(crate) fn dispatch(&self, sender: &str, messages: &[Value]) -> Result<(), MocknetError> {
        if messages.is_empty() {
            return Ok(());
        }

        let depth = self.depth + 1;
        let max = self.chain.config.max_dispatch_depth;
        if depth > max {
            warn!(%sender, depth, max, "sub-message depth limit reached");
            return Err(MocknetError::DispatchDepthExceeded { max });
        }

        for message in messages {
            match SubMessage::parse(message)? {
                SubMessage::Instantiate {
                    code_id,
                    callback_code_hash,
                    label,
                    msg,
                    funds,
                } => {
                    let actual = self.chain.code_hash_of(code_id)?;
                    check_code_hash(&callback_code_hash, &actual)?;
                    debug!(%sender, code_id, %label, depth, "dispatching instantiate");

                    let options = InstantiateOptions::new(label, sender)
                        .with_init_msg(msg)
                        .with_funds(funds);
                    self.chain.instantiate_at(depth, code_id, options)?;
                }
                SubMessage::Execute {
                    contract_addr,
                    callback_code_hash,
                    msg,
                    funds,
                } => {
                    let actual = self.chain.contract_code_hash(&contract_addr)?;
                    check_code_hash(&callback_code_hash, &actual)?;
                    debug!(%sender, target = %contract_addr, depth, "dispatching execute");

                    self.chain
                        .execute_at(depth, &contract_addr, &msg, sender, funds)?;
                }
                SubMessage::Unsupported(message) => {
                    warn!(%sender, %message, "skipping unsupported sub-message");
                }
            }
        }
        Ok(())
    }
}
