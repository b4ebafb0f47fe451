//! ABI generations
//!
//! Two calling conventions are in circulation. They agree on regions, JSON
//! payloads and storage imports, and differ in entry-point names, in how
//! the execution context is shaped, and in the extra imports they expect:
//!
//! | | v0 | v1 |
//! |---|---|---|
//! | entry points | `init(env, msg)`, `handle(env, msg)`, `query(msg)` | `instantiate(env, info, msg)`, `execute(env, info, msg)`, `query(env, msg)` |
//! | address imports | `canonicalize_address`, `humanize_address` | `addr_canonicalize`, `addr_humanize`, `addr_validate` |
//! | other imports | none | crypto stubs, `debug`, `abort` |
//! | envelope tags | `Ok` / `Err` | `ok` / `err` |

use std::fmt;
use std::str::FromStr;

use mocknet_std::{v0, v1, Binary, ContractResult, SystemResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use wasmtime::Caller;

use super::contract::ExecutionContext;
use super::host::{HostFunctionProvider, HostLinkerBuilder, LinkerError, ENV_MODULE};
use super::imports::{calling_guest, HostEnv};
use crate::address;
use crate::error::MocknetError;

/// The contract entry points, independent of their exported names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Instantiate,
    Execute,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiAdapter {
    V0,
    #[default]
    V1,
}

const V0_IMPORTS: &[&str] = &["canonicalize_address", "humanize_address"];

const V1_IMPORTS: &[&str] = &[
    "addr_canonicalize",
    "addr_humanize",
    "addr_validate",
    "secp256k1_verify",
    "secp256k1_recover_pubkey",
    "ed25519_verify",
    "ed25519_batch_verify",
    "debug",
    "abort",
];

impl AbiAdapter {
    pub fn export_name(self, entry: EntryPoint) -> &'static str {
        match (self, entry) {
            (AbiAdapter::V0, EntryPoint::Instantiate) => "init",
            (AbiAdapter::V0, EntryPoint::Execute) => "handle",
            (AbiAdapter::V1, EntryPoint::Instantiate) => "instantiate",
            (AbiAdapter::V1, EntryPoint::Execute) => "execute",
            (_, EntryPoint::Query) => "query",
        }
    }

    /// Imports this generation adds on top of the shared storage and querier imports.
    pub fn extra_imports(self) -> &'static [&'static str] {
        match self {
            AbiAdapter::V0 => V0_IMPORTS,
            AbiAdapter::V1 => V1_IMPORTS,
        }
    }

    /// Every `env` import a guest of this generation may use.
    pub fn import_names(self) -> Vec<&'static str> {
        let mut names = super::imports::ImportBridge::IMPORTS.to_vec();
        names.extend_from_slice(self.extra_imports());
        names
    }

    /// The JSON arguments that precede the message for `entry`.
    pub fn context_args(
        self,
        entry: EntryPoint,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Value>, MocknetError> {
        let args = match (self, entry) {
            (AbiAdapter::V0, EntryPoint::Query) => vec![],
            (AbiAdapter::V0, _) => vec![serde_json::to_value(v0_env(ctx))?],
            (AbiAdapter::V1, EntryPoint::Query) => vec![serde_json::to_value(v1_env(ctx))?],
            (AbiAdapter::V1, _) => vec![
                serde_json::to_value(v1_env(ctx))?,
                serde_json::to_value(v1::MessageInfo {
                    sender: ctx.sender.clone(),
                    funds: ctx.funds.clone(),
                })?,
            ],
        };
        Ok(args)
    }

    /// Encode a querier reply with the envelope tags this generation expects.
    pub fn querier_reply(
        self,
        reply: SystemResult<ContractResult<Binary>>,
    ) -> Result<Value, MocknetError> {
        let value = serde_json::to_value(&reply)?;
        Ok(match self {
            AbiAdapter::V0 => value,
            AbiAdapter::V1 => lowercase_tags(value, 2),
        })
    }
}

fn v0_env(ctx: &ExecutionContext) -> v0::Env {
    v0::Env {
        block: v0::BlockInfo {
            height: ctx.block.height,
            time: ctx.block.time,
            chain_id: ctx.chain_id.clone(),
        },
        message: v0::MessageInfo {
            sender: ctx.sender.clone(),
            sent_funds: ctx.funds.clone(),
        },
        contract: v0::ContractInfo {
            address: ctx.contract_address.clone(),
        },
        contract_key: None,
        contract_code_hash: ctx.code_hash.clone(),
    }
}

fn v1_env(ctx: &ExecutionContext) -> v1::Env {
    v1::Env {
        block: v1::BlockInfo {
            height: ctx.block.height,
            time: v1::Timestamp::from_seconds(ctx.block.time),
            chain_id: ctx.chain_id.clone(),
        },
        transaction: None,
        contract: v1::ContractInfo {
            address: ctx.contract_address.clone(),
            code_hash: ctx.code_hash.clone(),
        },
    }
}

// Rewrites `Ok`/`Err` keys of the outer `levels` single-key objects.
fn lowercase_tags(value: Value, levels: usize) -> Value {
    match value {
        Value::Object(map) if levels > 0 && map.len() == 1 => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(tag, inner)| {
                    let tag = match tag.as_str() {
                        "Ok" => "ok".to_string(),
                        "Err" => "err".to_string(),
                        _ => tag,
                    };
                    (tag, lowercase_tags(inner, levels - 1))
                })
                .collect();
            Value::Object(map)
        }
        other => other,
    }
}

impl fmt::Display for AbiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiAdapter::V0 => f.write_str("v0"),
            AbiAdapter::V1 => f.write_str("v1"),
        }
    }
}

impl FromStr for AbiAdapter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v0" | "0.10" => Ok(AbiAdapter::V0),
            "v1" | "1.0" => Ok(AbiAdapter::V1),
            other => Err(format!("unknown ABI `{other}`, expected `v0` or `v1`")),
        }
    }
}

impl HostFunctionProvider<HostEnv> for AbiAdapter {
    fn register(&self, builder: &mut HostLinkerBuilder<'_, HostEnv>) -> Result<(), LinkerError> {
        let mut env = builder.interface(ENV_MODULE)?;
        match self {
            AbiAdapter::V0 => {
                env.func_raw("canonicalize_address", canonicalize_address)?
                    .func_raw("humanize_address", humanize_address)?;
            }
            AbiAdapter::V1 => {
                env.func_raw("addr_canonicalize", canonicalize_address)?
                    .func_raw("addr_humanize", humanize_address)?
                    .func_raw("addr_validate", addr_validate)?
                    .func_raw("secp256k1_verify", secp256k1_verify)?
                    .func_raw("secp256k1_recover_pubkey", secp256k1_recover_pubkey)?
                    .func_raw("ed25519_verify", ed25519_verify)?
                    .func_raw("ed25519_batch_verify", ed25519_batch_verify)?
                    .func_raw("debug", debug_print)?
                    .func_raw("abort", abort)?;
            }
        }
        Ok(())
    }
}

// Address conversions answer 0 on success. A malformed address is reported
// back to the guest as a region holding the error message; a destination
// region that is too small traps.

fn canonicalize_address(
    mut caller: Caller<'_, HostEnv>,
    source_ptr: u32,
    destination_ptr: u32,
) -> anyhow::Result<u32> {
    let mut guest = calling_guest(&mut caller)?;
    let human = guest.peek_utf8(source_ptr)?;
    let prefix = guest.data().address_prefix().to_string();

    match address::canonicalize(&prefix, &human) {
        Ok(canonical) => {
            guest.write_buffer(destination_ptr, &canonical)?;
            Ok(0)
        }
        Err(err) => {
            debug!(contract = %guest.data().address(), %human, "canonicalize failed: {err}");
            Ok(guest.pass_utf8(&err.to_string())?)
        }
    }
}

fn humanize_address(
    mut caller: Caller<'_, HostEnv>,
    source_ptr: u32,
    destination_ptr: u32,
) -> anyhow::Result<u32> {
    let mut guest = calling_guest(&mut caller)?;
    let canonical = guest.peek_buffer(source_ptr)?;
    let prefix = guest.data().address_prefix().to_string();

    match address::humanize(&prefix, &canonical) {
        Ok(human) => {
            guest.write_buffer(destination_ptr, human.as_bytes())?;
            Ok(0)
        }
        Err(err) => {
            debug!(contract = %guest.data().address(), "humanize failed: {err}");
            Ok(guest.pass_utf8(&err.to_string())?)
        }
    }
}

fn addr_validate(mut caller: Caller<'_, HostEnv>, source_ptr: u32) -> anyhow::Result<u32> {
    let mut guest = calling_guest(&mut caller)?;
    let human = guest.peek_utf8(source_ptr)?;
    note_stub_call(guest.data_mut(), "addr_validate", &human);
    Ok(0)
}

// The crypto imports are stubs that note the call and report success.

fn secp256k1_verify(mut caller: Caller<'_, HostEnv>, _hash: u32, _signature: u32, _public_key: u32) -> u32 {
    note_stub_call(caller.data_mut(), "secp256k1_verify", "");
    0
}

fn secp256k1_recover_pubkey(mut caller: Caller<'_, HostEnv>, _hash: u32, _signature: u32, _recovery: u32) -> u64 {
    note_stub_call(caller.data_mut(), "secp256k1_recover_pubkey", "");
    0
}

fn ed25519_verify(mut caller: Caller<'_, HostEnv>, _message: u32, _signature: u32, _public_key: u32) -> u32 {
    note_stub_call(caller.data_mut(), "ed25519_verify", "");
    0
}

fn ed25519_batch_verify(mut caller: Caller<'_, HostEnv>, _messages: u32, _signatures: u32, _public_keys: u32) -> u32 {
    note_stub_call(caller.data_mut(), "ed25519_batch_verify", "");
    0
}

fn note_stub_call(env: &mut HostEnv, name: &str, detail: &str) {
    debug!(contract = %env.address(), detail, "{name} stubbed");
    env.record(format!("{name} {detail}").trim_end().to_string());
}

fn debug_print(mut caller: Caller<'_, HostEnv>, source_ptr: u32) -> anyhow::Result<()> {
    let mut guest = calling_guest(&mut caller)?;
    let message = guest.peek_utf8(source_ptr)?;
    info!(contract = %guest.data().address(), "{message}");
    guest.data_mut().record(message);
    Ok(())
}

fn abort(mut caller: Caller<'_, HostEnv>, source_ptr: u32) -> anyhow::Result<()> {
    let mut guest = calling_guest(&mut caller)?;
    let message = guest.peek_utf8(source_ptr)?;
    Err(MocknetError::Aborted(message).into())
}
