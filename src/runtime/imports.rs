//! Imports shared by every ABI generation: contract storage and the
//! cross-contract querier.
//!
//! Argument regions passed to these functions stay owned by the guest.
//! Regions handed back (a storage value, a query reply) are allocated
//! through the guest's own `allocate` and become the guest's to free.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use mocknet_std::{ContractResult, QueryRequest, SystemResult, WasmQuery};
use serde_json::Value;
use tracing::{debug, trace};
use wasmtime::{AsContextMut, Caller, Instance};

use super::abi::AbiAdapter;
use super::host::{HostFunctionProvider, HostLinkerBuilder, LinkerError, ENV_MODULE};
use super::region::Guest;
use super::Chain;
use crate::error::MocknetError;

/// Per-contract state living in the contract's wasmtime `Store`.
pub struct HostEnv {
    address: String,
    abi: AbiAdapter,
    address_prefix: String,
    storage: BTreeMap<Vec<u8>, Vec<u8>>,
    instance: Option<Instance>,
    chain: Weak<Chain>,
    diagnostics: Vec<String>,
}

impl HostEnv {
    pub(crate) fn new(
        address: impl Into<String>,
        abi: AbiAdapter,
        address_prefix: impl Into<String>,
        chain: Weak<Chain>,
    ) -> Self {
        Self {
            address: address.into(),
            abi,
            address_prefix: address_prefix.into(),
            storage: BTreeMap::new(),
            instance: None,
            chain,
            diagnostics: Vec::new(),
        }
    }

    /// An environment that is not attached to any mocknet. Queries to other
    /// contracts fail with [`MocknetError::ChainDropped`].
    pub fn detached(address: impl Into<String>, abi: AbiAdapter, address_prefix: impl Into<String>) -> Self {
        Self::new(address, abi, address_prefix, Weak::new())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn abi(&self) -> AbiAdapter {
        self.abi
    }

    pub fn address_prefix(&self) -> &str {
        &self.address_prefix
    }

    pub fn storage(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.storage
    }

    /// Messages the guest sent through `debug`, plus notes about calls to
    /// imports the mocknet only stubs.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub(crate) fn attach(&mut self, instance: Instance) {
        self.instance = Some(instance);
    }

    pub(crate) fn record(&mut self, line: impl Into<String>) {
        self.diagnostics.push(line.into());
    }

    fn instance(&self) -> Result<Instance, MocknetError> {
        self.instance.ok_or_else(|| {
            MocknetError::Protocol(format!(
                "{} called an import before instantiation finished",
                self.address
            ))
        })
    }

    fn chain(&self) -> Result<Arc<Chain>, MocknetError> {
        self.chain.upgrade().ok_or(MocknetError::ChainDropped)
    }
}

/// Region access for the guest that is calling a host function.
pub(crate) fn calling_guest<'a>(
    caller: &'a mut Caller<'_, HostEnv>,
) -> Result<Guest<'a, HostEnv>, MocknetError> {
    let instance = caller.data().instance()?;
    Ok(Guest::new(caller.as_context_mut(), instance))
}

/// Provides `db_read`, `db_write`, `db_remove` and `query_chain`.
pub struct ImportBridge;

impl ImportBridge {
    pub const IMPORTS: [&'static str; 4] = ["db_read", "db_write", "db_remove", "query_chain"];
}

impl HostFunctionProvider<HostEnv> for ImportBridge {
    fn register(&self, builder: &mut HostLinkerBuilder<'_, HostEnv>) -> Result<(), LinkerError> {
        builder
            .interface(ENV_MODULE)?
            .func_raw("db_read", db_read)?
            .func_raw("db_write", db_write)?
            .func_raw("db_remove", db_remove)?
            .func_raw("query_chain", query_chain)?;
        Ok(())
    }
}

fn db_read(mut caller: Caller<'_, HostEnv>, key_ptr: u32) -> anyhow::Result<u32> {
    let mut guest = calling_guest(&mut caller)?;
    let key = guest.peek_buffer(key_ptr)?;
    let value = guest.data().storage.get(&key).cloned();
    debug!(
        contract = %guest.data().address,
        key = %String::from_utf8_lossy(&key),
        found = value.is_some(),
        "db_read"
    );

    match value {
        Some(value) => Ok(guest.pass_buffer(&value)?),
        None => Ok(0),
    }
}

fn db_write(mut caller: Caller<'_, HostEnv>, key_ptr: u32, value_ptr: u32) -> anyhow::Result<()> {
    let mut guest = calling_guest(&mut caller)?;
    let key = guest.peek_buffer(key_ptr)?;
    let value = guest.peek_buffer(value_ptr)?;
    debug!(
        contract = %guest.data().address,
        key = %String::from_utf8_lossy(&key),
        len = value.len(),
        "db_write"
    );

    guest.data_mut().storage.insert(key, value);
    Ok(())
}

fn db_remove(mut caller: Caller<'_, HostEnv>, key_ptr: u32) -> anyhow::Result<()> {
    let mut guest = calling_guest(&mut caller)?;
    let key = guest.peek_buffer(key_ptr)?;
    debug!(
        contract = %guest.data().address,
        key = %String::from_utf8_lossy(&key),
        "db_remove"
    );

    guest.data_mut().storage.remove(&key);
    Ok(())
}

fn query_chain(mut caller: Caller<'_, HostEnv>, request_ptr: u32) -> anyhow::Result<u32> {
    let mut guest = calling_guest(&mut caller)?;
    let request = guest.peek_buffer(request_ptr)?;
    let (querier, abi, chain) = {
        let env = guest.data();
        (env.address.clone(), env.abi, env.chain()?)
    };

    let reply = smart_query(&chain, &querier, abi, &request)?;
    Ok(guest.pass(&reply)?)
}

/// Run a `{"wasm":{"smart":..}}` request on behalf of `querier` and build
/// the reply envelope.
///
/// A target that answers with `Err` still yields a successful reply whose
/// inner result is the error. Anything that prevents the query from running
/// at all is returned as an error and traps the querier.
pub(crate) fn smart_query(
    chain: &Arc<Chain>,
    querier: &str,
    abi: AbiAdapter,
    request: &[u8],
) -> Result<Value, MocknetError> {
    let request: QueryRequest = serde_json::from_slice(request)
        .map_err(|_| MocknetError::UnsupportedQuery(String::from_utf8_lossy(request).into_owned()))?;
    let QueryRequest::Wasm(WasmQuery::Smart {
        contract_addr,
        callback_code_hash,
        msg,
    }) = request;

    trace!(%querier, target = %contract_addr, "query_chain");
    let msg: Value = msg
        .decode_json()
        .map_err(|e| MocknetError::Protocol(format!("query message is not JSON: {e}")))?;

    let result = match chain.query_from(querier, &contract_addr, &callback_code_hash, &msg) {
        Ok(binary) => ContractResult::Ok(binary),
        Err(MocknetError::ContractError { payload, .. }) => ContractResult::Err(payload),
        Err(err) => return Err(err),
    };
    abi.querier_reply(SystemResult::Ok(result))
}
