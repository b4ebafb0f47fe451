//! Contract runtime
//!
//! [`Mocknet`] is the entry point: upload code, instantiate contracts,
//! execute and query them. Everything below it is organised per concern:
//!
//! - `region`: moving bytes across the guest boundary
//! - `host`: registering host functions with a wasmtime linker
//! - `imports`: storage and querier imports shared by all ABIs
//! - `abi`: what differs between the v0 and v1 calling conventions
//! - `contract`: one live guest instance
//! - `registry`: uploaded code and live contracts
//! - `dispatch`: running the sub-messages a contract emits
//!
//! Top-level operations are serialized. Nested work (sub-messages,
//! cross-contract queries) runs synchronously inside the operation that
//! triggered it.

mod abi;
mod contract;
mod dispatch;
mod host;
mod imports;
mod region;
mod registry;

pub use abi::{AbiAdapter, EntryPoint};
pub use contract::{Block, ContractHost, ExecutionContext};
pub use dispatch::SubMessage;
pub use host::{HostFunctionProvider, HostLinkerBuilder, InterfaceBuilder, LinkerError, ENV_MODULE};
pub use imports::{HostEnv, ImportBridge};
pub use region::{Guest, Region, REGION_SIZE};
pub use registry::{CodeId, CodeRecord, CodeRegistry, ContractInfo, ContractRecord, InstanceRegistry};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use mocknet_std::{Binary, Coin, Response};
use serde_json::Value;
use tracing::{debug, info};
use wasmtime::Engine;

use crate::address;
use crate::config::MocknetConfig;
use crate::error::MocknetError;
use dispatch::{check_code_hash, CallDispatcher};

/// Result of [`Mocknet::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub code_id: CodeId,
    pub code_hash: String,
}

/// Result of [`Mocknet::instantiate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiated {
    pub address: String,
    pub code_id: CodeId,
    pub code_hash: String,
    pub response: Response,
}

/// Parameters of an instantiation.
///
/// Leaving `init_msg` unset is an error at instantiation time; to send a
/// JSON `null`, set it to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiateOptions {
    pub label: String,
    pub sender: String,
    pub init_msg: Option<Value>,
    pub funds: Vec<Coin>,
}

impl InstantiateOptions {
    pub fn new(label: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sender: sender.into(),
            init_msg: None,
            funds: Vec::new(),
        }
    }

    pub fn with_init_msg(mut self, msg: Value) -> Self {
        self.init_msg = Some(msg);
        self
    }

    pub fn with_funds(mut self, funds: Vec<Coin>) -> Self {
        self.funds = funds;
        self
    }
}

/// State shared by the facade and every contract's host functions.
pub(crate) struct Chain {
    engine: Engine,
    config: MocknetConfig,
    block: Mutex<Block>,
    codes: Mutex<CodeRegistry>,
    instances: Mutex<InstanceRegistry>,
    // Held for the duration of each top-level operation.
    turn: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// A contract that is already on the call stack cannot be entered again.
fn acquire<'a>(
    host: &'a Mutex<ContractHost>,
    address: &str,
) -> Result<MutexGuard<'a, ContractHost>, MocknetError> {
    match host.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => Err(MocknetError::ContractBusy(address.to_string())),
    }
}

impl Chain {
    fn context(
        &self,
        sender: &str,
        address: &str,
        code_hash: &str,
        funds: Vec<Coin>,
    ) -> ExecutionContext {
        ExecutionContext {
            sender: sender.to_string(),
            block: *lock(&self.block),
            chain_id: self.config.chain_id.clone(),
            contract_address: address.to_string(),
            code_hash: code_hash.to_string(),
            funds,
        }
    }

    fn host(&self, address: &str) -> Result<(Arc<Mutex<ContractHost>>, ContractInfo), MocknetError> {
        let instances = lock(&self.instances);
        let record = instances.require(address)?;
        Ok((Arc::clone(&record.host), record.info.clone()))
    }

    pub(crate) fn code_hash_of(&self, code_id: CodeId) -> Result<String, MocknetError> {
        Ok(lock(&self.codes).require(code_id)?.code_hash.clone())
    }

    pub(crate) fn contract_code_hash(&self, address: &str) -> Result<String, MocknetError> {
        Ok(lock(&self.instances).require(address)?.info.code_hash.clone())
    }

    pub(crate) fn instantiate_at(
        self: &Arc<Self>,
        depth: usize,
        code_id: CodeId,
        options: InstantiateOptions,
    ) -> Result<Instantiated, MocknetError> {
        let (module, code_hash) = {
            let mut codes = lock(&self.codes);
            let code_hash = codes.require(code_id)?.code_hash.clone();
            if options.init_msg.is_none() {
                return Err(MocknetError::MissingInitMessage);
            }
            (codes.compiled(&self.engine, code_id)?, code_hash)
        };

        let address = {
            let mut instances = lock(&self.instances);
            loop {
                let sequence = instances.next_sequence();
                let candidate =
                    address::derive_address(&self.config.address_prefix, code_id, sequence)?;
                if !instances.contains(&candidate) {
                    break candidate;
                }
            }
        };

        info!(
            code_id,
            %address,
            label = %options.label,
            sender = %options.sender,
            depth,
            "instantiate"
        );
        let env = HostEnv::new(
            address.clone(),
            self.config.abi,
            self.config.address_prefix.clone(),
            Arc::downgrade(self),
        );
        let mut host = ContractHost::from_module(&self.engine, &module, code_hash.clone(), env)?;
        let ctx = self.context(&options.sender, &address, &code_hash, options.funds.clone());
        let response = host.instantiate(&ctx, options.init_msg.as_ref())?;

        lock(&self.instances).insert(ContractRecord {
            info: ContractInfo {
                address: address.clone(),
                code_id,
                code_hash: code_hash.clone(),
                label: options.label,
                creator: options.sender,
            },
            host: Arc::new(Mutex::new(host)),
        })?;
        lock(&self.codes).add_instance(code_id, &address);

        CallDispatcher::new(self, depth).dispatch(&address, &response.messages)?;
        Ok(Instantiated {
            address,
            code_id,
            code_hash,
            response,
        })
    }

    pub(crate) fn execute_at(
        self: &Arc<Self>,
        depth: usize,
        address: &str,
        msg: &Value,
        sender: &str,
        funds: Vec<Coin>,
    ) -> Result<Response, MocknetError> {
        let (host, contract) = self.host(address)?;
        let ctx = self.context(sender, address, &contract.code_hash, funds);

        info!(%address, %sender, depth, "execute");
        let response = acquire(&host, address)?.execute(&ctx, msg)?;

        CallDispatcher::new(self, depth).dispatch(address, &response.messages)?;
        Ok(response)
    }

    /// Query `address` on behalf of `querier` (empty for top-level queries).
    pub(crate) fn query_from(
        &self,
        querier: &str,
        address: &str,
        callback_code_hash: &str,
        msg: &Value,
    ) -> Result<Binary, MocknetError> {
        let (host, contract) = self.host(address)?;
        check_code_hash(callback_code_hash, &contract.code_hash)?;
        let ctx = self.context(querier, address, &contract.code_hash, Vec::new());

        debug!(%address, %querier, "query");
        let answer = acquire(&host, address)?.query(&ctx, msg)?;
        Ok(answer)
    }
}

/// An in-memory chain that runs WASM contracts.
///
/// Cheap to clone; clones share the same chain.
///
/// # Example
///
/// ```ignore
/// let mocknet = Mocknet::new(MocknetConfig::default())?;
/// let code = mocknet.upload(std::fs::read("token.wasm")?);
/// let token = mocknet.instantiate(
///     code.code_id,
///     InstantiateOptions::new("token", "admin").with_init_msg(json!({"decimals": 6})),
/// )?;
/// mocknet.execute(&token.address, &json!({"mint": {"amount": "100"}}), "admin")?;
/// let balance = mocknet.query(&token.address, &json!({"balance": {"address": "admin"}}))?;
/// ```
#[derive(Clone)]
pub struct Mocknet {
    chain: Arc<Chain>,
}

impl Mocknet {
    /// A fresh chain. Fails when `config` is not usable, for instance when
    /// its address prefix is not a valid bech32 prefix.
    pub fn new(config: MocknetConfig) -> Result<Self, MocknetError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MocknetConfig) -> Self {
        let block = Block {
            height: config.block_height,
            time: config.block_time,
        };
        Self {
            chain: Arc::new(Chain {
                engine: Engine::default(),
                config,
                block: Mutex::new(block),
                codes: Mutex::new(CodeRegistry::new()),
                instances: Mutex::new(InstanceRegistry::new()),
                turn: Mutex::new(()),
            }),
        }
    }

    /// A mocknet with code already stored under fixed ids. Each id may
    /// appear only once.
    pub fn with_codes(
        config: MocknetConfig,
        codes: impl IntoIterator<Item = (CodeId, Vec<u8>)>,
    ) -> Result<Self, MocknetError> {
        let mocknet = Self::new(config)?;
        {
            let mut registry = lock(&mocknet.chain.codes);
            for (code_id, bytes) in codes {
                registry.insert(code_id, bytes)?;
            }
        }
        Ok(mocknet)
    }

    pub fn config(&self) -> &MocknetConfig {
        &self.chain.config
    }

    pub fn upload(&self, bytes: impl Into<Vec<u8>>) -> Uploaded {
        let _turn = lock(&self.chain.turn);
        let mut codes = lock(&self.chain.codes);
        let record = codes.upload(bytes.into());
        info!(code_id = record.code_id, code_hash = %record.code_hash, "upload");
        Uploaded {
            code_id: record.code_id,
            code_hash: record.code_hash.clone(),
        }
    }

    pub fn instantiate(
        &self,
        code_id: CodeId,
        options: InstantiateOptions,
    ) -> Result<Instantiated, MocknetError> {
        let _turn = lock(&self.chain.turn);
        self.chain.instantiate_at(0, code_id, options)
    }

    pub fn execute(&self, address: &str, msg: &Value, sender: &str) -> Result<Response, MocknetError> {
        self.execute_with_funds(address, msg, sender, Vec::new())
    }

    pub fn execute_with_funds(
        &self,
        address: &str,
        msg: &Value,
        sender: &str,
        funds: Vec<Coin>,
    ) -> Result<Response, MocknetError> {
        let _turn = lock(&self.chain.turn);
        self.chain.execute_at(0, address, msg, sender, funds)
    }

    /// Query a contract and parse its answer as JSON.
    pub fn query(&self, address: &str, msg: &Value) -> Result<Value, MocknetError> {
        let answer = self.query_raw(address, msg)?;
        answer.decode_json().map_err(|e| {
            MocknetError::Protocol(format!("query answer of {address} is not JSON: {e}"))
        })
    }

    /// Query a contract and return the raw bytes of its answer.
    pub fn query_raw(&self, address: &str, msg: &Value) -> Result<Binary, MocknetError> {
        let _turn = lock(&self.chain.turn);
        self.chain.query_from("", address, "", msg)
    }

    pub fn block(&self) -> Block {
        *lock(&self.chain.block)
    }

    /// Move to the next block: height + 1, time + the configured interval.
    pub fn advance_block(&self) -> Block {
        let mut block = lock(&self.chain.block);
        block.height += 1;
        block.time += self.chain.config.block_interval;
        *block
    }

    pub fn code(&self, code_id: CodeId) -> Option<CodeRecord> {
        lock(&self.chain.codes).get(code_id).cloned()
    }

    pub fn code_id_for_hash(&self, code_hash: &str) -> Option<CodeId> {
        lock(&self.chain.codes).code_id_for_hash(code_hash)
    }

    pub fn code_id_of(&self, address: &str) -> Option<CodeId> {
        lock(&self.chain.instances).code_id_of(address)
    }

    pub fn contract(&self, address: &str) -> Option<ContractInfo> {
        lock(&self.chain.instances)
            .get(address)
            .map(|record| record.info.clone())
    }

    pub fn contracts(&self) -> Vec<ContractInfo> {
        lock(&self.chain.instances).infos()
    }

    /// Snapshot of a contract's storage.
    pub fn storage(&self, address: &str) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, MocknetError> {
        let _turn = lock(&self.chain.turn);
        let (host, _) = self.chain.host(address)?;
        let storage = acquire(&host, address)?.storage().clone();
        Ok(storage)
    }

    /// Debug output and stubbed import calls recorded for a contract.
    pub fn diagnostics(&self, address: &str) -> Result<Vec<String>, MocknetError> {
        let _turn = lock(&self.chain.turn);
        let (host, _) = self.chain.host(address)?;
        let diagnostics = acquire(&host, address)?.diagnostics().to_vec();
        Ok(diagnostics)
    }
}

impl Default for Mocknet {
    fn default() -> Self {
        // The default config is always valid.
        Self::build(MocknetConfig::default())
    }
}
