//! Code and instance registries.
//!
//! Both registries only hold bookkeeping. The live contracts sit behind
//! their own `Arc<Mutex<ContractHost>>`, so callers clone the handle out
//! and release the registry lock before calling into WASM.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::debug;
use wasmtime::{Engine, Module};

use super::contract::ContractHost;
use crate::address;
use crate::error::MocknetError;

pub type CodeId = u64;

/// An uploaded code blob.
#[derive(Debug, Clone)]
pub struct CodeRecord {
    pub code_id: CodeId,
    pub code_hash: String,
    pub bytes: Arc<[u8]>,
    /// Addresses of the contracts instantiated from this code.
    pub instances: BTreeSet<String>,
}

/// Public description of a live contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub address: String,
    pub code_id: CodeId,
    pub code_hash: String,
    pub label: String,
    pub creator: String,
}

pub struct ContractRecord {
    pub info: ContractInfo,
    pub(crate) host: Arc<Mutex<ContractHost>>,
}

#[derive(Default)]
pub struct CodeRegistry {
    codes: BTreeMap<CodeId, CodeRecord>,
    by_hash: HashMap<String, CodeId>,
    compiled: HashMap<CodeId, Module>,
    last_code_id: CodeId,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under the next code id. Any bytes are accepted; they are
    /// only compiled when first instantiated.
    pub fn upload(&mut self, bytes: Vec<u8>) -> &CodeRecord {
        let code_id = self.last_code_id + 1;
        self.store(code_id, bytes)
    }

    /// Store `bytes` under a caller-chosen id. Code is never replaced, so an
    /// id already in use is refused. Later uploads continue after the highest
    /// id seen.
    pub fn insert(&mut self, code_id: CodeId, bytes: Vec<u8>) -> Result<&CodeRecord, MocknetError> {
        if self.codes.contains_key(&code_id) {
            return Err(MocknetError::DuplicateCodeId(code_id));
        }
        Ok(self.store(code_id, bytes))
    }

    fn store(&mut self, code_id: CodeId, bytes: Vec<u8>) -> &CodeRecord {
        let code_hash = address::code_hash(&bytes);
        debug!(code_id, %code_hash, len = bytes.len(), "code stored");

        self.by_hash.insert(code_hash.clone(), code_id);
        self.last_code_id = self.last_code_id.max(code_id);
        self.codes.entry(code_id).or_insert(CodeRecord {
            code_id,
            code_hash,
            bytes: bytes.into(),
            instances: BTreeSet::new(),
        })
    }

    pub fn get(&self, code_id: CodeId) -> Option<&CodeRecord> {
        self.codes.get(&code_id)
    }

    pub fn require(&self, code_id: CodeId) -> Result<&CodeRecord, MocknetError> {
        self.get(code_id).ok_or(MocknetError::UnknownCodeId(code_id))
    }

    /// The most recent code id uploaded with this hash.
    pub fn code_id_for_hash(&self, code_hash: &str) -> Option<CodeId> {
        self.by_hash.get(&code_hash.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The compiled module for `code_id`, compiling on first use.
    pub(crate) fn compiled(&mut self, engine: &Engine, code_id: CodeId) -> Result<Module, MocknetError> {
        if let Some(module) = self.compiled.get(&code_id) {
            return Ok(module.clone());
        }

        let record = self.require(code_id)?;
        let module = Module::new(engine, &record.bytes).map_err(|e| MocknetError::Compile {
            code_id,
            message: format!("{e:#}"),
        })?;
        debug!(code_id, "code compiled");
        self.compiled.insert(code_id, module.clone());
        Ok(module)
    }

    pub(crate) fn add_instance(&mut self, code_id: CodeId, address: &str) {
        if let Some(record) = self.codes.get_mut(&code_id) {
            record.instances.insert(address.to_string());
        }
    }
}

#[derive(Default)]
pub struct InstanceRegistry {
    contracts: HashMap<String, ContractRecord>,
    sequence: u64,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for the next address derivation, starting at 1.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn contains(&self, address: &str) -> bool {
        self.contracts.contains_key(address)
    }

    pub(crate) fn insert(&mut self, record: ContractRecord) -> Result<(), MocknetError> {
        if self.contains(&record.info.address) {
            return Err(MocknetError::Protocol(format!(
                "address {} is already taken",
                record.info.address
            )));
        }
        self.contracts.insert(record.info.address.clone(), record);
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&ContractRecord> {
        self.contracts.get(address)
    }

    pub fn require(&self, address: &str) -> Result<&ContractRecord, MocknetError> {
        self.get(address)
            .ok_or_else(|| MocknetError::UnknownContract(address.to_string()))
    }

    pub fn code_id_of(&self, address: &str) -> Option<CodeId> {
        self.get(address).map(|record| record.info.code_id)
    }

    /// All contracts, ordered by address.
    pub fn infos(&self) -> Vec<ContractInfo> {
        let mut infos: Vec<_> = self.contracts.values().map(|r| r.info.clone()).collect();
        infos.sort_by(|a, b| a.address.cmp(&b.address));
        infos
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
