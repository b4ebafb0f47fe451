//! A single live contract: one guest instance, its store and its storage.

use std::collections::BTreeMap;

use mocknet_std::{Binary, Coin, ContractResult, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use wasmtime::{AsContextMut, Engine, Instance, Linker, Module, Store, Val};

use super::abi::{AbiAdapter, EntryPoint};
use super::host::HostLinkerBuilder;
use super::imports::{HostEnv, ImportBridge};
use super::region::Guest;
use crate::address;
use crate::error::MocknetError;

/// Block height and time (seconds) as reported to guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    pub time: u64,
}

/// Everything a guest is told about the call it is handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub sender: String,
    pub block: Block,
    pub chain_id: String,
    pub contract_address: String,
    pub code_hash: String,
    pub funds: Vec<Coin>,
}

pub struct ContractHost {
    store: Store<HostEnv>,
    instance: Instance,
    code_hash: String,
}

impl ContractHost {
    /// Compile `bytes` and instantiate them with the imports of `env`'s ABI.
    pub fn load(engine: &Engine, bytes: &[u8], env: HostEnv) -> Result<Self, MocknetError> {
        let module = Module::new(engine, bytes).map_err(|e| MocknetError::Compile {
            code_id: 0,
            message: format!("{e:#}"),
        })?;
        Self::from_module(engine, &module, address::code_hash(bytes), env)
    }

    /// Instantiate an already compiled module.
    pub fn from_module(
        engine: &Engine,
        module: &Module,
        code_hash: String,
        env: HostEnv,
    ) -> Result<Self, MocknetError> {
        let abi = env.abi();
        let mut linker = Linker::new(engine);
        HostLinkerBuilder::new(&mut linker)
            .register_provider(&ImportBridge)?
            .register_provider(&abi)?;

        let mut store = Store::new(engine, env);
        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| MocknetError::Instantiation(format!("{e:#}")))?;
        store.data_mut().attach(instance);

        debug!(contract = %store.data().address(), %abi, "guest instantiated");
        Ok(Self {
            store,
            instance,
            code_hash,
        })
    }

    pub fn address(&self) -> &str {
        self.store.data().address()
    }

    pub fn code_hash(&self) -> &str {
        &self.code_hash
    }

    pub fn abi(&self) -> AbiAdapter {
        self.store.data().abi()
    }

    pub fn storage(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        self.store.data().storage()
    }

    pub fn diagnostics(&self) -> &[String] {
        self.store.data().diagnostics()
    }

    /// Run the instantiate entry point. `None` means no message was given at
    /// all, which is distinct from a JSON `null` message.
    pub fn instantiate(
        &mut self,
        ctx: &ExecutionContext,
        msg: Option<&Value>,
    ) -> Result<Response, MocknetError> {
        let msg = msg.ok_or(MocknetError::MissingInitMessage)?;
        self.call(EntryPoint::Instantiate, ctx, msg)
    }

    pub fn execute(&mut self, ctx: &ExecutionContext, msg: &Value) -> Result<Response, MocknetError> {
        self.call(EntryPoint::Execute, ctx, msg)
    }

    /// Run the query entry point and return the raw bytes of the answer.
    pub fn query(&mut self, ctx: &ExecutionContext, msg: &Value) -> Result<Binary, MocknetError> {
        self.call(EntryPoint::Query, ctx, msg)
    }

    fn call<T: DeserializeOwned>(
        &mut self,
        entry: EntryPoint,
        ctx: &ExecutionContext,
        msg: &Value,
    ) -> Result<T, MocknetError> {
        let name = self.abi().export_name(entry);
        let output = self.invoke(entry, ctx, msg)?;

        let result: ContractResult<T> = serde_json::from_slice(&output).map_err(|e| {
            MocknetError::Protocol(format!(
                "`{name}` of {} returned an invalid result envelope: {e}",
                self.address()
            ))
        })?;
        result
            .into_result()
            .map_err(|payload| MocknetError::ContractError {
                address: self.address().to_string(),
                payload,
            })
    }

    fn invoke(
        &mut self,
        entry: EntryPoint,
        ctx: &ExecutionContext,
        msg: &Value,
    ) -> Result<Vec<u8>, MocknetError> {
        let abi = self.abi();
        let name = abi.export_name(entry);
        let address = self.address().to_string();

        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| MocknetError::MissingExport(name.to_string()))?;

        let mut args = abi.context_args(entry, ctx)?;
        args.push(msg.clone());

        let arity = func.ty(&self.store).params().len();
        if arity != args.len() {
            return Err(MocknetError::Protocol(format!(
                "`{name}` takes {arity} parameters, the {abi} ABI passes {}",
                args.len()
            )));
        }

        let params = {
            let mut guest = Guest::new(self.store.as_context_mut(), self.instance);
            args.iter()
                .map(|arg| guest.pass(arg).map(|ptr| Val::I32(ptr as i32)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.into_crash(&address))?
        };

        trace!(contract = %address, entry = name, "calling guest");
        let mut results = [Val::I32(0)];
        func.call(&mut self.store, &params, &mut results)
            .map_err(|e| MocknetError::from_trap(&address, e))?;

        let ptr = results[0].i32().ok_or_else(|| {
            MocknetError::Protocol(format!("`{name}` did not return a region pointer"))
        })? as u32;

        Guest::new(self.store.as_context_mut(), self.instance)
            .read_buffer(ptr)
            .map_err(|e| e.into_crash(&address))
    }
}
