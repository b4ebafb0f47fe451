//! Host Function Registration API
//!
//! A small builder over `wasmtime::Linker` that groups host functions by the
//! import module they are exposed under. Sets of related functions are
//! packaged as [`HostFunctionProvider`]s so every contract instance gets the
//! same imports wired the same way.
//!
//! # Example
//!
//! ```ignore
//! let mut linker = Linker::new(&engine);
//! let mut builder = HostLinkerBuilder::new(&mut linker);
//! builder
//!     .register_provider(&ImportBridge)?
//!     .register_provider(&AbiAdapter::V1)?;
//! ```

use thiserror::Error;
use wasmtime::Linker;

/// Import module every contract import lives under.
pub const ENV_MODULE: &str = "env";

/// Errors from linker operations
#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("Function registration failed: {0}")]
    FunctionRegistration(String),
}

/// Builder for registering host functions with a Linker.
///
/// Generic over `T` which is the store data type.
pub struct HostLinkerBuilder<'a, T> {
    linker: &'a mut Linker<T>,
    registered: Vec<(String, String)>,
}

impl<'a, T> HostLinkerBuilder<'a, T> {
    /// Create a new builder wrapping a wasmtime Linker
    pub fn new(linker: &'a mut Linker<T>) -> Self {
        Self {
            linker,
            registered: Vec::new(),
        }
    }

    /// Start defining functions under the given import module.
    pub fn interface(&mut self, name: &str) -> Result<InterfaceBuilder<'_, 'a, T>, LinkerError> {
        if name.is_empty() {
            return Err(LinkerError::FunctionRegistration(
                "import module name must not be empty".into(),
            ));
        }
        Ok(InterfaceBuilder {
            linker: self,
            module_name: name.to_string(),
        })
    }

    /// Register a provider's functions.
    pub fn register_provider<P: HostFunctionProvider<T>>(
        &mut self,
        provider: &P,
    ) -> Result<&mut Self, LinkerError> {
        provider.register(self)?;
        Ok(self)
    }

    /// `(module, name)` pairs registered so far, in registration order.
    pub fn registered(&self) -> &[(String, String)] {
        &self.registered
    }
}

/// Builder for registering functions within a specific import module.
pub struct InterfaceBuilder<'a, 'b, T> {
    linker: &'a mut HostLinkerBuilder<'b, T>,
    module_name: String,
}

impl<'a, 'b, T: 'static> InterfaceBuilder<'a, 'b, T> {
    /// Register a host function with direct WASM-level parameters.
    ///
    /// Returning `Err` from the function traps the calling guest; the error
    /// can be recovered from the trap with `anyhow::Error::downcast`.
    pub fn func_raw<Params, Results>(
        &mut self,
        name: &str,
        func: impl wasmtime::IntoFunc<T, Params, Results>,
    ) -> Result<&mut Self, LinkerError> {
        self.linker
            .linker
            .func_wrap(&self.module_name, name, func)
            .map_err(|e| {
                LinkerError::FunctionRegistration(format!("{}::{}: {}", self.module_name, name, e))
            })?;
        self.linker
            .registered
            .push((self.module_name.clone(), name.to_string()));
        Ok(self)
    }
}

/// Trait for types that provide host functions.
///
/// Implement this to create reusable sets of host functions that can
/// be registered with multiple instances.
pub trait HostFunctionProvider<T> {
    /// Register this provider's functions with the linker builder.
    fn register(&self, builder: &mut HostLinkerBuilder<'_, T>) -> Result<(), LinkerError>;
}
