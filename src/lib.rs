//! Mocknet: a local chain for CosmWasm-style contracts
//!
//! Runs compiled WASM contracts in-process, the way a Secret Network node
//! would, minus consensus, gas and networking. Meant for integration tests
//! of contracts and of the clients that talk to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Mocknet (facade)                             │
//! │   upload / instantiate / execute / query     │
//! ├──────────────────────────────────────────────┤
//! │ CodeRegistry      InstanceRegistry           │
//! │ CallDispatcher    (sub-messages, depth cap)  │
//! ├──────────────────────────────────────────────┤
//! │ ContractHost  (one per contract)             │
//! │   AbiAdapter v0 / v1   ImportBridge          │
//! │   Region codec                               │
//! ├──────────────────────────────────────────────┤
//! │ wasmtime                                     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Wire types (environments, result envelopes, messages) live in the
//! `mocknet-std` crate, re-exported here as [`mocknet_std`].

pub mod address;
pub mod config;
pub mod error;
pub mod inspect;
pub mod runtime;

pub use config::MocknetConfig;
pub use error::MocknetError;
pub use inspect::ContractManifest;
pub use mocknet_std;
pub use runtime::{
    AbiAdapter, Block, CodeId, ContractInfo, InstantiateOptions, Instantiated, Mocknet, Uploaded,
};
