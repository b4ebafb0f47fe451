//! Wire types for the mocknet contract runtime.
//!
//! Everything a guest contract sends to or receives from the host is JSON.
//! These types pin down the shapes the host understands:
//!
//! - [`Binary`]: opaque bytes, carried as a base64 string
//! - [`v0::Env`] and [`v1::Env`]: the execution environment per ABI generation
//! - [`ContractResult`]: the `{"Ok": ..}` / `{"Err": ..}` result envelope
//! - [`Response`]: the success payload of instantiate and execute calls
//! - [`CosmosMsg`] and [`QueryRequest`]: sub-messages and cross-contract queries
//!
//! Guests may emit more than these types describe. Unknown fields are
//! ignored and unknown message kinds are reported as parse errors so the
//! host can decide how to treat them.

mod binary;
mod env;
mod msg;
mod query;
mod results;

pub use binary::Binary;
pub use env::{v0, v1, Coin};
pub use msg::{CosmosMsg, WasmMsg};
pub use query::{QueryRequest, WasmQuery};
pub use results::{Attribute, ContractResult, Event, Response, SystemResult};
