use serde::{Deserialize, Serialize};

use crate::Binary;

/// A query a guest sends through `query_chain`. Only smart queries
/// against other contracts are served.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QueryRequest {
    Wasm(WasmQuery),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WasmQuery {
    Smart {
        contract_addr: String,
        #[serde(default, alias = "code_hash")]
        callback_code_hash: String,
        msg: Binary,
    },
}
