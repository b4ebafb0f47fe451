use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::{Binary, Coin};

/// The subset of chain messages the mocknet can act on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CosmosMsg {
    Wasm(WasmMsg),
}

/// Calls into other contracts.
///
/// Legacy guests attach tokens as `send`, newer ones as `funds`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WasmMsg {
    Instantiate {
        #[serde(deserialize_with = "code_id_from_number_or_string")]
        code_id: u64,
        #[serde(default)]
        callback_code_hash: String,
        label: String,
        msg: Binary,
        #[serde(default, alias = "funds")]
        send: Vec<Coin>,
    },
    Execute {
        contract_addr: String,
        #[serde(default)]
        callback_code_hash: String,
        msg: Binary,
        #[serde(default, alias = "funds")]
        send: Vec<Coin>,
    },
}

fn code_id_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    struct CodeIdVisitor;

    impl<'de> Visitor<'de> for CodeIdVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a code id as a number or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| E::custom(format!("negative code id {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse()
                .map_err(|_| E::custom(format!("invalid code id `{v}`")))
        }
    }

    deserializer.deserialize_any(CodeIdVisitor)
}
