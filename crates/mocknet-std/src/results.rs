use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Binary;

/// The envelope every guest entry point returns.
///
/// Legacy guests spell the variants `Ok`/`Err`, newer ones `ok`/`err`; both
/// are accepted. Serialization always uses the capitalized form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ContractResult<T> {
    #[serde(alias = "ok")]
    Ok(T),
    #[serde(alias = "err")]
    Err(Value),
}

impl<T> ContractResult<T> {
    pub fn into_result(self) -> Result<T, Value> {
        match self {
            ContractResult::Ok(value) => Ok(value),
            ContractResult::Err(payload) => Err(payload),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ContractResult::Ok(_))
    }
}

impl<T> From<Result<T, Value>> for ContractResult<T> {
    fn from(result: Result<T, Value>) -> Self {
        match result {
            Ok(value) => ContractResult::Ok(value),
            Err(payload) => ContractResult::Err(payload),
        }
    }
}

/// The outer envelope of a querier reply: did the chain manage to run the
/// query at all. The inner [`ContractResult`] carries the target's answer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum SystemResult<T> {
    #[serde(alias = "ok")]
    Ok(T),
    #[serde(alias = "err")]
    Err(Value),
}

/// Success payload of instantiate and execute.
///
/// `messages` stay as raw JSON; the dispatcher decides which shapes it
/// understands. Legacy guests name their attributes `log`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Response {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default, alias = "log")]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub data: Option<Binary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub encrypted: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_both_envelope_spellings() {
        let upper: ContractResult<Value> = serde_json::from_value(json!({"Ok": 1})).unwrap();
        let lower: ContractResult<Value> = serde_json::from_value(json!({"ok": 1})).unwrap();
        assert_eq!(upper, lower);

        let err: ContractResult<Value> =
            serde_json::from_value(json!({"err": {"generic_err": {"msg": "no"}}})).unwrap();
        assert_eq!(
            err.into_result().unwrap_err(),
            json!({"generic_err": {"msg": "no"}})
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(serde_json::from_value::<ContractResult<Value>>(json!({"result": 1})).is_err());
        assert!(serde_json::from_value::<ContractResult<Value>>(json!("Ok")).is_err());
    }

    #[test]
    fn response_defaults_and_legacy_log() {
        let response: Response = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response, Response::default());

        let response: Response = serde_json::from_value(json!({
            "messages": [],
            "log": [{"key": "action", "value": "init"}],
            "data": null
        }))
        .unwrap();
        assert_eq!(response.attributes[0].key, "action");
    }
}
