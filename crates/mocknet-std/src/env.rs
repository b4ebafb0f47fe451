use serde::{Deserialize, Serialize};

/// A token amount. Amounts are decimal strings so 128-bit values survive JSON.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

/// Environment shapes for guests built against the legacy (v0) ABI.
///
/// The v0 environment folds the message info into `env.message` and carries
/// the contract's own code hash at the top level.
pub mod v0 {
    use super::Coin;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct Env {
        pub block: BlockInfo,
        pub message: MessageInfo,
        pub contract: ContractInfo,
        pub contract_key: Option<String>,
        pub contract_code_hash: String,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct BlockInfo {
        pub height: u64,
        /// Seconds since the unix epoch.
        pub time: u64,
        pub chain_id: String,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct MessageInfo {
        pub sender: String,
        pub sent_funds: Vec<Coin>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct ContractInfo {
        pub address: String,
    }
}

/// Environment shapes for guests built against the current (v1) ABI.
///
/// The sender and funds travel separately as [`MessageInfo`](v1::MessageInfo).
pub mod v1 {
    use super::Coin;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct Env {
        pub block: BlockInfo,
        pub transaction: Option<TransactionInfo>,
        pub contract: ContractInfo,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct BlockInfo {
        pub height: u64,
        pub time: Timestamp,
        pub chain_id: String,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct TransactionInfo {
        pub index: u32,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct ContractInfo {
        pub address: String,
        pub code_hash: String,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
    pub struct MessageInfo {
        pub sender: String,
        pub funds: Vec<Coin>,
    }

    /// Nanoseconds since the unix epoch, serialized as a decimal string.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Timestamp(u64);

    impl Timestamp {
        pub const fn from_nanos(nanos: u64) -> Self {
            Self(nanos)
        }

        pub const fn from_seconds(seconds: u64) -> Self {
            Self(seconds.saturating_mul(1_000_000_000))
        }

        pub const fn nanos(&self) -> u64 {
            self.0
        }

        pub const fn seconds(&self) -> u64 {
            self.0 / 1_000_000_000
        }
    }

    impl Serialize for Timestamp {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.0.to_string())
        }
    }

    impl<'de> Deserialize<'de> for Timestamp {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let text = String::deserialize(deserializer)?;
            text.parse()
                .map(Self)
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp `{text}`: {e}")))
        }
    }
}
