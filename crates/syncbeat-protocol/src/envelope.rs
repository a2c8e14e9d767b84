use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// `{type, payload, timestamp}` as sent on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub message: M,
    /// Sender wall clock, epoch ms.
    pub timestamp: i64,
}

impl<M> Envelope<M> {
    pub fn new(message: M, timestamp: i64) -> Self {
        Self { message, timestamp }
    }

    pub fn into_message(self) -> M {
        self.message
    }
}

impl<M: Serialize> Envelope<M> {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(&self.message)?;
        if let Value::Object(map) = &mut value {
            map.insert("timestamp".to_string(), Value::from(self.timestamp));
        }
        Ok(serde_json::to_vec(&value)?)
    }
}

impl<M: DeserializeOwned> Envelope<M> {
    /// A missing `payload` decodes as `{}`; a missing `timestamp` as 0.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut map: Map<String, Value> = serde_json::from_slice(bytes)?;
        let timestamp = map
            .remove("timestamp")
            .and_then(|t| t.as_f64())
            .map(|t| t as i64)
            .unwrap_or(0);
        map.entry("payload")
            .or_insert_with(|| Value::Object(Map::new()));
        let message = serde_json::from_value(Value::Object(map))?;
        Ok(Self { message, timestamp })
    }
}
