//! Persisted unit state.
//!
//! Each unit defines a flat record (`InboundState`, `CcState`, `MapState`, ...)
//! next to its implementation and exposes `save_state` / `load_state`. This
//! module holds the JSON plumbing they share.

use anyhow::{Context, Result};
use schemars::{JsonSchema, Schema};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A record that round-trips through JSON.
pub trait PersistedState: Serialize + DeserializeOwned + JsonSchema + Sized {
    /// Record name used in error context and logs.
    const KIND: &'static str;

    fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).with_context(|| format!("failed to serialize {} state", Self::KIND))
    }

    fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .with_context(|| format!("failed to parse {} state", Self::KIND))
    }

    fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).with_context(|| format!("failed to parse {} state", Self::KIND))
    }

    fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .with_context(|| format!("failed to serialize {} state", Self::KIND))
    }

    /// JSON schema describing the record.
    fn schema() -> Schema {
        schemars::schema_for!(Self)
    }
}

/// Clamp a persisted channel count into `1..=16`.
pub(crate) fn clamp_channels(channels: usize) -> usize {
    channels.clamp(1, crate::PORT_MAX_CHANNELS)
}

/// Clamp a persisted channel filter into `0..=16` (0 = all).
pub(crate) fn clamp_channel_filter(filter: u8) -> u8 {
    filter.min(16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
    #[serde(default, rename_all = "camelCase")]
    struct Sample {
        channel_count: usize,
        smooth: bool,
    }

    impl PersistedState for Sample {
        const KIND: &'static str = "sample";
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let sample = Sample::from_json(&serde_json::json!({ "smooth": true })).unwrap();
        assert_eq!(
            sample,
            Sample {
                channel_count: 0,
                smooth: true
            }
        );
    }

    #[test]
    fn test_parse_error_names_the_record() {
        let err = Sample::from_json_str("{ not json").unwrap_err();
        assert!(format!("{err:#}").contains("sample"));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = serde_json::to_value(Sample::schema()).unwrap();
        assert!(schema["properties"]["channelCount"].is_object());
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_channels(0), 1);
        assert_eq!(clamp_channels(40), 16);
        assert_eq!(clamp_channel_filter(99), 16);
    }
}
