use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::{config::LaneConfig, error::AgentError};

/// Polls the trigger device once. Active means the configured pin field
/// reads 1/true. No internal retry; the lane loop owns pacing.
pub async fn check_trigger(client: &Client, lane: &LaneConfig) -> Result<bool, AgentError> {
    let response = client
        .get(lane.trigger_url.clone())
        .send()
        .await
        .map_err(|e| AgentError::Network {
            context: "trigger",
            message: e.to_string(),
        })?;
    if !response.status().is_success() {
        return Err(AgentError::Network {
            context: "trigger",
            message: format!("HTTP status {}", response.status()),
        });
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| AgentError::Deserialization(format!("trigger body: {e}")))?;
    let active = parse_trigger_state(&body, &lane.trigger_field)?;
    debug!("{}: {} = {}", lane.trigger_url, lane.trigger_field, active);
    Ok(active)
}

pub fn parse_trigger_state(body: &Value, field: &str) -> Result<bool, AgentError> {
    let Some(value) = body.get(field) else {
        return Err(AgentError::Deserialization(format!(
            "trigger field '{field}' missing from device response"
        )));
    };
    if let Some(state) = value.as_i64() {
        return Ok(state == 1);
    }
    if let Some(state) = value.as_bool() {
        return Ok(state);
    }
    Err(AgentError::Deserialization(format!(
        "trigger field '{field}' is not an integer or boolean: {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn active_pin() {
        assert!(parse_trigger_state(&json!({"estadoPin": 1}), "estadoPin").unwrap());
        assert!(parse_trigger_state(&json!({"estadoPin1": true}), "estadoPin1").unwrap());
    }

    #[test]
    fn inactive_pin() {
        assert!(!parse_trigger_state(&json!({"estadoPin": 0}), "estadoPin").unwrap());
        assert!(!parse_trigger_state(&json!({"estadoPin": 2}), "estadoPin").unwrap());
        assert!(!parse_trigger_state(&json!({"estadoPin0": false}), "estadoPin0").unwrap());
    }

    #[test]
    fn missing_field_is_deserialization_error() {
        let err = parse_trigger_state(&json!({"otherPin": 1}), "estadoPin").unwrap_err();
        assert!(matches!(err, AgentError::Deserialization(_)));
    }

    #[test]
    fn null_field_is_deserialization_error() {
        let err = parse_trigger_state(&json!({"estadoPin": null}), "estadoPin").unwrap_err();
        assert!(matches!(err, AgentError::Deserialization(_)));
    }

    #[test]
    fn non_integer_field_is_deserialization_error() {
        let err = parse_trigger_state(&json!({"estadoPin": "on"}), "estadoPin").unwrap_err();
        assert!(matches!(err, AgentError::Deserialization(_)));
    }
}
