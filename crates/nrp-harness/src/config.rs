// SPDX-License-Identifier: Apache-2.0

//! Experiment configuration parsing and validation (spec §4.5). Follows
//! the original source's permissive shape: `MQTTBroker` may be given
//! either as a bare `"host:port"` string or as an object, and most fields
//! have defaults — only the `datatransfer_grpc_engine` entry is mandatory.

use crate::error::HarnessError;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TIMESTEP: f64 = 0.01;
const DEFAULT_BROKER_ADDRESS: &str = "localhost:1883";
const DATATRANSFER_ENGINE_TYPE: &str = "datatransfer_grpc_engine";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfigEntry {
    #[serde(rename = "EngineType")]
    pub engine_type: String,
    #[serde(rename = "MQTTBroker", default)]
    pub mqtt_broker: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub simulation_timeout: f64,
    pub simulation_timestep: f64,
    pub engine_configs: Vec<EngineConfigEntry>,
    pub datatransfer_broker_address: String,
}

impl ExperimentConfig {
    /// `floor(SimulationTimeout / SimulationTimestep)`, 0 if the timestep
    /// is non-positive (guards the B1 boundary: timeout 0 ⇒ max 0).
    pub fn max_timesteps(&self) -> u64 {
        if self.simulation_timestep <= 0.0 {
            return 0;
        }
        (self.simulation_timeout / self.simulation_timestep).floor().max(0.0) as u64
    }
}

pub fn parse_and_validate(raw: &str) -> Result<ExperimentConfig, HarnessError> {
    let root: Value =
        serde_json::from_str(raw).map_err(|e| HarnessError::Config(format!("invalid experiment config JSON: {e}")))?;

    let simulation_timeout = root.get("SimulationTimeout").and_then(Value::as_f64).unwrap_or(0.0);
    let simulation_timestep = root.get("SimulationTimestep").and_then(Value::as_f64).unwrap_or(DEFAULT_TIMESTEP);

    let engine_configs_value = root
        .get("EngineConfigs")
        .ok_or_else(|| HarnessError::Config("EngineConfigs is required".to_string()))?;
    let engine_configs: Vec<EngineConfigEntry> = serde_json::from_value(engine_configs_value.clone())
        .map_err(|e| HarnessError::Config(format!("invalid EngineConfigs: {e}")))?;

    let datatransfer = engine_configs
        .iter()
        .find(|entry| entry.engine_type == DATATRANSFER_ENGINE_TYPE)
        .ok_or_else(|| HarnessError::Config(format!("missing a `{DATATRANSFER_ENGINE_TYPE}` entry in EngineConfigs")))?;

    let datatransfer_broker_address = match &datatransfer.mqtt_broker {
        None => DEFAULT_BROKER_ADDRESS.to_string(),
        Some(Value::String(address)) => address.clone(),
        Some(Value::Object(object)) => {
            let host = object.get("host").and_then(Value::as_str).unwrap_or("localhost");
            let port = object.get("port").and_then(Value::as_u64).unwrap_or(1883);
            format!("{host}:{port}")
        }
        Some(_) => {
            return Err(HarnessError::Config("MQTTBroker must be a string or an object".to_string()));
        }
    };

    Ok(ExperimentConfig { simulation_timeout, simulation_timestep, engine_configs, datatransfer_broker_address })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_optional_fields_absent() {
        let config = parse_and_validate(r#"{"EngineConfigs":[{"EngineType":"datatransfer_grpc_engine"}]}"#).unwrap();
        assert_eq!(config.simulation_timeout, 0.0);
        assert_eq!(config.simulation_timestep, DEFAULT_TIMESTEP);
        assert_eq!(config.datatransfer_broker_address, DEFAULT_BROKER_ADDRESS);
        assert_eq!(config.max_timesteps(), 0);
    }

    #[test]
    fn string_broker_is_used_verbatim() {
        let config = parse_and_validate(
            r#"{"EngineConfigs":[{"EngineType":"datatransfer_grpc_engine","MQTTBroker":"broker.local:1883"}]}"#,
        )
        .unwrap();
        assert_eq!(config.datatransfer_broker_address, "broker.local:1883");
    }

    #[test]
    fn object_broker_is_composed_from_host_and_port() {
        let config = parse_and_validate(
            r#"{"EngineConfigs":[{"EngineType":"datatransfer_grpc_engine","MQTTBroker":{"host":"broker.local","port":1884}}]}"#,
        )
        .unwrap();
        assert_eq!(config.datatransfer_broker_address, "broker.local:1884");
    }

    #[test]
    fn missing_engine_configs_is_rejected() {
        let err = parse_and_validate("{}").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn missing_datatransfer_entry_is_rejected() {
        let err = parse_and_validate(r#"{"EngineConfigs":[{"EngineType":"other_engine"}]}"#).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn max_timesteps_floors_and_handles_zero_timeout() {
        let config = parse_and_validate(
            r#"{"SimulationTimeout":0.02,"SimulationTimestep":0.01,"EngineConfigs":[{"EngineType":"datatransfer_grpc_engine"}]}"#,
        )
        .unwrap();
        assert_eq!(config.max_timesteps(), 2);

        let zero = parse_and_validate(
            r#"{"SimulationTimeout":0,"EngineConfigs":[{"EngineType":"datatransfer_grpc_engine"}]}"#,
        )
        .unwrap();
        assert_eq!(zero.max_timesteps(), 0);
    }
}
