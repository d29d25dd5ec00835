//! Defines the configuration of the contract host.

use std::str::FromStr;

use serde_json::Value;
use tracing::Level;

use crate::{error::HostError, gas::GasCostModel};

/// Default bound on nested contract calls.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 32;

/// The configuration of the contract host.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct HostConfig {
    /// The gas cost model.
    pub gas: GasCostModel,
    /// How deep contracts may call into contracts.
    pub max_call_depth: u32,
    /// The log level for the host.
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            gas: GasCostModel::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            log_level: String::new(),
        }
    }
}

impl HostConfig {
    /// Returns the log level for the host.
    #[must_use]
    pub fn log_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }

    /// Checks the configuration can be used to build a keeper.
    /// # Errors
    /// Returns [`HostError::InvalidConfig`] on a zero call depth or an invalid
    /// gas cost model.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.max_call_depth == 0 {
            return Err(HostError::InvalidConfig(
                "max call depth must be greater than zero".to_string(),
            ));
        }
        self.gas.validate()
    }
}

/// Parse a configuration value into the target struct while producing
/// path-aware error messages (e.g. `gas.multiplier`).
///
/// # Errors
/// Returns [`HostError::InvalidConfig`] with the path of the failure and the
/// original serde error message.
pub fn parse_config<T>(value: Value) -> Result<T, HostError>
where
    T: serde::de::DeserializeOwned,
{
    // Going through a string gives the deserializer line and column information.
    let json_string = value.to_string();

    let mut deserializer = serde_json::Deserializer::from_str(&json_string);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer)
        .map_err(|e| HostError::InvalidConfig(format!("config error at {}: {}", e.path(), e)))
}
