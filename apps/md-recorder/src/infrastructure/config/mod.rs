//! Configuration Module
//!
//! Environment configuration for both process roles and the JSON gateway
//! settings file.

mod gateway;
mod settings;

pub use gateway::GatewaySettings;
pub use settings::{
    ConfigError, DEFAULT_GATEWAY_SETTINGS, DEFAULT_SYMBOLS, RecorderConfig, ReplaySettings,
};
