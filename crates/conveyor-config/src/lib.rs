//! KDL configuration parsing for the Conveyor CI build orchestrator.
//!
//! This crate handles parsing of:
//! - Ordered execution queue descriptors (routing precedence)
//! - Broker settings
//! - Database settings

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{AppConfig, BrokerConfig, DatabaseConfig, QueueSpec};
