//! System configuration parsing.
//!
//! Queue descriptors are kept in declaration order: routing is
//! first-match-wins, so the parser never sorts or dedups them.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

/// System-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution queue descriptors, in routing precedence order.
    pub queues: Vec<QueueSpec>,
    /// Message broker settings.
    pub broker: BrokerConfig,
    /// Database settings.
    pub database: Option<DatabaseConfig>,
}

/// One execution queue descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Queue name; canonicalized by the registry at registration time.
    pub queue: String,
    /// Repository slug (`owner/name`) routed to this queue.
    pub slug: Option<String>,
    /// Config target string routed to this queue.
    pub target: Option<String>,
}

/// Message broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    /// Upper bound on one enqueue handoff, in seconds.
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://127.0.0.1:5672".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl AppConfig {
    /// Parse configuration from KDL text.
    pub fn from_kdl(kdl: &str) -> ConfigResult<AppConfig> {
        let doc: KdlDocument = kdl.parse()?;

        let mut config = AppConfig::default();

        for node in doc.nodes() {
            match node.name().value() {
                "queue" => {
                    config.queues.push(parse_queue(node)?);
                }
                "broker" => {
                    config.broker = parse_broker(node)?;
                }
                "database" => {
                    config.database = Some(parse_database(node)?);
                }
                _ => {} // Ignore unknown nodes
            }
        }

        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &std::path::Path) -> ConfigResult<AppConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::from_kdl(&text)
    }
}

fn parse_queue(node: &KdlNode) -> ConfigResult<QueueSpec> {
    let queue = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("queue name".to_string()))?;

    Ok(QueueSpec {
        queue,
        slug: get_string_prop(node, "slug"),
        target: get_string_prop(node, "target"),
    })
}

fn parse_broker(node: &KdlNode) -> ConfigResult<BrokerConfig> {
    let mut broker = BrokerConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "url" => {
                    broker.url = get_first_string_arg(child)
                        .ok_or_else(|| ConfigError::MissingField("broker url".to_string()))?;
                }
                "timeout_secs" | "timeout-secs" => {
                    broker.timeout_secs = get_first_int_arg(child).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: "broker timeout".to_string(),
                            message: "expected an integer number of seconds".to_string(),
                        }
                    })? as u64;
                }
                _ => {}
            }
        }
    }

    Ok(broker)
}

fn parse_database(node: &KdlNode) -> ConfigResult<DatabaseConfig> {
    let mut url = None;
    let mut max_connections = 10;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "url" => {
                    url = get_first_string_arg(child);
                }
                "max_connections" | "max-connections" => {
                    max_connections = get_first_int_arg(child).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: "database max_connections".to_string(),
                            message: "expected an integer".to_string(),
                        }
                    })? as u32;
                }
                _ => {}
            }
        }
    }

    Ok(DatabaseConfig {
        url: url.ok_or_else(|| ConfigError::MissingField("database url".to_string()))?,
        max_connections,
    })
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queues_in_declared_order() {
        let kdl = r#"
            queue "rails" slug="rails/rails"
            queue "macos" target="macos"
            queue "spare"
        "#;

        let config = AppConfig::from_kdl(kdl).unwrap();
        assert_eq!(config.queues.len(), 3);
        assert_eq!(config.queues[0].queue, "rails");
        assert_eq!(config.queues[0].slug.as_deref(), Some("rails/rails"));
        assert_eq!(config.queues[1].queue, "macos");
        assert_eq!(config.queues[1].target.as_deref(), Some("macos"));
        assert!(config.queues[2].slug.is_none());
        assert!(config.queues[2].target.is_none());
    }

    #[test]
    fn test_parse_broker_and_database() {
        let kdl = r#"
            broker {
                url "amqp://broker.internal:5672"
                timeout-secs 5
            }

            database {
                url "postgres://conveyor@127.0.0.1/conveyor"
                max-connections 20
            }
        "#;

        let config = AppConfig::from_kdl(kdl).unwrap();
        assert_eq!(config.broker.url, "amqp://broker.internal:5672");
        assert_eq!(config.broker.timeout_secs, 5);

        let database = config.database.unwrap();
        assert_eq!(database.url, "postgres://conveyor@127.0.0.1/conveyor");
        assert_eq!(database.max_connections, 20);
    }

    #[test]
    fn test_defaults_when_sections_absent() {
        let config = AppConfig::from_kdl("").unwrap();
        assert!(config.queues.is_empty());
        assert_eq!(config.broker.timeout_secs, 10);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_queue_without_name_is_rejected() {
        let err = AppConfig::from_kdl(r#"queue slug="a/b""#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }
}
