use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::sqlserver::DatabaseInfo;

fn default_chunk_size() -> usize {
    100
}

fn default_chunk_count() -> usize {
    10000
}

fn default_timeout_ms() -> u64 {
    50
}

fn default_queue_capacity() -> usize {
    2048
}

fn default_retry_delay_ms() -> u64 {
    5000
}

/// How queued commands are grouped into chunks before they are written.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BufferInput {
    /// Maximum number of commands written together. SQL Server binds at most 2098 parameters
    /// per script; a chunk that needs more is written as several scripts in one transaction.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum number of complete chunks held in memory while the writer is busy.
    #[serde(default = "default_chunk_count")]
    pub chunk_count: usize,

    /// How long a partial chunk may wait for more commands before it is flushed.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BufferInput {
    fn default() -> Self {
        BufferInput {
            chunk_size: default_chunk_size(),
            chunk_count: default_chunk_count(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl BufferInput {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WriterSettings {
    /// Capacity of the ingress queue; producers wait once it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Fixed delay between attempts when a chunk fails to execute.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        WriterSettings {
            queue_capacity: default_queue_capacity(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl WriterSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WriterConfig {
    pub database: DatabaseInfo,

    #[serde(default)]
    pub buffer_input: BufferInput,

    #[serde(default)]
    pub writer: WriterSettings,
}

#[cfg(test)]
mod tests {
    use serde_yaml;

    use super::*;

    #[test]
    fn test_config_simple() {
        let yaml = r#"
          database:
            host: localhost
            port: 1434
            secure: true
            username: sa
            password: secret
            dbname: gravity
          buffer_input:
            chunk_size: 500
            timeout_ms: 20
          writer:
            retry_delay_ms: 250
        "#;

        let config: WriterConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.database.port, 1434);
        assert!(config.database.secure);
        assert_eq!(config.buffer_input.chunk_size, 500);
        assert_eq!(config.buffer_input.chunk_count, 10000);
        assert_eq!(config.buffer_input.timeout(), Duration::from_millis(20));
        assert_eq!(config.writer.queue_capacity, 2048);
        assert_eq!(config.writer.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_defaults() {
        let yaml = r#"
          database:
            host: localhost
            username: sa
            dbname: gravity
        "#;

        let config: WriterConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.database.port, 1433);
        assert!(!config.database.secure);
        assert_eq!(config.database.password, "");
        assert_eq!(config.buffer_input, BufferInput::default());
        assert_eq!(config.writer.retry_delay(), Duration::from_secs(5));
    }
}
