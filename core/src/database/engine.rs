use async_trait::async_trait;

use crate::{database::sqlserver::SqlServerConnectionError, record::Value, writer::script::Script};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] SqlServerConnectionError),

    #[error("Execution failed: {0}")]
    Execution(String),
}

/// The target database as seen by the executor.
///
/// `script` may hold several statements joined by `;` sharing one positional parameter space,
/// `args[i]` binds `@p{i + 1}`. Implementations must run the whole script in one call.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    async fn execute(&self, script: &str, args: &[Value]) -> Result<u64, EngineError>;

    /// Runs the scripts of one chunk in order. Engines that can should apply them atomically,
    /// since a failed chunk is retried from its first script.
    async fn execute_scripts(&self, scripts: &[Script]) -> Result<u64, EngineError> {
        let mut total = 0;
        for script in scripts {
            total += self.execute(&script.sql, &script.args).await?;
        }
        Ok(total)
    }

    /// Most positional parameters a single script may bind.
    fn max_parameters(&self) -> usize {
        usize::MAX
    }
}
