use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::{
    database::SqlEngine,
    helpers::format_duration,
    record::Value,
    writer::{command::WriteCommand, queue::ChunkHandler, script::build_scripts},
};

pub type CompletionHandler<R> = Arc<dyn Fn(&WriteCommand<R>) + Send + Sync>;

/// Shared, replaceable completion handler slot.
pub struct CompletionSlot<R> {
    handler: RwLock<CompletionHandler<R>>,
}

impl<R> CompletionSlot<R> {
    pub fn new() -> Self {
        CompletionSlot { handler: RwLock::new(Arc::new(|_: &WriteCommand<R>| {})) }
    }

    pub fn set(&self, handler: CompletionHandler<R>) {
        match self.handler.write() {
            Ok(mut current) => *current = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    pub fn get(&self) -> CompletionHandler<R> {
        match self.handler.read() {
            Ok(current) => (*current).clone(),
            Err(poisoned) => (*poisoned.into_inner()).clone(),
        }
    }
}

impl<R> Default for CompletionSlot<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry bookkeeping, readable while a chunk is stuck retrying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorStatus {
    /// Attempts made for the chunk currently (or most recently) being written.
    pub attempts: u32,
    pub failed_attempts: u64,
    pub committed_chunks: u64,
    pub committed_commands: u64,
    pub last_error: Option<String>,
}

pub struct BatchExecutor<R> {
    engine: Arc<dyn SqlEngine>,
    retry_delay: Duration,
    completion: Arc<CompletionSlot<R>>,
    status: Mutex<ExecutorStatus>,
}

fn format_args(args: &[Value]) -> String {
    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl<R> BatchExecutor<R> {
    pub fn new(
        engine: Arc<dyn SqlEngine>,
        retry_delay: Duration,
        completion: Arc<CompletionSlot<R>>,
    ) -> Self {
        BatchExecutor { engine, retry_delay, completion, status: Mutex::new(ExecutorStatus::default()) }
    }

    pub fn status(&self) -> ExecutorStatus {
        self.update_status(|status| status.clone())
    }

    fn update_status<T>(&self, f: impl FnOnce(&mut ExecutorStatus) -> T) -> T {
        match self.status.lock() {
            Ok(mut status) => f(&mut status),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Writes one chunk, retrying with a fixed delay until the engine accepts it, then fires
    /// completions in arrival order.
    ///
    /// The scripts are rebuilt from the commands on every attempt.
    pub async fn write_chunk(&self, commands: Vec<WriteCommand<R>>) {
        if commands.is_empty() {
            return;
        }

        let started = Instant::now();
        let max_parameters = self.engine.max_parameters();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.update_status(|status| status.attempts = attempt);

            let scripts = build_scripts(&commands, max_parameters);
            if scripts.is_empty() {
                break;
            }

            match self.engine.execute_scripts(&scripts).await {
                Ok(rows) => {
                    debug!(
                        "Wrote chunk of {} commands as {} statements in {} scripts ({} rows) - took {}",
                        commands.len(),
                        scripts.iter().map(|script| script.statement_count).sum::<usize>(),
                        scripts.len(),
                        rows,
                        format_duration(started.elapsed())
                    );
                    break;
                }
                Err(e) => {
                    error!(attempt, "Failed to write chunk of {} commands: {}", commands.len(), e);
                    for script in &scripts {
                        error!("{}", script.sql);
                        error!("[{}]", format_args(&script.args));
                    }

                    self.update_status(|status| {
                        status.failed_attempts += 1;
                        status.last_error = Some(e.to_string());
                    });

                    tokio::time::sleep(self.retry_delay).await;

                    warn!("Retry to write records to database by batch ...");
                }
            }
        }

        let handler = self.completion.get();
        for command in &commands {
            handler(command);
        }

        // counted once every completion of the chunk has run
        self.update_status(|status| {
            status.committed_chunks += 1;
            status.committed_commands += commands.len() as u64;
        });
    }
}

#[async_trait]
impl<R> ChunkHandler<WriteCommand<R>> for BatchExecutor<R>
where
    R: Send + Sync + 'static,
{
    async fn handle(&self, chunk: Vec<WriteCommand<R>>) {
        self.write_chunk(chunk).await;
    }
}
