//! Write path from change records to the target database.
//!
//! ```text
//! process_data -> translate/build -> bounded queue -> chunk scheduler -> batch executor -> completion
//! ```

pub mod builder;
pub mod command;
pub mod executor;
pub mod placeholder;
pub mod queue;
pub mod script;
pub mod translator;

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use crate::{
    database::{
        sqlserver::{SqlServerClient, SqlServerConnectionError},
        SqlEngine,
    },
    manifest::config::{WriterConfig, WriterSettings},
    record::{ChangeRecord, Method},
    writer::{
        builder::{build_delete, build_insert, build_update},
        command::WriteCommand,
        executor::{BatchExecutor, CompletionHandler, CompletionSlot, ExecutorStatus},
        queue::{spawn_chunk_scheduler, ChunkOptions},
        translator::{RecordDefinition, TranslateError},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub queue_capacity: usize,
    pub retry_delay: Duration,
    pub chunk: ChunkOptions,
}

impl Default for WriterOptions {
    fn default() -> Self {
        let settings = WriterSettings::default();
        WriterOptions {
            queue_capacity: settings.queue_capacity,
            retry_delay: settings.retry_delay(),
            chunk: ChunkOptions::default(),
        }
    }
}

impl From<&WriterConfig> for WriterOptions {
    fn from(config: &WriterConfig) -> Self {
        WriterOptions {
            queue_capacity: config.writer.queue_capacity,
            retry_delay: config.writer.retry_delay(),
            chunk: ChunkOptions::from(&config.buffer_input),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("{0}")]
    Translate(#[from] TranslateError),

    #[error("Writer has been shut down")]
    QueueClosed,
}

/// Accepts change records and writes them to the database in chunks.
///
/// `R` is an opaque reference carried with each record and handed back to the completion
/// handler once the chunk holding it has committed.
pub struct Writer<R> {
    commands: mpsc::Sender<WriteCommand<R>>,
    executor: Arc<BatchExecutor<R>>,
    completion: Arc<CompletionSlot<R>>,
    pipeline: JoinHandle<()>,
}

impl<R> Writer<R>
where
    R: Send + Sync + 'static,
{
    /// Starts the queue, scheduler and executor on the current tokio runtime.
    pub fn start(engine: Arc<dyn SqlEngine>, options: WriterOptions) -> Self {
        let (commands, receiver) = mpsc::channel(options.queue_capacity.max(1));

        let completion = Arc::new(CompletionSlot::new());
        let executor =
            Arc::new(BatchExecutor::new(engine, options.retry_delay, Arc::clone(&completion)));

        let pipeline = spawn_chunk_scheduler(receiver, options.chunk, Arc::clone(&executor));

        Writer { commands, executor, completion, pipeline }
    }

    pub async fn connect(config: &WriterConfig) -> Result<Self, SqlServerConnectionError> {
        let client = SqlServerClient::new(&config.database).await?;

        info!(
            "Writer started - chunk size {} - retry delay {}ms",
            config.buffer_input.chunk_size, config.writer.retry_delay_ms
        );

        Ok(Writer::start(Arc::new(client), WriterOptions::from(config)))
    }

    /// Replaces the completion callback. Applies to chunks committed after the call.
    pub fn set_completion_handler<F>(&self, handler: F)
    where
        F: Fn(&WriteCommand<R>) + Send + Sync + 'static,
    {
        let handler: CompletionHandler<R> = Arc::new(handler);
        self.completion.set(handler);
    }

    pub fn executor_status(&self) -> ExecutorStatus {
        self.executor.status()
    }

    pub fn get_definition(&self, record: &ChangeRecord) -> Result<RecordDefinition, TranslateError> {
        translator::get_definition(record)
    }

    /// Routes a record by its method. Waits while the queue is full.
    pub async fn process_data(
        &self,
        reference: R,
        record: ChangeRecord,
        tables: Vec<String>,
    ) -> Result<(), WriteError> {
        match record.method {
            Method::Insert => self.insert_record(reference, record, tables).await,
            Method::Update => self.update_record(reference, record, tables).await,
            Method::Delete => self.delete_record(reference, record, tables).await,
        }
    }

    /// No-op when the record carries no fields.
    pub async fn insert_record(
        &self,
        reference: R,
        record: ChangeRecord,
        tables: Vec<String>,
    ) -> Result<(), WriteError> {
        let definition = translator::get_definition(&record)?;
        let Some(statement) = build_insert(&record.table, &definition) else {
            debug!(table = %record.table, "Insert without fields ignored");
            return Ok(());
        };

        self.enqueue(WriteCommand::new(reference, record, statement, Some(definition), tables))
            .await
    }

    /// No-op when the record declares no primary key or has no columns to set.
    pub async fn update_record(
        &self,
        reference: R,
        record: ChangeRecord,
        tables: Vec<String>,
    ) -> Result<(), WriteError> {
        if !record.has_primary_key() {
            debug!(table = %record.table, "Update without primary key ignored");
            return Ok(());
        }

        let definition = translator::get_definition(&record)?;
        let Some(statement) = build_update(&record.table, &definition) else {
            debug!(table = %record.table, "Update without columns to set ignored");
            return Ok(());
        };

        self.enqueue(WriteCommand::new(reference, record, statement, Some(definition), tables))
            .await
    }

    /// No-op when the record declares no primary key or does not carry its value.
    pub async fn delete_record(
        &self,
        reference: R,
        record: ChangeRecord,
        tables: Vec<String>,
    ) -> Result<(), WriteError> {
        let Some(statement) = build_delete(&record) else {
            debug!(table = %record.table, "Delete without primary key ignored");
            return Ok(());
        };

        self.enqueue(WriteCommand::new(reference, record, statement, None, tables)).await
    }

    async fn enqueue(&self, command: WriteCommand<R>) -> Result<(), WriteError> {
        self.commands.send(command).await.map_err(|_| WriteError::QueueClosed)
    }

    /// Closes the queue and waits until every accepted command has been written.
    pub async fn shutdown(self) {
        drop(self.commands);

        if let Err(e) = self.pipeline.await {
            error!("Writer pipeline ended abnormally: {}", e);
        }

        info!("Writer stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{database::mock::MockEngine, record::Value};

    fn options() -> WriterOptions {
        WriterOptions {
            queue_capacity: 16,
            retry_delay: Duration::from_millis(1),
            chunk: ChunkOptions { chunk_size: 100, chunk_count: 4, timeout: Duration::from_millis(10) },
        }
    }

    fn record(method: Method, id: i64) -> ChangeRecord {
        ChangeRecord::new("accounts", method, "id").with_field("id", id).with_field("name", "n")
    }

    fn collect_completions(writer: &Writer<u32>) -> Arc<Mutex<Vec<u32>>> {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        writer.set_completion_handler(move |command: &WriteCommand<u32>| {
            sink.lock().unwrap().push(command.reference);
        });
        completed
    }

    #[tokio::test]
    async fn test_process_data_writes_and_completes_in_order() {
        let engine = Arc::new(MockEngine::new());
        let writer = Writer::start(engine.clone(), options());
        let completed = collect_completions(&writer);

        writer.process_data(1, record(Method::Insert, 1), vec!["accounts".into()]).await.unwrap();
        writer.process_data(2, record(Method::Insert, 2), vec!["accounts".into()]).await.unwrap();
        writer.process_data(3, record(Method::Update, 1), vec!["accounts".into()]).await.unwrap();
        writer.process_data(4, record(Method::Delete, 2), vec!["accounts".into()]).await.unwrap();
        writer.shutdown().await;

        assert_eq!(*completed.lock().unwrap(), vec![1, 2, 3, 4]);

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            "INSERT INTO accounts (id,name) VALUES (@p1,@p2),(@p3,@p4);\
             UPDATE accounts SET name = @p5 WHERE id = @p6;\
             DELETE FROM accounts WHERE id = @p7"
        );
        assert_eq!(calls[0].1.len(), 7);
        assert_eq!(calls[0].1[6], Value::Int(2));
    }

    #[tokio::test]
    async fn test_missing_primary_key_enqueues_nothing() {
        let engine = Arc::new(MockEngine::new());
        let writer = Writer::start(engine.clone(), options());
        let completed = collect_completions(&writer);

        let broken = ChangeRecord::new("accounts", Method::Insert, "uuid").with_field("id", 1i64);
        let err = writer.process_data(1, broken, vec![]).await.unwrap_err();

        assert!(matches!(
            err,
            WriteError::Translate(TranslateError::PrimaryKeyNotFound(ref column)) if column == "uuid"
        ));

        writer.shutdown().await;

        assert!(engine.calls().is_empty());
        assert!(completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_without_fields_is_ignored() {
        let engine = Arc::new(MockEngine::new());
        let writer = Writer::start(engine.clone(), options());
        let completed = collect_completions(&writer);

        let empty = ChangeRecord::new("accounts", Method::Insert, "");
        writer.process_data(1, empty.clone(), vec![]).await.unwrap();
        writer.process_data(2, empty, vec![]).await.unwrap();
        writer.process_data(3, record(Method::Insert, 3), vec![]).await.unwrap();
        writer.shutdown().await;

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "INSERT INTO accounts (id,name) VALUES (@p1,@p2)");
        assert_eq!(*completed.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_update_and_delete_without_key_are_ignored() {
        let engine = Arc::new(MockEngine::new());
        let writer = Writer::start(engine.clone(), options());
        let completed = collect_completions(&writer);

        let update = ChangeRecord::new("accounts", Method::Update, "").with_field("name", "n");
        let delete = ChangeRecord::new("accounts", Method::Delete, "id").with_field("name", "n");

        writer.process_data(1, update, vec![]).await.unwrap();
        writer.process_data(2, delete, vec![]).await.unwrap();
        writer.shutdown().await;

        assert!(engine.calls().is_empty());
        assert!(completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_follow_size_limit() {
        let engine = Arc::new(MockEngine::new());
        let mut opts = options();
        opts.chunk.chunk_size = 2;
        let writer = Writer::start(engine.clone(), opts);
        let completed = collect_completions(&writer);

        for id in 0..5u32 {
            writer.insert_record(id, record(Method::Insert, id as i64), vec![]).await.unwrap();
        }
        writer.shutdown().await;

        assert_eq!(*completed.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        let calls = engine.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, "INSERT INTO accounts (id,name) VALUES (@p1,@p2)");
    }

    #[tokio::test]
    async fn test_retry_is_visible_in_status() {
        let engine = Arc::new(MockEngine::failing(2));
        let writer = Writer::start(engine.clone(), options());
        let completed = collect_completions(&writer);

        writer.insert_record(9, record(Method::Insert, 9), vec![]).await.unwrap();

        let status = loop {
            let status = writer.executor_status();
            if status.committed_chunks == 1 {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert_eq!(status.attempts, 3);
        assert_eq!(status.failed_attempts, 2);
        assert_eq!(*completed.lock().unwrap(), vec![9]);

        writer.shutdown().await;
        assert_eq!(engine.calls().len(), 3);
    }
}
