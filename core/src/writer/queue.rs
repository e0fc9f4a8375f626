//! Size/time chunking between the command queue and the executor.
//!
//! A collector task drains the bounded command queue into chunks, flushing when a chunk is full
//! or when `timeout` has passed since its first item. A dispatch task hands chunks to the
//! [`ChunkHandler`] one at a time, so chunks never overlap.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tracing::{debug, warn};

use crate::manifest::config::BufferInput;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub timeout: Duration,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        ChunkOptions::from(&BufferInput::default())
    }
}

impl From<&BufferInput> for ChunkOptions {
    fn from(buffer: &BufferInput) -> Self {
        ChunkOptions {
            chunk_size: buffer.chunk_size,
            chunk_count: buffer.chunk_count,
            timeout: buffer.timeout(),
        }
    }
}

#[async_trait]
pub trait ChunkHandler<T>: Send + Sync {
    /// Called with chunks in the order they were formed; the next chunk waits for this to return.
    async fn handle(&self, chunk: Vec<T>);
}

async fn collect_chunks<T>(
    mut commands: mpsc::Receiver<T>,
    chunk_size: usize,
    flush_after: Duration,
    chunks: mpsc::Sender<Vec<T>>,
) {
    while let Some(first) = commands.recv().await {
        let mut chunk = Vec::with_capacity(chunk_size);
        chunk.push(first);

        let deadline = Instant::now() + flush_after;
        while chunk.len() < chunk_size {
            match timeout_at(deadline, commands.recv()).await {
                Ok(Some(item)) => chunk.push(item),
                // queue closed or the window elapsed, flush what we have
                Ok(None) | Err(_) => break,
            }
        }

        if chunks.send(chunk).await.is_err() {
            warn!("Chunk dispatcher stopped, dropping remaining commands");
            return;
        }
    }

    debug!("Command queue closed, chunk collector finished");
}

/// Spawns the collector and dispatcher. The returned handle completes once `commands` has been
/// closed and every chunk formed from it has been handled.
pub fn spawn_chunk_scheduler<T, H>(
    commands: mpsc::Receiver<T>,
    options: ChunkOptions,
    handler: Arc<H>,
) -> JoinHandle<()>
where
    T: Send + 'static,
    H: ChunkHandler<T> + ?Sized + 'static,
{
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<T>>(options.chunk_count.max(1));

    tokio::spawn(collect_chunks(commands, options.chunk_size.max(1), options.timeout, chunk_tx));

    tokio::spawn(async move {
        while let Some(chunk) = chunk_rx.recv().await {
            handler.handle(chunk).await;
        }
    })
}
