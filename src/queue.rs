// Task queue contract and its Redis implementation.
//
// Each stage owns three named lists: origin, work-in-progress and error.
// Items are bare entity ids. Lists are FIFO under the LPUSH-enqueue
// orientation: the head (next item to process) is the right end, so a
// RPOPLPUSH implements "pop origin head, push WIP tail" atomically.

use anyhow::{Context, Result};
use redis::Commands;
use std::sync::Mutex;

/// An entity id travelling through the pipeline.
pub type WorkItem = i64;

pub trait TaskQueue: Send + Sync {
    /// Enqueue an item at the tail of `queue`.
    fn push(&self, queue: &str, item: WorkItem) -> Result<()>;

    /// Atomically pop the head of `from` and push it to the tail of `to`.
    fn transfer(&self, from: &str, to: &str) -> Result<Option<WorkItem>>;

    /// Pop the head (oldest entry) of `queue`.
    fn pop(&self, queue: &str) -> Result<Option<WorkItem>>;
}

pub struct RedisQueue {
    connection: Mutex<redis::Connection>,
}

impl RedisQueue {
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .with_context(|| format!("Invalid Redis URL: {}", url))?;
        let mut connection = client
            .get_connection()
            .context("Failed to connect to Redis")?;
        redis::cmd("PING")
            .query::<()>(&mut connection)
            .context("Redis did not answer PING")?;

        tracing::info!("Connected to Redis at {}", url);
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("Redis connection mutex poisoned"))?;
        f(&mut connection).context("Redis command failed")
    }
}

impl TaskQueue for RedisQueue {
    fn push(&self, queue: &str, item: WorkItem) -> Result<()> {
        self.with_connection(|con| con.lpush(queue, item))
    }

    fn transfer(&self, from: &str, to: &str) -> Result<Option<WorkItem>> {
        self.with_connection(|con| con.rpoplpush(from, to))
    }

    fn pop(&self, queue: &str) -> Result<Option<WorkItem>> {
        self.with_connection(|con| con.rpop(queue, None))
    }
}
