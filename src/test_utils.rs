//! Shared test utilities for request and integration tests.
//!
//! [`MockConnection`] stands in for a live ClickHouse server: it records every
//! call, replays scripted query responses, can fail the next call with a
//! driver error, and can stall each call to exercise slow-query reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::db::{
    CommandCall, CompactRows, Connection, DriverError, InsertCall, QueryCall,
};

#[derive(Default)]
struct Recorded {
    queries: Vec<QueryCall>,
    commands: Vec<CommandCall>,
    inserts: Vec<InsertCall>,
    pings: usize,
}

/// Scripted in-memory connection.
#[derive(Default)]
pub struct MockConnection {
    recorded: Mutex<Recorded>,
    responses: Mutex<VecDeque<CompactRows>>,
    failures: Mutex<VecDeque<DriverError>>,
    delay: Mutex<Option<Duration>>,
    closes: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stall every subsequent call by `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Queue a compact response for the next query.
    ///
    /// Queries without a queued response get header rows and no data.
    pub fn push_query_response(&self, data: CompactRows) {
        self.responses.lock().unwrap().push_back(data);
    }

    /// Fail the next call (of any kind) with `error`.
    pub fn fail_next(&self, error: DriverError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn query_calls(&self) -> Vec<QueryCall> {
        self.recorded.lock().unwrap().queries.clone()
    }

    pub fn command_calls(&self) -> Vec<CommandCall> {
        self.recorded.lock().unwrap().commands.clone()
    }

    pub fn insert_calls(&self) -> Vec<InsertCall> {
        self.recorded.lock().unwrap().inserts.clone()
    }

    pub fn ping_count(&self) -> usize {
        self.recorded.lock().unwrap().pings
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of query, command and insert calls received.
    pub fn call_count(&self) -> usize {
        let recorded = self.recorded.lock().unwrap();
        recorded.queries.len() + recorded.commands.len() + recorded.inserts.len()
    }

    async fn settle(&self) -> Result<(), DriverError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, call: QueryCall) -> Result<CompactRows, DriverError> {
        self.recorded.lock().unwrap().queries.push(call);
        self.settle().await?;
        let scripted = self.responses.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| vec![vec![json!("dummy")], vec![json!("UInt8")]]))
    }

    async fn command(&self, call: CommandCall) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().commands.push(call);
        self.settle().await
    }

    async fn insert(&self, call: InsertCall) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().inserts.push(call);
        self.settle().await
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.recorded.lock().unwrap().pings += 1;
        self.settle().await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Mock"
    }
}
