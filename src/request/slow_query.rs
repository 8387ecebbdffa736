//! Slow-query detection.
//!
//! A call is timed from just before the driver is awaited until it settles,
//! whether it succeeded or failed. When the elapsed time exceeds the
//! configured threshold the logger receives a [`SlowQueryError`] built before
//! the call started, pointing at the caller's source location.

use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::error::{BoxError, ClickHouseError, Operation, Result};

/// Call-site marker handed to the slow-query logger.
#[derive(Error, Debug, Clone)]
#[error("Slow query ({operation} at {location})")]
pub struct SlowQueryError {
    operation: Operation,
    location: &'static Location<'static>,
    statement: String,
}

impl SlowQueryError {
    pub fn new(
        operation: Operation,
        location: &'static Location<'static>,
        statement: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            location,
            statement: statement.into(),
        }
    }

    /// Public request method the caller invoked.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Source location of the caller's `query`/`command`/`insert` call.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Query text as written by the caller, or the table name for inserts.
    pub fn statement(&self) -> &str {
        &self.statement
    }
}

/// Sink for slow-query events.
///
/// Errors returned here are not swallowed: they fail the request that
/// triggered them.
#[async_trait]
pub trait SlowQueryHandler: Send + Sync {
    async fn on_slow_query(
        &self,
        error: SlowQueryError,
        execution_time_ms: u64,
    ) -> std::result::Result<(), BoxError>;
}

/// Handler that reports slow queries as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSlowQueryLogger;

#[async_trait]
impl SlowQueryHandler for TracingSlowQueryLogger {
    async fn on_slow_query(
        &self,
        error: SlowQueryError,
        execution_time_ms: u64,
    ) -> std::result::Result<(), BoxError> {
        tracing::warn!(
            operation = %error.operation(),
            location = %error.location(),
            execution_time_ms,
            statement = error.statement(),
            "Slow ClickHouse query"
        );
        Ok(())
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> SlowQueryHandler for FnHandler<F>
where
    F: Fn(&SlowQueryError, u64) -> std::result::Result<(), BoxError> + Send + Sync,
{
    async fn on_slow_query(
        &self,
        error: SlowQueryError,
        execution_time_ms: u64,
    ) -> std::result::Result<(), BoxError> {
        (self.0)(&error, execution_time_ms)
    }
}

/// Threshold plus the sink that slow calls are reported to.
#[derive(Clone)]
pub struct SlowQueryLogger {
    max_execution_time_ms: u64,
    handler: Arc<dyn SlowQueryHandler>,
}

impl SlowQueryLogger {
    pub fn new(max_execution_time_ms: u64, handler: impl SlowQueryHandler + 'static) -> Self {
        Self {
            max_execution_time_ms,
            handler: Arc::new(handler),
        }
    }

    /// Logger backed by a synchronous closure.
    pub fn from_fn<F>(max_execution_time_ms: u64, f: F) -> Self
    where
        F: Fn(&SlowQueryError, u64) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::new(max_execution_time_ms, FnHandler(f))
    }

    /// Logger that emits `tracing` warnings.
    pub fn tracing(max_execution_time_ms: u64) -> Self {
        Self::new(max_execution_time_ms, TracingSlowQueryLogger)
    }

    pub fn max_execution_time_ms(&self) -> u64 {
        self.max_execution_time_ms
    }

    /// Same sink, different threshold.
    pub fn with_max_execution_time(mut self, max_execution_time_ms: u64) -> Self {
        self.max_execution_time_ms = max_execution_time_ms;
        self
    }

    pub(crate) fn is_slow(&self, elapsed: Duration) -> bool {
        duration_ms(elapsed) > self.max_execution_time_ms
    }
}

impl fmt::Debug for SlowQueryLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowQueryLogger")
            .field("max_execution_time_ms", &self.max_execution_time_ms)
            .finish_non_exhaustive()
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Tracks one in-flight timed call; notes calls dropped before they settle.
struct CallTimer {
    operation: Operation,
    started: Instant,
    settled: bool,
}

impl CallTimer {
    fn start(operation: Operation) -> Self {
        Self {
            operation,
            started: Instant::now(),
            settled: false,
        }
    }

    fn finish(&mut self) -> Duration {
        self.settled = true;
        self.started.elapsed()
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                operation = %self.operation,
                elapsed_ms = duration_ms(self.started.elapsed()),
                "ClickHouse call dropped before completion; slow query check skipped"
            );
        }
    }
}

/// Runs `work`, reporting it to `logger` when it outlasts the threshold.
///
/// The work's own output (including driver failures) is returned untouched;
/// only a logger failure turns into an error here.
pub(crate) async fn log_slow_query<F>(
    work: F,
    marker: SlowQueryError,
    logger: &SlowQueryLogger,
) -> Result<F::Output>
where
    F: Future,
{
    let mut timer = CallTimer::start(marker.operation());
    let output = work.await;
    let elapsed = timer.finish();

    if logger.is_slow(elapsed) {
        logger
            .handler
            .on_slow_query(marker, duration_ms(elapsed))
            .await
            .map_err(|source| ClickHouseError::SlowQueryLogger { source })?;
    }

    Ok(output)
}
