//! Plugin executor - runs plugin logic on the shared worker pool
//!
//! Every execution resolves to a `PluginExecutionResult`; plugin errors, panics,
//! deadlines and cancellation never escape to the caller.

use crate::definition::PluginDefinition;
use crate::manager::PluginMatchingResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use riptide_common::Stopwatch;
use riptide_core::{Error, NetworkService, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one plugin execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    /// The configured deadline elapsed first
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded pool shared by every plugin execution of a run
#[derive(Debug, Clone)]
pub struct PluginExecutionPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl PluginExecutionPool {
    /// Pool running at most `size` plugins at once (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for PluginExecutionPool {
    fn default() -> Self {
        Self::new(32)
    }
}

/// The plugin a piece of execution logic belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct PluginExecutionContext {
    pub plugin_definition: PluginDefinition,
    pub matched_services: Vec<NetworkService>,
}

impl PluginExecutionContext {
    pub fn plugin_id(&self) -> String {
        self.plugin_definition.id()
    }
}

/// A unit of plugin work and the plugin it is attributed to
pub struct PluginExecutorConfig<T> {
    context: PluginExecutionContext,
    execution_logic: BoxFuture<'static, Result<T>>,
}

impl<T> PluginExecutorConfig<T> {
    pub fn new<P, F>(matched_plugin: &PluginMatchingResult<P>, execution_logic: F) -> Self
    where
        P: ?Sized,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            context: PluginExecutionContext {
                plugin_definition: matched_plugin.plugin_definition.clone(),
                matched_services: matched_plugin.matched_services.clone(),
            },
            execution_logic: execution_logic.boxed(),
        }
    }

    pub fn context(&self) -> &PluginExecutionContext {
        &self.context
    }
}

/// Outcome of running one plugin.
///
/// Exactly one of `result_data` and `exception` is set, depending on the status.
#[derive(Debug)]
pub struct PluginExecutionResult<T> {
    status: ExecutionStatus,
    result_data: Option<T>,
    exception: Option<Error>,
    elapsed: Duration,
    context: PluginExecutionContext,
}

impl<T> PluginExecutionResult<T> {
    fn succeeded(context: PluginExecutionContext, data: T, elapsed: Duration) -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            result_data: Some(data),
            exception: None,
            elapsed,
            context,
        }
    }

    fn unsuccessful(
        status: ExecutionStatus,
        context: PluginExecutionContext,
        exception: Error,
        elapsed: Duration,
    ) -> Self {
        Self {
            status,
            result_data: None,
            exception: Some(exception),
            elapsed,
            context,
        }
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn result_data(&self) -> Option<&T> {
        self.result_data.as_ref()
    }

    pub fn exception(&self) -> Option<&Error> {
        self.exception.as_ref()
    }

    /// Time from actual execution start to completion
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn context(&self) -> &PluginExecutionContext {
        &self.context
    }

    pub fn plugin_id(&self) -> String {
        self.context.plugin_id()
    }

    pub fn matched_services(&self) -> &[NetworkService] {
        &self.context.matched_services
    }

    /// The result data, or the error that prevented it
    pub fn into_result(self) -> Result<T> {
        match (self.result_data, self.exception) {
            (Some(data), _) => Ok(data),
            (None, Some(e)) => Err(e),
            (None, None) => Err(Error::Internal(String::from(
                "plugin execution result without data or exception",
            ))),
        }
    }
}

enum Outcome<T> {
    Completed(Result<T>),
    TimedOut(Duration),
    Cancelled,
}

/// Runs plugin logic on a `PluginExecutionPool`
#[derive(Debug, Clone)]
pub struct PluginExecutor {
    pool: PluginExecutionPool,
    deadline: Option<Duration>,
    cancellation: CancellationToken,
}

impl PluginExecutor {
    pub fn new(pool: PluginExecutionPool) -> Self {
        Self {
            pool,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Fail executions still running after `deadline` with `TIMED_OUT`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_optional_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Cancelling `token` fails every outstanding execution of this executor
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn pool(&self) -> &PluginExecutionPool {
        &self.pool
    }

    /// Submit `config` to the pool. The work starts immediately; the returned
    /// future only collects its result and always resolves.
    pub fn execute_async<T>(
        &self,
        config: PluginExecutorConfig<T>,
    ) -> impl Future<Output = PluginExecutionResult<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        let PluginExecutorConfig {
            context,
            execution_logic,
        } = config;
        let semaphore = Arc::clone(&self.pool.semaphore);
        let cancellation = self.cancellation.clone();
        let deadline = self.deadline;
        let task_context = context.clone();

        let handle = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return build_failed_result(task_context, cancelled_error(), Duration::ZERO);
                }
                permit = semaphore.acquire_owned() => permit,
            };
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    let error = Error::Internal(String::from("plugin execution pool is closed"));
                    return build_failed_result(task_context, error, Duration::ZERO);
                }
            };

            debug!(plugin_id = %task_context.plugin_id(), "Plugin execution started");
            let mut stopwatch = Stopwatch::started();
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => Outcome::Cancelled,
                outcome = run_with_deadline(execution_logic, deadline) => outcome,
            };
            stopwatch.stop();
            let elapsed = stopwatch.elapsed();

            match outcome {
                Outcome::Completed(Ok(data)) => {
                    debug!(
                        plugin_id = %task_context.plugin_id(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Plugin execution succeeded"
                    );
                    PluginExecutionResult::succeeded(task_context, data, elapsed)
                }
                Outcome::Completed(Err(e)) => build_failed_result(task_context, e, elapsed),
                Outcome::TimedOut(deadline) => build_timed_out_result(task_context, deadline, elapsed),
                Outcome::Cancelled => build_failed_result(task_context, cancelled_error(), elapsed),
            }
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let error = if e.is_panic() {
                        Error::Internal(format!("plugin panicked: {}", e))
                    } else {
                        cancelled_error()
                    };
                    build_failed_result(context, error, Duration::ZERO)
                }
            }
        }
    }
}

async fn run_with_deadline<T>(
    logic: BoxFuture<'static, Result<T>>,
    deadline: Option<Duration>,
) -> Outcome<T> {
    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, logic).await {
            Ok(result) => Outcome::Completed(result),
            Err(_) => Outcome::TimedOut(deadline),
        },
        None => Outcome::Completed(logic.await),
    }
}

fn cancelled_error() -> Error {
    Error::ScanCancelled {
        reason: String::from("plugin execution cancelled"),
    }
}

/// Plugin execution errors pass through; anything else is attributed to the plugin.
fn wrap_error(error: Error, context: &PluginExecutionContext) -> Error {
    if error.is_plugin_execution() {
        error
    } else {
        Error::plugin_execution_caused_by(
            format!("Plugin execution error on '{}'.", context.plugin_id()),
            error,
        )
    }
}

fn build_failed_result<T>(
    context: PluginExecutionContext,
    error: Error,
    elapsed: Duration,
) -> PluginExecutionResult<T> {
    warn!(
        plugin_id = %context.plugin_id(),
        code = error.code(),
        "Plugin failed: {}", error
    );
    let error = wrap_error(error, &context);
    PluginExecutionResult::unsuccessful(ExecutionStatus::Failed, context, error, elapsed)
}

fn build_timed_out_result<T>(
    context: PluginExecutionContext,
    deadline: Duration,
    elapsed: Duration,
) -> PluginExecutionResult<T> {
    warn!(plugin_id = %context.plugin_id(), "Plugin timed out after {:?}", deadline);
    let error = Error::plugin_execution(format!(
        "Plugin execution timed out on '{}' after {:?}.",
        context.plugin_id(),
        deadline
    ));
    PluginExecutionResult::unsuccessful(ExecutionStatus::TimedOut, context, error, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::PluginType;
    use crate::plugin::PortScanner;
    use crate::testing::{definition, service, FakePortScanner};
    use std::error::Error as _;

    fn matched() -> PluginMatchingResult<dyn PortScanner> {
        PluginMatchingResult::new(
            definition(PluginType::PortScan, "Fake"),
            Arc::new(FakePortScanner::empty()),
            vec![service("ssh", 22)],
        )
    }

    #[tokio::test]
    async fn test_success() {
        let executor = PluginExecutor::new(PluginExecutionPool::new(2));
        let result = executor
            .execute_async(PluginExecutorConfig::new(&matched(), async { Ok(7) }))
            .await;

        assert!(result.is_succeeded());
        assert_eq!(result.result_data(), Some(&7));
        assert!(result.exception().is_none());
        assert_eq!(result.plugin_id(), "/test/PORT_SCAN/Fake/1.0");
        assert_eq!(result.matched_services(), &[service("ssh", 22)]);
    }

    #[tokio::test]
    async fn test_error_is_wrapped_with_plugin_id() {
        let executor = PluginExecutor::new(PluginExecutionPool::new(2));
        let result = executor
            .execute_async(PluginExecutorConfig::<()>::new(&matched(), async {
                Err(Error::Internal("boom".into()))
            }))
            .await;

        assert_eq!(result.execution_status(), ExecutionStatus::Failed);
        assert!(result.result_data().is_none());
        let error = result.exception().unwrap();
        assert_eq!(
            error.to_string(),
            "Plugin execution error on '/test/PORT_SCAN/Fake/1.0'."
        );
        assert_eq!(error.source().unwrap().to_string(), "Internal error: boom");
    }

    #[tokio::test]
    async fn test_plugin_execution_error_passes_through() {
        let executor = PluginExecutor::new(PluginExecutionPool::new(2));
        let result = executor
            .execute_async(PluginExecutorConfig::<()>::new(&matched(), async {
                Err(Error::plugin_execution("custom message"))
            }))
            .await;

        assert_eq!(result.exception().unwrap().to_string(), "custom message");
    }

    #[tokio::test]
    async fn test_panic_resolves_to_failed() {
        let executor = PluginExecutor::new(PluginExecutionPool::new(2));
        let result = executor
            .execute_async(PluginExecutorConfig::<()>::new(&matched(), async {
                if true {
                    panic!("plugin bug");
                }
                Ok(())
            }))
            .await;

        assert_eq!(result.execution_status(), ExecutionStatus::Failed);
        assert!(result.exception().unwrap().is_plugin_execution());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_produces_timed_out() {
        let executor =
            PluginExecutor::new(PluginExecutionPool::new(2)).with_deadline(Duration::from_secs(5));
        let result = executor
            .execute_async(PluginExecutorConfig::new(&matched(), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }))
            .await;

        assert_eq!(result.execution_status(), ExecutionStatus::TimedOut);
        assert!(result.exception().unwrap().to_string().contains("timed out"));
        assert_eq!(result.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_measured_from_execution_start() {
        let executor = PluginExecutor::new(PluginExecutionPool::new(1));
        let first = executor.execute_async(PluginExecutorConfig::new(&matched(), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        }));
        let second = executor.execute_async(PluginExecutorConfig::new(&matched(), async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(2)
        }));

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.elapsed(), Duration::from_secs(10));
        // Queued behind the first execution, but only its own run time counts.
        assert_eq!(second.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_cancellation_fails_outstanding_executions() {
        let token = CancellationToken::new();
        let executor = PluginExecutor::new(PluginExecutionPool::new(2))
            .with_cancellation_token(token.clone());
        let pending = executor.execute_async(PluginExecutorConfig::<()>::new(
            &matched(),
            futures::future::pending(),
        ));
        token.cancel();

        let result = pending.await;
        assert_eq!(result.execution_status(), ExecutionStatus::Failed);
        assert!(result.exception().unwrap().is_plugin_execution());
    }

    #[test]
    fn test_pool_minimum_size() {
        let pool = PluginExecutionPool::new(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.available(), 1);
    }
}
