use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::{DistributedLockCoordinator, LockError};

impl DistributedLockCoordinator {
    /// Run `work` while holding the distributed lock `name`.
    ///
    /// Acquisition failures are returned before `work` starts. Once the lock is
    /// held, `work` gets `work_timeout` to finish and the lock is released
    /// exactly once on every path. The error `work` returns is passed through
    /// as is; a timeout surfaces as [`LockError::WorkTimeout`].
    pub async fn run_locked<T, E, F, Fut>(
        &self,
        name: &str,
        acquire_timeout: Duration,
        work_timeout: Duration,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        debug!(lock = %name, "Initiating locked run");
        let mut releaser = self.acquire(name, acquire_timeout).await?;

        debug!(lock = %name, "Running locked work");
        let outcome = tokio::time::timeout(work_timeout, work()).await;
        releaser.release().await;

        match outcome {
            Ok(result) => {
                debug!(lock = %name, ok = result.is_ok(), "Finished locked work");
                result
            }
            Err(_) => Err(LockError::WorkTimeout {
                name: name.to_string(),
                timeout: work_timeout,
            }
            .into()),
        }
    }
}
