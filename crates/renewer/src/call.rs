//! Deadline and cancellation for capability calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use autossl_common::CapabilityError;

/// Wraps every outbound capability call of a cycle.
///
/// Each call gets its own deadline; all calls share the cycle's
/// cancellation token so that shutdown interrupts whatever is in flight.
#[derive(Debug, Clone)]
pub struct CallGuard {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `call` under the deadline, racing it against cancellation.
    pub async fn run<T, F>(&self, call: F) -> Result<T, CapabilityError>
    where
        F: Future<Output = Result<T, CapabilityError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(CapabilityError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CapabilityError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner,
                Err(_) => Err(CapabilityError::Timeout(self.timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let guard = CallGuard::new(Duration::from_secs(1), CancellationToken::new());
        let value = guard.run(async { Ok::<_, CapabilityError>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = guard
            .run(async { Err::<(), _>(CapabilityError::Other("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Other(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let guard = CallGuard::new(Duration::from_secs(5), CancellationToken::new());
        let err = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, CapabilityError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = CallGuard::new(Duration::from_secs(5), token);
        let err = guard
            .run(async { Ok::<_, CapabilityError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_during_call() {
        let token = CancellationToken::new();
        let guard = CallGuard::new(Duration::from_secs(60), token.clone());

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        };
        let call = guard.run(async {
            futures::future::pending::<()>().await;
            Ok::<_, CapabilityError>(())
        });

        let (result, ()) = tokio::join!(call, canceller);
        assert!(result.unwrap_err().is_cancelled());
    }
}
