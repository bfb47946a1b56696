//! The renewal stage pipeline.
//!
//! A [`WorkItem`] moves through [`Stage::ALL`] in order. The pipeline stops
//! at the first failing stage and hands the item back exactly as it stood,
//! so a later attempt can re-enter at that stage without repeating the
//! stages that already succeeded.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, trace, warn};

use autossl_common::{CapabilityError, FailureRecord, Stage, WorkItem};

use crate::call::CallGuard;
use crate::capabilities::CapabilitySet;
use crate::ports::CertificatePublisher;

/// Why a stage did not complete.
#[derive(Debug, Error)]
pub enum StageError {
    /// An artifact an earlier stage should have produced is missing.
    #[error("missing {0}")]
    MissingArtifact(&'static str),

    /// The capability the stage needs is not configured.
    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

impl StageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Capability(e) if e.is_cancelled())
    }
}

/// A failed stage of one work item.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub domain: String,
    pub cause: StageError,
}

impl StageFailure {
    /// Report row for this failure.
    pub fn to_record(&self) -> FailureRecord {
        FailureRecord {
            domain_name: self.domain.clone(),
            stage: self.stage,
            cause: self.cause.to_string(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} failed: {}", self.domain, self.stage, self.cause)
    }
}

/// Result of running a work item through the pipeline.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every stage completed.
    Done(WorkItem),
    /// A stage failed; `item` carries everything produced before it.
    Failed { item: WorkItem, failure: StageFailure },
}

impl PipelineOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, PipelineOutcome::Done(_))
    }
}

/// Executes stages against one capability set.
pub struct Pipeline {
    capabilities: Arc<CapabilitySet>,
    guard: CallGuard,
}

impl Pipeline {
    pub fn new(capabilities: Arc<CapabilitySet>, guard: CallGuard) -> Self {
        Self {
            capabilities,
            guard,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.guard.is_cancelled()
    }

    /// Run `item` from `start` through the last stage.
    pub async fn run_from(&self, mut item: WorkItem, start: Stage) -> PipelineOutcome {
        for &stage in start.remaining_from() {
            trace!(domain = %item.name, stage = %stage, "Running stage");

            if let Err(cause) = self.run_stage(stage, &mut item).await {
                warn!(
                    domain = %item.name,
                    stage = %stage,
                    error = %cause,
                    "Stage failed"
                );
                let failure = StageFailure {
                    stage,
                    domain: item.name.clone(),
                    cause,
                };
                return PipelineOutcome::Failed { item, failure };
            }

            debug!(domain = %item.name, stage = %stage, "Stage completed");
        }

        PipelineOutcome::Done(item)
    }

    /// Run many items with at most `workers` in flight.
    ///
    /// Outcomes are returned in input order. Stages of a single item always
    /// run in sequence.
    pub async fn run_batch<I>(&self, entries: I, workers: usize) -> Vec<PipelineOutcome>
    where
        I: IntoIterator<Item = (WorkItem, Stage)>,
    {
        stream::iter(entries)
            .map(|(item, start)| self.run_from(item, start))
            .buffered(workers.max(1))
            .collect()
            .await
    }

    async fn run_stage(&self, stage: Stage, item: &mut WorkItem) -> Result<(), StageError> {
        match stage {
            Stage::Obtain => {
                let issuer = self
                    .capabilities
                    .issuer
                    .as_ref()
                    .ok_or(StageError::Unavailable("certificate issuer"))?;

                let issued = self.guard.run(issuer.obtain(&item.name)).await?;
                item.key_pem = Some(issued.key_pem);
                item.cert_pem = Some(issued.cert_pem);
            }
            Stage::Publish => {
                let publisher = self.publisher()?;
                let key_pem = item
                    .key_pem
                    .as_deref()
                    .ok_or(StageError::MissingArtifact("private key"))?;
                let cert_pem = item
                    .cert_pem
                    .as_deref()
                    .ok_or(StageError::MissingArtifact("certificate"))?;

                let cert_id = self
                    .guard
                    .run(publisher.upload(key_pem, cert_pem, &item.name))
                    .await?;
                debug!(domain = %item.name, cert_id = %cert_id, "Certificate uploaded");
                item.cert_id = Some(cert_id);
            }
            Stage::EnforceTls => {
                let publisher = self.publisher()?;
                let cert_id = item
                    .cert_id
                    .as_deref()
                    .ok_or(StageError::MissingArtifact("uploaded certificate ID"))?;

                self.guard
                    .run(publisher.force_https(&item.name, cert_id))
                    .await?;
            }
            Stage::RetireOld => match item.retirable_cert_id() {
                None => {
                    trace!(domain = %item.name, "No previous certificate to retire");
                }
                Some(old_cert_id) => {
                    let publisher = self.publisher()?;
                    self.guard.run(publisher.remove(old_cert_id)).await?;
                    debug!(
                        domain = %item.name,
                        cert_id = %old_cert_id,
                        "Previous certificate removed"
                    );
                }
            },
        }
        Ok(())
    }

    fn publisher(&self) -> Result<&Arc<dyn CertificatePublisher>, StageError> {
        self.capabilities
            .publisher
            .as_ref()
            .ok_or(StageError::Unavailable("certificate publisher"))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("capabilities", &self.capabilities)
            .field("call_timeout", &self.guard.timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{CertificateIssuer, IssuedCertificate};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_upload: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CertificateIssuer for Recorder {
        async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, CapabilityError> {
            self.calls.lock().push(format!("obtain {domain}"));
            Ok(IssuedCertificate {
                key_pem: "KEY".into(),
                cert_pem: "CERT".into(),
            })
        }
    }

    #[async_trait]
    impl CertificatePublisher for Recorder {
        async fn upload(
            &self,
            _key_pem: &str,
            _cert_pem: &str,
            domain: &str,
        ) -> Result<String, CapabilityError> {
            self.calls.lock().push(format!("upload {domain}"));
            if self.fail_upload {
                return Err(CapabilityError::Rejected {
                    status: 400,
                    message: "quota exceeded".into(),
                });
            }
            Ok("new-1".into())
        }

        async fn force_https(&self, domain: &str, cert_id: &str) -> Result<(), CapabilityError> {
            self.calls.lock().push(format!("force_https {domain} {cert_id}"));
            Ok(())
        }

        async fn remove(&self, cert_id: &str) -> Result<(), CapabilityError> {
            self.calls.lock().push(format!("remove {cert_id}"));
            Ok(())
        }
    }

    fn pipeline(recorder: &Arc<Recorder>) -> Pipeline {
        let capabilities = CapabilitySet {
            issuer: Some(recorder.clone()),
            publisher: Some(recorder.clone()),
            ..CapabilitySet::default()
        };
        Pipeline::new(
            Arc::new(capabilities),
            CallGuard::new(Duration::from_secs(5), CancellationToken::new()),
        )
    }

    #[tokio::test]
    async fn test_full_run_with_old_certificate() {
        let recorder = Arc::new(Recorder::default());
        let outcome = pipeline(&recorder)
            .run_from(
                WorkItem::new("b.example.com", Some("old-1".into())),
                Stage::Obtain,
            )
            .await;

        let PipelineOutcome::Done(item) = outcome else {
            panic!("expected success");
        };
        assert_eq!(item.cert_id.as_deref(), Some("new-1"));
        assert_eq!(
            recorder.calls(),
            vec![
                "obtain b.example.com",
                "upload b.example.com",
                "force_https b.example.com new-1",
                "remove old-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_retire_skipped_without_old_certificate() {
        let recorder = Arc::new(Recorder::default());
        let outcome = pipeline(&recorder)
            .run_from(WorkItem::new("a.example.com", None), Stage::Obtain)
            .await;

        assert!(outcome.is_done());
        assert!(!recorder.calls().iter().any(|c| c.starts_with("remove")));
    }

    #[tokio::test]
    async fn test_failure_keeps_artifacts() {
        let recorder = Arc::new(Recorder {
            fail_upload: true,
            ..Recorder::default()
        });
        let outcome = pipeline(&recorder)
            .run_from(WorkItem::new("c.example.com", None), Stage::Obtain)
            .await;

        let PipelineOutcome::Failed { item, failure } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.stage, Stage::Publish);
        assert_eq!(item.key_pem.as_deref(), Some("KEY"));
        assert_eq!(
            failure.to_record().describe(),
            "publish failed: request rejected (400): quota exceeded"
        );
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let recorder = Arc::new(Recorder::default());
        let outcome = pipeline(&recorder)
            .run_from(WorkItem::new("a.example.com", None), Stage::EnforceTls)
            .await;

        let PipelineOutcome::Failed { failure, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(matches!(failure.cause, StageError::MissingArtifact(_)));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_capability() {
        let pipeline = Pipeline::new(
            Arc::new(CapabilitySet::default()),
            CallGuard::new(Duration::from_secs(5), CancellationToken::new()),
        );
        let outcome = pipeline
            .run_from(WorkItem::new("a.example.com", None), Stage::Obtain)
            .await;

        let PipelineOutcome::Failed { failure, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.stage, Stage::Obtain);
        assert!(matches!(failure.cause, StageError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let recorder = Arc::new(Recorder::default());
        let items = ["a", "b", "c"]
            .into_iter()
            .map(|n| (WorkItem::new(format!("{n}.example.com"), None), Stage::Obtain));

        let outcomes = pipeline(&recorder).run_batch(items, 2).await;
        let names: Vec<String> = outcomes
            .into_iter()
            .map(|o| match o {
                PipelineOutcome::Done(item) => item.name,
                PipelineOutcome::Failed { item, .. } => item.name,
            })
            .collect();
        assert_eq!(names, vec!["a.example.com", "b.example.com", "c.example.com"]);
    }
}
