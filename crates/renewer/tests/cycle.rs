//! End-to-end renewal cycles against in-memory capabilities.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use autossl_common::{CapabilityError, CertificateRecord, Domain, Stage};
use autossl_config::{
    Config, ConfigStore, IssuerConfig, NotifierConfig, PublisherConfig, RenewalConfig,
};
use autossl_renewer::report::JSON_ATTACHMENT_NAME;
use autossl_renewer::{
    CapabilityFactory, CdnCapabilities, CertificateIssuer, CertificatePublisher,
    CycleOrchestrator, DomainInventory, IssuedCertificate, Notification, NotificationOutcome,
    Notifier,
};

const DAY: i64 = 86400;

// ============================================================================
// Fakes
// ============================================================================

/// One shared fake standing in for the CDN, the issuer and the mailer.
#[derive(Default)]
struct World {
    domains: Vec<Domain>,
    certificates: Vec<CertificateRecord>,
    obtain_calls: Mutex<Vec<String>>,
    upload_calls: Mutex<Vec<String>>,
    force_https_calls: Mutex<Vec<(String, String)>>,
    remove_calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<Notification>>,
    /// Scripted errors keyed by domain (or certificate ID for removal),
    /// consumed in order
    obtain_failures: Scripted,
    upload_failures: Scripted,
    force_https_failures: Scripted,
    remove_failures: Scripted,
    /// Every send fails with this cause when set
    send_failure: Mutex<Option<String>>,
    next_cert: AtomicUsize,
}

type Scripted = Mutex<HashMap<String, VecDeque<String>>>;

fn script(failures: &Scripted, key: &str, causes: &[&str]) {
    failures.lock().insert(
        key.to_string(),
        causes.iter().map(|cause| cause.to_string()).collect(),
    );
}

fn scripted_failure(failures: &Scripted, key: &str) -> Result<(), CapabilityError> {
    match failures.lock().get_mut(key).and_then(VecDeque::pop_front) {
        Some(cause) => Err(CapabilityError::Other(cause)),
        None => Ok(()),
    }
}

impl World {
    fn new(domains: &[&str], certificates: Vec<CertificateRecord>) -> Self {
        Self {
            domains: domains.iter().map(|name| Domain::new(*name)).collect(),
            certificates,
            ..Default::default()
        }
    }

    fn fail_upload(&self, domain: &str, causes: &[&str]) {
        script(&self.upload_failures, domain, causes);
    }

    fn count(calls: &Mutex<Vec<String>>, domain: &str) -> usize {
        calls.lock().iter().filter(|d| *d == domain).count()
    }
}

#[async_trait]
impl DomainInventory for World {
    async fn list_domains(&self) -> Result<Vec<Domain>, CapabilityError> {
        Ok(self.domains.clone())
    }

    async fn list_certificates(&self) -> Result<Vec<CertificateRecord>, CapabilityError> {
        Ok(self.certificates.clone())
    }
}

#[async_trait]
impl CertificateIssuer for World {
    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, CapabilityError> {
        self.obtain_calls.lock().push(domain.to_string());
        scripted_failure(&self.obtain_failures, domain)?;
        Ok(IssuedCertificate {
            key_pem: format!("key for {domain}"),
            cert_pem: format!("cert for {domain}"),
        })
    }
}

#[async_trait]
impl CertificatePublisher for World {
    async fn upload(
        &self,
        key_pem: &str,
        cert_pem: &str,
        domain: &str,
    ) -> Result<String, CapabilityError> {
        assert_eq!(key_pem, format!("key for {domain}"));
        assert_eq!(cert_pem, format!("cert for {domain}"));
        self.upload_calls.lock().push(domain.to_string());
        scripted_failure(&self.upload_failures, domain)?;

        let n = self.next_cert.fetch_add(1, Ordering::SeqCst);
        Ok(format!("new-{n}"))
    }

    async fn force_https(&self, domain: &str, cert_id: &str) -> Result<(), CapabilityError> {
        self.force_https_calls
            .lock()
            .push((domain.to_string(), cert_id.to_string()));
        scripted_failure(&self.force_https_failures, domain)
    }

    async fn remove(&self, cert_id: &str) -> Result<(), CapabilityError> {
        self.remove_calls.lock().push(cert_id.to_string());
        scripted_failure(&self.remove_failures, cert_id)
    }
}

#[async_trait]
impl Notifier for World {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError> {
        if let Some(cause) = self.send_failure.lock().clone() {
            return Err(CapabilityError::Transport(cause));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Hands out the shared world for every section and counts builds.
struct WorldFactory {
    world: Arc<World>,
    builds: AtomicUsize,
}

impl WorldFactory {
    fn new(world: Arc<World>) -> Self {
        Self {
            world,
            builds: AtomicUsize::new(0),
        }
    }
}

impl CapabilityFactory for WorldFactory {
    fn issuer(&self, _: &IssuerConfig) -> Result<Arc<dyn CertificateIssuer>, CapabilityError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.world.clone())
    }

    fn cdn(&self, _: &PublisherConfig) -> Result<CdnCapabilities, CapabilityError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(CdnCapabilities {
            inventory: self.world.clone(),
            publisher: self.world.clone(),
        })
    }

    fn notifier(&self, _: &NotifierConfig) -> Result<Arc<dyn Notifier>, CapabilityError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.world.clone())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn notifier_config(recipients: &[&str]) -> NotifierConfig {
    NotifierConfig {
        smtp_host: "smtp.example.com".into(),
        smtp_port: 465,
        username: "autossl".into(),
        password: "secret".into(),
        sender: "autossl@example.com".into(),
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
    }
}

fn config() -> Config {
    Config {
        issuer: Some(IssuerConfig {
            command: vec!["lego".into(), "{domain}".into()],
            certificate_path: "/c/{domain}.crt".into(),
            key_path: "/c/{domain}.key".into(),
            timeout_secs: 30,
            env: Vec::new(),
        }),
        publisher: Some(PublisherConfig {
            access_key: "ak".into(),
            secret_key: "sk".into(),
            endpoint: "https://api.qiniu.com".into(),
        }),
        notifier: Some(notifier_config(&["ops@example.com"])),
        renewal: RenewalConfig {
            call_timeout_secs: 5,
            workers: 2,
            ..Default::default()
        },
    }
}

fn orchestrator(world: &Arc<World>, config: Config) -> (CycleOrchestrator, Arc<WorldFactory>) {
    let factory = Arc::new(WorldFactory::new(world.clone()));
    let store = Arc::new(ConfigStore::from_config(config));
    (CycleOrchestrator::new(store, factory.clone()), factory)
}

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_domain_without_certificate_is_renewed() {
    let world = Arc::new(World::new(&["a.example.com"], Vec::new()));
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.selected, 1);
    assert_eq!(report.first_pass_succeeded, 1);
    assert!(!report.has_residual_failures());
    assert_eq!(report.notification, NotificationOutcome::NotNeeded);

    assert_eq!(World::count(&world.obtain_calls, "a.example.com"), 1);
    assert_eq!(World::count(&world.upload_calls, "a.example.com"), 1);
    assert_eq!(
        *world.force_https_calls.lock(),
        vec![("a.example.com".to_string(), "new-0".to_string())]
    );
    assert!(world.remove_calls.lock().is_empty());
    assert!(world.sent.lock().is_empty());
}

#[tokio::test]
async fn test_expiring_certificate_is_replaced_and_retired() {
    let world = Arc::new(World::new(
        &["b.example.com", "fresh.example.com"],
        vec![
            CertificateRecord::new("b.example.com", "old-1", now() + 10 * DAY),
            CertificateRecord::new("fresh.example.com", "keep-1", now() + 90 * DAY),
        ],
    ));
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.selected, 1);
    assert_eq!(report.first_pass_succeeded, 1);
    assert_eq!(*world.remove_calls.lock(), vec!["old-1".to_string()]);
    assert_eq!(World::count(&world.obtain_calls, "fresh.example.com"), 0);
}

#[tokio::test]
async fn test_publish_failure_resumes_without_reissuing() {
    let world = Arc::new(World::new(&["c.example.com"], Vec::new()));
    world.fail_upload("c.example.com", &["quota exceeded"]);
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.first_pass_succeeded, 0);
    assert_eq!(report.recovered, 1);
    assert!(!report.has_residual_failures());
    assert_eq!(report.notification, NotificationOutcome::NotNeeded);

    assert_eq!(World::count(&world.obtain_calls, "c.example.com"), 1);
    assert_eq!(World::count(&world.upload_calls, "c.example.com"), 2);
    assert_eq!(world.force_https_calls.lock().len(), 1);
}

#[tokio::test]
async fn test_residual_failure_is_reported_with_resume_cause() {
    let world = Arc::new(World::new(&["c.example.com", "d.example.com"], Vec::new()));
    world.fail_upload("c.example.com", &["quota exceeded", "still over quota"]);
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.first_pass_succeeded, 1);
    assert_eq!(report.recovered, 0);
    assert_eq!(report.residual.len(), 1);
    let residual = &report.residual[0];
    assert_eq!(residual.domain_name, "c.example.com");
    assert_eq!(residual.stage, Stage::Publish);
    assert_eq!(residual.cause, "still over quota");
    assert_eq!(report.notification, NotificationOutcome::Sent);

    assert_eq!(World::count(&world.obtain_calls, "c.example.com"), 1);
    assert_eq!(World::count(&world.upload_calls, "c.example.com"), 2);

    let sent = world.sent.lock();
    assert_eq!(sent.len(), 1);
    let notification = &sent[0];
    assert_eq!(notification.recipients, vec!["ops@example.com".to_string()]);
    assert!(notification.html_body.contains("<td>c.example.com</td>"));
    assert!(notification.html_body.contains("still over quota"));
    assert!(!notification.html_body.contains("d.example.com"));
    assert_eq!(notification.html_body.matches("c.example.com").count(), 1);
    assert!(notification
        .attachments
        .iter()
        .any(|a| a.filename == JSON_ATTACHMENT_NAME));
}

#[tokio::test]
async fn test_enforce_tls_failure_resumes_without_reuploading() {
    let world = Arc::new(World::new(
        &["e.example.com"],
        vec![CertificateRecord::new("e.example.com", "old-e", now() + 5 * DAY)],
    ));
    script(&world.force_https_failures, "e.example.com", &["domain is frozen"]);
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.recovered, 1);
    assert!(!report.has_residual_failures());
    assert_eq!(World::count(&world.obtain_calls, "e.example.com"), 1);
    assert_eq!(World::count(&world.upload_calls, "e.example.com"), 1);
    // Both attempts target the certificate uploaded on the first pass.
    assert_eq!(
        *world.force_https_calls.lock(),
        vec![
            ("e.example.com".to_string(), "new-0".to_string()),
            ("e.example.com".to_string(), "new-0".to_string()),
        ]
    );
    assert_eq!(*world.remove_calls.lock(), vec!["old-e".to_string()]);
}

#[tokio::test]
async fn test_retire_failure_resumes_with_removal_only() {
    let world = Arc::new(World::new(
        &["r.example.com"],
        vec![CertificateRecord::new("r.example.com", "old-r", now() + 5 * DAY)],
    ));
    script(&world.remove_failures, "old-r", &["certificate in use"]);
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.recovered, 1);
    assert!(!report.has_residual_failures());
    assert_eq!(World::count(&world.obtain_calls, "r.example.com"), 1);
    assert_eq!(World::count(&world.upload_calls, "r.example.com"), 1);
    assert_eq!(world.force_https_calls.lock().len(), 1);
    assert_eq!(
        *world.remove_calls.lock(),
        vec!["old-r".to_string(), "old-r".to_string()]
    );
}

#[tokio::test]
async fn test_obtain_failure_resumes_from_the_start() {
    let world = Arc::new(World::new(&["o.example.com"], Vec::new()));
    script(&world.obtain_failures, "o.example.com", &["rate limited"]);
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.recovered, 1);
    assert!(!report.has_residual_failures());
    assert_eq!(World::count(&world.obtain_calls, "o.example.com"), 2);
    assert_eq!(World::count(&world.upload_calls, "o.example.com"), 1);
    assert_eq!(world.force_https_calls.lock().len(), 1);
}

// ============================================================================
// Notification Edge Cases
// ============================================================================

#[tokio::test]
async fn test_failed_delivery_is_recorded() {
    let world = Arc::new(World::new(&["c.example.com"], Vec::new()));
    world.fail_upload("c.example.com", &["quota exceeded", "quota exceeded"]);
    *world.send_failure.lock() = Some("connection refused".to_string());
    let (orchestrator, _) = orchestrator(&world, config());

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert!(!report.cancelled);
    assert_eq!(report.residual.len(), 1);
    assert_eq!(report.residual[0].domain_name, "c.example.com");
    match &report.notification {
        NotificationOutcome::Failed(cause) => assert!(cause.contains("connection refused")),
        other => panic!("unexpected notification outcome: {other:?}"),
    }
    assert!(world.sent.lock().is_empty());
}

#[tokio::test]
async fn test_residual_failure_without_notifier() {
    let world = Arc::new(World::new(&["c.example.com"], Vec::new()));
    world.fail_upload("c.example.com", &["quota exceeded", "quota exceeded"]);
    let (orchestrator, _) = orchestrator(
        &world,
        Config {
            notifier: None,
            ..config()
        },
    );

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.residual.len(), 1);
    assert_eq!(report.notification, NotificationOutcome::NoNotifier);
    assert!(world.sent.lock().is_empty());
}

#[tokio::test]
async fn test_residual_failure_without_recipients() {
    let world = Arc::new(World::new(&["c.example.com"], Vec::new()));
    world.fail_upload("c.example.com", &["quota exceeded", "quota exceeded"]);
    let (orchestrator, _) = orchestrator(
        &world,
        Config {
            notifier: Some(notifier_config(&[])),
            ..config()
        },
    );

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.notification, NotificationOutcome::NoRecipients);
    assert!(world.sent.lock().is_empty());
}

// ============================================================================
// Configuration And Cancellation
// ============================================================================

#[tokio::test]
async fn test_missing_publisher_skips_cycle() {
    let world = Arc::new(World::new(&["a.example.com"], Vec::new()));
    let (orchestrator, _) = orchestrator(
        &world,
        Config {
            publisher: None,
            ..config()
        },
    );

    let report = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.selected, 0);
    assert!(report.inventory_error.is_some());
    assert!(!report.cancelled);
    assert!(world.obtain_calls.lock().is_empty());
}

#[tokio::test]
async fn test_capabilities_rebuilt_only_on_change() {
    let world = Arc::new(World::new(&[], Vec::new()));
    let (orchestrator, factory) = orchestrator(&world, config());

    orchestrator.run_cycle(&CancellationToken::new()).await;
    assert_eq!(factory.builds.load(Ordering::SeqCst), 3);

    orchestrator.run_cycle(&CancellationToken::new()).await;
    assert_eq!(factory.builds.load(Ordering::SeqCst), 3);

    orchestrator.store().replace(Config {
        notifier: Some(notifier_config(&["oncall@example.com"])),
        ..config()
    });
    orchestrator.run_cycle(&CancellationToken::new()).await;
    assert_eq!(factory.builds.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_cancelled_cycle_does_no_work() {
    let world = Arc::new(World::new(&["a.example.com"], Vec::new()));
    let (orchestrator, _) = orchestrator(&world, config());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrator.run_cycle(&cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.selected, 0);
    assert!(world.obtain_calls.lock().is_empty());
    assert!(world.sent.lock().is_empty());
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let world = Arc::new(World::new(&["a.example.com"], Vec::new()));
    let (orchestrator, _) = orchestrator(&world, config());

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let handle = tokio::spawn(async move {
        orchestrator.run(cancel).await;
    });

    // The loop waits out the 12h interval after the first cycle.
    for _ in 0..200 {
        if !world.force_https_calls.lock().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    stopper.cancel();
    handle.await.unwrap();

    assert_eq!(World::count(&world.obtain_calls, "a.example.com"), 1);
}
