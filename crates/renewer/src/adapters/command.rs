//! Certificate issuance through an external ACME client.
//!
//! The configured command (typically `lego`) performs the ACME exchange and
//! writes the key and certificate to disk; this adapter runs it and reads
//! the results back.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use autossl_common::CapabilityError;
use autossl_config::{IssuerConfig, DOMAIN_PLACEHOLDER};

use crate::ports::{CertificateIssuer, IssuedCertificate};

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 512;

/// Issues certificates by running an external command.
#[derive(Debug, Clone)]
pub struct CommandIssuer {
    config: IssuerConfig,
}

impl CommandIssuer {
    pub fn new(config: &IssuerConfig) -> Result<Self, CapabilityError> {
        if config.command.is_empty() {
            return Err(CapabilityError::Other(
                "issuer command must not be empty".to_string(),
            ));
        }
        Ok(Self {
            config: config.clone(),
        })
    }

    fn expand(template: &str, domain: &str) -> String {
        template.replace(DOMAIN_PLACEHOLDER, domain)
    }

    async fn run_command(&self, domain: &str) -> Result<(), CapabilityError> {
        let argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|arg| Self::expand(arg, domain))
            .collect();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CapabilityError::Other("issuer command must not be empty".into()))?;

        debug!(domain = %domain, program = %program, "Running issuer command");
        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .envs(self.config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let timeout = self.config.timeout();
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CapabilityError::Timeout(timeout))??;

        let elapsed = start.elapsed();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt = tail(stderr.trim(), STDERR_EXCERPT);
            warn!(
                domain = %domain,
                exit_code = ?output.status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Issuer command failed"
            );
            return Err(CapabilityError::Other(format!(
                "issuer command exited with {}: {}",
                output.status, excerpt
            )));
        }

        info!(
            domain = %domain,
            elapsed_secs = elapsed.as_secs(),
            "Issuer command completed"
        );
        Ok(())
    }

    async fn read_pem(path: &str) -> Result<String, CapabilityError> {
        let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
            CapabilityError::Other(format!("failed to read {path}: {e}"))
        })?;
        if pem.trim().is_empty() {
            return Err(CapabilityError::InvalidResponse(format!("{path} is empty")));
        }
        Ok(pem)
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

/// Last `max` bytes of `s`, on a character boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[async_trait]
impl CertificateIssuer for CommandIssuer {
    async fn obtain(&self, domain: &str) -> Result<IssuedCertificate, CapabilityError> {
        self.run_command(domain).await?;

        let key_pem = Self::read_pem(&Self::expand(&self.config.key_path, domain)).await?;
        let cert_pem = Self::read_pem(&Self::expand(&self.config.certificate_path, domain)).await?;

        Ok(IssuedCertificate { key_pem, cert_pem })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(dir: &std::path::Path, script: &str, timeout_secs: u64) -> CommandIssuer {
        CommandIssuer::new(&IssuerConfig {
            command: vec!["sh".into(), "-c".into(), script.into()],
            certificate_path: dir.join("{domain}.crt").display().to_string(),
            key_path: dir.join("{domain}.key").display().to_string(),
            timeout_secs,
            env: vec![("AUTOSSL_TEST_VALUE".into(), "from-env".into())],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_obtain_reads_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            "printf 'KEY {{domain}}' > {dir}/{{domain}}.key && printf \"CERT $AUTOSSL_TEST_VALUE\" > {dir}/{{domain}}.crt",
            dir = dir.path().display()
        );

        let issued = issuer(dir.path(), &script, 30)
            .obtain("a.example.com")
            .await
            .unwrap();
        assert_eq!(issued.key_pem, "KEY a.example.com");
        assert_eq!(issued.cert_pem, "CERT from-env");
    }

    #[tokio::test]
    async fn test_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = issuer(dir.path(), "echo 'rate limited' >&2; exit 3", 30)
            .obtain("a.example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_missing_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = issuer(dir.path(), "true", 30)
            .obtain("a.example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = issuer(dir.path(), "sleep 5", 1)
            .obtain("a.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout(_)));
    }

    #[test]
    fn test_empty_command_rejected() {
        let result = CommandIssuer::new(&IssuerConfig {
            command: Vec::new(),
            certificate_path: "/c/{domain}.crt".into(),
            key_path: "/c/{domain}.key".into(),
            timeout_secs: 30,
            env: Vec::new(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
    }
}
