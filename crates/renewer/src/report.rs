//! Operator alert rendering for residual failures.

use chrono::{DateTime, Utc};
use html_escape::encode_text;
use tracing::warn;

use autossl_common::{CycleId, FailureRecord};

use crate::ports::{Attachment, Notification};

/// Name of the machine-readable attachment.
pub const JSON_ATTACHMENT_NAME: &str = "renewal-failures.json";

/// Alert for the failures left after a cycle's resume pass.
#[derive(Debug)]
pub struct FailureReport<'a> {
    cycle_id: &'a CycleId,
    generated_at: DateTime<Utc>,
    failures: &'a [FailureRecord],
}

impl<'a> FailureReport<'a> {
    pub fn new(cycle_id: &'a CycleId, failures: &'a [FailureRecord]) -> Self {
        Self {
            cycle_id,
            generated_at: Utc::now(),
            failures,
        }
    }

    pub fn with_timestamp(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn subject(&self) -> String {
        format!(
            "[autossl] Certificate renewal alert: {} domain(s) failed",
            self.failures.len()
        )
    }

    pub fn html(&self) -> String {
        let mut rows = String::new();
        for failure in self.failures {
            rows.push_str(&format!(
                "      <tr><td>{}</td><td>{}</td></tr>\n",
                encode_text(&failure.domain_name),
                encode_text(&failure.describe()),
            ));
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <style>
    body {{ font-family: sans-serif; }}
    table {{ border-collapse: collapse; }}
    th, td {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}
    th {{ background: #f3f3f3; }}
  </style>
</head>
<body>
  <p>The following domains could not be renewed after one retry.</p>
  <table>
    <thead>
      <tr><th>Domain</th><th>Cause</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
  <p>Cycle {cycle} at {time}</p>
</body>
</html>
"#,
            rows = rows,
            cycle = encode_text(self.cycle_id.as_str()),
            time = self.generated_at.to_rfc3339(),
        )
    }

    pub fn text(&self) -> String {
        let mut text = String::from("The following domains could not be renewed after one retry:\n\n");
        for failure in self.failures {
            text.push_str(&format!("  {}: {}\n", failure.domain_name, failure.describe()));
        }
        text.push_str(&format!(
            "\nCycle {} at {}\n",
            self.cycle_id,
            self.generated_at.to_rfc3339()
        ));
        text
    }

    pub fn json_attachment(&self) -> Result<Attachment, serde_json::Error> {
        Ok(Attachment {
            filename: JSON_ATTACHMENT_NAME.to_string(),
            content_type: "application/json".to_string(),
            body: serde_json::to_vec_pretty(self.failures)?,
        })
    }

    /// Assemble the notification for `recipients`.
    pub fn to_notification(&self, recipients: &[String]) -> Notification {
        let attachments = match self.json_attachment() {
            Ok(attachment) => vec![attachment],
            Err(e) => {
                warn!(error = %e, "Failed to serialize failure attachment");
                Vec::new()
            }
        };

        Notification {
            recipients: recipients.to_vec(),
            subject: self.subject(),
            text_body: self.text(),
            html_body: self.html(),
            attachments,
        }
    }
}
