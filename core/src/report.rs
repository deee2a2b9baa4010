//! Fire-and-forget fault reporting.
//!
//! Recoverable faults are posted to the gateway's error sink so operator-side
//! logs see client failures. Reporting is best effort: the response is
//! ignored and a failed report only leaves a local log line.

use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, Serialize)]
pub struct FaultReport {
    pub message: String,
    /// Component the fault came from, e.g. "pipeline" or "playback".
    pub source: String,
}

impl FaultReport {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }
}

#[derive(Clone)]
pub struct FaultReporter {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl FaultReporter {
    /// Reports go to `endpoint`; `None` disables remote reporting entirely.
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    /// Endpoint from `FAULT_REPORT_URL`, typically the gateway's
    /// `/api/errors` route.
    pub fn from_env() -> Self {
        Self::new(std::env::var("FAULT_REPORT_URL").ok())
    }

    /// Post a report without waiting for the outcome.
    pub fn report(&self, report: FaultReport) {
        let Some(url) = self.endpoint.clone() else {
            debug!(target = "report", source = %report.source, message = %report.message, "Fault (remote reporting disabled)");
            return;
        };
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = http.post(&url).json(&report).send().await {
                debug!(target = "report", error = %e, "Fault report delivery failed");
            }
        });
    }
}
