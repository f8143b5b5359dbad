//! Remote alerting through a Watchtower HTTP endpoint.
//!
//! Every message is logged locally and then posted from a spawned task, so a
//! slow or unreachable endpoint never stalls block processing.

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use salesindex_core::config::WatchtowerSettings;
use salesindex_core::Alerter;

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    app_id: &'a str,
    #[serde(rename = "type")]
    type_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    token: &'a str,
    log: LogEntry<'a>,
}

/// [`Alerter`] that forwards messages to Watchtower.
pub struct WatchtowerAlerter {
    client: reqwest::Client,
    settings: WatchtowerSettings,
}

impl WatchtowerAlerter {
    pub fn new(settings: WatchtowerSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, settings })
    }

    fn payload<'a>(&'a self, type_id: &'a str, message: &'a str) -> MessagePayload<'a> {
        MessagePayload {
            token: &self.settings.token,
            log: LogEntry {
                app_id: &self.settings.app_id,
                type_id,
                message,
            },
        }
    }

    fn send(&self, type_id: &str, message: &str) {
        let body = match serde_json::to_value(self.payload(type_id, message)) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "cannot encode watchtower message");
                return;
            }
        };
        let request = self.client.post(&self.settings.endpoint).json(&body);

        // no runtime (e.g. during shutdown): local log only
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(status = %resp.status(), "watchtower rejected message");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "watchtower unreachable"),
            }
        });
    }
}

impl Alerter for WatchtowerAlerter {
    fn info(&self, message: &str) {
        tracing::info!(target: "alert", "{message}");
        self.send(&self.settings.types.info, message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "alert", "{message}");
        self.send(&self.settings.types.warning, message);
    }
}
