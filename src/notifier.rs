//! PagerDuty alert delivery for monitor events.
//!
//! Consumes the [`MonitorEvent`] stream and converts trigger events into
//! PagerDuty generic-events API calls. Resolution events are logged but
//! not delivered; the operator working the incident resolves it.
//!
//! Delivery is strictly best-effort. A failed POST is logged and counted,
//! never propagated, so a PagerDuty outage cannot take the monitor down
//! with it.
//!
//! Whole-cycle faults usually mean the CouchDB server itself is down, at
//! which point every cycle faults. Those alerts are collapsed to at most
//! one per [`GENERIC_ALERT_COOLDOWN`].

use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PagerDutyConfig;
use crate::error::{BackupError, Result};
use crate::metrics;
use crate::monitor::MonitorEvent;

/// PagerDuty generic-events API endpoint.
const EVENTS_ENDPOINT: &str = "https://events.pagerduty.com/generic/2010-04-15/create_event.json";

/// Environment variable consulted when the config carries no service key.
pub const SERVICE_KEY_ENV: &str = "PAGER_DUTY_SERVICE_KEY";

/// Minimum spacing between whole-system failure alerts.
pub const GENERIC_ALERT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

/// Description sent when a monitor cycle fails outright.
const GENERIC_FAILURE_MESSAGE: &str =
    "The backup system is in error. It is possible that couchdb has stopped";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends backup health alerts to PagerDuty.
pub struct PagerDutyNotifier {
    client: reqwest::Client,
    service_key: String,
    endpoint: String,
    last_generic_alert: Option<Instant>,
}

impl PagerDutyNotifier {
    /// Create a notifier with the given service key.
    pub fn new(service_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            service_key: service_key.into(),
            endpoint: EVENTS_ENDPOINT.to_string(),
            last_generic_alert: None,
        })
    }

    /// Build a notifier from config, or `None` when delivery is disabled.
    ///
    /// The service key comes from the config file, falling back to the
    /// [`SERVICE_KEY_ENV`] environment variable. Enabling delivery
    /// without a key from either place is a config error.
    pub fn from_config(config: &PagerDutyConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let key = resolve_service_key(config, std::env::var(SERVICE_KEY_ENV).ok())?;
        Ok(Some(Self::new(key)?))
    }

    /// The service key this notifier posts with.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Consume monitor events until the channel closes.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<MonitorEvent>) {
        info!("PagerDuty notifier running");
        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }
        info!("PagerDuty notifier stopped");
    }

    /// Translate one monitor event into zero or one PagerDuty trigger.
    pub async fn handle_event(&mut self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Triggered {
                target,
                reasons,
                episode_id,
            } => {
                let description = trigger_description(target, reasons);
                debug!(
                    target = %target,
                    episode_id = %episode_id,
                    "Delivering trigger alert"
                );
                self.deliver(&description).await;
            }
            MonitorEvent::Resolved {
                target, episode_id, ..
            } => {
                // Resolution is left to whoever is working the incident.
                info!(
                    target = %target,
                    episode_id = %episode_id,
                    "Backup recovered; leaving incident open for operator"
                );
                metrics::record_notification("skipped");
            }
            MonitorEvent::Fault { message } => {
                if self.claim_generic_alert_slot(Instant::now()) {
                    warn!(error = %message, "Monitor fault; delivering generic alert");
                    self.deliver(GENERIC_FAILURE_MESSAGE).await;
                } else {
                    debug!(error = %message, "Monitor fault alert throttled");
                    metrics::record_notification("throttled");
                }
            }
        }
    }

    /// Whether a generic alert may fire at `now`. Claims the slot when it
    /// may, starting a new cooldown window.
    fn claim_generic_alert_slot(&mut self, now: Instant) -> bool {
        let due = match self.last_generic_alert {
            None => true,
            Some(last) => now.duration_since(last) >= GENERIC_ALERT_COOLDOWN,
        };
        if due {
            self.last_generic_alert = Some(now);
        }
        due
    }

    /// POST one trigger event. Failures are logged, never returned.
    async fn deliver(&self, description: &str) {
        let body = json!({
            "service_key": self.service_key,
            "event_type": "trigger",
            "description": description,
        });

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!(description = %description, "Alert delivered");
                metrics::record_notification("delivered");
            }
            Ok(response) => {
                warn!(
                    status = %response.status(),
                    description = %description,
                    "PagerDuty rejected alert"
                );
                metrics::record_notification("failed");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    description = %description,
                    "Failed to deliver alert"
                );
                metrics::record_notification("failed");
            }
        }
    }
}

/// Resolve the service key from config, then from the environment value.
fn resolve_service_key(config: &PagerDutyConfig, env_value: Option<String>) -> Result<String> {
    if let Some(key) = config.service_key.as_deref() {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    match env_value {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(BackupError::Config(format!(
            "pagerduty is enabled but no service key was found in the config or ${}",
            SERVICE_KEY_ENV
        ))),
    }
}

/// Alert text for a target that just entered error state.
fn trigger_description(target: &str, reasons: &[String]) -> String {
    format!(
        "Backups for \"{}\" are experiencing problems. The following error(s) have occured: \"{}\"",
        target,
        reasons.join(", \"")
    )
}
