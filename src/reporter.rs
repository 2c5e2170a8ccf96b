use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

/// Forwards fatal errors to an external collector when one is configured
/// through the environment. Constructed once in `main` and passed down,
/// never registered globally. Without `ERROR_REPORT_URL` it degrades to
/// log-only.
pub struct ErrorReporter {
    http: Client,
    endpoint: Option<String>,
    token: Option<String>,
    environment: Option<String>,
}

impl ErrorReporter {
    pub fn from_env(http: Client) -> Self {
        let endpoint = std::env::var("ERROR_REPORT_URL").ok();
        if endpoint.is_none() {
            debug!("ERROR_REPORT_URL not set, error reporting is log-only");
        }
        Self {
            http,
            endpoint,
            token: std::env::var("ERROR_REPORT_TOKEN").ok(),
            environment: std::env::var("ERROR_REPORT_ENVIRONMENT").ok(),
        }
    }

    /// Best-effort delivery. A collector outage must never mask the
    /// original failure, so problems here are logged and swallowed.
    pub async fn report(&self, error: &anyhow::Error) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };
        let payload = json!({
            "level": "error",
            "environment": self.environment,
            "message": format!("{error:#}"),
        });
        let mut request = self.http.post(endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "error collector rejected the report");
            }
            Err(err) => warn!("failed to deliver error report: {err}"),
            Ok(_) => {}
        }
    }
}
