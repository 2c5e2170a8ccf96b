use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use url::Url;

use crate::auth::Credentials;
use crate::report::Report;

const API_VERSION: &str = "v3";
const API_MINOR_VERSION: &str = "40";
const USER_AGENT: &str = concat!("qb-report-tap/", env!("CARGO_PKG_VERSION"));

/// Client for the reporting endpoints, bound to one realm and one bearer
/// token for the duration of a sync. Transport and authorization failures
/// surface as errors here; retry policy is not this layer's concern.
pub struct ReportClient<'a> {
    http: &'a Client,
    base_url: &'static str,
    credentials: Credentials,
}

impl<'a> ReportClient<'a> {
    pub fn new(http: &'a Client, base_url: &'static str, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// GET one report entity with the given query parameters and decode
    /// the raw report tree. `minorversion` is always appended.
    pub async fn get_report(&self, entity: &str, params: &[(&str, &str)]) -> Result<Report> {
        let url = Url::parse(self.base_url)
            .and_then(|base| {
                base.join(&format!(
                    "{API_VERSION}/company/{}/reports/{entity}",
                    self.credentials.realm_id
                ))
            })
            .with_context(|| format!("building report URL for `{entity}`"))?;

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.credentials.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(
                reqwest::header::DATE,
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
            .query(params)
            .query(&[("minorversion", API_MINOR_VERSION)])
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("non-success status from {url}"))?;

        response
            .json::<Report>()
            .await
            .with_context(|| format!("decoding report `{entity}`"))
    }
}
