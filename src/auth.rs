use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, REFRESH_TOKEN_EXPIRY_FORMAT};

const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const AUTHORIZATION_ENDPOINT: &str = "https://appcenter.intuit.com/connect/oauth2";
const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(rename = "x_refresh_token_expires_in")]
    refresh_token_expires_in: i64,
}

/// Bearer credentials for one sync. Token material is refreshed, and any
/// drift persisted, before these are handed out.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub realm_id: String,
}

/// Refresh the access token and return credentials for the fetcher. If
/// the token endpoint rotates the refresh token, the config file is
/// rewritten before this returns, so a crash mid-sync never loses the
/// only valid refresh token.
pub async fn obtain_credentials(
    http: &Client,
    config: &mut Config,
    config_path: &Path,
) -> Result<Credentials> {
    let refresh_token = config
        .refresh_token
        .clone()
        .ok_or_else(|| anyhow!("config has no refresh_token; run with --auth first"))?;
    let realm_id = config
        .realm_id
        .clone()
        .ok_or_else(|| anyhow!("config has no realm_id; run with --auth first"))?;

    let token = request_token(
        http,
        config,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ],
    )
    .await?;

    if token.refresh_token == refresh_token {
        info!("refresh token unchanged by the token endpoint");
    } else {
        info!("refresh token drifted, rewriting config with new values");
        config.refresh_token = Some(token.refresh_token.clone());
        config.refresh_token_expires_at =
            Some(token_expiration(token.refresh_token_expires_in));
        config.persist(config_path)?;
    }

    check_token_expiry(token.refresh_token_expires_in);

    Ok(Credentials {
        access_token: token.access_token,
        realm_id,
    })
}

/// Interactive consent flow: print the authorization URL, read the
/// authorization code and realm id back, exchange the code for tokens and
/// write everything into the config file.
pub async fn user_consent(http: &Client, config: &mut Config, config_path: &Path) -> Result<()> {
    let mut auth_url = Url::parse(AUTHORIZATION_ENDPOINT).context("authorization endpoint URL")?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("scope", ACCOUNTING_SCOPE)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("state", "qb-report-tap");
    info!("open this URL in a browser to authorize: {auth_url}");

    let auth_code = prompt("Enter the Authorization Code: ")?;
    let realm_id = prompt("Enter the Realm ID: ")?;

    let token = request_token(
        http,
        config,
        &[
            ("grant_type", "authorization_code"),
            ("code", auth_code.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
    )
    .await?;

    config.realm_id = Some(realm_id);
    config.refresh_token = Some(token.refresh_token);
    config.refresh_token_expires_at = Some(token_expiration(token.refresh_token_expires_in));

    info!("generating new config");
    config.persist(config_path)
}

async fn request_token(
    http: &Client,
    config: &Config,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = http
        .post(TOKEN_ENDPOINT)
        .basic_auth(&config.client_id, Some(&config.client_secret))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .context("POST to the token endpoint failed")?
        .error_for_status()
        .context("token endpoint rejected the request")?;
    response
        .json::<TokenResponse>()
        .await
        .context("decoding token response")
}

fn token_expiration(expires_in_seconds: i64) -> String {
    (Utc::now() + Duration::seconds(expires_in_seconds))
        .format(REFRESH_TOKEN_EXPIRY_FORMAT)
        .to_string()
}

fn check_token_expiry(expires_in_seconds: i64) {
    let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);
    if expires_in_seconds <= 30 * 24 * 60 * 60 {
        warn!("refresh token expires on {expires_at} UTC");
    } else {
        info!("refresh token expires on {expires_at} UTC");
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().context("flushing prompt")?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(line.trim().to_string())
}
