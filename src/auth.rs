//! OAuth credentials for the storage API.
//!
//! A token file is reused while valid, refreshed when expired, and replaced
//! through an interactive loopback authorization when neither works. Any
//! token obtained from the network is written back to the token file.

use crate::{
    config::StripperConfig,
    error::{Error, Result},
    writer,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use reqwest::{Url, blocking::Client};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufRead, BufReader, Write},
    net::TcpListener,
    path::Path,
};
use tracing::{debug, info, warn};

/// Full read/write access to the user's files.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Persisted user credentials, compatible with Google's authorized-user JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// Bearer access token
    #[serde(alias = "access_token")]
    pub token: String,

    /// Long-lived token used to obtain new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token endpoint used for refreshes
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Access token expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl StoredToken {
    /// Returns true if the access token is missing or expires within the skew.
    ///
    /// A token without an expiry is assumed valid.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return true;
        }

        self.expiry
            .is_some_and(|expiry| expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    /// Loads a token file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| {
                Error::authorization(format!("unreadable token file {}: {e}", path.display()))
            })
    }

    /// Writes the token file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        writer::write_file_atomic(path, &json, false)?;
        debug!("Saved credentials to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(alias = "web")]
    installed: ClientSecrets,
}

/// Installed-app OAuth client registration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Consent page
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Code exchange endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

impl ClientSecrets {
    /// Loads a client secrets file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not in the installed-app
    /// layout.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_file(path));
        }

        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str::<ClientSecretsFile>(raw)
            .map(|file| file.installed)
            .map_err(|e| Error::authorization(format!("invalid client secrets: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + ChronoDuration::seconds(secs))
    }
}

/// Returns a usable access token, refreshing or re-authorizing as needed.
///
/// # Errors
///
/// Returns [`Error::Authorization`] if no valid token can be obtained, or an
/// I/O error if the token file cannot be written.
pub fn load_or_authorize(config: &StripperConfig) -> Result<String> {
    let stored = if config.token_path.exists() {
        StoredToken::load(&config.token_path)
            .inspect_err(|e| warn!("Ignoring stored credentials: {e}"))
            .ok()
    } else {
        None
    };

    if let Some(token) = stored.as_ref().filter(|t| !t.is_expired(Utc::now())) {
        debug!("Using stored credentials from {}", config.token_path.display());
        return Ok(token.token.clone());
    }

    let client = http_client()?;

    let token = match stored {
        Some(token) if token.refresh_token.is_some() => {
            info!("Stored credentials expired, refreshing");
            match refresh(&client, &token) {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!("Refresh failed ({e}); starting interactive authorization");
                    authorize_interactive(&client, &config.client_secrets_path)?
                }
            }
        }
        _ => authorize_interactive(&client, &config.client_secrets_path)?,
    };

    token.save(&config.token_path)?;
    Ok(token.token)
}

fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("rename-forge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))
}

fn refresh(client: &Client, stored: &StoredToken) -> Result<StoredToken> {
    let refresh_token = stored
        .refresh_token
        .as_deref()
        .ok_or_else(|| Error::authorization("no refresh token stored"))?;

    let response = request_token(
        client,
        &stored.token_uri,
        &[
            ("client_id", stored.client_id.as_str()),
            ("client_secret", stored.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ],
    )?;

    Ok(StoredToken {
        expiry: response.expiry_from(Utc::now()),
        token: response.access_token,
        // Refresh responses usually omit the refresh token; keep the old one.
        refresh_token: response.refresh_token.or_else(|| stored.refresh_token.clone()),
        ..stored.clone()
    })
}

fn request_token(client: &Client, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = client
        .post(token_uri)
        .form(form)
        .send()
        .map_err(|e| Error::authorization(format!("token request failed: {e}")))?;

    let status = response.status();
    let raw = response
        .text()
        .map_err(|e| Error::authorization(format!("token request failed: {e}")))?;

    if !status.is_success() {
        return Err(Error::authorization(format!(
            "token endpoint returned {status}: {}",
            raw.trim()
        )));
    }

    serde_json::from_str(&raw)
        .map_err(|e| Error::authorization(format!("invalid token response: {e}")))
}

/// Unguessable value tying the redirect to this authorization attempt.
fn random_state() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Builds the consent URL the user opens in a browser.
fn consent_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", DRIVE_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| Error::authorization(format!("invalid auth_uri '{}': {e}", secrets.auth_uri)))
}

/// Extracts the authorization code from the redirect's request line.
fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::authorization("malformed redirect request"))?;

    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| Error::authorization(format!("malformed redirect target: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(Error::authorization(format!(
                    "authorization denied: {value}"
                )));
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::authorization("state mismatch in redirect"));
    }

    code.ok_or_else(|| Error::authorization("redirect carried no authorization code"))
}

fn authorize_interactive(client: &Client, secrets_path: &Path) -> Result<StoredToken> {
    let secrets = ClientSecrets::load(secrets_path)?;

    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::authorization(format!("cannot bind loopback listener: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::authorization(format!("cannot read listener address: {e}")))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    let state = random_state();

    let url = consent_url(&secrets, &redirect_uri, &state)?;
    println!("Please visit this URL to authorize this application:\n\n  {url}\n");
    info!("Waiting for authorization redirect on port {port}");

    let (mut stream, _) = listener
        .accept()
        .map_err(|e| Error::authorization(format!("redirect never arrived: {e}")))?;

    let mut request_line = String::new();
    BufReader::new(&stream)
        .read_line(&mut request_line)
        .map_err(|e| Error::authorization(format!("cannot read redirect: {e}")))?;

    let outcome = parse_redirect(&request_line, &state);
    let body = match &outcome {
        Ok(_) => "The authentication flow has completed. You may close this window.",
        Err(_) => "Authorization failed. Check the terminal for details.",
    };
    if let Err(e) = write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ) {
        warn!("Could not answer the browser redirect: {e}");
    }
    let code = outcome?;

    let response = request_token(
        client,
        &secrets.token_uri,
        &[
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ],
    )?;

    info!("Authorization complete");

    Ok(StoredToken {
        expiry: response.expiry_from(Utc::now()),
        token: response.access_token,
        refresh_token: response.refresh_token,
        token_uri: secrets.token_uri,
        client_id: secrets.client_id,
        client_secret: secrets.client_secret,
        scopes: vec![DRIVE_SCOPE.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const TOKEN_JSON: &str = r#"{
        "token": "ya29.access",
        "refresh_token": "1//refresh",
        "token_uri": "https://oauth2.googleapis.com/token",
        "client_id": "id.apps.googleusercontent.com",
        "client_secret": "shh",
        "scopes": ["https://www.googleapis.com/auth/drive"],
        "universe_domain": "googleapis.com",
        "account": "",
        "expiry": "2025-03-01T12:00:00.123456Z"
    }"#;

    fn secrets() -> ClientSecrets {
        ClientSecrets::parse(
            r#"{"installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_authorized_user_file() {
        let token: StoredToken = serde_json::from_str(TOKEN_JSON).unwrap();
        assert_eq!(token.token, "ya29.access");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(token.scopes, vec![DRIVE_SCOPE]);
        assert!(token.expiry.is_some());
    }

    #[test]
    fn test_access_token_alias() {
        let token: StoredToken = serde_json::from_str(
            r#"{"access_token": "abc", "client_id": "id", "client_secret": "s"}"#,
        )
        .unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.token_uri, DEFAULT_TOKEN_URI);
        assert!(!token.is_expired(Utc::now()));
    }

    #[test]
    fn test_is_expired() {
        let token: StoredToken = serde_json::from_str(TOKEN_JSON).unwrap();
        let expiry = token.expiry.unwrap();

        assert!(token.is_expired(expiry));
        assert!(token.is_expired(expiry - ChronoDuration::seconds(30)));
        assert!(!token.is_expired(expiry - ChronoDuration::seconds(600)));
    }

    #[test]
    fn test_save_and_load() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("token.json");
        let token: StoredToken = serde_json::from_str(TOKEN_JSON).unwrap();

        token.save(path.path()).unwrap();
        let loaded = StoredToken::load(path.path()).unwrap();

        assert_eq!(loaded.token, token.token);
        assert_eq!(loaded.expiry, token.expiry);
    }

    #[test]
    fn test_load_garbage_token() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("token.json");
        path.write_str("{ nope").unwrap();

        assert!(StoredToken::load(path.path()).unwrap_err().is_authorization());
    }

    fn stripper_config(temp: &assert_fs::TempDir) -> StripperConfig {
        StripperConfig::builder()
            .token_path(temp.path().join("token.json"))
            .client_secrets_path(temp.path().join("client_secrets.json"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_stored_token_is_used_as_is() {
        let temp = assert_fs::TempDir::new().unwrap();
        let token_file = temp.child("token.json");
        let stored = TOKEN_JSON.replace("2025-03-01T12:00:00.123456Z", "2999-01-01T00:00:00Z");
        token_file.write_str(&stored).unwrap();

        let access = load_or_authorize(&stripper_config(&temp)).unwrap();

        assert_eq!(access, "ya29.access");
        token_file.assert(stored.as_str());
    }

    #[test]
    fn test_expired_token_without_refresh_needs_client_secrets() {
        let temp = assert_fs::TempDir::new().unwrap();
        let expired = r#"{"token": "old", "client_id": "id", "client_secret": "s",
            "expiry": "2000-01-01T00:00:00Z"}"#;
        temp.child("token.json").write_str(expired).unwrap();

        let err = load_or_authorize(&stripper_config(&temp)).unwrap_err();

        assert!(err.is_missing_file());
        assert!(err.to_string().contains("client_secrets.json"));
    }

    #[test]
    fn test_unreadable_token_falls_through_to_authorization() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("token.json").write_str("{ nope").unwrap();

        let err = load_or_authorize(&stripper_config(&temp)).unwrap_err();

        assert!(err.is_missing_file());
    }

    #[test]
    fn test_random_state() {
        let first = random_state();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, random_state());
    }

    #[test]
    fn test_client_secrets_layout() {
        let secrets = secrets();
        assert_eq!(secrets.client_id, "id.apps.googleusercontent.com");
        assert!(ClientSecrets::parse(r#"{"client_id": "x"}"#)
            .unwrap_err()
            .is_authorization());
    }

    #[test]
    fn test_client_secrets_missing() {
        assert!(ClientSecrets::load(Path::new("/nonexistent/client_secrets.json"))
            .unwrap_err()
            .is_missing_file());
    }

    #[test]
    fn test_consent_url() {
        let url = consent_url(&secrets(), "http://127.0.0.1:8080/", "s1").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("scope".to_string(), DRIVE_SCOPE.to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://127.0.0.1:8080/".to_string()
        )));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
    }

    #[test]
    fn test_parse_redirect() {
        let code =
            parse_redirect("GET /?state=s1&code=4%2F0Abc&scope=x HTTP/1.1\r\n", "s1").unwrap();
        assert_eq!(code, "4/0Abc");
    }

    #[test]
    fn test_parse_redirect_errors() {
        assert!(parse_redirect("GET /?error=access_denied&state=s1 HTTP/1.1", "s1")
            .unwrap_err()
            .to_string()
            .contains("access_denied"));
        assert!(parse_redirect("GET /?code=abc&state=other HTTP/1.1", "s1")
            .unwrap_err()
            .is_authorization());
        assert!(parse_redirect("GET /?state=s1 HTTP/1.1", "s1").is_err());
        assert!(parse_redirect("", "s1").is_err());
    }
}
