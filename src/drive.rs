//! Remote file storage.
//!
//! [`StorageService`] lists and renames files; [`DriveClient`] implements it
//! against the Google Drive v3 REST API with a bearer token.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const LIST_FIELDS: &str = "nextPageToken, files(id, name)";

/// A remote file as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriveFile {
    /// Opaque file id
    pub id: String,
    /// Current display name
    pub name: String,
}

/// One page of listing results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    /// Files on this page
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for the next page; `None` on the last page
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Remote storage that can list files by query and rename them.
pub trait StorageService {
    /// Fetches one page of files matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing request fails.
    fn list_page(&self, query: &str, page_token: Option<&str>) -> Result<FilePage>;

    /// Renames the file with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update request fails.
    fn rename(&self, id: &str, new_name: &str) -> Result<()>;
}

/// Builds the listing query for owned files with a colon in the name and an
/// allowed extension.
///
/// # Examples
///
/// ```
/// use rename_forge::build_query;
///
/// assert_eq!(
///     build_query(&["mkv".to_string(), "mp4".to_string()]),
///     "'me' in owners and name contains ':' and (fileExtension='mkv' or fileExtension='mp4')"
/// );
/// ```
#[must_use]
pub fn build_query(extensions: &[String]) -> String {
    let clauses: Vec<String> = extensions
        .iter()
        .map(|ext| format!("fileExtension='{ext}'"))
        .collect();

    format!(
        "'me' in owners and name contains ':' and ({})",
        clauses.join(" or ")
    )
}

/// Blocking Drive v3 client authenticated with a bearer token.
pub struct DriveClient {
    client: Client,
    access_token: String,
}

impl DriveClient {
    /// Creates a client for the given access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("rename-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_token: access_token.into(),
        })
    }
}

impl StorageService for DriveClient {
    #[instrument(skip(self, query))]
    fn list_page(&self, query: &str, page_token: Option<&str>) -> Result<FilePage> {
        let mut params = vec![("q", query), ("spaces", "drive"), ("fields", LIST_FIELDS)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .client
            .get(DRIVE_FILES_URL)
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()?;

        let raw = checked_body(response)?;
        let page = parse_page(&raw)?;
        debug!("Listed {} files", page.files.len());
        Ok(page)
    }

    #[instrument(skip(self))]
    fn rename(&self, id: &str, new_name: &str) -> Result<()> {
        let response = self
            .client
            .patch(format!("{DRIVE_FILES_URL}/{id}"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "name": new_name }))
            .send()?;

        checked_body(response)?;
        Ok(())
    }
}

fn checked_body(response: reqwest::blocking::Response) -> Result<String> {
    let status = response.status();
    let raw = response.text()?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| raw.trim().to_string());
        return Err(Error::api(status.as_u16(), message));
    }

    Ok(raw)
}

fn parse_page(raw: &str) -> Result<FilePage> {
    serde_json::from_str(raw).map_err(|e| Error::malformed(format!("invalid file listing: {e}")))
}
