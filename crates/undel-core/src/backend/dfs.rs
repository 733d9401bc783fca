//! Data Lake REST client: paged deleted-path listing and the undelete call.
//!
//! Uses the curl crate (libcurl) for the HTTP calls; each call runs inside
//! `tokio::task::spawn_blocking` since libcurl's easy interface blocks.
//! Authentication is either a SAS token appended to every request's query
//! string or a pre-acquired bearer token from the environment; shared-key
//! request signing is deliberately not implemented here.

use std::str;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{BackendError, DeletedEntry, ErrorCategory, RestoreBackend};
use crate::retry::{classify_curl_error, classify_http_status};

/// REST API version sent with every request.
const MS_VERSION: &str = "2023-11-03";

/// Credential material for the storage account.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Pre-signed SAS token; its query parameters ride along on every URL.
    Sas(String),
    /// Bearer token sent as an `Authorization` header.
    Bearer(String),
}

impl Credential {
    /// Resolve a credential: an explicit SAS wins, then the ambient
    /// environment (`AZURE_STORAGE_SAS_TOKEN`, `AZURE_STORAGE_BEARER_TOKEN`).
    pub fn resolve(explicit_sas: Option<&str>) -> Result<Self> {
        if let Some(sas) = explicit_sas {
            return Ok(Self::sas(sas));
        }
        if let Ok(sas) = std::env::var("AZURE_STORAGE_SAS_TOKEN") {
            if !sas.is_empty() {
                return Ok(Self::sas(&sas));
            }
        }
        if let Ok(token) = std::env::var("AZURE_STORAGE_BEARER_TOKEN") {
            if !token.is_empty() {
                return Ok(Self::Bearer(token));
            }
        }
        anyhow::bail!(
            "no credential: pass --sas, or set AZURE_STORAGE_SAS_TOKEN or AZURE_STORAGE_BEARER_TOKEN"
        )
    }

    fn sas(raw: &str) -> Self {
        Self::Sas(raw.trim_start_matches('?').to_string())
    }
}

/// REST client for one container on one storage account.
pub struct DfsRestoreClient {
    endpoint: Url,
    container: String,
    credential: Credential,
    /// Hard per-call timeout handed to libcurl.
    op_timeout: Duration,
}

impl DfsRestoreClient {
    pub fn new(
        endpoint: Url,
        container: impl Into<String>,
        credential: Credential,
        op_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            container: container.into(),
            credential,
            op_timeout,
        }
    }

    fn bearer(&self) -> Option<String> {
        match &self.credential {
            Credential::Bearer(token) => Some(token.clone()),
            Credential::Sas(_) => None,
        }
    }

    fn with_sas(&self, mut query: String) -> String {
        if let Credential::Sas(sas) = &self.credential {
            query.push('&');
            query.push_str(sas);
        }
        query
    }

    fn list_url(&self, continuation: Option<&str>) -> Result<Url, BackendError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::other("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(&self.container);
        let mut query = String::from("resource=filesystem&recursive=true&showonly=deleted");
        if let Some(token) = continuation {
            let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
            query.push_str("&continuation=");
            query.push_str(&encoded);
        }
        url.set_query(Some(&self.with_sas(query)));
        Ok(url)
    }

    fn restore_url(&self, path: &str) -> Result<Url, BackendError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::other("endpoint cannot be a base URL"))?;
            segments.pop_if_empty().push(&self.container);
            segments.extend(path.split('/'));
        }
        url.set_query(Some(&self.with_sas(String::from("comp=undelete"))));
        Ok(url)
    }

    async fn perform_async(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let joined = tokio::task::spawn_blocking(move || perform(request))
            .await
            .map_err(|e| BackendError::other(format!("http task join: {e}")))?;
        joined.map_err(|e| BackendError::new(classify_curl_error(&e), e.to_string()))
    }
}

#[async_trait]
impl RestoreBackend for DfsRestoreClient {
    async fn list_deleted(&self) -> Result<Vec<DeletedEntry>, BackendError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let url = self.list_url(continuation.as_deref())?;
            let resp = self
                .perform_async(HttpRequest {
                    method: HttpMethod::Get,
                    url: url.to_string(),
                    bearer: self.bearer(),
                    extra_headers: Vec::new(),
                    timeout: self.op_timeout,
                })
                .await?;
            if !(200..300).contains(&resp.status) {
                return Err(error_from_response(&resp));
            }
            let page = parse_list_page(&resp.body)?;
            for item in page {
                match item.deletion_id {
                    Some(deletion_handle) => entries.push(DeletedEntry {
                        path: item.name,
                        deletion_handle,
                    }),
                    // Without a deletion id the version cannot be named;
                    // the service restores such entries with their children.
                    None => tracing::debug!(path = %item.name, "listed entry has no deletion id, skipping"),
                }
            }
            continuation = resp
                .header("x-ms-continuation")
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if continuation.is_none() {
                break;
            }
            tracing::debug!(listed = entries.len(), "following listing continuation");
        }
        Ok(entries)
    }

    async fn restore(&self, path: &str, deletion_handle: &str) -> Result<(), BackendError> {
        let url = self.restore_url(path)?;
        let resp = self
            .perform_async(HttpRequest {
                method: HttpMethod::Put,
                url: url.to_string(),
                bearer: self.bearer(),
                extra_headers: vec![format!(
                    "x-ms-undelete-source: {}?deletionid={}",
                    path, deletion_handle
                )],
                timeout: self.op_timeout,
            })
            .await?;
        if (200..300).contains(&resp.status) {
            Ok(())
        } else {
            Err(error_from_response(&resp))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum HttpMethod {
    Get,
    Put,
}

struct HttpRequest {
    method: HttpMethod,
    url: String,
    bearer: Option<String>,
    extra_headers: Vec<String>,
    timeout: Duration,
}

struct HttpResponse {
    status: u32,
    body: Vec<u8>,
    headers: Vec<String>,
}

impl HttpResponse {
    /// Look up a response header value, case-insensitive on the name.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            if k.trim().eq_ignore_ascii_case(name) {
                Some(v.trim())
            } else {
                None
            }
        })
    }
}

/// Perform one HTTP request. Runs in the current thread; call from
/// `spawn_blocking` when used from async code.
fn perform(req: HttpRequest) -> Result<HttpResponse, curl::Error> {
    let mut body = Vec::new();
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(&req.url)?;
    match req.method {
        HttpMethod::Get => {}
        HttpMethod::Put => {
            easy.custom_request("PUT")?;
        }
    }
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(req.timeout)?;

    let mut list = curl::easy::List::new();
    list.append(&format!("x-ms-version: {}", MS_VERSION))?;
    if matches!(req.method, HttpMethod::Put) {
        list.append("Content-Length: 0")?;
    }
    if let Some(token) = &req.bearer {
        list.append(&format!("Authorization: Bearer {}", token))?;
    }
    for header in &req.extra_headers {
        list.append(header)?;
    }
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(HttpResponse {
        status,
        body,
        headers,
    })
}

/// Map a non-2xx response to a `BackendError`, preferring the service error
/// code header over the bare status.
fn error_from_response(resp: &HttpResponse) -> BackendError {
    let error_code = resp.header("x-ms-error-code").map(str::to_string);
    let category = classify_http_status(resp.status, error_code.as_deref());
    let message = match error_code {
        Some(code) => format!("HTTP {} ({})", resp.status, code),
        None => format!("HTTP {}", resp.status),
    };
    BackendError::new(category, message)
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    paths: Vec<ListedPath>,
}

#[derive(Debug, Deserialize)]
struct ListedPath {
    name: String,
    #[serde(rename = "deletionId")]
    deletion_id: Option<String>,
}

fn parse_list_page(body: &[u8]) -> Result<Vec<ListedPath>, BackendError> {
    let page: ListPage = serde_json::from_slice(body)
        .map_err(|e| BackendError::other(format!("malformed listing response: {e}")))?;
    Ok(page.paths)
}
