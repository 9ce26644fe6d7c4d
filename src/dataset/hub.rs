//! Hugging Face Hub dataset backend
//!
//! Rows are stored as JSON Lines under `data/`:
//! - `data/{split}.jsonl` holds the whole table under replace-with-union
//! - `data/{split}-{timestamp}-{batch}.jsonl` holds one appended batch
//!
//! Every write is a single commit through the Hub commit API, so a batch is
//! either fully visible or not at all. The Hub decides per file whether it
//! is committed inline or through LFS (the preupload call); LFS objects are
//! uploaded and verified before the commit that references them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{DatasetError, RemoteTable, TableState};
use crate::config::{DatasetConfig, FetchConfig};
use crate::types::Record;
use crate::util::truncate_str;

/// Uploads of the full table can be large
const HUB_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Largest file the Hub accepts inline in a commit
pub const MAX_INLINE_BYTES: usize = 10 * 1024 * 1024;

/// Bytes of a file sent to preupload for content sniffing
const PREUPLOAD_SAMPLE: usize = 512;

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Bearer token for the Hub, never printed
#[derive(Clone)]
pub struct HubCredentials {
    token: String,
    source: String,
}

impl HubCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            source: "explicit".to_string(),
        }
    }

    /// Take the first non-empty token from the named environment variables
    pub fn from_env(names: &[String]) -> Result<Self, DatasetError> {
        Self::from_lookup(names, |name| std::env::var(name).ok())
    }

    /// Take the first non-empty token produced by `lookup` for `names`
    pub fn from_lookup<F>(names: &[String], lookup: F) -> Result<Self, DatasetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        names
            .iter()
            .find_map(|name| {
                lookup(name)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .map(|token| Self {
                        token,
                        source: name.clone(),
                    })
            })
            .ok_or_else(|| {
                DatasetError::Unauthorized(format!("no access token set in any of: {}", names.join(", ")))
            })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Where the token came from (environment variable name)
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for HubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubCredentials")
            .field("token", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

/// How the Hub wants a file committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

#[derive(Debug, Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Debug, Deserialize)]
struct LfsObject {
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<LfsObjectError>,
}

#[derive(Debug, Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Debug, Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LfsObjectError {
    code: u16,
    message: String,
}

/// A dataset split on the Hugging Face Hub
pub struct HubTable {
    client: reqwest::Client,
    endpoint: String,
    repo_id: String,
    split: String,
    revision: String,
    private: bool,
    credentials: HubCredentials,
    repo_ready: AtomicBool,
    inline_limit: usize,
}

impl HubTable {
    pub fn new(
        config: &DatasetConfig,
        fetch: &FetchConfig,
        credentials: HubCredentials,
    ) -> Result<Self, DatasetError> {
        let client = reqwest::Client::builder()
            .timeout(HUB_TIMEOUT)
            .connect_timeout(fetch.connect_timeout())
            .user_agent(&fetch.user_agent)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            repo_id: config.repo_id.clone(),
            split: config.split.clone(),
            revision: config.revision.clone(),
            private: config.private,
            credentials,
            repo_ready: AtomicBool::new(false),
            inline_limit: MAX_INLINE_BYTES,
        })
    }

    /// Override the inline size ceiling for files the Hub marks regular
    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Check the token against the identity endpoint, returning the account name
    pub async fn verify(&self) -> Result<String, DatasetError> {
        let url = format!("{}/api/whoami-v2", self.endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.token())
            .send()
            .await?;
        let who: WhoAmI = check(response).await?.json().await?;

        info!(account = %who.name, source = self.credentials.source(), "Hub credentials verified");
        Ok(who.name)
    }

    /// File holding the whole table under replace-with-union
    pub fn table_file(&self) -> String {
        format!("data/{}.jsonl", self.split)
    }

    /// File holding one appended batch
    pub fn shard_file(&self, batch: usize) -> String {
        format!(
            "data/{}-{}-{:05}.jsonl",
            self.split,
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            batch
        )
    }

    fn is_split_file(&self, name: &str) -> bool {
        name == self.table_file()
            || (name.starts_with(&format!("data/{}-", self.split)) && name.ends_with(".jsonl"))
    }

    fn revision_segment(&self) -> String {
        urlencoding::encode(&self.revision).into_owned()
    }

    async fn download(&self, path: &str) -> Result<Vec<Record>, DatasetError> {
        let url = format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint,
            self.repo_id,
            self.revision_segment(),
            path
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.token())
            .send()
            .await?;
        let text = check(response).await?.text().await?;
        parse_jsonl(path, &text)
    }

    async fn ensure_repo(&self) -> Result<(), DatasetError> {
        if self.repo_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let (organization, name) = match self.repo_id.split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, self.repo_id.as_str()),
        };
        let url = format!("{}/api/repos/create", self.endpoint);
        let body = json!({
            "type": "dataset",
            "name": name,
            "organization": organization,
            "private": self.private,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.token())
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            debug!(repo = %self.repo_id, "dataset already exists");
        } else {
            check(response).await?;
            info!(repo = %self.repo_id, private = self.private, "Created dataset repository");
        }

        self.repo_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Ask the Hub whether `path` goes inline or through LFS
    async fn preupload(&self, path: &str, payload: &[u8]) -> Result<UploadMode, DatasetError> {
        let url = format!(
            "{}/api/datasets/{}/preupload/{}",
            self.endpoint,
            self.repo_id,
            self.revision_segment()
        );
        let sample = &payload[..payload.len().min(PREUPLOAD_SAMPLE)];
        let body = json!({
            "files": [{ "path": path, "size": payload.len(), "sample": STANDARD.encode(sample) }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.token())
            .json(&body)
            .send()
            .await?;
        let answer: PreuploadResponse = check(response).await?.json().await?;

        answer
            .files
            .into_iter()
            .find(|f| f.path == path)
            .map(|f| f.upload_mode)
            .ok_or_else(|| DatasetError::Rejected(format!("preupload gave no upload mode for {}", path)))
    }

    /// Upload `payload` as an LFS object, returning its sha256 oid
    async fn upload_lfs(&self, payload: Vec<u8>) -> Result<String, DatasetError> {
        let oid = hex::encode(Sha256::digest(&payload));
        let size = payload.len();

        let url = format!("{}/datasets/{}.git/info/lfs/objects/batch", self.endpoint, self.repo_id);
        let body = json!({
            "operation": "upload",
            "transfers": ["basic"],
            "objects": [{ "oid": oid, "size": size }],
            "hash_algo": "sha256",
            "ref": { "name": self.revision },
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.token())
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
            .body(body.to_string())
            .send()
            .await?;
        let batch: LfsBatchResponse = check(response).await?.json().await?;

        let object = batch
            .objects
            .into_iter()
            .next()
            .ok_or_else(|| DatasetError::Rejected("LFS batch returned no objects".to_string()))?;
        if let Some(err) = object.error {
            return Err(DatasetError::Rejected(format!("LFS object refused ({}): {}", err.code, err.message)));
        }

        let Some(actions) = object.actions else {
            debug!(oid = %oid, "LFS object already stored");
            return Ok(oid);
        };

        if let Some(upload) = actions.upload {
            let mut request = self.client.put(&upload.href).body(payload);
            for (name, value) in &upload.header {
                request = request.header(name.as_str(), value.as_str());
            }
            check(request.send().await?).await?;
            debug!(oid = %oid, size, "LFS object uploaded");
        }

        if let Some(verify) = actions.verify {
            let mut request = self
                .client
                .post(&verify.href)
                .bearer_auth(self.credentials.token())
                .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
                .body(json!({ "oid": oid, "size": size }).to_string());
            for (name, value) in &verify.header {
                request = request.header(name.as_str(), value.as_str());
            }
            check(request.send().await?).await?;
        }

        Ok(oid)
    }

    async fn commit(&self, path: &str, records: &[Record], summary: String) -> Result<(), DatasetError> {
        self.ensure_repo().await?;

        let payload = encode_jsonl(records)?.into_bytes();
        let size = payload.len();
        let file = match self.preupload(path, &payload).await? {
            UploadMode::Lfs => {
                let oid = self.upload_lfs(payload).await?;
                json!({
                    "key": "lfsFile",
                    "value": { "path": path, "algo": "sha256", "oid": oid, "size": size },
                })
            }
            UploadMode::Regular => {
                if size > self.inline_limit {
                    return Err(DatasetError::PayloadTooLarge {
                        path: path.to_string(),
                        size,
                        limit: self.inline_limit,
                    });
                }
                json!({
                    "key": "file",
                    "value": { "content": STANDARD.encode(&payload), "path": path, "encoding": "base64" },
                })
            }
        };
        let header = json!({
            "key": "header",
            "value": { "summary": summary, "description": "" },
        });
        let body = format!("{}\n{}\n", header, file);

        let url = format!(
            "{}/api/datasets/{}/commit/{}",
            self.endpoint,
            self.repo_id,
            self.revision_segment()
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.credentials.token())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        check(response).await?;

        debug!(repo = %self.repo_id, path, rows = records.len(), bytes = size, "commit accepted");
        Ok(())
    }
}

#[async_trait]
impl RemoteTable for HubTable {
    async fn load(&self) -> Result<TableState, DatasetError> {
        let url = format!(
            "{}/api/datasets/{}/revision/{}",
            self.endpoint,
            self.repo_id,
            self.revision_segment()
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.credentials.token())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(repo = %self.repo_id, "Remote dataset not found");
            return Ok(TableState::Missing);
        }
        let info: RepoInfo = check(response).await?.json().await?;
        self.repo_ready.store(true, Ordering::Release);

        let mut files: Vec<String> = info
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|name| self.is_split_file(name))
            .collect();
        // Base table first, then appended shards in timestamp order
        let table_file = self.table_file();
        files.sort_by_key(|name| (*name != table_file, name.clone()));

        let mut records = Vec::new();
        for file in &files {
            records.extend(self.download(file).await?);
        }

        info!(
            repo = %self.repo_id,
            split = %self.split,
            "Loaded {} existing records from {} files",
            records.len(),
            files.len()
        );
        Ok(TableState::Present(records))
    }

    async fn replace(&self, records: &[Record]) -> Result<(), DatasetError> {
        let path = self.table_file();
        let summary = format!("Update {} split ({} records)", self.split, records.len());
        self.commit(&path, records, summary).await
    }

    async fn append(&self, records: &[Record], batch: usize) -> Result<(), DatasetError> {
        let path = self.shard_file(batch);
        let summary = format!("Append batch {} ({} records)", batch, records.len());
        self.commit(&path, records, summary).await
    }
}

/// Map non-success responses to typed errors
async fn check(response: reqwest::Response) -> Result<reqwest::Response, DatasetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = truncate_str(body.trim(), MAX_ERROR_BODY);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DatasetError::Unauthorized(format!("HTTP {}: {}", status.as_u16(), body)));
    }
    Err(DatasetError::Status {
        status: status.as_u16(),
        body,
    })
}

/// One JSON object per line, newline terminated
pub(crate) fn encode_jsonl(records: &[Record]) -> Result<String, DatasetError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

pub(crate) fn parse_jsonl(file: &str, text: &str) -> Result<Vec<Record>, DatasetError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| DatasetError::MalformedRow {
                file: file.to_string(),
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
