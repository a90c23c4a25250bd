use anyhow::{Context, Result};
use indicatif::ProgressBar;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::datasets::{DatasetQuery, DatasetRecord};
use crate::error::{GalaxyError, status_error};
use crate::tus::{CheckpointStore, DEFAULT_CHUNK_SIZE, TusUploader};
use crate::util::{api_base, bytes_bar, content_disposition_filename, sanitize_filename, server_root};

pub(crate) const API_KEY_HEADER: &str = "x-api-key";

/// The remote operations the transfer tools need from a Galaxy server.
///
/// [`GalaxyInstance`] talks HTTP; tests substitute an in-memory fake.
pub trait GalaxyApi {
    /// Lists datasets matching `query`, in the order the server returns them.
    fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<DatasetRecord>, GalaxyError>;

    /// Writes dataset `dataset_id` to `destination` and returns the written path.
    ///
    /// With `use_default_filename`, `destination` is a directory and the file name
    /// comes from the server; otherwise `destination` is the file itself.
    fn download_dataset(
        &self,
        dataset_id: &str,
        destination: &Path,
        use_default_filename: bool,
    ) -> Result<PathBuf, GalaxyError>;

    /// Uploads one local file into a history.
    fn upload_file(&self, request: &UploadRequest) -> Result<UploadResponse, GalaxyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub history_id: String,
    /// Enables resumable transfers; progress is recorded here between runs.
    pub checkpoint_dir: Option<PathBuf>,
    pub auto_decompress: bool,
    pub chunk_size: usize,
    /// Galaxy datatype, `auto` to let the server sniff it.
    pub file_type: String,
    pub dbkey: String,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>, history_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            history_id: history_id.into(),
            checkpoint_dir: None,
            auto_decompress: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_type: "auto".to_string(),
            dbkey: "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct UploadResponse {
    /// Datasets created by the upload tool.
    #[serde(default)]
    pub outputs: Vec<DatasetRecord>,
}

/// Blocking HTTP client for a single Galaxy server.
#[derive(Debug, Clone)]
pub struct GalaxyInstance {
    root: String,
    api: String,
    key: String,

    timeout: Duration,
    progress: bool,

    http: HttpClient,
}

impl GalaxyInstance {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("galaxy-transfer/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("galaxy-transfer")),
        );

        // Transfers can run for hours; only JSON calls get a total timeout.
        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>);

        if !config.verify() {
            log::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            root: server_root(config.url()),
            api: api_base(config.url()),
            key: config.key().to_string(),
            timeout: Duration::from_secs(60),
            progress: true,
            http,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn url(&self) -> &str {
        &self.root
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(API_KEY_HEADER, self.key.as_str())
    }

    fn api_json<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        method: &str,
        url: &str,
        query: &[(&str, String)],
        request: &TReq,
    ) -> Result<TResp, GalaxyError> {
        let req = match method {
            "GET" => self.http.get(url),
            "PUT" => self.http.put(url),
            _ => self.http.post(url),
        };
        let mut req = self.apply_auth(req).query(query).timeout(self.timeout);
        if method != "GET" {
            req = req.json(request);
        }

        log::debug!("{} {}", method, url);
        let resp = req.send().map_err(|e| GalaxyError::transport(url, e))?;

        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(status_error(status, url, &text));
        }

        serde_json::from_str::<TResp>(&text).map_err(|source| GalaxyError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl GalaxyApi for GalaxyInstance {
    fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<DatasetRecord>, GalaxyError> {
        let url = format!("{}/datasets", self.api);
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
            ("order", query.order.clone()),
        ];
        if let Some(history_id) = &query.history_id {
            params.push(("history_id", history_id.clone()));
        }
        for (field, value) in query.filters() {
            params.push(("q", field.to_string()));
            params.push(("qv", value));
        }

        self.api_json::<Value, Vec<DatasetRecord>>("GET", &url, &params, &Value::Null)
    }

    fn download_dataset(
        &self,
        dataset_id: &str,
        destination: &Path,
        use_default_filename: bool,
    ) -> Result<PathBuf, GalaxyError> {
        let meta_url = format!("{}/datasets/{}", self.api, dataset_id);
        let meta: DatasetRecord = self.api_json("GET", &meta_url, &[], &Value::Null)?;
        if let Some(state) = meta.state.as_deref() {
            if state != "ok" {
                return Err(GalaxyError::Protocol(format!(
                    "dataset {} is in state `{}`, not `ok`",
                    dataset_id, state
                )));
            }
        }
        let ext = meta.extension().unwrap_or("data").to_string();

        let url = format!("{}/datasets/{}/display", self.api, dataset_id);
        log::debug!("GET {}", url);
        let resp = self
            .apply_auth(self.http.get(&url))
            .query(&[("to_ext", ext.as_str())])
            .send()
            .map_err(|e| GalaxyError::transport(&url, e))?;
        let mut resp = check_response(resp, &url)?;

        let target = if use_default_filename {
            let name = content_disposition_filename(resp.headers()).unwrap_or_else(|| {
                let base = meta.name.as_deref().unwrap_or(dataset_id);
                format!("{}.{}", base, ext)
            });
            destination.join(sanitize_filename(&name))
        } else {
            destination.to_path_buf()
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GalaxyError::io(format!("failed to create directory {}", parent.display()), e)
                })?;
            }
        }

        let pb = bytes_bar(resp.content_length().unwrap_or(0), self.progress);
        pb.set_message(dataset_id.to_string());

        // Written beside the target and renamed into place once complete.
        let part = part_path(&target);
        let streamed = stream_to(&mut resp, &part, &pb).and_then(|()| {
            std::fs::rename(&part, &target).map_err(|e| {
                GalaxyError::io(format!("failed to move download to {}", target.display()), e)
            })
        });
        if let Err(e) = streamed {
            let _ = std::fs::remove_file(&part);
            return Err(e);
        }
        pb.finish_and_clear();

        Ok(target)
    }

    fn upload_file(&self, request: &UploadRequest) -> Result<UploadResponse, GalaxyError> {
        let name = request
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut store = match &request.checkpoint_dir {
            Some(dir) => Some(CheckpointStore::open(dir)?),
            None => None,
        };

        let tus = TusUploader {
            http: &self.http,
            key: &self.key,
            endpoint: format!("{}/upload/resumable_upload/", self.api),
            chunk_size: request.chunk_size,
            progress: self.progress,
        };
        let upload = tus.upload(&request.path, store.as_mut())?;

        let payload = json!({
            "tool_id": "upload1",
            "history_id": request.history_id,
            "inputs": {
                "file_type": request.file_type,
                "dbkey": request.dbkey,
                "files_0|type": "upload_dataset",
                "files_0|NAME": name,
                "files_0|auto_decompress": request.auto_decompress,
                "files_0|file_data": {
                    "session_id": upload.session_id()?,
                    "name": name,
                },
            },
        });
        let url = format!("{}/tools", self.api);
        let response: UploadResponse = self.api_json("POST", &url, &[], &payload)?;

        if let (Some(store), Some(fp)) = (store.as_mut(), upload.fingerprint.as_deref()) {
            if let Err(e) = store.remove(fp) {
                log::warn!("could not clear checkpoint for {}: {}", request.path.display(), e);
            }
        }

        Ok(response)
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn stream_to(resp: &mut Response, path: &Path, pb: &ProgressBar) -> Result<(), GalaxyError> {
    let mut out = File::create(path)
        .map_err(|e| GalaxyError::io(format!("failed to open {}", path.display()), e))?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = resp
            .read(&mut buf)
            .map_err(|e| GalaxyError::io("download interrupted", e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .map_err(|e| GalaxyError::io(format!("failed to write {}", path.display()), e))?;
        pb.inc(n as u64);
    }
    out.flush()
        .map_err(|e| GalaxyError::io(format!("failed to write {}", path.display()), e))
}

pub(crate) fn check_response(resp: Response, url: &str) -> Result<Response, GalaxyError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().unwrap_or_default();
    Err(status_error(status, url, &text))
}
