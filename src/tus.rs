//! Resumable uploads against Galaxy's tus endpoint.
//!
//! Progress of an interrupted upload is kept in a checkpoint directory, keyed by
//! a content [`fingerprint`] of the source file, so a later run can continue
//! where the previous one stopped instead of sending the whole file again.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, Url};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::client::{API_KEY_HEADER, check_response};
use crate::error::GalaxyError;
use crate::util::bytes_bar;

pub const TUS_VERSION: &str = "1.0.0";
pub const DEFAULT_CHUNK_SIZE: usize = 10_000_000;
pub const CHECKPOINT_INDEX: &str = "checkpoints.json";

const FINGERPRINT_BLOCK: usize = 64 * 1024;

/// Identifies a file by its size and the md5 of its first 64 KiB.
///
/// Format: `size:<bytes>--md5:<hex>`.
pub fn fingerprint<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut buf = Vec::with_capacity(FINGERPRINT_BLOCK);
    file.by_ref()
        .take(FINGERPRINT_BLOCK as u64)
        .read_to_end(&mut buf)?;

    let mut hasher = md5::Context::new();
    hasher.consume(&buf);
    Ok(format!("size:{}--md5:{:x}", size, hasher.compute()))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    /// tus upload URL on the server.
    pub url: String,
    pub file_path: String,
    pub total_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct CheckpointIndex {
    #[serde(default)]
    uploads: BTreeMap<String, CheckpointEntry>,
}

/// Fingerprint to upload-URL index stored as `checkpoints.json` in a directory.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    index: CheckpointIndex,
}

impl CheckpointStore {
    /// Opens the store; a missing directory or index means no checkpoints yet.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, GalaxyError> {
        let dir = dir.as_ref().to_path_buf();
        let path = Self::index_path(&dir);
        let index = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                GalaxyError::io(format!("failed to read checkpoint index {}", path.display()), e)
            })?;
            serde_json::from_str(&text).map_err(|source| GalaxyError::Decode {
                url: path.display().to_string(),
                source,
            })?
        } else {
            CheckpointIndex::default()
        };
        Ok(Self { dir, index })
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join(CHECKPOINT_INDEX)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CheckpointEntry> {
        self.index.uploads.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.index.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.uploads.is_empty()
    }

    pub fn insert(&mut self, fingerprint: &str, entry: CheckpointEntry) -> Result<(), GalaxyError> {
        self.index.uploads.insert(fingerprint.to_string(), entry);
        self.save()
    }

    pub fn remove(&mut self, fingerprint: &str) -> Result<Option<CheckpointEntry>, GalaxyError> {
        let removed = self.index.uploads.remove(fingerprint);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<(), GalaxyError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            GalaxyError::io(
                format!("failed to create checkpoint directory {}", self.dir.display()),
                e,
            )
        })?;
        let path = Self::index_path(&self.dir);
        let json = serde_json::to_string_pretty(&self.index).map_err(|source| {
            GalaxyError::Decode {
                url: path.display().to_string(),
                source,
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                GalaxyError::io(format!("failed to write checkpoint index {}", path.display()), e)
            })
    }
}

/// Result of pushing a file through the tus endpoint.
#[derive(Debug, Clone)]
pub(crate) struct TusUpload {
    pub(crate) url: String,
    pub(crate) fingerprint: Option<String>,
}

impl TusUpload {
    /// The last path segment of the upload URL, which Galaxy calls the session id.
    pub(crate) fn session_id(&self) -> Result<&str, GalaxyError> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GalaxyError::Protocol(format!("invalid upload URL {}", self.url)))
    }
}

pub(crate) struct TusUploader<'a> {
    pub(crate) http: &'a HttpClient,
    pub(crate) key: &'a str,
    pub(crate) endpoint: String,
    pub(crate) chunk_size: usize,
    pub(crate) progress: bool,
}

impl TusUploader<'_> {
    pub(crate) fn upload(
        &self,
        path: &Path,
        store: Option<&mut CheckpointStore>,
    ) -> Result<TusUpload, GalaxyError> {
        let mut file = File::open(path)
            .map_err(|e| GalaxyError::io(format!("failed to open {}", path.display()), e))?;
        let total = file
            .metadata()
            .map_err(|e| GalaxyError::io(format!("failed to stat {}", path.display()), e))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let fp = match &store {
            Some(_) => Some(fingerprint(path).map_err(|e| {
                GalaxyError::io(format!("failed to fingerprint {}", path.display()), e)
            })?),
            None => None,
        };

        let resume = match (&store, &fp) {
            (Some(store), Some(fp)) => store.get(fp).cloned(),
            _ => None,
        };

        let (url, mut offset) = match resume {
            Some(entry) => {
                let offset = self.offset(&entry.url)?;
                log::info!(
                    "Resuming upload of {} at byte {} of {}",
                    path.display(),
                    offset,
                    total
                );
                (entry.url, offset)
            }
            None => {
                let url = self.create(total, &name)?;
                log::debug!("Created upload {} for {}", url, path.display());
                if let (Some(store), Some(fp)) = (store, &fp) {
                    store.insert(
                        fp,
                        CheckpointEntry {
                            url: url.clone(),
                            file_path: path.display().to_string(),
                            total_size: total,
                        },
                    )?;
                }
                (url, 0)
            }
        };

        let pb = bytes_bar(total, self.progress);
        pb.set_message(name);
        pb.set_position(offset);

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| GalaxyError::io(format!("failed to seek {}", path.display()), e))?;
        let mut buf = vec![0u8; self.chunk_size.max(1)];
        while offset < total {
            let n = read_chunk(&mut file, &mut buf)
                .map_err(|e| GalaxyError::io(format!("failed to read {}", path.display()), e))?;
            if n == 0 {
                return Err(GalaxyError::Protocol(format!(
                    "{} shrank while uploading ({} of {} bytes sent)",
                    path.display(),
                    offset,
                    total
                )));
            }
            let next = self.patch(&url, offset, buf[..n].to_vec())?;
            if next != offset + n as u64 {
                return Err(GalaxyError::Protocol(format!(
                    "server acknowledged offset {} after sending bytes {}..{}",
                    next,
                    offset,
                    offset + n as u64
                )));
            }
            offset = next;
            pb.set_position(offset);
        }
        pb.finish_and_clear();

        Ok(TusUpload {
            url,
            fingerprint: fp,
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, self.key)
            .header("Tus-Resumable", TUS_VERSION)
    }

    fn create(&self, total: u64, name: &str) -> Result<String, GalaxyError> {
        let metadata = format!("filename {}", STANDARD.encode(name));
        let resp = self
            .request(Method::POST, &self.endpoint)
            .header("Upload-Length", total.to_string())
            .header("Upload-Metadata", metadata)
            .send()
            .map_err(|e| GalaxyError::transport(&self.endpoint, e))?;
        let resp = check_response(resp, &self.endpoint)?;
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                GalaxyError::Protocol(format!(
                    "upload creation at {} returned no Location header",
                    self.endpoint
                ))
            })?;
        resolve_location(&self.endpoint, location)
    }

    fn offset(&self, url: &str) -> Result<u64, GalaxyError> {
        let resp = self
            .request(Method::HEAD, url)
            .send()
            .map_err(|e| GalaxyError::transport(url, e))?;
        let resp = check_response(resp, url)?;
        upload_offset(&resp, url)
    }

    fn patch(&self, url: &str, offset: u64, chunk: Vec<u8>) -> Result<u64, GalaxyError> {
        let resp = self
            .request(Method::PATCH, url)
            .header("Content-Type", "application/offset+octet-stream")
            .header("Upload-Offset", offset.to_string())
            .body(chunk)
            .send()
            .map_err(|e| GalaxyError::transport(url, e))?;
        let resp = check_response(resp, url)?;
        upload_offset(&resp, url)
    }
}

/// Resolves a `Location` header against the creation endpoint, the way a browser would.
fn resolve_location(endpoint: &str, location: &str) -> Result<String, GalaxyError> {
    Url::parse(endpoint)
        .and_then(|base| base.join(location))
        .map(String::from)
        .map_err(|e| {
            GalaxyError::Protocol(format!(
                "invalid upload location `{}` from {}: {}",
                location, endpoint, e
            ))
        })
}

fn upload_offset(resp: &reqwest::blocking::Response, url: &str) -> Result<u64, GalaxyError> {
    resp.headers()
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| GalaxyError::Protocol(format!("missing Upload-Offset header from {}", url)))
}

fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
