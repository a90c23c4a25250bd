//! Test doubles: an in-memory [`GalaxyApi`] and a one-shot local HTTP server.

use reqwest::StatusCode;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::client::{GalaxyApi, UploadRequest, UploadResponse};
use crate::datasets::{DatasetQuery, DatasetRecord};
use crate::error::{GalaxyError, status_error};

#[derive(Debug, Default)]
pub(crate) struct FakeGalaxy {
    /// Returned verbatim by `list_datasets`, whatever the query.
    pub(crate) datasets: Vec<DatasetRecord>,
    pub(crate) fail_downloads: Vec<(String, StatusCode)>,
    /// Every upload fails with this status when set.
    pub(crate) upload_status: Option<StatusCode>,
    pub(crate) calls: RefCell<Vec<String>>,
}

impl FakeGalaxy {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl GalaxyApi for FakeGalaxy {
    fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<DatasetRecord>, GalaxyError> {
        self.record(format!(
            "list {} in {}",
            query.name,
            query.history_id.as_deref().unwrap_or("*")
        ));
        Ok(self.datasets.clone())
    }

    fn download_dataset(
        &self,
        dataset_id: &str,
        destination: &Path,
        use_default_filename: bool,
    ) -> Result<PathBuf, GalaxyError> {
        self.record(format!(
            "download {} {}",
            dataset_id,
            if use_default_filename { "default-name" } else { "exact-name" }
        ));
        if let Some((_, status)) = self.fail_downloads.iter().find(|(id, _)| id == dataset_id) {
            let url = format!("https://galaxy.test/api/datasets/{}/display", dataset_id);
            return Err(status_error(*status, &url, "{\"err_msg\": \"boom\"}"));
        }

        let target = if use_default_filename {
            destination.join(format!("{}.txt", dataset_id))
        } else {
            destination.to_path_buf()
        };
        std::fs::write(&target, format!("contents of {}\n", dataset_id))
            .map_err(|e| GalaxyError::io(format!("failed to write {}", target.display()), e))?;
        Ok(target)
    }

    fn upload_file(&self, request: &UploadRequest) -> Result<UploadResponse, GalaxyError> {
        self.record(format!("upload {}", request.path.display()));
        if let Some(status) = self.upload_status {
            let url = "https://galaxy.test/api/upload/resumable_upload/5f1a";
            return Err(status_error(status, url, "Not Found"));
        }
        let n = self.calls.borrow().len();
        Ok(UploadResponse {
            outputs: vec![DatasetRecord {
                id: format!("hda{}", n),
                name: request.path.file_name().map(|f| f.to_string_lossy().into_owned()),
                ..DatasetRecord::default()
            }],
        })
    }
}

/// A request as seen by [`spawn_http_server`].
#[derive(Debug, Clone, Default)]
pub(crate) struct SeenRequest {
    pub(crate) method: String,
    /// Path and query, e.g. `/api/datasets?limit=500`.
    pub(crate) target: String,
    /// Lower-cased names.
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl SeenRequest {
    pub(crate) fn line(&self) -> String {
        format!("{} {}", self.method, self.target)
    }

    pub(crate) fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == &name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    /// Overrides `Content-Length`, to cut a response short.
    pub(crate) content_length: Option<usize>,
}

impl Reply {
    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            content_length: None,
        }
    }

    pub(crate) fn json(body: &str) -> Self {
        Self::status(200)
            .header("Content-Type", "application/json")
            .body(body)
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub(crate) fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Serves exactly `request_limit` requests, one per connection, on an ephemeral
/// localhost port. Joining the handle yields every request received.
pub(crate) fn spawn_http_server<F>(
    request_limit: usize,
    mut handler: F,
) -> (String, JoinHandle<Vec<SeenRequest>>)
where
    F: FnMut(&SeenRequest) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..request_limit {
            let (mut stream, _) = listener.accept().expect("accept");
            let request = read_request(&mut stream);
            let reply = handler(&request);

            let reason = StatusCode::from_u16(reply.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown");
            let mut head = format!("HTTP/1.1 {} {}\r\n", reply.status, reason);
            for (name, value) in &reply.headers {
                head.push_str(&format!("{}: {}\r\n", name, value));
            }
            head.push_str(&format!(
                "Content-Length: {}\r\nConnection: close\r\n\r\n",
                reply.content_length.unwrap_or(reply.body.len())
            ));
            stream.write_all(head.as_bytes()).expect("write head");
            if request.method != "HEAD" {
                stream.write_all(&reply.body).expect("write body");
            }
            stream.flush().expect("flush");
            seen.push(request);
        }
        seen
    });
    (format!("http://{}", addr), handle)
}

fn read_request(stream: &mut TcpStream) -> SeenRequest {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).expect("read request");
        assert!(n > 0, "connection closed before request headers");
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while data.len() < header_end + length {
        let n = stream.read(&mut buf).expect("read body");
        assert!(n > 0, "connection closed before request body");
        data.extend_from_slice(&buf[..n]);
    }

    SeenRequest {
        method,
        target,
        headers,
        body: data[header_end..header_end + length].to_vec(),
    }
}
