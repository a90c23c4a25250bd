use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};

/// Galaxy URLs are configured as the server root; tolerate a trailing `/api`.
pub(crate) fn server_root(url: &str) -> String {
    let b = url.trim_end_matches('/');
    b.strip_suffix("/api").unwrap_or(b).to_string()
}

pub(crate) fn api_base(url: &str) -> String {
    format!("{}/api", server_root(url))
}

pub(crate) fn bytes_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
    )
    .map(|s| s.progress_chars("=>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

pub(crate) fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_content_disposition(value)
}

fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'value; Galaxy only ever sends UTF-8 names.
            let v = v.rsplit('\'').next().unwrap_or(v);
            match urlencoding::decode(v.trim_matches('"')) {
                Ok(name) if !name.is_empty() => return Some(name.into_owned()),
                _ => {}
            }
        } else if let Some(v) = part.strip_prefix("filename=") {
            let v = v.trim().trim_matches('"');
            if !v.is_empty() {
                plain = Some(v.to_string());
            }
        }
    }
    plain
}

/// Keeps a server-supplied name from escaping the destination directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "dataset".to_string()
    } else {
        cleaned
    }
}
