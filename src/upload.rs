use std::path::{Path, PathBuf};

use crate::client::{GalaxyApi, UploadRequest};
use crate::outcome::{Reporter, Summary, TransferItem, TransferOutcome, error_detail};
use crate::tus::{CheckpointStore, DEFAULT_CHUNK_SIZE, fingerprint};

/// One file from the command line, consumed by exactly one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub history_id: String,
    pub checkpoint_dir: Option<PathBuf>,
}

impl UploadItem {
    /// Keeps command-line order; duplicates stay separate items.
    pub fn from_args(
        paths: &[PathBuf],
        history_id: &str,
        checkpoint_dir: Option<&Path>,
    ) -> Vec<UploadItem> {
        paths
            .iter()
            .map(|p| UploadItem {
                local_path: p.clone(),
                history_id: history_id.to_string(),
                checkpoint_dir: checkpoint_dir.map(Path::to_path_buf),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub auto_decompress: bool,
    pub chunk_size: usize,
    /// Galaxy datatype; `auto` lets the server sniff it.
    pub file_type: String,
    pub dbkey: String,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            auto_decompress: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_type: "auto".to_string(),
            dbkey: "?".to_string(),
        }
    }
}

/// Uploads a single item and classifies the result.
pub fn upload_one<A: GalaxyApi + ?Sized>(
    api: &A,
    item: UploadItem,
    options: &UploadOptions,
) -> TransferOutcome {
    if !item.local_path.exists() {
        return TransferOutcome::skipped(TransferItem::Upload(item), "does not exist");
    }
    if !item.local_path.is_file() {
        return TransferOutcome::skipped(TransferItem::Upload(item), "is not a regular file");
    }

    log::info!(
        "Uploading {} to history {}",
        item.local_path.display(),
        item.history_id
    );
    let request = UploadRequest {
        checkpoint_dir: item.checkpoint_dir.clone(),
        auto_decompress: options.auto_decompress,
        chunk_size: options.chunk_size,
        file_type: options.file_type.clone(),
        dbkey: options.dbkey.clone(),
        ..UploadRequest::new(item.local_path.clone(), item.history_id.clone())
    };

    match api.upload_file(&request) {
        Ok(response) => {
            let ids: Vec<&str> = response.outputs.iter().map(|d| d.id.as_str()).collect();
            let detail = if ids.is_empty() {
                "uploaded".to_string()
            } else {
                format!("uploaded as {}", ids.join(", "))
            };
            TransferOutcome::success(TransferItem::Upload(item), detail)
        }
        Err(e) => {
            let detail = match item.checkpoint_dir.as_deref() {
                Some(dir) if e.is_not_found() => match fingerprint(&item.local_path) {
                    Ok(fp) => {
                        log::debug!("Upload of {} hit a 404: {}", item.local_path.display(), e);
                        stale_checkpoint_detail(&fp, dir)
                    }
                    Err(fp_err) => {
                        log::warn!(
                            "could not fingerprint {}: {}",
                            item.local_path.display(),
                            fp_err
                        );
                        error_detail(e)
                    }
                },
                _ => error_detail(e),
            };
            TransferOutcome::failed(TransferItem::Upload(item), detail)
        }
    }
}

/// Explains a 404 on a resumed upload: the server dropped the partial upload
/// that the local checkpoint still points at.
pub fn stale_checkpoint_detail(fingerprint: &str, checkpoint_dir: &Path) -> String {
    format!(
        "the server no longer has the partial upload recorded under fingerprint `{fp}` in checkpoint directory {dir}.\n\nHow to fix (either):\n1) Remove the `{fp}` entry from {index} and re-run to upload this file from scratch\n2) Re-run with --checkpoints pointing at a fresh directory to force a full re-upload",
        fp = fingerprint,
        dir = checkpoint_dir.display(),
        index = CheckpointStore::index_path(checkpoint_dir).display(),
    )
}

/// Attempts every item once, in order, and never stops early.
pub fn upload_all<A, I, R>(api: &A, items: I, options: &UploadOptions, reporter: &mut R) -> Summary
where
    A: GalaxyApi + ?Sized,
    I: IntoIterator<Item = UploadItem>,
    R: Reporter + ?Sized,
{
    let mut summary = Summary::default();
    for item in items {
        let outcome = upload_one(api, item, options);
        summary.record(outcome.status);
        reporter.report(&outcome);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TransferStatus;
    use crate::testing::FakeGalaxy;
    use reqwest::StatusCode;

    #[test]
    fn missing_files_are_skipped_and_the_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let ok = dir.path().join("ok.txt");
        std::fs::write(&ok, "ACGT\n").unwrap();

        let api = FakeGalaxy::default();
        let items = UploadItem::from_args(&[missing.clone(), ok.clone()], "H", None);
        let mut outcomes: Vec<TransferOutcome> = Vec::new();
        let summary = upload_all(&api, items, &UploadOptions::default(), &mut outcomes);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, TransferStatus::Skipped);
        assert_eq!(outcomes[0].detail.as_deref(), Some("does not exist"));
        assert_eq!(outcomes[0].item.to_string(), missing.display().to_string());
        assert_eq!(outcomes[1].status, TransferStatus::Success);
        assert_eq!(outcomes[1].item.to_string(), ok.display().to_string());
        assert_eq!(api.calls(), vec![format!("upload {}", ok.display())]);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn duplicates_are_uploaded_independently() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.txt");
        std::fs::write(&ok, "ACGT\n").unwrap();

        let api = FakeGalaxy::default();
        let items = UploadItem::from_args(&[ok.clone(), ok.clone()], "H", None);
        let mut outcomes: Vec<TransferOutcome> = Vec::new();
        let summary = upload_all(&api, items, &UploadOptions::default(), &mut outcomes);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(api.calls().len(), 2);
    }

    #[test]
    fn not_found_with_checkpoints_reports_stale_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.txt");
        std::fs::write(&ok, "ACGT\n").unwrap();
        let expected = fingerprint(&ok).unwrap();

        let api = FakeGalaxy {
            upload_status: Some(StatusCode::NOT_FOUND),
            ..FakeGalaxy::default()
        };
        let item = UploadItem {
            local_path: ok,
            history_id: "H".into(),
            checkpoint_dir: Some(PathBuf::from(".checkpoints")),
        };
        let outcome = upload_one(&api, item, &UploadOptions::default());

        assert_eq!(outcome.status, TransferStatus::Failed);
        let detail = outcome.detail.unwrap();
        assert!(detail.contains(&expected), "{detail}");
        assert!(detail.contains(".checkpoints"), "{detail}");
        assert!(detail.contains("checkpoints.json"), "{detail}");
    }

    #[test]
    fn not_found_without_checkpoints_keeps_raw_error() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.txt");
        std::fs::write(&ok, "ACGT\n").unwrap();

        let api = FakeGalaxy {
            upload_status: Some(StatusCode::NOT_FOUND),
            ..FakeGalaxy::default()
        };
        let items = UploadItem::from_args(&[ok], "H", None);
        let outcome = upload_one(&api, items[0].clone(), &UploadOptions::default());

        assert_eq!(outcome.status, TransferStatus::Failed);
        let detail = outcome.detail.unwrap();
        assert!(detail.contains("HTTP 404"), "{detail}");
        assert!(!detail.contains("fingerprint"), "{detail}");
    }

    #[test]
    fn other_errors_fail_the_item_but_not_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let api = FakeGalaxy {
            upload_status: Some(StatusCode::BAD_GATEWAY),
            ..FakeGalaxy::default()
        };
        let checkpoints = dir.path().join(".checkpoints");
        let items = UploadItem::from_args(&[a, b], "H", Some(&checkpoints));
        let mut outcomes: Vec<TransferOutcome> = Vec::new();
        let summary = upload_all(&api, items, &UploadOptions::default(), &mut outcomes);

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.exit_code(), 1);
        assert!(outcomes.iter().all(|o| o.detail.as_deref().unwrap().contains("HTTP 502")));
    }

    #[test]
    fn directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeGalaxy::default();
        let items = UploadItem::from_args(&[dir.path().to_path_buf()], "H", None);
        let outcome = upload_one(&api, items[0].clone(), &UploadOptions::default());
        assert_eq!(outcome.status, TransferStatus::Skipped);
        assert_eq!(outcome.detail.as_deref(), Some("is not a regular file"));
        assert!(api.calls().is_empty());
    }
}
