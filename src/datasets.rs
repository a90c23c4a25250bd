use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::client::GalaxyApi;
use crate::error::GalaxyError;
use crate::outcome::{Reporter, Summary, TransferItem, TransferOutcome, error_detail};

/// Which datasets to download. `dataset_id` wins over a name search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    pub dataset_id: Option<String>,
    pub dataset_name: Option<String>,
    /// Only scopes a name search.
    pub history_id: Option<String>,
}

/// A dataset listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetQuery {
    pub name: String,
    pub history_id: Option<String>,
    pub visible: bool,
    pub deleted: bool,
    pub purged: bool,
    pub state: String,
    pub limit: usize,
    pub offset: usize,
    pub order: String,
}

impl DatasetQuery {
    /// Visible, live, fully-processed datasets with exactly this name.
    pub fn by_name(name: impl Into<String>, history_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            history_id,
            visible: true,
            deleted: false,
            purged: false,
            state: "ok".to_string(),
            limit: 500,
            offset: 0,
            order: "create_time-dsc".to_string(),
        }
    }

    /// `q`/`qv` pairs understood by `GET /api/datasets`.
    pub(crate) fn filters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("state", self.state.clone()),
            ("visible", py_bool(self.visible)),
            ("deleted", py_bool(self.deleted)),
            ("purged", py_bool(self.purged)),
        ]
    }

    /// Re-checks a returned record; fields the server left out are not held against it.
    pub fn matches(&self, record: &DatasetRecord) -> bool {
        record.name.as_deref() == Some(self.name.as_str())
            && record.state.as_deref().is_none_or(|s| s == self.state)
            && record.visible.is_none_or(|v| v == self.visible)
            && record.deleted.is_none_or(|d| d == self.deleted)
            && record.purged.is_none_or(|p| p == self.purged)
            && match (&self.history_id, &record.history_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            }
    }
}

fn py_bool(v: bool) -> String {
    if v { "True" } else { "False" }.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub deleted: Option<bool>,
    #[serde(default)]
    pub purged: Option<bool>,
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub file_ext: Option<String>,
    #[serde(default)]
    pub hid: Option<u64>,
}

impl DatasetRecord {
    /// Galaxy reports the datatype as `extension`, `file_ext`, or both.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref().or(self.file_ext.as_deref())
    }
}

/// Turns a filter into the ids to download, in server order.
///
/// An empty filter resolves to nothing without contacting the server.
pub fn resolve_targets<A: GalaxyApi + ?Sized>(
    api: &A,
    filter: &DatasetFilter,
) -> Result<Vec<String>, GalaxyError> {
    if let Some(id) = &filter.dataset_id {
        return Ok(vec![id.clone()]);
    }

    let Some(name) = &filter.dataset_name else {
        log::debug!("No dataset id or name given, nothing to download");
        return Ok(Vec::new());
    };

    let query = DatasetQuery::by_name(name.clone(), filter.history_id.clone());
    let records = api.list_datasets(&query)?;
    let total = records.len();
    let ids: Vec<String> = records
        .into_iter()
        .filter(|r| query.matches(r))
        .map(|r| r.id)
        .collect();
    log::debug!(
        "Dataset name `{}` matched {} of {} listed dataset(s)",
        name,
        ids.len(),
        total
    );
    Ok(ids)
}

/// Downloads one dataset. A directory destination keeps the server's file name.
pub fn fetch_one<A: GalaxyApi + ?Sized>(
    api: &A,
    dataset_id: &str,
    destination: &Path,
) -> TransferOutcome {
    let use_default_filename = destination.is_dir();
    log::info!(
        "Downloading dataset with id `{}` to {}",
        dataset_id,
        destination.display()
    );

    let item = TransferItem::Dataset(dataset_id.to_string());
    match api.download_dataset(dataset_id, destination, use_default_filename) {
        Ok(path) => TransferOutcome::success(item, format!("saved to {}", path.display())),
        Err(e) => TransferOutcome::failed(item, error_detail(e)),
    }
}

/// Resolves `filter` and downloads every target, continuing past failures.
///
/// Only a failed listing is returned as an error.
pub fn download_all<A: GalaxyApi + ?Sized, R: Reporter + ?Sized>(
    api: &A,
    filter: &DatasetFilter,
    destination: &Path,
    reporter: &mut R,
) -> Result<Summary, GalaxyError> {
    let targets = resolve_targets(api, filter)?;
    let mut summary = Summary::default();
    for id in &targets {
        let outcome = fetch_one(api, id, destination);
        summary.record(outcome.status);
        reporter.report(&outcome);
    }
    Ok(summary)
}
