//! Writes the three sets to disk, one item per line.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::model::{SetName, Stats};
use crate::store::QueueStore;

/// File name used for each set.
pub fn file_name(set: SetName) -> &'static str {
    match set {
        SetName::Todo => "todo.txt",
        SetName::Accepted => "accepted.txt",
        SetName::Rejected => "rejected.txt",
    }
}

/// Write `todo.txt`, `accepted.txt` and `rejected.txt` into `dir`, sorted.
///
/// Existing files are overwritten. Returns the number of lines per file.
pub async fn write_sets(store: &dyn QueueStore, dir: &Path) -> Result<Stats> {
    tokio::fs::create_dir_all(dir).await?;

    let mut stats = Stats::default();
    for set in SetName::ALL {
        let mut members = store.members(set).await?;
        members.sort();

        let mut body = String::new();
        for item in &members {
            body.push_str(item.as_str());
            body.push('\n');
        }
        let path = dir.join(file_name(set));
        tokio::fs::write(&path, body).await?;
        info!(set = %set, count = members.len(), path = %path.display(), "exported");

        let count = members.len() as u64;
        match set {
            SetName::Todo => stats.todo = count,
            SetName::Accepted => stats.accepted = count,
            SetName::Rejected => stats.rejected = count,
        }
    }
    Ok(stats)
}
