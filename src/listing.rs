//! Directory view models and ordering.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

/// Recognized sort keys; anything else falls back to `Name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Size,
    Created,
    Updated,
}

impl SortKey {
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some("size") => SortKey::Size,
            Some("created") => SortKey::Created,
            Some("updated") => SortKey::Updated,
            _ => SortKey::Name,
        }
    }

    pub fn as_query(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Created => "created",
            SortKey::Updated => "updated",
        }
    }
}

/// Recognized sort orders; anything else falls back to `Asc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

/// One file or subdirectory as rendered in a listing. Produced fresh per
/// request; the filesystem stays the source of truth.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

impl DirEntry {
    /// Display form: `@` for symlinks beats `/` for directories.
    pub fn display_name(&self) -> String {
        if self.is_symlink {
            format!("{}@", self.name)
        } else if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Link target: directories keep the trailing slash so relative hrefs
    /// stay inside them.
    pub fn link_name(&self) -> String {
        if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Reads `path` and returns its entries ordered by `key`/`order`. Entries
/// that vanish mid-read are skipped. Never caches and never mutates.
pub async fn list_dir(
    path: &Path,
    key: SortKey,
    order: SortOrder,
) -> std::io::Result<Vec<DirEntry>> {
    let mut dir = fs::read_dir(path).await?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let is_dir = metadata.is_dir();
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir,
            is_symlink: file_type.is_symlink(),
            size: if is_dir { 0 } else { metadata.len() },
            created: metadata.created().ok(),
            modified: metadata.modified().ok(),
        });
    }

    sort_entries(&mut entries, key, order);
    Ok(entries)
}

/// Primary comparison per `key` with `order` applied to it alone; ties on
/// non-name keys break by case-insensitive name ascending.
fn sort_entries(entries: &mut [DirEntry], key: SortKey, order: SortOrder) {
    entries.sort_by(|a, b| {
        let primary = match key {
            SortKey::Name => name_cmp(a, b),
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::Created => a.created.cmp(&b.created),
            SortKey::Updated => a.modified.cmp(&b.modified),
        };
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        if key == SortKey::Name {
            primary
        } else {
            primary.then_with(|| name_cmp(a, b))
        }
    });
}

fn name_cmp(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

pub fn format_timestamp(ts: SystemTime) -> String {
    let datetime: DateTime<Utc> = ts.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}
