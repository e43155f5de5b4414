pub mod service;
pub mod store;

use std::{
    path::{Component, Path},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use crate::transform::CleanedReading;

pub use self::{service::ArchiveService, store::LocalArchiveStore};

/// Object storage holding historical readings, one object per day under a
/// per-year prefix (`"2023/2023-12-18.csv"`). Every object is a table with
/// the cleaned-batch column order.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Keys starting with `prefix`, sorted. An unknown prefix yields an empty list.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Rows stored under `key`, or `None` if there is no such object.
    async fn load(&self, key: &str) -> Result<Option<Vec<CleanedReading>>>;

    /// Replace the object under `key` with `rows`.
    async fn save(&self, key: &str, rows: &[CleanedReading]) -> Result<()>;
}

pub type SharedArchiveStore = Arc<dyn ArchiveStore>;

/// Key of the archive object holding readings for `day`.
pub fn archive_key(day: NaiveDate) -> String {
    format!("{}/{}.csv", day.year(), day.format("%Y-%m-%d"))
}

/// A key is a non-empty relative path made only of plain segments, so it
/// cannot name anything outside the store.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Listing prefix covering one year of archive objects.
pub fn year_prefix(year: i32) -> String {
    format!("{year}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_key_is_grouped_by_year() {
        let day = NaiveDate::from_ymd_opt(2023, 12, 18).unwrap();
        assert_eq!(archive_key(day), "2023/2023-12-18.csv");
        assert!(archive_key(day).starts_with(&year_prefix(2023)));
    }

    #[test]
    fn relative_keys_are_valid() {
        assert!(is_valid_key("2023/2023-12-18.csv"));
        assert!(is_valid_key(&archive_key(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())));
    }

    #[test]
    fn escaping_keys_are_invalid() {
        for key in ["", "../x.csv", "/etc/passwd", "2023/../../x.csv", "./2023.csv"] {
            assert!(!is_valid_key(key), "{key}");
        }
    }

    #[test]
    fn archive_key_zero_pads() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(archive_key(day), "2024/2024-01-05.csv");
    }
}
