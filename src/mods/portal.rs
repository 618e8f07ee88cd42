//! Mod portal API response types
//!
//! `GET /api/mods` returns one page of the catalog per request:
//!
//! ```json
//! {
//!   "pagination": { "count": 2, "page": 1, "page_count": 1, "page_size": 25, "links": {} },
//!   "results": [ { "name": "flib", "latest_release": { ... }, ... } ]
//! }
//! ```
//!
//! Entries are also written back out, one JSON object per line, to stage a
//! pull for [`Cache::update`](crate::mods::cache::Cache::update), so they
//! derive `Serialize` as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModListPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub results: Vec<ModEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// Total number of mods that matched filters
    pub count: u64,
    pub page: u32,
    /// Total number of pages
    pub page_count: u32,
    pub page_size: u32,
    pub links: PaginationLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaginationLinks {
    pub first: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

/// One mod in a catalog page.
///
/// Which optional fields are filled depends on the endpoint that served it;
/// `latest_release` only comes from `/api/mods`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModEntry {
    /// Machine-readable ID
    pub name: String,
    pub title: String,
    /// Portal username of the mod's author
    pub owner: String,
    pub summary: String,
    pub category: String,
    pub downloads_count: u64,
    pub releases: Vec<Release>,
    pub latest_release: Option<Release>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Path of the download, relative to the portal
    pub download_url: String,
    pub file_name: String,
    pub released_at: DateTime<Utc>,
    pub version: String,
    /// Hex SHA-1 of the release archive
    pub sha1: String,
    /// Copy of the release's `info.json`. On `/api/mods` this only carries
    /// `factorio_version`.
    #[serde(default)]
    pub info_json: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct License {
    pub description: String,
    pub id: String,
    pub name: String,
    pub title: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn page_decodes_pagination_and_results() {
        let page: ModListPage = serde_json::from_str(
            r#"{
                "pagination": {
                    "count": 2,
                    "page": 1,
                    "page_count": 2,
                    "page_size": 1,
                    "links": { "first": null, "prev": null, "next": "https://mods.factorio.com/api/mods?page=2", "last": "https://mods.factorio.com/api/mods?page=2" }
                },
                "results": [
                    {
                        "name": "flib",
                        "title": "Factorio Library",
                        "owner": "raiguard",
                        "summary": "A set of high-quality, commonly-used utilities.",
                        "category": "internal",
                        "downloads_count": 123,
                        "latest_release": {
                            "download_url": "/download/flib/abc",
                            "file_name": "flib_0.12.0.zip",
                            "info_json": { "factorio_version": "1.1" },
                            "released_at": "2023-01-02T03:04:05.000000Z",
                            "version": "0.12.0",
                            "sha1": "deadbeef"
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.pagination.page_count, 2);
        assert_eq!(page.results.len(), 1);

        let entry = &page.results[0];
        assert_eq!(entry.name, "flib");
        let release = entry.latest_release.as_ref().unwrap();
        assert_eq!(release.version, "0.12.0");
        assert_eq!(release.info_json["factorio_version"], "1.1");
        assert_eq!(
            release.released_at,
            Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap()
        );
    }

    #[test]
    fn entry_without_latest_release_decodes() {
        let entry: ModEntry =
            serde_json::from_str(r#"{"name": "old-mod", "category": "content"}"#).unwrap();

        assert_eq!(entry.name, "old-mod");
        assert!(entry.latest_release.is_none());
        assert!(entry.releases.is_empty());
    }

    #[test]
    fn staged_entry_survives_reencoding() {
        let entry: ModEntry = serde_json::from_str(
            r#"{
                "name": "flib",
                "category": "internal",
                "tags": ["libraries"],
                "latest_release": {
                    "download_url": "/download/flib/abc",
                    "file_name": "flib_0.12.0.zip",
                    "info_json": { "factorio_version": "1.1" },
                    "released_at": "2023-01-02T03:04:05Z",
                    "version": "0.12.0",
                    "sha1": "deadbeef"
                }
            }"#,
        )
        .unwrap();

        let line = serde_json::to_string(&entry).unwrap();
        let decoded: ModEntry = serde_json::from_str(&line).unwrap();

        assert_eq!(decoded, entry);
    }
}
