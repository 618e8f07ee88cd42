//! Mod portal test utilities

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use mod_portal_cache::config::Config;
use mod_portal_cache::mods::cache::Cache;
use mod_portal_cache::mods::transport::HttpTransport;

pub const USERNAME: &str = "alice";
pub const TOKEN: &str = "s3cret";

/// A mod as published on the test portal
#[derive(Debug, Clone)]
pub struct TestMod {
    pub name: String,
    pub version: String,
    pub category: String,
    pub summary: String,
    pub factorio_version: String,
    pub released_at: String,
    pub dependencies: Vec<String>,
}

impl TestMod {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            category: "content".to_string(),
            summary: format!("{} summary", name),
            factorio_version: "1.1".to_string(),
            released_at: "2024-01-01T00:00:00.000000Z".to_string(),
            dependencies: vec!["base >= 1.1.0".to_string()],
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn factorio_version(mut self, factorio_version: &str) -> Self {
        self.factorio_version = factorio_version.to_string();
        self
    }

    pub fn released_at(mut self, released_at: &str) -> Self {
        self.released_at = released_at.to_string();
        self
    }

    pub fn depends_on(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.zip", self.name, self.version)
    }

    pub fn download_path(&self) -> String {
        format!("/download/{}/{}", self.name, self.version)
    }

    pub fn info_json(&self) -> Value {
        json!({
            "name": self.name,
            "version": self.version,
            "title": self.name,
            "author": "tester",
            "factorio_version": self.factorio_version,
            "dependencies": self.dependencies,
        })
    }

    /// Catalog entry as served by `/api/mods`
    pub fn entry(&self) -> Value {
        let archive = mod_archive(self);
        json!({
            "name": self.name,
            "title": self.name,
            "owner": "tester",
            "summary": self.summary,
            "category": self.category,
            "downloads_count": 42,
            "latest_release": {
                "download_url": self.download_path(),
                "file_name": self.file_name(),
                "info_json": self.info_json(),
                "released_at": self.released_at,
                "version": self.version,
                "sha1": hex::encode(Sha1::digest(&archive)),
            }
        })
    }
}

/// Build a zip archive with `<name>_<version>/info.json` inside
pub fn mod_archive(test_mod: &TestMod) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let root = format!("{}_{}", test_mod.name, test_mod.version);

    writer
        .start_file(format!("{}/info.json", root), options)
        .unwrap();
    writer
        .write_all(test_mod.info_json().to_string().as_bytes())
        .unwrap();
    writer
        .start_file(format!("{}/control.lua", root), options)
        .unwrap();
    writer.write_all(b"-- empty").unwrap();

    writer.finish().unwrap().into_inner()
}

/// One catalog page envelope
pub fn page_json(page: u32, page_count: u32, mods: &[TestMod]) -> String {
    json!({
        "pagination": {
            "count": mods.len(),
            "page": page,
            "page_count": page_count,
            "page_size": mods.len(),
            "links": {}
        },
        "results": mods.iter().map(TestMod::entry).collect::<Vec<_>>(),
    })
    .to_string()
}

/// A mockito server standing in for the mod portal
///
/// Mocks are kept alive for as long as the portal is.
pub struct MockPortal {
    pub server: ServerGuard,
    mocks: Vec<Mock>,
}

impl MockPortal {
    pub async fn start() -> Self {
        Self {
            server: mockito::Server::new_async().await,
            mocks: Vec::new(),
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Serve `pages` as the paginated catalog, one mock per page
    pub async fn serve_catalog(&mut self, pages: &[Vec<TestMod>]) {
        let page_count = pages.len().max(1) as u32;
        for (i, mods) in pages.iter().enumerate() {
            let page = i as u32 + 1;
            self.serve_page(page, page_json(page, page_count, mods)).await;
        }
    }

    pub async fn serve_page(&mut self, page: u32, body: String) {
        let mock = self
            .server
            .mock("GET", "/api/mods")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".to_string(), page.to_string()),
                Matcher::UrlEncoded("page_size".to_string(), "max".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        self.mocks.push(mock);
    }

    /// Serve the archive of `test_mod`, only to requests with valid credentials
    pub async fn serve_download(&mut self, test_mod: &TestMod) {
        self.serve_download_body(test_mod, mod_archive(test_mod)).await
    }

    pub async fn serve_download_body(&mut self, test_mod: &TestMod, body: Vec<u8>) {
        let mock = self
            .server
            .mock("GET", test_mod.download_path().as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".to_string(), USERNAME.to_string()),
                Matcher::UrlEncoded("token".to_string(), TOKEN.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/zip")
            .with_body(body)
            .create_async()
            .await;
        self.mocks.push(mock);
    }

    /// Assert every mock registered so far was requested
    pub async fn assert_served(&self) {
        for mock in &self.mocks {
            mock.assert_async().await;
        }
    }
}

pub fn test_config(portal_url: &str) -> Config {
    let mut config = Config::default();
    config.portal.base_url = portal_url.to_string();
    config.portal.timeout = 5_000;
    config
}

/// Create a cache in a temporary directory, talking to `portal_url`
pub fn create_test_cache(portal_url: &str) -> (TempDir, Cache) {
    create_test_cache_with(test_config(portal_url))
}

pub fn create_test_cache_with(config: Config) -> (TempDir, Cache) {
    let temp_dir = TempDir::new().unwrap();
    let cache = open_cache_in(temp_dir.path(), &config);
    (temp_dir, cache)
}

/// Open a cache in an existing directory over HTTP
pub fn open_cache_in(dir: &Path, config: &Config) -> Cache {
    let transport = HttpTransport::new("mod-portal-cache-test", Duration::from_secs(5)).unwrap();
    Cache::open_with_transport(dir, config, Arc::new(transport)).unwrap()
}

/// Run a full update against a portal serving `mods` on a single page
pub async fn create_updated_cache(portal: &mut MockPortal, mods: Vec<TestMod>) -> (TempDir, Cache) {
    portal.serve_catalog(&[mods]).await;
    let (temp_dir, cache) = create_test_cache(&portal.url());
    cache.update().await.unwrap();
    (temp_dir, cache)
}
