//! Artifact downloads and cache hits

mod helper;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use helper::portal::{
    MockPortal, TOKEN, TestMod, USERNAME, create_updated_cache, mod_archive, open_cache_in,
    test_config,
};
use helper::transport::{FailingTransport, StallingTransport};
use mod_portal_cache::mods::cache::Cache;
use mod_portal_cache::mods::credentials::Credentials;
use mod_portal_cache::mods::error::Error;
use mod_portal_cache::mods::manifest::Manifest;
use mod_portal_cache::mods::version::Version;

fn credentials() -> Credentials {
    Credentials::new(USERNAME, TOKEN)
}

#[tokio::test]
async fn get_downloads_latest_release_with_credentials() {
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    portal.serve_download(&flib).await;

    let path = cache.get("flib", &credentials()).await.unwrap();

    portal.assert_served().await;
    assert_eq!(path, cache.mod_dir().unwrap().join("flib_0.12.0.zip"));
    let manifest = Manifest::load(&path).unwrap();
    assert_eq!(manifest.version().unwrap(), Version::new(0, 12, 0));
}

#[tokio::test]
async fn get_never_refetches_a_cached_artifact() {
    // 1. Fill the cache once over HTTP
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    portal.serve_download(&flib).await;
    let downloaded = cache.get("flib", &credentials()).await.unwrap();
    drop(cache);

    // 2. Reopen with a transport that fails every request
    let transport = Arc::new(FailingTransport::default());
    let offline = Cache::open_with_transport(
        temp_dir.path(),
        &test_config(&portal.url()),
        transport.clone(),
    )
    .unwrap();

    let cached = offline.get("flib", &Credentials::default()).await.unwrap();

    assert_eq!(cached, downloaded);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn get_without_credentials_fails_on_cache_miss() {
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) =
        create_updated_cache(&mut portal, vec![TestMod::new("flib", "0.12.0")]).await;

    let missing_token = cache.get("flib", &Credentials::new(USERNAME, "")).await;
    let missing_user = cache.get("flib", &Credentials::new("", TOKEN)).await;

    assert!(matches!(missing_token, Err(Error::InvalidArgument(_))));
    assert!(matches!(missing_user, Err(Error::InvalidArgument(_))));
    assert!(cache.cached_mods().unwrap().is_empty());
}

#[tokio::test]
async fn get_unknown_mod_is_not_found() {
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) =
        create_updated_cache(&mut portal, vec![TestMod::new("flib", "0.12.0")]).await;

    let result = cache.get("flob", &credentials()).await;

    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn rejected_download_leaves_nothing_behind() {
    // The portal only answers requests carrying the right token.
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    portal.serve_download(&flib).await;

    let result = cache.get("flib", &Credentials::new(USERNAME, "wrong")).await;

    match result {
        Err(Error::Fetch { source, .. }) => assert!(!source.to_string().contains("wrong")),
        other => panic!("expected fetch error, got {:?}", other),
    }
    assert!(cache.cached_mods().unwrap().is_empty());
    assert_eq!(fs::read_dir(cache.mod_dir().unwrap()).unwrap().count(), 0);
}

#[tokio::test]
async fn checksum_verification_rejects_tampered_download() {
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    portal.serve_catalog(&[vec![flib.clone()]]).await;
    portal
        .serve_download_body(&flib, b"not the archive".to_vec())
        .await;
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&portal.url());
    config.cache.verify_checksums = true;
    let cache = open_cache_in(temp_dir.path(), &config);
    cache.update().await.unwrap();

    let result = cache.get("flib", &credentials()).await;

    assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    assert_eq!(fs::read_dir(cache.mod_dir().unwrap()).unwrap().count(), 0);
}

#[tokio::test]
async fn checksum_verification_accepts_genuine_download() {
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    portal.serve_catalog(&[vec![flib.clone()]]).await;
    portal.serve_download(&flib).await;
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&portal.url());
    config.cache.verify_checksums = true;
    let cache = open_cache_in(temp_dir.path(), &config);
    cache.update().await.unwrap();

    let path = cache.get("flib", &credentials()).await.unwrap();

    assert!(path.exists());
}

#[tokio::test]
async fn cached_mods_lists_downloaded_versions() {
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    portal.serve_download(&flib).await;
    cache.get("flib", &credentials()).await.unwrap();
    fs::write(cache.mod_dir().unwrap().join("flib_0.9.0.zip"), b"older").unwrap();

    let cached = cache.cached_mods().unwrap();

    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].name, "flib");
    assert_eq!(
        cached[0].versions,
        vec![Version::new(0, 9, 0), Version::new(0, 12, 0)]
    );
}

#[tokio::test]
async fn download_url_is_absolute_on_the_portal() {
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) =
        create_updated_cache(&mut portal, vec![TestMod::new("flib", "0.12.0")]).await;

    let url = cache.download_url("flib").unwrap();

    assert_eq!(url.as_str(), format!("{}/download/flib/0.12.0", portal.url()));
    assert!(matches!(cache.download_url("Flib"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn non_archive_download_is_not_cached() {
    // 1. The portal answers the download with a login page
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (_temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    portal
        .serve_download_body(&flib, b"<html>login</html>".to_vec())
        .await;

    let result = cache.get("flib", &credentials()).await;

    // 2. Nothing takes the archive's name, so the next get downloads again
    assert!(matches!(result, Err(Error::Archive { .. })));
    assert!(cache.cached_mods().unwrap().is_empty());
    assert_eq!(fs::read_dir(cache.mod_dir().unwrap()).unwrap().count(), 0);
}

#[tokio::test]
async fn cancelled_get_leaves_no_artifact() {
    // 1. Start a download that never finishes and give up on it
    let flib = TestMod::new("flib", "0.12.0");
    let mut portal = MockPortal::start().await;
    let (temp_dir, cache) = create_updated_cache(&mut portal, vec![flib.clone()]).await;
    drop(cache);
    let stalled = Cache::open_with_transport(
        temp_dir.path(),
        &test_config(&portal.url()),
        Arc::new(StallingTransport::new(&mod_archive(&flib)[..16])),
    )
    .unwrap();

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        stalled.get("flib", &credentials()),
    )
    .await;

    assert!(result.is_err());
    let target = stalled.mod_dir().unwrap().join("flib_0.12.0.zip");
    assert!(!target.exists());
    assert!(target.with_extension("zip.part").exists());
    assert!(stalled.cached_mods().unwrap().is_empty());
    drop(stalled);

    // 2. A later get over a working portal completes the download
    portal.serve_download(&flib).await;
    let cache = open_cache_in(temp_dir.path(), &test_config(&portal.url()));

    let path = cache.get("flib", &credentials()).await.unwrap();

    assert_eq!(path, target);
    assert_eq!(Manifest::load(&path).unwrap().name, "flib");
}
