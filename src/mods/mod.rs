//! Mod portal cache and install resolution
//!
//! This module pulls the mod portal's catalog into a local SQLite store and
//! resolves mods, with their dependencies, into cached artifacts ready to be
//! copied into a game installation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│    Cache    │◀────│  Resolver   │
//! │ (HTTP GET)  │     │  (storage)  │     │  (install)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌─────────────┐
//! │   Portal    │                         │  Manifest   │
//! │ (wire types)│                         │(dependency) │
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: catalog ingestion, search, and artifact downloads
//! - [`install`]: dependency walk producing an [`install::InstallationPlan`]
//! - [`dependency`]: dependency line grammar (`"(?) name >= 1.2.3"`)
//! - [`version`]: three-part mod versions
//! - [`manifest`]: the `info.json` bundled inside a mod archive
//! - [`portal`]: mod portal API response types
//! - [`transport`]: HTTP transport used for pages and downloads
//! - [`local`]: mods found on disk (`mod-list.json` and cached archives)
//! - [`category`]: mod portal categories
//! - [`credentials`]: mod portal username and token
//! - [`error`]: error types

pub mod cache;
pub mod category;
pub mod credentials;
pub mod dependency;
pub mod error;
pub mod install;
pub mod local;
pub mod manifest;
pub mod portal;
pub mod transport;
pub mod version;
