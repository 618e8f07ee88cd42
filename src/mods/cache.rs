//! SQLite-backed cache of the mod portal catalog
//!
//! Updating the cache is a two-step process:
//! 1. [`Cache::pull`] fetches every catalog page, one after another, and
//!    stages the entries on disk as JSON lines. The database is not touched.
//! 2. [`Cache::update`] upserts the staged entries in a single transaction.
//!
//! Only the latest release of each mod is kept.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, MIN_FACTORIO_VERSION, USER_AGENT};
use crate::mods::category::Category;
use crate::mods::credentials::Credentials;
use crate::mods::error::Error;
use crate::mods::local::{LocalMod, scan_archives};
use crate::mods::manifest::Manifest;
use crate::mods::portal::{ModEntry, ModListPage};
use crate::mods::transport::{ByteStream, HttpTransport, Transport, read_to_end};
use crate::mods::version::{Version, artifact_file_name};

const DB_FILE_NAME: &str = "mods.db";
const STAGE_DIR_PREFIX: &str = "pull-";
const STAGE_FILE_NAME: &str = "results.jsonl";
const MODS_DIR_NAME: &str = "mods";

/// Schema migrations applied on top of the base tables
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: indexes for search filters and ordering
    &[
        "CREATE INDEX IF NOT EXISTS idx_mods_category ON mods(category)",
        "CREATE INDEX IF NOT EXISTS idx_latest_releases_released_at ON latest_releases(released_at)",
    ],
];

/// Observer for long-running cache operations.
pub trait Progress: Send + Sync {
    /// Called after each catalog page has been staged
    fn page_pulled(&self, page: u32, total: u32);

    /// Called periodically while staged entries are written to the database
    fn entries_stored(&self, _count: usize) {}
}

/// Options for [`Cache::search`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Only return mods in one of these categories
    pub categories: Vec<Category>,
    /// Most recently released first, instead of by name
    pub sort_by_date: bool,
    /// Also match the term against each mod's summary
    pub match_summary: bool,
    /// Treat the term as a regular expression
    pub regex: bool,
}

impl SearchOptions {
    /// Restrict results to the named categories.
    ///
    /// Empty names are ignored; unknown names fail with
    /// [`Error::InvalidArgument`].
    pub fn with_categories<I, S>(mut self, names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            if name.is_empty() {
                continue;
            }
            self.categories.push(name.parse()?);
        }
        Ok(self)
    }

    pub fn sort_by_date(mut self) -> Self {
        self.sort_by_date = true;
        self
    }

    pub fn match_summary(mut self) -> Self {
        self.match_summary = true;
        self
    }

    pub fn regex(mut self) -> Self {
        self.regex = true;
        self
    }
}

struct ReleaseRow {
    download_url: String,
    version: String,
    sha1: String,
}

pub struct Cache {
    dir: PathBuf,
    conn: Mutex<Connection>,
    transport: Arc<dyn Transport>,
    base_url: Url,
    page_size: String,
    verify_checksums: bool,
    /// Path of the most recent successful pull, if not cleaned since
    staged: Mutex<Option<PathBuf>>,
    progress: Option<Arc<dyn Progress>>,
}

impl Cache {
    /// Open the cache in the configured cache directory, talking to the mod
    /// portal over HTTP.
    pub fn open(config: &Config) -> Result<Self, Error> {
        let transport = HttpTransport::new(
            USER_AGENT,
            Duration::from_millis(config.portal.timeout),
        )
        .map_err(|source| Error::Fetch {
            context: "HTTP client setup".to_string(),
            source,
        })?;

        Self::open_with_transport(&config.cache_dir(), config, Arc::new(transport))
    }

    pub fn open_with_transport(
        dir: &Path,
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Error> {
        info!("Initializing mod cache at {:?}", dir);

        fs::create_dir_all(dir).map_err(Error::io(format!("create {}", dir.display())))?;

        let base_url = Url::parse(&config.portal.base_url).map_err(|e| {
            Error::InvalidArgument(format!(
                "portal base URL {:?}: {}",
                config.portal.base_url, e
            ))
        })?;

        let conn = Connection::open(dir.join(DB_FILE_NAME))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Database connection established");

        let cache = Self {
            dir: dir.to_path_buf(),
            conn: Mutex::new(conn),
            transport,
            base_url,
            page_size: config.portal.page_size.clone(),
            verify_checksums: config.cache.verify_checksums,
            staged: Mutex::new(None),
            progress: None,
        };

        cache.create_schema()?;
        info!("Mod cache initialized successfully");

        Ok(cache)
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    fn lock_staged(&self) -> Result<MutexGuard<'_, Option<PathBuf>>, Error> {
        self.staged.lock().map_err(|_| Error::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), Error> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                name TEXT PRIMARY KEY
            ) STRICT;

            CREATE TABLE IF NOT EXISTS mods (
                name TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                owner TEXT NOT NULL,
                summary TEXT NOT NULL,
                category TEXT NOT NULL REFERENCES categories(name)
            ) STRICT;

            CREATE TABLE IF NOT EXISTS latest_releases (
                name TEXT PRIMARY KEY,
                download_url TEXT NOT NULL,
                file_name TEXT NOT NULL,
                info_json TEXT NOT NULL,
                released_at TEXT NOT NULL,
                version TEXT NOT NULL,
                sha1 TEXT NOT NULL
            ) STRICT;
            "#,
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), Error> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    /// Directory that downloaded mod archives are stored in, created on demand.
    pub fn mod_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.dir.join(MODS_DIR_NAME);
        fs::create_dir_all(&dir).map_err(Error::io(format!("create {}", dir.display())))?;
        Ok(dir)
    }

    /// Path of the entries staged by the last [`Cache::pull`], if any.
    pub fn staged_path(&self) -> Result<Option<PathBuf>, Error> {
        Ok(self.lock_staged()?.clone())
    }

    fn portal_url(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidArgument(format!("portal path {:?}: {}", path, e)))
    }

    fn page_url(&self, page: u32) -> Result<Url, Error> {
        let mut url = self.portal_url("api/mods")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &self.page_size);
        Ok(url)
    }

    async fn fetch_page(&self, page: u32) -> Result<ModListPage, Error> {
        let url = self.page_url(page)?;
        let context = format!("catalog page {}", page);
        debug!("Fetching {}", url);

        let fetch_error = |source| Error::Fetch {
            context: context.clone(),
            source,
        };
        let stream = self.transport.get(&url).await.map_err(fetch_error)?;
        let body = read_to_end(stream).await.map_err(fetch_error)?;

        serde_json::from_slice(&body).map_err(|source| Error::Decode { context, source })
    }

    /// Fetch the whole catalog, page by page, and stage it for
    /// [`Cache::update`]. Returns the path of the staged entries.
    ///
    /// Any failed page aborts the pull and removes the partial stage. The
    /// database is never modified.
    pub async fn pull(&self) -> Result<PathBuf, Error> {
        let first = self.fetch_page(1).await?;
        let total = first.pagination.page_count.max(1);

        // Removed on drop unless the whole pull succeeds.
        let stage_dir = tempfile::Builder::new()
            .prefix(STAGE_DIR_PREFIX)
            .tempdir_in(&self.dir)
            .map_err(Error::io(format!("create stage directory in {}", self.dir.display())))?;
        let path = stage_dir.path().join(STAGE_FILE_NAME);
        let file = File::create(&path).map_err(Error::io(format!("create {}", path.display())))?;
        let mut writer = BufWriter::new(file);

        let mut staged = stage_entries(&mut writer, &path, &first.results)?;
        self.report_page(1, total);

        for page in 2..=total {
            let list = self.fetch_page(page).await?;
            staged += stage_entries(&mut writer, &path, &list.results)?;
            self.report_page(page, total);
        }

        writer
            .flush()
            .map_err(Error::io(format!("write {}", path.display())))?;
        drop(writer);
        let stage_dir = stage_dir.keep();
        debug!("Keeping staged pull in {:?}", stage_dir);

        info!("Pulled {} mods in {} pages", staged, total);
        *self.lock_staged()? = Some(path.clone());

        Ok(path)
    }

    fn report_page(&self, page: u32, total: u32) {
        debug!("Staged catalog page {}/{}", page, total);
        if let Some(progress) = &self.progress {
            progress.page_pulled(page, total);
        }
    }

    /// Write the staged catalog into the database, pulling first if nothing
    /// is staged. Returns the number of mods stored.
    ///
    /// All rows are written in one transaction; on any error the database is
    /// left exactly as it was.
    pub async fn update(&self) -> Result<usize, Error> {
        let staged = self.staged_path()?;
        let path = match staged {
            Some(path) => path,
            None => {
                info!("Nothing staged, pulling mod list first");
                self.pull().await?
            }
        };

        self.store_staged(&path)
    }

    fn store_staged(&self, path: &Path) -> Result<usize, Error> {
        let file = File::open(path).map_err(Error::io(format!("open {}", path.display())))?;
        let entries =
            serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<ModEntry>();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut stored = 0;

        {
            let mut insert_category =
                tx.prepare("INSERT OR IGNORE INTO categories (name) VALUES (?1)")?;
            let mut insert_mod = tx.prepare(
                "INSERT OR REPLACE INTO mods (name, title, owner, summary, category) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut insert_release = tx.prepare(
                r#"
                INSERT OR REPLACE INTO latest_releases
                    (name, download_url, file_name, info_json, released_at, version, sha1)
                VALUES (?1, ?2, ?3, json(?4), ?5, ?6, ?7)
                "#,
            )?;

            for entry in entries {
                let entry = entry.map_err(|source| Error::Decode {
                    context: format!("staged entry {} in {}", stored + 1, path.display()),
                    source,
                })?;

                insert_category.execute([&entry.category])?;
                insert_mod.execute((
                    &entry.name,
                    &entry.title,
                    &entry.owner,
                    &entry.summary,
                    &entry.category,
                ))?;

                match &entry.latest_release {
                    Some(release) => {
                        insert_release.execute((
                            &entry.name,
                            &release.download_url,
                            &release.file_name,
                            release.info_json.to_string(),
                            format_timestamp(&release.released_at),
                            &release.version,
                            &release.sha1,
                        ))?;
                    }
                    None => debug!("{} has no latest release", entry.name),
                }

                stored += 1;
                if stored % 1000 == 0 {
                    if let Some(progress) = &self.progress {
                        progress.entries_stored(stored);
                    }
                }
            }
        }

        tx.commit()?;

        if let Some(progress) = &self.progress {
            progress.entries_stored(stored);
        }
        info!("Stored {} mods from {:?}", stored, path);

        Ok(stored)
    }

    /// Remove every staged pull from the cache directory.
    pub fn clean(&self) -> Result<(), Error> {
        let mut staged = self.lock_staged()?;

        let entries =
            fs::read_dir(&self.dir).map_err(Error::io(format!("read {}", self.dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(Error::io(format!("read {}", self.dir.display())))?;
            let is_stage = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGE_DIR_PREFIX));
            let path = entry.path();
            if is_stage && path.is_dir() {
                debug!("Removing staged pull {:?}", path);
                fs::remove_dir_all(&path)
                    .map_err(Error::io(format!("remove {}", path.display())))?;
            }
        }

        *staged = None;
        Ok(())
    }

    /// Search cached mods whose name contains `term`.
    ///
    /// Matching is ASCII case-insensitive, or a regular expression match when
    /// [`SearchOptions::regex`] is set. Only mods released for game version
    /// 1.1 or later are returned, each with its latest version.
    pub fn search(&self, term: &str, options: &SearchOptions) -> Result<Vec<LocalMod>, Error> {
        if term.is_empty() {
            return Err(Error::InvalidArgument("empty search term".to_string()));
        }

        let pattern = if options.regex {
            let regex = Regex::new(term).map_err(|e| {
                Error::InvalidArgument(format!("search term {:?}: {}", term, e))
            })?;
            Some(regex)
        } else {
            None
        };

        let mut sql = String::from(
            r#"
            SELECT m.name, m.summary, m.category, r.released_at, r.version
            FROM mods AS m
            JOIN latest_releases AS r USING (name)
            WHERE json_extract(r.info_json, '$.factorio_version') >= ?
            "#,
        );
        let mut params = vec![MIN_FACTORIO_VERSION.to_string()];

        if pattern.is_none() {
            let like = like_pattern(term);
            if options.match_summary {
                sql.push_str(" AND (m.name LIKE ? ESCAPE '\\' OR m.summary LIKE ? ESCAPE '\\')");
                params.push(like.clone());
                params.push(like);
            } else {
                sql.push_str(" AND m.name LIKE ? ESCAPE '\\'");
                params.push(like);
            }
        }

        if !options.categories.is_empty() {
            let placeholders = vec!["?"; options.categories.len()].join(", ");
            sql.push_str(&format!(" AND m.category IN ({})", placeholders));
            params.extend(options.categories.iter().map(|c| c.as_str().to_string()));
        }

        sql.push_str(if options.sort_by_date {
            " ORDER BY r.released_at DESC"
        } else {
            " ORDER BY m.name ASC"
        });

        debug!("Search query: {}", sql.trim());

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let released_at: String = row.get(3)?;
            let version: String = row.get(4)?;
            Ok(LocalMod {
                name: row.get(0)?,
                summary: row.get(1)?,
                category: row.get(2)?,
                released_at: parse_timestamp(&released_at),
                versions: vec![Version::parse_lenient(&version)],
                enabled: false,
            })
        })?;

        let mut mods = Vec::new();
        for row in rows {
            let found = row?;
            if let Some(regex) = &pattern {
                let matched = regex.is_match(&found.name)
                    || (options.match_summary && regex.is_match(&found.summary));
                if !matched {
                    continue;
                }
            }
            mods.push(found);
        }

        Ok(mods)
    }

    fn release(&self, name: &str) -> Result<ReleaseRow, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty mod name".to_string()));
        }

        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT download_url, version, sha1 FROM latest_releases WHERE name = ?1",
            [name],
            |row| {
                Ok(ReleaseRow {
                    download_url: row.get(0)?,
                    version: row.get(1)?,
                    sha1: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("no mod named {:?} in cache", name)))
    }

    /// Download URL of a mod's latest release. The name must match exactly.
    pub fn download_url(&self, name: &str) -> Result<Url, Error> {
        let release = self.release(name)?;
        self.portal_url(&release.download_url)
    }

    /// Latest released version of a mod. The name must match exactly.
    pub fn latest_version(&self, name: &str) -> Result<Version, Error> {
        Version::parse_strict(&self.release(name)?.version)
    }

    /// Return the path of the latest version of a mod in the cache,
    /// downloading it first if it is not there yet.
    ///
    /// An archive already present under the expected file name is trusted
    /// as-is and no request is made. Downloads need non-empty credentials,
    /// and a downloaded body that is not a mod archive is discarded.
    pub async fn get(&self, name: &str, credentials: &Credentials) -> Result<PathBuf, Error> {
        let release = self.release(name)?;
        let version = Version::parse_strict(&release.version)?;
        let path = self.mod_dir()?.join(artifact_file_name(name, &version));

        if path.exists() {
            debug!("{} {} already cached at {:?}", name, version, path);
            return Ok(path);
        }

        credentials.validate()?;

        let mut url = self.portal_url(&release.download_url)?;
        url.query_pairs_mut()
            .append_pair("username", &credentials.username)
            .append_pair("token", &credentials.token);

        info!("Downloading {} {}", name, version);
        let context = format!("download of {} {}", name, version);
        let stream = self
            .transport
            .get(&url)
            .await
            .map_err(|source| Error::Fetch {
                context: context.clone(),
                source,
            })?;

        let partial = path.with_extension("zip.part");
        let digest = match write_stream(stream, &partial, &context).await {
            Ok(digest) => digest,
            Err(e) => {
                remove_partial(&partial);
                return Err(e);
            }
        };

        if self.verify_checksums
            && !release.sha1.is_empty()
            && !digest.eq_ignore_ascii_case(&release.sha1)
        {
            remove_partial(&partial);
            return Err(Error::ChecksumMismatch {
                name: name.to_string(),
                expected: release.sha1,
                actual: digest,
            });
        }

        // Only a readable mod archive may take the cached name.
        if let Err(e) = Manifest::load(&partial) {
            warn!("Download of {} {} is not a mod archive: {}", name, version, e);
            remove_partial(&partial);
            return Err(e);
        }

        tokio::fs::rename(&partial, &path)
            .await
            .map_err(Error::io(format!("rename {}", partial.display())))?;

        info!("Cached {} {} at {:?}", name, version, path);
        Ok(path)
    }

    /// List the mod archives in the cache, grouped by mod name.
    pub fn cached_mods(&self) -> Result<Vec<LocalMod>, Error> {
        let archives = scan_archives(&self.mod_dir()?)?;

        Ok(archives
            .into_iter()
            .map(|(name, found)| LocalMod {
                name,
                versions: found.into_iter().map(|(version, _)| version).collect(),
                ..LocalMod::default()
            })
            .collect())
    }

    /// Names of all categories seen during updates.
    pub fn categories(&self) -> Result<Vec<String>, Error> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM categories ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Number of mods in the cache.
    pub fn mod_count(&self) -> Result<usize, Error> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM mods", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn stage_entries(
    writer: &mut impl Write,
    path: &Path,
    entries: &[ModEntry],
) -> Result<usize, Error> {
    for entry in entries {
        serde_json::to_writer(&mut *writer, entry).map_err(|source| Error::Decode {
            context: format!("staged entry {}", entry.name),
            source,
        })?;
        writer
            .write_all(b"\n")
            .map_err(Error::io(format!("write {}", path.display())))?;
    }
    Ok(entries.len())
}

/// Stream a download to `path`, returning the hex SHA-1 of its content.
async fn write_stream(mut stream: ByteStream, path: &Path, context: &str) -> Result<String, Error> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(Error::io(format!("create {}", path.display())))?;
    let mut hasher = Sha1::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| Error::Fetch {
            context: context.to_string(),
            source,
        })?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(Error::io(format!("write {}", path.display())))?;
    }

    file.flush()
        .await
        .map_err(Error::io(format!("write {}", path.display())))?;

    Ok(hex::encode(hasher.finalize()))
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial download {:?}: {}", path, e);
        }
    }
}

/// Substring pattern for `LIKE ... ESCAPE '\'`.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// RFC 3339 in UTC with second precision, so text order is time order.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
