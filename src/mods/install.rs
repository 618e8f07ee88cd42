//! Install resolution
//!
//! A [`Resolver`] turns requested mod names into an [`InstallationPlan`]:
//! every requested mod and its dependencies, downloaded into the cache.
//! Copying the plan into a game installation is a separate step,
//! [`InstallationPlan::apply`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::mods::cache::Cache;
use crate::mods::credentials::Credentials;
use crate::mods::dependency::{Dependencies, Dependency};
use crate::mods::error::Error;
use crate::mods::local::{MOD_LIST_FILE_NAME, ModList};
use crate::mods::manifest::Manifest;

/// The game itself. Always present, never installed.
pub const BASE_MOD: &str = "base";

/// Mod name to cached artifact path, in resolution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallationPlan {
    artifacts: IndexMap<String, PathBuf>,
}

impl InstallationPlan {
    /// Add a mod to the plan. A name already planned keeps its position and
    /// takes the new path.
    pub fn insert(&mut self, name: impl Into<String>, path: PathBuf) {
        let name = name.into();
        if let Some(previous) = self.artifacts.insert(name.clone(), path) {
            debug!("Replaced planned artifact for {}: {:?}", name, previous);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.artifacts.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.artifacts
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Copy every planned artifact into `<install_dir>/mods/`, skipping files
    /// that are already there, and optionally enable the planned mods in
    /// `mod-list.json`. Returns the paths that were copied.
    pub fn apply(&self, install_dir: &Path, enable: bool) -> Result<Vec<PathBuf>, Error> {
        let mods_dir = install_dir.join("mods");
        fs::create_dir_all(&mods_dir)
            .map_err(Error::io(format!("create {}", mods_dir.display())))?;

        let mut copied = Vec::new();
        for (name, artifact) in &self.artifacts {
            let file_name = artifact.file_name().ok_or_else(|| {
                Error::InvalidArgument(format!("artifact {:?} of {} has no file name", artifact, name))
            })?;
            let target = mods_dir.join(file_name);

            if target.exists() {
                debug!("{} already installed at {:?}", name, target);
                continue;
            }

            fs::copy(artifact, &target).map_err(Error::io(format!(
                "copy {} to {}",
                artifact.display(),
                target.display()
            )))?;
            info!("Installed {} at {:?}", name, target);
            copied.push(target);
        }

        if enable {
            let list_path = mods_dir.join(MOD_LIST_FILE_NAME);
            let mut list = ModList::load_or_default(&list_path)?;
            for name in self.artifacts.keys() {
                list.enable(name);
            }
            list.save(&list_path)?;
            info!("Enabled {} mods in {:?}", self.artifacts.len(), list_path);
        }

        Ok(copied)
    }
}

/// Walks the dependencies of requested mods, downloading each one.
pub struct Resolver<'a> {
    cache: &'a Cache,
    credentials: Credentials,
    install_optional: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(cache: &'a Cache, credentials: Credentials) -> Self {
        Self {
            cache,
            credentials,
            install_optional: false,
        }
    }

    /// Also install optional dependencies.
    pub fn install_optional(mut self, install_optional: bool) -> Self {
        self.install_optional = install_optional;
        self
    }

    /// Resolve `names` and all of their dependencies into a plan.
    ///
    /// Every mod resolves to its latest cached release; dependency version
    /// constraints are reported but not enforced. Conflicts are reported and
    /// never block. The first failure aborts resolution with the name of the
    /// mod that failed.
    pub async fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<InstallationPlan, Error> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("no mods requested".to_string()));
        }

        let mut requested = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if name == BASE_MOD {
                info!("{} is part of the game, skipping", BASE_MOD);
                continue;
            }
            let version = self
                .cache
                .latest_version(name)
                .map_err(Error::resolve(name))?;
            requested.push((name.to_string(), version));
        }
        requested.sort();
        requested.dedup();

        let mut plan = InstallationPlan::default();
        let mut visited = HashSet::new();
        for (name, version) in requested {
            debug!("Resolving {} {}", name, version);
            self.walk(name, &mut plan, &mut visited).await?;
        }

        info!("Resolved {} mods", plan.len());
        Ok(plan)
    }

    async fn walk(
        &self,
        root: String,
        plan: &mut InstallationPlan,
        visited: &mut HashSet<String>,
    ) -> Result<(), Error> {
        let mut pending = vec![root];

        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let dependencies = self
                .fetch(&name, plan)
                .await
                .map_err(Error::resolve(&name))?;

            for conflict in &dependencies.conflicts {
                warn!("{} conflicts with {}", name, conflict);
            }

            let mut wanted: Vec<&Dependency> = dependencies.required.iter().collect();
            if self.install_optional {
                wanted.extend(&dependencies.optional);
            }

            // Reversed so the stack pops them in declaration order.
            for dependency in wanted.into_iter().rev() {
                if dependency.name.is_empty() {
                    warn!(
                        "{} declares a dependency without a name: {:?}",
                        name,
                        dependency.to_string()
                    );
                    continue;
                }
                if dependency.name == BASE_MOD {
                    continue;
                }
                self.check_constraint(&name, dependency);
                pending.push(dependency.name.clone());
            }
        }

        Ok(())
    }

    /// Download `name` and read its bundled dependencies.
    async fn fetch(&self, name: &str, plan: &mut InstallationPlan) -> Result<Dependencies, Error> {
        let path = self.cache.get(name, &self.credentials).await?;
        let dependencies = Manifest::load(&path)?.dependencies()?;
        plan.insert(name, path);
        Ok(dependencies)
    }

    fn check_constraint(&self, dependent: &str, dependency: &Dependency) {
        let Some(constraint) = &dependency.constraint else {
            return;
        };
        // A missing dependency fails later, when it is fetched.
        if let Ok(latest) = self.cache.latest_version(&dependency.name) {
            if !constraint.matches(&latest) {
                warn!(
                    "{} requires {} {}, installing {} instead",
                    dependent, dependency.name, constraint, latest
                );
            }
        }
    }
}
