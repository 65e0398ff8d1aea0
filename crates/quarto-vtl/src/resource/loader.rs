/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Resource loaders.
//!
//! A loader turns a resource name into a byte stream and reports when the
//! underlying source last changed. The resource manager tries its loaders in
//! order until one of them finds the name.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use parking_lot::RwLock;

use super::Resource;
use crate::config::RuntimeConfig;
use crate::error::VtlResult;

/// A readable resource stream.
pub type ResourceStream = Box<dyn Read + Send>;

/// Source of template and content resources.
pub trait ResourceLoader: Send + Sync + fmt::Debug {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Open the named resource, or `None` if this loader does not have it.
    fn get_resource_stream(&self, name: &str) -> VtlResult<Option<ResourceStream>>;

    /// Modification stamp of the named resource, 0 when unknown.
    fn last_modified(&self, name: &str) -> u64;

    /// Whether the source of `resource` changed since it was loaded.
    fn is_source_modified(&self, resource: &Resource) -> bool {
        self.last_modified(resource.name()) != resource.last_modified()
    }

    /// Whether resources from this loader are kept in the resource cache.
    fn caching_on(&self) -> bool;

    /// How often cached resources are checked for changes. `None` disables
    /// checking.
    fn modification_check_interval(&self) -> Option<Duration>;
}

/// Loads resources from a list of directories.
#[derive(Debug, Clone)]
pub struct FileResourceLoader {
    paths: Vec<PathBuf>,
    caching: bool,
    check_interval: Option<Duration>,
}

impl FileResourceLoader {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            caching: false,
            check_interval: None,
        }
    }

    /// Loader configured from the `file_resource_loader_*` settings.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            paths: config.file_resource_loader_path.clone(),
            caching: config.file_resource_loader_cache,
            check_interval: config.file_check_interval(),
        }
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// First existing file for `name` along the search path. Names that try
    /// to leave the search path are never found.
    fn find(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            tracing::warn!(resource = name, "resource name leaves the loader path");
            return None;
        }
        self.paths
            .iter()
            .map(|dir| dir.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

impl ResourceLoader for FileResourceLoader {
    fn name(&self) -> &str {
        "file"
    }

    fn get_resource_stream(&self, name: &str) -> VtlResult<Option<ResourceStream>> {
        match self.find(name) {
            Some(path) => Ok(Some(Box::new(File::open(path)?))),
            None => Ok(None),
        }
    }

    fn last_modified(&self, name: &str) -> u64 {
        self.find(name)
            .and_then(|path| std::fs::metadata(path).ok())
            .and_then(|meta| meta.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX))
    }

    fn caching_on(&self) -> bool {
        self.caching
    }

    fn modification_check_interval(&self) -> Option<Duration> {
        self.check_interval
    }
}

/// In-memory resources. Every change bumps a version counter, which serves
/// as the modification stamp.
#[derive(Debug)]
pub struct MemoryResourceLoader {
    resources: RwLock<HashMap<String, (String, u64)>>,
    version: AtomicU64,
    caching: bool,
    check_interval: Option<Duration>,
}

impl Default for MemoryResourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResourceLoader {
    /// An empty loader with caching on and change checks on every access.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            caching: true,
            check_interval: Some(Duration::ZERO),
        }
    }

    pub fn with_resources(
        resources: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let loader = Self::new();
        for (name, text) in resources {
            loader.add(name, text);
        }
        loader
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.check_interval = interval;
        self
    }

    /// Add or replace a resource.
    pub fn add(&self, name: impl Into<String>, text: impl Into<String>) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.resources
            .write()
            .insert(name.into(), (text.into(), version));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.resources.write().remove(name).is_some()
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn name(&self) -> &str {
        "memory"
    }

    fn get_resource_stream(&self, name: &str) -> VtlResult<Option<ResourceStream>> {
        Ok(self.resources.read().get(name).map(|(text, _)| {
            Box::new(Cursor::new(text.clone().into_bytes())) as ResourceStream
        }))
    }

    fn last_modified(&self, name: &str) -> u64 {
        self.resources.read().get(name).map_or(0, |(_, version)| *version)
    }

    fn caching_on(&self) -> bool {
        self.caching
    }

    fn modification_check_interval(&self) -> Option<Duration> {
        self.check_interval
    }
}
