/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Resources: loaded templates and raw content, with change tracking.
//!
//! [`ResourceManager::get`] serves resources from the [`ResourceCache`] and
//! falls back to the loader chain on a miss. A cached resource whose check
//! interval has elapsed asks its loader whether the source changed, and is
//! reprocessed in place if so. A resource that vanished from its loader is
//! evicted and looked up once more from scratch.

mod cache;
mod loader;

pub use cache::ResourceCache;
pub use loader::{FileResourceLoader, MemoryResourceLoader, ResourceLoader, ResourceStream};

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::{VtlError, VtlResult};
use crate::template::Template;

/// What a resource holds once processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A parsed template.
    Template,
    /// Raw text, as used by `#include`.
    Content,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Template => write!(f, "template"),
            ResourceKind::Content => write!(f, "content"),
        }
    }
}

/// Processed resource data.
#[derive(Debug, Clone)]
pub enum ResourceData {
    Template(Arc<Template>),
    Content(Arc<str>),
}

#[derive(Debug)]
struct ResourceState {
    data: ResourceData,
    encoding: String,
    last_modified: u64,
    next_check: Instant,
}

/// A cached template or content resource.
pub struct Resource {
    name: String,
    kind: ResourceKind,
    loader: Arc<dyn ResourceLoader>,
    check_interval: Option<Duration>,
    state: RwLock<ResourceState>,
    loads: AtomicUsize,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("loader", &self.loader.name())
            .field("last_modified", &self.last_modified())
            .field("loads", &self.load_count())
            .finish()
    }
}

impl Resource {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        loader: Arc<dyn ResourceLoader>,
        data: ResourceData,
        encoding: impl Into<String>,
        last_modified: u64,
    ) -> Self {
        let check_interval = loader.modification_check_interval();
        let resource = Self {
            name: name.into(),
            kind,
            loader,
            check_interval,
            state: RwLock::new(ResourceState {
                data,
                encoding: encoding.into(),
                last_modified,
                next_check: Instant::now(),
            }),
            loads: AtomicUsize::new(1),
        };
        resource.touch();
        resource
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn data(&self) -> ResourceData {
        self.state.read().data.clone()
    }

    /// The parsed template, for template resources.
    pub fn template(&self) -> Option<Arc<Template>> {
        match self.data() {
            ResourceData::Template(template) => Some(template),
            ResourceData::Content(_) => None,
        }
    }

    /// The raw text, for content resources.
    pub fn content(&self) -> Option<Arc<str>> {
        match self.data() {
            ResourceData::Content(text) => Some(text),
            ResourceData::Template(_) => None,
        }
    }

    pub fn encoding(&self) -> String {
        self.state.read().encoding.clone()
    }

    /// Modification stamp observed when the resource was last processed.
    pub fn last_modified(&self) -> u64 {
        self.state.read().last_modified
    }

    /// How many times the source was read and processed.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn loader_name(&self) -> &str {
        self.loader.name()
    }

    /// Whether the check interval has elapsed. Always false when checking is
    /// disabled.
    pub fn requires_checking(&self) -> bool {
        self.check_interval.is_some() && Instant::now() >= self.state.read().next_check
    }

    /// Restart the check interval.
    pub fn touch(&self) {
        if let Some(interval) = self.check_interval {
            self.state.write().next_check = Instant::now() + interval;
        }
    }

    /// Claim a due check: returns true for exactly one caller per elapsed
    /// interval.
    fn claim_check(&self) -> bool {
        let Some(interval) = self.check_interval else {
            return false;
        };
        let mut state = self.state.write();
        let now = Instant::now();
        if now < state.next_check {
            return false;
        }
        state.next_check = now + interval;
        true
    }
}

/// Turns source text into a template.
pub type TemplateParser<'a> = dyn Fn(&str, &str) -> VtlResult<Template> + 'a;

/// Loader chain plus resource cache.
#[derive(Debug)]
pub struct ResourceManager {
    loaders: Vec<Arc<dyn ResourceLoader>>,
    cache: ResourceCache,
    log_when_found: bool,
}

impl ResourceManager {
    pub fn new(loaders: Vec<Arc<dyn ResourceLoader>>, cache_size: usize, log_when_found: bool) -> Self {
        Self {
            loaders,
            cache: ResourceCache::new(cache_size),
            log_when_found,
        }
    }

    pub fn loaders(&self) -> &[Arc<dyn ResourceLoader>] {
        &self.loaders
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Get a resource, from the cache when possible.
    pub fn get(
        &self,
        name: &str,
        kind: ResourceKind,
        encoding: &str,
        parse: &TemplateParser<'_>,
    ) -> VtlResult<Arc<Resource>> {
        let key = format!("{kind}:{name}");

        if let Some(resource) = self.cache.get(&key) {
            return match self.refresh(&resource, encoding, parse) {
                Ok(()) => Ok(resource),
                Err(VtlError::ResourceNotFound { .. }) => {
                    tracing::debug!(resource = name, "resource vanished, reloading");
                    self.cache.remove(&key);
                    self.load_and_cache(&key, name, kind, encoding, parse)
                }
                Err(e) => {
                    tracing::error!(resource = name, error = %e, "failed to refresh resource");
                    Err(e)
                }
            };
        }

        self.load_and_cache(&key, name, kind, encoding, parse)
    }

    fn load_and_cache(
        &self,
        key: &str,
        name: &str,
        kind: ResourceKind,
        encoding: &str,
        parse: &TemplateParser<'_>,
    ) -> VtlResult<Arc<Resource>> {
        let resource = match self.load(name, kind, encoding, parse) {
            Ok(resource) => Arc::new(resource),
            Err(e) => {
                tracing::error!(resource = name, error = %e, "unable to load resource");
                return Err(e);
            }
        };
        if resource.loader.caching_on() {
            self.cache.put(key, resource.clone());
        }
        Ok(resource)
    }

    /// Try every loader in order.
    fn load(
        &self,
        name: &str,
        kind: ResourceKind,
        encoding: &str,
        parse: &TemplateParser<'_>,
    ) -> VtlResult<Resource> {
        for loader in &self.loaders {
            let Some(stream) = loader.get_resource_stream(name)? else {
                continue;
            };
            let last_modified = loader.last_modified(name);
            let data = process(stream, name, kind, encoding, parse)?;
            if self.log_when_found {
                tracing::info!(resource = name, loader = loader.name(), "found resource");
            }
            return Ok(Resource::new(
                name,
                kind,
                loader.clone(),
                data,
                encoding,
                last_modified,
            ));
        }
        Err(VtlError::ResourceNotFound {
            name: name.to_string(),
        })
    }

    /// Reprocess `resource` in place if its check is due and the source
    /// changed.
    fn refresh(
        &self,
        resource: &Resource,
        encoding: &str,
        parse: &TemplateParser<'_>,
    ) -> VtlResult<()> {
        if !resource.claim_check() || !resource.loader.is_source_modified(resource) {
            return Ok(());
        }

        let previous = resource.encoding();
        if !previous.eq_ignore_ascii_case(encoding) {
            tracing::error!(
                resource = resource.name(),
                old = %previous,
                new = encoding,
                "declared encoding changed on reload"
            );
        }

        let last_modified = resource.loader.last_modified(resource.name());
        let Some(stream) = resource.loader.get_resource_stream(resource.name())? else {
            return Err(VtlError::ResourceNotFound {
                name: resource.name().to_string(),
            });
        };
        let data = process(stream, resource.name(), resource.kind, encoding, parse)?;

        let mut state = resource.state.write();
        state.data = data;
        state.encoding = encoding.to_string();
        state.last_modified = last_modified;
        drop(state);
        resource.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(resource = resource.name(), "resource reloaded");
        Ok(())
    }

    /// Name of the first loader that has `name`.
    pub fn loader_name_for(&self, name: &str) -> Option<String> {
        self.loaders.iter().find_map(|loader| {
            loader
                .get_resource_stream(name)
                .ok()
                .flatten()
                .map(|_| loader.name().to_string())
        })
    }
}

fn process(
    mut stream: ResourceStream,
    name: &str,
    kind: ResourceKind,
    encoding: &str,
    parse: &TemplateParser<'_>,
) -> VtlResult<ResourceData> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    let text = decode(bytes, encoding)?;
    Ok(match kind {
        ResourceKind::Template => ResourceData::Template(Arc::new(parse(&text, name)?)),
        ResourceKind::Content => ResourceData::Content(Arc::from(text)),
    })
}

/// Decode resource bytes in one of the supported encodings.
pub fn decode(bytes: Vec<u8>, encoding: &str) -> VtlResult<String> {
    match encoding.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => String::from_utf8(bytes).map_err(|e| {
            VtlError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }),
        "ISO-8859-1" | "LATIN1" => Ok(bytes.into_iter().map(char::from).collect()),
        other => Err(VtlError::Config(format!("unsupported encoding '{other}'"))),
    }
}
