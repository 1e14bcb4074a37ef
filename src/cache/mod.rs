//! Compiled-template cache with modification checks.
//!
//! A lookup that hits an entry returns it as is until `interval` has passed
//! since that entry was last checked. A due entry asks the loader that
//! produced it for the current modification time:
//!
//! | loader says          | cache does                                   |
//! |----------------------|----------------------------------------------|
//! | unchanged            | keeps the entry                              |
//! | changed              | recompiles and swaps the entry in            |
//! | gone                 | evicts, then searches the loaders afresh     |
//!
//! A recompile that fails evicts the entry and returns the error. An interval
//! of zero turns checking off: once compiled, a template stays.

pub mod loader;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::config::SpaceGobbling;
use crate::diagnostics::TemplateError;
use crate::err_msg;
use crate::template::Template;

pub use loader::{FileLoader, Resource, ResourceLoader, StringLoader};

#[derive(Debug)]
pub struct CachedTemplate {
    pub template: Arc<Template>,
    pub last_modified: Option<SystemTime>,
    /// Index of the loader the template came from.
    loader: usize,
    checked: Mutex<Instant>,
}

#[derive(Debug)]
pub struct TemplateCache {
    loaders: Vec<Arc<dyn ResourceLoader>>,
    entries: RwLock<HashMap<String, Arc<CachedTemplate>>>,
    interval: Duration,
    gobbling: SpaceGobbling,
    names: Option<Mutex<HashSet<Arc<str>>>>,
}

impl TemplateCache {
    pub fn new(
        loaders: Vec<Arc<dyn ResourceLoader>>,
        interval: Duration,
        gobbling: SpaceGobbling,
        intern_names: bool,
    ) -> Self {
        Self {
            loaders,
            entries: RwLock::new(HashMap::new()),
            interval,
            gobbling,
            names: intern_names.then(|| Mutex::new(HashSet::new())),
        }
    }

    /// Returns the compiled template `name`, loading or refreshing it as needed.
    pub fn get(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        let cached = self.entries.read().get(name).cloned();
        match cached {
            Some(entry) if self.due(&entry) => self.refresh(name, &entry),
            Some(entry) => Ok(Arc::clone(&entry.template)),
            None => self.load(name),
        }
    }

    /// Reads `name` from the loaders without compiling or caching it.
    pub fn load_text(&self, name: &str) -> Result<String, TemplateError> {
        for loader in &self.loaders {
            if let Some(resource) = loader.load(name)? {
                return Ok(resource.text);
            }
        }
        Err(not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evict(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn due(&self, entry: &CachedTemplate) -> bool {
        if self.interval.is_zero() {
            return false;
        }
        let mut checked = entry.checked.lock();
        if checked.elapsed() < self.interval {
            return false;
        }
        *checked = Instant::now();
        true
    }

    fn refresh(&self, name: &str, entry: &Arc<CachedTemplate>) -> Result<Arc<Template>, TemplateError> {
        let loader = &self.loaders[entry.loader];
        match loader.last_modified(name) {
            None => {
                debug!(template = name, "resource gone; evicting");
                self.evict(name);
                self.load(name)
            }
            Some(stamp) if Some(stamp) == entry.last_modified => Ok(Arc::clone(&entry.template)),
            Some(_) => {
                debug!(template = name, "resource changed; recompiling");
                match self.compile_from(entry.loader, name) {
                    Ok(Some(fresh)) => {
                        let template = Arc::clone(&fresh.template);
                        self.entries.write().insert(name.to_string(), fresh);
                        Ok(template)
                    }
                    Ok(None) => {
                        self.evict(name);
                        self.load(name)
                    }
                    Err(e) => {
                        self.evict(name);
                        Err(e)
                    }
                }
            }
        }
    }

    /// First load: the first loader that has `name` wins.
    fn load(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        for index in 0..self.loaders.len() {
            if let Some(entry) = self.compile_from(index, name)? {
                let mut entries = self.entries.write();
                let entry = entries.entry(name.to_string()).or_insert(entry);
                debug!(template = name, loader = index, "template cached");
                return Ok(Arc::clone(&entry.template));
            }
        }
        Err(not_found(name))
    }

    fn compile_from(&self, index: usize, name: &str) -> Result<Option<Arc<CachedTemplate>>, TemplateError> {
        let Some(resource) = self.loaders[index].load(name)? else {
            return Ok(None);
        };
        let template = Template::compile(self.intern(name), &resource.text, self.gobbling)?;
        Ok(Some(Arc::new(CachedTemplate {
            template: Arc::new(template),
            last_modified: resource.last_modified,
            loader: index,
            checked: Mutex::new(Instant::now()),
        })))
    }

    fn intern(&self, name: &str) -> Arc<str> {
        let Some(names) = &self.names else {
            return Arc::from(name);
        };
        let mut names = names.lock();
        if let Some(existing) = names.get(name) {
            return Arc::clone(existing);
        }
        let fresh: Arc<str> = Arc::from(name);
        names.insert(Arc::clone(&fresh));
        fresh
    }
}

fn not_found(name: &str) -> TemplateError {
    err_msg!(ResourceNotFound, "no loader provides '{}'", name)
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;
    use crate::diagnostics::ErrorType;

    fn cache(loader: &Arc<StringLoader>, interval: Duration) -> TemplateCache {
        let loader: Arc<dyn ResourceLoader> = Arc::clone(loader) as Arc<dyn ResourceLoader>;
        TemplateCache::new(vec![loader], interval, SpaceGobbling::None, true)
    }

    fn first_text(template: &Template) -> String {
        format!("{:?}", template.root().nodes.first().map(|n| &n.kind))
    }

    #[test]
    fn hits_share_the_compiled_template() {
        let loader = Arc::new(StringLoader::new().with("a", "A"));
        let cache = cache(&loader, Duration::ZERO);
        let one = cache.get("a").unwrap();
        let two = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(&one, &two));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_interval_never_reloads() {
        let loader = Arc::new(StringLoader::new().with("a", "old"));
        let cache = cache(&loader, Duration::ZERO);
        cache.get("a").unwrap();
        loader.put("a", "new");
        sleep(Duration::from_millis(20));
        assert!(first_text(&cache.get("a").unwrap()).contains("old"));
    }

    #[test]
    fn due_entries_pick_up_changes() {
        let loader = Arc::new(StringLoader::new().with("a", "old"));
        let cache = cache(&loader, Duration::from_millis(10));
        cache.get("a").unwrap();
        loader.put("a", "new");
        sleep(Duration::from_millis(30));
        assert!(first_text(&cache.get("a").unwrap()).contains("new"));
    }

    #[test]
    fn vanished_resources_are_evicted() {
        let loader = Arc::new(StringLoader::new().with("a", "A"));
        let cache = cache(&loader, Duration::from_millis(10));
        cache.get("a").unwrap();
        loader.remove("a");
        sleep(Duration::from_millis(30));
        let err = cache.get("a").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::ResourceNotFound);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn failed_recompile_evicts() {
        let loader = Arc::new(StringLoader::new().with("a", "fine"));
        let cache = cache(&loader, Duration::from_millis(10));
        cache.get("a").unwrap();
        loader.put("a", "#if(");
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a").unwrap_err().error_type(), ErrorType::Parse);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn interned_names_are_shared() {
        let loader = Arc::new(StringLoader::new().with("a", "A"));
        let cache = cache(&loader, Duration::ZERO);
        let first = cache.get("a").unwrap();
        cache.clear();
        let second = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(first.name_arc(), second.name_arc()));
    }
}
