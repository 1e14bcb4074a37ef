//! Resource loaders: where template text comes from.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::diagnostics::TemplateError;
use crate::err_msg;

/// Template text plus the modification time it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub text: String,
    pub last_modified: Option<SystemTime>,
}

/// A source of named resources, shared by every render of an engine.
pub trait ResourceLoader: Send + Sync + fmt::Debug {
    /// Reads `name`, or `Ok(None)` when this loader does not have it.
    fn load(&self, name: &str) -> Result<Option<Resource>, TemplateError>;

    /// Current modification time of `name`; `None` once it is gone.
    fn last_modified(&self, name: &str) -> Option<SystemTime>;

    /// Whether `name` changed since it was loaded at `loaded`.
    fn is_modified(&self, name: &str, loaded: Option<SystemTime>) -> bool {
        match (self.last_modified(name), loaded) {
            (Some(now), Some(then)) => now != then,
            _ => true,
        }
    }
}

// ============================================================================
// FILES
// ============================================================================

/// Loads templates from an ordered list of root directories.
///
/// Names are `/`-separated paths relative to a root. Absolute names and names
/// with `..` segments are refused.
#[derive(Debug, Clone)]
pub struct FileLoader {
    roots: Vec<PathBuf>,
}

impl FileLoader {
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn check_name(name: &str) -> Result<&Path, TemplateError> {
        let path = Path::new(name);
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || name.is_empty() {
            return Err(err_msg!(
                ResourceNotFound,
                "template name '{}' must be a relative path inside the template roots",
                name
            ));
        }
        Ok(path)
    }

    fn locate(&self, name: &str) -> Result<Option<PathBuf>, TemplateError> {
        let relative = Self::check_name(name)?;
        Ok(self
            .roots
            .iter()
            .map(|root| root.join(relative))
            .find(|path| path.is_file()))
    }
}

impl ResourceLoader for FileLoader {
    fn load(&self, name: &str) -> Result<Option<Resource>, TemplateError> {
        let Some(path) = self.locate(name)? else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => {
                err_msg!(Io, "{} is not valid UTF-8", path.display())
            }
            _ => err_msg!(Io, "cannot read {}: {}", path.display(), e),
        })?;
        let last_modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Some(Resource {
            text,
            last_modified,
        }))
    }

    fn last_modified(&self, name: &str) -> Option<SystemTime> {
        let path = self.locate(name).ok()??;
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

// ============================================================================
// STRINGS
// ============================================================================

/// In-memory templates. Every `put` moves the modification time forward,
/// even when the clock has not.
#[derive(Debug)]
pub struct StringLoader {
    templates: RwLock<HashMap<String, (String, SystemTime)>>,
    clock: Mutex<SystemTime>,
}

impl Default for StringLoader {
    fn default() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            clock: Mutex::new(SystemTime::UNIX_EPOCH),
        }
    }
}

impl StringLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.put(name, text);
        self
    }

    pub fn put(&self, name: impl Into<String>, text: impl Into<String>) {
        let stamp = self.tick();
        self.templates.write().insert(name.into(), (text.into(), stamp));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.templates.write().remove(name).is_some()
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock();
        let next = SystemTime::now().max(*clock + Duration::from_nanos(1));
        *clock = next;
        next
    }
}

impl ResourceLoader for StringLoader {
    fn load(&self, name: &str) -> Result<Option<Resource>, TemplateError> {
        Ok(self.templates.read().get(name).map(|(text, stamp)| Resource {
            text: text.clone(),
            last_modified: Some(*stamp),
        }))
    }

    fn last_modified(&self, name: &str) -> Option<SystemTime> {
        self.templates.read().get(name).map(|(_, stamp)| *stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;

    #[test]
    fn file_loader_searches_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("a.vm"), "second").unwrap();
        std::fs::create_dir(first.path().join("sub")).unwrap();
        std::fs::write(first.path().join("sub/b.vm"), "nested").unwrap();

        let loader = FileLoader::new([first.path(), second.path()]);
        assert_eq!(loader.load("a.vm").unwrap().unwrap().text, "second");
        assert_eq!(loader.load("sub/b.vm").unwrap().unwrap().text, "nested");
        assert!(loader.load("missing.vm").unwrap().is_none());
        assert!(loader.last_modified("a.vm").is_some());
        assert!(loader.last_modified("missing.vm").is_none());
    }

    #[test]
    fn file_loader_rejects_traversal() {
        let root = tempfile::tempdir().unwrap();
        let loader = FileLoader::new([root.path()]);
        for name in ["../etc/passwd", "/etc/passwd", "a/../../b"] {
            let err = loader.load(name).unwrap_err();
            assert_eq!(err.error_type(), ErrorType::ResourceNotFound, "{name}");
        }
    }

    #[test]
    fn string_loader_bumps_modification_time() {
        let loader = StringLoader::new().with("t", "one");
        let first = loader.last_modified("t");
        loader.put("t", "two");
        let second = loader.last_modified("t");
        assert!(second > first);
        assert!(loader.is_modified("t", first));
        assert!(!loader.is_modified("t", second));

        assert!(loader.remove("t"));
        assert!(loader.last_modified("t").is_none());
        assert!(loader.is_modified("t", second));
    }
}
