//! Template loaders.
//!
//! An [`Environment`] asks its loaders, in the order they were added, for
//! templates by name.  The first loader whose
//! [`can_load`](TemplateLoader::can_load) returns `true` is used.
use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "loader")]
use std::fs;
#[cfg(feature = "loader")]
use std::io;
#[cfg(feature = "loader")]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memo_map::MemoMap;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::template::CompiledTemplate;

/// Loads template sources by name.
pub trait TemplateLoader: Send + Sync {
    /// Returns `true` if this loader knows a template with that name.
    fn can_load(&self, name: &str) -> bool;

    /// Loads the source of a template.  `Ok(None)` means the template does
    /// not exist.
    fn load_source(&self, name: &str) -> Result<Option<String>, Error>;

    /// Loads and compiles a template.
    ///
    /// The default implementation compiles the result of
    /// [`load_source`](Self::load_source).
    fn load_template(
        &self,
        name: &str,
        env: &Environment,
    ) -> Result<Option<Arc<CompiledTemplate>>, Error> {
        match ok!(self.load_source(name)) {
            Some(source) => env.compile(&source, name).map(Some),
            None => Ok(None),
        }
    }

    /// Drops cached templates, if the loader caches any.
    fn clear_cache(&mut self) {}
}

impl<T: TemplateLoader + ?Sized> TemplateLoader for Box<T> {
    fn can_load(&self, name: &str) -> bool {
        T::can_load(self, name)
    }

    fn load_source(&self, name: &str) -> Result<Option<String>, Error> {
        T::load_source(self, name)
    }

    fn load_template(
        &self,
        name: &str,
        env: &Environment,
    ) -> Result<Option<Arc<CompiledTemplate>>, Error> {
        T::load_template(self, name, env)
    }

    fn clear_cache(&mut self) {
        T::clear_cache(self)
    }
}

/// Serves templates from memory.
///
/// ```
/// # use minidtl::{Environment, InMemoryLoader};
/// let mut loader = InMemoryLoader::new();
/// loader.add_template("hello.txt", "Hello {{ name }}!");
/// let mut env = Environment::new();
/// env.add_loader(loader);
/// assert!(env.can_load("hello.txt"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoader {
    templates: BTreeMap<String, String>,
}

impl InMemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> InMemoryLoader {
        InMemoryLoader::default()
    }

    /// Adds or replaces a template.
    pub fn add_template<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) {
        self.templates.insert(name.into(), source.into());
    }

    /// Removes a template.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }
}

impl TemplateLoader for InMemoryLoader {
    fn can_load(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    fn load_source(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.templates.get(name).cloned())
    }
}

/// Safely joins two paths.
#[cfg(feature = "loader")]
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Loads templates from directories on the file system.
///
/// Directories are searched in the order they were added.  Templates that
/// start with a dot (`.`) or are contained in a folder starting with a dot
/// cannot be loaded.
///
/// ```rust
/// # use minidtl::{Environment, FileSystemLoader};
/// fn create_env() -> Environment {
///     let mut env = Environment::new();
///     env.add_loader(FileSystemLoader::new("path/to/templates"));
///     env
/// }
/// ```
#[cfg(feature = "loader")]
#[cfg_attr(docsrs, doc(cfg(feature = "loader")))]
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    dirs: Vec<PathBuf>,
}

#[cfg(feature = "loader")]
impl FileSystemLoader {
    /// Creates a loader for one directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> FileSystemLoader {
        FileSystemLoader {
            dirs: vec![dir.as_ref().to_path_buf()],
        }
    }

    /// Adds another directory to search.
    pub fn add_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.dirs.push(dir.as_ref().to_path_buf());
    }

    fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        self.dirs.iter().filter_map(move |dir| safe_join(dir, name))
    }
}

#[cfg(feature = "loader")]
impl TemplateLoader for FileSystemLoader {
    fn can_load(&self, name: &str) -> bool {
        self.candidates(name).any(|path| path.is_file())
    }

    fn load_source(&self, name: &str) -> Result<Option<String>, Error> {
        for path in self.candidates(name) {
            match fs::read_to_string(&path) {
                Ok(result) => return Ok(Some(result)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(Error::new(
                        ErrorKind::TemplateNotFound,
                        format!("could not read template {name:?}"),
                    )
                    .with_source(err))
                }
            }
        }
        Ok(None)
    }
}

/// Wraps a loader and memoizes the templates it compiles.
///
/// Templates are compiled once per name.  Templates that failed to compile
/// are cached as well so that the error is reported again without
/// recompiling.
pub struct CachingLoaderDecorator<L> {
    inner: L,
    cache: MemoMap<String, Result<Arc<CompiledTemplate>, Error>>,
}

impl<L: fmt::Debug> fmt::Debug for CachingLoaderDecorator<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingLoaderDecorator")
            .field("inner", &self.inner)
            .field("cached", &self.cache.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<L: TemplateLoader> CachingLoaderDecorator<L> {
    /// Wraps a loader.
    pub fn new(inner: L) -> CachingLoaderDecorator<L> {
        CachingLoaderDecorator {
            inner,
            cache: MemoMap::default(),
        }
    }

    /// Returns the wrapped loader.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.keys().next().is_none()
    }

    /// Returns the number of cached templates.
    pub fn len(&self) -> usize {
        self.cache.keys().count()
    }

    /// Drops all cached templates.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl<L: TemplateLoader> TemplateLoader for CachingLoaderDecorator<L> {
    fn can_load(&self, name: &str) -> bool {
        self.cache.contains_key(name) || self.inner.can_load(name)
    }

    fn load_source(&self, name: &str) -> Result<Option<String>, Error> {
        self.inner.load_source(name)
    }

    fn load_template(
        &self,
        name: &str,
        env: &Environment,
    ) -> Result<Option<Arc<CompiledTemplate>>, Error> {
        let cached = self
            .cache
            .get_or_try_insert(&name.to_string(), || {
                tracing::debug!(name, "template cache miss");
                match self.inner.load_template(name, env) {
                    Ok(Some(template)) => Ok(Ok(template)),
                    Ok(None) => Err(None),
                    Err(err) if err.kind() == ErrorKind::TemplateNotFound => Err(Some(err)),
                    Err(err) => Ok(Err(err)),
                }
            });
        match cached {
            Ok(Ok(template)) => Ok(Some(template.clone())),
            Ok(Err(err)) => Err(err.clone()),
            Err(None) => Ok(None),
            Err(Some(err)) => Err(err),
        }
    }

    fn clear_cache(&mut self) {
        self.clear();
        self.inner.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[cfg(feature = "loader")]
    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
    }

    #[test]
    fn test_caching_decorator() {
        let env = Environment::new();
        let mut inner = InMemoryLoader::new();
        inner.add_template("a.txt", "A{{ x }}");
        inner.add_template("broken.txt", "{% if %}");
        let mut loader = CachingLoaderDecorator::new(inner);
        assert!(loader.is_empty());

        let first = loader.load_template("a.txt", &env).unwrap().unwrap();
        let second = loader.load_template("a.txt", &env).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.len(), 1);

        assert!(loader.load_template("missing.txt", &env).unwrap().is_none());
        assert_eq!(loader.len(), 1);

        let err = loader.load_template("broken.txt", &env).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
        assert_eq!(loader.len(), 2);

        loader.clear();
        assert!(loader.is_empty());
        let third = loader.load_template("a.txt", &env).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
