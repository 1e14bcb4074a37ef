//! The engine: configuration, loaders, caches and the render entry points.
//!
//! An [`Engine`] is `Send + Sync` and meant to be shared. Compiled templates
//! are immutable `Arc<Template>`s; each render builds its own
//! [`RenderContext`] over the caller's [`Context`], so concurrent renders see
//! nothing of each other beyond what the caller shares on purpose.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{FileLoader, ResourceLoader, StringLoader, TemplateCache};
use crate::config::{EngineConfig, LoaderConfig};
use crate::diagnostics::TemplateError;
use crate::introspect::{DispatchStats, Introspector};
use crate::macros::MacroLibrary;
use crate::runtime::{Context, OutputSink, RenderContext};
use crate::template::Template;

/// Name under which [`Engine::render_str`] compiles its source.
pub const INLINE_TEMPLATE: &str = "<inline>";

/// What every render of an engine shares.
#[derive(Debug)]
pub(crate) struct Services {
    pub config: EngineConfig,
    pub cache: TemplateCache,
    pub library: MacroLibrary,
    pub introspector: Introspector,
}

// ============================================================================
// BUILDER
// ============================================================================

/// Assembles an [`Engine`].
///
/// Loaders added here are tried before those the configuration describes.
/// With none at all, templates load from the working directory.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    loaders: Vec<Arc<dyn ResourceLoader>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loaders: Vec::new(),
        }
    }

    pub fn loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn build(self) -> Result<Engine, TemplateError> {
        let EngineBuilder { config, mut loaders } = self;
        config.validate()?;

        loaders.extend(config.loaders.iter().map(configured_loader));
        if loaders.is_empty() {
            loaders.push(Arc::new(FileLoader::new(["."])));
        }

        let cache = TemplateCache::new(
            loaders,
            config.check_interval(),
            config.space_gobbling,
            config.intern_names,
        );
        let engine = Engine {
            services: Services {
                config,
                cache,
                library: MacroLibrary::new(),
                introspector: Introspector::new(),
            },
        };
        for library in engine.services.config.macro_libraries.clone() {
            engine.register_macro_library(&library)?;
        }
        Ok(engine)
    }
}

fn configured_loader(config: &LoaderConfig) -> Arc<dyn ResourceLoader> {
    match config {
        LoaderConfig::File { paths } => Arc::new(FileLoader::new(paths.iter().cloned())),
        LoaderConfig::String { templates } => {
            let loader = StringLoader::new();
            for (name, text) in templates {
                loader.put(name.clone(), text.clone());
            }
            Arc::new(loader)
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use vellum::cache::StringLoader;
/// use vellum::engine::EngineBuilder;
/// use vellum::{Context, EngineConfig};
///
/// let loader = Arc::new(StringLoader::new().with("hello.vm", "Hello $name!"));
/// let engine = EngineBuilder::new(EngineConfig::default())
///     .loader(loader)
///     .build()
///     .unwrap();
/// let mut ctx = Context::new().with("name", "world");
/// assert_eq!(engine.render("hello.vm", &mut ctx).unwrap(), "Hello world!");
/// ```
#[derive(Debug)]
pub struct Engine {
    services: Services,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, TemplateError> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.services.cache
    }

    /// The compiled template `name`, through the cache.
    pub fn template(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        self.services.cache.get(name)
    }

    /// Renders the template `name` into a string.
    pub fn render(&self, name: &str, ctx: &mut Context) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_to(name, ctx, &mut out)?;
        Ok(out)
    }

    /// Renders the template `name` into `out`. Text written before a failure
    /// stays written.
    pub fn render_to(
        &self,
        name: &str,
        ctx: &mut Context,
        out: &mut dyn OutputSink,
    ) -> Result<(), TemplateError> {
        let template = self.template(name)?;
        self.render_template(template, ctx, out)
    }

    /// Compiles and renders `source` without caching it.
    pub fn render_str(&self, source: &str, ctx: &mut Context) -> Result<String, TemplateError> {
        let template = Template::compile(INLINE_TEMPLATE, source, self.services.config.space_gobbling)?;
        let mut out = String::new();
        self.render_template(Arc::new(template), ctx, &mut out)?;
        Ok(out)
    }

    /// Renders an already compiled template.
    pub fn render_template(
        &self,
        template: Arc<Template>,
        ctx: &mut Context,
        out: &mut dyn OutputSink,
    ) -> Result<(), TemplateError> {
        debug!(template = template.name(), "render");
        RenderContext::new(ctx, &self.services).render_template(template, out)
    }

    /// Makes the macros of template `name` callable from every template.
    /// Libraries registered later override earlier ones.
    pub fn register_macro_library(&self, name: &str) -> Result<(), TemplateError> {
        let template = self.template(name)?;
        self.services.library.register(name, template.macros());
        debug!(library = name, macros = template.macros().len(), "macro library registered");
        Ok(())
    }

    /// Counters of the shared member-resolution cache.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.services.introspector.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;

    fn engine(loader: StringLoader, config: EngineConfig) -> Engine {
        Engine::builder(config).loader(Arc::new(loader)).build().unwrap()
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn configured_libraries_load_eagerly() {
        let loader = StringLoader::new()
            .with("lib.vm", "#macro(hi $who)Hi $who#end")
            .with("page.vm", "#hi('there')");
        let config = EngineConfig {
            macro_libraries: vec!["lib.vm".into()],
            ..EngineConfig::default()
        };
        let engine = engine(loader, config);
        assert_eq!(engine.render("page.vm", &mut Context::new()).unwrap(), "Hi there");
    }

    #[test]
    fn missing_library_fails_the_build() {
        let config = EngineConfig {
            macro_libraries: vec!["nope.vm".into()],
            ..EngineConfig::default()
        };
        let err = Engine::builder(config)
            .loader(Arc::new(StringLoader::new()))
            .build()
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::ResourceNotFound);
    }

    #[test]
    fn string_loaders_come_from_configuration() {
        let config = EngineConfig::from_toml_str(
            r#"
            [[loaders]]
            kind = "string"
            templates = { "a.vm" = "A=$a" }
            "#,
        )
        .unwrap();
        let engine = Engine::new(config).unwrap();
        let mut ctx = Context::new().with("a", 1);
        assert_eq!(engine.render("a.vm", &mut ctx).unwrap(), "A=1");
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = EngineConfig {
            input_encoding: "latin1".into(),
            ..EngineConfig::default()
        };
        assert_eq!(Engine::new(config).unwrap_err().error_type(), ErrorType::Config);
    }
}
