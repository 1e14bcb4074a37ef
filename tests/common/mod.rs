//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vellum::cache::StringLoader;
use vellum::{Context, Engine, EngineConfig, TemplateError};

/// An engine over an in-memory loader, with gobbling switched off so the
/// expected output is exactly what the templates say.
pub fn engine_with(templates: &[(&str, &str)], config: EngineConfig) -> (Engine, Arc<StringLoader>) {
    let loader = Arc::new(StringLoader::new());
    for (name, text) in templates {
        loader.put(*name, *text);
    }
    let engine = Engine::builder(config)
        .loader(Arc::clone(&loader) as Arc<dyn vellum::cache::ResourceLoader>)
        .build()
        .expect("engine builds");
    (engine, loader)
}

pub fn plain_config() -> EngineConfig {
    EngineConfig::default().with_gobbling(vellum::config::SpaceGobbling::None)
}

pub fn render(source: &str) -> String {
    render_with(source, &mut Context::new())
}

pub fn render_with(source: &str, ctx: &mut Context) -> String {
    try_render(source, ctx, plain_config()).expect("template renders")
}

pub fn try_render(source: &str, ctx: &mut Context, config: EngineConfig) -> Result<String, TemplateError> {
    let (engine, _) = engine_with(&[], config);
    engine.render_str(source, ctx)
}

pub fn render_strict(source: &str, ctx: &mut Context) -> Result<String, TemplateError> {
    try_render(source, ctx, plain_config().strict(true))
}
