//! Templating adapter.
//!
//! atrium does not ship a template engine — it ships the seam one plugs
//! into: [`TemplateEngine`] is the rendering contract, [`Context`] is the
//! data handed to it, and [`Templates::response`] wraps the rendered HTML
//! into a response. The context always carries the current request, so
//! engines can expose a `url_for` helper backed by the application's
//! router.

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::Application;
use crate::error::{DispatchError, Error};
use crate::request::Request;
use crate::response::Response;

/// The rendering contract an external engine satisfies.
pub trait TemplateEngine: Send + Sync {
    /// Renders the named template against the context into HTML.
    fn render(&self, name: &str, context: &Context) -> Result<String, DispatchError>;
}

/// Variables handed to the engine, plus the request they belong to.
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: HashMap<String, String>,
    path: Option<String>,
    app: Option<Application>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value. Chainable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The path of the request this context was rendered for.
    pub fn request_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// URL reversal for templates: `url_for("user", &[("id", "42")])`.
    ///
    /// Available once the context is attached to a request — which
    /// [`Templates::response`] always does.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, Error> {
        self.app
            .as_ref()
            .ok_or(Error::DetachedScope)?
            .url_path_for(name, params)
    }

    fn attach(&mut self, request: &Request) {
        self.path = Some(request.path().to_owned());
        self.app = request.app().cloned();
    }
}

/// The template renderer handed around an application.
#[derive(Clone)]
pub struct Templates {
    engine: Arc<dyn TemplateEngine>,
}

impl Templates {
    pub fn new(engine: impl TemplateEngine + 'static) -> Self {
        Self { engine: Arc::new(engine) }
    }

    /// Renders a template for `request` into a `text/html` response.
    ///
    /// The context is seeded with the request before rendering, so
    /// [`Context::url_for`] works inside the engine.
    pub fn response(
        &self,
        request: &Request,
        name: &str,
        mut context: Context,
    ) -> Result<Response, DispatchError> {
        context.attach(request);
        let html = self.engine.render(name, &context)?;
        Ok(Response::html(html))
    }

    /// Renders without wrapping — for engines driven outside a request.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, DispatchError> {
        self.engine.render(name, context)
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Templates")
    }
}
