use std::sync::Arc;

use apollo_compiler::ast;

use crate::configuration::Configuration;
use crate::error::CacheError;
use crate::extension::Extension;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::store::CacheStore;

/// The cache engines, bound to an ordered list of extensions.
#[derive(Clone, Default)]
pub struct QueryCache {
    extensions: Vec<Arc<dyn Extension>>,
}

impl QueryCache {
    /// A cache without extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache running the extensions enabled in `configuration`.
    pub fn from_configuration(configuration: &Configuration) -> Self {
        QueryCache {
            extensions: configuration.extensions(),
        }
    }

    /// Adds an extension, after those already registered.
    pub fn with_extension(mut self, extension: impl Extension) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// The registered extensions, in the order their hooks run.
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// See [`crate::merge::merge`].
    pub fn merge(
        &self,
        previous: &Value,
        document: &ast::Document,
        result: &Value,
        variables: &Object,
    ) -> Result<Value, CacheError> {
        crate::merge::merge(previous, document, result, variables, &self.extensions)
    }

    /// See [`crate::read::read`].
    pub fn read(
        &self,
        cache: &Value,
        document: &ast::Document,
        variables: &Object,
    ) -> Result<Value, CacheError> {
        crate::read::read(cache, document, variables, &self.extensions)
    }

    /// See [`crate::planner::plan`].
    pub fn plan(
        &self,
        cache: &Value,
        document: &ast::Document,
        variables: &Object,
    ) -> Result<Option<ast::Document>, CacheError> {
        crate::planner::plan(cache, document, variables, &self.extensions)
    }

    /// Merges `result` into the cache published by `store`.
    pub fn merge_into(
        &self,
        store: &CacheStore,
        document: &ast::Document,
        result: &Value,
        variables: &Object,
    ) -> Result<Arc<Value>, CacheError> {
        store.update(|previous| self.merge(previous, document, result, variables))
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field(
                "extensions",
                &self
                    .extensions()
                    .iter()
                    .map(|extension| extension.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
