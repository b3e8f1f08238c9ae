//! A normalized client-side cache for GraphQL selection trees.
//!
//! Against a cache of previously fetched data, the engines answer three questions:
//!
//! * [`merge`]: how the cache changes with a new server response;
//! * [`read`]: what result the cache alone can give for a query;
//! * [`plan`]: what is the smallest query still worth sending to a server.
//!
//! The cache is a plain JSON value. Fields are stored under a key derived from their name and
//! arguments, never their alias, so differently shaped queries share what they fetched.
//! [`Extension`]s hook into all three engines; [`plugins`] holds the ones shipped here.

#![warn(unreachable_pub)]

pub mod json_ext;

pub mod configuration;
pub mod error;
pub mod extension;
pub mod merge;
pub mod planner;
pub mod plugins;
mod query_cache;
pub mod read;
pub mod spec;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use crate::configuration::Configuration;
pub use crate::error::CacheError;
pub use crate::extension::Extension;
pub use crate::extension::Visit;
pub use crate::merge::MergeContext;
pub use crate::merge::merge;
pub use crate::planner::PlanContext;
pub use crate::planner::plan;
pub use crate::plugins::NormalizeEntities;
pub use crate::plugins::SessionValidation;
pub use crate::query_cache::QueryCache;
pub use crate::read::ReadContext;
pub use crate::read::read;
pub use crate::store::CacheStore;
