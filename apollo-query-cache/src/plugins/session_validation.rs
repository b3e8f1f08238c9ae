//! Session staleness tracking.
//!
//! Every cached object records which session last wrote each of its fields, under the
//! reserved `$$sessionMeta` member. The planner only trusts fields written by the active
//! session; anything else is fetched again.
use apollo_compiler::Node;
use apollo_compiler::ast;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::extension::Extension;
use crate::extension::Visit;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::merge::MergeContext;
use crate::planner::PlanContext;

/// The member of a cached object holding its session stamps.
pub const SESSION_META: &str = "$$sessionMeta";

/// Session validation configuration
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SessionValidationConfig {
    /// The active session. Fields cached by another session are fetched again.
    pub session_id: String,
}

/// Refetches fields that were cached by another session.
#[derive(Clone, Debug)]
pub struct SessionValidation {
    session_id: String,
}

impl SessionValidation {
    pub fn new(session_id: impl Into<String>) -> Self {
        SessionValidation {
            session_id: session_id.into(),
        }
    }

    /// Whether `object` records the active session as the last writer of `cache_key`.
    fn wrote(&self, object: &Value, cache_key: &str) -> bool {
        object
            .member(SESSION_META)
            .and_then(|meta| meta.member(cache_key))
            .and_then(Value::as_str)
            == Some(self.session_id.as_str())
    }

    fn stamp(&self, context: &mut MergeContext<'_>) {
        let written: Vec<String> = context
            .written_keys()
            .iter()
            .filter(|key| key.as_str() != SESSION_META)
            .cloned()
            .collect();
        if written.is_empty() {
            return;
        }
        let Some(object) = context.current_mut() else {
            return;
        };

        let meta = object
            .entry(SESSION_META)
            .or_insert_with(|| Value::Object(Object::new()));
        if !meta.is_object() {
            *meta = Value::Object(Object::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            for key in written {
                meta.insert(key, Value::from(self.session_id.as_str()));
            }
        }
    }
}

impl Extension for SessionValidation {
    fn name(&self) -> &'static str {
        "session_validation"
    }

    fn merge_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        context: &mut MergeContext<'_>,
    ) -> Visit {
        self.stamp(context);
        Visit::Continue
    }

    fn plan_enter_field(
        &self,
        _field: &Node<ast::Field>,
        context: &mut PlanContext<'_>,
        cache_key: &str,
    ) -> Visit {
        if self.wrote(context.cache(), cache_key) {
            Visit::Continue
        } else {
            Visit::Keep
        }
    }

    fn plan_enter_null(
        &self,
        _field: &Node<ast::Field>,
        context: &mut PlanContext<'_>,
        cache_key: &str,
    ) -> Visit {
        // an empty answer from another session may have been filled since
        if self.wrote(context.parent(), cache_key) {
            Visit::Continue
        } else {
            Visit::Keep
        }
    }
}
