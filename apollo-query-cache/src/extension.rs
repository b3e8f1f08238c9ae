//! Extension points of the merge, read and planning engines.
//!
//! An [`Extension`] observes the engines from the inside: every hook receives the field being
//! visited and the live engine context, and answers with a [`Visit`]. Extensions never know
//! about each other and the engines never know about concrete extensions.
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::json_ext::Value;
use crate::merge::MergeContext;
use crate::planner::PlanContext;
use crate::read::ReadContext;

/// What an extension wants the engine to do with the visited field.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub enum Visit {
    /// Carry on as usual.
    #[default]
    Continue,

    /// Do not descend into the field. Stops the remaining extensions.
    Skip,

    /// Remove the field. Stops the remaining extensions.
    Delete,

    /// Force the field to be kept. The remaining extensions still run.
    Keep,

    /// Visit this field instead. The remaining extensions see the replacement.
    Replace(Node<ast::Field>),
}

/// A cache engine extension.
///
/// Every hook is optional. Hooks of the same kind run in registration order.
pub trait Extension: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called when the merge engine starts writing an object of the result.
    fn merge_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut MergeContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called when the merge engine is done writing an object of the result.
    fn merge_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut MergeContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called with the finished cache.
    fn merge_after(&self, _cache: &mut Value) {}

    /// Called when the read engine starts reading a cached object.
    fn read_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut ReadContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called when the read engine is done reading a cached object.
    fn read_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut ReadContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called with the finished result.
    fn read_after(&self, _result: &mut Value) {}

    /// Called for every leaf field the planner visits, with its cache key.
    fn plan_enter_field(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut PlanContext<'_>,
        _cache_key: &str,
    ) -> Visit {
        Visit::Continue
    }

    /// Called when the planner finds a field with a sub-selection cached as `null` or as an
    /// empty list, with its cache key. The context holds that degenerate value, and
    /// [`PlanContext::parent`] the object it is stored in.
    ///
    /// The field is dropped from the plan unless an extension answers [`Visit::Keep`].
    fn plan_enter_null(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut PlanContext<'_>,
        _cache_key: &str,
    ) -> Visit {
        Visit::Continue
    }

    /// Called when the planner starts visiting a cached object.
    fn plan_enter_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut PlanContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called when the planner is done visiting a cached object.
    fn plan_leave_selection_set(
        &self,
        _field: &Node<ast::Field>,
        _context: &mut PlanContext<'_>,
    ) -> Visit {
        Visit::Continue
    }

    /// Called with the reduced document, before it is returned.
    fn plan_after(&self, _document: &mut ast::Document) {}
}

/// Why a chain of hooks stopped early.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Halt {
    Skip,
    Delete,
}

/// The combined answer of every extension to one hook.
#[derive(Clone, Debug)]
pub(crate) struct Decision {
    /// The field to carry on with, replaced or not.
    pub(crate) field: Node<ast::Field>,
    pub(crate) replaced: bool,
    pub(crate) keep: bool,
    pub(crate) halt: Option<Halt>,
}

/// Runs `hook` on every extension, in order, and folds their answers.
pub(crate) fn run<F>(extensions: &[Arc<dyn Extension>], field: &Node<ast::Field>, mut hook: F) -> Decision
where
    F: FnMut(&dyn Extension, &Node<ast::Field>) -> Visit,
{
    let mut decision = Decision {
        field: field.clone(),
        replaced: false,
        keep: false,
        halt: None,
    };

    for extension in extensions {
        let visit = hook(extension.as_ref(), &decision.field);
        if visit != Visit::Continue {
            tracing::trace!(
                extension = extension.name(),
                field = decision.field.name.as_str(),
                ?visit,
                "extension hook decision"
            );
        }
        match visit {
            Visit::Continue => {}
            Visit::Keep => decision.keep = true,
            Visit::Replace(field) => {
                decision.field = field;
                decision.replaced = true;
            }
            Visit::Skip => {
                decision.halt = Some(Halt::Skip);
                break;
            }
            Visit::Delete => {
                decision.halt = Some(Halt::Delete);
                break;
            }
        }
    }

    decision
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use test_log::test;

    use super::*;
    use crate::test_utils::first_field;
    use crate::test_utils::parse;

    struct Named(&'static str);

    impl Extension for Named {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    fn named(names: &[&'static str]) -> Vec<Arc<dyn Extension>> {
        names
            .iter()
            .map(|name| Arc::new(Named(*name)) as Arc<dyn Extension>)
            .collect()
    }

    #[test]
    fn extensions_run_in_order_until_skip_or_delete() {
        let extensions = named(&["first", "second", "third"]);
        let field = first_field(&parse("{ user { id } }"));

        let mut order = Vec::new();
        let decision = run(&extensions, &field, |extension, _| {
            order.push(extension.name());
            match extension.name() {
                "first" => Visit::Keep,
                "second" => Visit::Delete,
                _ => Visit::Skip,
            }
        });

        assert_eq!(order, vec!["first", "second"]);
        assert!(decision.keep);
        assert_eq!(decision.halt, Some(Halt::Delete));
        assert!(!decision.replaced);
    }

    #[test]
    fn replacements_are_threaded_through_the_chain() {
        let extensions = named(&["replace", "observe"]);
        let field = first_field(&parse("{ user { id } }"));
        let mut replacement = field.clone();
        replacement.make_mut().name = name!("viewer");

        let mut observed = Vec::new();
        let decision = run(&extensions, &field, |extension, field| {
            observed.push(field.name.to_string());
            match extension.name() {
                "replace" => Visit::Replace(replacement.clone()),
                _ => Visit::Continue,
            }
        });

        assert_eq!(observed, vec!["user", "viewer"]);
        assert!(decision.replaced);
        assert_eq!(decision.field.name.as_str(), "viewer");
        assert_eq!(decision.halt, None);
        assert_eq!(field.name.as_str(), "user");
    }

    #[test]
    fn no_extensions_means_continue() {
        let field = first_field(&parse("{ user { id } }"));
        let decision = run(&[], &field, |_, _| Visit::Delete);

        assert_eq!(decision.halt, None);
        assert!(!decision.keep);
        assert!(!decision.replaced);
    }
}
