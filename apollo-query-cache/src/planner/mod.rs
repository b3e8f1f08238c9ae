//! Computing the part of a query that the cache cannot answer.
//!
//! The planner walks the original document, fragments and variables included, against the
//! cache. Every selection position it visits gets a mark: satisfied by the cache, or needed.
//! Marks are kept in a side table keyed by position, then a pruning pass rebuilds the smallest
//! document that still requests everything needed.
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

use self::marks::Location;
use self::marks::Marks;
use crate::error::CacheError;
use crate::extension;
use crate::extension::Extension;
use crate::extension::Halt;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::Fragments;
use crate::spec::cache_key;
use crate::spec::type_condition_applies;

mod marks;
mod prune;

/// The state of the planner, as seen by extensions.
pub struct PlanContext<'c> {
    root: &'c Value,
    cache_stack: Vec<&'c Value>,
    frames: Vec<Frame<'c>>,
    marks: Marks,
}

/// A selection set being planned against one cached object.
struct Frame<'c> {
    /// The position of the field owning the selection set.
    location: Location,
    /// The cached object the field pointed at, before any redirect.
    owner: &'c Value,
    needs_fetch: bool,
    /// A field of this selection set is itself requested.
    fetches_field: bool,
    /// Something stored in the cached object, not behind a redirect, is requested.
    fetches_inline: bool,
}

impl<'c> Frame<'c> {
    fn new(location: Location, owner: &'c Value) -> Self {
        Frame {
            location,
            owner,
            needs_fetch: false,
            fetches_field: false,
            fetches_inline: false,
        }
    }
}

/// What planning a cached object found to fetch.
#[derive(Clone, Copy, Debug, Default)]
struct Visited {
    needs_fetch: bool,
    /// A field selected directly on the object is requested.
    fetches_field: bool,
    /// Data stored in the object itself, not behind a redirect, is requested.
    fetches_inline: bool,
    /// The field is requested with its whole selection set.
    whole: bool,
}

impl Visited {
    fn add(&mut self, other: Visited) {
        self.needs_fetch |= other.needs_fetch;
        self.fetches_field |= other.fetches_field;
        self.fetches_inline |= other.fetches_inline;
        self.whole |= other.whole;
    }
}

impl<'c> PlanContext<'c> {
    fn new(root: &'c Value) -> Self {
        PlanContext {
            root,
            cache_stack: vec![root],
            frames: Vec::new(),
            marks: Marks::default(),
        }
    }

    /// The root of the cache.
    pub fn root(&self) -> &'c Value {
        self.root
    }

    /// The cached value the current selection set is planned against.
    pub fn cache(&self) -> &'c Value {
        self.cache_stack.last().copied().unwrap_or(self.root)
    }

    /// The cached value [`PlanContext::cache`] was reached from.
    pub fn parent(&self) -> &'c Value {
        self.cache_stack
            .len()
            .checked_sub(2)
            .and_then(|index| self.cache_stack.get(index))
            .copied()
            .unwrap_or(self.root)
    }

    /// The cached object the current field points at, ignoring redirects.
    pub fn owner(&self) -> &'c Value {
        self.frames
            .last()
            .map(|frame| frame.owner)
            .unwrap_or(self.root)
    }

    /// Plans the rest of the current selection set against `value` instead.
    pub fn redirect(&mut self, value: &'c Value) {
        self.cache_stack.push(value);
    }

    /// Whether anything in the current selection set still has to be fetched.
    pub fn needs_fetch(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.needs_fetch)
    }

    /// Adds the leaf field `name` to the current selection set, if it is not selected
    /// already, whenever the selection set survives planning.
    pub fn require_field(&mut self, name: &str) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        match Name::new(name) {
            Ok(name) => self.marks.append(&frame.location, name),
            Err(_) => tracing::warn!("cannot request `{name}`, it is not a valid field name"),
        }
    }

    /// Something below the current selection set has to be fetched.
    fn request(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.needs_fetch = true;
        }
    }

    /// A field of the current selection set has to be fetched.
    fn fetch(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.needs_fetch = true;
            frame.fetches_field = true;
        }
    }

    /// Records what was found planning an object field of the current selection set.
    fn absorb(&mut self, visited: Visited) {
        if let Some(frame) = self.frames.last_mut() {
            frame.needs_fetch |= visited.needs_fetch;
            frame.fetches_field |= visited.whole;
            frame.fetches_inline |= visited.fetches_inline;
        }
    }
}

/// Computes the smallest document that still fetches what `cache` cannot answer for
/// `document`.
///
/// Only `query` operations are reduced; other operations, and the fragments they use, are
/// kept as written. Returns `None` when the cache answers everything.
pub fn plan(
    cache: &Value,
    document: &ast::Document,
    variables: &Object,
    extensions: &[Arc<dyn Extension>],
) -> Result<Option<ast::Document>, CacheError> {
    let mut planner = Planner {
        fragments: Fragments::from_ast(document),
        variables,
        declarations: &[],
        extensions,
        active_fragments: Vec::new(),
    };
    let mut context = PlanContext::new(cache);

    for (index, definition) in document.definitions.iter().enumerate() {
        let ast::Definition::OperationDefinition(operation) = definition else {
            continue;
        };
        if operation.operation_type != ast::OperationType::Query {
            continue;
        }

        planner.declarations = &operation.variables;
        let location = Location::operation(index);
        context.frames.push(Frame::new(location.clone(), cache));
        planner.visit_selection_set(&operation.selection_set, &location, &mut context)?;
        context.frames.pop();
    }

    let mut reduced = prune::prune(document, &context.marks);
    for extension in extensions {
        extension.plan_after(&mut reduced);
    }

    if reduced.definitions.is_empty() {
        tracing::debug!("query fully answered by the cache");
        return Ok(None);
    }
    tracing::debug!(
        definitions = reduced.definitions.len(),
        "query still needs a fetch"
    );
    Ok(Some(reduced))
}

struct Planner<'a> {
    fragments: Fragments<'a>,
    variables: &'a Object,
    declarations: &'a [Node<ast::VariableDefinition>],
    extensions: &'a [Arc<dyn Extension>],
    active_fragments: Vec<&'a str>,
}

impl Planner<'_> {
    fn visit_selection_set<'c>(
        &mut self,
        selections: &[ast::Selection],
        location: &Location,
        context: &mut PlanContext<'c>,
    ) -> Result<(), CacheError> {
        for (index, selection) in selections.iter().enumerate() {
            let location = location.child(index);
            match selection {
                ast::Selection::Field(field) => self.visit_field(field, &location, context)?,
                ast::Selection::InlineFragment(inline_fragment) => {
                    if type_condition_applies(
                        inline_fragment.type_condition.as_ref(),
                        context.cache(),
                    ) {
                        self.visit_selection_set(
                            &inline_fragment.selection_set,
                            &location,
                            context,
                        )?;
                    }
                }
                ast::Selection::FragmentSpread(spread) => {
                    // dangling spreads are removed when pruning
                    let Some(fragment) = self.fragments.get(spread.fragment_name.as_str()) else {
                        continue;
                    };
                    if self.active_fragments.contains(&fragment.name.as_str())
                        || !type_condition_applies(Some(&fragment.type_condition), context.cache())
                    {
                        continue;
                    }

                    self.active_fragments.push(fragment.name.as_str());
                    let visited = self.visit_selection_set(
                        &fragment.selection_set,
                        &Location::fragment(&fragment.name),
                        context,
                    );
                    self.active_fragments.pop();
                    visited?;
                }
            }
        }
        Ok(())
    }

    fn visit_field<'c>(
        &mut self,
        field: &Node<ast::Field>,
        location: &Location,
        context: &mut PlanContext<'c>,
    ) -> Result<(), CacheError> {
        let key = cache_key(field, self.variables, self.declarations)?;
        let cached = context.cache().member(&key);

        if field.selection_set.is_empty() {
            let decision = extension::run(self.extensions, field, |extension, field| {
                extension.plan_enter_field(field, context, &key)
            });
            if decision.replaced {
                context.marks.replace(location, decision.field.clone());
            }
            match decision.halt {
                Some(Halt::Skip) => context.fetch(),
                Some(Halt::Delete) => context.marks.delete(location),
                None if cached.is_some() => context.marks.delete(location),
                None => {
                    context.marks.keep(location);
                    context.fetch();
                }
            }
            if decision.keep {
                context.marks.keep(location);
                context.fetch();
            }
            return Ok(());
        }

        match cached {
            Some(empty @ Value::Null) => self.visit_empty(field, empty, &key, location, context),
            Some(empty @ Value::Array(elements)) if elements.is_empty() => {
                self.visit_empty(field, empty, &key, location, context)
            }
            Some(Value::Array(elements)) => self.visit_list(field, elements, location, context)?,
            Some(object @ Value::Object(_)) => {
                let visited = self.visit_object(field, object, location, context)?;
                context.absorb(visited);
            }
            // never fetched, or not an object: request the subtree as written
            _ => {
                context.marks.keep_all(location);
                context.fetch();
            }
        }
        Ok(())
    }

    /// A field known to be empty: nothing beneath it can be fetched.
    fn visit_empty<'c>(
        &mut self,
        field: &Node<ast::Field>,
        empty: &'c Value,
        key: &str,
        location: &Location,
        context: &mut PlanContext<'c>,
    ) {
        context.marks.delete(location);

        let depth = context.cache_stack.len();
        context.cache_stack.push(empty);
        let decision = extension::run(self.extensions, field, |extension, field| {
            extension.plan_enter_null(field, context, key)
        });
        context.cache_stack.truncate(depth);

        if decision.keep {
            context.marks.keep(location);
            context.fetch();
        }
    }

    fn visit_list<'c>(
        &mut self,
        field: &Node<ast::Field>,
        elements: &'c [Value],
        location: &Location,
        context: &mut PlanContext<'c>,
    ) -> Result<(), CacheError> {
        let mut found = Visited::default();
        self.visit_elements(field, elements, location, context, &mut found)?;

        // a merged list replaces the cached one, so it must bring back everything its
        // elements hold. Only entities stored elsewhere may be reduced per element.
        if found.whole || found.fetches_field || found.fetches_inline {
            tracing::debug!(
                field = field.name.as_str(),
                "cached list elements miss data, requesting the whole selection"
            );
            context.marks.keep_all(location);
            context.fetch();
        } else if found.needs_fetch {
            context.request();
        }
        Ok(())
    }

    fn visit_elements<'c>(
        &mut self,
        field: &Node<ast::Field>,
        elements: &'c [Value],
        location: &Location,
        context: &mut PlanContext<'c>,
        found: &mut Visited,
    ) -> Result<(), CacheError> {
        for element in elements {
            match element {
                Value::Object(_) => found.add(self.visit_object(field, element, location, context)?),
                Value::Array(nested) => {
                    self.visit_elements(field, nested, location, context, found)?
                }
                Value::Null => {}
                _ => found.whole = true,
            }
        }
        Ok(())
    }

    /// Plans the selection set of `field` against a cached object.
    fn visit_object<'c>(
        &mut self,
        field: &Node<ast::Field>,
        object: &'c Value,
        location: &Location,
        context: &mut PlanContext<'c>,
    ) -> Result<Visited, CacheError> {
        let depth = context.cache_stack.len();
        context.cache_stack.push(object);
        context.frames.push(Frame::new(location.clone(), object));

        let enter = extension::run(self.extensions, field, |extension, field| {
            extension.plan_enter_selection_set(field, context)
        });
        if enter.replaced {
            context.marks.replace(location, enter.field.clone());
        }
        let mut whole = false;
        match enter.halt {
            Some(Halt::Delete) => context.marks.delete(location),
            Some(Halt::Skip) => whole = true,
            None => {
                self.visit_selection_set(&enter.field.selection_set, location, context)?;
                let leave = extension::run(self.extensions, &enter.field, |extension, field| {
                    extension.plan_leave_selection_set(field, context)
                });
                if leave.keep {
                    context.marks.keep_all(location);
                    whole = true;
                }
                if leave.halt == Some(Halt::Delete) {
                    context.marks.delete(location);
                }
            }
        }
        if enter.keep {
            context.marks.keep_all(location);
            whole = true;
        }

        let redirected = context.cache_stack.len() > depth + 1;
        context.cache_stack.truncate(depth);
        let Some(frame) = context.frames.pop() else {
            return Ok(Visited::default());
        };
        Ok(Visited {
            needs_fetch: frame.needs_fetch || whole,
            fetches_field: frame.fetches_field,
            fetches_inline: !redirected && (frame.fetches_field || frame.fetches_inline),
            whole,
        })
    }
}

#[cfg(test)]
mod tests;
