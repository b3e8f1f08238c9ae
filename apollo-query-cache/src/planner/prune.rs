use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

use super::marks::Location;
use super::marks::Marks;
use crate::spec::Fragments;

/// Rebuilds `document` from the planning marks.
pub(super) fn prune(document: &ast::Document, marks: &Marks) -> ast::Document {
    let pinned = pinned_fragments(document, marks);
    let live = live_fragments(document, marks, &pinned);
    let pruner = Pruner {
        marks,
        live: &live,
    };

    let mut reduced = document.clone();
    reduced.definitions = document
        .definitions
        .iter()
        .enumerate()
        .filter_map(|(index, definition)| match definition {
            ast::Definition::OperationDefinition(operation) if is_query(operation) => {
                let location = Location::operation(index);
                let selection_set =
                    pruner.selection_set(&operation.selection_set, &location, false)?;

                let mut operation = operation.clone();
                operation.make_mut().selection_set = selection_set;
                Some(ast::Definition::OperationDefinition(operation))
            }
            ast::Definition::FragmentDefinition(fragment) => {
                if !live.contains(fragment.name.as_str()) {
                    return None;
                }
                let selection_set = pruner.selection_set(
                    &fragment.selection_set,
                    &Location::fragment(&fragment.name),
                    pinned.contains(fragment.name.as_str()),
                )?;

                let mut fragment = fragment.clone();
                fragment.make_mut().selection_set = selection_set;
                Some(ast::Definition::FragmentDefinition(fragment))
            }
            other => Some(other.clone()),
        })
        .collect();

    remove_unreachable_fragments(&mut reduced);
    remove_unused_variables(&mut reduced);
    reduced
}

fn is_query(operation: &ast::OperationDefinition) -> bool {
    operation.operation_type == ast::OperationType::Query
}

struct Pruner<'a> {
    marks: &'a Marks,
    /// Fragments still selecting something once pruned.
    live: &'a HashSet<String>,
}

impl Pruner<'_> {
    /// The selection set without what the marks delete, or `None` when nothing is left.
    ///
    /// Fields appended by extensions are only added to selection sets that still select
    /// something.
    fn selection_set(
        &self,
        selections: &[ast::Selection],
        location: &Location,
        keep_all: bool,
    ) -> Option<Vec<ast::Selection>> {
        let mut pruned = self.selections(selections, location, keep_all);
        if pruned.is_empty() {
            return None;
        }
        append_fields(&mut pruned, self.marks.appended(location));
        Some(pruned)
    }

    fn selections(
        &self,
        selections: &[ast::Selection],
        location: &Location,
        keep_all: bool,
    ) -> Vec<ast::Selection> {
        let mut pruned = Vec::with_capacity(selections.len());
        for (index, selection) in selections.iter().enumerate() {
            let location = location.child(index);
            match selection {
                ast::Selection::Field(field) => {
                    if !keep_all && self.marks.is_deleted(&location) {
                        continue;
                    }
                    let field = self.marks.field(&location, field);
                    if field.selection_set.is_empty() {
                        pruned.push(ast::Selection::Field(field.clone()));
                        continue;
                    }

                    let keep_all = keep_all || self.marks.is_kept_whole(&location);
                    let Some(selection_set) =
                        self.selection_set(&field.selection_set, &location, keep_all)
                    else {
                        continue;
                    };

                    let mut field = field.clone();
                    field.make_mut().selection_set = selection_set;
                    pruned.push(ast::Selection::Field(field));
                }
                ast::Selection::InlineFragment(inline_fragment) => {
                    let selection_set =
                        self.selections(&inline_fragment.selection_set, &location, keep_all);
                    if selection_set.is_empty() {
                        continue;
                    }

                    let mut inline_fragment = inline_fragment.clone();
                    inline_fragment.make_mut().selection_set = selection_set;
                    pruned.push(ast::Selection::InlineFragment(inline_fragment));
                }
                ast::Selection::FragmentSpread(spread) => {
                    if self.live.contains(spread.fragment_name.as_str()) {
                        pruned.push(selection.clone());
                    }
                }
            }
        }
        pruned
    }
}

/// Fragments that still select something once pruned. A fragment left with nothing but
/// spreads of emptied fragments is empty too, so this shrinks the set until it is stable.
fn live_fragments(
    document: &ast::Document,
    marks: &Marks,
    pinned: &HashSet<String>,
) -> HashSet<String> {
    let mut live: HashSet<String> = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment) => Some(fragment.name.to_string()),
            _ => None,
        })
        .collect();

    loop {
        let pruner = Pruner {
            marks,
            live: &live,
        };
        let next: HashSet<String> = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment) => {
                    let selection_set = pruner.selections(
                        &fragment.selection_set,
                        &Location::fragment(&fragment.name),
                        pinned.contains(fragment.name.as_str()),
                    );
                    (!selection_set.is_empty()).then(|| fragment.name.to_string())
                }
                _ => None,
            })
            .collect();

        if next.len() == live.len() {
            return live;
        }
        live = next;
    }
}

/// Adds the leaf fields `names` at the end of a selection set that does not select them yet.
fn append_fields(selection_set: &mut Vec<ast::Selection>, names: &[Name]) {
    for name in names {
        let selected = selection_set.iter().any(|selection| {
            matches!(
                selection,
                ast::Selection::Field(field)
                    if field.alias.is_none() && field.name == *name && field.arguments.is_empty()
            )
        });
        if !selected {
            selection_set.push(ast::Selection::Field(Node::new(ast::Field {
                alias: None,
                name: name.clone(),
                arguments: Vec::new(),
                directives: ast::DirectiveList(vec![]),
                selection_set: Vec::new(),
            })));
        }
    }
}

/// Fragments that must be kept as written: those used by operations that are not reduced,
/// and those spread inside a subtree that is requested whole.
fn pinned_fragments(document: &ast::Document, marks: &Marks) -> HashSet<String> {
    let mut pending = Vec::new();
    for (index, definition) in document.definitions.iter().enumerate() {
        match definition {
            ast::Definition::OperationDefinition(operation) if is_query(operation) => {
                spreads_kept_whole(
                    &operation.selection_set,
                    &Location::operation(index),
                    false,
                    marks,
                    &mut pending,
                );
            }
            ast::Definition::OperationDefinition(operation) => {
                spreads(&operation.selection_set, &mut pending)
            }
            ast::Definition::FragmentDefinition(fragment) => spreads_kept_whole(
                &fragment.selection_set,
                &Location::fragment(&fragment.name),
                false,
                marks,
                &mut pending,
            ),
            _ => {}
        }
    }

    let fragments = Fragments::from_ast(document);
    let mut pinned = HashSet::new();
    while let Some(name) = pending.pop() {
        if let Some(fragment) = fragments.get(&name)
            && pinned.insert(name)
        {
            spreads(&fragment.selection_set, &mut pending);
        }
    }
    pinned
}

fn spreads_kept_whole(
    selections: &[ast::Selection],
    location: &Location,
    keep_all: bool,
    marks: &Marks,
    pending: &mut Vec<String>,
) {
    for (index, selection) in selections.iter().enumerate() {
        let location = location.child(index);
        match selection {
            ast::Selection::Field(field) => {
                let field = marks.field(&location, field);
                let keep_all = keep_all || marks.is_kept_whole(&location);
                spreads_kept_whole(&field.selection_set, &location, keep_all, marks, pending);
            }
            ast::Selection::InlineFragment(inline_fragment) => spreads_kept_whole(
                &inline_fragment.selection_set,
                &location,
                keep_all,
                marks,
                pending,
            ),
            ast::Selection::FragmentSpread(spread) => {
                if keep_all {
                    pending.push(spread.fragment_name.to_string());
                }
            }
        }
    }
}

/// Every fragment spread in `selections`, at any depth.
fn spreads(selections: &[ast::Selection], pending: &mut Vec<String>) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => spreads(&field.selection_set, pending),
            ast::Selection::InlineFragment(inline_fragment) => {
                spreads(&inline_fragment.selection_set, pending)
            }
            ast::Selection::FragmentSpread(spread) => {
                pending.push(spread.fragment_name.to_string())
            }
        }
    }
}

fn remove_unreachable_fragments(document: &mut ast::Document) {
    let mut pending = Vec::new();
    for definition in &document.definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            spreads(&operation.selection_set, &mut pending);
        }
    }

    let fragments = Fragments::from_ast(document);
    let mut reachable = HashSet::new();
    while let Some(name) = pending.pop() {
        if let Some(fragment) = fragments.get(&name)
            && reachable.insert(name)
        {
            spreads(&fragment.selection_set, &mut pending);
        }
    }

    document.definitions.retain(|definition| match definition {
        ast::Definition::FragmentDefinition(fragment) => {
            reachable.contains(fragment.name.as_str())
        }
        _ => true,
    });
}

/// Drops the variable declarations of reduced operations that nothing references anymore.
fn remove_unused_variables(document: &mut ast::Document) {
    let used: Vec<Option<HashSet<String>>> = {
        let fragments = Fragments::from_ast(document);
        document
            .definitions
            .iter()
            .map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) if is_query(operation) => {
                    let mut used = HashSet::new();
                    directive_variables(&operation.directives, &mut used);
                    selection_variables(
                        &operation.selection_set,
                        &fragments,
                        &mut HashSet::new(),
                        &mut used,
                    );
                    Some(used)
                }
                _ => None,
            })
            .collect()
    };

    for (definition, used) in document.definitions.iter_mut().zip(used) {
        if let (ast::Definition::OperationDefinition(operation), Some(used)) = (definition, used)
            && operation
                .variables
                .iter()
                .any(|variable| !used.contains(variable.name.as_str()))
        {
            operation
                .make_mut()
                .variables
                .retain(|variable| used.contains(variable.name.as_str()));
        }
    }
}

fn selection_variables(
    selections: &[ast::Selection],
    fragments: &Fragments<'_>,
    visited: &mut HashSet<String>,
    used: &mut HashSet<String>,
) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                for argument in &field.arguments {
                    value_variables(&argument.value, used);
                }
                directive_variables(&field.directives, used);
                selection_variables(&field.selection_set, fragments, visited, used);
            }
            ast::Selection::InlineFragment(inline_fragment) => {
                directive_variables(&inline_fragment.directives, used);
                selection_variables(&inline_fragment.selection_set, fragments, visited, used);
            }
            ast::Selection::FragmentSpread(spread) => {
                directive_variables(&spread.directives, used);
                if visited.insert(spread.fragment_name.to_string())
                    && let Some(fragment) = fragments.get(spread.fragment_name.as_str())
                {
                    directive_variables(&fragment.directives, used);
                    selection_variables(&fragment.selection_set, fragments, visited, used);
                }
            }
        }
    }
}

fn directive_variables(directives: &ast::DirectiveList, used: &mut HashSet<String>) {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            value_variables(&argument.value, used);
        }
    }
}

fn value_variables(value: &ast::Value, used: &mut HashSet<String>) {
    match value {
        ast::Value::Variable(name) => {
            used.insert(name.to_string());
        }
        ast::Value::List(items) => {
            for item in items {
                value_variables(item, used);
            }
        }
        ast::Value::Object(fields) => {
            for (_, value) in fields {
                value_variables(value, used);
            }
        }
        _ => {}
    }
}
