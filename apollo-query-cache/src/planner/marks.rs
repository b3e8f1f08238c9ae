use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

/// The definition a selection position starts from.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) enum Root {
    /// An operation, by index in the document's definitions.
    Operation(usize),
    Fragment(Name),
}

/// A selection position in the planned document: a definition, then the index of the
/// selection at every level down.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Location {
    root: Root,
    steps: Vec<usize>,
}

impl Location {
    pub(crate) fn operation(index: usize) -> Self {
        Location {
            root: Root::Operation(index),
            steps: Vec::new(),
        }
    }

    pub(crate) fn fragment(name: &Name) -> Self {
        Location {
            root: Root::Fragment(name.clone()),
            steps: Vec::new(),
        }
    }

    pub(crate) fn child(&self, index: usize) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(index);
        Location {
            root: self.root.clone(),
            steps,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mark {
    Delete,
    Keep,
}

/// Planning decisions, kept beside the document instead of on its nodes.
#[derive(Debug, Default)]
pub(crate) struct Marks {
    marks: HashMap<Location, Mark>,
    keep_all: HashSet<Location>,
    appended: HashMap<Location, Vec<Name>>,
    replacements: HashMap<Location, Node<ast::Field>>,
}

impl Marks {
    /// Marks the field at `location` as satisfied by the cache, unless something wants it kept.
    pub(crate) fn delete(&mut self, location: &Location) {
        self.marks.entry(location.clone()).or_insert(Mark::Delete);
    }

    /// Marks the field at `location` as needed. Keep always wins over delete.
    pub(crate) fn keep(&mut self, location: &Location) {
        self.marks.insert(location.clone(), Mark::Keep);
    }

    pub(crate) fn is_deleted(&self, location: &Location) -> bool {
        self.marks.get(location) == Some(&Mark::Delete)
    }

    /// Forces the field at `location` to be requested with its whole selection set.
    pub(crate) fn keep_all(&mut self, location: &Location) {
        self.keep(location);
        self.keep_all.insert(location.clone());
    }

    pub(crate) fn is_kept_whole(&self, location: &Location) -> bool {
        self.keep_all.contains(location)
    }

    /// Requests a leaf field `name` in the selection set of the field at `location`.
    pub(crate) fn append(&mut self, location: &Location, name: Name) {
        let appended = self.appended.entry(location.clone()).or_default();
        if !appended.contains(&name) {
            appended.push(name);
        }
    }

    pub(crate) fn appended(&self, location: &Location) -> &[Name] {
        self.appended
            .get(location)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn replace(&mut self, location: &Location, field: Node<ast::Field>) {
        self.replacements.insert(location.clone(), field);
    }

    /// The field to emit at `location`: a replacement from an extension, or `field`.
    pub(crate) fn field<'a>(
        &'a self,
        location: &Location,
        field: &'a Node<ast::Field>,
    ) -> &'a Node<ast::Field> {
        self.replacements.get(location).unwrap_or(field)
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;

    use super::*;

    #[test]
    fn keep_wins_over_delete() {
        let location = Location::operation(0).child(1);
        let mut marks = Marks::default();

        marks.keep(&location);
        marks.delete(&location);
        assert!(!marks.is_deleted(&location));

        let other = Location::operation(0).child(2);
        marks.delete(&other);
        assert!(marks.is_deleted(&other));
        marks.keep(&other);
        assert!(!marks.is_deleted(&other));
    }

    #[test]
    fn locations_depend_on_the_definition() {
        assert_ne!(
            Location::operation(0).child(0),
            Location::fragment(&name!("F")).child(0)
        );
        assert_eq!(
            Location::operation(1).child(0).child(2),
            Location::operation(1).child(0).child(2)
        );
    }

    #[test]
    fn appended_fields_are_deduplicated() {
        let location = Location::operation(0).child(0);
        let mut marks = Marks::default();
        marks.append(&location, name!("id"));
        marks.append(&location, name!("id"));
        assert_eq!(marks.appended(&location), &[name!("id")]);
    }
}
