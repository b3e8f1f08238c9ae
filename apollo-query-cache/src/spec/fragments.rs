use std::collections::HashMap;

use apollo_compiler::Node;
use apollo_compiler::ast;

/// The fragment definitions of a document, by name.
#[derive(Debug, Default)]
pub(crate) struct Fragments<'doc> {
    map: HashMap<&'doc str, &'doc Node<ast::FragmentDefinition>>,
}

impl<'doc> Fragments<'doc> {
    pub(crate) fn from_ast(document: &'doc ast::Document) -> Self {
        let mut map = HashMap::new();
        for definition in &document.definitions {
            if let ast::Definition::FragmentDefinition(fragment) = definition {
                // the first definition of a name wins, like a lookup by name would
                map.entry(fragment.name.as_str()).or_insert(fragment);
            }
        }
        Fragments { map }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'doc Node<ast::FragmentDefinition>> {
        self.map.get(name).copied()
    }
}
