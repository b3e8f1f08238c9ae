use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::json_ext::Object;
use crate::json_ext::Value;

pub(crate) fn parse(query: &str) -> ast::Document {
    ast::Document::parse(query, "query.graphql").expect("test documents are valid")
}

pub(crate) fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        other => panic!("expected an object, got {other:?}"),
    }
}

/// The first field of the first operation.
pub(crate) fn first_field(document: &ast::Document) -> Node<ast::Field> {
    document
        .definitions
        .iter()
        .find_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => {
                operation.selection_set.iter().find_map(|selection| match selection {
                    ast::Selection::Field(field) => Some(field.clone()),
                    _ => None,
                })
            }
            _ => None,
        })
        .expect("the document selects a field")
}

/// Prints a planned document the same way `expected` would print once parsed.
pub(crate) fn assert_plan(plan: Option<ast::Document>, expected: &str) {
    let plan = plan.expect("something left to fetch");
    pretty_assertions::assert_eq!(plan.to_string(), parse(expected).to_string());
}
