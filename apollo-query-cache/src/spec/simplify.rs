use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

use super::Fragments;
use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Rewrites `document` into a self-contained, variable-free form.
///
/// Fragment spreads become inline fragments carrying the fragment's type condition and the
/// spread's directives, variables are replaced with literals, and fragment definitions and
/// variable declarations are removed. A spread naming an unknown fragment is dropped.
///
/// The input document is left untouched.
pub fn simplify(document: &ast::Document, variables: &Object) -> Result<ast::Document, CacheError> {
    let fragments = Fragments::from_ast(document);
    let mut simplified = document.clone();
    simplified.definitions = Vec::with_capacity(document.definitions.len());

    for definition in &document.definitions {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                let mut simplifier = Simplifier {
                    fragments: &fragments,
                    variables,
                    declarations: &operation.variables,
                    active_fragments: Vec::new(),
                };
                let selection_set = simplifier.selection_set(&operation.selection_set)?;
                let directives = simplifier.directives(&operation.directives)?;

                let mut operation = operation.clone();
                let operation_mut = operation.make_mut();
                operation_mut.variables.clear();
                operation_mut.directives = directives;
                operation_mut.selection_set = selection_set;
                simplified
                    .definitions
                    .push(ast::Definition::OperationDefinition(operation));
            }
            ast::Definition::FragmentDefinition(_) => {}
            other => simplified.definitions.push(other.clone()),
        }
    }

    Ok(simplified)
}

struct Simplifier<'a> {
    fragments: &'a Fragments<'a>,
    variables: &'a Object,
    declarations: &'a [Node<ast::VariableDefinition>],
    active_fragments: Vec<&'a str>,
}

impl<'a> Simplifier<'a> {
    fn selection_set(
        &mut self,
        selections: &[ast::Selection],
    ) -> Result<Vec<ast::Selection>, CacheError> {
        let mut simplified = Vec::with_capacity(selections.len());
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => {
                    let arguments = self.arguments(&field.arguments)?;
                    let directives = self.directives(&field.directives)?;
                    let selection_set = self.selection_set(&field.selection_set)?;

                    let mut field = field.clone();
                    let field_mut = field.make_mut();
                    field_mut.arguments = arguments;
                    field_mut.directives = directives;
                    field_mut.selection_set = selection_set;
                    simplified.push(ast::Selection::Field(field));
                }
                ast::Selection::InlineFragment(inline_fragment) => {
                    let directives = self.directives(&inline_fragment.directives)?;
                    let selection_set = self.selection_set(&inline_fragment.selection_set)?;

                    let mut inline_fragment = inline_fragment.clone();
                    let inline_fragment_mut = inline_fragment.make_mut();
                    inline_fragment_mut.directives = directives;
                    inline_fragment_mut.selection_set = selection_set;
                    simplified.push(ast::Selection::InlineFragment(inline_fragment));
                }
                ast::Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.fragments.get(spread.fragment_name.as_str()) else {
                        tracing::warn!(
                            "The fragment {} was not found in the query document.",
                            spread.fragment_name
                        );
                        continue;
                    };
                    if self.active_fragments.contains(&fragment.name.as_str()) {
                        tracing::warn!(
                            "The fragment {} spreads itself, the recursive spread is dropped.",
                            fragment.name
                        );
                        continue;
                    }

                    self.active_fragments.push(fragment.name.as_str());
                    let selection_set = self.selection_set(&fragment.selection_set);
                    self.active_fragments.pop();

                    simplified.push(ast::Selection::InlineFragment(Node::new(
                        ast::InlineFragment {
                            type_condition: Some(fragment.type_condition.clone()),
                            directives: self.directives(&spread.directives)?,
                            selection_set: selection_set?,
                        },
                    )));
                }
            }
        }
        Ok(simplified)
    }

    fn directives(&self, directives: &ast::DirectiveList) -> Result<ast::DirectiveList, CacheError> {
        directives
            .iter()
            .map(|directive| {
                let arguments = self.arguments(&directive.arguments)?;
                let mut directive = directive.clone();
                directive.make_mut().arguments = arguments;
                Ok(directive)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ast::DirectiveList)
    }

    fn arguments(
        &self,
        arguments: &[Node<ast::Argument>],
    ) -> Result<Vec<Node<ast::Argument>>, CacheError> {
        arguments
            .iter()
            .map(|argument| {
                let value = self.value(&argument.value)?;
                let mut argument = argument.clone();
                argument.make_mut().value = value;
                Ok(argument)
            })
            .collect()
    }

    fn value(&self, value: &Node<ast::Value>) -> Result<Node<ast::Value>, CacheError> {
        Ok(match &**value {
            ast::Value::Variable(name) => self.variable(name)?,
            ast::Value::List(items) => Node::new(ast::Value::List(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<_, _>>()?,
            )),
            ast::Value::Object(fields) => Node::new(ast::Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), self.value(value)?)))
                    .collect::<Result<_, CacheError>>()?,
            )),
            _ => value.clone(),
        })
    }

    fn variable(&self, name: &Name) -> Result<Node<ast::Value>, CacheError> {
        let Some(declaration) = self
            .declarations
            .iter()
            .find(|declaration| declaration.name == *name)
        else {
            return Err(CacheError::UndefinedVariable {
                name: name.to_string(),
            });
        };

        // an explicit null is no value at all
        if let Some(value) = self.variables.get(name.as_str())
            && !value.is_null()
        {
            return literal(name, value).map(Node::new);
        }
        match &declaration.default_value {
            Some(default_value) => Ok(default_value.clone()),
            None => Err(CacheError::MissingVariableValue {
                name: name.to_string(),
            }),
        }
    }
}

/// Converts a variable value into a literal with the same cache key form.
fn literal(variable: &Name, value: &Value) -> Result<ast::Value, CacheError> {
    Ok(match value {
        Value::Null => ast::Value::Null,
        Value::Bool(value) => ast::Value::String(value.to_string().into()),
        Value::Number(value) => ast::Value::String(value.to_string().into()),
        Value::String(value) => ast::Value::String(value.as_str().to_string().into()),
        Value::Array(items) => ast::Value::List(
            items
                .iter()
                .map(|item| literal(variable, item).map(Node::new))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(object) => ast::Value::Object(
            object
                .iter()
                .map(|(key, value)| {
                    let name = Name::new(key.as_str()).map_err(|_| {
                        CacheError::InvalidVariableValue {
                            name: variable.to_string(),
                            reason: format!("`{}` is not a valid input field name", key.as_str()),
                        }
                    })?;
                    Ok((name, Node::new(literal(variable, value)?)))
                })
                .collect::<Result<_, CacheError>>()?,
        ),
    })
}
