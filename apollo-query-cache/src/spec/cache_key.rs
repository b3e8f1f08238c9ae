use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use serde_json::Value as JsonValue;

use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// The key a field's value is stored under in the cache.
///
/// A field without arguments is stored under its name. Otherwise the key is the name, a `|`
/// and a JSON object holding one member per argument, in the order the arguments are written.
/// Argument values are canonicalized so that the same value always yields the same key,
/// whether it was written as a literal or passed through a variable: scalars become strings,
/// `null` stays `null`, lists and input objects keep their shape.
///
/// Variables are looked up in `variables` first, then in the default values of
/// `declarations`. A variable set to `null` counts as not set. The alias never takes part in the key.
pub fn cache_key(
    field: &ast::Field,
    variables: &Object,
    declarations: &[Node<ast::VariableDefinition>],
) -> Result<String, CacheError> {
    if field.arguments.is_empty() {
        return Ok(field.name.to_string());
    }

    let mut arguments = serde_json::Map::with_capacity(field.arguments.len());
    for argument in &field.arguments {
        arguments.insert(
            argument.name.to_string(),
            canonical_literal(&argument.value, variables, declarations)?,
        );
    }
    Ok(format!("{}|{}", field.name, JsonValue::Object(arguments)))
}

/// The key a field's value is returned under in a result: its alias, or its name.
pub fn result_key(field: &ast::Field) -> &Name {
    field.alias.as_ref().unwrap_or(&field.name)
}

fn canonical_literal(
    value: &ast::Value,
    variables: &Object,
    declarations: &[Node<ast::VariableDefinition>],
) -> Result<JsonValue, CacheError> {
    Ok(match value {
        ast::Value::Null => JsonValue::Null,
        ast::Value::Enum(name) => JsonValue::String(name.to_string()),
        ast::Value::Variable(name) => return resolve_variable(name, variables, declarations),
        ast::Value::String(value) => JsonValue::String(value.to_string()),
        ast::Value::Float(value) => JsonValue::String(value.as_str().to_string()),
        ast::Value::Int(value) => JsonValue::String(value.as_str().to_string()),
        ast::Value::Boolean(value) => JsonValue::String(value.to_string()),
        ast::Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| canonical_literal(item, variables, declarations))
                .collect::<Result<_, _>>()?,
        ),
        ast::Value::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    Ok((
                        name.to_string(),
                        canonical_literal(value, variables, declarations)?,
                    ))
                })
                .collect::<Result<_, CacheError>>()?,
        ),
    })
}

fn resolve_variable(
    name: &Name,
    variables: &Object,
    declarations: &[Node<ast::VariableDefinition>],
) -> Result<JsonValue, CacheError> {
    if let Some(value) = variables.get(name.as_str())
        && !value.is_null()
    {
        return Ok(canonical_json(value));
    }

    let default_value = declarations
        .iter()
        .find(|declaration| declaration.name == *name)
        .and_then(|declaration| declaration.default_value.as_ref());
    match default_value {
        // default values are constants, they cannot reference other variables
        Some(default_value) => canonical_literal(default_value, &Object::new(), &[]),
        None => Err(CacheError::UnresolvedVariable {
            name: name.to_string(),
        }),
    }
}

fn canonical_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(value) => JsonValue::String(value.to_string()),
        Value::Number(value) => JsonValue::String(value.to_string()),
        Value::String(value) => JsonValue::String(value.as_str().to_string()),
        Value::Array(items) => JsonValue::Array(items.iter().map(canonical_json).collect()),
        Value::Object(object) => JsonValue::Object(
            object
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), canonical_json(value)))
                .collect(),
        ),
    }
}
