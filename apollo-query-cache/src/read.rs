//! Materializing a result from the cache alone.
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;

use crate::error::CacheError;
use crate::extension;
use crate::extension::Extension;
use crate::extension::Halt;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::cache_key;
use crate::spec::result_key;
use crate::spec::simplify;
use crate::spec::type_condition_applies;

/// The state of the read engine, as seen by extensions.
pub struct ReadContext<'c> {
    root: &'c Value,
    cache_stack: Vec<&'c Value>,
    result_stack: Vec<Object>,
}

impl<'c> ReadContext<'c> {
    fn new(root: &'c Value) -> Self {
        ReadContext {
            root,
            cache_stack: vec![root],
            result_stack: vec![Object::new()],
        }
    }

    /// The root of the cache.
    pub fn root(&self) -> &'c Value {
        self.root
    }

    /// The cached value currently being read.
    pub fn cache(&self) -> &'c Value {
        self.cache_stack.last().copied().unwrap_or(self.root)
    }

    /// Reads the rest of the current selection set from `value` instead.
    pub fn redirect(&mut self, value: &'c Value) {
        self.cache_stack.push(value);
    }

    /// The result object being built for the current selection set.
    pub fn result_mut(&mut self) -> Option<&mut Object> {
        self.result_stack.last_mut()
    }

    /// Takes the object already read under `key`, so that a field selected twice is read into
    /// the same result object.
    fn take_result_object(&mut self, key: &str) -> Object {
        match self
            .result_stack
            .last_mut()
            .and_then(|result| result.get_mut(key))
        {
            Some(Value::Object(existing)) => std::mem::replace(existing, Object::new()),
            _ => Object::new(),
        }
    }

    fn set_result(&mut self, key: &str, value: Value) {
        if let Some(result) = self.result_stack.last_mut() {
            result.insert(key, value);
        }
    }

    fn remove_result(&mut self, key: &str) {
        if let Some(result) = self.result_stack.last_mut() {
            result.remove(key);
        }
    }
}

/// Reads the result of `document` from `cache`.
///
/// Fields never fetched, and fields known to be empty, are `null` in the result. The cache is
/// not modified.
pub fn read(
    cache: &Value,
    document: &ast::Document,
    variables: &Object,
    extensions: &[Arc<dyn Extension>],
) -> Result<Value, CacheError> {
    let document = simplify(document, variables)?;
    let reader = Reader {
        variables,
        extensions,
    };

    let mut context = ReadContext::new(cache);
    for definition in &document.definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            reader.read_selection_set(&operation.selection_set, &mut context)?;
        }
    }

    let mut result = Value::Object(context.result_stack.pop().unwrap_or_else(Object::new));
    for extension in extensions {
        extension.read_after(&mut result);
    }
    Ok(result)
}

struct Reader<'a> {
    variables: &'a Object,
    extensions: &'a [Arc<dyn Extension>],
}

impl Reader<'_> {
    fn read_selection_set<'c>(
        &self,
        selections: &[ast::Selection],
        context: &mut ReadContext<'c>,
    ) -> Result<(), CacheError> {
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => self.read_field(field, context)?,
                ast::Selection::InlineFragment(inline_fragment) => {
                    if type_condition_applies(
                        inline_fragment.type_condition.as_ref(),
                        context.cache(),
                    ) {
                        self.read_selection_set(&inline_fragment.selection_set, context)?;
                    }
                }
                ast::Selection::FragmentSpread(_) => {}
            }
        }
        Ok(())
    }

    fn read_field<'c>(
        &self,
        field: &Node<ast::Field>,
        context: &mut ReadContext<'c>,
    ) -> Result<(), CacheError> {
        let key = cache_key(field, self.variables, &[])?;
        let result_key = result_key(field).as_str();

        let value = match context.cache().member(&key) {
            None | Some(Value::Null) => Value::Null,
            Some(value) if field.selection_set.is_empty() => value.clone(),
            Some(Value::Array(elements)) => Value::Array(self.read_list(field, elements, context)?),
            Some(cached @ Value::Object(_)) => {
                let into = context.take_result_object(result_key);
                match self.read_object(field, cached, into, context)? {
                    Some(object) => Value::Object(object),
                    None => {
                        context.remove_result(result_key);
                        return Ok(());
                    }
                }
            }
            // a scalar where an object was expected tells nothing about the selection
            Some(_) => Value::Null,
        };

        context.set_result(result_key, value);
        Ok(())
    }

    fn read_list<'c>(
        &self,
        field: &Node<ast::Field>,
        elements: &'c [Value],
        context: &mut ReadContext<'c>,
    ) -> Result<Vec<Value>, CacheError> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(match element {
                Value::Object(_) => self
                    .read_object(field, element, Object::new(), context)?
                    .map(Value::Object)
                    .unwrap_or(Value::Null),
                Value::Array(nested) => Value::Array(self.read_list(field, nested, context)?),
                _ => Value::Null,
            });
        }
        Ok(values)
    }

    /// Reads `cached` into `into`, or `None` when an extension deleted the object.
    fn read_object<'c>(
        &self,
        field: &Node<ast::Field>,
        cached: &'c Value,
        into: Object,
        context: &mut ReadContext<'c>,
    ) -> Result<Option<Object>, CacheError> {
        let depth = context.cache_stack.len();
        context.cache_stack.push(cached);
        context.result_stack.push(into);

        let enter = extension::run(self.extensions, field, |extension, field| {
            extension.read_enter_selection_set(field, context)
        });
        let deleted = match enter.halt {
            Some(Halt::Delete) => true,
            Some(Halt::Skip) => false,
            None => {
                self.read_selection_set(&enter.field.selection_set, context)?;
                let leave = extension::run(self.extensions, &enter.field, |extension, field| {
                    extension.read_leave_selection_set(field, context)
                });
                leave.halt == Some(Halt::Delete)
            }
        };

        context.cache_stack.truncate(depth);
        let object = context.result_stack.pop().unwrap_or_else(Object::new);
        Ok((!deleted).then_some(object))
    }
}
