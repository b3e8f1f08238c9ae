//! Folding a server result into the cache.
use std::sync::Arc;

use apollo_compiler::Node;
use apollo_compiler::ast;
use serde_json_bytes::ByteString;

use crate::error::CacheError;
use crate::extension;
use crate::extension::Extension;
use crate::extension::Halt;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::ROOT_PATH;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::cache_key;
use crate::spec::result_key;
use crate::spec::simplify;

static NULL: Value = Value::Null;

/// The state of the merge engine, as seen by extensions.
///
/// Two stacks move together while the result is walked: the position in the cache being
/// written, and the result value being read. Extensions may push a different cache position
/// with [`MergeContext::redirect`]; the engine pops back to where it was once the selection set
/// is done.
pub struct MergeContext<'r> {
    cache: Value,
    cache_stack: Vec<Path>,
    result_stack: Vec<&'r Value>,
    written: Vec<Vec<String>>,
}

impl<'r> MergeContext<'r> {
    fn new(cache: Value, result: &'r Value) -> Self {
        MergeContext {
            cache,
            cache_stack: vec![Path::default()],
            result_stack: vec![result],
            written: vec![Vec::new()],
        }
    }

    /// The result value currently being merged.
    pub fn result(&self) -> &'r Value {
        self.result_stack.last().copied().unwrap_or(&NULL)
    }

    /// The root of the cache being built.
    pub fn cache(&self) -> &Value {
        &self.cache
    }

    /// Where the engine currently writes, from the cache root.
    pub fn cache_path(&self) -> &Path {
        self.cache_stack.last().unwrap_or(&ROOT_PATH)
    }

    /// The object the engine currently writes into.
    pub fn current(&self) -> Option<&Object> {
        self.cache.get_path(self.cache_path()).and_then(Value::as_object)
    }

    /// Mutable access to the object the engine currently writes into.
    pub fn current_mut(&mut self) -> Option<&mut Object> {
        current_object(&mut self.cache, &self.cache_stack)
    }

    /// Sends the writes of the current selection set to `path` instead.
    pub fn redirect(&mut self, path: Path) {
        tracing::trace!(from = %self.cache_path(), to = %path, "redirecting cache writes");
        self.cache_stack.push(path);
    }

    /// The top-level object stored under `key`, created if needed.
    ///
    /// A value of another shape under `key` is replaced with an empty object.
    pub fn top_level_object_mut(&mut self, key: &str) -> Option<&mut Object> {
        let root = self.cache.as_object_mut()?;
        let slot = root
            .entry(key)
            .or_insert_with(|| Value::Object(Object::new()));
        if !slot.is_object() {
            *slot = Value::Object(Object::new());
        }
        slot.as_object_mut()
    }

    /// The cache keys written so far in the current selection set.
    pub fn written_keys(&self) -> &[String] {
        self.written.last().map(Vec::as_slice).unwrap_or_default()
    }

    fn write(&mut self, key: &str, value: Value) {
        let Some(object) = current_object(&mut self.cache, &self.cache_stack) else {
            return;
        };
        object.insert(ByteString::from(key), value);
        if let Some(written) = self.written.last_mut() {
            written.push(key.to_string());
        }
    }

    /// Makes sure `key` of the current object holds an object, keeping a cached one.
    fn ensure_object(&mut self, key: &str) {
        let Some(object) = current_object(&mut self.cache, &self.cache_stack) else {
            return;
        };
        if !object.get(key).is_some_and(Value::is_object) {
            object.insert(ByteString::from(key), Value::Object(Object::new()));
        }
        if let Some(written) = self.written.last_mut() {
            written.push(key.to_string());
        }
    }

    fn push_element(&mut self, array: &Path, value: Value) {
        if let Some(Value::Array(elements)) = self.cache.get_path_mut(array) {
            elements.push(value);
        }
    }

    /// Removes the value at `path`, which belongs to the selection set being left.
    fn remove(&mut self, path: &Path) {
        let Some((parent, last)) = path.split_last() else {
            return;
        };
        if let PathElement::Key(key) = last {
            let owner = self.written.len().checked_sub(2);
            if let Some(written) = owner.and_then(|owner| self.written.get_mut(owner)) {
                written.retain(|written| written != key);
            }
        }
        match (self.cache.get_path_mut(&parent), last) {
            (Some(Value::Object(object)), PathElement::Key(key)) => {
                object.remove(key.as_str());
            }
            (Some(Value::Array(elements)), PathElement::Index(index)) => {
                if let Some(element) = elements.get_mut(*index) {
                    *element = Value::Null;
                }
            }
            _ => {}
        }
    }
}

fn current_object<'c>(cache: &'c mut Value, cache_stack: &[Path]) -> Option<&'c mut Object> {
    cache
        .get_path_mut(cache_stack.last().unwrap_or(&ROOT_PATH))
        .and_then(Value::as_object_mut)
}

/// Merges `result`, the response to `document`, into a copy of `previous`.
///
/// Neither `previous` nor `result` is modified. Lists are replaced wholesale, objects are
/// merged member by member, and a member missing from the result leaves the cache as it was.
pub fn merge(
    previous: &Value,
    document: &ast::Document,
    result: &Value,
    variables: &Object,
    extensions: &[Arc<dyn Extension>],
) -> Result<Value, CacheError> {
    let document = simplify(document, variables)?;
    let cache = match previous {
        Value::Object(_) => previous.clone(),
        _ => Value::Object(Object::new()),
    };

    let merger = Merger {
        variables,
        extensions,
    };
    let mut context = MergeContext::new(cache, result);
    for definition in &document.definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            merger.merge_selection_set(&operation.selection_set, &mut context)?;
        }
    }

    let mut cache = context.cache;
    for extension in extensions {
        extension.merge_after(&mut cache);
    }
    tracing::debug!(
        written = context.written.first().map(Vec::len).unwrap_or_default(),
        "merged result into cache"
    );
    Ok(cache)
}

struct Merger<'a> {
    variables: &'a Object,
    extensions: &'a [Arc<dyn Extension>],
}

impl Merger<'_> {
    fn merge_selection_set<'r>(
        &self,
        selections: &[ast::Selection],
        context: &mut MergeContext<'r>,
    ) -> Result<(), CacheError> {
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => self.merge_field(field, context)?,
                ast::Selection::InlineFragment(inline_fragment) => {
                    self.merge_selection_set(&inline_fragment.selection_set, context)?
                }
                // spreads were inlined by the simplifier
                ast::Selection::FragmentSpread(_) => {}
            }
        }
        Ok(())
    }

    fn merge_field<'r>(
        &self,
        field: &Node<ast::Field>,
        context: &mut MergeContext<'r>,
    ) -> Result<(), CacheError> {
        let key = cache_key(field, self.variables, &[])?;
        let Some(value) = context.result().member(result_key(field).as_str()) else {
            return Ok(());
        };

        if field.selection_set.is_empty() {
            context.write(&key, value.clone());
            return Ok(());
        }

        match value {
            Value::Array(elements) => {
                context.write(&key, Value::Array(Vec::with_capacity(elements.len())));
                let path = context.cache_path().join(PathElement::Key(key));
                self.merge_list(field, elements, &path, context)
            }
            Value::Object(_) => {
                context.ensure_object(&key);
                let path = context.cache_path().join(PathElement::Key(key));
                self.merge_object(field, value, path, context)
            }
            // null, or a scalar where an object was expected
            other => {
                context.write(&key, other.clone());
                Ok(())
            }
        }
    }

    fn merge_list<'r>(
        &self,
        field: &Node<ast::Field>,
        elements: &'r [Value],
        path: &Path,
        context: &mut MergeContext<'r>,
    ) -> Result<(), CacheError> {
        for (index, element) in elements.iter().enumerate() {
            let element_path = path.join(PathElement::Index(index));
            match element {
                Value::Object(_) => {
                    context.push_element(path, Value::Object(Object::new()));
                    self.merge_object(field, element, element_path, context)?;
                }
                Value::Array(nested) => {
                    context.push_element(path, Value::Array(Vec::with_capacity(nested.len())));
                    self.merge_list(field, nested, &element_path, context)?;
                }
                other => context.push_element(path, other.clone()),
            }
        }
        Ok(())
    }

    fn merge_object<'r>(
        &self,
        field: &Node<ast::Field>,
        result: &'r Value,
        path: Path,
        context: &mut MergeContext<'r>,
    ) -> Result<(), CacheError> {
        let depth = context.cache_stack.len();
        context.cache_stack.push(path.clone());
        context.result_stack.push(result);
        context.written.push(Vec::new());

        let enter = extension::run(self.extensions, field, |extension, field| {
            extension.merge_enter_selection_set(field, context)
        });
        match enter.halt {
            Some(Halt::Delete) => context.remove(&path),
            Some(Halt::Skip) => {}
            None => {
                self.merge_selection_set(&enter.field.selection_set, context)?;
                let leave = extension::run(self.extensions, &enter.field, |extension, field| {
                    extension.merge_leave_selection_set(field, context)
                });
                if leave.halt == Some(Halt::Delete) {
                    context.remove(&path);
                }
            }
        }

        context.cache_stack.truncate(depth);
        context.result_stack.pop();
        context.written.pop();
        Ok(())
    }
}
