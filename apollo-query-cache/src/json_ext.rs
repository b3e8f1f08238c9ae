//! JSON helpers for addressing values inside the cache.

use std::fmt;

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// A step from a JSON value to one of its children.
/// e.g `/user/friends/3`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PathElement {
    /// A member of an object.
    Key(String),

    /// An element of an array.
    Index(usize),
}

/// A path from the cache root to a nested value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Path(pub Vec<PathElement>);

pub(crate) static ROOT_PATH: Path = Path(Vec::new());

impl Path {
    /// The path of a top-level member of the cache.
    pub fn from_key(key: impl Into<String>) -> Self {
        Path(vec![PathElement::Key(key.into())])
    }

    /// A new path with `element` appended.
    pub fn join(&self, element: PathElement) -> Self {
        let mut elements = Vec::with_capacity(self.0.len() + 1);
        elements.extend_from_slice(&self.0);
        elements.push(element);
        Path(elements)
    }

    /// The elements, from the root of the cache.
    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// The path without its last element, and that element.
    pub(crate) fn split_last(&self) -> Option<(Path, &PathElement)> {
        let (last, parent) = self.0.split_last()?;
        Some((Path(parent.to_vec()), last))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for element in self.iter() {
            match element {
                PathElement::Key(key) => write!(f, "/{key}")?,
                PathElement::Index(index) => write!(f, "/{index}")?,
            }
        }
        Ok(())
    }
}

pub(crate) trait ValueExt {
    /// The value at `path`, if every step exists.
    fn get_path(&self, path: &Path) -> Option<&Value>;

    /// Mutable access to the value at `path`, if every step exists.
    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value>;

    /// The member `key` of this value when it is an object.
    fn member(&self, key: &str) -> Option<&Value>;
}

impl ValueExt for Value {
    fn get_path(&self, path: &Path) -> Option<&Value> {
        path.iter()
            .try_fold(self, |current, element| match (current, element) {
                (Value::Object(object), PathElement::Key(key)) => object.get(key.as_str()),
                (Value::Array(array), PathElement::Index(index)) => array.get(*index),
                _ => None,
            })
    }

    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value> {
        path.iter()
            .try_fold(self, |current, element| match (current, element) {
                (Value::Object(object), PathElement::Key(key)) => object.get_mut(key.as_str()),
                (Value::Array(array), PathElement::Index(index)) => array.get_mut(*index),
                _ => None,
            })
    }

    fn member(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }
}
