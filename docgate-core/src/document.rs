//! Ordered documents and arrays.
//!
//! A [`Document`] keeps its key list and its key-to-value map in 1:1 correspondence.
//! Key order is insertion order and is significant: wire replies and storage writes
//! follow it. [`Document::map`] is an unordered snapshot for lookups only.
//!
//! An [`Array`] is a 0-indexed heterogeneous list whose accessors are bounds-checked and
//! report [`GatewayError::IndexOutOfBounds`] instead of clamping.

use std::collections::{HashMap, hash_map::Entry};

use crate::{
    compare::values_equal,
    error::{GatewayError, GatewayResult},
    value::Value,
};

/// Key reserved by the storage JSON encoding.
pub const RESERVED_KEY: &str = "$k";

/// Builds a [`Document`] from `key => value` pairs.
///
/// Panics if a literal key is invalid (empty, `$k`, or containing a NUL byte).
///
/// ```ignore
/// let doc = document! { "_id" => 1, "name" => "Alice" };
/// ```
#[macro_export]
macro_rules! document {
    () => {
        $crate::document::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut doc = $crate::document::Document::new();
        $(
            doc.set($key, $value).expect("invalid key in document! literal");
        )+
        doc
    }};
}

/// Builds an [`Array`] from values convertible into [`Value`].
#[macro_export]
macro_rules! array {
    () => {
        $crate::document::Array::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::document::Array::from(vec![$($crate::value::Value::from($value)),+])
    };
}

/// An ordered mapping from unique string keys to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    keys: Vec<String>,
    fields: HashMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            fields: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns an unordered view for constant-time lookups.
    ///
    /// Do not use it where order matters (replies, storage writes).
    pub fn map(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the first key, which names the command in a command document.
    pub fn first_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }

    /// Returns the value for `key`, or [`GatewayError::KeyNotFound`].
    pub fn get(&self, key: &str) -> GatewayResult<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| GatewayError::KeyNotFound(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> GatewayResult<&mut Value> {
        self.fields
            .get_mut(key)
            .ok_or_else(|| GatewayError::KeyNotFound(key.to_string()))
    }

    /// Sets `key` to `value`.
    ///
    /// A new key is appended; an existing key keeps its position. Fails with
    /// [`GatewayError::InvalidKey`] for empty keys, keys containing NUL, and the
    /// reserved storage token.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> GatewayResult<()> {
        let key = key.into();
        validate_key(&key)?;

        match self.fields.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(value.into());
            }
            Entry::Vacant(entry) => {
                self.keys.push(entry.key().clone());
                entry.insert(value.into());
            }
        }

        Ok(())
    }

    /// Removes `key`, returning its value. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let value = self.fields.remove(key)?;
        self.keys.retain(|k| k != key);
        Some(value)
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys.iter().map(|k| (k.as_str(), &self.fields[k]))
    }

    /// Resolves a dotted path, descending into documents by key and arrays by index.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.fields.get(segment)?,
                Value::Array(arr) => arr.0.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Sets a value at a dotted path, creating intermediate documents as needed.
    ///
    /// Array levels are addressed by index and must already contain that index.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> GatewayResult<()> {
        let segments = path.split('.').collect::<Vec<_>>();
        set_in_document(self, &segments, value.into())
    }

    /// Unsets a dotted path: document fields are removed, array elements become null.
    ///
    /// Missing intermediate levels make this a no-op.
    pub fn unset_path(&mut self, path: &str) {
        let segments = path.split('.').collect::<Vec<_>>();
        unset_in_document(self, &segments);
    }
}

fn validate_key(key: &str) -> GatewayResult<()> {
    if key.is_empty() || key == RESERVED_KEY || key.contains('\0') {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }

    Ok(())
}

fn set_in_document(doc: &mut Document, segments: &[&str], value: Value) -> GatewayResult<()> {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Err(GatewayError::BadValue("empty field path".into())),
    };

    if rest.is_empty() {
        return doc.set(*head, value);
    }

    if !doc.contains_key(head) {
        doc.set(*head, Document::new())?;
    }

    set_in_value(doc.get_mut(head)?, rest, value)
}

fn set_in_value(target: &mut Value, segments: &[&str], value: Value) -> GatewayResult<()> {
    match target {
        Value::Document(doc) => set_in_document(doc, segments, value),
        Value::Array(arr) => {
            let (head, rest) = segments
                .split_first()
                .ok_or_else(|| GatewayError::BadValue("empty field path".into()))?;
            let index = head.parse::<usize>().map_err(|_| {
                GatewayError::BadValue(format!("cannot create field '{head}' in an array"))
            })?;

            if rest.is_empty() {
                arr.set(index, value)
            } else {
                set_in_value(arr.get_mut(index)?, rest, value)
            }
        }
        other => Err(GatewayError::BadValue(format!(
            "cannot create field '{}' in element of type {}",
            segments.first().copied().unwrap_or_default(),
            other.type_name()
        ))),
    }
}

fn unset_in_document(doc: &mut Document, segments: &[&str]) {
    match segments {
        [] => {}
        [last] => {
            doc.remove(last);
        }
        [head, rest @ ..] => {
            if let Some(next) = doc.fields.get_mut(*head) {
                unset_in_value(next, rest);
            }
        }
    }
}

fn unset_in_value(target: &mut Value, segments: &[&str]) {
    match target {
        Value::Document(doc) => unset_in_document(doc, segments),
        Value::Array(arr) => {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            let Ok(index) = head.parse::<usize>() else {
                return;
            };

            if rest.is_empty() {
                let _ = arr.set(index, Value::Null);
            } else if let Ok(next) = arr.get_mut(index) {
                unset_in_value(next, rest);
            }
        }
        _ => {}
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        let Document { keys, mut fields } = self;

        keys.into_iter()
            .filter_map(|k| fields.remove(&k).map(|v| (k, v)))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// An ordered, 0-indexed list of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array(Vec<Value>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> GatewayResult<&Value> {
        let len = self.0.len();
        self.0
            .get(index)
            .ok_or(GatewayError::IndexOutOfBounds { index, len })
    }

    pub fn get_mut(&mut self, index: usize) -> GatewayResult<&mut Value> {
        let len = self.0.len();
        self.0
            .get_mut(index)
            .ok_or(GatewayError::IndexOutOfBounds { index, len })
    }

    /// Replaces the element at `index`.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> GatewayResult<()> {
        *self.get_mut(index)? = value.into();
        Ok(())
    }

    pub fn append(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    /// Removes and returns the element at `index`, shifting later elements down.
    pub fn delete(&mut self, index: usize) -> GatewayResult<Value> {
        if index >= self.0.len() {
            return Err(GatewayError::IndexOutOfBounds { index, len: self.0.len() });
        }

        Ok(self.0.remove(index))
    }

    /// Returns a copy of `start..end`. Both bounds must lie within `0..=len` and `start <= end`.
    pub fn subslice(&self, start: usize, end: usize) -> GatewayResult<Array> {
        let len = self.0.len();

        if end > len {
            return Err(GatewayError::IndexOutOfBounds { index: end, len });
        }
        if start > end {
            return Err(GatewayError::IndexOutOfBounds { index: start, len });
        }

        Ok(Array(self.0[start..end].to_vec()))
    }

    /// Reports whether any element compares equal to `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.0.iter().any(|item| values_equal(item, value))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Value> {
        self.0.iter_mut()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Array {
    fn from(values: Vec<Value>) -> Self {
        Array(values)
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Array(iter.into_iter().collect())
    }
}

impl IntoIterator for Array {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
