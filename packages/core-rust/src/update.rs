//! Partial document updates.
//!
//! An [`Update`] is an ordered list of field operations applied to a
//! [`Document`] in place. Operations address fields with dotted paths;
//! missing intermediate maps are created on demand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Document, Value};

/// A single field mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Overwrite the field at `path` with `value`.
    Set { path: String, value: Value },
    /// Add `by` to the integer at `path`. An absent field counts as 0.
    Inc { path: String, by: i64 },
}

/// Errors from applying an [`Update`] to a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("empty field path")]
    EmptyPath,
    #[error("field `{segment}` in path `{path}` is not a map")]
    NotAMap { path: String, segment: String },
    #[error("cannot increment non-integer field `{path}`")]
    NotAnInteger { path: String },
    #[error("increment of `{path}` overflows")]
    Overflow { path: String },
}

/// Ordered set of field mutations, applied atomically per document by the
/// storage engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `Set` operation.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Appends an `Inc` operation.
    #[must_use]
    pub fn inc(mut self, path: impl Into<String>, by: i64) -> Self {
        self.ops.push(UpdateOp::Inc {
            path: path.into(),
            by,
        });
        self
    }

    /// Operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Document {
    /// Applies every operation of `update` in order.
    ///
    /// On error the document may be partially modified; storage engines
    /// apply updates to a scratch copy and only commit on success.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError`] if a path is empty, traverses a non-map
    /// value, or increments a non-integer.
    pub fn apply(&mut self, update: &Update) -> Result<(), UpdateError> {
        for op in update.ops() {
            match op {
                UpdateOp::Set { path, value } => {
                    let (parent, leaf) = resolve_parent(&mut self.fields, path)?;
                    parent.insert(leaf.to_string(), value.clone());
                }
                UpdateOp::Inc { path, by } => {
                    let (parent, leaf) = resolve_parent(&mut self.fields, path)?;
                    let current = match parent.get(leaf) {
                        None | Some(Value::Null) => 0,
                        Some(Value::Int(i)) => *i,
                        Some(_) => return Err(UpdateError::NotAnInteger { path: path.clone() }),
                    };
                    let next = current
                        .checked_add(*by)
                        .ok_or_else(|| UpdateError::Overflow { path: path.clone() })?;
                    parent.insert(leaf.to_string(), Value::Int(next));
                }
            }
        }
        Ok(())
    }
}

/// Walks `path` down to the map that owns its last segment, creating
/// intermediate maps as needed.
fn resolve_parent<'a, 'p>(
    root: &'a mut BTreeMap<String, Value>,
    path: &'p str,
) -> Result<(&'a mut BTreeMap<String, Value>, &'p str), UpdateError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().filter(|s| !s.is_empty()).ok_or(UpdateError::EmptyPath)?;

    let mut current = root;
    for segment in segments {
        if segment.is_empty() {
            return Err(UpdateError::EmptyPath);
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if matches!(entry, Value::Null) {
            *entry = Value::Map(BTreeMap::new());
        }
        current = match entry {
            Value::Map(map) => map,
            _ => {
                return Err(UpdateError::NotAMap {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };
    }
    Ok((current, leaf))
}
