//! Recovering the schema of an AST by walking it.
//!
//! The codec does not ship a grammar: every file carries its own, inferred
//! from the tree being encoded. A grammar maps each node kind to the sorted
//! list of its property names; all instances of a kind must agree on that
//! list, which lets the decoder rebuild nodes from a delimiter-free
//! preorder stream.

use crate::{TokenReaderError, TokenWriterError};

use treezip_shared::{FieldName, InterfaceName, Value};

use itertools::Itertools;

use std::collections::HashMap;

/// The discriminator property, implicit in every serialized node.
const RESERVED_TYPE_FIELD: &str = "type";

/// An ordered mapping from node kind to sorted property names.
///
/// Insertion order is preserved and becomes the canonical index order
/// used by the symbol code space.
#[derive(Debug, Default)]
pub struct Grammar {
    kinds: Vec<(InterfaceName, Vec<FieldName>)>,
    by_name: HashMap<InterfaceName, usize>,
}

impl Grammar {
    /// Infer the grammar of `root` by walking the entire tree.
    pub fn recover(root: &Value) -> Result<Self, TokenWriterError> {
        let mut grammar = Grammar::default();
        grammar.walk(root)?;
        debug!(target: "grammar", "Recovered {} kinds", grammar.len());
        Ok(grammar)
    }

    fn walk(&mut self, value: &Value) -> Result<(), TokenWriterError> {
        match *value {
            Value::Null | Value::Absent | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                Ok(())
            }
            Value::List(ref items) => {
                // Lists are not schematized, only traversed.
                for item in items {
                    self.walk(item)?;
                }
                Ok(())
            }
            Value::Node(ref node) => {
                let mut properties: Vec<FieldName> = node
                    .properties()
                    .map(|(name, _)| name.clone())
                    .filter(|name| name.as_str() != RESERVED_TYPE_FIELD)
                    .collect();
                properties.sort();

                match self.by_name.get(node.kind()) {
                    None => {
                        debug!(target: "grammar", "New kind {} with properties [{}]",
                            node.kind(),
                            properties.iter().map(FieldName::as_str).format(", "));
                        self.by_name
                            .insert(node.kind().clone(), self.kinds.len());
                        self.kinds.push((node.kind().clone(), properties.clone()));
                    }
                    Some(index) => {
                        let (_, ref expected) = self.kinds[*index];
                        if *expected != properties {
                            return Err(TokenWriterError::InconsistentShape {
                                kind: node.kind().clone(),
                                expected: expected.iter().map(|f| f.as_str().to_string()).collect(),
                                actual: properties
                                    .iter()
                                    .map(|f| f.as_str().to_string())
                                    .collect(),
                            });
                        }
                    }
                }

                // Descend in canonical (sorted) property order.
                let index = self.by_name[node.kind()];
                for property in &self.kinds[index].1.clone() {
                    let child = node
                        .property(property.as_str())
                        .expect("Property checked during installation");
                    self.walk(child)?;
                }
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// The canonical index of `kind` and its sorted property list.
    pub fn get(&self, kind: &InterfaceName) -> Option<(usize, &[FieldName])> {
        self.by_name
            .get(kind)
            .map(|index| (*index, self.kinds[*index].1.as_slice()))
    }

    /// The kind at canonical index `index`.
    pub fn kind_at(&self, index: usize) -> Option<(&InterfaceName, &[FieldName])> {
        self.kinds
            .get(index)
            .map(|(name, properties)| (name, properties.as_slice()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = (&InterfaceName, &[FieldName])> {
        self.kinds
            .iter()
            .map(|(name, properties)| (name, properties.as_slice()))
    }

    /// Serialize as a canonical JSON object mapping kind to property list,
    /// in insertion order.
    // TODO: encode in a better order (the JSON header is provisional; the
    // wire format pins it for interoperability).
    pub fn to_json_bytes(&self) -> Vec<u8> {
        let mut map = serde_json::Map::with_capacity(self.kinds.len());
        for (name, properties) in &self.kinds {
            let fields = properties
                .iter()
                .map(|field| serde_json::Value::String(field.as_str().to_string()))
                .collect();
            map.insert(
                name.as_str().to_string(),
                serde_json::Value::Array(fields),
            );
        }
        serde_json::to_vec(&serde_json::Value::Object(map))
            .expect("Serializing a string map to JSON cannot fail")
    }

    /// Parse the JSON header written by `to_json_bytes`.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, TokenReaderError> {
        let parsed: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|error| TokenReaderError::BadHeader(error.to_string()))?;
        let object = match parsed {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(TokenReaderError::BadHeader(format!(
                    "Expected a JSON object, got {}",
                    other
                )));
            }
        };
        let mut grammar = Grammar::default();
        for (kind, fields) in object {
            let fields = match fields {
                serde_json::Value::Array(fields) => fields,
                other => {
                    return Err(TokenReaderError::BadHeader(format!(
                        "Expected a property list for kind {}, got {}",
                        kind, other
                    )));
                }
            };
            let mut properties = Vec::with_capacity(fields.len());
            for field in fields {
                match field {
                    serde_json::Value::String(field) => {
                        properties.push(FieldName::from_string(field))
                    }
                    other => {
                        return Err(TokenReaderError::BadHeader(format!(
                            "Expected a property name for kind {}, got {}",
                            kind, other
                        )));
                    }
                }
            }
            let name = InterfaceName::from_string(kind);
            grammar.by_name.insert(name.clone(), grammar.kinds.len());
            grammar.kinds.push((name, properties));
        }
        Ok(grammar)
    }
}
