//! The dynamic AST value model consumed by the codec.
//!
//! The codec does not commit to a specific EcmaScript grammar revision.
//! Instead, it manipulates untyped nodes (a kind name plus named properties)
//! and recovers the per-file schema by walking the tree. This module defines
//! the value algebra shared by the encoder and the decoder.

use crate::{FieldName, InterfaceName, SharedString, F64};

use itertools::Itertools;

/// A value in the AST.
///
/// `Absent` is distinct from `Null`: `Null` is the JavaScript `null` literal,
/// while `Absent` marks a property slot the producer left out entirely
/// (e.g. an optional node).
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Absent,
    Bool(bool),
    Number(F64),
    String(SharedString),
    List(Vec<Value>),
    Node(Box<Node>),
}

impl Value {
    /// A short name for the class of this value, used in diagnostics.
    pub fn class_name(&self) -> &'static str {
        match *self {
            Value::Null => "null",
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Node(_) => "node",
        }
    }

    pub fn float(value: f64) -> Self {
        Value::Number(F64::from(value))
    }

    pub fn string(value: &'static str) -> Self {
        Value::String(SharedString::from_str(value))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match *self {
            Value::Node(ref node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match *self {
            Value::List(ref items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Value {
        Value::Bool(value)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Value {
        Value::Number(F64::from(value))
    }
}
impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::String(SharedString::from_string(value))
    }
}
impl From<Node> for Value {
    fn from(value: Node) -> Value {
        Value::Node(Box::new(value))
    }
}
impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::List(value)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match *self {
            Value::Null => write!(f, "null"),
            Value::Absent => write!(f, "absent"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{:?}", n),
            Value::String(ref s) => write!(f, "{:?}", s.as_str()),
            Value::List(ref items) => write!(f, "[{:?}]", items.iter().format(", ")),
            Value::Node(ref node) => node.fmt(f),
        }
    }
}

/// A typed AST node: a kind name and named properties.
///
/// Property order is whatever the producer used; structural equality
/// treats properties as an unordered map, since the decoder rebuilds
/// them in grammar order.
#[derive(Clone)]
pub struct Node {
    kind: InterfaceName,
    properties: Vec<(FieldName, Value)>,
}

impl Node {
    pub fn new(kind: InterfaceName) -> Self {
        Node {
            kind,
            properties: vec![],
        }
    }

    pub fn named(kind: &'static str) -> Self {
        Self::new(InterfaceName::from_str(kind))
    }

    pub fn kind(&self) -> &InterfaceName {
        &self.kind
    }

    /// Add or overwrite a property.
    pub fn set(&mut self, name: FieldName, value: Value) {
        if let Some(slot) = self
            .properties
            .iter_mut()
            .find(|(existing, _)| *existing == name)
        {
            slot.1 = value;
            return;
        }
        self.properties.push((name, value));
    }

    /// Builder-style variant of `set`.
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.set(FieldName::from_str(name), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(existing, _)| existing.as_str() == name)
            .map(|(_, value)| value)
    }

    pub fn properties(&self) -> impl Iterator<Item = &(FieldName, Value)> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind || self.properties.len() != other.properties.len() {
            return false;
        }
        self.properties
            .iter()
            .all(|(name, value)| other.property(name.as_str()) == Some(value))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{} {{ {} }}",
            self.kind,
            self.properties
                .iter()
                .map(|(name, value)| format!("{}: {:?}", name, value))
                .format(", ")
        )
    }
}
