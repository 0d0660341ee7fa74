//! Resolved node values
//!
//! Reading a node flattens its subtree into a [`NodeValue`]: numbers from value
//! nodes, strings from interpolations and transform lists, and maps from pairs,
//! styles, and props.

use std::fmt;

use indexmap::IndexMap;

/// A flattened value produced by reading a node
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    Number(f64),
    Text(String),
    Bool(bool),
    List(Vec<NodeValue>),
    Map(IndexMap<String, NodeValue>),
}

impl NodeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            NodeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, NodeValue>> {
        match self {
            NodeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a map value
    pub fn get(&self, key: &str) -> Option<&NodeValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Short name of the variant, used in type-mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            NodeValue::Number(_) => "number",
            NodeValue::Text(_) => "string",
            NodeValue::Bool(_) => "bool",
            NodeValue::List(_) => "list",
            NodeValue::Map(_) => "map",
        }
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        NodeValue::Number(value)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::Text(value.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        NodeValue::Text(value)
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        NodeValue::Bool(value)
    }
}

/// Renders the value the way it appears inside style strings
impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Number(n) => f.write_str(&format_number(*n)),
            NodeValue::Text(s) => f.write_str(s),
            NodeValue::Bool(b) => write!(f, "{b}"),
            NodeValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            NodeValue::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Format a number without a trailing `.0` and without negative zero
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}
