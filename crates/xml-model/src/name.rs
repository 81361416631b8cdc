//! Qualified names, attributes and element snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace URI bound to `xmlns` declarations
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Type of XML node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Document node
    Document,
    /// Element node
    Element,
    /// Text node
    Text,
}

/// A namespace-resolved name.
///
/// Equality of two names for matching purposes is `(namespace, local)`; the
/// prefix is only carried so the name can be written back out as it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI, `None` when the name is not in a namespace
    pub namespace: Option<String>,
    /// Local part of the name
    pub local: String,
    /// Prefix as written in the source
    pub prefix: Option<String>,
}

impl QName {
    /// Create a name with no namespace
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
            prefix: None,
        }
    }

    /// Create a namespaced name with an optional prefix
    pub fn namespaced(
        namespace: impl Into<String>,
        local: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
            prefix,
        }
    }

    /// The name as written in markup (`prefix:local` or `local`)
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    /// Compare namespace and local part, ignoring the prefix
    pub fn same_name(&self, other: &QName) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }

    /// True for `xmlns` and `xmlns:*` declarations
    pub fn is_namespace_declaration(&self) -> bool {
        self.namespace.as_deref() == Some(XMLNS_NAMESPACE)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A single attribute of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// An element's name and attributes.
///
/// This is what a streaming pass knows about an element at its start event, and
/// what a tree node stores for an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
}

impl Element {
    /// Create an element with no attributes
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
        }
    }

    /// Local name of the element
    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    /// Namespace URI of the element
    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace.as_deref()
    }

    /// Value of an attribute that is not in a namespace
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attribute_ns(None, local)
    }

    /// Value of an attribute with the given namespace and local name
    pub fn attribute_ns(&self, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local == local && a.name.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    /// Set (or add) an attribute that is not in a namespace
    pub fn set_attribute(&mut self, local: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.local == local && a.name.namespace.is_none())
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute::new(QName::local(local), value)),
        }
    }

    /// Remove an attribute that is not in a namespace, returning its value
    pub fn remove_attribute(&mut self, local: &str) -> Option<String> {
        let position = self
            .attributes
            .iter()
            .position(|a| a.name.local == local && a.name.namespace.is_none())?;
        Some(self.attributes.remove(position).value)
    }
}
