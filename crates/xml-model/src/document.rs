//! Arena-backed, mutable XML tree

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::event::{EventReader, SourceEvent};
use crate::name::{Element, NodeType, QName};
use crate::serialize::{ContentEvent, XmlSerializer};

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
enum NodeKind {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A fully materialized document.
///
/// Nodes are never deallocated; detaching a node only unlinks it from its
/// parent. Each node can carry typed user data, which is how per-node state
/// survives across independent passes over the same document.
pub struct Document {
    nodes: Vec<NodeData>,
    user_data: HashMap<NodeId, Box<dyn Any + Send + Sync>>,
}

impl Document {
    /// Create an empty document containing only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            user_data: HashMap::new(),
        }
    }

    /// Parse XML text into a document
    pub fn parse(xml: &str) -> Result<Self> {
        let mut builder = TreeBuilder::new();
        for event in EventReader::from_str(xml) {
            builder.push(event?)?;
        }
        builder.finish()
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get the document element (root element), if there is one
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|id| self.node_type(*id) == NodeType::Element)
    }

    /// Get the parent of a node, if it is attached
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).and_then(|d| d.parent)
    }

    /// Get all children of a node
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.data(node).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    /// Get the type of a node
    pub fn node_type(&self, node: NodeId) -> NodeType {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Element(_)) => NodeType::Element,
            Some(NodeKind::Text(_)) => NodeType::Text,
            _ => NodeType::Document,
        }
    }

    /// Element data of an element node
    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Mutable element data of an element node
    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(node.0).map(|d| &mut d.kind) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Text of a text node
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Text(text)) => out.push_str(text),
            Some(_) => {
                for child in self.children(node) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// Replace all children of a node with a single text node
    pub fn set_text_content(&mut self, node: NodeId, text: impl Into<String>) -> Result<()> {
        self.remove_children(node);
        let text = self.create_text(text);
        self.append_child(node, text)
    }

    /// Whether a node is (still) reachable from the document node
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// 1-based position of an element among its same-named, same-namespace siblings
    pub fn sibling_index(&self, node: NodeId) -> usize {
        let (Some(parent), Some(element)) = (self.parent(node), self.element(node)) else {
            return 1;
        };
        let preceding = self
            .children(parent)
            .iter()
            .take_while(|sibling| **sibling != node)
            .filter_map(|sibling| self.element(*sibling))
            .filter(|sibling| sibling.name.same_name(&element.name))
            .count();
        preceding + 1
    }

    // ==================== Mutation ====================

    /// Create a detached element node
    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.push(NodeKind::Element(element))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Append a child to a node, detaching it from any previous parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_link(parent, child)?;
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Insert a node before a reference node, under the same parent
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<()> {
        let parent = self
            .parent(reference)
            .ok_or_else(|| Error::node_access("reference node has no parent"))?;
        self.check_link(parent, node)?;
        self.detach(node);
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == reference)
            .ok_or_else(|| Error::node_access("reference node is not a child of its parent"))?;
        self.nodes[parent.0].children.insert(position, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Unlink a node from its parent
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            self.nodes[parent.0].children.retain(|c| *c != node);
            self.nodes[node.0].parent = None;
        }
    }

    /// Unlink all children of a node
    pub fn remove_children(&mut self, node: NodeId) {
        let Some(data) = self.nodes.get_mut(node.0) else {
            return;
        };
        let children = std::mem::take(&mut data.children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Remove an element, optionally keeping its child content in its place.
    ///
    /// The document element can only be removed when its content is kept and
    /// it has a child element to take its place.
    pub fn remove_element(&mut self, node: NodeId, keep_children: bool) -> Result<()> {
        let parent = self
            .parent(node)
            .ok_or_else(|| Error::node_access("element has no parent"))?;

        if parent == self.root() {
            if !keep_children {
                return Err(Error::node_access(
                    "cannot remove the document element without keeping child content",
                ));
            }
            let replacement = self
                .children(node)
                .iter()
                .copied()
                .find(|c| self.node_type(*c) == NodeType::Element)
                .ok_or_else(|| Error::node_access("cannot remove an empty document element"))?;
            self.detach(node);
            return self.append_child(parent, replacement);
        }

        if keep_children {
            let children = self.children(node).to_vec();
            for child in children {
                self.insert_before(node, child)?;
            }
        }
        self.detach(node);
        Ok(())
    }

    // ==================== User Data ====================

    /// Typed per-node user data
    pub fn user_data<T: Any + Send + Sync>(&self, node: NodeId) -> Option<&T> {
        self.user_data.get(&node).and_then(|d| d.downcast_ref())
    }

    /// Attach typed user data to a node, replacing any previous value
    pub fn set_user_data<T: Any + Send + Sync>(&mut self, node: NodeId, data: T) {
        self.user_data.insert(node, Box::new(data));
    }

    // ==================== Serialization ====================

    /// Feed the content events of a subtree to a callback, in document order
    pub fn walk_events<F>(&self, node: NodeId, sink: &mut F) -> Result<()>
    where
        F: FnMut(ContentEvent<'_>) -> Result<()>,
    {
        match self.data(node).map(|d| &d.kind) {
            Some(NodeKind::Document) => {
                for child in self.children(node) {
                    self.walk_events(*child, sink)?;
                }
            }
            Some(NodeKind::Element(element)) => {
                sink(ContentEvent::StartElement(element))?;
                for child in self.children(node) {
                    self.walk_events(*child, sink)?;
                }
                sink(ContentEvent::EndElement(&element.name))?;
            }
            Some(NodeKind::Text(text)) => sink(ContentEvent::Text(text))?,
            None => return Err(Error::node_access(format!("unknown node {:?}", node))),
        }
        Ok(())
    }

    /// Serialize a node to an XML string
    pub fn serialize(&self, node: NodeId) -> Result<String> {
        let mut serializer = XmlSerializer::new();
        self.walk_events(node, &mut |event| serializer.write(&event))?;
        serializer.into_string()
    }

    /// Serialize the whole document to an XML string
    pub fn serialize_document(&self) -> Result<String> {
        self.serialize(self.root())
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn check_link(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.data(parent).is_none() || self.data(child).is_none() {
            return Err(Error::node_access("node does not belong to this document"));
        }
        if child == self.root() {
            return Err(Error::node_access("the document node cannot be a child"));
        }
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                return Err(Error::node_access("a node cannot become its own descendant"));
            }
            ancestor = self.parent(current);
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes)
            .field("user_data", &self.user_data.len())
            .finish()
    }
}

/// Materializes a [`SourceEvent`] sequence into a [`Document`]
#[derive(Debug)]
pub struct TreeBuilder {
    document: Document,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        let document = Document::new();
        let root = document.root();
        Self {
            document,
            open: vec![root],
        }
    }

    /// Apply one event
    pub fn push(&mut self, event: SourceEvent) -> Result<()> {
        let parent = *self
            .open
            .last()
            .ok_or_else(|| Error::xml_parse("content after the document element was closed"))?;
        match event {
            SourceEvent::StartElement(element) => {
                let node = self.document.create_element(element);
                self.document.append_child(parent, node)?;
                self.open.push(node);
            }
            SourceEvent::EndElement(name) => {
                let open = self.document.element(parent).map(|e| &e.name);
                if open.map_or(true, |open: &QName| !open.same_name(&name)) {
                    return Err(Error::xml_parse(format!(
                        "unexpected end tag </{}>",
                        name.qualified()
                    )));
                }
                self.open.pop();
            }
            SourceEvent::Text(text) => {
                let node = self.document.create_text(text);
                self.document.append_child(parent, node)?;
            }
        }
        Ok(())
    }

    /// Finish building, failing if elements are still open
    pub fn finish(self) -> Result<Document> {
        if self.open.len() != 1 {
            return Err(Error::xml_parse("document has unclosed elements"));
        }
        Ok(self.document)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_index_counts_same_named_siblings() {
        let doc = Document::parse("<a><b/><c/><b/><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let indexes: Vec<usize> = doc
            .children(a)
            .iter()
            .map(|c| doc.sibling_index(*c))
            .collect();
        assert_eq!(indexes, vec![1, 1, 2, 3]);
    }

    #[test]
    fn remove_element_keeping_children() {
        let mut doc = Document::parse("<a><b><d>x</d></b><e/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        doc.remove_element(b, true).unwrap();
        assert_eq!(doc.serialize_document().unwrap(), "<a><d>x</d><e/></a>");
        assert!(!doc.is_attached(b));
    }

    #[test]
    fn remove_document_element_requires_kept_children() {
        let mut doc = Document::parse("<a><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        assert!(doc.remove_element(a, false).is_err());
        doc.remove_element(a, true).unwrap();
        assert_eq!(doc.serialize_document().unwrap(), "<b/>");
    }

    #[test]
    fn cannot_append_ancestor_to_descendant() {
        let mut doc = Document::parse("<a><b/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.children(a)[0];
        assert!(doc.append_child(b, a).is_err());
    }

    #[test]
    fn user_data_is_typed() {
        let mut doc = Document::parse("<a/>").unwrap();
        let a = doc.document_element().unwrap();
        doc.set_user_data(a, 42u32);
        assert_eq!(doc.user_data::<u32>(a), Some(&42));
        assert_eq!(doc.user_data::<String>(a), None);
    }
}
