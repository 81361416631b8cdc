//! Fragments: one handle over a tree node or a streamed element
//!
//! Every node a driver visits gets a [`FragmentState`]: a unique id plus an
//! exclusive reservation slot. In tree mode the state is stored on the node
//! itself, so a nested pass over the same document sees the same slot and
//! cannot claim a node the outer pass is visiting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use xml_model::{Document, Element, NodeId, QName};

use crate::selector::PathEntry;

/// Globally unique fragment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FragmentId(Uuid);

impl FragmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one filter pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassId(Uuid);

impl PassId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PassId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The current holder of a fragment reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reservation {
    pub pass: PassId,
    pub token: u64,
}

/// Identity and reservation slot shared by every handle to one node
#[derive(Debug, Clone)]
pub struct FragmentState {
    id: FragmentId,
    holder: Arc<Mutex<Option<Reservation>>>,
}

impl FragmentState {
    pub fn new() -> Self {
        Self {
            id: FragmentId::new(),
            holder: Arc::new(Mutex::new(None)),
        }
    }

    /// The state stored on a tree node, created on first use
    pub fn for_node(document: &mut Document, node: NodeId) -> Self {
        if let Some(state) = document.user_data::<FragmentState>(node) {
            return state.clone();
        }
        let state = Self::new();
        document.set_user_data(node, state.clone());
        state
    }

    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Claim the fragment. Fails if anyone, including the same holder, already has it.
    pub fn reserve(&self, pass: PassId, token: u64) -> bool {
        let mut holder = self.holder.lock();
        if holder.is_some() {
            return false;
        }
        *holder = Some(Reservation { pass, token });
        true
    }

    /// Give the fragment back. Only the current holder can release it.
    pub fn release(&self, pass: PassId, token: u64) -> bool {
        let mut holder = self.holder.lock();
        if *holder == Some(Reservation { pass, token }) {
            *holder = None;
            true
        } else {
            false
        }
    }

    pub fn holder(&self) -> Option<Reservation> {
        *self.holder.lock()
    }

    pub fn is_reserved(&self) -> bool {
        self.holder.lock().is_some()
    }
}

impl Default for FragmentState {
    fn default() -> Self {
        Self::new()
    }
}

/// The node behind a fragment
pub enum FragmentNode<'a> {
    /// The streamed document, which has no materialized node
    Document,
    /// A streamed element, as it will be written
    Element(&'a mut Element),
    /// A node of a materialized document
    Tree {
        document: &'a mut Document,
        node: NodeId,
    },
}

/// What a hook sees of the node being visited
pub struct Fragment<'a> {
    state: FragmentState,
    path: &'a [PathEntry],
    node: FragmentNode<'a>,
}

impl<'a> Fragment<'a> {
    pub fn new(state: FragmentState, path: &'a [PathEntry], node: FragmentNode<'a>) -> Self {
        Self { state, path, node }
    }

    /// A fragment over a streamed element
    pub fn streamed(state: FragmentState, path: &'a [PathEntry], element: &'a mut Element) -> Self {
        Self::new(state, path, FragmentNode::Element(element))
    }

    /// A fragment over a tree node
    pub fn tree_node(
        state: FragmentState,
        path: &'a [PathEntry],
        document: &'a mut Document,
        node: NodeId,
    ) -> Self {
        Self::new(state, path, FragmentNode::Tree { document, node })
    }

    pub fn id(&self) -> FragmentId {
        self.state.id
    }

    pub fn state(&self) -> &FragmentState {
        &self.state
    }

    pub fn reserve(&self, pass: PassId, token: u64) -> bool {
        self.state.reserve(pass, token)
    }

    pub fn release(&self, pass: PassId, token: u64) -> bool {
        self.state.release(pass, token)
    }

    /// Start-of-element snapshots from the document element down to this one
    pub fn path(&self) -> &[PathEntry] {
        self.path
    }

    /// Nesting depth; the document is 0 and the document element 1
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// 1-based position among same-named siblings
    pub fn index(&self) -> Option<usize> {
        self.path.last().map(|entry| entry.index)
    }

    pub fn is_document(&self) -> bool {
        self.path.is_empty()
    }

    /// The element as it currently stands
    pub fn element(&self) -> Option<&Element> {
        match &self.node {
            FragmentNode::Document => None,
            FragmentNode::Element(element) => Some(&**element),
            FragmentNode::Tree { document, node } => document.element(*node),
        }
    }

    /// Mutable element; changes made in a before-hook show up in the output
    pub fn element_mut(&mut self) -> Option<&mut Element> {
        match &mut self.node {
            FragmentNode::Document => None,
            FragmentNode::Element(element) => Some(&mut **element),
            FragmentNode::Tree { document, node } => document.element_mut(*node),
        }
    }

    pub fn name(&self) -> Option<&QName> {
        self.element().map(|element| &element.name)
    }

    /// The underlying tree node, in tree mode
    pub fn tree(&self) -> Option<(&Document, NodeId)> {
        match &self.node {
            FragmentNode::Tree { document, node } => Some((&**document, *node)),
            _ => None,
        }
    }

    pub fn tree_mut(&mut self) -> Option<(&mut Document, NodeId)> {
        match &mut self.node {
            FragmentNode::Tree { document, node } => Some((&mut **document, *node)),
            _ => None,
        }
    }

    /// Short label for logs and events
    pub fn describe(&self) -> String {
        match self.name() {
            Some(name) => name.qualified(),
            None => "#document".to_string(),
        }
    }
}

impl fmt::Debug for Fragment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.state.id)
            .field("element", &self.describe())
            .field("depth", &self.depth())
            .finish()
    }
}
