//! Tree driver: depth-first traversal of a materialized document

use xml_model::{ContentEvent, Document, NodeId, NodeType};

use super::dispatch::Dispatcher;
use crate::context::{ExecutionContext, PassState};
use crate::error::{Error, Result};
use crate::fragment::{Fragment, FragmentState};
use crate::registry::Registry;
use crate::selector::PathEntry;
use crate::settings::{FilterMode, FilterSettings};
use crate::visitor::Flow;

/// Runs a registry over a [`Document`].
///
/// Visitors may mutate the document while it is traversed. Children are
/// re-read after the parent's before-hooks, and a child that a visitor has
/// detached by the time the traversal reaches it is skipped.
pub struct TreeFilter<'r> {
    dispatcher: Dispatcher<'r>,
}

impl<'r> TreeFilter<'r> {
    /// Fails if any resource in `registry` cannot run in tree mode
    pub fn new(registry: &'r Registry, settings: FilterSettings) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(registry, settings, FilterMode::Tree)?,
        })
    }

    /// Run one pass over the whole document, starting at the document fragment
    pub fn filter(&mut self, document: &mut Document, ctx: &mut ExecutionContext) -> Result<PassState> {
        self.dispatcher.start(ctx)?;
        let result = self.visit_document(document, ctx);
        self.dispatcher.finish(ctx, result)
    }

    /// Run one pass over the subtree rooted at `node`.
    ///
    /// `node` takes the place of the document element: there is no document
    /// fragment and paths start at `node` with index 1.
    pub fn filter_subtree(
        &mut self,
        document: &mut Document,
        node: NodeId,
        ctx: &mut ExecutionContext,
    ) -> Result<PassState> {
        if document.element(node).is_none() {
            return Err(Error::other(format!("node {:?} is not an element", node)));
        }
        self.dispatcher.start(ctx)?;
        let result = self.visit_element(document, node, 1, ctx);
        self.dispatcher.finish(ctx, result)
    }

    fn visit_document(&mut self, document: &mut Document, ctx: &mut ExecutionContext) -> Result<Flow> {
        let root = document.root();
        let state = FragmentState::for_node(document, root);
        self.dispatcher.enter(None, state.clone(), ctx)?;

        let flow = {
            let mut fragment = Fragment::tree_node(state.clone(), self.dispatcher.path(), document, root);
            self.dispatcher.before(&mut fragment, ctx)?
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }
        if self.visit_children(document, root, ctx)? == Flow::Terminate {
            return Ok(Flow::Terminate);
        }

        let flow = {
            let mut fragment = Fragment::tree_node(state, self.dispatcher.path(), document, root);
            self.dispatcher.after(&mut fragment, ctx)?
        };
        self.dispatcher.exit(ctx)?;
        Ok(flow)
    }

    fn visit_children(
        &mut self,
        document: &mut Document,
        parent: NodeId,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        // Positions are fixed before any child runs, so removing an earlier
        // sibling does not shift the index of a later one
        let children: Vec<(NodeId, usize)> = document
            .children(parent)
            .iter()
            .map(|child| (*child, document.sibling_index(*child)))
            .collect();

        for (child, index) in children {
            if document.parent(child) != Some(parent) {
                continue;
            }
            let flow = match document.node_type(child) {
                NodeType::Element => self.visit_element(document, child, index, ctx)?,
                NodeType::Text => self.visit_text(document, parent, child, ctx)?,
                NodeType::Document => Flow::Continue,
            };
            if flow == Flow::Terminate {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn visit_element(
        &mut self,
        document: &mut Document,
        node: NodeId,
        index: usize,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        let Some(element) = document.element(node).cloned() else {
            return Ok(Flow::Continue);
        };
        let state = FragmentState::for_node(document, node);
        self.dispatcher
            .enter(Some(PathEntry::new(element, index)), state.clone(), ctx)?;

        let flow = {
            let mut fragment = Fragment::tree_node(state.clone(), self.dispatcher.path(), document, node);
            self.dispatcher.before(&mut fragment, ctx)?
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }

        if let Some(element) = document.element(node) {
            self.dispatcher.write(ctx, ContentEvent::StartElement(element))?;
        }
        if self.visit_children(document, node, ctx)? == Flow::Terminate {
            return Ok(Flow::Terminate);
        }
        if let Some(element) = document.element(node) {
            self.dispatcher.write(ctx, ContentEvent::EndElement(&element.name))?;
        }

        let flow = {
            let mut fragment = Fragment::tree_node(state, self.dispatcher.path(), document, node);
            self.dispatcher.after(&mut fragment, ctx)?
        };
        self.dispatcher.exit(ctx)?;
        Ok(flow)
    }

    /// Child text goes to the hooks of the enclosing fragment, then to the output
    fn visit_text(
        &mut self,
        document: &mut Document,
        parent: NodeId,
        node: NodeId,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        let Some(text) = document.text(node).map(str::to_string) else {
            return Ok(Flow::Continue);
        };
        let flow = match self.dispatcher.current_state() {
            Some(state) => {
                let mut fragment = Fragment::tree_node(state, self.dispatcher.path(), document, parent);
                self.dispatcher.child_text(&mut fragment, &text, ctx)?
            }
            None => Flow::Continue,
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }
        self.dispatcher.write(ctx, ContentEvent::Text(&text))?;
        Ok(Flow::Continue)
    }
}
