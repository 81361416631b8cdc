//! Streaming driver: a single forward pass over input events

use std::collections::HashMap;
use xml_model::{ContentEvent, Element, EventReader, SourceEvent};

use super::dispatch::Dispatcher;
use crate::context::{ExecutionContext, PassState};
use crate::error::{Error, Result};
use crate::fragment::{Fragment, FragmentNode, FragmentState};
use crate::registry::Registry;
use crate::selector::PathEntry;
use crate::settings::{FilterMode, FilterSettings};
use crate::visitor::Flow;

/// An element whose start has been seen but not its end
struct OpenElement {
    state: FragmentState,
    /// Working copy handed to hooks; its current form is what gets written
    element: Element,
}

/// (namespace, local) -> occurrences so far under one parent
type SiblingCounts = HashMap<(Option<String>, String), usize>;

/// Runs a registry over a sequence of [`SourceEvent`]s.
///
/// Memory is bounded by nesting depth: only the open elements and a sibling
/// counter per level are kept.
pub struct StreamFilter<'r> {
    dispatcher: Dispatcher<'r>,
    open: Vec<OpenElement>,
    siblings: Vec<SiblingCounts>,
}

impl<'r> StreamFilter<'r> {
    /// Fails if any resource in `registry` cannot run in stream mode
    pub fn new(registry: &'r Registry, settings: FilterSettings) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(registry, settings, FilterMode::Stream)?,
            open: Vec::new(),
            siblings: Vec::new(),
        })
    }

    /// Run one pass over `events`
    pub fn filter<I>(&mut self, events: I, ctx: &mut ExecutionContext) -> Result<PassState>
    where
        I: IntoIterator<Item = xml_model::Result<SourceEvent>>,
    {
        self.dispatcher.start(ctx)?;
        self.open.clear();
        self.siblings.clear();
        let result = self.run(events.into_iter(), ctx);
        self.open.clear();
        self.siblings.clear();
        self.dispatcher.finish(ctx, result)
    }

    /// Run one pass over XML text
    pub fn filter_str(&mut self, xml: &str, ctx: &mut ExecutionContext) -> Result<PassState> {
        self.filter(EventReader::from_str(xml), ctx)
    }

    fn run<I>(&mut self, events: I, ctx: &mut ExecutionContext) -> Result<Flow>
    where
        I: Iterator<Item = xml_model::Result<SourceEvent>>,
    {
        let document = FragmentState::new();
        self.dispatcher.enter(None, document.clone(), ctx)?;
        self.siblings.push(SiblingCounts::new());

        let flow = {
            let mut fragment = Fragment::new(document.clone(), self.dispatcher.path(), FragmentNode::Document);
            self.dispatcher.before(&mut fragment, ctx)?
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }

        for event in events {
            let flow = match event? {
                SourceEvent::StartElement(element) => self.start_element(element, ctx)?,
                SourceEvent::EndElement(_) => self.end_element(ctx)?,
                SourceEvent::Text(text) => self.text(&text, ctx)?,
            };
            if flow == Flow::Terminate {
                return Ok(flow);
            }
        }
        if let Some(open) = self.open.last() {
            return Err(Error::other(format!(
                "input ended inside <{}>",
                open.element.name.qualified()
            )));
        }

        let flow = {
            let mut fragment = Fragment::new(document, self.dispatcher.path(), FragmentNode::Document);
            self.dispatcher.after(&mut fragment, ctx)?
        };
        self.dispatcher.exit(ctx)?;
        Ok(flow)
    }

    fn start_element(&mut self, element: Element, ctx: &mut ExecutionContext) -> Result<Flow> {
        let key = (element.name.namespace.clone(), element.name.local.clone());
        let index = match self.siblings.last_mut() {
            Some(counts) => {
                let count = counts.entry(key).or_insert(0);
                *count += 1;
                *count
            }
            None => 1,
        };
        self.siblings.push(SiblingCounts::new());

        let state = FragmentState::new();
        self.dispatcher
            .enter(Some(PathEntry::new(element.clone(), index)), state.clone(), ctx)?;

        let mut working = element;
        let flow = {
            let mut fragment = Fragment::streamed(state.clone(), self.dispatcher.path(), &mut working);
            self.dispatcher.before(&mut fragment, ctx)?
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }

        self.dispatcher.write(ctx, ContentEvent::StartElement(&working))?;
        self.open.push(OpenElement {
            state,
            element: working,
        });
        Ok(Flow::Continue)
    }

    fn end_element(&mut self, ctx: &mut ExecutionContext) -> Result<Flow> {
        let Some(mut current) = self.open.pop() else {
            return Err(Error::other("end of element without a matching start"));
        };
        self.dispatcher
            .write(ctx, ContentEvent::EndElement(&current.element.name))?;

        let flow = {
            let mut fragment =
                Fragment::streamed(current.state.clone(), self.dispatcher.path(), &mut current.element);
            self.dispatcher.after(&mut fragment, ctx)?
        };
        self.dispatcher.exit(ctx)?;
        self.siblings.pop();
        Ok(flow)
    }

    fn text(&mut self, text: &str, ctx: &mut ExecutionContext) -> Result<Flow> {
        let flow = match self.open.last_mut() {
            Some(current) => {
                let mut fragment =
                    Fragment::streamed(current.state.clone(), self.dispatcher.path(), &mut current.element);
                self.dispatcher.child_text(&mut fragment, text, ctx)?
            }
            None => match self.dispatcher.current_state() {
                Some(state) => {
                    let mut fragment = Fragment::new(state, self.dispatcher.path(), FragmentNode::Document);
                    self.dispatcher.child_text(&mut fragment, text, ctx)?
                }
                None => Flow::Continue,
            },
        };
        if flow == Flow::Terminate {
            return Ok(flow);
        }
        self.dispatcher.write(ctx, ContentEvent::Text(text))?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::visitor::{Capabilities, Visitor};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Records `<phase> <element>[<index>]` plus any child text
    struct Trace(Arc<Mutex<Vec<String>>>);

    impl Visitor for Trace {
        fn capabilities(&self) -> Capabilities {
            Capabilities::BEFORE | Capabilities::AFTER | Capabilities::CHILD_TEXT
        }

        fn visit_before(&self, fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
            self.0.lock().push(format!("before {}[{}]", fragment.describe(), fragment.index().unwrap_or(0)));
            Ok(Flow::Continue)
        }

        fn visit_after(&self, fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
            self.0.lock().push(format!("after {}", fragment.describe()));
            Ok(Flow::Continue)
        }

        fn visit_child_text(
            &self,
            fragment: &mut Fragment<'_>,
            text: &str,
            _ctx: &mut ExecutionContext,
        ) -> Result<Flow> {
            self.0.lock().push(format!("text {} {:?}", fragment.describe(), text));
            Ok(Flow::Continue)
        }
    }

    /// Renames the element in its before-hook
    struct Rename;

    impl Visitor for Rename {
        fn capabilities(&self) -> Capabilities {
            Capabilities::STREAM_BEFORE
        }

        fn visit_before(&self, fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
            if let Some(element) = fragment.element_mut() {
                element.name = xml_model::QName::local("z");
            }
            Ok(Flow::Continue)
        }
    }

    #[test]
    fn hooks_follow_document_order_with_sibling_positions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("b").visitor(Trace(seen.clone())))
            .build()
            .unwrap();
        let mut ctx = ExecutionContext::default();
        let mut filter = StreamFilter::new(&registry, FilterSettings::default()).unwrap();
        let state = filter.filter_str("<a><b>x</b><c/><b>y</b></a>", &mut ctx).unwrap();

        assert_eq!(state, PassState::Completed);
        assert_eq!(
            *seen.lock(),
            vec![
                "before b[1]",
                "text b \"x\"",
                "after b",
                "before b[2]",
                "text b \"y\"",
                "after b",
            ]
        );
        assert_eq!(ctx.take_output().unwrap(), "<a><b>x</b><c/><b>y</b></a>");
    }

    #[test]
    fn before_hook_changes_are_written() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("b").visitor(Rename))
            .build()
            .unwrap();
        let mut ctx = ExecutionContext::default();
        StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str("<a><b>t</b></a>", &mut ctx)
            .unwrap();
        assert_eq!(ctx.take_output().unwrap(), "<a><z>t</z></a>");
    }

    #[test]
    fn malformed_input_fails_the_pass() {
        let registry = Registry::builder().build().unwrap();
        let mut ctx = ExecutionContext::default();
        let result = StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str("<a><b></a>", &mut ctx);
        assert!(result.is_err());
        assert_eq!(ctx.state(), PassState::Failed);
    }

    #[test]
    fn disabled_serialization_writes_nothing() {
        let registry = Registry::builder().build().unwrap();
        let mut ctx = ExecutionContext::default();
        StreamFilter::new(&registry, FilterSettings::default().with_default_serialization(false))
            .unwrap()
            .filter_str("<a>text</a>", &mut ctx)
            .unwrap();
        assert_eq!(ctx.take_output().unwrap(), "");
    }
}
