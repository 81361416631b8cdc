//! Element removal

use serde::Deserialize;
use tracing::warn;

use crate::config::Configurable;
use crate::context::{ChildrenOnlyWriter, DiscardWriter, ExecutionContext, OutputWriter};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::visitor::{Capabilities, Flow, Visitor};

const OWNER: &str = "remove-element";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveElementConfig {
    pub keep_children: bool,
}

/// Removes the matched element from the output, optionally keeping its content.
///
/// Output is redirected for the element's extent through a writer claim, so
/// this works the same way in both modes. In tree mode the element is also
/// removed from the document once its subtree has been visited.
#[derive(Debug, Clone, Default)]
pub struct RemoveElement {
    keep_children: bool,
}

impl RemoveElement {
    pub fn new(keep_children: bool) -> Self {
        Self { keep_children }
    }

    pub fn keep_children(&self) -> bool {
        self.keep_children
    }
}

impl Visitor for RemoveElement {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE | Capabilities::AFTER
    }

    fn visit_before(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        if fragment.is_document() {
            return Err(Error::other("the document fragment cannot be removed"));
        }
        let writer: Box<dyn OutputWriter> = if self.keep_children {
            Box::new(ChildrenOnlyWriter::new())
        } else {
            Box::new(DiscardWriter)
        };
        ctx.claim_writer(fragment.id(), OWNER, writer)?;
        Ok(Flow::Continue)
    }

    fn visit_after(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        if fragment.is_document() {
            return Ok(Flow::Continue);
        }
        ctx.restore_writer(fragment.id(), OWNER)?;

        let keep_children = self.keep_children;
        let fragment_id = fragment.id();
        if let Some((document, node)) = fragment.tree_mut() {
            // The document element can only be replaced by its first child element
            if let Err(error) = document.remove_element(node, keep_children) {
                warn!(fragment = %fragment_id, %error, "Element left in place in the document");
            }
        }
        Ok(Flow::Continue)
    }
}

impl Configurable for RemoveElement {
    type Config = RemoveElementConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config.keep_children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::context::PassState;
    use crate::delivery::{StreamFilter, TreeFilter};
    use crate::registry::Registry;
    use xml_model::Document;
    use crate::settings::FilterSettings;
    use pretty_assertions::assert_eq;

    fn run(selector: &str, keep_children: bool, input: &str) -> String {
        let registry = Registry::builder()
            .resource(
                ResourceConfig::builder(selector)
                    .configured::<RemoveElement>()
                    .param("keepChildren", keep_children),
            )
            .build()
            .unwrap();
        let mut ctx = ExecutionContext::default();
        StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str(input, &mut ctx)
            .unwrap();
        assert_eq!(ctx.writers().depth(), 0);
        ctx.take_output().unwrap()
    }

    #[test]
    fn keeps_or_drops_content() {
        assert_eq!(run("b", false, "<a><b><c>t</c></b><d/></a>"), "<a><d/></a>");
        assert_eq!(run("b", true, "<a><b><c>t</c></b><d/></a>"), "<a><c>t</c><d/></a>");
    }

    #[test]
    fn nested_removals_stack() {
        assert_eq!(run("b", true, "<a><b><b>x</b>y</b></a>"), "<a>xy</a>");
    }

    #[test]
    fn document_element_stays_in_the_tree_without_kept_children() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("a").visitor(RemoveElement::new(false)))
            .build()
            .unwrap();
        let mut document = Document::parse("<a><b/></a>").unwrap();
        let mut ctx = ExecutionContext::default();
        let state = TreeFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter(&mut document, &mut ctx)
            .unwrap();

        assert_eq!(state, PassState::Completed);
        assert_eq!(ctx.take_output().unwrap(), "");
        assert_eq!(document.serialize_document().unwrap(), "<a><b/></a>");
    }

    #[test]
    fn document_fragment_cannot_be_removed() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("#document").visitor(RemoveElement::new(true)))
            .build()
            .unwrap();
        let mut ctx = ExecutionContext::default();
        let result = StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str("<a/>", &mut ctx);
        assert!(matches!(result, Err(Error::VisitorFailed { .. })));
    }
}
