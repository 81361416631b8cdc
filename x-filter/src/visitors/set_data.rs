//! Element rename and attribute rewriting

use indexmap::IndexMap;
use serde::Deserialize;
use xml_model::QName;

use crate::config::Configurable;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::visitor::{Capabilities, Flow, Visitor};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetElementDataConfig {
    /// New name, `prefix:local` or `local`
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub attributes: IndexMap<String, String>,
}

/// Renames the matched element and/or sets attributes on it before its start tag is written
#[derive(Debug, Clone, Default)]
pub struct SetElementData {
    name: Option<QName>,
    attributes: IndexMap<String, String>,
}

impl SetElementData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename to `name`, which may carry a prefix; the namespace is kept unless given
    pub fn with_name(mut self, name: &str, namespace: Option<&str>) -> Self {
        let (prefix, local) = match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local),
            None => (None, name),
        };
        self.name = Some(QName {
            namespace: namespace.map(str::to_string),
            local: local.to_string(),
            prefix,
        });
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

impl Visitor for SetElementData {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE
    }

    fn visit_before(&self, fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        let Some(element) = fragment.element_mut() else {
            return Ok(Flow::Continue);
        };
        if let Some(name) = &self.name {
            let namespace = name.namespace.clone().or_else(|| element.name.namespace.clone());
            let prefix = match &name.prefix {
                Some(prefix) => Some(prefix.clone()),
                None if name.namespace.is_none() => element.name.prefix.clone(),
                None => None,
            };
            element.name = QName {
                namespace,
                local: name.local.clone(),
                prefix,
            };
        }
        for (name, value) in &self.attributes {
            element.set_attribute(name, value.as_str());
        }
        Ok(Flow::Continue)
    }
}

impl Configurable for SetElementData {
    type Config = SetElementDataConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        let mut visitor = Self::new();
        if let Some(name) = &config.name {
            visitor = visitor.with_name(name, config.namespace.as_deref());
        }
        visitor.attributes = config.attributes;
        Ok(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::delivery::{StreamFilter, TreeFilter};
    use crate::registry::Registry;
    use crate::settings::FilterSettings;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use xml_model::Document;

    fn registry() -> Registry {
        Registry::builder()
            .resource(
                ResourceConfig::builder("b")
                    .configured::<SetElementData>()
                    .param("name", "item")
                    .param("attributes", json!({ "status": "seen" })),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn renames_before_the_start_tag_is_written() {
        let registry = registry();
        let input = "<a><b id=\"1\">x</b></a>";
        let expected = "<a><item id=\"1\" status=\"seen\">x</item></a>";

        let mut ctx = ExecutionContext::default();
        StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str(input, &mut ctx)
            .unwrap();
        assert_eq!(ctx.take_output().unwrap(), expected);

        let mut document = Document::parse(input).unwrap();
        let mut ctx = ExecutionContext::default();
        TreeFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter(&mut document, &mut ctx)
            .unwrap();
        assert_eq!(ctx.take_output().unwrap(), expected);
        assert_eq!(document.serialize_document().unwrap(), expected);
    }

    #[test]
    fn unprefixed_rename_keeps_the_namespace() {
        let mut element = xml_model::Element::new(QName::namespaced("urn:x", "b", Some("x".into())));
        let path = vec![crate::selector::PathEntry::new(element.clone(), 1)];
        let mut fragment =
            Fragment::streamed(crate::fragment::FragmentState::new(), &path, &mut element);
        SetElementData::new()
            .with_name("c", None)
            .visit_before(&mut fragment, &mut ExecutionContext::default())
            .unwrap();
        drop(fragment);
        assert_eq!(element.name.qualified(), "x:c");
        assert_eq!(element.namespace(), Some("urn:x"));
    }
}
