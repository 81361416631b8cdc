//! Binding element text to beans

use serde::Deserialize;
use serde_json::Value;

use crate::config::Configurable;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::visitor::{Capabilities, Flow, Visitor};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueBinderConfig {
    pub bean_id: String,
}

/// Binds the text of the matched element into the bean repository.
///
/// Text is collected from the element's direct text children and bound as a
/// string when the element ends. Produces `bean_id`.
#[derive(Debug, Clone)]
pub struct ValueBinder {
    bean_id: String,
    owner: String,
}

impl ValueBinder {
    pub fn new(bean_id: &str) -> Self {
        Self {
            bean_id: bean_id.to_string(),
            owner: format!("value-binder/{}", bean_id),
        }
    }

    pub fn bean_id(&self) -> &str {
        &self.bean_id
    }
}

impl Visitor for ValueBinder {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE | Capabilities::AFTER | Capabilities::CHILD_TEXT
    }

    fn visit_before(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        ctx.set_attribute(&self.owner, &fragment.id().to_string(), String::new());
        Ok(Flow::Continue)
    }

    fn visit_child_text(
        &self,
        fragment: &mut Fragment<'_>,
        text: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        if let Some(buffer) = ctx.attribute_mut::<String>(&self.owner, &fragment.id().to_string()) {
            buffer.push_str(text);
        }
        Ok(Flow::Continue)
    }

    fn visit_after(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        let text = ctx
            .remove_attribute::<String>(&self.owner, &fragment.id().to_string())
            .unwrap_or_default();
        ctx.add_bean(&self.bean_id, Value::String(text), Some(fragment.id()));
        Ok(Flow::Continue)
    }

    fn products(&self) -> Vec<String> {
        vec![self.bean_id.clone()]
    }
}

impl Configurable for ValueBinder {
    type Config = ValueBinderConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(&config.bean_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::delivery::StreamFilter;
    use crate::error::Error;
    use crate::registry::Registry;
    use crate::settings::FilterSettings;
    use serde_json::json;

    #[test]
    fn binds_the_last_matching_element() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("order/id").configured::<ValueBinder>().param("beanId", "orderId"))
            .build()
            .unwrap();
        let resource = registry.get(0).unwrap();
        assert!(resource.produces("orderId"));

        let mut ctx = ExecutionContext::default();
        StreamFilter::new(&registry, FilterSettings::default())
            .unwrap()
            .filter_str("<orders><order><id>1</id></order><order><id>2<x/>3</id></order></orders>", &mut ctx)
            .unwrap();
        assert_eq!(ctx.bean("orderId"), Some(&json!("23")));
    }

    #[test]
    fn missing_bean_id_is_a_configuration_error() {
        let result = Registry::builder()
            .resource(ResourceConfig::builder("id").configured::<ValueBinder>())
            .build();
        assert!(matches!(result, Err(Error::InvalidParameters { .. })));
    }
}
