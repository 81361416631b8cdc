//! Capturing serialized fragments as beans

use serde::Deserialize;
use serde_json::Value;

use crate::config::Configurable;
use crate::context::{CaptureWriter, ExecutionContext};
use crate::error::Result;
use crate::fragment::Fragment;
use crate::visitor::{Capabilities, Flow, Visitor};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSerializerConfig {
    pub bind_to: String,
    #[serde(default)]
    pub children_only: bool,
}

/// Captures the serialized form of the matched fragment and binds it as a bean.
///
/// The capture sits on the writer stack and lets everything through, so the
/// fragment still reaches the output. Nothing is captured when default
/// serialization is off.
#[derive(Debug, Clone)]
pub struct FragmentSerializer {
    bind_to: String,
    children_only: bool,
    owner: String,
}

impl FragmentSerializer {
    pub fn new(bind_to: &str, children_only: bool) -> Self {
        Self {
            bind_to: bind_to.to_string(),
            children_only,
            owner: format!("fragment-serializer/{}", bind_to),
        }
    }
}

impl Visitor for FragmentSerializer {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE | Capabilities::AFTER
    }

    fn visit_before(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        ctx.claim_writer(
            fragment.id(),
            &self.owner,
            Box::new(CaptureWriter::new(self.children_only)),
        )?;
        Ok(Flow::Continue)
    }

    fn visit_after(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        let mut writer = ctx.restore_writer(fragment.id(), &self.owner)?;
        let captured = writer.take_output().unwrap_or_default();
        ctx.add_bean(&self.bind_to, Value::String(captured), Some(fragment.id()));
        Ok(Flow::Continue)
    }

    fn products(&self) -> Vec<String> {
        vec![self.bind_to.clone()]
    }
}

impl Configurable for FragmentSerializer {
    type Config = FragmentSerializerConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(&config.bind_to, config.children_only))
    }
}
