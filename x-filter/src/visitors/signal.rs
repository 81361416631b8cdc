//! Behaviors that only raise control signals

use serde::Deserialize;
use std::time::Duration;

use crate::config::Configurable;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::visitor::{Capabilities, Flow, Visitor};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminateVisitorConfig {
    pub terminate_before: bool,
}

/// Ends the pass when the matched element is reached (before) or left (after)
#[derive(Debug, Clone, Default)]
pub struct TerminateVisitor {
    terminate_before: bool,
}

impl TerminateVisitor {
    pub fn new(terminate_before: bool) -> Self {
        Self { terminate_before }
    }

    pub fn before() -> Self {
        Self::new(true)
    }

    pub fn after() -> Self {
        Self::new(false)
    }
}

impl Visitor for TerminateVisitor {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE | Capabilities::AFTER
    }

    fn visit_before(&self, _fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        Ok(if self.terminate_before {
            Flow::Terminate
        } else {
            Flow::Continue
        })
    }

    fn visit_after(&self, _fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        Ok(if self.terminate_before {
            Flow::Continue
        } else {
            Flow::Terminate
        })
    }
}

impl Configurable for TerminateVisitor {
    type Config = TerminateVisitorConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config.terminate_before))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PauseVisitorConfig {
    pub millis: u64,
}

/// Blocks the pass for a while before the matched element is written
#[derive(Debug, Clone, Default)]
pub struct PauseVisitor {
    pause: Duration,
}

impl PauseVisitor {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl Visitor for PauseVisitor {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BEFORE
    }

    fn visit_before(&self, _fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        Ok(Flow::Pause(self.pause))
    }
}

impl Configurable for PauseVisitor {
    type Config = PauseVisitorConfig;

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(Duration::from_millis(config.millis)))
    }
}
