//! Nested passes over a matched subtree

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::delivery::{validate_mode, TreeFilter};
use crate::error::{Error, Result};
use crate::event::ExecutionEvent;
use crate::fragment::Fragment;
use crate::registry::Registry;
use crate::settings::{FilterMode, FilterSettings};
use crate::visitor::{Capabilities, Flow, Visitor};

/// Runs a second registry over the matched element's subtree, in tree mode.
///
/// The nested pass gets its own context, seeded with the outer pass's beans
/// and profile. Beans it adds, changes or removes are applied back to the
/// outer context when it finishes. The matched element itself stays reserved
/// by the outer pass, so the nested registry's resources only ever see its
/// descendants. The nested pass's fragment events are replayed to the outer
/// context's listeners; its start and finish events are not.
#[derive(Debug, Clone)]
pub struct NestedExecutionVisitor {
    registry: Arc<Registry>,
    settings: FilterSettings,
}

impl NestedExecutionVisitor {
    /// Fails if any resource in `registry` cannot run in tree mode
    pub fn new(registry: impl Into<Arc<Registry>>) -> Result<Self> {
        Self::with_settings(registry, FilterSettings::default())
    }

    /// Default serialization is always off for the nested pass
    pub fn with_settings(registry: impl Into<Arc<Registry>>, settings: FilterSettings) -> Result<Self> {
        let registry = registry.into();
        validate_mode(&registry, FilterMode::Tree)?;
        Ok(Self {
            registry,
            settings: settings
                .with_filter_type(FilterMode::Tree)
                .with_default_serialization(false),
        })
    }
}

impl Visitor for NestedExecutionVisitor {
    fn capabilities(&self) -> Capabilities {
        Capabilities::TREE_BEFORE
    }

    fn visit_before(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        if fragment.is_document() {
            return Err(Error::other("a nested pass needs an element to run over"));
        }
        let fragment_id = fragment.id();
        let Some((document, node)) = fragment.tree_mut() else {
            return Ok(Flow::Continue);
        };

        let mut nested = ExecutionContext::new(ctx.profile().clone());
        nested.inherit_beans(ctx);
        let before = nested.beans().snapshot();
        let events = Arc::new(Mutex::new(Vec::new()));
        if ctx.has_listeners() {
            let sink = Arc::clone(&events);
            nested.add_listener(move |event: &ExecutionEvent| match event {
                ExecutionEvent::PassStarted { .. } | ExecutionEvent::PassFinished { .. } => {}
                _ => sink.lock().push(event.clone()),
            });
        }

        let result = TreeFilter::new(&self.registry, self.settings.clone())
            .and_then(|mut filter| filter.filter_subtree(document, node, &mut nested));
        for event in events.lock().drain(..) {
            ctx.notify(&event);
        }
        let state = result?;
        debug!(%state, pass = %nested.pass_id(), "Nested pass finished");

        let after = nested.beans().snapshot();
        for id in before.keys().filter(|id| !after.contains_key(*id)) {
            ctx.remove_bean(id, Some(fragment_id));
        }
        for (id, value) in after {
            if before.get(&id) != Some(&value) {
                ctx.add_bean(&id, value, Some(fragment_id));
            }
        }
        Ok(Flow::Continue)
    }
}
