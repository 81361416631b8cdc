//! Dispatch core shared by the tree and streaming drivers
//!
//! Tracks the open fragments of a pass (path, reservation and resolved
//! resources), invokes hooks in resolved order and turns hook results into
//! control flow. Everything a driver holds is released in [`Dispatcher::finish`],
//! whichever way the pass ends.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use xml_model::ContentEvent;

use super::validate_mode;
use crate::config::ResourceConfig;
use crate::context::{ExecutionContext, PassState, Termination};
use crate::error::{Error, Result};
use crate::event::{ExecutionEvent, VisitPhase};
use crate::fragment::{Fragment, FragmentState};
use crate::ordering;
use crate::registry::Registry;
use crate::selector::PathEntry;
use crate::settings::{FilterMode, FilterSettings};
use crate::visitor::{Capabilities, Flow};

struct OpenFragment {
    state: FragmentState,
    token: u64,
    reserved: bool,
    /// False for the document fragment, which has no path entry
    element: bool,
    resources: Arc<[usize]>,
}

pub(crate) struct Dispatcher<'r> {
    registry: &'r Registry,
    settings: FilterSettings,
    mode: FilterMode,
    path: Vec<PathEntry>,
    open: Vec<OpenFragment>,
    /// Visit order per match set, for the life of the pass
    orders: HashMap<Vec<usize>, Arc<[usize]>>,
    next_token: u64,
}

impl<'r> Dispatcher<'r> {
    pub(crate) fn new(registry: &'r Registry, settings: FilterSettings, mode: FilterMode) -> Result<Self> {
        validate_mode(registry, mode)?;
        Ok(Self {
            registry,
            settings,
            mode,
            path: Vec::new(),
            open: Vec::new(),
            orders: HashMap::new(),
            next_token: 0,
        })
    }

    pub(crate) fn path(&self) -> &[PathEntry] {
        &self.path
    }

    /// State of the innermost open fragment
    pub(crate) fn current_state(&self) -> Option<FragmentState> {
        self.open.last().map(|open| open.state.clone())
    }

    /// `Idle -> Opened -> Traversing`
    pub(crate) fn start(&mut self, ctx: &mut ExecutionContext) -> Result<()> {
        ctx.open(self.mode)?;
        self.path.clear();
        self.open.clear();
        self.orders.clear();
        ctx.begin_traversal();
        Ok(())
    }

    /// Open a fragment: extend the path, reserve it and resolve its resources.
    ///
    /// A fragment another pass holds is still traversed, but none of this
    /// pass's visitors see it.
    pub(crate) fn enter(
        &mut self,
        entry: Option<PathEntry>,
        state: FragmentState,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let element = entry.is_some();
        if let Some(entry) = entry {
            self.path.push(entry);
        }

        let token = self.next_token;
        self.next_token += 1;
        let reserved = state.reserve(ctx.pass_id(), token);
        if !reserved {
            let holder = state.holder().map(|reservation| reservation.pass);
            warn!(
                fragment = %state.id(),
                ?holder,
                "Fragment is reserved by another pass; skipping its visitors"
            );
            if ctx.has_listeners() {
                let event = ExecutionEvent::ReservationConflict {
                    fragment: state.id(),
                    element: self.element_label(),
                    holder,
                };
                ctx.notify(&event);
            }
        }
        self.open.push(OpenFragment {
            state: state.clone(),
            token,
            reserved,
            element,
            resources: Arc::from(Vec::new()),
        });
        if !reserved {
            return Ok(());
        }

        let resources = self.resolve(ctx)?;
        if !resources.is_empty() && ctx.has_listeners() {
            let event = ExecutionEvent::ResourceTargeted {
                fragment: state.id(),
                element: self.element_label(),
                resources: resources
                    .iter()
                    .filter_map(|id| self.registry.get(*id))
                    .map(ToString::to_string)
                    .collect(),
            };
            ctx.notify(&event);
        }
        if let Some(open) = self.open.last_mut() {
            open.resources = resources;
        }
        Ok(())
    }

    /// Close the innermost fragment, giving back its reservation
    pub(crate) fn exit(&mut self, ctx: &ExecutionContext) -> Result<()> {
        let open = self
            .open
            .pop()
            .ok_or_else(|| Error::other("no open fragment to close"))?;
        if open.element {
            self.path.pop();
        }
        if open.reserved && !open.state.release(ctx.pass_id(), open.token) {
            return Err(lost_reservation(&open, ctx));
        }
        Ok(())
    }

    fn element_label(&self) -> String {
        self.path
            .last()
            .map(|entry| entry.element.name.qualified())
            .unwrap_or_else(|| "#document".to_string())
    }

    fn resolve(&mut self, ctx: &ExecutionContext) -> Result<Arc<[usize]>> {
        let matched = self.registry.matching_ids(&self.path, ctx.profile());
        if matched.is_empty() {
            return Ok(Arc::from(Vec::new()));
        }
        if let Some(order) = self.orders.get(&matched) {
            return Ok(order.clone());
        }

        let resources: Vec<&ResourceConfig> = matched
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .collect();
        let order: Arc<[usize]> = ordering::visit_order(&resources)?
            .into_iter()
            .map(|position| matched[position])
            .collect();
        debug!(
            element = %self.element_label(),
            order = ?order
                .iter()
                .filter_map(|id| self.registry.get(*id))
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "Resolved visit order"
        );
        self.orders.insert(matched, order.clone());
        Ok(order)
    }

    // ==================== Hooks ====================

    pub(crate) fn before(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        self.run_hooks(VisitPhase::Before, fragment, "", ctx)
    }

    pub(crate) fn after(&self, fragment: &mut Fragment<'_>, ctx: &mut ExecutionContext) -> Result<Flow> {
        self.run_hooks(VisitPhase::After, fragment, "", ctx)
    }

    pub(crate) fn child_text(
        &self,
        fragment: &mut Fragment<'_>,
        text: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        self.run_hooks(VisitPhase::ChildText, fragment, text, ctx)
    }

    fn run_hooks(
        &self,
        phase: VisitPhase,
        fragment: &mut Fragment<'_>,
        text: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        let Some(open) = self.open.last() else {
            return Ok(Flow::Continue);
        };
        if !open.reserved || open.resources.is_empty() {
            return Ok(Flow::Continue);
        }

        // After-hooks share the before-hook order unless reversal is asked for
        let order: Vec<usize> =
            if phase == VisitPhase::After && self.settings.reverse_visit_order_on_visit_after {
                open.resources.iter().rev().copied().collect()
            } else {
                open.resources.to_vec()
            };

        for id in order {
            let Some(resource) = self.registry.get(id) else {
                continue;
            };
            let visitor = resource.visitor();
            let capabilities = visitor.capabilities();
            let applies = match phase {
                VisitPhase::Before => capabilities.before(self.mode),
                VisitPhase::After => capabilities.after(self.mode),
                VisitPhase::ChildText => capabilities.contains(Capabilities::CHILD_TEXT),
            };
            if !applies {
                continue;
            }

            trace!(visitor = resource.name(), %phase, element = %fragment.describe(), "Invoking visitor");
            if ctx.has_listeners() {
                ctx.notify(&ExecutionEvent::ElementVisit {
                    fragment: fragment.id(),
                    element: fragment.describe(),
                    phase,
                    visitor: resource.name().to_string(),
                });
            }

            let result = match phase {
                VisitPhase::Before => visitor.visit_before(fragment, ctx),
                VisitPhase::After => visitor.visit_after(fragment, ctx),
                VisitPhase::ChildText => visitor.visit_child_text(fragment, text, ctx),
            };

            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Pause(requested)) => {
                    let pause = self.settings.pause_for(requested);
                    debug!(visitor = resource.name(), ?pause, "Pausing pass");
                    std::thread::sleep(pause);
                }
                Ok(Flow::Terminate) => {
                    debug!(
                        visitor = resource.name(),
                        %phase,
                        element = %fragment.describe(),
                        "Terminate signal raised"
                    );
                    ctx.record_termination(Termination {
                        fragment: fragment.id(),
                        element: fragment.describe(),
                        visitor: resource.name().to_string(),
                        phase,
                    });
                    return Ok(Flow::Terminate);
                }
                Err(source) => {
                    let error = Error::VisitorFailed {
                        visitor: resource.name().to_string(),
                        element: fragment.describe(),
                        phase: phase.to_string(),
                        source: Box::new(source),
                    };
                    if self.settings.terminate_on_visitor_error {
                        return Err(error);
                    }
                    warn!(%error, "Visitor failed; continuing with the pass");
                }
            }
        }
        Ok(Flow::Continue)
    }

    // ==================== Output ====================

    /// Default serialization of one content event
    pub(crate) fn write(&self, ctx: &mut ExecutionContext, event: ContentEvent<'_>) -> Result<()> {
        if self.settings.default_serialization {
            ctx.write(&event)
        } else {
            Ok(())
        }
    }

    // ==================== Completion ====================

    /// Release everything still held and move the context to its terminal state
    pub(crate) fn finish(&mut self, ctx: &mut ExecutionContext, result: Result<Flow>) -> Result<PassState> {
        let mut violation = None;
        while let Some(open) = self.open.pop() {
            if open.reserved && !open.state.release(ctx.pass_id(), open.token) {
                violation.get_or_insert_with(|| lost_reservation(&open, ctx));
            }
        }
        self.path.clear();

        let released = ctx.release_writer_claims();
        if released > 0 {
            debug!(released, "Released writer claims at end of pass");
        }

        let outcome = match (result, violation) {
            (Err(error), _) => Err(error),
            (Ok(_), Some(violation)) => Err(violation),
            (Ok(Flow::Terminate), None) => Ok(PassState::Terminated),
            (Ok(_), None) => Ok(PassState::Completed),
        };
        ctx.finish(match &outcome {
            Ok(state) => *state,
            Err(_) => PassState::Failed,
        });
        outcome
    }
}

fn lost_reservation(open: &OpenFragment, ctx: &ExecutionContext) -> Error {
    Error::reservation(
        open.state.id(),
        format!(
            "pass {} (token {}) no longer holds the reservation; current holder {:?}",
            ctx.pass_id(),
            open.token,
            open.state.holder()
        ),
    )
}
