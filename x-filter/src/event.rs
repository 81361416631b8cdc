//! Execution events
//!
//! Listeners registered on an [`ExecutionContext`](crate::ExecutionContext)
//! are told when a pass starts and finishes, which resources target each
//! element, every hook invocation, and every fragment skipped because
//! another pass holds it.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::context::PassState;
use crate::fragment::{FragmentId, PassId};
use crate::settings::FilterMode;

/// Which hook is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VisitPhase {
    Before,
    After,
    ChildText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    PassStarted {
        pass: PassId,
        mode: FilterMode,
    },
    /// The ordered resources resolved for one fragment
    ResourceTargeted {
        fragment: FragmentId,
        element: String,
        resources: Vec<String>,
    },
    ElementVisit {
        fragment: FragmentId,
        element: String,
        phase: VisitPhase,
        visitor: String,
    },
    /// The fragment was already reserved, so none of this pass's hooks ran on it
    ReservationConflict {
        fragment: FragmentId,
        element: String,
        holder: Option<PassId>,
    },
    PassFinished {
        pass: PassId,
        state: PassState,
    },
}

pub trait ExecutionEventListener: Send {
    fn on_event(&mut self, event: &ExecutionEvent);
}

impl<F> ExecutionEventListener for F
where
    F: FnMut(&ExecutionEvent) + Send,
{
    fn on_event(&mut self, event: &ExecutionEvent) {
        self(event)
    }
}
