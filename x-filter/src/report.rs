//! Execution report generation
//!
//! [`ReportCollector`] listens to a pass and summarizes which visitors ran,
//! how often, and how the pass ended.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::PassState;
use crate::event::{ExecutionEvent, ExecutionEventListener, VisitPhase};
use crate::fragment::PassId;
use crate::settings::FilterMode;

/// Hook invocation counts for one visitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCounts {
    pub before: usize,
    pub after: usize,
    pub child_text: usize,
}

impl VisitCounts {
    pub fn total(&self) -> usize {
        self.before + self.after + self.child_text
    }
}

/// Summary of one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub pass: Option<PassId>,
    pub mode: Option<FilterMode>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub state: PassState,
    /// Fragments that had at least one resource targeting them
    pub targeted_fragments: usize,
    /// Fragments skipped because another pass held them
    pub reservation_conflicts: usize,
    pub visits: IndexMap<String, VisitCounts>,
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self {
            pass: None,
            mode: None,
            started: None,
            finished: None,
            state: PassState::Idle,
            targeted_fragments: 0,
            reservation_conflicts: 0,
            visits: IndexMap::new(),
        }
    }
}

impl ExecutionReport {
    fn record(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::PassStarted { pass, mode } => {
                self.pass = Some(*pass);
                self.mode = Some(*mode);
                self.started = Some(Utc::now());
                self.state = PassState::Traversing;
            }
            ExecutionEvent::ResourceTargeted { .. } => self.targeted_fragments += 1,
            ExecutionEvent::ReservationConflict { .. } => self.reservation_conflicts += 1,
            ExecutionEvent::ElementVisit { phase, visitor, .. } => {
                let counts = self.visits.entry(visitor.clone()).or_default();
                match phase {
                    VisitPhase::Before => counts.before += 1,
                    VisitPhase::After => counts.after += 1,
                    VisitPhase::ChildText => counts.child_text += 1,
                }
            }
            ExecutionEvent::PassFinished { state, .. } => {
                self.state = *state;
                self.finished = Some(Utc::now());
            }
        }
    }

    /// Generate a markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Execution Report\n\n");
        if let Some(pass) = &self.pass {
            md.push_str(&format!("**Pass:** {}\n", pass));
        }
        if let Some(mode) = &self.mode {
            md.push_str(&format!("**Mode:** {}\n", mode));
        }
        if let Some(started) = &self.started {
            md.push_str(&format!("**Started:** {}\n", started.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let (Some(started), Some(finished)) = (&self.started, &self.finished) {
            let elapsed = *finished - *started;
            md.push_str(&format!("**Duration:** {} ms\n", elapsed.num_milliseconds()));
        }
        md.push_str(&format!("**State:** {}\n\n", self.state));
        md.push_str(&format!("Targeted fragments: {}\n", self.targeted_fragments));
        md.push_str(&format!("Reservation conflicts: {}\n\n", self.reservation_conflicts));

        md.push_str("## Visitors\n\n");
        if self.visits.is_empty() {
            md.push_str("No visitors ran.\n");
        } else {
            md.push_str("| Visitor | Before | After | Child text |\n");
            md.push_str("|---------|--------|-------|------------|\n");
            for (visitor, counts) in &self.visits {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    visitor, counts.before, counts.after, counts.child_text
                ));
            }
        }

        md
    }

    /// Generate a JSON report
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Listener that builds an [`ExecutionReport`].
///
/// Clones share the same report, so keep one and hand another to the context.
#[derive(Debug, Clone, Default)]
pub struct ReportCollector {
    report: Arc<Mutex<ExecutionReport>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the report so far
    pub fn report(&self) -> ExecutionReport {
        self.report.lock().clone()
    }
}

impl ExecutionEventListener for ReportCollector {
    fn on_event(&mut self, event: &ExecutionEvent) {
        self.report.lock().record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentId;

    #[test]
    fn collector_counts_visits() {
        let collector = ReportCollector::new();
        let mut listener = collector.clone();
        let pass = PassId::new();
        let fragment = FragmentId::new();

        listener.on_event(&ExecutionEvent::PassStarted {
            pass,
            mode: FilterMode::Stream,
        });
        listener.on_event(&ExecutionEvent::ResourceTargeted {
            fragment,
            element: "b".into(),
            resources: vec!["Binder (selector 'b')".into()],
        });
        for phase in [VisitPhase::Before, VisitPhase::ChildText, VisitPhase::After] {
            listener.on_event(&ExecutionEvent::ElementVisit {
                fragment,
                element: "b".into(),
                phase,
                visitor: "Binder".into(),
            });
        }
        listener.on_event(&ExecutionEvent::PassFinished {
            pass,
            state: PassState::Completed,
        });

        let report = collector.report();
        assert_eq!(report.pass, Some(pass));
        assert_eq!(report.state, PassState::Completed);
        assert_eq!(report.targeted_fragments, 1);
        assert_eq!(report.visits["Binder"].total(), 3);
        assert!(report.finished.is_some());

        let md = report.to_markdown();
        assert!(md.contains("**Mode:** stream"));
        assert!(md.contains("Reservation conflicts: 0"));
        assert!(md.contains("| Binder | 1 | 1 | 1 |"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["visits"]["Binder"]["child_text"], 1);
    }
}
