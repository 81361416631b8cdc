//! Per-pass execution state
//!
//! One [`ExecutionContext`] is created per input document and lives for a
//! single pass: it holds the bean repository, the owner-keyed attribute
//! map, the output writer stack and the registered event listeners.

pub mod bean;
pub mod writer;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use strum::Display;
use tracing::debug;
use xml_model::ContentEvent;

use crate::error::{Error, Result};
use crate::event::{ExecutionEvent, ExecutionEventListener, VisitPhase};
use crate::fragment::{FragmentId, PassId};
use crate::profile::ProfileSet;
use crate::settings::FilterMode;
pub use bean::{BeanLifecycle, BeanLifecycleEvent, BeanObserver, BeanRepository};
pub use writer::{
    CaptureWriter, ChildrenOnlyWriter, DiscardWriter, Disposition, OutputWriter, WriterStack,
};

/// Lifecycle of a pass: `Idle -> Opened -> Traversing -> {Completed | Terminated | Failed}`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PassState {
    #[default]
    Idle,
    Opened,
    Traversing,
    Completed,
    /// Ended early by a terminate signal; the partial work is the result
    Terminated,
    Failed,
}

impl PassState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PassState::Completed | PassState::Terminated | PassState::Failed
        )
    }
}

/// Where a terminate signal was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Termination {
    pub fragment: FragmentId,
    pub element: String,
    pub visitor: String,
    pub phase: VisitPhase,
}

/// Mutable state of one filter pass
pub struct ExecutionContext {
    pass: PassId,
    profile: ProfileSet,
    mode: Option<FilterMode>,
    state: PassState,
    termination: Option<Termination>,
    beans: BeanRepository,
    attributes: HashMap<(String, String), Box<dyn Any + Send>>,
    writers: WriterStack,
    listeners: Vec<Box<dyn ExecutionEventListener>>,
}

impl ExecutionContext {
    /// Create a context for a pass under `profile`
    pub fn new(profile: ProfileSet) -> Self {
        Self {
            pass: PassId::new(),
            profile,
            mode: None,
            state: PassState::Idle,
            termination: None,
            beans: BeanRepository::default(),
            attributes: HashMap::new(),
            writers: WriterStack::new(),
            listeners: Vec::new(),
        }
    }

    pub fn pass_id(&self) -> PassId {
        self.pass
    }

    pub fn profile(&self) -> &ProfileSet {
        &self.profile
    }

    /// Mode of the pass, once opened
    pub fn mode(&self) -> Option<FilterMode> {
        self.mode
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    // ==================== Lifecycle ====================

    /// `Idle -> Opened`; a context only ever runs one pass
    pub(crate) fn open(&mut self, mode: FilterMode) -> Result<()> {
        if self.state != PassState::Idle {
            return Err(Error::other(format!(
                "execution context {} was already used (state '{}')",
                self.pass, self.state
            )));
        }
        self.mode = Some(mode);
        self.state = PassState::Opened;
        debug!(pass = %self.pass, %mode, profile = self.profile.base_profile(), "Opened pass");
        self.notify(&ExecutionEvent::PassStarted {
            pass: self.pass,
            mode,
        });
        Ok(())
    }

    /// `Opened -> Traversing`
    pub(crate) fn begin_traversal(&mut self) {
        self.state = PassState::Traversing;
    }

    pub(crate) fn record_termination(&mut self, termination: Termination) {
        self.termination = Some(termination);
    }

    /// Enter a terminal state and tell the listeners
    pub(crate) fn finish(&mut self, state: PassState) {
        self.state = state;
        debug!(pass = %self.pass, %state, "Pass finished");
        self.notify(&ExecutionEvent::PassFinished {
            pass: self.pass,
            state,
        });
    }

    // ==================== Beans ====================

    pub fn beans(&self) -> &BeanRepository {
        &self.beans
    }

    pub fn bean(&self, bean_id: &str) -> Option<&Value> {
        self.beans.get(bean_id)
    }

    pub fn add_bean_observer(&mut self, observer: impl BeanObserver + 'static) {
        self.beans.observers.push(Box::new(observer));
    }

    /// Bind a bean. Replacing an existing bean first reports its removal.
    pub fn add_bean(&mut self, bean_id: &str, value: Value, fragment: Option<FragmentId>) {
        if let Some(previous) = self.beans.beans.shift_remove(bean_id) {
            self.notify_bean(BeanLifecycleEvent {
                kind: BeanLifecycle::Remove,
                bean_id: bean_id.to_string(),
                value: previous,
                fragment,
            });
        }
        self.beans.beans.insert(bean_id.to_string(), value.clone());
        self.notify_bean(BeanLifecycleEvent {
            kind: BeanLifecycle::Add,
            bean_id: bean_id.to_string(),
            value,
            fragment,
        });
    }

    /// Replace the value of a bean that is already bound
    pub fn change_bean(&mut self, bean_id: &str, value: Value, fragment: Option<FragmentId>) -> Result<()> {
        let slot = self
            .beans
            .beans
            .get_mut(bean_id)
            .ok_or_else(|| Error::other(format!("cannot change unbound bean '{}'", bean_id)))?;
        *slot = value.clone();
        self.notify_bean(BeanLifecycleEvent {
            kind: BeanLifecycle::Change,
            bean_id: bean_id.to_string(),
            value,
            fragment,
        });
        Ok(())
    }

    pub fn remove_bean(&mut self, bean_id: &str, fragment: Option<FragmentId>) -> Option<Value> {
        let value = self.beans.beans.shift_remove(bean_id)?;
        self.notify_bean(BeanLifecycleEvent {
            kind: BeanLifecycle::Remove,
            bean_id: bean_id.to_string(),
            value: value.clone(),
            fragment,
        });
        Some(value)
    }

    /// Seed beans from another context without notifying anyone
    pub fn inherit_beans(&mut self, from: &ExecutionContext) {
        for (id, value) in from.beans.iter() {
            self.beans.beans.insert(id.to_string(), value.clone());
        }
    }

    fn notify_bean(&mut self, event: BeanLifecycleEvent) {
        let mut observers = std::mem::take(&mut self.beans.observers);
        for observer in observers.iter_mut() {
            observer.on_lifecycle_event(&event, self);
        }
        self.beans.observers = observers;
    }

    // ==================== Attributes ====================

    /// Store side-channel state under (owner, name)
    pub fn set_attribute<T: Any + Send>(&mut self, owner: &str, name: &str, value: T) {
        self.attributes
            .insert((owner.to_string(), name.to_string()), Box::new(value));
    }

    pub fn attribute<T: Any + Send>(&self, owner: &str, name: &str) -> Option<&T> {
        self.attributes
            .get(&(owner.to_string(), name.to_string()))
            .and_then(|value| value.downcast_ref())
    }

    pub fn attribute_mut<T: Any + Send>(&mut self, owner: &str, name: &str) -> Option<&mut T> {
        self.attributes
            .get_mut(&(owner.to_string(), name.to_string()))
            .and_then(|value| value.downcast_mut())
    }

    /// Remove and return an attribute, if present and of type `T`
    pub fn remove_attribute<T: Any + Send>(&mut self, owner: &str, name: &str) -> Option<T> {
        let key = (owner.to_string(), name.to_string());
        if !self.attributes.get(&key).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        self.attributes
            .remove(&key)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    // ==================== Output ====================

    pub fn writers(&self) -> &WriterStack {
        &self.writers
    }

    /// Write content through the active writers
    pub fn write(&mut self, event: &ContentEvent<'_>) -> Result<()> {
        self.writers.write(event)
    }

    /// Redirect output for a fragment until the claim is restored
    pub fn claim_writer(
        &mut self,
        fragment: FragmentId,
        owner: &str,
        writer: Box<dyn OutputWriter>,
    ) -> Result<()> {
        self.writers.claim(fragment, owner, writer)
    }

    pub fn restore_writer(&mut self, fragment: FragmentId, owner: &str) -> Result<Box<dyn OutputWriter>> {
        self.writers.restore(fragment, owner)
    }

    pub(crate) fn release_writer_claims(&mut self) -> usize {
        self.writers.release_all()
    }

    /// Take the serialized output of the pass
    pub fn take_output(&mut self) -> Result<String> {
        self.writers.take_output()
    }

    // ==================== Events ====================

    pub fn add_listener(&mut self, listener: impl ExecutionEventListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn notify(&mut self, event: &ExecutionEvent) {
        for listener in self.listeners.iter_mut() {
            listener.on_event(event);
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ProfileSet::default())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("pass", &self.pass)
            .field("profile", &self.profile)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("beans", &self.beans)
            .field("attributes", &self.attributes.len())
            .field("writers", &self.writers)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn bean_lifecycle_events_are_reported_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ExecutionContext::default();
        let sink = seen.clone();
        ctx.add_bean_observer(move |event: &BeanLifecycleEvent, ctx: &ExecutionContext| {
            sink.lock().push(format!(
                "{} {} {} ({} beans)",
                event.kind,
                event.bean_id,
                event.value,
                ctx.beans().len()
            ));
        });

        ctx.add_bean("order", json!(1), None);
        ctx.add_bean("order", json!(2), None);
        ctx.change_bean("order", json!(3), None).unwrap();
        assert!(ctx.change_bean("missing", json!(0), None).is_err());
        assert_eq!(ctx.remove_bean("order", None), Some(json!(3)));
        assert_eq!(ctx.remove_bean("order", None), None);

        assert_eq!(
            *seen.lock(),
            vec![
                "ADD order 1 (1 beans)",
                "REMOVE order 1 (0 beans)",
                "ADD order 2 (1 beans)",
                "CHANGE order 3 (1 beans)",
                "REMOVE order 3 (0 beans)",
            ]
        );
    }

    #[test]
    fn attributes_are_keyed_by_owner_and_typed() {
        let mut ctx = ExecutionContext::default();
        ctx.set_attribute("binder", "text", String::from("ab"));
        ctx.set_attribute("other", "text", 5u32);

        assert_eq!(ctx.attribute::<String>("binder", "text").map(String::as_str), Some("ab"));
        assert_eq!(ctx.attribute::<u32>("binder", "text"), None);
        ctx.attribute_mut::<String>("binder", "text").unwrap().push('c');

        assert_eq!(ctx.remove_attribute::<u32>("binder", "text"), None);
        assert_eq!(ctx.remove_attribute::<String>("binder", "text"), Some("abc".to_string()));
        assert_eq!(ctx.attribute::<u32>("other", "text"), Some(&5));
    }

    #[test]
    fn a_context_runs_one_pass() {
        let mut ctx = ExecutionContext::default();
        ctx.open(FilterMode::Stream).unwrap();
        assert_eq!(ctx.state(), PassState::Opened);
        ctx.begin_traversal();
        ctx.finish(PassState::Completed);
        assert!(ctx.state().is_terminal());
        assert!(ctx.open(FilterMode::Stream).is_err());
    }

    #[test]
    fn listeners_receive_lifecycle_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut ctx = ExecutionContext::default();
        ctx.add_listener(move |event: &ExecutionEvent| sink.lock().push(event.clone()));
        ctx.open(FilterMode::Tree).unwrap();
        ctx.finish(PassState::Terminated);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ExecutionEvent::PassStarted { mode: FilterMode::Tree, .. }));
        assert!(matches!(
            events[1],
            ExecutionEvent::PassFinished { state: PassState::Terminated, .. }
        ));
    }
}
