//! Bean repository and lifecycle observers

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use strum::Display;

use super::ExecutionContext;
use crate::fragment::FragmentId;

/// Kind of bean repository change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BeanLifecycle {
    Add,
    Change,
    Remove,
}

/// One change to the bean repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeanLifecycleEvent {
    pub kind: BeanLifecycle,
    pub bean_id: String,
    pub value: Value,
    /// Fragment being visited when the change was made, if any
    pub fragment: Option<FragmentId>,
}

/// Notified synchronously of every bean repository change
pub trait BeanObserver: Send {
    fn on_lifecycle_event(&mut self, event: &BeanLifecycleEvent, ctx: &ExecutionContext);
}

impl<F> BeanObserver for F
where
    F: FnMut(&BeanLifecycleEvent, &ExecutionContext) + Send,
{
    fn on_lifecycle_event(&mut self, event: &BeanLifecycleEvent, ctx: &ExecutionContext) {
        self(event, ctx)
    }
}

/// Named bean slots in insertion order.
///
/// Read access lives here; changes go through [`ExecutionContext`] so
/// observers can be handed the context they happened in.
#[derive(Default)]
pub struct BeanRepository {
    pub(super) beans: IndexMap<String, Value>,
    pub(super) observers: Vec<Box<dyn BeanObserver>>,
}

impl BeanRepository {
    pub fn get(&self, bean_id: &str) -> Option<&Value> {
        self.beans.get(bean_id)
    }

    pub fn contains(&self, bean_id: &str) -> bool {
        self.beans.contains_key(bean_id)
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.beans.iter().map(|(id, value)| (id.as_str(), value))
    }

    /// Copy of the bean map
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.beans.clone()
    }
}

impl std::fmt::Debug for BeanRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRepository")
            .field("beans", &self.beans)
            .field("observers", &self.observers.len())
            .finish()
    }
}
