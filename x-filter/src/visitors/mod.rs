//! Built-in behaviors
//!
//! Every behavior here except [`NestedExecutionVisitor`] can be configured
//! from a resource's parameters through [`Configurable`](crate::Configurable).

mod nested;
mod remove;
mod serializer;
mod set_data;
mod signal;
mod value_binder;

pub use nested::NestedExecutionVisitor;
pub use remove::{RemoveElement, RemoveElementConfig};
pub use serializer::{FragmentSerializer, FragmentSerializerConfig};
pub use set_data::{SetElementData, SetElementDataConfig};
pub use signal::{PauseVisitor, PauseVisitorConfig, TerminateVisitor, TerminateVisitorConfig};
pub use value_binder::{ValueBinder, ValueBinderConfig};
