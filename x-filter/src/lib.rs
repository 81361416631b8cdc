//! x-filter: Selector-driven XML fragment filtering
//!
//! Resources bind a visitor to a selector path and a target-profile
//! expression. A pass walks an input document, either as a materialized tree
//! or as a forward-only event stream, and invokes the before, child-text and
//! after hooks of every resource whose selector matches the current element.
//! Both drivers share one dispatch core, so a registry behaves the same in
//! either mode.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use x_filter::{FilterEngine, Registry, ResourceConfig};
//! use x_filter::visitors::{RemoveElement, ValueBinder};
//!
//! let registry = Registry::builder()
//!     .resource(ResourceConfig::builder("order/id").visitor(ValueBinder::new("orderId")))
//!     .resource(ResourceConfig::builder("order/internal").visitor(RemoveElement::new(false)))
//!     .build()?;
//!
//! let engine = FilterEngine::new(registry)?;
//! let mut ctx = engine.create_default_context();
//! let outcome = engine.filter("<order><id>42</id><internal/></order>", &mut ctx)?;
//! assert_eq!(outcome.output, "<order><id>42</id></order>");
//! assert_eq!(ctx.bean("orderId"), Some(&"42".into()));
//! ```

pub mod config;
pub mod context;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod event;
pub mod fragment;
pub mod ordering;
pub mod profile;
pub mod registry;
pub mod report;
pub mod selector;
pub mod settings;
pub mod visitor;
pub mod visitors;

// Re-export core types
pub use config::{Configurable, Parameters, ResourceConfig, ResourceConfigBuilder};
pub use context::{BeanLifecycle, BeanLifecycleEvent, ExecutionContext, PassState, Termination};
pub use error::{Error, Result};
pub use event::{ExecutionEvent, ExecutionEventListener, VisitPhase};
pub use fragment::{Fragment, FragmentId, FragmentState, PassId};
pub use profile::{ProfileSet, ProfileStore, ProfileTarget, DEFAULT_PROFILE};
pub use registry::{Registry, RegistryBuilder};
pub use report::{ExecutionReport, ReportCollector};
pub use selector::{PathEntry, SelectorPath};
pub use settings::{FilterMode, FilterSettings, FilterType};
pub use visitor::{Capabilities, Flow, Visitor};

// Re-export the drivers and the engine
pub use delivery::{StreamFilter, TreeFilter};
pub use engine::{FilterEngine, FilterOutcome};
