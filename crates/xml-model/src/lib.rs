//! Input model shared by the x-filter drivers.
//!
//! The same element/attribute/text events feed both execution strategies:
//! [`EventReader`] hands them out one at a time for forward-only streaming,
//! while [`TreeBuilder`] materialises them into a [`Document`] that can be
//! walked and mutated with random access. [`XmlSerializer`] turns either
//! back into XML text.

pub mod document;
pub mod error;
pub mod event;
pub mod name;
pub mod serialize;

pub use document::{Document, NodeId, TreeBuilder};
pub use error::{Error, Result};
pub use event::{EventReader, SourceEvent};
pub use name::{Attribute, Element, NodeType, QName, XMLNS_NAMESPACE};
pub use serialize::{ContentEvent, XmlSerializer};
