//! Filter drivers
//!
//! [`TreeFilter`] walks a materialized [`Document`](xml_model::Document);
//! [`StreamFilter`] consumes a forward-only event sequence. Both hand every
//! node to the same dispatch core, which resolves, orders and invokes the
//! matching visitors, so the two only differ in how they obtain nodes and
//! compute sibling positions.

mod dispatch;
pub mod stream;
pub mod tree;

use tracing::debug;

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::settings::{FilterMode, FilterType};
pub use stream::StreamFilter;
pub use tree::TreeFilter;

fn describe_support(resource: &crate::config::ResourceConfig) -> String {
    let modes = resource.capabilities().supported_modes();
    let modes = if modes.is_empty() {
        "none".to_string()
    } else {
        modes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{} supports: {}", resource, modes)
}

/// Fail unless every registered resource can run under `mode`
pub fn validate_mode(registry: &Registry, mode: FilterMode) -> Result<()> {
    let incompatible: Vec<String> = registry
        .iter()
        .filter(|resource| !resource.capabilities().supports(mode))
        .map(describe_support)
        .collect();
    if incompatible.is_empty() {
        return Ok(());
    }
    debug!(%mode, ?incompatible, "Resources incompatible with the selected filter");
    Err(Error::UnsupportedFilterMode {
        selected: mode,
        incompatible,
    })
}

/// Pick the mode a registry will run under.
///
/// A fixed filter type is validated as is. `Auto` prefers streaming, falls
/// back to the tree, and fails if neither suits every resource.
pub fn select_mode(registry: &Registry, filter_type: FilterType) -> Result<FilterMode> {
    if let Some(mode) = filter_type.fixed_mode() {
        validate_mode(registry, mode)?;
        debug!(%mode, "Using configured filter mode");
        return Ok(mode);
    }

    for mode in [FilterMode::Stream, FilterMode::Tree] {
        if validate_mode(registry, mode).is_ok() {
            debug!(%mode, resources = registry.len(), "Selected filter mode automatically");
            return Ok(mode);
        }
    }
    Err(Error::NoCommonFilterMode {
        behaviors: registry.iter().map(describe_support).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::visitor::{Capabilities, Visitor};

    struct Caps(&'static str, Capabilities);

    impl Visitor for Caps {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            self.1
        }
    }

    fn registry(visitors: Vec<Caps>) -> Registry {
        visitors
            .into_iter()
            .fold(Registry::builder(), |builder, visitor| {
                builder.resource(ResourceConfig::builder("a").visitor(visitor))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn auto_prefers_streaming() {
        let both = registry(vec![Caps("both", Capabilities::BEFORE)]);
        assert_eq!(select_mode(&both, FilterType::Auto).unwrap(), FilterMode::Stream);

        let tree = registry(vec![
            Caps("both", Capabilities::BEFORE),
            Caps("tree", Capabilities::TREE_AFTER),
        ]);
        assert_eq!(select_mode(&tree, FilterType::Auto).unwrap(), FilterMode::Tree);
        assert_eq!(select_mode(&registry(vec![]), FilterType::Auto).unwrap(), FilterMode::Stream);
    }

    #[test]
    fn auto_fails_without_a_common_mode() {
        let split = registry(vec![
            Caps("tree", Capabilities::TREE),
            Caps("stream", Capabilities::STREAM),
        ]);
        let err = select_mode(&split, FilterType::Auto).unwrap_err();
        assert!(matches!(err, Error::NoCommonFilterMode { .. }));
        assert!(err.to_string().contains("tree (selector 'a') supports: tree"));
    }

    #[test]
    fn mismatch_names_selected_and_supported_modes() {
        let tree_only = registry(vec![Caps("TreeOnly", Capabilities::TREE)]);
        let err = select_mode(&tree_only, FilterType::Stream).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("The 'stream' filter was selected"));
        assert!(message.contains("TreeOnly (selector 'a') supports: tree"));
        assert!(message.contains("debug logging"));
        assert!(err.is_configuration());
    }
}
