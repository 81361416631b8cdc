//! The behavior interface driven by both filters

use bitflags::bitflags;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::fragment::Fragment;
use crate::settings::FilterMode;

bitflags! {
    /// Hooks a visitor implements, per filter mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Before-hook under the tree filter.
        const TREE_BEFORE = 1 << 0;
        /// After-hook under the tree filter.
        const TREE_AFTER = 1 << 1;
        /// Before-hook under the streaming filter.
        const STREAM_BEFORE = 1 << 2;
        /// After-hook under the streaming filter.
        const STREAM_AFTER = 1 << 3;
        /// Receives the text children of matched elements.
        const CHILD_TEXT = 1 << 4;

        const TREE = Self::TREE_BEFORE.bits() | Self::TREE_AFTER.bits();
        const STREAM = Self::STREAM_BEFORE.bits() | Self::STREAM_AFTER.bits();
        const BEFORE = Self::TREE_BEFORE.bits() | Self::STREAM_BEFORE.bits();
        const AFTER = Self::TREE_AFTER.bits() | Self::STREAM_AFTER.bits();
    }
}

impl Capabilities {
    fn mode_flags(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Tree => Self::TREE,
            FilterMode::Stream => Self::STREAM,
        }
    }

    /// Can this visitor run under `mode`. A pure text consumer runs under either.
    pub fn supports(self, mode: FilterMode) -> bool {
        self.intersects(Self::mode_flags(mode))
            || (!self.intersects(Self::TREE | Self::STREAM) && self.contains(Self::CHILD_TEXT))
    }

    /// Modes this visitor can run under
    pub fn supported_modes(self) -> Vec<FilterMode> {
        [FilterMode::Tree, FilterMode::Stream]
            .into_iter()
            .filter(|mode| self.supports(*mode))
            .collect()
    }

    /// Has a before-hook under `mode`
    pub fn before(self, mode: FilterMode) -> bool {
        self.intersects(Self::mode_flags(mode) & Self::BEFORE)
    }

    /// Has an after-hook under `mode`
    pub fn after(self, mode: FilterMode) -> bool {
        self.intersects(Self::mode_flags(mode) & Self::AFTER)
    }
}

/// What a hook asks the driver to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Continue,
    /// End the pass now, keeping whatever output was already written
    Terminate,
    /// Block the pass for (at most) this long, then continue
    Pause(Duration),
}

/// A configured behavior.
///
/// Visitors are shared by every pass that uses the registry they are
/// configured in, so hooks take `&self`; per-pass state belongs in the
/// [`ExecutionContext`].
pub trait Visitor: Send + Sync {
    /// Name used in logs, events and error messages
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Which hooks this visitor implements
    fn capabilities(&self) -> Capabilities;

    fn visit_before(&self, _fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    fn visit_after(&self, _fragment: &mut Fragment<'_>, _ctx: &mut ExecutionContext) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    /// Called for each text child of a matched element
    fn visit_child_text(
        &self,
        _fragment: &mut Fragment<'_>,
        _text: &str,
        _ctx: &mut ExecutionContext,
    ) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    /// Names of the values this visitor may publish
    fn products(&self) -> Vec<String> {
        Vec::new()
    }

    /// Does this visitor depend on `product` being published first
    fn consumes(&self, _product: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Visitor for Plain {
        fn capabilities(&self) -> Capabilities {
            Capabilities::TREE_BEFORE
        }
    }

    #[test]
    fn mode_support() {
        assert!(Capabilities::TREE.supports(FilterMode::Tree));
        assert!(!Capabilities::TREE.supports(FilterMode::Stream));
        assert_eq!(
            (Capabilities::BEFORE | Capabilities::AFTER).supported_modes(),
            vec![FilterMode::Tree, FilterMode::Stream]
        );
        assert_eq!(
            Capabilities::CHILD_TEXT.supported_modes(),
            vec![FilterMode::Tree, FilterMode::Stream]
        );
        assert_eq!(
            (Capabilities::STREAM_AFTER | Capabilities::CHILD_TEXT).supported_modes(),
            vec![FilterMode::Stream]
        );
        assert!(Capabilities::empty().supported_modes().is_empty());
    }

    #[test]
    fn phase_lookup_is_per_mode() {
        let caps = Capabilities::TREE_BEFORE | Capabilities::STREAM_AFTER;
        assert!(caps.before(FilterMode::Tree));
        assert!(!caps.after(FilterMode::Tree));
        assert!(!caps.before(FilterMode::Stream));
        assert!(caps.after(FilterMode::Stream));
    }

    #[test]
    fn default_name_is_the_type_name() {
        assert_eq!(Plain.name(), "Plain");
    }
}
