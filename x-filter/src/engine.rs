//! Filter engine with filter-mode selection
//!
//! [`FilterEngine`] pairs an immutable [`Registry`] with the settings every
//! pass runs under, picks the filter mode once, and runs one pass per call
//! with whichever driver that mode needs.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use xml_model::{Document, EventReader};

use crate::context::{ExecutionContext, PassState};
use crate::delivery::{select_mode, StreamFilter, TreeFilter};
use crate::error::Result;
use crate::profile::DEFAULT_PROFILE;
use crate::registry::Registry;
use crate::settings::{FilterMode, FilterSettings};

/// Result of one pass
#[derive(Debug)]
pub struct FilterOutcome {
    pub state: PassState,
    /// Serialized output; partial when the pass was terminated
    pub output: String,
    /// The filtered document, in tree mode
    pub document: Option<Document>,
}

impl FilterOutcome {
    pub fn is_terminated(&self) -> bool {
        self.state == PassState::Terminated
    }
}

/// Runs passes over a shared registry.
///
/// The engine is cheap to clone and safe to share between threads; every
/// pass gets its own [`ExecutionContext`].
#[derive(Debug, Clone)]
pub struct FilterEngine {
    registry: Arc<Registry>,
    settings: FilterSettings,
    mode: FilterMode,
}

impl FilterEngine {
    /// Create an engine configured from the registry's global parameters
    pub fn new(registry: impl Into<Arc<Registry>>) -> Result<Self> {
        let registry = registry.into();
        let settings = FilterSettings::from_registry(&registry)?;
        Self::with_settings(registry, settings)
    }

    /// Create an engine with explicit settings
    pub fn with_settings(registry: impl Into<Arc<Registry>>, settings: FilterSettings) -> Result<Self> {
        let registry = registry.into();
        let mode = select_mode(&registry, settings.filter_type)?;
        debug!(
            %mode,
            filter_type = %settings.filter_type,
            resources = registry.len(),
            "Created filter engine"
        );
        Ok(Self {
            registry,
            settings,
            mode,
        })
    }

    /// The mode every pass of this engine runs in
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    // ==================== Contexts ====================

    /// A fresh context for a pass under the named base profile
    pub fn create_execution_context(&self, profile: &str) -> ExecutionContext {
        ExecutionContext::new(self.registry.profiles().resolve(profile))
    }

    pub fn create_default_context(&self) -> ExecutionContext {
        self.create_execution_context(DEFAULT_PROFILE)
    }

    // ==================== Filtering ====================

    /// Run one pass over XML text
    pub fn filter(&self, input: &str, ctx: &mut ExecutionContext) -> Result<FilterOutcome> {
        let (state, document) = match self.mode {
            FilterMode::Tree => {
                let mut document = Document::parse(input)?;
                let state = TreeFilter::new(&self.registry, self.settings.clone())?
                    .filter(&mut document, ctx)?;
                (state, Some(document))
            }
            FilterMode::Stream => {
                let state = StreamFilter::new(&self.registry, self.settings.clone())?
                    .filter(EventReader::from_str(input), ctx)?;
                (state, None)
            }
        };
        Ok(FilterOutcome {
            state,
            output: ctx.take_output()?,
            document,
        })
    }

    /// Run one pass over an XML file
    pub fn filter_file(&self, path: &Path, ctx: &mut ExecutionContext) -> Result<FilterOutcome> {
        let input = std::fs::read_to_string(path)?;
        self.filter(&input, ctx)
    }

    /// Run one tree pass over a document the caller already holds.
    ///
    /// Always runs in tree mode, so it fails if a resource cannot.
    pub fn filter_document(&self, document: &mut Document, ctx: &mut ExecutionContext) -> Result<PassState> {
        TreeFilter::new(&self.registry, self.settings.clone())?.filter(document, ctx)
    }
}
