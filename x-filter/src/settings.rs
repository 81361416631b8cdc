//! Filter settings and mode selection inputs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::registry::Registry;

/// Global parameter selecting the filter type
pub const FILTER_TYPE_PARAM: &str = "stream.filter.type";
/// Global parameter toggling default serialization
pub const DEFAULT_SERIALIZATION_PARAM: &str = "default.serialization.on";
/// Global parameter controlling whether a failing hook ends the pass
pub const TERMINATE_ON_VISITOR_ERROR_PARAM: &str = "terminate.on.visitor.exception";
/// Global parameter reversing the after-hook order
pub const REVERSE_VISIT_ORDER_PARAM: &str = "reverse.visit.order.on.visit.after";

/// The execution strategy of a single pass
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Fully materialized document, random access
    #[strum(to_string = "tree", serialize = "dom")]
    Tree,
    /// Forward-only event stream
    #[strum(to_string = "stream", serialize = "sax ng", serialize = "sax")]
    Stream,
}

/// Requested filter type; `Auto` picks a mode from the configured behaviors
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[strum(to_string = "tree", serialize = "dom")]
    Tree,
    #[strum(to_string = "stream", serialize = "sax ng", serialize = "sax")]
    Stream,
    #[default]
    #[strum(to_string = "auto")]
    Auto,
}

impl FilterType {
    /// The fixed mode this type asks for, if any
    pub fn fixed_mode(self) -> Option<FilterMode> {
        match self {
            FilterType::Tree => Some(FilterMode::Tree),
            FilterType::Stream => Some(FilterMode::Stream),
            FilterType::Auto => None,
        }
    }
}

impl From<FilterMode> for FilterType {
    fn from(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Tree => FilterType::Tree,
            FilterMode::Stream => FilterType::Stream,
        }
    }
}

/// Settings shared by every pass of a filter engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilterSettings {
    pub filter_type: FilterType,
    pub default_serialization: bool,
    pub terminate_on_visitor_error: bool,
    pub reverse_visit_order_on_visit_after: bool,
    /// Upper bound for pause signals, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pause: Option<u64>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            filter_type: FilterType::Auto,
            default_serialization: true,
            terminate_on_visitor_error: true,
            reverse_visit_order_on_visit_after: false,
            max_pause: None,
        }
    }
}

impl FilterSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings with the registry's global parameters applied over the defaults
    pub fn from_registry(registry: &Registry) -> Result<Self> {
        Self::default().with_global_parameters(registry)
    }

    /// Apply the registry's global parameters over these settings
    pub fn with_global_parameters(mut self, registry: &Registry) -> Result<Self> {
        if let Some(value) = registry.global_parameter(FILTER_TYPE_PARAM) {
            let text = value.as_str().ok_or_else(|| {
                Error::other(format!("'{}' must be a string", FILTER_TYPE_PARAM))
            })?;
            self.filter_type = FilterType::from_str(text.trim()).map_err(|_| {
                Error::other(format!(
                    "unknown filter type '{}' for '{}'",
                    text, FILTER_TYPE_PARAM
                ))
            })?;
        }
        if let Some(value) = registry.global_parameter(DEFAULT_SERIALIZATION_PARAM) {
            self.default_serialization = flag(DEFAULT_SERIALIZATION_PARAM, value)?;
        }
        if let Some(value) = registry.global_parameter(TERMINATE_ON_VISITOR_ERROR_PARAM) {
            self.terminate_on_visitor_error = flag(TERMINATE_ON_VISITOR_ERROR_PARAM, value)?;
        }
        if let Some(value) = registry.global_parameter(REVERSE_VISIT_ORDER_PARAM) {
            self.reverse_visit_order_on_visit_after = flag(REVERSE_VISIT_ORDER_PARAM, value)?;
        }
        Ok(self)
    }

    pub fn with_filter_type(mut self, filter_type: impl Into<FilterType>) -> Self {
        self.filter_type = filter_type.into();
        self
    }

    pub fn with_default_serialization(mut self, on: bool) -> Self {
        self.default_serialization = on;
        self
    }

    pub fn with_terminate_on_visitor_error(mut self, on: bool) -> Self {
        self.terminate_on_visitor_error = on;
        self
    }

    pub fn with_reverse_visit_order_on_visit_after(mut self, on: bool) -> Self {
        self.reverse_visit_order_on_visit_after = on;
        self
    }

    pub fn with_max_pause(mut self, max: Duration) -> Self {
        self.max_pause = Some(max.as_millis() as u64);
        self
    }

    /// Clamp a requested pause to the configured maximum
    pub fn pause_for(&self, requested: Duration) -> Duration {
        match self.max_pause {
            Some(max) => requested.min(Duration::from_millis(max)),
            None => requested,
        }
    }
}

/// Read a boolean parameter given either as a JSON bool or as "true"/"false" text
fn flag(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::other(format!("'{}' must be true or false, got '{}'", name, s))),
        },
        other => Err(Error::other(format!(
            "'{}' must be true or false, got {}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_mode_parses_legacy_names() {
        assert_eq!(FilterMode::from_str("DOM").unwrap(), FilterMode::Tree);
        assert_eq!(FilterMode::from_str("SAX NG").unwrap(), FilterMode::Stream);
        assert_eq!(FilterMode::from_str("stream").unwrap(), FilterMode::Stream);
        assert_eq!(FilterMode::Tree.to_string(), "tree");
        assert_eq!(FilterMode::Stream.to_string(), "stream");
        assert!(FilterMode::from_str("pull").is_err());
    }

    #[test]
    fn settings_deserialize_kebab_case_with_defaults() {
        let settings: FilterSettings = serde_json::from_str(
            r#"{"filter-type": "stream", "reverse-visit-order-on-visit-after": true}"#,
        )
        .unwrap();
        assert_eq!(settings.filter_type, FilterType::Stream);
        assert!(settings.default_serialization);
        assert!(settings.terminate_on_visitor_error);
        assert!(settings.reverse_visit_order_on_visit_after);
        assert_eq!(settings.max_pause, None);
    }

    #[test]
    fn pause_is_clamped() {
        let settings = FilterSettings::new().with_max_pause(Duration::from_millis(5));
        assert_eq!(
            settings.pause_for(Duration::from_secs(1)),
            Duration::from_millis(5)
        );
        assert_eq!(
            FilterSettings::new().pause_for(Duration::from_millis(7)),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn global_parameters_override_defaults() {
        let registry = Registry::builder()
            .global_parameter(FILTER_TYPE_PARAM, "DOM")
            .global_parameter(DEFAULT_SERIALIZATION_PARAM, "false")
            .global_parameter(REVERSE_VISIT_ORDER_PARAM, true)
            .build()
            .unwrap();
        let settings = FilterSettings::from_registry(&registry).unwrap();
        assert_eq!(settings.filter_type, FilterType::Tree);
        assert!(!settings.default_serialization);
        assert!(settings.reverse_visit_order_on_visit_after);
        assert!(settings.terminate_on_visitor_error);
    }

    #[test]
    fn bad_global_flag_is_rejected() {
        let registry = Registry::builder()
            .global_parameter(TERMINATE_ON_VISITOR_ERROR_PARAM, "maybe")
            .build()
            .unwrap();
        assert!(FilterSettings::from_registry(&registry).is_err());
    }
}
