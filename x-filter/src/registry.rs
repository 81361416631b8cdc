//! The resource configuration registry
//!
//! Built once from an ordered list of resource configurations and fixed
//! afterwards. Every query is a pure function of its arguments, so one
//! registry can serve any number of concurrent passes.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::{Parameters, ResourceConfig, ResourceConfigBuilder};
use crate::error::{Error, Result};
use crate::ordering;
use crate::profile::{ProfileSet, ProfileStore};
use crate::selector::{NamespaceBindings, PathEntry};

/// Registered resources plus global parameters, namespace bindings and profiles
#[derive(Debug)]
pub struct Registry {
    resources: Vec<ResourceConfig>,
    globals: Parameters,
    namespaces: NamespaceBindings,
    profiles: ProfileStore,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resources applying at `path` under `profile`, in registration order
    pub fn matching(&self, path: &[PathEntry], profile: &ProfileSet) -> Vec<&ResourceConfig> {
        self.resources
            .iter()
            .filter(|resource| resource.applies_to(path, profile))
            .collect()
    }

    pub(crate) fn matching_ids(&self, path: &[PathEntry], profile: &ProfileSet) -> Vec<usize> {
        self.resources
            .iter()
            .filter(|resource| resource.applies_to(path, profile))
            .map(ResourceConfig::id)
            .collect()
    }

    pub fn get(&self, id: usize) -> Option<&ResourceConfig> {
        self.resources.get(id)
    }

    pub fn global_parameter(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Decode a global parameter into a typed value
    pub fn global_parameter_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.globals
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| Error::InvalidParameters {
                    resource: format!("global parameter '{}'", name),
                    source,
                })
            })
            .transpose()
    }

    pub fn global_parameters(&self) -> &Parameters {
        &self.globals
    }

    /// Resources declaring `product`
    pub fn producers_of(&self, product: &str) -> Vec<&ResourceConfig> {
        self.resources
            .iter()
            .filter(|resource| resource.produces(product))
            .collect()
    }

    pub fn namespaces(&self) -> &NamespaceBindings {
        &self.namespaces
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.iter()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a ResourceConfig;
    type IntoIter = std::slice::Iter<'a, ResourceConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

/// Collects the configuration-loading phase's output
#[derive(Default)]
pub struct RegistryBuilder {
    resources: Vec<ResourceConfigBuilder>,
    globals: Parameters,
    namespaces: NamespaceBindings,
    profiles: ProfileStore,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; registration order is the tie-break for visit order
    pub fn resource(mut self, resource: ResourceConfigBuilder) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn global_parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.globals.insert(name.to_string(), value.into());
        self
    }

    /// Bind a namespace prefix for use in selectors
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        self
    }

    pub fn profile_set(mut self, set: ProfileSet) -> Self {
        self.profiles.add(set);
        self
    }

    /// Parse and validate everything; the registry is immutable afterwards
    pub fn build(self) -> Result<Registry> {
        let resources = self
            .resources
            .into_iter()
            .enumerate()
            .map(|(id, builder)| builder.build(id, &self.namespaces))
            .collect::<Result<Vec<_>>>()?;

        // Resources with the same selector and profile always match together,
        // so their dependency cycles can be caught before any input is seen.
        let mut groups: IndexMap<(&str, &str), Vec<&ResourceConfig>> = IndexMap::new();
        for resource in &resources {
            groups
                .entry((resource.selector().source(), resource.profile().expression()))
                .or_default()
                .push(resource);
        }
        for group in groups.values().filter(|group| group.len() > 1) {
            ordering::visit_order(group)?;
        }

        debug!(
            resources = resources.len(),
            globals = self.globals.len(),
            namespaces = self.namespaces.len(),
            profiles = self.profiles.len(),
            "Built resource registry"
        );
        for resource in &resources {
            debug!(id = resource.id(), resource = %resource, "Registered resource");
        }

        Ok(Registry {
            resources,
            globals: self.globals,
            namespaces: self.namespaces,
            profiles: self.profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visitor::{Capabilities, Visitor};
    use xml_model::{Element, QName};

    struct Tag(&'static str);

    impl Visitor for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::BEFORE
        }
    }

    fn path(names: &[&str]) -> Vec<PathEntry> {
        names
            .iter()
            .map(|n| PathEntry::new(Element::new(QName::local(*n)), 1))
            .collect()
    }

    #[test]
    fn matching_is_in_registration_order() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("b").visitor(Tag("first")))
            .resource(ResourceConfig::builder("c").visitor(Tag("other")))
            .resource(ResourceConfig::builder("a/b").visitor(Tag("second")))
            .resource(ResourceConfig::builder("*").visitor(Tag("third")))
            .build()
            .unwrap();

        let matched: Vec<&str> = registry
            .matching(&path(&["a", "b"]), &ProfileSet::default())
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(matched, vec!["first", "second", "third"]);
        assert_eq!(registry.matching_ids(&path(&["a", "b"]), &ProfileSet::default()), vec![0, 2, 3]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn profiles_scope_matches() {
        let registry = Registry::builder()
            .resource(ResourceConfig::builder("b").visitor(Tag("all")))
            .resource(ResourceConfig::builder("b").visitor(Tag("partner")).profile("partner"))
            .profile_set(ProfileSet::with_members("acme", ["partner"]))
            .build()
            .unwrap();

        let acme = registry.profiles().resolve("acme");
        assert_eq!(registry.matching(&path(&["b"]), &acme).len(), 2);
        assert_eq!(registry.matching(&path(&["b"]), &ProfileSet::default()).len(), 1);
    }

    #[test]
    fn lookups() {
        let registry = Registry::builder()
            .global_parameter("max.items", 10)
            .global_parameter("label", "x")
            .resource(ResourceConfig::builder("b").visitor(Tag("p")).produces("total"))
            .resource(ResourceConfig::builder("c").visitor(Tag("q")))
            .build()
            .unwrap();

        assert_eq!(registry.global_parameter_as::<u32>("max.items").unwrap(), Some(10));
        assert_eq!(registry.global_parameter_as::<u32>("missing").unwrap(), None);
        assert!(registry.global_parameter_as::<u32>("label").is_err());
        let producers: Vec<&str> = registry.producers_of("total").iter().map(|r| r.name()).collect();
        assert_eq!(producers, vec!["p"]);
    }

    #[test]
    fn namespaced_selectors_need_bound_prefixes() {
        assert!(Registry::builder()
            .resource(ResourceConfig::builder("c:item").visitor(Tag("x")))
            .build()
            .is_err());
        assert!(Registry::builder()
            .namespace("c", "http://c")
            .resource(ResourceConfig::builder("c:item").visitor(Tag("x")))
            .build()
            .is_ok());
    }

    #[test]
    fn cycles_on_a_shared_selector_fail_the_build() {
        let err = Registry::builder()
            .resource(ResourceConfig::builder("b").visitor(Tag("A")).produces("x").consumes("y"))
            .resource(ResourceConfig::builder("b").visitor(Tag("B")).produces("y").consumes("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::CircularDependency { .. }));
    }

    #[test]
    fn malformed_selectors_fail_the_build() {
        let err = Registry::builder()
            .resource(ResourceConfig::builder("a[0]").visitor(Tag("x")))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
    }
}
