//! Resource configurations: one (selector, profile, visitor, parameters) binding

use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::profile::{ProfileSet, ProfileTarget};
use crate::selector::{NamespaceBindings, PathEntry, SelectorPath};
use crate::visitor::{Capabilities, Visitor};

/// Ordered parameter map of a resource
pub type Parameters = IndexMap<String, Value>;

/// A visitor built from its resource's parameters.
///
/// The parameters are decoded into `Config` once, when the registry is
/// built, so a bad parameter is a configuration error rather than a failure
/// halfway through a pass.
pub trait Configurable: Visitor + Sized + 'static {
    type Config: DeserializeOwned;

    fn from_config(config: Self::Config) -> Result<Self>;
}

/// Decode a parameter map into a typed configuration
pub fn decode_parameters<T: DeserializeOwned>(resource: &str, parameters: &Parameters) -> Result<T> {
    let object: serde_json::Map<String, Value> = parameters
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    serde_json::from_value(Value::Object(object)).map_err(|source| Error::InvalidParameters {
        resource: resource.to_string(),
        source,
    })
}

type VisitorFactory = fn(&str, &Parameters) -> Result<Arc<dyn Visitor>>;

fn build_configured<V: Configurable>(resource: &str, parameters: &Parameters) -> Result<Arc<dyn Visitor>> {
    let config = decode_parameters::<V::Config>(resource, parameters)?;
    Ok(Arc::new(V::from_config(config)?))
}

enum VisitorSource {
    Instance(Arc<dyn Visitor>),
    Configured(VisitorFactory),
}

/// A resource configuration, as registered.
///
/// Immutable once the registry is built.
pub struct ResourceConfig {
    id: usize,
    selector: SelectorPath,
    profile: ProfileTarget,
    visitor: Arc<dyn Visitor>,
    parameters: Parameters,
    products: IndexSet<String>,
    consumes: IndexSet<String>,
}

impl ResourceConfig {
    /// Start configuring a resource for `selector`
    pub fn builder(selector: &str) -> ResourceConfigBuilder {
        ResourceConfigBuilder::new(selector)
    }

    /// Registration position within the registry
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn selector(&self) -> &SelectorPath {
        &self.selector
    }

    pub fn profile(&self) -> &ProfileTarget {
        &self.profile
    }

    pub fn visitor(&self) -> &Arc<dyn Visitor> {
        &self.visitor
    }

    pub fn name(&self) -> &str {
        self.visitor.name()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.visitor.capabilities()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Decode one parameter into a typed value
    pub fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.parameters
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| Error::InvalidParameters {
                    resource: self.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Declared and visitor-reported products
    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(String::as_str)
    }

    pub fn produces(&self, product: &str) -> bool {
        self.products.contains(product)
    }

    /// Declared consumption, or the visitor's own answer
    pub fn consumes(&self, product: &str) -> bool {
        self.consumes.contains(product) || self.visitor.consumes(product)
    }

    /// Does this resource apply at `path` under `profile`
    pub fn applies_to(&self, path: &[PathEntry], profile: &ProfileSet) -> bool {
        self.profile.matches(profile) && self.selector.matches(path)
    }
}

impl fmt::Display for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (selector '{}'", self.name(), self.selector)?;
        if !self.profile.is_any() {
            write!(f, ", profile '{}'", self.profile)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("id", &self.id)
            .field("selector", &self.selector.source())
            .field("profile", &self.profile.expression())
            .field("visitor", &self.visitor.name())
            .field("parameters", &self.parameters)
            .field("products", &self.products)
            .field("consumes", &self.consumes)
            .finish()
    }
}

/// Collects the raw parts of a resource until the registry is built
pub struct ResourceConfigBuilder {
    selector: String,
    profile: String,
    visitor: Option<VisitorSource>,
    parameters: Parameters,
    products: Vec<String>,
    consumes: Vec<String>,
}

impl ResourceConfigBuilder {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            profile: String::new(),
            visitor: None,
            parameters: Parameters::new(),
            products: Vec::new(),
            consumes: Vec::new(),
        }
    }

    /// Use an already constructed visitor
    pub fn visitor(self, visitor: impl Visitor + 'static) -> Self {
        self.shared_visitor(Arc::new(visitor))
    }

    /// Use a visitor instance shared with other resources
    pub fn shared_visitor(mut self, visitor: Arc<dyn Visitor>) -> Self {
        self.visitor = Some(VisitorSource::Instance(visitor));
        self
    }

    /// Build the visitor from this resource's parameters when the registry is built
    pub fn configured<V: Configurable>(mut self) -> Self {
        self.visitor = Some(VisitorSource::Configured(build_configured::<V>));
        self
    }

    /// Target-profile expression
    pub fn profile(mut self, expression: &str) -> Self {
        self.profile = expression.to_string();
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Declare a product in addition to the visitor's own
    pub fn produces(mut self, product: &str) -> Self {
        self.products.push(product.to_string());
        self
    }

    /// Declare a dependency in addition to the visitor's own
    pub fn consumes(mut self, product: &str) -> Self {
        self.consumes.push(product.to_string());
        self
    }

    pub(crate) fn build(self, id: usize, namespaces: &NamespaceBindings) -> Result<ResourceConfig> {
        let selector = SelectorPath::parse_with_namespaces(&self.selector, namespaces)?;
        let profile = ProfileTarget::parse(&self.profile)?;
        let resource = format!("#{} '{}'", id, selector);

        let visitor = match self.visitor {
            Some(VisitorSource::Instance(visitor)) => visitor,
            Some(VisitorSource::Configured(factory)) => factory(&resource, &self.parameters)?,
            None => {
                return Err(Error::other(format!(
                    "resource {} has no visitor",
                    resource
                )))
            }
        };

        let mut products: IndexSet<String> = self.products.into_iter().collect();
        products.extend(visitor.products());

        Ok(ResourceConfig {
            id,
            selector,
            profile,
            visitor,
            parameters: self.parameters,
            products,
            consumes: self.consumes.into_iter().collect(),
        })
    }
}
