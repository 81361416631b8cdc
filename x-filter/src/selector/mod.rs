//! Selector paths
//!
//! A selector decides which element positions a configured resource applies
//! to. Matching is a pure function of the element's ancestry (names,
//! namespaces, start-of-element attributes and sibling positions), so the
//! tree and streaming drivers agree as long as they build the same
//! [`PathEntry`] chain.
//!
//! # Submodules
//!
//! - [`parser`]: tokenizer and recursive-descent parser for selector text.
//! - [`predicate`]: step predicates and their evaluation.

pub mod parser;
pub mod predicate;

use indexmap::IndexMap;
use std::fmt;
use xml_model::Element;

use crate::error::Result;
pub use predicate::{CompareOp, Literal, Predicate};

/// Selector text targeting the document fragment itself
pub const DOCUMENT_SELECTOR: &str = "#document";

/// Namespace prefix bindings used to resolve prefixed selector steps
pub type NamespaceBindings = IndexMap<String, String>;

/// One element on the path from the document element to the current element
#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    /// The element as it was at start-of-element
    pub element: Element,
    /// 1-based position among same-named, same-namespace siblings
    pub index: usize,
}

impl PathEntry {
    pub fn new(element: Element, index: usize) -> Self {
        Self { element, index }
    }
}

/// Name test of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepName {
    /// Required namespace; `None` matches any namespace
    pub namespace: Option<String>,
    /// Required local name; `None` is the `*` wildcard
    pub local: Option<String>,
}

impl StepName {
    pub fn matches(&self, element: &Element) -> bool {
        if let Some(local) = &self.local {
            if element.local_name() != local {
                return false;
            }
        }
        match &self.namespace {
            Some(ns) => element.namespace() == Some(ns.as_str()),
            None => true,
        }
    }
}

/// One step of a selector path
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorStep {
    Element {
        name: StepName,
        predicates: Vec<Predicate>,
    },
    /// `**`: zero or more elements
    Descendants,
}

impl SelectorStep {
    fn matches(&self, entry: &PathEntry) -> bool {
        match self {
            SelectorStep::Element { name, predicates } => {
                name.matches(&entry.element) && predicates.iter().all(|p| p.evaluate(entry))
            }
            SelectorStep::Descendants => true,
        }
    }
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorPath {
    source: String,
    rooted: bool,
    steps: Vec<SelectorStep>,
}

impl SelectorPath {
    /// Parse a selector with no namespace prefix bindings
    pub fn parse(text: &str) -> Result<Self> {
        parser::parse(text, &NamespaceBindings::new())
    }

    /// Parse a selector, resolving step prefixes against `namespaces`
    pub fn parse_with_namespaces(text: &str, namespaces: &NamespaceBindings) -> Result<Self> {
        parser::parse(text, namespaces)
    }

    pub(crate) fn from_parts(source: String, rooted: bool, steps: Vec<SelectorStep>) -> Self {
        Self {
            source,
            rooted,
            steps,
        }
    }

    /// Selector text as configured
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn steps(&self) -> &[SelectorStep] {
        &self.steps
    }

    /// True when the path is anchored at the document
    pub fn is_rooted(&self) -> bool {
        self.rooted
    }

    /// True for `#document`
    pub fn targets_document(&self) -> bool {
        self.rooted && self.steps.is_empty()
    }

    /// True if any step tests sibling position
    pub fn uses_index(&self) -> bool {
        self.steps.iter().any(|step| match step {
            SelectorStep::Element { predicates, .. } => predicates.iter().any(|p| p.uses_index()),
            SelectorStep::Descendants => false,
        })
    }

    /// Match against the path from the document element down to the current
    /// element. An empty path is the document fragment.
    pub fn matches(&self, path: &[PathEntry]) -> bool {
        if path.is_empty() {
            return self.targets_document();
        }
        if self.steps.is_empty() {
            return false;
        }
        match_tail(&self.steps, path, self.rooted)
    }
}

/// Match `steps` against the tail of `path`.
///
/// `row[j]` holds whether the steps seen so far match `path[..j]` with the
/// last of them on `path[j - 1]`. Each `**` step is a prefix-or over the
/// previous row, so matching stays linear in steps times depth.
fn match_tail(steps: &[SelectorStep], path: &[PathEntry], rooted: bool) -> bool {
    let mut row: Vec<bool> = (0..=path.len()).map(|j| !rooted || j == 0).collect();
    for step in steps {
        let mut next = vec![false; row.len()];
        match step {
            SelectorStep::Descendants => {
                let mut any = false;
                for (j, cell) in next.iter_mut().enumerate() {
                    any |= row[j];
                    *cell = any;
                }
            }
            step => {
                for (j, cell) in next.iter_mut().enumerate().skip(1) {
                    *cell = row[j - 1] && step.matches(&path[j - 1]);
                }
            }
        }
        row = next;
    }
    row[path.len()]
}

impl fmt::Display for SelectorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xml_model::{Attribute, QName};

    fn path(entries: &[(&str, usize)]) -> Vec<PathEntry> {
        entries.iter()
            .map(|(name, index)| PathEntry::new(Element::new(QName::local(*name)), *index))
            .collect()
    }

    #[test]
    fn unrooted_paths_match_the_tail() {
        let selector = SelectorPath::parse("b/c").unwrap();
        assert!(selector.matches(&path(&[("a", 1), ("b", 1), ("c", 1)])));
        assert!(!selector.matches(&path(&[("a", 1), ("c", 1)])));
        assert!(!selector.matches(&path(&[("b", 1), ("c", 1), ("d", 1)])));
    }

    #[test]
    fn rooted_paths_match_from_the_document_element() {
        let selector = SelectorPath::parse("/a/b").unwrap();
        assert!(selector.matches(&path(&[("a", 1), ("b", 1)])));
        assert!(!selector.matches(&path(&[("x", 1), ("a", 1), ("b", 1)])));

        let selector = SelectorPath::parse("#document/a").unwrap();
        assert!(selector.matches(&path(&[("a", 1)])));
        assert!(!selector.matches(&path(&[("a", 1), ("a", 1)])));
    }

    #[test]
    fn document_selector_matches_only_the_document() {
        let selector = SelectorPath::parse(DOCUMENT_SELECTOR).unwrap();
        assert!(selector.targets_document());
        assert!(selector.matches(&[]));
        assert!(!selector.matches(&path(&[("a", 1)])));
        assert!(!SelectorPath::parse("a").unwrap().matches(&[]));
    }

    #[test]
    fn descendant_steps() {
        let selector = SelectorPath::parse("a/**/d").unwrap();
        assert!(selector.matches(&path(&[("a", 1), ("d", 1)])));
        assert!(selector.matches(&path(&[("a", 1), ("b", 1), ("c", 1), ("d", 1)])));
        assert!(!selector.matches(&path(&[("b", 1), ("d", 1)])));

        let everything = SelectorPath::parse("**").unwrap();
        assert!(everything.matches(&path(&[("x", 1)])));
        assert!(!everything.matches(&[]));
    }

    #[test]
    fn repeated_descendant_steps_stay_cheap() {
        let selector = SelectorPath::parse("**/**/**/**/**/**/**/**/**/**/**/**/z").unwrap();
        assert_eq!(selector.steps().len(), 2);

        let names: Vec<String> = (0..40).map(|i| format!("n{}", i)).collect();
        let mut deep: Vec<(&str, usize)> = names.iter().map(|name| (name.as_str(), 1)).collect();
        assert!(!selector.matches(&path(&deep)));
        deep.push(("z", 1));
        assert!(selector.matches(&path(&deep)));

        let spread = SelectorPath::parse("/n0/**/n10/**/**/n20/**/z").unwrap();
        assert!(spread.matches(&path(&deep)));
        assert!(!spread.matches(&path(&deep[1..])));
    }

    #[test]
    fn wildcard_and_index() {
        let selector = SelectorPath::parse("a/*[2]").unwrap();
        assert!(selector.uses_index());
        assert!(selector.matches(&path(&[("a", 1), ("b", 2)])));
        assert!(!selector.matches(&path(&[("a", 1), ("b", 1)])));
    }

    #[test]
    fn namespaces_constrain_steps() {
        let mut namespaces = NamespaceBindings::new();
        namespaces.insert("c".to_string(), "http://c".to_string());
        let selector = SelectorPath::parse_with_namespaces("c:item", &namespaces).unwrap();

        let mut element = Element::new(QName::namespaced("http://c", "item", Some("x".into())));
        element
            .attributes
            .push(Attribute::new(QName::local("id"), "1"));
        assert!(selector.matches(&[PathEntry::new(element, 1)]));
        assert!(!selector.matches(&path(&[("item", 1)])));

        // no namespace on the step matches any namespace
        let any = SelectorPath::parse("item").unwrap();
        let element = Element::new(QName::namespaced("http://c", "item", None));
        assert!(any.matches(&[PathEntry::new(element, 1)]));
    }
}
