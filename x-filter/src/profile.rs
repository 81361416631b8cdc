//! Profiles, profile sets and target-profile expressions
//!
//! A profile names an audience a configuration targets. An execution runs
//! under one [`ProfileSet`], and a resource only applies when its
//! [`ProfileTarget`] matches that set.

use indexmap::{IndexMap, IndexSet};
use std::fmt;

use crate::error::{Error, Result};

/// Base profile used when an execution does not name one
pub const DEFAULT_PROFILE: &str = "default_profile";

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A base profile plus its member profiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSet {
    base: String,
    members: IndexSet<String>,
}

impl ProfileSet {
    /// Create a profile set whose only member is its base profile
    pub fn new(base: &str) -> Self {
        let base = normalize(base);
        let mut members = IndexSet::new();
        members.insert(base.clone());
        Self { base, members }
    }

    /// Create a profile set with additional member profiles
    pub fn with_members<I, S>(base: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new(base);
        for member in members {
            set.add_member(member.as_ref());
        }
        set
    }

    /// The base profile name
    pub fn base_profile(&self) -> &str {
        &self.base
    }

    /// Add a member profile; blank names are ignored
    pub fn add_member(&mut self, name: &str) {
        let name = normalize(name);
        if !name.is_empty() {
            self.members.insert(name);
        }
    }

    /// Case-insensitive membership test, ignoring surrounding whitespace
    pub fn is_member(&self, name: &str) -> bool {
        self.members.contains(&normalize(name))
    }

    /// Member profiles, base first
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE)
    }
}

/// Profile sets registered by base profile name
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    sets: IndexMap<String, ProfileSet>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile set, replacing any set with the same base profile
    pub fn add(&mut self, set: ProfileSet) {
        self.sets.insert(set.base.clone(), set);
    }

    pub fn contains(&self, base: &str) -> bool {
        self.sets.contains_key(&normalize(base))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Resolve a base profile into its fully expanded profile set.
    ///
    /// A member that is itself a registered base profile contributes all of
    /// its own members. An unknown base profile resolves to a set holding only
    /// that name.
    pub fn resolve(&self, base: &str) -> ProfileSet {
        let mut resolved = ProfileSet::new(base);
        let mut pending = vec![resolved.base.clone()];
        let mut expanded = IndexSet::new();

        while let Some(name) = pending.pop() {
            if !expanded.insert(name.clone()) {
                continue;
            }
            if let Some(set) = self.sets.get(&name) {
                for member in &set.members {
                    resolved.members.insert(member.clone());
                    if !expanded.contains(member) {
                        pending.push(member.clone());
                    }
                }
            }
        }
        resolved
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProfileToken {
    name: String,
    negated: bool,
}

impl ProfileToken {
    fn parse(text: &str, expression: &str) -> Result<Self> {
        let text = text.trim();
        let (negated, name) = match text.strip_prefix("not:") {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        if name.is_empty() {
            return Err(Error::InvalidProfileExpression(expression.to_string()));
        }
        Ok(Self {
            name: normalize(name),
            negated,
        })
    }

    fn matches(&self, set: &ProfileSet) -> bool {
        let hit = self.name == "*" || set.is_member(&self.name);
        hit != self.negated
    }
}

/// A resource's target-profile expression.
///
/// Comma-separated alternatives, any of which may match. Each alternative is
/// one or more tokens joined by ` AND `, all of which must match. A token
/// prefixed `not:` is negated and `*` matches every profile set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTarget {
    expression: String,
    alternatives: Vec<Vec<ProfileToken>>,
}

impl ProfileTarget {
    /// A target matching every profile set
    pub fn any() -> Self {
        Self {
            expression: String::new(),
            alternatives: Vec::new(),
        }
    }

    /// Parse a target-profile expression; a blank expression targets every profile
    pub fn parse(expression: &str) -> Result<Self> {
        if expression.trim().is_empty() {
            return Ok(Self::any());
        }
        let mut alternatives = Vec::new();
        for alternative in expression.split(',') {
            if alternative.trim().is_empty() {
                return Err(Error::InvalidProfileExpression(expression.to_string()));
            }
            let tokens = alternative
                .split(" AND ")
                .map(|token| ProfileToken::parse(token, expression))
                .collect::<Result<Vec<_>>>()?;
            alternatives.push(tokens);
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            alternatives,
        })
    }

    /// True when the target applies regardless of profile
    pub fn is_any(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Does this target match the given profile set
    pub fn matches(&self, set: &ProfileSet) -> bool {
        self.is_any()
            || self
                .alternatives
                .iter()
                .any(|tokens| tokens.iter().all(|token| token.matches(set)))
    }

    /// The expression text this target was parsed from
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl Default for ProfileTarget {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for ProfileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            f.write_str(&self.expression)
        }
    }
}
