//! Step predicates

use std::fmt;

use super::PathEntry;

/// Comparison operator of an attribute predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
        })
    }
}

/// Right-hand side of an attribute comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
}

/// A boolean test over one element position
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// 1-based position among same-named siblings
    Index(usize),
    /// Attribute existence, or comparison when `test` is set
    Attribute {
        namespace: Option<String>,
        local: String,
        test: Option<(CompareOp, Literal)>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Evaluate against an element position
    pub fn evaluate(&self, entry: &PathEntry) -> bool {
        match self {
            Predicate::Index(index) => entry.index == *index,
            Predicate::Attribute {
                namespace,
                local,
                test,
            } => {
                let Some(value) = entry.element.attribute_ns(namespace.as_deref(), local) else {
                    return false;
                };
                match test {
                    None => true,
                    Some((op, literal)) => compare(value, *op, literal),
                }
            }
            Predicate::And(left, right) => left.evaluate(entry) && right.evaluate(entry),
            Predicate::Or(left, right) => left.evaluate(entry) || right.evaluate(entry),
        }
    }

    /// True if this predicate, or any nested one, tests sibling position
    pub fn uses_index(&self) -> bool {
        match self {
            Predicate::Index(_) => true,
            Predicate::Attribute { .. } => false,
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.uses_index() || right.uses_index()
            }
        }
    }
}

fn compare(value: &str, op: CompareOp, literal: &Literal) -> bool {
    let number = value.trim().parse::<f64>().ok();
    match (op, literal) {
        (CompareOp::Eq, Literal::String(s)) => value == s,
        (CompareOp::Ne, Literal::String(s)) => value != s,
        (CompareOp::Eq, Literal::Number(n)) => number == Some(*n),
        (CompareOp::Ne, Literal::Number(n)) => number != Some(*n),
        (CompareOp::Lt, Literal::Number(n)) => number.is_some_and(|v| v < *n),
        (CompareOp::Gt, Literal::Number(n)) => number.is_some_and(|v| v > *n),
        (CompareOp::Lt, Literal::String(s)) => match (number, s.trim().parse::<f64>()) {
            (Some(v), Ok(n)) => v < n,
            _ => false,
        },
        (CompareOp::Gt, Literal::String(s)) => match (number, s.trim().parse::<f64>()) {
            (Some(v), Ok(n)) => v > n,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xml_model::{Attribute, Element, QName};

    fn entry(attrs: &[(&str, &str)], index: usize) -> PathEntry {
        let mut element = Element::new(QName::local("x"));
        for (name, value) in attrs {
            element
                .attributes
                .push(Attribute::new(QName::local(*name), *value));
        }
        PathEntry::new(element, index)
    }

    fn attr(local: &str, test: Option<(CompareOp, Literal)>) -> Predicate {
        Predicate::Attribute {
            namespace: None,
            local: local.to_string(),
            test,
        }
    }

    #[test]
    fn numeric_comparisons_need_numbers() {
        let e = entry(&[("n", "10"), ("s", "abc")], 1);
        assert!(attr("n", Some((CompareOp::Gt, Literal::Number(9.0)))).evaluate(&e));
        assert!(attr("n", Some((CompareOp::Eq, Literal::Number(10.0)))).evaluate(&e));
        assert!(!attr("s", Some((CompareOp::Lt, Literal::Number(1.0)))).evaluate(&e));
        assert!(!attr("s", Some((CompareOp::Gt, Literal::Number(1.0)))).evaluate(&e));
        assert!(attr("s", Some((CompareOp::Ne, Literal::String("x".into())))).evaluate(&e));
        assert!(!attr("missing", None).evaluate(&e));
    }

    #[test]
    fn composite_predicates() {
        let e = entry(&[("a", "1")], 2);
        let both = Predicate::And(Box::new(Predicate::Index(2)), Box::new(attr("a", None)));
        let either = Predicate::Or(Box::new(Predicate::Index(1)), Box::new(attr("b", None)));
        assert!(both.evaluate(&e));
        assert!(!either.evaluate(&e));
        assert!(both.uses_index());
        assert!(!attr("a", None).uses_index());
    }
}
