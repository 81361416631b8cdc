//! Selector text parsing
//!
//! ```text
//! selector  := '#document' ('/' step)* | ['/'] step ('/' step)*
//! step      := '**' | name predicate*
//! name      := '*' | [prefix ':'] local | [prefix ':'] '*'
//! predicate := '[' or ']'
//! or        := and ('or' and)*
//! and       := unary ('and' unary)*
//! unary     := '(' or ')' | INTEGER | '@' qname [op literal]
//! ```

use super::predicate::{CompareOp, Literal, Predicate};
use super::{NamespaceBindings, SelectorPath, SelectorStep, StepName, DOCUMENT_SELECTOR};
use crate::error::{Error, Result};

/// Parse selector text into a [`SelectorPath`]
pub fn parse(text: &str, namespaces: &NamespaceBindings) -> Result<SelectorPath> {
    let source = text.trim();
    if source.is_empty() {
        return Err(Error::invalid_selector(text, "empty selector"));
    }

    let (rooted, body) = if let Some(rest) = source.strip_prefix(DOCUMENT_SELECTOR) {
        if rest.is_empty() {
            return Ok(SelectorPath::from_parts(source.to_string(), true, Vec::new()));
        }
        match rest.strip_prefix('/') {
            Some(body) => (true, body),
            None => return Err(Error::invalid_selector(source, "expected '/' after #document")),
        }
    } else if let Some(body) = source.strip_prefix('/') {
        (true, body)
    } else {
        (false, source)
    };

    let mut steps = split_steps(source, body)?
        .into_iter()
        .map(|step| parse_step(source, step, namespaces))
        .collect::<Result<Vec<_>>>()?;
    // `**/**` matches exactly what `**` does
    steps.dedup_by(|a, b| {
        matches!((a, b), (SelectorStep::Descendants, SelectorStep::Descendants))
    });

    Ok(SelectorPath::from_parts(source.to_string(), rooted, steps))
}

/// Split on '/' outside of brackets and quotes
fn split_steps<'a>(source: &str, body: &'a str) -> Result<Vec<&'a str>> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::invalid_selector(source, "unbalanced ']'"))?;
            }
            (None, '/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(Error::invalid_selector(source, "unterminated string literal"));
    }
    if depth != 0 {
        return Err(Error::invalid_selector(source, "unbalanced '['"));
    }
    steps.push(&body[start..]);

    if steps.iter().any(|s| s.trim().is_empty()) {
        return Err(Error::invalid_selector(source, "empty step"));
    }
    Ok(steps.into_iter().map(str::trim).collect())
}

fn parse_step(source: &str, step: &str, namespaces: &NamespaceBindings) -> Result<SelectorStep> {
    if step == "**" {
        return Ok(SelectorStep::Descendants);
    }

    let name_end = step.find('[').unwrap_or(step.len());
    let name = parse_name(source, step[..name_end].trim(), namespaces)?;

    let mut predicates = Vec::new();
    let mut rest = step[name_end..].trim_start();
    while !rest.is_empty() {
        let Some(inner_start) = rest.strip_prefix('[') else {
            return Err(Error::invalid_selector(
                source,
                format!("unexpected '{}' in step '{}'", rest, step),
            ));
        };
        let close = closing_bracket(inner_start)
            .ok_or_else(|| Error::invalid_selector(source, "unbalanced '['"))?;
        predicates.push(parse_predicate(source, &inner_start[..close], namespaces)?);
        rest = inner_start[close + 1..].trim_start();
    }

    Ok(SelectorStep::Element { name, predicates })
}

fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') if depth == 0 => return Some(i),
            (None, ']') => depth -= 1,
            _ => {}
        }
    }
    None
}

fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn resolve_prefix(source: &str, prefix: &str, namespaces: &NamespaceBindings) -> Result<String> {
    namespaces
        .get(prefix)
        .cloned()
        .ok_or_else(|| Error::invalid_selector(source, format!("unbound namespace prefix '{}'", prefix)))
}

fn parse_name(source: &str, name: &str, namespaces: &NamespaceBindings) -> Result<StepName> {
    let (prefix, local) = match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    };

    let local = match local {
        "*" => None,
        local if is_ncname(local) => Some(local.to_string()),
        _ => {
            return Err(Error::invalid_selector(
                source,
                format!("invalid element name '{}'", name),
            ))
        }
    };

    let namespace = match prefix {
        Some(prefix) if is_ncname(prefix) => Some(resolve_prefix(source, prefix, namespaces)?),
        Some(prefix) => {
            return Err(Error::invalid_selector(
                source,
                format!("invalid namespace prefix '{}'", prefix),
            ))
        }
        None => None,
    };

    Ok(StepName { namespace, local })
}

// ==================== Predicate expressions ====================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    At,
    Op(CompareOp),
    Number(String),
    Str(String),
    Name(String),
}

fn tokenize(source: &str, text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '@' => tokens.push(Token::At),
            '=' => tokens.push(Token::Op(CompareOp::Eq)),
            '<' => tokens.push(Token::Op(CompareOp::Lt)),
            '>' => tokens.push(Token::Op(CompareOp::Gt)),
            '!' => match chars.next() {
                Some((_, '=')) => tokens.push(Token::Op(CompareOp::Ne)),
                _ => return Err(Error::invalid_selector(source, "expected '=' after '!'")),
            },
            '\'' | '"' => {
                let mut value = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == c {
                        closed = true;
                        break;
                    }
                    value.push(next);
                }
                if !closed {
                    return Err(Error::invalid_selector(source, "unterminated string literal"));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut end = i + c.len_utf8();
                while let Some((j, next)) = chars.peek().copied() {
                    if next.is_ascii_digit() || next == '.' {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(text[i..end].to_string()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i + c.len_utf8();
                while let Some((j, next)) = chars.peek().copied() {
                    if next.is_alphanumeric() || matches!(next, '_' | '-' | '.' | ':') {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(text[i..end].to_string()));
            }
            other => {
                return Err(Error::invalid_selector(
                    source,
                    format!("unexpected character '{}' in predicate", other),
                ))
            }
        }
    }
    Ok(tokens)
}

struct PredicateParser<'a> {
    source: &'a str,
    namespaces: &'a NamespaceBindings,
    tokens: Vec<Token>,
    pos: usize,
}

fn parse_predicate(source: &str, text: &str, namespaces: &NamespaceBindings) -> Result<Predicate> {
    let mut parser = PredicateParser {
        source,
        namespaces,
        tokens: tokenize(source, text)?,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(Error::invalid_selector(source, "empty predicate"));
    }
    let predicate = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("unexpected trailing tokens in predicate"));
    }
    Ok(predicate)
}

impl PredicateParser<'_> {
    fn error(&self, reason: impl Into<String>) -> Error {
        Error::invalid_selector(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Predicate> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("and") {
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::Number(raw)) => {
                if !raw.chars().all(|c| c.is_ascii_digit()) {
                    return Err(self.error(format!("'{}' is not a valid position", raw)));
                }
                match raw.parse::<usize>() {
                    Ok(index) if index >= 1 => Ok(Predicate::Index(index)),
                    _ => Err(self.error(format!("position '{}' must be 1 or greater", raw))),
                }
            }
            Some(Token::At) => self.parse_attribute(),
            Some(token) => Err(self.error(format!("unexpected token {:?}", token))),
            None => Err(self.error("unexpected end of predicate")),
        }
    }

    fn parse_attribute(&mut self) -> Result<Predicate> {
        let Some(Token::Name(qname)) = self.next() else {
            return Err(self.error("expected attribute name after '@'"));
        };
        let (namespace, local) = match qname.split_once(':') {
            Some((prefix, local)) => (
                Some(resolve_prefix(self.source, prefix, self.namespaces)?),
                local.to_string(),
            ),
            None => (None, qname.clone()),
        };
        if !is_ncname(&local) {
            return Err(self.error(format!("invalid attribute name '{}'", qname)));
        }

        let test = match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                let literal = match self.next() {
                    Some(Token::Str(value)) => Literal::String(value),
                    Some(Token::Number(raw)) => Literal::Number(
                        raw.parse::<f64>()
                            .map_err(|_| self.error(format!("invalid number '{}'", raw)))?,
                    ),
                    _ => return Err(self.error(format!("expected a literal after '{}'", op))),
                };
                Some((op, literal))
            }
            _ => None,
        };

        Ok(Predicate::Attribute {
            namespace,
            local,
            test,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_plain(text: &str) -> Result<SelectorPath> {
        parse(text, &NamespaceBindings::new())
    }

    #[test]
    fn parses_steps_and_rooting() {
        let selector = parse_plain(" /a/b ").unwrap();
        assert!(selector.is_rooted());
        assert_eq!(selector.source(), "/a/b");
        assert_eq!(selector.steps().len(), 2);

        let selector = parse_plain("a/**/c").unwrap();
        assert!(!selector.is_rooted());
        assert_eq!(selector.steps()[1], SelectorStep::Descendants);
    }

    #[test]
    fn parses_composite_predicates() {
        let selector = parse_plain("b[2 or (@x = 'a/b' and @n > 3)]").unwrap();
        let SelectorStep::Element { predicates, .. } = &selector.steps()[0] else {
            panic!("expected element step");
        };
        assert_eq!(predicates.len(), 1);
        let Predicate::Or(left, right) = &predicates[0] else {
            panic!("expected or");
        };
        assert_eq!(**left, Predicate::Index(2));
        assert!(matches!(**right, Predicate::And(_, _)));
    }

    #[test]
    fn multiple_predicates_on_one_step() {
        let selector = parse_plain("b[@id][1]").unwrap();
        let SelectorStep::Element { predicates, .. } = &selector.steps()[0] else {
            panic!("expected element step");
        };
        assert_eq!(predicates.len(), 2);
    }

    #[test]
    fn prefixed_names_resolve() {
        let mut namespaces = NamespaceBindings::new();
        namespaces.insert("c".to_string(), "http://c".to_string());
        let selector = parse("c:*[@c:id != \"1\"]", &namespaces).unwrap();
        let SelectorStep::Element { name, predicates } = &selector.steps()[0] else {
            panic!("expected element step");
        };
        assert_eq!(name.namespace.as_deref(), Some("http://c"));
        assert_eq!(name.local, None);
        assert!(matches!(
            &predicates[0],
            Predicate::Attribute { namespace: Some(ns), .. } if ns == "http://c"
        ));
    }

    #[test]
    fn malformed_selectors_fail() {
        for bad in [
            "",
            "a//b",
            "a/",
            "a[",
            "a]",
            "a[0]",
            "a[1.5]",
            "a[@]",
            "a[@x =]",
            "a[1 2]",
            "a[]",
            "a[@x='open]",
            "x:a",
            "1a",
            "#documentx",
            "a[1]b",
        ] {
            assert!(parse_plain(bad).is_err(), "'{}' should not parse", bad);
        }
    }

    #[test]
    fn errors_name_the_selector() {
        let err = parse_plain("a[0]").unwrap_err();
        assert!(err.to_string().contains("a[0]"));
        assert!(err.is_configuration());
    }
}
