//! Data paths.
//!
//! `/mod:top/list[k1='a'][k2='b']/leaf-list[.='v']/leaf`
//!
//! A module prefix is printed on the first step and wherever the module
//! changes; key predicates appear in declared key order.

use core::fmt;
use smallvec::SmallVec;

use crate::error::Error;

/// Parsed absolute data path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataPath {
    pub steps: SmallVec<[PathStep; 8]>,
}

/// One `/`-separated step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub module: Option<String>,
    pub name: String,
    pub predicates: Vec<Predicate>,
}

/// A `[...]` predicate on a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[key='value']`
    Key { name: String, value: String },
    /// `[.='value']` on a leaf-list step
    Value(String),
}

impl DataPath {
    pub fn parse(path: &str) -> Result<Self, Error> {
        Parser {
            src: path,
            pos: 0,
        }
        .parse()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl PathStep {
    pub fn new(module: Option<&str>, name: &str) -> Self {
        Self {
            module: module.map(str::to_string),
            name: name.to_string(),
            predicates: Vec::new(),
        }
    }

    /// Value of the key predicate named `key`.
    pub fn key(&self, key: &str) -> Option<&str> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Key { name, value } if name == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Value of a `[.='v']` predicate.
    pub fn value(&self) -> Option<&str> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Value(v) => Some(v.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(m) = &self.module {
            write!(f, "{m}:")?;
        }
        f.write_str(&self.name)?;
        for p in &self.predicates {
            match p {
                Predicate::Key { name, value } => write!(f, "[{name}={}]", Quoted(value))?,
                Predicate::Value(value) => write!(f, "[.={}]", Quoted(value))?,
            }
        }
        Ok(())
    }
}

/// Single quotes unless the value contains one. A value holding both quote
/// characters is single-quoted with each `'` doubled.
pub(crate) struct Quoted<'a>(pub &'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0.contains('\''), self.0.contains('"')) {
            (false, _) => write!(f, "'{}'", self.0),
            (true, false) => write!(f, "\"{}\"", self.0),
            (true, true) => write!(f, "'{}'", self.0.replace('\'', "''")),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<DataPath, Error> {
        let mut path = DataPath::default();
        if self.src.is_empty() {
            return Err(self.error("empty path"));
        }
        while self.pos < self.src.len() {
            if !self.eat('/') {
                return Err(self.error("expected '/'"));
            }
            path.steps.push(self.step()?);
        }
        Ok(path)
    }

    fn step(&mut self) -> Result<PathStep, Error> {
        let first = self.identifier()?;
        let (module, name) = if self.eat(':') {
            (Some(first), self.identifier()?)
        } else {
            (None, first)
        };
        let mut step = PathStep {
            module,
            name,
            predicates: Vec::new(),
        };
        while self.eat('[') {
            self.skip_ws();
            let predicate = if self.eat('.') {
                self.skip_ws();
                self.expect('=')?;
                Predicate::Value(self.quoted()?)
            } else {
                let mut key = self.identifier()?;
                if self.eat(':') {
                    // prefixed key names resolve by name alone
                    key = self.identifier()?;
                }
                self.skip_ws();
                self.expect('=')?;
                Predicate::Key {
                    name: key,
                    value: self.quoted()?,
                }
            };
            self.skip_ws();
            self.expect(']')?;
            step.predicates.push(predicate);
        }
        Ok(step)
    }

    fn identifier(&mut self) -> Result<String, Error> {
        let start = self.pos;
        for (i, c) in self.src[self.pos..].char_indices() {
            let ok = if i == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
            };
            if !ok {
                break;
            }
            self.pos = start + i + c.len_utf8();
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn quoted(&mut self) -> Result<String, Error> {
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted value")),
        };
        self.pos += 1;
        let mut value = String::new();
        loop {
            let rest = &self.src[self.pos..];
            let end = rest
                .find(quote)
                .ok_or_else(|| self.error("unterminated quoted value"))?;
            value.push_str(&rest[..end]);
            self.pos += end + 1;
            // a doubled quote stands for itself
            if !self.eat(quote) {
                return Ok(value);
            }
            value.push(quote);
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), Error> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: &str) -> Error {
        Error::InvalidPath {
            path: self.src.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_print() {
        let p = DataPath::parse("/ex:top/list[k1='a'][k2=\"b\"]/tags[.='x y']/v").unwrap();
        assert_eq!(p.steps.len(), 4);
        assert_eq!(p.steps[0].module.as_deref(), Some("ex"));
        assert_eq!(p.steps[1].key("k2"), Some("b"));
        assert_eq!(p.steps[2].value(), Some("x y"));
        assert_eq!(
            p.to_string(),
            "/ex:top/list[k1='a'][k2='b']/tags[.='x y']/v"
        );
    }

    #[test]
    fn test_quote_selection() {
        let mut step = PathStep::new(None, "l");
        step.predicates.push(Predicate::Key {
            name: "k".into(),
            value: "it's".into(),
        });
        assert_eq!(step.to_string(), "l[k=\"it's\"]");
    }

    #[test]
    fn test_both_quotes_read_back() {
        let mut step = PathStep::new(Some("m"), "l");
        step.predicates.push(Predicate::Value(r#"say "it's""#.into()));
        let printed = format!("/{step}");
        assert_eq!(printed, r#"/m:l[.='say "it''s"']"#);
        let parsed = DataPath::parse(&printed).unwrap();
        assert_eq!(parsed.steps[0].value(), Some(r#"say "it's""#));
        assert_eq!(parsed.to_string(), printed);

        let empty = DataPath::parse("/m:l[.=''][k='']").unwrap();
        assert_eq!(empty.steps[0].value(), Some(""));
        assert_eq!(empty.steps[0].key("k"), Some(""));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(DataPath::parse("").is_err());
        assert!(DataPath::parse("top").is_err());
        assert!(DataPath::parse("/top[k='a'").is_err());
        assert!(DataPath::parse("/top[k=a]").is_err());
    }
}
