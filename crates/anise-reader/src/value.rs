use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use im::{HashMap, HashSet};
use regex::Regex;
use rpds::Queue;
use uuid::Uuid;

use crate::error::ReaderError;
use crate::string_escape::escape_string_fragment;

static GENSYM_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_gensym_id() -> u64 {
    GENSYM_COUNTER.fetch_add(1, AtomicOrdering::SeqCst)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub ns: Option<String>,
    pub name: String,
}

impl Symbol {
    pub fn new(ns: Option<String>, name: impl Into<String>) -> Self {
        Self {
            ns,
            name: name.into(),
        }
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    /// Fresh unique symbol: the prefix with a process-wide counter appended.
    pub fn gensym(prefix: &str) -> Self {
        Self::simple(format!("{}{}", prefix, next_gensym_id()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Keyword {
    pub ns: Option<String>,
    pub name: String,
}

impl Keyword {
    pub fn new(ns: Option<String>, name: impl Into<String>) -> Self {
        Self {
            ns,
            name: name.into(),
        }
    }

    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, ":{}/{}", ns, self.name),
            None => write!(f, ":{}", self.name),
        }
    }
}

/// A value produced by the reader. Metadata rides alongside the kind and is
/// excluded from equality and hashing.
#[derive(Clone, Debug)]
pub struct Value {
    pub kind: ValueKind,
    pub meta: Option<Arc<Value>>,
}

#[derive(Clone, Debug)]
pub enum ValueKind {
    Nil,
    Bool(bool),
    Int(i64),
    Ratio { numer: i64, denom: i64 },
    Float(f64),
    Char(char),
    String(String),
    Symbol(Symbol),
    Keyword(Keyword),
    List(Vec<Value>),
    Vector(Vec<Value>),
    Map(HashMap<Value, Value>),
    Set(HashSet<Value>),
    Regex(Regex),
    Instant(DateTime<Utc>),
    Uuid(Uuid),
    Queue(Queue<Value>),
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, meta: None }
    }

    pub fn nil() -> Self {
        Self::new(ValueKind::Nil)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    /// Ratio constructor: reduces by gcd with the sign on the numerator and
    /// collapses to an integer when the reduced denominator is 1. The
    /// denominator must be nonzero.
    pub fn ratio(numer: i64, denom: i64) -> Self {
        let g = gcd(numer.unsigned_abs(), denom.unsigned_abs()) as i64;
        let (numer, denom) = if g > 1 { (numer / g, denom / g) } else { (numer, denom) };
        let (numer, denom) = if denom < 0 { (-numer, -denom) } else { (numer, denom) };
        if denom == 1 {
            Self::int(numer)
        } else {
            Self::new(ValueKind::Ratio { numer, denom })
        }
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Float(value))
    }

    pub fn character(value: char) -> Self {
        Self::new(ValueKind::Char(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn symbol(value: Symbol) -> Self {
        Self::new(ValueKind::Symbol(value))
    }

    pub fn simple_symbol(name: impl Into<String>) -> Self {
        Self::symbol(Symbol::simple(name))
    }

    pub fn keyword(value: Keyword) -> Self {
        Self::new(ValueKind::Keyword(value))
    }

    pub fn simple_keyword(name: impl Into<String>) -> Self {
        Self::keyword(Keyword::simple(name))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::new(ValueKind::List(items))
    }

    pub fn vector(items: Vec<Value>) -> Self {
        Self::new(ValueKind::Vector(items))
    }

    pub fn map(entries: HashMap<Value, Value>) -> Self {
        Self::new(ValueKind::Map(entries))
    }

    pub fn set(items: HashSet<Value>) -> Self {
        Self::new(ValueKind::Set(items))
    }

    pub fn regex(pattern: Regex) -> Self {
        Self::new(ValueKind::Regex(pattern))
    }

    pub fn instant(value: DateTime<Utc>) -> Self {
        Self::new(ValueKind::Instant(value))
    }

    pub fn uuid(value: Uuid) -> Self {
        Self::new(ValueKind::Uuid(value))
    }

    pub fn queue(value: Queue<Value>) -> Self {
        Self::new(ValueKind::Queue(value))
    }

    pub fn supports_meta(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Symbol(_)
                | ValueKind::List(_)
                | ValueKind::Vector(_)
                | ValueKind::Map(_)
                | ValueKind::Set(_)
                | ValueKind::Queue(_)
        )
    }

    /// Attach a metadata map, merging with any existing metadata; on key
    /// conflicts the new map wins.
    pub fn with_meta(mut self, meta: Value) -> Result<Value, ReaderError> {
        if !self.supports_meta() {
            return Err(ReaderError::structural(format!(
                "Metadata can not be applied to: {}",
                self
            )));
        }
        let merged = match self.meta.take() {
            Some(existing) => merge_meta(existing.as_ref(), &meta),
            None => meta,
        };
        self.meta = Some(Arc::new(merged));
        Ok(self)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Nil => "nil",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Int(_) => "integer",
            ValueKind::Ratio { .. } => "ratio",
            ValueKind::Float(_) => "float",
            ValueKind::Char(_) => "character",
            ValueKind::String(_) => "string",
            ValueKind::Symbol(_) => "symbol",
            ValueKind::Keyword(_) => "keyword",
            ValueKind::List(_) => "list",
            ValueKind::Vector(_) => "vector",
            ValueKind::Map(_) => "map",
            ValueKind::Set(_) => "set",
            ValueKind::Regex(_) => "regex",
            ValueKind::Instant(_) => "instant",
            ValueKind::Uuid(_) => "uuid",
            ValueKind::Queue(_) => "queue",
        }
    }
}

fn merge_meta(existing: &Value, incoming: &Value) -> Value {
    if let (ValueKind::Map(old), ValueKind::Map(new)) = (&existing.kind, &incoming.kind) {
        let mut merged = old.clone();
        for (k, v) in new.iter() {
            merged.insert(k.clone(), v.clone());
        }
        return Value::map(merged);
    }
    incoming.clone()
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let rem = a % b;
        a = b;
        b = rem;
    }
    a.max(1)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl PartialEq for ValueKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueKind::Nil, ValueKind::Nil) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (
                ValueKind::Ratio { numer: an, denom: ad },
                ValueKind::Ratio { numer: bn, denom: bd },
            ) => an == bn && ad == bd,
            (ValueKind::Float(a), ValueKind::Float(b)) => a == b,
            (ValueKind::Char(a), ValueKind::Char(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::Symbol(a), ValueKind::Symbol(b)) => a == b,
            (ValueKind::Keyword(a), ValueKind::Keyword(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => a == b,
            (ValueKind::Vector(a), ValueKind::Vector(b)) => a == b,
            (ValueKind::Map(a), ValueKind::Map(b)) => a == b,
            (ValueKind::Set(a), ValueKind::Set(b)) => a == b,
            (ValueKind::Regex(a), ValueKind::Regex(b)) => a.as_str() == b.as_str(),
            (ValueKind::Instant(a), ValueKind::Instant(b)) => a == b,
            (ValueKind::Uuid(a), ValueKind::Uuid(b)) => a == b,
            (ValueKind::Queue(a), ValueKind::Queue(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            _ => false,
        }
    }
}

impl Eq for ValueKind {}

impl Hash for ValueKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueKind::Nil => {}
            ValueKind::Bool(b) => b.hash(state),
            ValueKind::Int(n) => n.hash(state),
            ValueKind::Ratio { numer, denom } => {
                numer.hash(state);
                denom.hash(state);
            }
            ValueKind::Float(f) => f.to_bits().hash(state),
            ValueKind::Char(c) => c.hash(state),
            ValueKind::String(s) => s.hash(state),
            ValueKind::Symbol(s) => s.hash(state),
            ValueKind::Keyword(k) => k.hash(state),
            ValueKind::List(items) | ValueKind::Vector(items) => items.hash(state),
            // Order-independent fold so equal maps and sets hash alike
            // regardless of internal layout.
            ValueKind::Map(entries) => {
                entries.len().hash(state);
                let mut acc: u64 = 0;
                for (k, v) in entries.iter() {
                    let mut hasher = DefaultHasher::new();
                    k.hash(&mut hasher);
                    v.hash(&mut hasher);
                    acc ^= hasher.finish();
                }
                acc.hash(state);
            }
            ValueKind::Set(items) => {
                items.len().hash(state);
                let mut acc: u64 = 0;
                for item in items.iter() {
                    let mut hasher = DefaultHasher::new();
                    item.hash(&mut hasher);
                    acc ^= hasher.finish();
                }
                acc.hash(state);
            }
            ValueKind::Regex(pattern) => pattern.as_str().hash(state),
            ValueKind::Instant(t) => t.hash(state),
            ValueKind::Uuid(u) => u.hash(state),
            ValueKind::Queue(q) => {
                q.len().hash(state);
                for item in q.iter() {
                    item.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Nil => write!(f, "nil"),
            ValueKind::Bool(b) => write!(f, "{}", b),
            ValueKind::Int(n) => write!(f, "{}", n),
            ValueKind::Ratio { numer, denom } => write!(f, "{}/{}", numer, denom),
            ValueKind::Float(x) => write!(f, "{:?}", x),
            ValueKind::Char(ch) => match ch {
                '\n' => write!(f, "\\newline"),
                ' ' => write!(f, "\\space"),
                '\t' => write!(f, "\\tab"),
                '\u{0008}' => write!(f, "\\backspace"),
                '\u{000c}' => write!(f, "\\formfeed"),
                '\r' => write!(f, "\\return"),
                _ => write!(f, "\\{}", ch),
            },
            ValueKind::String(s) => write!(f, "\"{}\"", escape_string_fragment(s)),
            ValueKind::Symbol(s) => write!(f, "{}", s),
            ValueKind::Keyword(k) => write!(f, "{}", k),
            ValueKind::List(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                write!(f, ")")
            }
            ValueKind::Vector(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            ValueKind::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
            ValueKind::Set(items) => {
                write!(f, "#{{")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            ValueKind::Regex(pattern) => write!(f, "#\"{}\"", pattern.as_str()),
            ValueKind::Instant(t) => {
                write!(f, "#inst \"{}\"", t.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
            }
            ValueKind::Uuid(u) => write!(f, "#uuid \"{}\"", u),
            ValueKind::Queue(q) => {
                write!(f, "#queue [")?;
                for (idx, item) in q.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equality_ignores_metadata() {
        let plain = Value::vector(vec![Value::int(1)]);
        let mut meta_map = HashMap::new();
        meta_map.insert(Value::simple_keyword("tag"), Value::boolean(true));
        let tagged = plain.clone().with_meta(Value::map(meta_map)).unwrap();
        assert_eq!(plain, tagged);
        assert_eq!(hash_of(&plain), hash_of(&tagged));
    }

    #[test]
    fn metadata_merges_new_wins() {
        let mut first = HashMap::new();
        first.insert(Value::simple_keyword("a"), Value::int(1));
        first.insert(Value::simple_keyword("b"), Value::int(2));
        let mut second = HashMap::new();
        second.insert(Value::simple_keyword("b"), Value::int(3));
        let value = Value::simple_symbol("x")
            .with_meta(Value::map(first))
            .unwrap()
            .with_meta(Value::map(second))
            .unwrap();
        let meta = value.meta.expect("metadata attached");
        match &meta.kind {
            ValueKind::Map(entries) => {
                assert_eq!(
                    entries.get(&Value::simple_keyword("a")),
                    Some(&Value::int(1))
                );
                assert_eq!(
                    entries.get(&Value::simple_keyword("b")),
                    Some(&Value::int(3))
                );
            }
            other => panic!("expected map metadata, got {:?}", other),
        }
    }

    #[test]
    fn metadata_rejected_on_atoms() {
        let err = Value::int(1)
            .with_meta(Value::map(HashMap::new()))
            .unwrap_err();
        assert!(err.to_string().contains("Metadata can not be applied"));
    }

    #[test]
    fn ratios_reduce_and_collapse() {
        assert_eq!(Value::ratio(3, 4).to_string(), "3/4");
        assert_eq!(Value::ratio(4, 2), Value::int(2));
        assert_eq!(Value::ratio(-3, 6).to_string(), "-1/2");
    }

    #[test]
    fn equal_maps_hash_alike() {
        let mut a = HashMap::new();
        a.insert(Value::simple_keyword("x"), Value::int(1));
        a.insert(Value::simple_keyword("y"), Value::int(2));
        let mut b = HashMap::new();
        b.insert(Value::simple_keyword("y"), Value::int(2));
        b.insert(Value::simple_keyword("x"), Value::int(1));
        let (a, b) = (Value::map(a), Value::map(b));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn gensym_ids_are_unique() {
        let a = Symbol::gensym("g__");
        let b = Symbol::gensym("g__");
        assert_ne!(a, b);
        assert!(a.name.starts_with("g__"));
    }

    #[test]
    fn printer_emits_readable_literals() {
        assert_eq!(Value::nil().to_string(), "nil");
        assert_eq!(Value::character('\n').to_string(), "\\newline");
        assert_eq!(Value::character('a').to_string(), "\\a");
        assert_eq!(Value::string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::float(150.0).to_string(), "150.0");
        assert_eq!(
            Value::list(vec![Value::int(1), Value::simple_symbol("x")]).to_string(),
            "(1 x)"
        );
        assert_eq!(
            Value::keyword(Keyword::new(Some("user".into()), "k")).to_string(),
            ":user/k"
        );
    }
}
