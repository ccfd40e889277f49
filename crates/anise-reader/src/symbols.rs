use crate::error::ReaderError;
use crate::value::{Keyword, Symbol, Value};

/// Turn a scanned token into nil, a boolean, or a symbol.
pub(crate) fn interpret_token(token: &str) -> Result<Value, ReaderError> {
    match token {
        "nil" => Ok(Value::nil()),
        "true" => Ok(Value::boolean(true)),
        "false" => Ok(Value::boolean(false)),
        _ => Ok(Value::symbol(parse_symbol(token)?)),
    }
}

/// Split a token into namespace and name on the first `/`. The bare token
/// `/` names the division function and stays a simple symbol.
pub(crate) fn parse_symbol(token: &str) -> Result<Symbol, ReaderError> {
    if token.is_empty() {
        return Err(invalid_token(token));
    }
    if token == "/" {
        return Ok(Symbol::simple("/"));
    }
    match token.split_once('/') {
        None => {
            if token.ends_with(':') {
                return Err(invalid_token(token));
            }
            Ok(Symbol::simple(token))
        }
        Some((ns, name)) => {
            if ns.is_empty() || name.is_empty() {
                return Err(invalid_token(token));
            }
            if ns.ends_with(':') || name.ends_with(':') || name.ends_with('/') {
                return Err(invalid_token(token));
            }
            Ok(Symbol::new(Some(ns.to_string()), name))
        }
    }
}

/// Interpret a keyword token. The leading `:` has already been consumed; a
/// remaining leading `:` marks an auto-namespaced keyword resolved against
/// the supplied default namespace.
pub(crate) fn interpret_keyword(token: &str, default_ns: &str) -> Result<Keyword, ReaderError> {
    let invalid = || ReaderError::lexical(format!("Invalid token: :{}", token));
    let (auto, body) = match token.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if body.is_empty() || body.contains("::") {
        return Err(invalid());
    }
    match body.split_once('/') {
        None => {
            if body.ends_with(':') {
                return Err(invalid());
            }
            let ns = auto.then(|| default_ns.to_string());
            Ok(Keyword::new(ns, body))
        }
        Some((ns, name)) => {
            // Auto-namespacing combined with an explicit namespace would need
            // an alias table, which the resolver seam does not expose.
            if auto || ns.is_empty() || name.is_empty() {
                return Err(invalid());
            }
            if ns.ends_with(':') || name.ends_with(':') || name.ends_with('/') {
                return Err(invalid());
            }
            Ok(Keyword::new(Some(ns.to_string()), name))
        }
    }
}

fn invalid_token(token: &str) -> ReaderError {
    ReaderError::lexical(format!("Invalid token: {}", token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn reserved_tokens_become_literals() {
        assert!(matches!(interpret_token("nil").unwrap().kind, ValueKind::Nil));
        assert!(matches!(
            interpret_token("true").unwrap().kind,
            ValueKind::Bool(true)
        ));
        assert!(matches!(
            interpret_token("false").unwrap().kind,
            ValueKind::Bool(false)
        ));
    }

    #[test]
    fn namespace_splits_on_first_slash() {
        let sym = parse_symbol("user/handle").unwrap();
        assert_eq!(sym.ns.as_deref(), Some("user"));
        assert_eq!(sym.name, "handle");
        let deep = parse_symbol("a/b/c").unwrap();
        assert_eq!(deep.ns.as_deref(), Some("a"));
        assert_eq!(deep.name, "b/c");
    }

    #[test]
    fn division_symbol_survives() {
        let sym = parse_symbol("/").unwrap();
        assert!(sym.ns.is_none());
        assert_eq!(sym.name, "/");
    }

    #[test]
    fn malformed_symbols_are_rejected() {
        assert!(parse_symbol("foo/").is_err());
        assert!(parse_symbol("/bar").is_err());
        assert!(parse_symbol("foo:").is_err());
        assert!(parse_symbol("foo:/bar").is_err());
    }

    #[test]
    fn plain_and_qualified_keywords() {
        let kw = interpret_keyword("a", "user").unwrap();
        assert!(kw.ns.is_none());
        assert_eq!(kw.name, "a");
        let kw = interpret_keyword("ns/a", "user").unwrap();
        assert_eq!(kw.ns.as_deref(), Some("ns"));
        assert_eq!(kw.name, "a");
    }

    #[test]
    fn auto_namespaced_keyword_uses_default_ns() {
        let kw = interpret_keyword(":local", "user").unwrap();
        assert_eq!(kw.ns.as_deref(), Some("user"));
        assert_eq!(kw.name, "local");
    }

    #[test]
    fn malformed_keywords_are_rejected() {
        assert!(interpret_keyword("", "user").is_err());
        assert!(interpret_keyword(":", "user").is_err());
        assert!(interpret_keyword("a:", "user").is_err());
        assert!(interpret_keyword("a::b", "user").is_err());
        assert!(interpret_keyword(":ns/name", "user").is_err());
        assert!(interpret_keyword("ns:/name", "user").is_err());
        assert!(interpret_keyword("ns/name:", "user").is_err());
    }
}
