use crate::error::ReaderError;
use crate::reader::Reader;
use crate::value::{Symbol, Value, ValueKind};

/// Internal head symbols marking unquote forms between the `~` reader and the
/// syntax-quote transform.
pub(crate) const CORE_NS: &str = "anise.core";
pub(crate) const UNQUOTE_NAME: &str = "unquote";
pub(crate) const UNQUOTE_SPLICING_NAME: &str = "unquote-splicing";

pub(crate) fn unquote_form(arg: Value) -> Value {
    Value::list(vec![
        Value::symbol(Symbol::new(Some(CORE_NS.into()), UNQUOTE_NAME)),
        arg,
    ])
}

pub(crate) fn unquote_splicing_form(arg: Value) -> Value {
    Value::list(vec![
        Value::symbol(Symbol::new(Some(CORE_NS.into()), UNQUOTE_SPLICING_NAME)),
        arg,
    ])
}

pub(crate) fn is_unquote(form: &Value) -> bool {
    head_is(form, UNQUOTE_NAME)
}

pub(crate) fn is_unquote_splicing(form: &Value) -> bool {
    head_is(form, UNQUOTE_SPLICING_NAME)
}

fn head_is(form: &Value, name: &str) -> bool {
    match &form.kind {
        ValueKind::List(items) => match items.first().map(|head| &head.kind) {
            Some(ValueKind::Symbol(sym)) => {
                sym.ns.as_deref() == Some(CORE_NS) && sym.name == name
            }
            _ => false,
        },
        _ => false,
    }
}

fn unquote_arg(form: &Value) -> Value {
    match &form.kind {
        ValueKind::List(items) => items.get(1).cloned().unwrap_or_else(Value::nil),
        _ => Value::nil(),
    }
}

/// Rewrite a form into an expression that rebuilds an equivalent tree when
/// evaluated. Auto-gensyms draw from the reader's active gensym environment;
/// symbol resolution goes through the reader's resolver.
pub(crate) fn syntax_quote(rdr: &mut Reader, form: &Value) -> Result<Value, ReaderError> {
    if is_unquote(form) {
        return Ok(unquote_arg(form));
    }
    if is_unquote_splicing(form) {
        return Err(ReaderError::macro_position("splice not in list"));
    }

    let ret = match &form.kind {
        ValueKind::Symbol(sym) => {
            if rdr.options.resolver.is_special(sym) {
                quote(form.clone())
            } else {
                expand_symbol(rdr, sym)?
            }
        }
        ValueKind::Nil => quote(Value::nil()),
        ValueKind::Map(entries) => {
            let flattened: Vec<Value> = entries
                .iter()
                .flat_map(|(k, v)| [k.clone(), v.clone()])
                .collect();
            apply_call("hash-map", expand_items(rdr, &flattened)?)
        }
        ValueKind::Vector(items) => apply_call("vector", expand_items(rdr, items)?),
        ValueKind::Set(items) => {
            let collected: Vec<Value> = items.iter().cloned().collect();
            apply_call("hash-set", expand_items(rdr, &collected)?)
        }
        ValueKind::List(items) => {
            if items.is_empty() {
                Value::list(vec![Value::simple_symbol("list")])
            } else {
                expand_items(rdr, items)?
            }
        }
        ValueKind::Queue(queue) => {
            let collected: Vec<Value> = queue.iter().cloned().collect();
            if collected.is_empty() {
                Value::list(vec![Value::simple_symbol("list")])
            } else {
                expand_items(rdr, &collected)?
            }
        }
        ValueKind::Keyword(_)
        | ValueKind::Int(_)
        | ValueKind::Ratio { .. }
        | ValueKind::Float(_)
        | ValueKind::Char(_)
        | ValueKind::String(_) => form.clone(),
        _ => quote(form.clone()),
    };

    if let Some(meta) = form.meta.clone() {
        if !meta_is_empty(meta.as_ref()) {
            let expanded_meta = syntax_quote(rdr, meta.as_ref())?;
            return Ok(Value::list(vec![
                Value::simple_symbol("with-meta"),
                ret,
                expanded_meta,
            ]));
        }
    }
    Ok(ret)
}

fn expand_symbol(rdr: &mut Reader, sym: &Symbol) -> Result<Value, ReaderError> {
    if sym.ns.is_none() {
        if let Some(stripped) = sym.name.strip_suffix('#') {
            let env = rdr
                .gensym_env
                .as_mut()
                .ok_or_else(|| ReaderError::macro_position("Gensym literal not in syntax quote"))?;
            let generated = env
                .entry(sym.name.clone())
                .or_insert_with(|| Symbol::gensym(&format!("{}__auto__", stripped)))
                .clone();
            return Ok(quote(Value::symbol(generated)));
        }
        if let Some(stripped) = sym.name.strip_suffix('.') {
            // Constructor sugar: resolve the bare name, then put the dot back.
            let resolved = rdr.options.resolver.resolve(&Symbol::simple(stripped));
            let renamed = Symbol::new(resolved.ns, format!("{}.", resolved.name));
            return Ok(quote(Value::symbol(renamed)));
        }
        if sym.name.starts_with('.') {
            return Ok(quote(Value::symbol(sym.clone())));
        }
    }
    let resolved = rdr.options.resolver.resolve(sym);
    Ok(quote(Value::symbol(resolved)))
}

/// Expand collection items into a `(seq (concat ...))` call. Unquoted items
/// contribute single-element lists; spliced items contribute themselves.
fn expand_items(rdr: &mut Reader, items: &[Value]) -> Result<Value, ReaderError> {
    let mut concat_call = Vec::with_capacity(items.len() + 1);
    concat_call.push(Value::simple_symbol("concat"));
    for item in items {
        if is_unquote(item) {
            concat_call.push(Value::list(vec![
                Value::simple_symbol("list"),
                unquote_arg(item),
            ]));
        } else if is_unquote_splicing(item) {
            concat_call.push(unquote_arg(item));
        } else {
            concat_call.push(Value::list(vec![
                Value::simple_symbol("list"),
                syntax_quote(rdr, item)?,
            ]));
        }
    }
    Ok(Value::list(vec![
        Value::simple_symbol("seq"),
        Value::list(concat_call),
    ]))
}

fn apply_call(ctor: &str, seq_form: Value) -> Value {
    Value::list(vec![
        Value::simple_symbol("apply"),
        Value::simple_symbol(ctor),
        seq_form,
    ])
}

fn quote(form: Value) -> Value {
    Value::list(vec![Value::simple_symbol("quote"), form])
}

fn meta_is_empty(meta: &Value) -> bool {
    matches!(&meta.kind, ValueKind::Map(entries) if entries.is_empty())
}

#[cfg(test)]
mod tests {
    use crate::read_string;

    fn expansion(src: &str) -> String {
        read_string(src)
            .unwrap_or_else(|err| panic!("failed to read {:?}: {}", src, err))
            .to_string()
    }

    #[test]
    fn quoted_list_expands_to_seq_concat() {
        assert_eq!(
            expansion("`(a ~b ~@c)"),
            "(seq (concat (list (quote user/a)) (list b) c))"
        );
    }

    #[test]
    fn quoted_vector_uses_apply_vector() {
        assert_eq!(
            expansion("`[~a ~@b]"),
            "(apply vector (seq (concat (list a) b)))"
        );
    }

    #[test]
    fn quoted_map_flattens_pairs() {
        assert_eq!(
            expansion("`{:k ~v}"),
            "(apply hash-map (seq (concat (list :k) (list v))))"
        );
    }

    #[test]
    fn quoted_set_uses_apply_hash_set() {
        assert_eq!(
            expansion("`#{~a}"),
            "(apply hash-set (seq (concat (list a))))"
        );
    }

    #[test]
    fn empty_list_becomes_list_call() {
        assert_eq!(expansion("`()"), "(list)");
    }

    #[test]
    fn special_forms_stay_unqualified() {
        assert_eq!(expansion("`def"), "(quote def)");
        assert_eq!(expansion("`fn*"), "(quote fn*)");
    }

    #[test]
    fn member_access_sugar_is_untouched() {
        assert_eq!(expansion("`.foo"), "(quote .foo)");
    }

    #[test]
    fn constructor_sugar_keeps_the_dot() {
        assert_eq!(expansion("`Point."), "(quote user/Point.)");
    }

    #[test]
    fn atoms_pass_through() {
        assert_eq!(expansion("`:kw"), ":kw");
        assert_eq!(expansion("`42"), "42");
        assert_eq!(expansion("`\"s\""), "\"s\"");
        assert_eq!(expansion("`nil"), "(quote nil)");
        assert_eq!(expansion("`true"), "(quote true)");
    }

    #[test]
    fn unquote_at_top_level_unwraps() {
        assert_eq!(expansion("`~a"), "a");
    }

    #[test]
    fn splice_at_top_level_is_rejected() {
        let err = read_string("`~@a").unwrap_err();
        assert_eq!(err.to_string(), "splice not in list");
    }

    #[test]
    fn metadata_wraps_the_expansion() {
        let printed = expansion("`^:k [1]");
        assert!(printed.starts_with("(with-meta (apply vector"), "{}", printed);
        assert!(printed.contains(":k"), "{}", printed);
    }
}
