use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use im::{HashMap as ValueMap, HashSet as ValueSet};
use regex::Regex;

use crate::error::ReaderError;
use crate::number;
use crate::pushback::PushbackReader;
use crate::reader_tags;
use crate::resolver::{NamespaceResolver, Resolver};
use crate::string_escape;
use crate::symbols;
use crate::syntax_quote;
use crate::value::{next_gensym_id, Symbol, Value, ValueKind};

#[derive(Clone)]
pub struct ReaderOptions {
    pub resolver: Arc<dyn Resolver>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            resolver: Arc::new(NamespaceResolver::new("user")),
        }
    }
}

/// What a macro parser produced. Comment and discard forms consume input
/// without yielding a value.
pub enum ReadOutcome {
    Produced(Value),
    Skipped,
}

pub struct Reader {
    rdr: PushbackReader,
    pub options: ReaderOptions,
    pub(crate) gensym_env: Option<HashMap<String, Symbol>>,
    pub(crate) arg_env: Option<BTreeMap<i64, Symbol>>,
}

impl Reader {
    pub fn new(source: &str) -> Self {
        Self::new_with_options(source, ReaderOptions::default())
    }

    pub fn new_with_options(source: &str, options: ReaderOptions) -> Self {
        Self {
            rdr: PushbackReader::new(source),
            options,
            gensym_env: None,
            arg_env: None,
        }
    }

    /// Read one form. At end of stream, `eof_is_error` decides between an
    /// error and `Ok(None)`.
    pub fn read(&mut self, eof_is_error: bool) -> Result<Option<Value>, ReaderError> {
        loop {
            self.skip_whitespace();
            let Some(ch) = self.rdr.read_char() else {
                if eof_is_error {
                    return Err(ReaderError::eof("EOF while reading"));
                }
                return Ok(None);
            };
            if is_macro(ch) {
                match self.invoke_macro(ch)? {
                    ReadOutcome::Produced(value) => return Ok(Some(value)),
                    ReadOutcome::Skipped => continue,
                }
            }
            if self.at_number_start(ch) {
                return Ok(Some(self.read_number(ch)?));
            }
            let token = self.read_token(ch);
            return Ok(Some(symbols::interpret_token(&token)?));
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<Value>, ReaderError> {
        let mut values = Vec::new();
        while let Some(value) = self.read(false)? {
            values.push(value);
        }
        Ok(values)
    }

    /// Recursive entry used by macro parsers: end of stream is always an
    /// error here.
    fn read_form(&mut self) -> Result<Value, ReaderError> {
        match self.read(true)? {
            Some(value) => Ok(value),
            None => Err(ReaderError::eof("EOF while reading")),
        }
    }

    fn invoke_macro(&mut self, ch: char) -> Result<ReadOutcome, ReaderError> {
        match ch {
            '"' => self.read_string().map(ReadOutcome::Produced),
            ':' => self.read_keyword().map(ReadOutcome::Produced),
            ';' => {
                self.skip_line();
                Ok(ReadOutcome::Skipped)
            }
            '\'' => self.read_wrapped("quote").map(ReadOutcome::Produced),
            '@' => self.read_wrapped("deref").map(ReadOutcome::Produced),
            '^' => self.read_meta().map(ReadOutcome::Produced),
            '`' => self.read_syntax_quote().map(ReadOutcome::Produced),
            '~' => self.read_unquote().map(ReadOutcome::Produced),
            '(' => self.read_list().map(ReadOutcome::Produced),
            '[' => self.read_vector().map(ReadOutcome::Produced),
            '{' => self.read_map().map(ReadOutcome::Produced),
            ')' | ']' | '}' => Err(ReaderError::structural(format!(
                "Unmatched delimiter: {}",
                ch
            ))),
            '\\' => self.read_char_literal().map(ReadOutcome::Produced),
            '%' => self.read_arg().map(ReadOutcome::Produced),
            '#' => self.read_dispatch(),
            _ => Err(ReaderError::structural(format!(
                "Unknown macro character: {}",
                ch
            ))),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.rdr.read_char() {
            if !is_whitespace(ch) {
                self.rdr.unread(ch);
                break;
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.rdr.read_char() {
            if ch == '\n' {
                break;
            }
        }
    }

    /// Accumulate a maximal run of non-terminating characters starting with
    /// `initial`; the terminator is pushed back.
    fn read_token(&mut self, initial: char) -> String {
        let mut token = String::new();
        token.push(initial);
        while let Some(ch) = self.rdr.read_char() {
            if is_whitespace(ch) || is_terminating_macro(ch) {
                self.rdr.unread(ch);
                break;
            }
            token.push(ch);
        }
        token
    }

    fn at_number_start(&mut self, ch: char) -> bool {
        if ch.is_ascii_digit() {
            return true;
        }
        if ch == '+' || ch == '-' {
            if let Some(next) = self.rdr.peek_char() {
                return next.is_ascii_digit();
            }
        }
        false
    }

    fn read_number(&mut self, initial: char) -> Result<Value, ReaderError> {
        let token = self.read_token(initial);
        match number::match_number(&token)? {
            Some(value) => Ok(value),
            None => Err(ReaderError::lexical(format!(
                "Invalid number format: {}",
                token
            ))),
        }
    }

    fn read_wrapped(&mut self, head: &str) -> Result<Value, ReaderError> {
        let form = self.read_form()?;
        Ok(Value::list(vec![Value::simple_symbol(head), form]))
    }

    /// Shared driver for list, vector, map, and set bodies. The opening
    /// delimiter has already been consumed.
    fn read_delimited(&mut self, closing: char) -> Result<Vec<Value>, ReaderError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(ch) = self.rdr.read_char() else {
                return Err(ReaderError::eof("EOF while reading"));
            };
            if ch == closing {
                return Ok(items);
            }
            if is_macro(ch) {
                match self.invoke_macro(ch)? {
                    ReadOutcome::Produced(value) => items.push(value),
                    ReadOutcome::Skipped => {}
                }
                continue;
            }
            self.rdr.unread(ch);
            match self.read(true)? {
                Some(value) => items.push(value),
                None => return Err(ReaderError::eof("EOF while reading")),
            }
        }
    }

    fn read_list(&mut self) -> Result<Value, ReaderError> {
        Ok(Value::list(self.read_delimited(')')?))
    }

    fn read_vector(&mut self) -> Result<Value, ReaderError> {
        Ok(Value::vector(self.read_delimited(']')?))
    }

    fn read_map(&mut self) -> Result<Value, ReaderError> {
        let items = self.read_delimited('}')?;
        if items.len() % 2 != 0 {
            return Err(ReaderError::structural(
                "Map literal must contain an even number of forms",
            ));
        }
        let mut entries = ValueMap::new();
        for pair in items.chunks(2) {
            if entries.insert(pair[0].clone(), pair[1].clone()).is_some() {
                return Err(ReaderError::structural(format!(
                    "Duplicate key: {}",
                    pair[0]
                )));
            }
        }
        Ok(Value::map(entries))
    }

    fn read_set(&mut self) -> Result<Value, ReaderError> {
        let items = self.read_delimited('}')?;
        let mut set = ValueSet::new();
        for item in items {
            let printed = item.to_string();
            if set.insert(item).is_some() {
                return Err(ReaderError::structural(format!("Duplicate key: {}", printed)));
            }
        }
        Ok(Value::set(set))
    }

    fn read_string(&mut self) -> Result<Value, ReaderError> {
        let mut buf = String::new();
        loop {
            let Some(ch) = self.rdr.read_char() else {
                return Err(ReaderError::eof("EOF while reading string"));
            };
            match ch {
                '"' => return Ok(Value::string(buf)),
                '\\' => {
                    let Some(esc) = self.rdr.read_char() else {
                        return Err(ReaderError::eof("EOF while reading string"));
                    };
                    if let Some(real) = string_escape::translate_escape(esc) {
                        buf.push(real);
                    } else if esc == 'x' {
                        buf.push(self.read_unicode_char(2)?);
                    } else if esc == 'u' {
                        buf.push(self.read_unicode_char(4)?);
                    } else if let Some(digit) = esc.to_digit(10) {
                        // Legacy form: a bare digit escapes to its own code
                        // point.
                        let ch = char::from_u32(digit).ok_or_else(|| {
                            ReaderError::lexical(format!("Invalid unicode escape: \\{}", esc))
                        })?;
                        buf.push(ch);
                    } else {
                        return Err(ReaderError::lexical(format!(
                            "Unsupported escape character: \\{}",
                            esc
                        )));
                    }
                }
                _ => buf.push(ch),
            }
        }
    }

    fn read_unicode_char(&mut self, digits: u32) -> Result<char, ReaderError> {
        let mut code: u32 = 0;
        for _ in 0..digits {
            let Some(ch) = self.rdr.read_char() else {
                return Err(ReaderError::eof("EOF while reading string"));
            };
            let digit = ch.to_digit(16).ok_or_else(|| {
                ReaderError::lexical(format!("Invalid unicode escape: {}", ch))
            })?;
            code = code * 16 + digit;
        }
        char::from_u32(code)
            .ok_or_else(|| ReaderError::lexical(format!("Invalid unicode escape: {:x}", code)))
    }

    fn read_keyword(&mut self) -> Result<Value, ReaderError> {
        let Some(ch) = self.rdr.read_char() else {
            return Err(ReaderError::lexical("Invalid token: :"));
        };
        if is_whitespace(ch) || is_terminating_macro(ch) {
            self.rdr.unread(ch);
            return Err(ReaderError::lexical("Invalid token: :"));
        }
        let token = self.read_token(ch);
        let keyword = symbols::interpret_keyword(&token, self.options.resolver.current_ns())?;
        Ok(Value::keyword(keyword))
    }

    fn read_meta(&mut self) -> Result<Value, ReaderError> {
        let meta_form = self.read_form()?;
        let meta = if matches!(meta_form.kind, ValueKind::Symbol(_) | ValueKind::String(_)) {
            let mut entries = ValueMap::new();
            entries.insert(Value::simple_keyword("tag"), meta_form);
            Value::map(entries)
        } else if matches!(meta_form.kind, ValueKind::Keyword(_)) {
            let mut entries = ValueMap::new();
            entries.insert(meta_form, Value::boolean(true));
            Value::map(entries)
        } else if matches!(meta_form.kind, ValueKind::Map(_)) {
            meta_form
        } else {
            return Err(ReaderError::structural(
                "Metadata must be Symbol, Keyword, String or Map",
            ));
        };
        let target = self.read_form()?;
        target.with_meta(meta)
    }

    fn read_syntax_quote(&mut self) -> Result<Value, ReaderError> {
        // A fresh gensym environment only at the top-level entry; nested
        // syntax-quotes share it.
        let installed = self.gensym_env.is_none();
        if installed {
            self.gensym_env = Some(HashMap::new());
        }
        let result = self
            .read_form()
            .and_then(|form| syntax_quote::syntax_quote(self, &form));
        if installed {
            self.gensym_env = None;
        }
        result
    }

    fn read_unquote(&mut self) -> Result<Value, ReaderError> {
        let Some(ch) = self.rdr.read_char() else {
            return Err(ReaderError::eof("EOF while reading"));
        };
        if ch == '@' {
            let form = self.read_form()?;
            Ok(syntax_quote::unquote_splicing_form(form))
        } else {
            self.rdr.unread(ch);
            let form = self.read_form()?;
            Ok(syntax_quote::unquote_form(form))
        }
    }

    fn read_char_literal(&mut self) -> Result<Value, ReaderError> {
        let Some(ch) = self.rdr.read_char() else {
            return Err(ReaderError::eof("EOF while reading character"));
        };
        let token = self.read_token(ch);
        let mut chars = token.chars();
        if let (Some(only), None) = (chars.next(), chars.next()) {
            return Ok(Value::character(only));
        }
        let value = match token.as_str() {
            "newline" => '\n',
            "space" => ' ',
            "tab" => '\t',
            "backspace" => '\u{0008}',
            "formfeed" => '\u{000c}',
            "return" => '\r',
            _ if token.starts_with('u') && token.len() == 5 => {
                let code = u32::from_str_radix(&token[1..], 16).map_err(|_| {
                    ReaderError::lexical(format!("Unsupported character: \\{}", token))
                })?;
                if (0xD800..=0xDFFF).contains(&code) {
                    return Err(ReaderError::lexical(format!(
                        "Invalid character constant: \\{}",
                        token
                    )));
                }
                char::from_u32(code).ok_or_else(|| {
                    ReaderError::lexical(format!("Invalid character constant: \\{}", token))
                })?
            }
            _ if token.starts_with('o') && (2..=4).contains(&token.len()) => {
                let code = u32::from_str_radix(&token[1..], 8).map_err(|_| {
                    ReaderError::lexical(format!("Unsupported character: \\{}", token))
                })?;
                if code > 0o377 {
                    return Err(ReaderError::lexical(
                        "Octal escape sequence must be in range [0, 377]",
                    ));
                }
                char::from_u32(code).ok_or_else(|| {
                    ReaderError::lexical(format!("Invalid character constant: \\{}", token))
                })?
            }
            _ => {
                return Err(ReaderError::lexical(format!(
                    "Unsupported character: \\{}",
                    token
                )))
            }
        };
        Ok(Value::character(value))
    }

    fn read_arg(&mut self) -> Result<Value, ReaderError> {
        if self.arg_env.is_none() {
            // Outside #() a percent token is an ordinary symbol.
            let token = self.read_token('%');
            return symbols::interpret_token(&token);
        }
        match self.rdr.peek_char() {
            None => Ok(Value::symbol(self.register_arg(1)?)),
            Some(ch) if is_whitespace(ch) || is_terminating_macro(ch) => {
                Ok(Value::symbol(self.register_arg(1)?))
            }
            Some(_) => {
                let form = self.read_form()?;
                match &form.kind {
                    ValueKind::Symbol(sym) if sym.ns.is_none() && sym.name == "&" => {
                        Ok(Value::symbol(self.register_arg(-1)?))
                    }
                    ValueKind::Int(n) if *n >= 0 => Ok(Value::symbol(self.register_arg(*n)?)),
                    _ => Err(ReaderError::lexical("arg literal must be %, %& or %integer")),
                }
            }
        }
    }

    fn register_arg(&mut self, n: i64) -> Result<Symbol, ReaderError> {
        let env = self
            .arg_env
            .as_mut()
            .ok_or_else(|| ReaderError::macro_position("arg literal not in #()"))?;
        if let Some(sym) = env.get(&n) {
            return Ok(sym.clone());
        }
        let sym = garg(n);
        env.insert(n, sym.clone());
        Ok(sym)
    }

    fn read_dispatch(&mut self) -> Result<ReadOutcome, ReaderError> {
        let Some(ch) = self.rdr.read_char() else {
            return Err(ReaderError::eof("EOF while reading"));
        };
        match ch {
            '{' => self.read_set().map(ReadOutcome::Produced),
            '(' => self.read_fn().map(ReadOutcome::Produced),
            '<' => Err(ReaderError::structural("Unreadable form")),
            '"' => self.read_regex().map(ReadOutcome::Produced),
            '!' => {
                self.skip_line();
                Ok(ReadOutcome::Skipped)
            }
            '_' => {
                self.read_form()?;
                Ok(ReadOutcome::Skipped)
            }
            _ => {
                self.rdr.unread(ch);
                self.read_tagged().map(ReadOutcome::Produced)
            }
        }
    }

    /// Regex bodies are taken verbatim; a backslash carries the next
    /// character through, including a quote.
    fn read_regex(&mut self) -> Result<Value, ReaderError> {
        let mut buf = String::new();
        loop {
            let Some(ch) = self.rdr.read_char() else {
                return Err(ReaderError::eof("EOF while reading regex"));
            };
            if ch == '"' {
                break;
            }
            buf.push(ch);
            if ch == '\\' {
                let Some(next) = self.rdr.read_char() else {
                    return Err(ReaderError::eof("EOF while reading regex"));
                };
                buf.push(next);
            }
        }
        let pattern = Regex::new(&buf)
            .map_err(|err| ReaderError::lexical(format!("Invalid regex: {}", err)))?;
        Ok(Value::regex(pattern))
    }

    fn read_fn(&mut self) -> Result<Value, ReaderError> {
        if self.arg_env.is_some() {
            return Err(ReaderError::structural("Nested #()s are not allowed"));
        }
        self.arg_env = Some(BTreeMap::new());
        self.rdr.unread('(');
        let body = self.read_form();
        let env = self.arg_env.take().unwrap_or_default();
        let body = body?;

        let highest = env.keys().filter(|k| **k > 0).max().copied().unwrap_or(0);
        let mut args = Vec::new();
        for idx in 1..=highest {
            let sym = env.get(&idx).cloned().unwrap_or_else(|| garg(idx));
            args.push(Value::symbol(sym));
        }
        if let Some(rest) = env.get(&-1) {
            args.push(Value::simple_symbol("&"));
            args.push(Value::symbol(rest.clone()));
        }
        Ok(Value::list(vec![
            Value::simple_symbol("fn*"),
            Value::vector(args),
            body,
        ]))
    }

    fn read_tagged(&mut self) -> Result<Value, ReaderError> {
        let tag_form = self.read_form()?;
        let ValueKind::Symbol(tag) = &tag_form.kind else {
            return Err(ReaderError::structural("Reader tag must be a symbol"));
        };
        let tag_name = tag.to_string();
        let handler = reader_tags::lookup(&tag_name).ok_or_else(|| {
            ReaderError::semantic(format!(
                "No reader function for tag {}. Registered tags: {}",
                tag_name,
                reader_tags::registered_tags().join(", ")
            ))
        })?;
        let argument = self.read_form()?;
        handler(argument)
    }
}

fn garg(n: i64) -> Symbol {
    let prefix = if n == -1 {
        "rest".to_string()
    } else {
        format!("p{}", n)
    };
    Symbol::simple(format!("{}__{}#", prefix, next_gensym_id()))
}

/// Whitespace for the reader includes commas.
fn is_whitespace(ch: char) -> bool {
    ch.is_whitespace() || ch == ','
}

fn is_macro(ch: char) -> bool {
    matches!(
        ch,
        '"' | ':' | ';' | '\'' | '@' | '^' | '`' | '~' | '(' | ')' | '[' | ']' | '{' | '}' | '\\'
            | '%' | '#'
    )
}

fn is_terminating_macro(ch: char) -> bool {
    is_macro(ch) && !matches!(ch, '#' | '\'' | ':')
}
