//! A small Go source scanner.
//!
//! Covers just enough of the grammar to list top-level function
//! declarations with their receivers, result types and body extents.
//! Comments and literals are skipped so brackets inside them never count.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ident,
    Punct(u8),
    Literal,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn tokenize(src: &str) -> Vec<Token> {
    let b = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < b.len() {
        let start = i;
        match b[i] {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'/' if b.get(i + 1) == Some(&b'/') => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if b.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(b.len());
                continue;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < b.len() && b[i] != quote && b[i] != b'\n' {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(b.len());
                tokens.push(Token { kind: Kind::Literal, start, end: i });
            }
            b'`' => {
                i += 1;
                while i < b.len() && b[i] != b'`' {
                    i += 1;
                }
                i = (i + 1).min(b.len());
                tokens.push(Token { kind: Kind::Literal, start, end: i });
            }
            c if c.is_ascii_digit() => {
                while i < b.len() && (is_ident_byte(b[i]) || b[i] == b'.') {
                    i += 1;
                }
                tokens.push(Token { kind: Kind::Literal, start, end: i });
            }
            c if is_ident_byte(c) => {
                while i < b.len() && is_ident_byte(b[i]) {
                    i += 1;
                }
                tokens.push(Token { kind: Kind::Ident, start, end: i });
            }
            c => {
                i += 1;
                tokens.push(Token { kind: Kind::Punct(c), start, end: i });
            }
        }
    }

    tokens
}

fn is_open(t: &Token) -> bool {
    matches!(t.kind, Kind::Punct(b'(' | b'[' | b'{'))
}

fn is_close(t: &Token) -> bool {
    matches!(t.kind, Kind::Punct(b')' | b']' | b'}'))
}

fn is_punct(t: Option<&Token>, c: u8) -> bool {
    t.is_some_and(|t| t.kind == Kind::Punct(c))
}

/// Index of the bracket closing the one at `open`.
fn matching(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if is_open(t) {
            depth += 1;
        } else if is_close(t) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// One top-level `func` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: String,
    /// Receiver type name, without pointer or type parameters.
    pub receiver: Option<String>,
    /// Byte offset of the `func` keyword.
    pub start: usize,
    /// Byte offset just past the closing brace.
    pub end: usize,
    /// 1-based line of the `func` keyword.
    pub line: usize,
    /// 1-based line of the closing brace.
    pub end_line: usize,
    /// Result types in order.
    pub results: Vec<String>,
}

impl FuncDecl {
    pub fn returns_error(&self) -> bool {
        self.results.last().is_some_and(|r| r == "error")
    }
}

/// Declarations found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub package: Option<String>,
    pub funcs: Vec<FuncDecl>,
}

impl SourceFile {
    /// The declaration whose extent contains `offset`.
    pub fn enclosing(&self, offset: usize) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| f.start <= offset && offset < f.end)
    }

    pub fn find(&self, name: &str) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| f.name == name)
    }

    pub fn find_ignore_case(&self, name: &str) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn find_matching(&self, re: &Regex) -> Option<&FuncDecl> {
        self.funcs.iter().find(|f| re.is_match(&f.name))
    }

    /// Functions declared on lines `first..=last`, in source order.
    pub fn in_lines(&self, first: usize, last: usize) -> Vec<&FuncDecl> {
        self.funcs
            .iter()
            .filter(|f| f.line <= last && f.end_line >= first)
            .collect()
    }
}

/// 1-based line number of byte `offset`.
pub fn line_of(src: &str, offset: usize) -> usize {
    let end = offset.min(src.len());
    src.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Scan `src` for its package clause and function declarations.
pub fn scan(src: &str) -> SourceFile {
    let tokens = tokenize(src);
    let mut file = SourceFile::default();
    let mut depth = 0i32;
    let mut i = 0;

    while i < tokens.len() {
        let t = tokens[i];
        if is_open(&t) {
            depth += 1;
        } else if is_close(&t) {
            depth -= 1;
        } else if t.kind == Kind::Ident && depth == 0 {
            match &src[t.start..t.end] {
                "package" if file.package.is_none() => {
                    file.package = tokens
                        .get(i + 1)
                        .filter(|n| n.kind == Kind::Ident)
                        .map(|n| src[n.start..n.end].to_string());
                }
                "func" => {
                    if let Some((decl, next)) = parse_func(src, &tokens, i) {
                        file.funcs.push(decl);
                        i = next;
                        continue;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    file
}

fn parse_func(src: &str, tokens: &[Token], at: usize) -> Option<(FuncDecl, usize)> {
    let mut i = at + 1;

    let mut receiver = None;
    if is_punct(tokens.get(i), b'(') {
        let close = matching(tokens, i)?;
        receiver = receiver_type(src, &tokens[i + 1..close]);
        i = close + 1;
    }

    let name_tok = tokens.get(i).filter(|t| t.kind == Kind::Ident)?;
    let name = src[name_tok.start..name_tok.end].to_string();
    i += 1;

    if is_punct(tokens.get(i), b'[') {
        i = matching(tokens, i)? + 1;
    }
    if !is_punct(tokens.get(i), b'(') {
        return None;
    }
    let params_close = matching(tokens, i)?;
    i = params_close + 1;

    // Results run up to the body brace; `interface{}` and `struct{}`
    // braces belong to the results.
    let mut depth = 0i32;
    let body = loop {
        let t = tokens.get(i)?;
        match t.kind {
            Kind::Punct(b'(' | b'[') => depth += 1,
            Kind::Punct(b')' | b']') => depth -= 1,
            Kind::Punct(b'{') if depth == 0 => {
                let prev = &tokens[i - 1];
                let prev_word = &src[prev.start..prev.end];
                if prev.kind == Kind::Ident && (prev_word == "interface" || prev_word == "struct") {
                    i = matching(tokens, i)? + 1;
                    continue;
                }
                break i;
            }
            _ => {}
        }
        i += 1;
    };

    let body_close = matching(tokens, body)?;
    let start = tokens[at].start;
    let end = tokens[body_close].end;
    let results = split_results(&src[tokens[params_close].end..tokens[body].start]);

    let decl = FuncDecl {
        name,
        receiver,
        start,
        end,
        line: line_of(src, start),
        end_line: line_of(src, tokens[body_close].start),
        results,
    };
    Some((decl, body_close + 1))
}

fn receiver_type(src: &str, tokens: &[Token]) -> Option<String> {
    let mut depth = 0i32;
    let mut last = None;
    for t in tokens {
        if is_open(t) {
            depth += 1;
        } else if is_close(t) {
            depth -= 1;
        } else if t.kind == Kind::Ident && depth == 0 {
            last = Some(src[t.start..t.end].to_string());
        }
    }
    last
}

const TYPE_KEYWORDS: &[&str] = &["chan", "func", "map", "struct", "interface"];

/// Split on commas outside brackets.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[last..i].trim());
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[last..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// `name Type` when the part starts with a parameter name.
fn split_named(part: &str) -> Option<(&str, &str)> {
    let (first, rest) = part.split_once(char::is_whitespace)?;
    let is_ident = first.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !first.starts_with(|c: char| c.is_ascii_digit());
    (is_ident && !TYPE_KEYWORDS.contains(&first) && !rest.trim().is_empty())
        .then(|| (first, rest.trim()))
}

/// Result types of a signature tail such as `(n int, err error)`.
pub fn split_results(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let inner = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => inner,
        None => return vec![text.to_string()],
    };

    let parts = split_top_level(inner);
    if !parts.iter().any(|p| split_named(p).is_some()) {
        return parts.into_iter().map(str::to_string).collect();
    }

    // Named results: `a, b int` shares the type to the right.
    let mut types = Vec::with_capacity(parts.len());
    let mut current = String::new();
    for part in parts.iter().rev() {
        if let Some((_, ty)) = split_named(part) {
            current = ty.to_string();
        }
        types.push(current.clone());
    }
    types.reverse();
    types
}

const NUMERIC: &[&str] = &[
    "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32", "uint64",
    "uintptr", "float32", "float64", "complex64", "complex128", "byte", "rune",
];

/// Zero value literal for a result type.
pub fn zero_value(ty: &str) -> String {
    let nil_prefixes = ["*", "[]", "map[", "chan", "<-chan", "func", "interface"];
    match ty {
        "error" | "any" => "nil".to_string(),
        "bool" => "false".to_string(),
        "string" => "\"\"".to_string(),
        t if NUMERIC.contains(&t) => "0".to_string(),
        t if nil_prefixes.iter().any(|p| t.starts_with(p)) => "nil".to_string(),
        t => format!("{t}{{}}"),
    }
}
