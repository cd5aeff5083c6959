//! Parsing of the grammar file into an uninterpreted AST.
//!
//! The file uses the conventional three-section layout, the sections being
//! separated by `%%` on a line of its own. Code blocks (`%{ ... %}`,
//! `%union { ... }`, semantic actions and the trailing section) are carried
//! through verbatim; nothing in here assigns meaning to symbols.

use crate::grammar::Assoc;

#[derive(Debug, thiserror::Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

/// The raw parse of a grammar file.
#[derive(Debug, Default)]
pub struct File {
    pub prologue: Vec<String>,
    pub unions: Vec<String>,
    pub decls: Vec<Decl>,
    pub rules: Vec<Rule>,
    pub epilogue: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Decl {
    Token {
        tag: Option<String>,
        names: Vec<String>,
    },
    Start {
        name: String,
    },
    Type {
        tag: String,
        names: Vec<String>,
    },
    /// One `%left`/`%right`/`%nonassoc` line. Each such line introduces
    /// the next higher precedence level.
    Prec {
        assoc: Assoc,
        symbols: Vec<String>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Rule {
    pub left: String,
    pub line: u32,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Alternative {
    /// Identifiers and quoted literals, in order. Literals keep their
    /// quotes.
    pub symbols: Vec<String>,
    /// The `%prec` override, if any.
    pub prec: Option<String>,
    /// The trailing semantic action, braces included.
    pub action: Option<String>,
}

pub fn parse(source: &str) -> Result<File, SyntaxError> {
    let sections = split_sections(source)?;

    let mut file = File::default();
    parse_declarations(
        Cursor::new(sections.declarations, 1),
        &mut file,
    )?;
    parse_rules(
        Cursor::new(sections.rules, sections.rules_line),
        &mut file,
    )?;
    if let Some(epilogue) = sections.epilogue {
        if !epilogue.trim().is_empty() {
            file.epilogue = Some(epilogue.to_owned());
        }
    }
    Ok(file)
}

struct Sections<'a> {
    declarations: &'a str,
    rules: &'a str,
    rules_line: u32,
    epilogue: Option<&'a str>,
}

/// Split on `%%` lines. The second separator (and the epilogue) is
/// optional; the first is not.
fn split_sections(source: &str) -> Result<Sections<'_>, SyntaxError> {
    let mut offset = 0;
    let mut line = 1;
    let mut marks = Vec::new();
    for raw_line in source.split_inclusive('\n') {
        if raw_line.trim() == "%%" {
            marks.push((offset, offset + raw_line.len(), line));
            if marks.len() == 2 {
                break;
            }
        }
        offset += raw_line.len();
        line += 1;
    }

    let &(first_start, first_end, first_line) = marks.first().ok_or(SyntaxError {
        line,
        message: "missing `%%` separator between declarations and rules".to_owned(),
    })?;

    let (rules_end, epilogue) = match marks.get(1) {
        Some(&(second_start, second_end, _)) => (second_start, Some(&source[second_end..])),
        None => (source.len(), None),
    };

    Ok(Sections {
        declarations: &source[..first_start],
        rules: &source[first_end..rules_end],
        rules_line: first_line + 1,
        epilogue,
    })
}

fn parse_declarations(mut cur: Cursor<'_>, file: &mut File) -> Result<(), SyntaxError> {
    loop {
        cur.skip_ws_and_comments()?;
        if cur.at_eof() {
            return Ok(());
        }
        if !cur.eat("%") {
            return Err(cur.error("expected a `%` declaration"));
        }

        if cur.eat("{") {
            file.prologue.push(cur.read_until("%}")?);
            continue;
        }

        let keyword = cur.read_ident().ok_or_else(|| cur.error("expected a declaration keyword"))?;
        match keyword.as_str() {
            "union" => {
                cur.skip_ws_and_comments()?;
                if cur.peek() != Some(b'{') {
                    return Err(cur.error("expected `{` after %union"));
                }
                file.unions.push(cur.read_braced()?);
            }
            "token" => {
                let tag = cur.read_optional_tag()?;
                let names = cur.read_symbol_list()?;
                if names.is_empty() {
                    return Err(cur.error("%token declares no names"));
                }
                file.decls.push(Decl::Token { tag, names });
            }
            "type" => {
                let tag = cur
                    .read_optional_tag()?
                    .ok_or_else(|| cur.error("expected `<tag>` after %type"))?;
                let names = cur.read_symbol_list()?;
                if names.is_empty() {
                    return Err(cur.error("%type declares no names"));
                }
                file.decls.push(Decl::Type { tag, names });
            }
            "start" => {
                let mut names = cur.read_symbol_list()?;
                if names.len() != 1 || names[0].starts_with('\'') {
                    return Err(cur.error("%start expects a single identifier"));
                }
                file.decls.push(Decl::Start {
                    name: names.pop().expect("checked length"),
                });
            }
            "left" | "right" | "nonassoc" => {
                let assoc = match keyword.as_str() {
                    "left" => Assoc::Left,
                    "right" => Assoc::Right,
                    _ => Assoc::NonAssoc,
                };
                let symbols = cur.read_symbol_list()?;
                if symbols.is_empty() {
                    return Err(cur.error(format!("%{} declares no symbols", keyword)));
                }
                file.decls.push(Decl::Prec { assoc, symbols });
            }
            other => {
                return Err(cur.error(format!("unknown declaration `%{}`", other)));
            }
        }
    }
}

fn parse_rules(mut cur: Cursor<'_>, file: &mut File) -> Result<(), SyntaxError> {
    loop {
        cur.skip_ws_and_comments()?;
        if cur.at_eof() {
            return Ok(());
        }

        let line = cur.line;
        let left = cur.read_ident().ok_or_else(|| cur.error("expected a rule name"))?;
        cur.skip_ws_and_comments()?;
        if !cur.eat(":") {
            return Err(cur.error(format!("expected `:` after rule name `{}`", left)));
        }

        let mut alternatives = Vec::new();
        let mut alt = Alternative::default();
        loop {
            cur.skip_ws_and_comments()?;
            match cur.peek() {
                None => return Err(cur.error(format!("unterminated rule `{}`", left))),
                Some(b';') => {
                    cur.bump();
                    alternatives.push(alt);
                    break;
                }
                Some(b'|') => {
                    cur.bump();
                    alternatives.push(alt);
                    alt = Alternative::default();
                }
                Some(b'{') => {
                    if alt.action.is_some() {
                        return Err(cur.error("mid-rule actions are not supported"));
                    }
                    alt.action = Some(cur.read_braced()?);
                }
                Some(b'\'') => {
                    alt.push_symbol(cur.read_literal()?, &cur)?;
                }
                Some(b'"') => {
                    return Err(cur.error("string literals are not supported; use 'c' characters"));
                }
                Some(b'%') => {
                    cur.bump();
                    match cur.read_ident().as_deref() {
                        Some("prec") => {
                            if alt.prec.is_some() {
                                return Err(cur.error("duplicate %prec in one alternative"));
                            }
                            cur.skip_ws_and_comments()?;
                            let symbol = match cur.peek() {
                                Some(b'\'') => cur.read_literal()?,
                                _ => cur
                                    .read_ident()
                                    .ok_or_else(|| cur.error("expected a symbol after %prec"))?,
                            };
                            alt.prec = Some(symbol);
                        }
                        _ => return Err(cur.error("expected `%prec`")),
                    }
                }
                Some(c) if c == b'_' || c.is_ascii_alphabetic() => {
                    let ident = cur.read_ident().expect("checked first byte");
                    alt.push_symbol(ident, &cur)?;
                }
                Some(c) => {
                    return Err(cur.error(format!("unexpected character `{}`", c as char)));
                }
            }
        }

        file.rules.push(Rule {
            left,
            line,
            alternatives,
        });
    }
}

impl Alternative {
    fn push_symbol(&mut self, symbol: String, cur: &Cursor<'_>) -> Result<(), SyntaxError> {
        if self.action.is_some() {
            return Err(cur.error("mid-rule actions are not supported"));
        }
        if self.prec.is_some() {
            return Err(cur.error("symbols may not follow %prec"));
        }
        self.symbols.push(symbol);
        Ok(())
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: u32) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            line,
        }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
        }
        Some(byte)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.bytes[self.pos..].starts_with(text.as_bytes()) {
            for _ in 0..text.len() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip whitespace plus `//` and `/* */` comments.
    fn skip_ws_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.bytes[self.pos..].starts_with(b"//") => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.bytes[self.pos..].starts_with(b"/*") => {
                    self.skip_block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), SyntaxError> {
        let start = self.line;
        self.bump();
        self.bump();
        loop {
            if self.bytes[self.pos..].starts_with(b"*/") {
                self.bump();
                self.bump();
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(SyntaxError {
                    line: start,
                    message: "unterminated comment".to_owned(),
                });
            }
        }
    }

    /// Skip spaces, tabs and inline comments without crossing a newline.
    fn skip_inline_ws(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.bump();
                }
                Some(b'/') if self.bytes[self.pos..].starts_with(b"/*") => {
                    self.skip_block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident(&mut self) -> Option<String> {
        let first = self.peek()?;
        if first != b'_' && !first.is_ascii_alphabetic() {
            return None;
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'_' || c == b'.' || c.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    /// A single-quoted character literal, quotes and escapes preserved.
    fn read_literal(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        debug_assert_eq!(self.peek(), Some(b'\''));
        self.bump();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(self.error("unterminated character literal"));
                }
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(b'\'') => {
                    self.bump();
                    break;
                }
                _ => {
                    self.bump();
                }
            }
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    /// An optional `<tag>` annotation.
    fn read_optional_tag(&mut self) -> Result<Option<String>, SyntaxError> {
        self.skip_inline_ws()?;
        if self.peek() != Some(b'<') {
            return Ok(None);
        }
        self.bump();
        let tag = self
            .read_ident()
            .ok_or_else(|| self.error("expected an identifier inside `<...>`"))?;
        if self.peek() != Some(b'>') {
            return Err(self.error("expected `>` to close the type tag"));
        }
        self.bump();
        Ok(Some(tag))
    }

    /// Identifiers and literals up to the end of the current line.
    fn read_symbol_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut symbols = Vec::new();
        loop {
            self.skip_inline_ws()?;
            match self.peek() {
                None | Some(b'\n') => return Ok(symbols),
                Some(b'/') if self.bytes[self.pos..].starts_with(b"//") => return Ok(symbols),
                Some(b'\'') => symbols.push(self.read_literal()?),
                Some(b',') => {
                    self.bump();
                }
                Some(c) if c == b'_' || c.is_ascii_alphabetic() => {
                    symbols.push(self.read_ident().expect("checked first byte"));
                }
                Some(c) => {
                    return Err(self.error(format!("unexpected character `{}`", c as char)));
                }
            }
        }
    }

    /// A brace-balanced code block, returned verbatim including the outer
    /// braces. Quotes and comments inside the block do not count braces.
    fn read_braced(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let start_line = self.line;
        debug_assert_eq!(self.peek(), Some(b'{'));
        self.bump();
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => {
                    return Err(SyntaxError {
                        line: start_line,
                        message: "unterminated code block".to_owned(),
                    });
                }
                Some(b'{') => {
                    self.bump();
                    depth += 1;
                }
                Some(b'}') => {
                    self.bump();
                    depth -= 1;
                }
                Some(b'\'') | Some(b'"') => {
                    self.skip_quoted()?;
                }
                Some(b'/') if self.bytes[self.pos..].starts_with(b"//") => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.bytes[self.pos..].starts_with(b"/*") => {
                    self.skip_block_comment()?;
                }
                _ => {
                    self.bump();
                }
            }
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    /// A quoted run inside a code block; the closing quote matches the
    /// opening one.
    fn skip_quoted(&mut self) -> Result<(), SyntaxError> {
        let quote = self.bump().expect("caller checked");
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string in code block")),
                Some(b'\\') => {
                    self.bump();
                    self.bump();
                }
                Some(c) => {
                    self.bump();
                    if c == quote {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Raw text up to (and excluding) `marker`; the marker is consumed.
    fn read_until(&mut self, marker: &str) -> Result<String, SyntaxError> {
        let start = self.pos;
        let start_line = self.line;
        loop {
            if self.bytes[self.pos..].starts_with(marker.as_bytes()) {
                let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                for _ in 0..marker.len() {
                    self.bump();
                }
                return Ok(text);
            }
            if self.bump().is_none() {
                return Err(SyntaxError {
                    line: start_line,
                    message: format!("unterminated block, expecting `{}`", marker),
                });
            }
        }
    }
}
