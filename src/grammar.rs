//! Grammar types.
//!
//! The grammar passes through two phases: a mutable [`GrammarBuilder`] that
//! interns symbols and collects productions while the input file is being
//! digested, and an immutable [`Grammar`] produced by [`GrammarBuilder::freeze`].
//! After the freeze every symbol occurrence carries its canonical dense id,
//! so all comparisons on the table-construction hot path are integer
//! comparisons.

use crate::types::Map;
use crate::util::DisplayWith;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolID(u16);

impl SymbolID {
    /// The end-of-input terminal `$`. Always the first terminal.
    pub const EOI: Self = Self(0);

    pub(crate) const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::EOI => write!(f, "S#End"),
            Self(raw) => write!(f, "S#{:03}", raw),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Token,
    NonTerminal,
    Literal,
}

impl SymbolKind {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::NonTerminal)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    None,
    Left,
    Right,
    NonAssoc,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    precedence: u16,
    assoc: Assoc,
    value_type: Option<String>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Precedence level of this symbol. Zero means unspecified.
    pub fn precedence(&self) -> u16 {
        self.precedence
    }

    pub fn assoc(&self) -> Assoc {
        self.assoc
    }

    /// The union member this symbol's semantic value lives in, if any.
    pub fn value_type(&self) -> Option<&str> {
        self.value_type.as_deref()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProductionID(u16);

impl ProductionID {
    /// The augmented production `S' -> S`.
    pub const ACCEPT: Self = Self(0);

    pub(crate) const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::ACCEPT => write!(f, "P#Accept"),
            Self(raw) => write!(f, "P#{:03}", raw),
        }
    }
}

impl fmt::Display for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone)]
pub struct Production {
    left: SymbolID,
    right: Vec<SymbolID>,
    semantic_action: Option<String>,
    precedence: u16,
}

impl Production {
    pub fn left(&self) -> SymbolID {
        self.left
    }

    pub fn right(&self) -> &[SymbolID] {
        &self.right
    }

    /// Opaque action text, braces included. Never interpreted here.
    pub fn semantic_action(&self) -> Option<&str> {
        self.semantic_action.as_deref()
    }

    /// Effective precedence level: the `%prec` override if present,
    /// otherwise inherited from the rightmost precedence-carrying terminal.
    pub fn precedence(&self) -> u16 {
        self.precedence
    }
}

impl DisplayWith for Production {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", g.symbol(self.left).name())?;
        if self.right.is_empty() {
            f.write_str(" ε")?;
        } else {
            for id in &self.right {
                write!(f, " {}", g.symbol(*id).name())?;
            }
        }
        Ok(())
    }
}

/// A set of terminal ids, backed by a bitset over the dense id range.
#[derive(Debug, Default, Clone)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub fn contains(&self, id: SymbolID) -> bool {
        self.inner.contains(id.raw().into())
    }

    pub fn insert(&mut self, id: SymbolID) -> bool {
        self.inner.insert(id.raw().into())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.inner
            .iter()
            .map(|raw| u16::try_from(raw).map(SymbolID::from_raw).unwrap())
    }
}

impl FromIterator<SymbolID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = SymbolID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.raw().into()).collect(),
        }
    }
}

/// Non-fatal findings collected while the grammar is digested and analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A nonterminal is referenced on some right-hand side but no rule
    /// defines it.
    UndefinedNonterminal { name: String },
    /// A declared token appears in no production.
    UnusedToken { name: String },
    /// An identifier was used as a token without a `%token` declaration.
    UndeclaredToken { name: String },
    /// Closure reached a nonterminal without productions.
    MissingProduction { name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedNonterminal { name } => {
                write!(f, "nonterminal `{}` has no defining production", name)
            }
            Self::UnusedToken { name } => {
                write!(f, "token `{}` is declared but never used", name)
            }
            Self::UndeclaredToken { name } => {
                write!(f, "token `{}` is used without a %token declaration", name)
            }
            Self::MissingProduction { name } => {
                write!(f, "no productions found for nonterminal `{}`", name)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("symbol `{name}` is used both as a token and as a nonterminal")]
    KindConflict { name: String },

    #[error("start symbol `{0}` has no defining production")]
    UndefinedStart(String),

    #[error("duplicate declaration of `{0}`")]
    DuplicateDeclaration(String),

    #[error("invalid literal {0}")]
    InvalidLiteral(String),

    #[error("the grammar has no start production")]
    NoStartProduction,
}

/// The frozen grammar used to derive the parser tables.
///
/// Symbol ids are dense in `[0, N)` with the terminals first (`$` at id 0)
/// followed by the nonterminals; production ids are dense with the augmented
/// production at id 0. No mutation is possible past this point.
#[derive(Debug)]
pub struct Grammar {
    symbols: Map<SymbolID, Symbol>,
    names: Map<String, SymbolID>,
    productions: Map<ProductionID, Production>,
    by_left: Map<SymbolID, Vec<ProductionID>>,
    start_symbol: SymbolID,
    accept_symbol: SymbolID,
    terminal_count: u16,
    warnings: Vec<Diagnostic>,
}

impl Grammar {
    pub fn symbol(&self, id: SymbolID) -> &Symbol {
        self.symbols
            .get(&id)
            .unwrap_or_else(|| panic!("dangling symbol id {:?}", id))
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolID> {
        self.names.get(name).copied()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols.iter().map(|(id, sym)| (*id, sym))
    }

    pub fn terminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| sym.is_terminal())
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| !sym.is_terminal())
    }

    pub fn is_terminal(&self, id: SymbolID) -> bool {
        id.raw() < self.terminal_count
    }

    pub fn terminal_count(&self) -> u16 {
        self.terminal_count
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        self.productions
            .get(&id)
            .unwrap_or_else(|| panic!("dangling production id {:?}", id))
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions.iter().map(|(id, p)| (*id, p))
    }

    /// All productions whose left-hand side is `left`, in declaration order.
    pub fn productions_of(&self, left: SymbolID) -> &[ProductionID] {
        self.by_left.get(&left).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_accept_production(&self) -> bool {
        self.productions.contains_key(&ProductionID::ACCEPT)
    }

    /// The user's start symbol `S`.
    pub fn start_symbol(&self) -> SymbolID {
        self.start_symbol
    }

    /// The injected start symbol `S'`.
    pub fn accept_symbol(&self) -> SymbolID {
        self.accept_symbol
    }

    /// Warnings collected while the grammar was frozen.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminals:")?;
        for (_, sym) in self.terminals() {
            write!(f, " {}", sym.name())?;
        }
        write!(f, "\nnonterminals:")?;
        for (_, sym) in self.nonterminals() {
            write!(f, " {}", sym.name())?;
        }
        writeln!(
            f,
            "\nstart symbol: {}",
            self.symbol(self.start_symbol).name()
        )?;
        writeln!(f, "productions:")?;
        for (id, p) in self.productions() {
            writeln!(f, "  [{:02}] {}", id, p.display(self))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PendingSymbol {
    kind: SymbolKind,
    precedence: u16,
    assoc: Assoc,
    value_type: Option<String>,
}

#[derive(Debug)]
struct PendingProduction {
    left: SymbolID,
    right: Vec<SymbolID>,
    semantic_action: Option<String>,
    prec_symbol: Option<SymbolID>,
}

/// The mutable registry the ingestor fills in before the freeze.
///
/// Ids handed out here are provisional interning indices; `freeze` reassigns
/// them so that terminals come first, and rewrites every cached id inside the
/// collected productions accordingly.
#[derive(Debug)]
pub struct GrammarBuilder {
    symbols: Map<String, PendingSymbol>,
    productions: Vec<PendingProduction>,
    start: Option<String>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        let mut symbols = Map::default();
        symbols.insert(
            "$".to_owned(),
            PendingSymbol {
                kind: SymbolKind::Token,
                precedence: 0,
                assoc: Assoc::None,
                value_type: None,
            },
        );
        Self {
            symbols,
            productions: Vec::new(),
            start: None,
        }
    }

    /// The provisional id and kind of an already-interned symbol.
    pub fn lookup(&self, name: &str) -> Option<(SymbolID, SymbolKind)> {
        self.symbols
            .get_full(name)
            .map(|(index, _, sym)| (SymbolID::from_raw(index as u16), sym.kind))
    }

    /// Return the existing symbol named `name`, or insert a fresh one.
    pub fn intern(&mut self, name: &str, kind: SymbolKind) -> Result<SymbolID, GrammarError> {
        if let Some((index, _, sym)) = self.symbols.get_full(name) {
            if sym.kind != kind {
                return Err(GrammarError::KindConflict {
                    name: name.to_owned(),
                });
            }
            return Ok(SymbolID::from_raw(index as u16));
        }

        let index = self.symbols.len();
        self.symbols.insert(
            name.to_owned(),
            PendingSymbol {
                kind,
                precedence: 0,
                assoc: Assoc::None,
                value_type: None,
            },
        );
        Ok(SymbolID::from_raw(index as u16))
    }

    /// Assign a precedence level and associativity to a terminal.
    pub fn set_precedence(
        &mut self,
        name: &str,
        level: u16,
        assoc: Assoc,
    ) -> Result<(), GrammarError> {
        let id = self.intern(name, terminal_kind_of(name))?;
        let (_, sym) = self
            .symbols
            .get_index_mut(id.raw() as usize)
            .expect("just interned");
        if sym.precedence != 0 {
            return Err(GrammarError::DuplicateDeclaration(name.to_owned()));
        }
        sym.precedence = level;
        sym.assoc = assoc;
        Ok(())
    }

    /// Tag a symbol with the union member its semantic value lives in.
    pub fn set_value_type(&mut self, id: SymbolID, tag: &str) {
        let (_, sym) = self
            .symbols
            .get_index_mut(id.raw() as usize)
            .expect("dangling symbol id");
        sym.value_type = Some(tag.to_owned());
    }

    pub fn production(
        &mut self,
        left: SymbolID,
        right: Vec<SymbolID>,
        semantic_action: Option<String>,
        prec_symbol: Option<SymbolID>,
    ) -> Result<(), GrammarError> {
        let (name, sym) = self
            .symbols
            .get_index(left.raw() as usize)
            .expect("dangling symbol id");
        if sym.kind != SymbolKind::NonTerminal {
            return Err(GrammarError::KindConflict { name: name.clone() });
        }
        self.productions.push(PendingProduction {
            left,
            right,
            semantic_action,
            prec_symbol,
        });
        Ok(())
    }

    pub fn start(&mut self, name: &str) -> Result<(), GrammarError> {
        if self.start.is_some() {
            return Err(GrammarError::DuplicateDeclaration("%start".to_owned()));
        }
        self.start = Some(name.to_owned());
        Ok(())
    }

    /// Seal the grammar: inject `S' -> S`, assign the dense ids, rewrite
    /// every cached id, compute per-production precedence and collect the
    /// freeze-time warnings.
    pub fn freeze(mut self) -> Result<Grammar, GrammarError> {
        if self.productions.is_empty() {
            return Err(GrammarError::NoStartProduction);
        }

        let start_name = match self.start.take() {
            Some(name) => name,
            None => {
                let first_left = self.productions[0].left;
                let (name, _) = self
                    .symbols
                    .get_index(first_left.raw() as usize)
                    .expect("dangling symbol id");
                name.clone()
            }
        };
        let start_provisional = match self.symbols.get_index_of(&start_name) {
            Some(index) => SymbolID::from_raw(index as u16),
            None => return Err(GrammarError::UndefinedStart(start_name)),
        };
        if !self
            .productions
            .iter()
            .any(|p| p.left == start_provisional)
        {
            return Err(GrammarError::UndefinedStart(start_name));
        }

        let accept_provisional = self.intern("S'", SymbolKind::NonTerminal)?;

        // Dense renumbering: terminals in interning order ($ is first by
        // construction), then nonterminals in interning order.
        let mut remap: Map<SymbolID, SymbolID> = Map::default();
        let mut symbols: Map<SymbolID, Symbol> = Map::default();
        let mut names: Map<String, SymbolID> = Map::default();
        for pass in [true, false] {
            for (index, (name, sym)) in self.symbols.iter().enumerate() {
                if sym.kind.is_terminal() != pass {
                    continue;
                }
                let id = SymbolID::from_raw(symbols.len() as u16);
                remap.insert(SymbolID::from_raw(index as u16), id);
                names.insert(name.clone(), id);
                symbols.insert(
                    id,
                    Symbol {
                        name: name.clone(),
                        kind: sym.kind,
                        precedence: sym.precedence,
                        assoc: sym.assoc,
                        value_type: sym.value_type.clone(),
                    },
                );
            }
        }
        let terminal_count = symbols.values().filter(|s| s.is_terminal()).count() as u16;
        let start_symbol = remap[&start_provisional];
        let accept_symbol = remap[&accept_provisional];

        let mut productions: Map<ProductionID, Production> = Map::default();
        productions.insert(
            ProductionID::ACCEPT,
            Production {
                left: accept_symbol,
                right: vec![start_symbol],
                semantic_action: None,
                precedence: 0,
            },
        );
        let mut prec_referenced: Vec<SymbolID> = Vec::new();
        for pending in self.productions.drain(..) {
            let right: Vec<SymbolID> = pending.right.iter().map(|id| remap[id]).collect();
            let precedence = match pending.prec_symbol {
                Some(prec) => {
                    let prec = remap[&prec];
                    prec_referenced.push(prec);
                    symbols[&prec].precedence()
                }
                None => right
                    .iter()
                    .rev()
                    .map(|id| &symbols[id])
                    .find(|sym| sym.is_terminal() && sym.precedence() != 0)
                    .map_or(0, |sym| sym.precedence()),
            };
            let id = ProductionID::from_raw(productions.len() as u16);
            productions.insert(
                id,
                Production {
                    left: remap[&pending.left],
                    right,
                    semantic_action: pending.semantic_action,
                    precedence,
                },
            );
        }

        let mut by_left: Map<SymbolID, Vec<ProductionID>> = Map::default();
        for (id, p) in &productions {
            by_left.entry(p.left).or_default().push(*id);
        }

        let mut warnings = Vec::new();
        for (id, sym) in &symbols {
            if sym.kind == SymbolKind::NonTerminal && !by_left.contains_key(id) {
                warnings.push(Diagnostic::UndefinedNonterminal {
                    name: sym.name().to_owned(),
                });
            }
        }
        for (id, sym) in &symbols {
            if sym.kind != SymbolKind::Token || *id == SymbolID::EOI {
                continue;
            }
            let referenced = productions.values().any(|p| p.right.contains(id))
                || prec_referenced.contains(id);
            if !referenced {
                warnings.push(Diagnostic::UnusedToken {
                    name: sym.name().to_owned(),
                });
            }
        }

        Ok(Grammar {
            symbols,
            names,
            productions,
            by_left,
            start_symbol,
            accept_symbol,
            terminal_count,
            warnings,
        })
    }
}

fn terminal_kind_of(name: &str) -> SymbolKind {
    if name.starts_with('\'') {
        SymbolKind::Literal
    } else {
        SymbolKind::Token
    }
}

/// Numeric token value of a quoted literal, as the generated header and
/// parser encode it: unescape the content and fold the bytes big-endian
/// into an integer. A single character lands in `[1, 255]`.
pub fn literal_token_value(name: &str) -> Result<u32, GrammarError> {
    let invalid = || GrammarError::InvalidLiteral(name.to_owned());

    let content = name
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .ok_or_else(invalid)?;
    if content.is_empty() {
        return Err(invalid());
    }

    let bytes = content.as_bytes();
    let mut pos = 0;
    let mut value: u32 = 0;
    while pos < bytes.len() {
        let byte = if bytes[pos] == b'\\' {
            pos += 1;
            let esc = *bytes.get(pos).ok_or_else(invalid)?;
            pos += 1;
            match esc {
                b'\\' => b'\\',
                b'\'' => b'\'',
                b'"' => b'"',
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'0'..=b'7' => {
                    let mut octal = u32::from(esc - b'0');
                    let mut count = 1;
                    while count < 3 && pos < bytes.len() && (b'0'..=b'7').contains(&bytes[pos]) {
                        octal = (octal << 3) + u32::from(bytes[pos] - b'0');
                        pos += 1;
                        count += 1;
                    }
                    octal as u8
                }
                b'x' | b'X' => {
                    let mut hex: u32 = 0;
                    let mut digits = 0;
                    while pos < bytes.len() && bytes[pos].is_ascii_hexdigit() {
                        hex = (hex << 4) + u32::from((bytes[pos] as char).to_digit(16).unwrap());
                        pos += 1;
                        digits += 1;
                    }
                    if digits == 0 {
                        return Err(invalid());
                    }
                    hex as u8
                }
                other => other,
            }
        } else {
            let byte = bytes[pos];
            pos += 1;
            byte
        };
        value = (value << 8) | u32::from(byte);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_rule() -> (GrammarBuilder, SymbolID) {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let num = b.intern("NUM", SymbolKind::Token).unwrap();
        b.production(expr, vec![num], None, None).unwrap();
        (b, expr)
    }

    #[test]
    fn intern_is_idempotent() {
        let mut b = GrammarBuilder::new();
        let a = b.intern("NUM", SymbolKind::Token).unwrap();
        let again = b.intern("NUM", SymbolKind::Token).unwrap();
        assert_eq!(a, again);
    }

    #[test]
    fn intern_rejects_kind_conflict() {
        let mut b = GrammarBuilder::new();
        b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let err = b.intern("expr", SymbolKind::Token).unwrap_err();
        assert!(matches!(err, GrammarError::KindConflict { .. }));
    }

    #[test]
    fn freeze_assigns_dense_ids_terminals_first() {
        let (b, _) = builder_with_rule();
        let g = b.freeze().unwrap();

        assert_eq!(g.lookup("$"), Some(SymbolID::EOI));
        let mut expected = 0;
        for (id, _) in g.symbols() {
            assert_eq!(id.raw(), expected);
            expected += 1;
        }
        for (id, sym) in g.symbols() {
            assert_eq!(sym.is_terminal(), g.is_terminal(id));
        }
        // Every terminal id precedes every nonterminal id.
        for (id, _) in g.terminals() {
            assert!(id.raw() < g.terminal_count());
        }
    }

    #[test]
    fn freeze_synchronizes_production_symbols() {
        let (b, _) = builder_with_rule();
        let g = b.freeze().unwrap();
        for (_, p) in g.productions() {
            let left = g.symbol(p.left());
            assert_eq!(g.lookup(left.name()), Some(p.left()));
            for id in p.right() {
                let sym = g.symbol(*id);
                assert_eq!(g.lookup(sym.name()), Some(*id));
            }
        }
    }

    #[test]
    fn accept_production_is_id_zero() {
        let (b, expr) = builder_with_rule();
        let _ = expr;
        let g = b.freeze().unwrap();

        let accept = g.production(ProductionID::ACCEPT);
        assert_eq!(accept.left(), g.accept_symbol());
        assert_eq!(accept.right(), [g.start_symbol()]);

        let ids: Vec<u16> = g.productions().map(|(id, _)| id.raw()).collect();
        assert_eq!(ids, (0..g.productions().count() as u16).collect::<Vec<_>>());
    }

    #[test]
    fn production_inherits_rightmost_terminal_precedence() {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let plus = b.intern("'+'", SymbolKind::Literal).unwrap();
        let star = b.intern("'*'", SymbolKind::Literal).unwrap();
        b.set_precedence("'+'", 1, Assoc::Left).unwrap();
        b.set_precedence("'*'", 2, Assoc::Left).unwrap();
        b.production(expr, vec![expr, plus, expr], None, None)
            .unwrap();
        b.production(expr, vec![expr, plus, expr, star, expr], None, None)
            .unwrap();
        b.production(expr, vec![expr, star, expr], None, Some(plus))
            .unwrap();
        let g = b.freeze().unwrap();

        let precs: Vec<u16> = g
            .productions()
            .skip(1)
            .map(|(_, p)| p.precedence())
            .collect();
        assert_eq!(precs, [1, 2, 1]);
    }

    #[test]
    fn duplicate_precedence_declaration_is_rejected() {
        let mut b = GrammarBuilder::new();
        b.set_precedence("'+'", 1, Assoc::Left).unwrap();
        let err = b.set_precedence("'+'", 2, Assoc::Left).unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateDeclaration(_)));
    }

    #[test]
    fn undefined_start_is_rejected() {
        let (mut b, _) = builder_with_rule();
        b.start("nosuch").unwrap();
        let err = b.freeze().unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedStart(_)));
    }

    #[test]
    fn empty_grammar_has_no_start_production() {
        let b = GrammarBuilder::new();
        assert!(matches!(
            b.freeze().unwrap_err(),
            GrammarError::NoStartProduction
        ));
    }

    #[test]
    fn freeze_warns_on_unused_and_undefined() {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let num = b.intern("NUM", SymbolKind::Token).unwrap();
        b.intern("UNUSED", SymbolKind::Token).unwrap();
        let missing = b.intern("missing", SymbolKind::NonTerminal).unwrap();
        b.production(expr, vec![num, missing], None, None).unwrap();
        let g = b.freeze().unwrap();

        assert!(g.warnings().contains(&Diagnostic::UnusedToken {
            name: "UNUSED".to_owned()
        }));
        assert!(g.warnings().contains(&Diagnostic::UndefinedNonterminal {
            name: "missing".to_owned()
        }));
    }

    #[test]
    fn literal_values_fold_bytes() {
        assert_eq!(literal_token_value("'+'").unwrap(), b'+' as u32);
        assert_eq!(literal_token_value("'\\n'").unwrap(), 10);
        assert_eq!(literal_token_value("'\\x41'").unwrap(), 65);
        assert_eq!(literal_token_value("'\\101'").unwrap(), 65);
        assert_eq!(literal_token_value("'ab'").unwrap(), 0x6162);
    }

    #[test]
    fn malformed_literals_are_rejected() {
        assert!(literal_token_value("''").is_err());
        assert!(literal_token_value("'a").is_err());
        assert!(literal_token_value("'\\x'").is_err());
        assert!(literal_token_value("'\\").is_err());
    }
}
