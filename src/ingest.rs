//! Turning the raw file AST into a frozen grammar.
//!
//! This is where symbol references get their meaning: rule left-hand sides
//! become nonterminals, `%token` names become tokens, quoted elements
//! become literals, and everything is validated before the freeze.

use crate::grammar::{
    literal_token_value, Diagnostic, Grammar, GrammarBuilder, GrammarError, SymbolID, SymbolKind,
};
use crate::syntax::{Decl, File};
use crate::types::Set;

/// A frozen grammar plus the opaque code blocks that ride along to the
/// emitter untouched.
#[derive(Debug)]
pub struct ParsedGrammar {
    pub grammar: Grammar,
    pub prologue: Option<String>,
    pub union_decl: Option<String>,
    pub epilogue: Option<String>,
    /// Ingestion warnings, in addition to [`Grammar::warnings`].
    pub warnings: Vec<Diagnostic>,
}

pub fn ingest(file: &File) -> Result<ParsedGrammar, GrammarError> {
    let mut builder = GrammarBuilder::new();
    let mut warnings = Vec::new();

    // Every rule's left-hand side is a nonterminal, whatever the
    // declarations say; interning them first makes later kind clashes
    // surface on the declaration that caused them.
    let lhs: Set<&str> = file.rules.iter().map(|rule| rule.left.as_str()).collect();
    for rule in &file.rules {
        builder.intern(&rule.left, SymbolKind::NonTerminal)?;
    }

    let mut declared_tokens: Set<&str> = Set::default();
    let mut prec_level: u16 = 0;
    for decl in &file.decls {
        match decl {
            Decl::Token { tag, names } => {
                for name in names {
                    if !declared_tokens.insert(name) {
                        return Err(GrammarError::DuplicateDeclaration(name.clone()));
                    }
                    let id = builder.intern(name, classify_terminal(name)?)?;
                    if let Some(tag) = tag {
                        builder.set_value_type(id, tag);
                    }
                }
            }
            Decl::Start { name } => {
                builder.start(name)?;
            }
            Decl::Type { tag, names } => {
                for name in names {
                    let kind = if lhs.contains(name.as_str()) {
                        SymbolKind::NonTerminal
                    } else {
                        classify_terminal(name)?
                    };
                    let id = builder.intern(name, kind)?;
                    builder.set_value_type(id, tag);
                }
            }
            Decl::Prec { assoc, symbols } => {
                // Each %left/%right/%nonassoc line opens the next,
                // tighter-binding level.
                prec_level += 1;
                for name in symbols {
                    builder.intern(name, classify_terminal(name)?)?;
                    builder.set_precedence(name, prec_level, *assoc)?;
                }
            }
        }
    }

    for rule in &file.rules {
        let left = builder.intern(&rule.left, SymbolKind::NonTerminal)?;
        for alt in &rule.alternatives {
            let mut right = Vec::with_capacity(alt.symbols.len());
            for symbol in &alt.symbols {
                right.push(classify_reference(&mut builder, &lhs, symbol, &mut warnings)?);
            }
            let prec_symbol = match &alt.prec {
                Some(name) => Some(builder.intern(name, classify_terminal(name)?)?),
                None => None,
            };
            builder.production(left, right, alt.action.clone(), prec_symbol)?;
        }
    }

    if file.unions.len() > 1 {
        return Err(GrammarError::DuplicateDeclaration("%union".to_owned()));
    }

    let grammar = builder.freeze()?;
    Ok(ParsedGrammar {
        grammar,
        prologue: match file.prologue.as_slice() {
            [] => None,
            blocks => Some(blocks.join("\n")),
        },
        union_decl: file.unions.first().cloned(),
        epilogue: file.epilogue.clone(),
        warnings,
    })
}

/// Kind of a terminal-position name: quoted means a (validated) literal.
fn classify_terminal(name: &str) -> Result<SymbolKind, GrammarError> {
    if name.starts_with('\'') {
        literal_token_value(name)?;
        Ok(SymbolKind::Literal)
    } else {
        Ok(SymbolKind::Token)
    }
}

/// Classify a right-hand-side reference. Known names keep their kind;
/// unknown SCREAMING_CASE names pass as undeclared tokens, anything else
/// is taken for a nonterminal and will surface the usual undefined
/// warning if no rule ever defines it.
fn classify_reference(
    builder: &mut GrammarBuilder,
    lhs: &Set<&str>,
    symbol: &str,
    warnings: &mut Vec<Diagnostic>,
) -> Result<SymbolID, GrammarError> {
    if symbol.starts_with('\'') {
        literal_token_value(symbol)?;
        return builder.intern(symbol, SymbolKind::Literal);
    }
    if lhs.contains(symbol) {
        return builder.intern(symbol, SymbolKind::NonTerminal);
    }
    if let Some((id, _)) = builder.lookup(symbol) {
        return Ok(id);
    }
    if looks_like_token(symbol) {
        warnings.push(Diagnostic::UndeclaredToken {
            name: symbol.to_owned(),
        });
        return builder.intern(symbol, SymbolKind::Token);
    }
    builder.intern(symbol, SymbolKind::NonTerminal)
}

fn looks_like_token(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Assoc;
    use crate::syntax;

    fn ingest_str(source: &str) -> Result<ParsedGrammar, GrammarError> {
        ingest(&syntax::parse(source).unwrap())
    }

    #[test]
    fn classification_and_precedence_levels() {
        let parsed = ingest_str(
            "%token NUM\n\
             %start expr\n\
             %left '+' '-'\n\
             %left '*'\n\
             %%\n\
             expr : expr '+' expr | expr '-' expr | expr '*' expr | NUM ;\n",
        )
        .unwrap();
        let g = &parsed.grammar;

        let num = g.symbol(g.lookup("NUM").unwrap());
        assert_eq!(num.kind(), SymbolKind::Token);

        let expr = g.symbol(g.lookup("expr").unwrap());
        assert_eq!(expr.kind(), SymbolKind::NonTerminal);
        assert_eq!(g.start_symbol(), g.lookup("expr").unwrap());

        let plus = g.symbol(g.lookup("'+'").unwrap());
        assert_eq!(plus.kind(), SymbolKind::Literal);
        assert_eq!(plus.precedence(), 1);
        assert_eq!(plus.assoc(), Assoc::Left);

        let star = g.symbol(g.lookup("'*'").unwrap());
        assert_eq!(star.precedence(), 2);

        // S' -> expr plus the four alternatives.
        assert_eq!(g.productions().count(), 5);
    }

    #[test]
    fn value_types_are_attached() {
        let parsed = ingest_str(
            "%token <ival> NUM\n\
             %type <ival> expr\n\
             %%\n\
             expr : NUM ;\n",
        )
        .unwrap();
        let g = &parsed.grammar;
        assert_eq!(g.symbol(g.lookup("NUM").unwrap()).value_type(), Some("ival"));
        assert_eq!(g.symbol(g.lookup("expr").unwrap()).value_type(), Some("ival"));
    }

    #[test]
    fn token_and_rule_name_clash_is_fatal() {
        let err = ingest_str("%token expr\n%%\nexpr : expr ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::KindConflict { .. }));
    }

    #[test]
    fn duplicate_token_declaration_is_fatal() {
        let err = ingest_str("%token A\n%token A\n%%\ns : A ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateDeclaration(_)));
    }

    #[test]
    fn duplicate_start_declaration_is_fatal() {
        let err = ingest_str("%start s\n%start s\n%%\ns : A ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateDeclaration(_)));
    }

    #[test]
    fn undeclared_screaming_identifier_becomes_a_token() {
        let parsed = ingest_str("%%\ns : WORD ;\n").unwrap();
        let g = &parsed.grammar;
        assert_eq!(g.symbol(g.lookup("WORD").unwrap()).kind(), SymbolKind::Token);
        assert!(parsed.warnings.contains(&Diagnostic::UndeclaredToken {
            name: "WORD".to_owned()
        }));
    }

    #[test]
    fn undeclared_lowercase_identifier_becomes_a_nonterminal() {
        let parsed = ingest_str("%%\ns : other A ;\n").unwrap();
        let g = &parsed.grammar;
        assert_eq!(
            g.symbol(g.lookup("other").unwrap()).kind(),
            SymbolKind::NonTerminal
        );
        assert!(g.warnings().contains(&Diagnostic::UndefinedNonterminal {
            name: "other".to_owned()
        }));
    }

    #[test]
    fn invalid_literal_is_fatal() {
        let err = ingest_str("%%\ns : '\\x' ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::InvalidLiteral(_)));
    }

    #[test]
    fn duplicate_union_is_fatal() {
        let err = ingest_str("%union { int i; }\n%union { int j; }\n%%\ns : A ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateDeclaration(_)));
    }

    #[test]
    fn prec_override_on_a_nonterminal_is_fatal() {
        let err = ingest_str("%%\ns : a ;\na : A %prec a ;\n").unwrap_err();
        assert!(matches!(err, GrammarError::KindConflict { .. }));
    }

    #[test]
    fn opaque_blocks_ride_along() {
        let parsed = ingest_str(
            "%{\n#include \"lex.h\"\n%}\n\
             %union { int ival; }\n\
             %%\n\
             s : A ;\n\
             %%\n\
             int main(void) { return 0; }\n",
        )
        .unwrap();
        assert!(parsed.prologue.unwrap().contains("lex.h"));
        assert!(parsed.union_decl.unwrap().contains("ival"));
        assert!(parsed.epilogue.unwrap().contains("main"));
    }
}
