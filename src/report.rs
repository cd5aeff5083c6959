//! Diagnostic renderings: a PlantUML state diagram and a Markdown view
//! of the ACTION/GOTO tables.

use crate::grammar::{Grammar, ProductionID, SymbolID, SymbolKind};
use crate::lr1::Automaton;
use crate::parse_table::{ActionEntry, ParseTable};
use crate::types::Map;
use crate::util::DisplayWith;
use std::fmt;

/// The automaton as a PlantUML state diagram. Items sharing a core are
/// folded into one line with their lookaheads joined by `/`.
pub fn plantuml<'g>(grammar: &'g Grammar, automaton: &'g Automaton) -> Diagram<'g> {
    Diagram { grammar, automaton }
}

pub struct Diagram<'g> {
    grammar: &'g Grammar,
    automaton: &'g Automaton,
}

impl fmt::Display for Diagram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;

        writeln!(f, "@startuml")?;
        writeln!(f, "[*] --> State0")?;
        for (id, state) in self.automaton.states() {
            write!(f, "State{} : ", id)?;
            let mut groups: Map<(ProductionID, u16), Vec<SymbolID>> = Map::default();
            for item in state.items() {
                groups
                    .entry((item.production, item.dot))
                    .or_default()
                    .push(item.lookahead);
            }
            for ((production, dot), lookaheads) in &groups {
                let rule = g.production(*production);
                write!(f, "{} ->", g.symbol(rule.left()).name())?;
                for (i, symbol) in rule.right().iter().enumerate() {
                    if i == usize::from(*dot) {
                        f.write_str(" •")?;
                    }
                    write!(f, " {}", g.symbol(*symbol).name())?;
                }
                if usize::from(*dot) == rule.right().len() {
                    f.write_str(" •")?;
                }
                f.write_str(" , ")?;
                for (i, lookahead) in lookaheads.iter().enumerate() {
                    if i > 0 {
                        f.write_str("/")?;
                    }
                    write!(f, "{}", g.symbol(*lookahead).name())?;
                }
                f.write_str("\\n")?;
            }
            writeln!(f)?;
        }
        for (from, symbol, to) in self.automaton.transitions() {
            writeln!(
                f,
                "State{} --> State{} : {}",
                from,
                to,
                g.symbol(symbol).name()
            )?;
        }
        writeln!(f, "@enduml")
    }
}

/// The tables rendered as Markdown, terminals restricted to the columns
/// that carry at least one action.
pub fn markdown<'g>(
    grammar: &'g Grammar,
    automaton: &'g Automaton,
    table: &'g ParseTable,
) -> Tables<'g> {
    Tables {
        grammar,
        automaton,
        table,
    }
}

pub struct Tables<'g> {
    grammar: &'g Grammar,
    automaton: &'g Automaton,
    table: &'g ParseTable,
}

impl fmt::Display for Tables<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        let table = self.table;

        let states: Vec<_> = self.automaton.states().map(|(id, _)| id).collect();
        let terminals: Vec<SymbolID> = g.terminals().map(|(id, _)| id).collect();
        let mut nonterminals: Vec<SymbolID> = g
            .nonterminals()
            .filter(|(id, _)| *id != g.accept_symbol())
            .map(|(id, _)| id)
            .collect();
        nonterminals.sort_by(|a, b| g.symbol(*a).name().cmp(g.symbol(*b).name()));

        let literal_count = g
            .terminals()
            .filter(|(_, sym)| sym.kind() == SymbolKind::Literal)
            .count();

        writeln!(f, "# LR(1) parse tables")?;
        writeln!(f)?;
        writeln!(f, "## Summary")?;
        writeln!(f)?;
        writeln!(f, "- states: {}", states.len())?;
        writeln!(f, "- terminals: {} (excluding $)", terminals.len() - 1)?;
        writeln!(f, "  - literals: {}", literal_count)?;
        writeln!(f, "  - named tokens: {}", terminals.len() - 1 - literal_count)?;
        writeln!(f, "- nonterminals: {}", nonterminals.len())?;
        writeln!(f, "- productions: {}", g.productions().count())?;
        writeln!(f, "- conflicts: {}", table.conflicts())?;
        writeln!(f)?;

        writeln!(f, "## Productions")?;
        writeln!(f)?;
        for (id, production) in g.productions() {
            write!(f, "- ({}) {}", id, production.display(g))?;
            if production.precedence() != 0 {
                write!(f, " [precedence: {}]", production.precedence())?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        // Terminal columns that carry at least one action; $ always does.
        let used: Vec<(usize, SymbolID)> = terminals
            .iter()
            .enumerate()
            .filter(|(_, id)| {
                states
                    .iter()
                    .any(|state| table.action(*state, **id) != ActionEntry::Error)
            })
            .map(|(column, id)| (column, *id))
            .collect();

        writeln!(f, "## ACTION")?;
        writeln!(f)?;
        write!(f, "| state |")?;
        for (_, id) in &used {
            write!(f, " {} |", g.symbol(*id).name())?;
        }
        writeln!(f)?;
        write!(f, "| --- |")?;
        for _ in &used {
            write!(f, " --- |")?;
        }
        writeln!(f)?;
        for state in &states {
            write!(f, "| {} |", state)?;
            for (_, id) in &used {
                match table.action(*state, *id) {
                    ActionEntry::Shift(target) => write!(f, " s{} |", target)?,
                    ActionEntry::Reduce(production) => write!(f, " r{} |", production)?,
                    ActionEntry::Accept => write!(f, " acc |")?,
                    ActionEntry::Error => write!(f, " |")?,
                }
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(f, "## GOTO")?;
        writeln!(f)?;
        write!(f, "| state |")?;
        for id in &nonterminals {
            write!(f, " {} |", g.symbol(*id).name())?;
        }
        writeln!(f)?;
        write!(f, "| --- |")?;
        for _ in &nonterminals {
            write!(f, " --- |")?;
        }
        writeln!(f)?;
        for state in &states {
            write!(f, "| {} |", state)?;
            for id in &nonterminals {
                match table.goto(*state, *id) {
                    Some(target) => write!(f, " {} |", target)?,
                    None => write!(f, " |")?,
                }
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(f, "## Reductions")?;
        writeln!(f)?;
        writeln!(f, "| action | production |")?;
        writeln!(f, "| --- | --- |")?;
        for (id, production) in g.productions() {
            writeln!(f, "| r{} | {} |", id, production.display(g))?;
        }
        Ok(())
    }
}
