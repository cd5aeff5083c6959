//! Derivation of the ACTION/GOTO tables with precedence-directed
//! conflict resolution.

use crate::grammar::{Assoc, Grammar, ProductionID, SymbolID};
use crate::lr1::{Automaton, StateID};
use crate::types::Map;
use crate::util::DisplayWith;
use std::{cmp::Ordering, fmt};

/// One ACTION cell. Cells not present in the table are implicit errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionEntry {
    Shift(StateID),
    Reduce(ProductionID),
    Accept,
    /// An explicit error cell, produced by resolving a shift/reduce
    /// conflict on a nonassociative terminal.
    Error,
}

/// How a recorded conflict was settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Settled by declared precedence or associativity.
    Policy,
    /// No applicable declaration; settled by the default rule
    /// (shift, or the earlier-declared production).
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce {
        shift: StateID,
        reduce: ProductionID,
    },
    ReduceReduce {
        earlier: ProductionID,
        later: ProductionID,
    },
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub state: StateID,
    pub lookahead: SymbolID,
    pub kind: ConflictKind,
    pub resolution: Resolution,
    pub chosen: ActionEntry,
}

impl DisplayWith for Conflict {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = g.symbol(self.lookahead).name();
        match &self.kind {
            ConflictKind::ShiftReduce { shift, reduce } => write!(
                f,
                "state {}: shift/reduce conflict on {} (shift {} vs {})",
                self.state,
                token,
                shift,
                g.production(*reduce).display(g),
            )?,
            ConflictKind::ReduceReduce { earlier, later } => write!(
                f,
                "state {}: reduce/reduce conflict on {} ({} vs {})",
                self.state,
                token,
                g.production(*earlier).display(g),
                g.production(*later).display(g),
            )?,
        }
        match self.resolution {
            Resolution::Policy => f.write_str(", resolved by precedence"),
            Resolution::Default => f.write_str(", resolved by default"),
        }
    }
}

/// Counts of the conflicts met while the table was built, split by how
/// they were settled, plus the individual records.
#[derive(Debug, Default)]
pub struct ConflictSummary {
    pub shift_reduce_resolved: usize,
    pub shift_reduce_defaulted: usize,
    pub reduce_reduce_resolved: usize,
    pub reduce_reduce_defaulted: usize,
    pub records: Vec<Conflict>,
}

impl ConflictSummary {
    pub fn total(&self) -> usize {
        self.shift_reduce_resolved
            + self.shift_reduce_defaulted
            + self.reduce_reduce_resolved
            + self.reduce_reduce_defaulted
    }

    fn record(&mut self, conflict: Conflict) {
        match (&conflict.kind, conflict.resolution) {
            (ConflictKind::ShiftReduce { .. }, Resolution::Policy) => {
                self.shift_reduce_resolved += 1
            }
            (ConflictKind::ShiftReduce { .. }, Resolution::Default) => {
                self.shift_reduce_defaulted += 1
            }
            (ConflictKind::ReduceReduce { .. }, Resolution::Policy) => {
                self.reduce_reduce_resolved += 1
            }
            (ConflictKind::ReduceReduce { .. }, Resolution::Default) => {
                self.reduce_reduce_defaulted += 1
            }
        }
        self.records.push(conflict);
    }
}

impl fmt::Display for ConflictSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shift/reduce ({} by precedence, {} by default), \
             {} reduce/reduce ({} by precedence, {} by default)",
            self.shift_reduce_resolved + self.shift_reduce_defaulted,
            self.shift_reduce_resolved,
            self.shift_reduce_defaulted,
            self.reduce_reduce_resolved + self.reduce_reduce_defaulted,
            self.reduce_reduce_resolved,
            self.reduce_reduce_defaulted,
        )
    }
}

/// The finished ACTION and GOTO tables.
#[derive(Debug)]
pub struct ParseTable {
    actions: Map<StateID, Map<SymbolID, ActionEntry>>,
    gotos: Map<StateID, Map<SymbolID, StateID>>,
    conflicts: ConflictSummary,
}

impl ParseTable {
    pub fn generate(grammar: &Grammar, automaton: &Automaton) -> Self {
        TableBuilder {
            grammar,
            conflicts: ConflictSummary::default(),
        }
        .build(automaton)
    }

    /// `ACTION[state, terminal]`. Missing cells are errors.
    pub fn action(&self, state: StateID, terminal: SymbolID) -> ActionEntry {
        self.actions
            .get(&state)
            .and_then(|row| row.get(&terminal))
            .copied()
            .unwrap_or(ActionEntry::Error)
    }

    pub fn actions(&self, state: StateID) -> impl Iterator<Item = (SymbolID, ActionEntry)> + '_ {
        self.actions
            .get(&state)
            .into_iter()
            .flat_map(|row| row.iter().map(|(symbol, entry)| (*symbol, *entry)))
    }

    /// `GOTO[state, nonterminal]`. Missing cells are unreachable on valid
    /// input.
    pub fn goto(&self, state: StateID, nonterminal: SymbolID) -> Option<StateID> {
        self.gotos
            .get(&state)
            .and_then(|row| row.get(&nonterminal))
            .copied()
    }

    pub fn gotos(&self, state: StateID) -> impl Iterator<Item = (SymbolID, StateID)> + '_ {
        self.gotos
            .get(&state)
            .into_iter()
            .flat_map(|row| row.iter().map(|(symbol, target)| (*symbol, *target)))
    }

    pub fn conflicts(&self) -> &ConflictSummary {
        &self.conflicts
    }
}

impl DisplayWith for ParseTable {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (state, row)) in self.actions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "#### State {:02}", state)?;
            writeln!(f, "## actions")?;
            for (symbol, entry) in row {
                let token = g.symbol(*symbol).name();
                match entry {
                    ActionEntry::Shift(n) => writeln!(f, "- {} => shift({:02})", token, n)?,
                    ActionEntry::Reduce(p) => {
                        writeln!(f, "- {} => reduce({})", token, g.production(*p).display(g))?
                    }
                    ActionEntry::Accept => writeln!(f, "- {} => accept", token)?,
                    ActionEntry::Error => writeln!(f, "- {} => error", token)?,
                }
            }
            writeln!(f, "## gotos")?;
            for (symbol, target) in self.gotos(*state) {
                writeln!(f, "- {} => goto({:02})", g.symbol(symbol).name(), target)?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct PendingAction {
    shift: Option<StateID>,
    reduces: Vec<ProductionID>,
    accept: bool,
}

struct TableBuilder<'g> {
    grammar: &'g Grammar,
    conflicts: ConflictSummary,
}

impl TableBuilder<'_> {
    fn build(mut self, automaton: &Automaton) -> ParseTable {
        let mut actions: Map<StateID, Map<SymbolID, ActionEntry>> = Map::default();
        let mut gotos: Map<StateID, Map<SymbolID, StateID>> = Map::default();

        for (id, state) in automaton.states() {
            let mut pending: Map<SymbolID, PendingAction> = Map::default();
            let mut goto_row: Map<SymbolID, StateID> = Map::default();

            for (symbol, target) in state.edges() {
                if self.grammar.is_terminal(symbol) {
                    pending.entry(symbol).or_default().shift = Some(target);
                } else {
                    goto_row.insert(symbol, target);
                }
            }

            for item in state.items() {
                if !item.is_complete(self.grammar) {
                    continue;
                }
                if item.production == ProductionID::ACCEPT && item.lookahead == SymbolID::EOI {
                    pending.entry(SymbolID::EOI).or_default().accept = true;
                } else {
                    pending
                        .entry(item.lookahead)
                        .or_default()
                        .reduces
                        .push(item.production);
                }
            }

            let mut row: Map<SymbolID, ActionEntry> = Map::default();
            for (symbol, action) in pending {
                row.insert(symbol, self.resolve(id, symbol, action));
            }
            actions.insert(id, row);
            gotos.insert(id, goto_row);
        }

        ParseTable {
            actions,
            gotos,
            conflicts: self.conflicts,
        }
    }

    fn resolve(&mut self, state: StateID, symbol: SymbolID, pending: PendingAction) -> ActionEntry {
        if pending.accept {
            // Accept belongs to `S' -> S .` with `$` alone and always wins.
            return ActionEntry::Accept;
        }

        // Settle reduce/reduce first. The reductions arrive in ascending
        // production order, so the running winner starts as the
        // earliest-declared production.
        let mut winner = pending.reduces.first().copied();
        for &later in pending.reduces.iter().skip(1) {
            let earlier = winner.expect("at least one reduction");
            let (kept, resolution) = self.resolve_reduce_reduce(earlier, later);
            self.conflicts.record(Conflict {
                state,
                lookahead: symbol,
                kind: ConflictKind::ReduceReduce { earlier, later },
                resolution,
                chosen: ActionEntry::Reduce(kept),
            });
            winner = Some(kept);
        }

        match (pending.shift, winner) {
            (Some(target), None) => ActionEntry::Shift(target),
            (None, Some(reduce)) => ActionEntry::Reduce(reduce),
            (Some(target), Some(reduce)) => {
                let (chosen, resolution) = self.resolve_shift_reduce(symbol, target, reduce);
                self.conflicts.record(Conflict {
                    state,
                    lookahead: symbol,
                    kind: ConflictKind::ShiftReduce {
                        shift: target,
                        reduce,
                    },
                    resolution,
                    chosen,
                });
                chosen
            }
            (None, None) => unreachable!("pending action without any proposal"),
        }
    }

    /// Precedence first; equal levels fall back to the associativity of
    /// the lookahead terminal. Missing precedence on either side keeps
    /// the shift.
    fn resolve_shift_reduce(
        &self,
        symbol: SymbolID,
        target: StateID,
        reduce: ProductionID,
    ) -> (ActionEntry, Resolution) {
        let token_prec = self.grammar.symbol(symbol).precedence();
        let production_prec = self.grammar.production(reduce).precedence();

        if token_prec == 0 || production_prec == 0 {
            return (ActionEntry::Shift(target), Resolution::Default);
        }

        match Ord::cmp(&production_prec, &token_prec) {
            Ordering::Greater => (ActionEntry::Reduce(reduce), Resolution::Policy),
            Ordering::Less => (ActionEntry::Shift(target), Resolution::Policy),
            Ordering::Equal => match self.grammar.symbol(symbol).assoc() {
                Assoc::Left => (ActionEntry::Reduce(reduce), Resolution::Policy),
                Assoc::Right => (ActionEntry::Shift(target), Resolution::Policy),
                Assoc::NonAssoc => (ActionEntry::Error, Resolution::Policy),
                Assoc::None => (ActionEntry::Shift(target), Resolution::Default),
            },
        }
    }

    /// Higher declared precedence wins; otherwise the earlier-declared
    /// production does.
    fn resolve_reduce_reduce(
        &self,
        earlier: ProductionID,
        later: ProductionID,
    ) -> (ProductionID, Resolution) {
        let earlier_prec = self.grammar.production(earlier).precedence();
        let later_prec = self.grammar.production(later).precedence();

        if earlier_prec != 0 && later_prec != 0 && earlier_prec != later_prec {
            if later_prec > earlier_prec {
                (later, Resolution::Policy)
            } else {
                (earlier, Resolution::Policy)
            }
        } else {
            (earlier.min(later), Resolution::Default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, SymbolKind};
    use crate::lr1::LRItem;

    fn state_with_completed(
        grammar: &Grammar,
        automaton: &Automaton,
        production: ProductionID,
        lookahead: SymbolID,
    ) -> StateID {
        let dot = grammar.production(production).right().len() as u16;
        automaton
            .states()
            .find(|(_, state)| {
                state.items().contains(&LRItem {
                    production,
                    dot,
                    lookahead,
                })
            })
            .map(|(id, _)| id)
            .expect("no state holds the requested completed item")
    }

    // %token NUM; %left '+'; %left '*'; E : E '+' E | E '*' E | NUM ;
    fn ambiguous_arithmetic() -> Grammar {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let plus = b.intern("'+'", SymbolKind::Literal).unwrap();
        let star = b.intern("'*'", SymbolKind::Literal).unwrap();
        let num = b.intern("NUM", SymbolKind::Token).unwrap();
        b.set_precedence("'+'", 1, Assoc::Left).unwrap();
        b.set_precedence("'*'", 2, Assoc::Left).unwrap();
        b.production(expr, vec![expr, plus, expr], None, None).unwrap();
        b.production(expr, vec![expr, star, expr], None, None).unwrap();
        b.production(expr, vec![num], None, None).unwrap();
        b.freeze().unwrap()
    }

    #[test]
    fn precedence_resolves_shift_and_reduce() {
        let g = ambiguous_arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let plus = g.lookup("'+'").unwrap();
        let star = g.lookup("'*'").unwrap();
        let add = ProductionID::from_raw(1);
        let mul = ProductionID::from_raw(2);

        // After E '+' E, '*' binds tighter: shift.
        let state = state_with_completed(&g, &automaton, add, star);
        assert!(matches!(table.action(state, star), ActionEntry::Shift(_)));
        // After E '+' E, '+' is left-associative: reduce.
        let state = state_with_completed(&g, &automaton, add, plus);
        assert_eq!(table.action(state, plus), ActionEntry::Reduce(add));
        // After E '*' E, '+' binds looser: reduce.
        let state = state_with_completed(&g, &automaton, mul, plus);
        assert_eq!(table.action(state, plus), ActionEntry::Reduce(mul));
        // After E '*' E, '*' is left-associative: reduce.
        let state = state_with_completed(&g, &automaton, mul, star);
        assert_eq!(table.action(state, star), ActionEntry::Reduce(mul));
    }

    #[test]
    fn all_arithmetic_conflicts_resolve_by_policy() {
        let g = ambiguous_arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let summary = table.conflicts();
        assert!(summary.shift_reduce_resolved > 0);
        assert_eq!(summary.shift_reduce_defaulted, 0);
        assert_eq!(summary.reduce_reduce_resolved, 0);
        assert_eq!(summary.reduce_reduce_defaulted, 0);
    }

    // %token IF THEN ELSE STMT; S : IF THEN S | IF THEN S ELSE S | STMT ;
    fn dangling_else(prec: bool) -> Grammar {
        let mut b = GrammarBuilder::new();
        let s = b.intern("stmt", SymbolKind::NonTerminal).unwrap();
        let r#if = b.intern("IF", SymbolKind::Token).unwrap();
        let then = b.intern("THEN", SymbolKind::Token).unwrap();
        let r#else = b.intern("ELSE", SymbolKind::Token).unwrap();
        let atom = b.intern("STMT", SymbolKind::Token).unwrap();
        let mut low = None;
        if prec {
            b.set_precedence("ELSE_LOW", 1, Assoc::NonAssoc).unwrap();
            b.set_precedence("ELSE", 2, Assoc::NonAssoc).unwrap();
            low = Some(b.intern("ELSE_LOW", SymbolKind::Token).unwrap());
        }
        b.production(s, vec![r#if, then, s], None, low).unwrap();
        b.production(s, vec![r#if, then, s, r#else, s], None, None)
            .unwrap();
        b.production(s, vec![atom], None, None).unwrap();
        b.freeze().unwrap()
    }

    #[test]
    fn dangling_else_defaults_to_shift() {
        let g = dangling_else(false);
        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let summary = table.conflicts();
        assert_eq!(summary.shift_reduce_defaulted, 1);
        assert_eq!(summary.shift_reduce_resolved, 0);
        assert_eq!(summary.reduce_reduce_resolved + summary.reduce_reduce_defaulted, 0);

        let r#else = g.lookup("ELSE").unwrap();
        let short = ProductionID::from_raw(1);
        let state = state_with_completed(&g, &automaton, short, r#else);
        assert!(matches!(table.action(state, r#else), ActionEntry::Shift(_)));
    }

    #[test]
    fn prec_override_moves_dangling_else_to_resolved() {
        let g = dangling_else(true);
        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let summary = table.conflicts();
        assert_eq!(summary.shift_reduce_resolved, 1);
        assert_eq!(summary.shift_reduce_defaulted, 0);

        let r#else = g.lookup("ELSE").unwrap();
        let short = ProductionID::from_raw(1);
        let state = state_with_completed(&g, &automaton, short, r#else);
        assert!(matches!(table.action(state, r#else), ActionEntry::Shift(_)));
    }

    // S : X | Y ; X : A ; Y : A ;
    #[test]
    fn reduce_reduce_prefers_the_earlier_production() {
        let mut b = GrammarBuilder::new();
        let s = b.intern("s", SymbolKind::NonTerminal).unwrap();
        let x = b.intern("x", SymbolKind::NonTerminal).unwrap();
        let y = b.intern("y", SymbolKind::NonTerminal).unwrap();
        let a = b.intern("A", SymbolKind::Token).unwrap();
        b.production(s, vec![x], None, None).unwrap();
        b.production(s, vec![y], None, None).unwrap();
        b.production(x, vec![a], None, None).unwrap();
        b.production(y, vec![a], None, None).unwrap();
        let g = b.freeze().unwrap();

        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let summary = table.conflicts();
        assert_eq!(summary.reduce_reduce_defaulted, 1);
        assert_eq!(summary.reduce_reduce_resolved, 0);
        assert_eq!(summary.records.len(), 1);

        let x_rule = ProductionID::from_raw(3);
        let state = state_with_completed(&g, &automaton, x_rule, SymbolID::EOI);
        assert_eq!(table.action(state, SymbolID::EOI), ActionEntry::Reduce(x_rule));
    }

    // %nonassoc '<' ; E : E '<' E | NUM ;
    #[test]
    fn nonassoc_resolves_to_an_error_cell() {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let lt = b.intern("'<'", SymbolKind::Literal).unwrap();
        let num = b.intern("NUM", SymbolKind::Token).unwrap();
        b.set_precedence("'<'", 1, Assoc::NonAssoc).unwrap();
        b.production(expr, vec![expr, lt, expr], None, None).unwrap();
        b.production(expr, vec![num], None, None).unwrap();
        let g = b.freeze().unwrap();

        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let cmp = ProductionID::from_raw(1);
        let state = state_with_completed(&g, &automaton, cmp, lt);
        assert_eq!(table.action(state, lt), ActionEntry::Error);
        assert_eq!(table.conflicts().shift_reduce_resolved, 1);
    }

    #[test]
    fn accept_is_unique_and_reached_from_goto_on_start() {
        let g = ambiguous_arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let table = ParseTable::generate(&g, &automaton);

        let mut accepting = Vec::new();
        for (id, _) in automaton.states() {
            for (symbol, entry) in table.actions(id) {
                if entry == ActionEntry::Accept {
                    assert_eq!(symbol, SymbolID::EOI);
                    accepting.push(id);
                }
            }
        }
        let goto = automaton
            .state(StateID::START)
            .edge(g.start_symbol())
            .unwrap();
        assert_eq!(accepting, [goto]);
    }

    #[test]
    fn tables_are_reproducible() {
        let g = ambiguous_arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let a = ParseTable::generate(&g, &automaton);
        let b = ParseTable::generate(&g, &automaton);

        for (id, _) in automaton.states() {
            let lhs: Vec<_> = a.actions(id).collect();
            let rhs: Vec<_> = b.actions(id).collect();
            assert_eq!(lhs, rhs);
            let lhs: Vec<_> = a.gotos(id).collect();
            let rhs: Vec<_> = b.gotos(id).collect();
            assert_eq!(lhs, rhs);
        }
        assert_eq!(a.conflicts().total(), b.conflicts().total());
    }
}
