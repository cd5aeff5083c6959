//! Construction of the canonical collection of LR(1) item sets.

use crate::first_sets::FirstSets;
use crate::grammar::{Diagnostic, Grammar, GrammarError, ProductionID, SymbolID};
use crate::types::{Map, Set};
use crate::util::DisplayWith;
use std::{collections::VecDeque, fmt};

/// An LR(1) item `[A -> α · β, a]`, collapsed to three integers so that
/// equality, hashing and ordering stay integer-cheap on the hot path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LRItem {
    pub production: ProductionID,
    pub dot: u16,
    pub lookahead: SymbolID,
}

impl LRItem {
    /// The dot is at the end of the right-hand side, so the item calls
    /// for a reduction.
    pub fn is_complete(&self, grammar: &Grammar) -> bool {
        usize::from(self.dot) >= grammar.production(self.production).right().len()
    }
}

impl DisplayWith for LRItem {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let production = g.production(self.production);
        write!(f, "{} :", g.symbol(production.left()).name())?;
        for (i, symbol) in production.right().iter().enumerate() {
            if i == usize::from(self.dot) {
                f.write_str(" .")?;
            }
            write!(f, " {}", g.symbol(*symbol).name())?;
        }
        if usize::from(self.dot) == production.right().len() {
            f.write_str(" .")?;
        }
        write!(f, "  [{}]", g.symbol(self.lookahead).name())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID(u32);

impl StateID {
    /// The start state. Always discovered first.
    pub const START: Self = Self(0);

    const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One state of the automaton: its closed item set in canonical (sorted)
/// order, and the outgoing transition per symbol appearing after a dot.
#[derive(Debug)]
pub struct State {
    items: Vec<LRItem>,
    edges: Map<SymbolID, StateID>,
}

impl State {
    pub fn items(&self) -> &[LRItem] {
        &self.items
    }

    pub fn edges(&self) -> impl Iterator<Item = (SymbolID, StateID)> + '_ {
        self.edges.iter().map(|(symbol, target)| (*symbol, *target))
    }

    pub fn edge(&self, symbol: SymbolID) -> Option<StateID> {
        self.edges.get(&symbol).copied()
    }
}

/// The canonical collection, with state ids in discovery order.
#[derive(Debug)]
pub struct Automaton {
    states: Map<StateID, State>,
    diagnostics: Vec<Diagnostic>,
}

impl Automaton {
    pub fn generate(grammar: &Grammar) -> Result<Self, GrammarError> {
        if !grammar.has_accept_production() {
            return Err(GrammarError::NoStartProduction);
        }
        let builder = Builder {
            grammar,
            first_sets: FirstSets::new(grammar),
            missing: Set::default(),
            diagnostics: Vec::new(),
        };
        Ok(builder.build())
    }

    pub fn states(&self) -> impl Iterator<Item = (StateID, &State)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    pub fn state(&self, id: StateID) -> &State {
        self.states
            .get(&id)
            .unwrap_or_else(|| panic!("dangling state id {:?}", id))
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (StateID, SymbolID, StateID)> + '_ {
        self.states
            .iter()
            .flat_map(|(from, state)| state.edges().map(move |(symbol, to)| (*from, symbol, to)))
    }

    /// Warnings surfaced during closure computation.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl DisplayWith for Automaton {
    fn fmt_with(&self, g: &Grammar, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, state)) in self.states().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "#### State {:02}", id)?;
            writeln!(f, "## items")?;
            for item in state.items() {
                writeln!(f, "- {}", item.display(g))?;
            }
            writeln!(f, "## edges")?;
            for (symbol, target) in state.edges() {
                writeln!(f, "- {} -> {:02}", g.symbol(symbol).name(), target)?;
            }
        }
        Ok(())
    }
}

struct Builder<'g> {
    grammar: &'g Grammar,
    first_sets: FirstSets,
    missing: Set<SymbolID>,
    diagnostics: Vec<Diagnostic>,
}

impl Builder<'_> {
    fn build(mut self) -> Automaton {
        let mut states: Map<StateID, State> = Map::default();
        // Canonical item set -> state id. The canonical form is the sorted
        // item vector, so equality checks on candidate states are a hash
        // lookup plus one ordered comparison.
        let mut index: Map<Vec<LRItem>, StateID> = Map::default();
        let mut queue: VecDeque<(StateID, Vec<LRItem>)> = VecDeque::new();

        let start_items = self.closure(vec![LRItem {
            production: ProductionID::ACCEPT,
            dot: 0,
            lookahead: SymbolID::EOI,
        }]);
        index.insert(start_items.clone(), StateID::START);
        queue.push_back((StateID::START, start_items));

        while let Some((id, items)) = queue.pop_front() {
            let mut edges = Map::default();
            for (symbol, kernel) in self.partition_transitions(&items) {
                let target_items = self.closure(kernel);
                let target = match index.entry(target_items) {
                    indexmap::map::Entry::Occupied(entry) => *entry.get(),
                    indexmap::map::Entry::Vacant(entry) => {
                        let target = StateID::from_raw(entry.index() as u32);
                        queue.push_back((target, entry.key().clone()));
                        entry.insert(target);
                        target
                    }
                };
                edges.insert(symbol, target);
            }
            states.insert(id, State { items, edges });
        }

        Automaton {
            states,
            diagnostics: self.diagnostics,
        }
    }

    /// Close an item set: for every `[A -> α · B β, a]` and production
    /// `B -> γ`, add `[B -> · γ, b]` for all `b ∈ FIRST(β a)`. The result
    /// is sorted into the canonical form.
    fn closure(&mut self, kernel: Vec<LRItem>) -> Vec<LRItem> {
        let grammar = self.grammar;
        let mut seen: Set<LRItem> = kernel.iter().copied().collect();
        let mut items = kernel;

        let mut cursor = 0;
        while cursor < items.len() {
            let item = items[cursor];
            cursor += 1;

            let production = grammar.production(item.production);
            let rest = &production.right()[usize::from(item.dot)..];
            let (next_symbol, beta) = match rest.split_first() {
                Some((&next_symbol, beta)) if !grammar.is_terminal(next_symbol) => {
                    (next_symbol, beta)
                }
                _ => continue,
            };

            let candidates = grammar.productions_of(next_symbol);
            if candidates.is_empty() {
                if self.missing.insert(next_symbol) {
                    self.diagnostics.push(Diagnostic::MissingProduction {
                        name: grammar.symbol(next_symbol).name().to_owned(),
                    });
                }
                continue;
            }

            let lookaheads = self.first_sets.first_concat(beta, item.lookahead);
            for &candidate in candidates {
                for lookahead in lookaheads.iter() {
                    let new_item = LRItem {
                        production: candidate,
                        dot: 0,
                        lookahead,
                    };
                    if seen.insert(new_item) {
                        items.push(new_item);
                    }
                }
            }
        }

        items.sort_unstable();
        items
    }

    /// Group the items of a state by the symbol after the dot, advancing
    /// the dot past it. The resulting kernels are the unexpanded goto sets.
    fn partition_transitions(&self, items: &[LRItem]) -> Map<SymbolID, Vec<LRItem>> {
        let mut kernels: Map<SymbolID, Vec<LRItem>> = Map::default();
        for item in items {
            let production = self.grammar.production(item.production);
            if let Some(&label) = production.right().get(usize::from(item.dot)) {
                kernels.entry(label).or_default().push(LRItem {
                    dot: item.dot + 1,
                    ..*item
                });
            }
        }
        kernels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, SymbolKind};

    fn arithmetic() -> Grammar {
        let mut b = GrammarBuilder::new();
        let expr = b.intern("expr", SymbolKind::NonTerminal).unwrap();
        let term = b.intern("term", SymbolKind::NonTerminal).unwrap();
        let factor = b.intern("factor", SymbolKind::NonTerminal).unwrap();
        let plus = b.intern("'+'", SymbolKind::Literal).unwrap();
        let star = b.intern("'*'", SymbolKind::Literal).unwrap();
        let lparen = b.intern("'('", SymbolKind::Literal).unwrap();
        let rparen = b.intern("')'", SymbolKind::Literal).unwrap();
        let num = b.intern("NUM", SymbolKind::Token).unwrap();

        b.production(expr, vec![expr, plus, term], None, None).unwrap();
        b.production(expr, vec![term], None, None).unwrap();
        b.production(term, vec![term, star, factor], None, None).unwrap();
        b.production(term, vec![factor], None, None).unwrap();
        b.production(factor, vec![num], None, None).unwrap();
        b.production(factor, vec![lparen, expr, rparen], None, None)
            .unwrap();
        b.freeze().unwrap()
    }

    #[test]
    fn start_state_holds_the_accept_item() {
        let g = arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let start = automaton.state(StateID::START);
        assert!(start.items().contains(&LRItem {
            production: ProductionID::ACCEPT,
            dot: 0,
            lookahead: SymbolID::EOI,
        }));
    }

    #[test]
    fn accept_state_is_reached_by_goto_on_start_symbol() {
        let g = arithmetic();
        let automaton = Automaton::generate(&g).unwrap();

        let goto = automaton
            .state(StateID::START)
            .edge(g.start_symbol())
            .expect("goto(0, S) must exist");

        let accepting: Vec<StateID> = automaton
            .states()
            .filter(|(_, state)| {
                state.items().contains(&LRItem {
                    production: ProductionID::ACCEPT,
                    dot: 1,
                    lookahead: SymbolID::EOI,
                })
            })
            .map(|(id, _)| id)
            .collect();
        assert_eq!(accepting, [goto]);
    }

    #[test]
    fn state_ids_are_dense_in_discovery_order() {
        let g = arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        for (expected, (id, _)) in automaton.states().enumerate() {
            assert_eq!(id.raw(), expected as u32);
        }
    }

    #[test]
    fn no_two_states_share_an_item_set() {
        let g = arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let mut seen: Set<Vec<LRItem>> = Set::default();
        for (_, state) in automaton.states() {
            assert!(seen.insert(state.items().to_vec()));
        }
    }

    #[test]
    fn transitions_are_functional() {
        let g = arithmetic();
        let automaton = Automaton::generate(&g).unwrap();
        let mut seen: Set<(StateID, SymbolID)> = Set::default();
        for (from, symbol, to) in automaton.transitions() {
            assert!(seen.insert((from, symbol)));
            assert!(to.raw() < automaton.state_count() as u32);
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let g = arithmetic();
        let a = Automaton::generate(&g).unwrap();
        let b = Automaton::generate(&g).unwrap();

        assert_eq!(a.state_count(), b.state_count());
        for ((ida, sa), (idb, sb)) in a.states().zip(b.states()) {
            assert_eq!(ida, idb);
            assert_eq!(sa.items(), sb.items());
            let ea: Vec<_> = sa.edges().collect();
            let eb: Vec<_> = sb.edges().collect();
            assert_eq!(ea, eb);
        }
    }

    #[test]
    fn missing_production_is_diagnosed_during_closure() {
        let mut b = GrammarBuilder::new();
        let s = b.intern("s", SymbolKind::NonTerminal).unwrap();
        let missing = b.intern("missing", SymbolKind::NonTerminal).unwrap();
        let a = b.intern("A", SymbolKind::Token).unwrap();
        b.production(s, vec![missing, a], None, None).unwrap();
        let g = b.freeze().unwrap();

        let automaton = Automaton::generate(&g).unwrap();
        assert!(automaton.diagnostics().contains(&Diagnostic::MissingProduction {
            name: "missing".to_owned()
        }));
    }
}
