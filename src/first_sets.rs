//! Calculation of the FIRST set function.

use crate::grammar::{Grammar, SymbolID, TerminalSet};
use crate::types::{Map, Set};

/// `FIRST(α)`: the terminals that can begin a string derived from α, plus
/// the epsilon marker when α is nullable.
#[derive(Debug, Clone)]
pub struct FirstSet {
    terminals: TerminalSet,
    epsilon: bool,
}

impl FirstSet {
    pub fn contains(&self, id: SymbolID) -> bool {
        self.terminals.contains(id)
    }

    pub fn contains_epsilon(&self) -> bool {
        self.epsilon
    }

    pub fn terminals(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.terminals.iter()
    }

    pub fn len(&self) -> usize {
        self.terminals.len() + usize::from(self.epsilon)
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty() && !self.epsilon
    }
}

/// All FIRST sets of a grammar, computed once up front by fixpoint
/// iteration and served from the cache afterwards.
#[derive(Debug)]
pub struct FirstSets {
    nullables: Set<SymbolID>,
    map: Map<SymbolID, TerminalSet>,
}

impl FirstSets {
    pub fn new(grammar: &Grammar) -> Self {
        let nullables = nullable_set(grammar);

        // First(T) = {T} for terminals, First(N) = {} for nonterminals.
        let mut map: Map<SymbolID, TerminalSet> = Map::default();
        for (id, _) in grammar.terminals() {
            map.insert(id, Some(id).into_iter().collect());
        }
        for (id, _) in grammar.nonterminals() {
            map.insert(id, TerminalSet::default());
        }

        // For a production X -> Y1 Y2 ... Yn, walk the right-hand side up to
        // (and including) the first non-nullable symbol Yk; each visited Yi
        // contributes the constraint First(X) ⊇ First(Yi).
        struct Constraint {
            sup: SymbolID,
            sub: SymbolID,
        }
        let mut constraints = Vec::new();
        for (_, production) in grammar.productions() {
            for &symbol in production.right() {
                if symbol != production.left() {
                    constraints.push(Constraint {
                        sup: production.left(),
                        sub: symbol,
                    });
                }
                if !nullables.contains(&symbol) {
                    break;
                }
            }
        }

        // Resolve the constraints by propagating until nothing changes.
        let mut changed = true;
        while changed {
            changed = false;
            for Constraint { sup, sub } in &constraints {
                let subset = map[sub].clone();
                let superset = &mut map[sup];
                let before = superset.len();
                superset.union_with(&subset);
                changed |= superset.len() != before;
            }
        }

        Self { nullables, map }
    }

    pub fn nullable(&self, id: SymbolID) -> bool {
        self.nullables.contains(&id)
    }

    /// `FIRST(X)` for a single symbol.
    pub fn first(&self, x: SymbolID) -> FirstSet {
        FirstSet {
            terminals: self.map[&x].clone(),
            epsilon: self.nullable(x),
        }
    }

    /// `FIRST(X1 ... Xn)` for a (possibly empty) sequence of symbols.
    pub fn first_sequence(&self, symbols: &[SymbolID]) -> FirstSet {
        let mut terminals = TerminalSet::default();
        let mut epsilon = true;
        for symbol in symbols {
            terminals.union_with(&self.map[symbol]);
            if !self.nullables.contains(symbol) {
                epsilon = false;
                break;
            }
        }
        FirstSet { terminals, epsilon }
    }

    /// `FIRST(prefix a)` where `a` is a single terminal. This is the
    /// lookahead computation on the closure hot path: the epsilon marker
    /// never escapes because `a` itself closes the sequence.
    pub(crate) fn first_concat(&self, prefix: &[SymbolID], lookahead: SymbolID) -> TerminalSet {
        let mut result = TerminalSet::default();
        for symbol in prefix {
            result.union_with(&self.map[symbol]);
            if !self.nullables.contains(symbol) {
                return result;
            }
        }
        result.insert(lookahead);
        result
    }
}

/// The set of nullable nonterminals, iterated to fixpoint.
fn nullable_set(grammar: &Grammar) -> Set<SymbolID> {
    let mut nullables: Set<SymbolID> = grammar
        .productions()
        .filter(|(_, p)| p.right().is_empty())
        .map(|(_, p)| p.left())
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (_, production) in grammar.productions() {
            if nullables.contains(&production.left()) {
                continue;
            }
            let rhs_nullable = production
                .right()
                .iter()
                .all(|symbol| nullables.contains(symbol));
            if rhs_nullable {
                nullables.insert(production.left());
                changed = true;
            }
        }
    }

    nullables
}
