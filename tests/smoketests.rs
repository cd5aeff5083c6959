use ryacc::codegen::Codegen;
use ryacc::grammar::SymbolID;
use ryacc::ingest::{self, ParsedGrammar};
use ryacc::lr1::{Automaton, StateID};
use ryacc::parse_table::{ActionEntry, ParseTable};
use ryacc::syntax;
use std::{env, fs, path::PathBuf};

fn process(name: &str) -> (ParsedGrammar, Automaton, ParseTable) {
    let path = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
        .join(format!("tests/{}.y", name));
    let source = fs::read_to_string(&path).unwrap();
    let parsed = ingest::ingest(&syntax::parse(&source).unwrap()).unwrap();
    let automaton = Automaton::generate(&parsed.grammar).unwrap();
    let table = ParseTable::generate(&parsed.grammar, &automaton);
    (parsed, automaton, table)
}

macro_rules! define_tests {
    ($($name:ident),*$(,)?) => {$(
        #[test]
        fn $name() {
            let (parsed, automaton, table) = process(stringify!($name));

            // Exactly one accepting cell, sitting on `$` in the state
            // reached by goto(0, S).
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
                .edge(parsed.grammar.start_symbol())
                .expect("goto(0, S) must exist");
            assert_eq!(accepting, [goto]);
        }
    )*};
}

define_tests! {
    arithmetic,
    calc,
    dangling_else,
    epsilon_list,
    reduce_reduce,
    relational,
}

#[test]
fn arithmetic_has_no_conflicts() {
    let (_, _, table) = process("arithmetic");
    assert_eq!(table.conflicts().total(), 0);
}

#[test]
fn calc_resolves_every_conflict_by_precedence() {
    let (_, _, table) = process("calc");
    let summary = table.conflicts();
    assert!(summary.shift_reduce_resolved > 0);
    assert_eq!(summary.shift_reduce_defaulted, 0);
    assert_eq!(summary.reduce_reduce_resolved, 0);
    assert_eq!(summary.reduce_reduce_defaulted, 0);
}

#[test]
fn dangling_else_defaults_one_shift() {
    let (parsed, _automaton, table) = process("dangling_else");
    let summary = table.conflicts();
    assert_eq!(summary.shift_reduce_defaulted, 1);
    assert_eq!(summary.shift_reduce_resolved, 0);

    let record = &summary.records[0];
    assert_eq!(record.lookahead, parsed.grammar.lookup("ELSE").unwrap());
    assert!(matches!(record.chosen, ActionEntry::Shift(_)));
    assert!(matches!(
        table.action(record.state, record.lookahead),
        ActionEntry::Shift(_)
    ));
}

#[test]
fn reduce_reduce_keeps_the_earlier_rule() {
    let (parsed, _automaton, table) = process("reduce_reduce");
    let summary = table.conflicts();
    assert_eq!(summary.reduce_reduce_defaulted, 1);
    assert_eq!(summary.records.len(), 1);

    let x = parsed.grammar.lookup("x").unwrap();
    let x_rule = parsed.grammar.productions_of(x)[0];
    let record = &summary.records[0];
    assert_eq!(record.chosen, ActionEntry::Reduce(x_rule));
    assert_eq!(
        table.action(record.state, SymbolID::EOI),
        ActionEntry::Reduce(x_rule)
    );
}

#[test]
fn relational_nonassoc_emits_an_error_cell() {
    let (parsed, automaton, table) = process("relational");
    let lt = parsed.grammar.lookup("'<'").unwrap();
    let error_cells = automaton
        .states()
        .filter(|(id, _)| table.action(*id, lt) == ActionEntry::Error)
        .count();
    assert_eq!(error_cells, 1);
    assert_eq!(table.conflicts().shift_reduce_resolved, 1);
}

#[test]
fn epsilon_reduce_appears_once_after_consuming_a() {
    let (parsed, automaton, table) = process("epsilon_list");
    let empty_rule = parsed
        .grammar
        .productions()
        .find(|(_, p)| p.right().is_empty())
        .map(|(id, _)| id)
        .expect("the list grammar has an empty production");
    let a = parsed.grammar.lookup("A").unwrap();

    let reducing_targets = automaton
        .transitions()
        .filter(|(_, symbol, _)| *symbol == a)
        .filter(|(_, _, target)| {
            table
                .actions(*target)
                .any(|(_, entry)| entry == ActionEntry::Reduce(empty_rule))
        })
        .count();
    assert_eq!(reducing_targets, 1);
}

#[test]
fn generation_is_reproducible() {
    let render = || {
        let (parsed, automaton, table) = process("calc");
        let codegen = Codegen::new(&parsed, &automaton, &table);
        (
            codegen.source_file("calc.tab.h").to_string(),
            codegen.header_file("calc.tab.h").to_string(),
        )
    };
    assert_eq!(render(), render());
}
