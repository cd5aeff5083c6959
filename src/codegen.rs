//! Emission of the table-driven C parser and its token header.
//!
//! The layout mirrors the classic yacc output: a row-major `yytable` over
//! the dense terminal columns, `yygoto` over the nonterminal columns,
//! `yyr1`/`yyr2` describing the productions, and a `yy_reduce` switch
//! carrying the user's semantic actions with `$$`/`$N` substituted.

use crate::grammar::{literal_token_value, Grammar, ProductionID, SymbolID, SymbolKind};
use crate::ingest::ParsedGrammar;
use crate::lr1::Automaton;
use crate::parse_table::{ActionEntry, ParseTable};
use crate::util::DisplayWith;
use std::fmt;

/// ACTION cell encoding in the emitted table: a positive value shifts to
/// that state, a negative value reduces by `-value - 1`, zero accepts,
/// and this sentinel is the error cell.
const YYERRCODE: i32 = -32767;

#[derive(Debug)]
pub struct Codegen<'g> {
    source: &'g ParsedGrammar,
    automaton: &'g Automaton,
    table: &'g ParseTable,
    /// Terminal columns, by dense id; `$` comes first.
    terminals: Vec<SymbolID>,
    /// Nonterminal columns, sorted by name, augmented start excluded.
    nonterminals: Vec<SymbolID>,
    /// Raw token value per terminal column: 0 for `$`, the byte-fold
    /// value for literals, 256 onwards for named tokens.
    raw_values: Vec<i32>,
}

impl<'g> Codegen<'g> {
    pub fn new(source: &'g ParsedGrammar, automaton: &'g Automaton, table: &'g ParseTable) -> Self {
        let g = &source.grammar;

        let terminals: Vec<SymbolID> = g.terminals().map(|(id, _)| id).collect();
        let mut nonterminals: Vec<SymbolID> = g
            .nonterminals()
            .filter(|(id, _)| *id != g.accept_symbol())
            .map(|(id, _)| id)
            .collect();
        nonterminals.sort_by(|a, b| g.symbol(*a).name().cmp(g.symbol(*b).name()));

        let mut raw_values = Vec::with_capacity(terminals.len());
        let mut next_token_value = 256;
        for (column, id) in terminals.iter().enumerate() {
            let sym = g.symbol(*id);
            let value = if column == 0 {
                0
            } else if sym.kind() == SymbolKind::Literal {
                literal_token_value(sym.name()).expect("literals are validated at ingestion") as i32
            } else {
                let value = next_token_value;
                next_token_value += 1;
                value
            };
            raw_values.push(value);
        }

        Self {
            source,
            automaton,
            table,
            terminals,
            nonterminals,
            raw_values,
        }
    }

    fn grammar(&self) -> &Grammar {
        &self.source.grammar
    }

    fn max_raw_value(&self) -> i32 {
        self.raw_values.iter().copied().max().unwrap_or(0)
    }

    /// Column of a nonterminal in `yygoto`, offset by the token count the
    /// way `yyr1` encodes left-hand sides.
    fn nonterminal_index(&self, id: SymbolID) -> Option<usize> {
        self.nonterminals
            .iter()
            .position(|n| *n == id)
            .map(|pos| pos + self.terminals.len())
    }

    /// The generated C source file. `header_name` is the include the
    /// emitted code expects the header under.
    pub fn source_file<'a>(&'a self, header_name: &'a str) -> SourceFile<'a> {
        SourceFile {
            codegen: self,
            header_name,
        }
    }

    /// The generated token header.
    pub fn header_file<'a>(&'a self, header_name: &'a str) -> HeaderFile<'a> {
        HeaderFile {
            codegen: self,
            header_name,
        }
    }

    fn write_source(&self, f: &mut fmt::Formatter<'_>, header_name: &str) -> fmt::Result {
        let g = self.grammar();
        let state_count = self.automaton.state_count();
        let max_rhs = g
            .productions()
            .map(|(_, p)| p.right().len())
            .max()
            .unwrap_or(0);

        writeln!(f, "/* A table-driven LR(1) parser. Generated; do not edit. */")?;
        writeln!(f)?;
        writeln!(f, "#include \"{}\"", header_name)?;
        writeln!(f, "#include <stdio.h>")?;
        writeln!(f, "#include <stdlib.h>")?;
        writeln!(f, "#include <string.h>")?;
        writeln!(f)?;

        if let Some(prologue) = &self.source.prologue {
            writeln!(f, "/* User prologue. */")?;
            writeln!(f, "{}", prologue.trim_matches('\n'))?;
            writeln!(f)?;
        }

        writeln!(f, "YYSTYPE yylval;")?;
        writeln!(f)?;
        writeln!(f, "#ifndef YYMAXDEPTH")?;
        writeln!(f, "# define YYMAXDEPTH 10000")?;
        writeln!(f, "#endif")?;
        writeln!(f)?;
        writeln!(f, "#define YYNTOKENS {}", self.terminals.len())?;
        writeln!(f, "#define YYNNTS {}", self.nonterminals.len())?;
        writeln!(f, "#define YYNRULES {}", g.productions().count())?;
        writeln!(f, "#define YYNSTATES {}", state_count)?;
        writeln!(f, "#define YYMAXUTOK {}", self.max_raw_value())?;
        writeln!(f, "#define YYMAXRHS {}", max_rhs)?;
        writeln!(f, "#define YYUNDEF -1")?;
        writeln!(f, "#define YYERRCODE ({})", YYERRCODE)?;
        writeln!(f)?;
        writeln!(f, "extern int yylex(void);")?;
        writeln!(f, "extern void yyerror(const char* msg);")?;
        writeln!(f)?;

        self.write_translate_table(f)?;
        self.write_token_names(f)?;
        self.write_action_table(f)?;
        self.write_goto_table(f)?;
        self.write_rule_tables(f)?;
        self.write_reduce_fn(f)?;
        self.write_error_stub(f)?;
        self.write_parse_fn(f)?;

        if let Some(epilogue) = &self.source.epilogue {
            writeln!(f, "/* User epilogue. */")?;
            writeln!(f, "{}", epilogue.trim_matches('\n'))?;
        }
        Ok(())
    }

    fn write_translate_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = self.max_raw_value();
        let mut translate = vec![-1i32; max as usize + 1];
        for (column, value) in self.raw_values.iter().enumerate() {
            translate[*value as usize] = column as i32;
        }

        writeln!(f, "/* Raw token value -> dense terminal column. */")?;
        writeln!(f, "static const short yytranslate_table[{}] = {{", max + 1)?;
        for chunk in translate.chunks(16) {
            write!(f, " ")?;
            for value in chunk {
                write!(f, " {},", value)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}};")?;
        writeln!(f)?;
        writeln!(f, "static int yytranslate_token(int token) {{")?;
        writeln!(f, "  if (token < 0 || token > YYMAXUTOK) {{")?;
        writeln!(f, "    return YYUNDEF;")?;
        writeln!(f, "  }}")?;
        writeln!(f, "  return yytranslate_table[token];")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn write_token_names(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar();
        writeln!(f, "static const char* yytname[] = {{")?;
        write!(f, "  \"$end\"")?;
        for id in &self.terminals[1..] {
            write!(f, ",\n  \"{}\"", c_escape(g.symbol(*id).name()))?;
        }
        writeln!(f, "\n}};")?;
        writeln!(f)
    }

    fn write_action_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* ACTION: shift > 0, reduce < 0 (rule = -n - 1), accept = 0. */")?;
        writeln!(f, "static const short yytable[] = {{")?;
        for (state, _) in self.automaton.states() {
            writeln!(f, "  /* state {} */", state)?;
            write!(f, " ")?;
            for terminal in &self.terminals {
                let code = match self.table.action(state, *terminal) {
                    ActionEntry::Shift(target) => target.raw() as i32,
                    ActionEntry::Reduce(production) => -(production.raw() as i32) - 1,
                    ActionEntry::Accept => 0,
                    ActionEntry::Error => YYERRCODE,
                };
                write!(f, " {},", code)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}};")?;
        writeln!(f)
    }

    fn write_goto_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* GOTO: next state per nonterminal, -1 where undefined. */")?;
        writeln!(f, "static const short yygoto[] = {{")?;
        for (state, _) in self.automaton.states() {
            writeln!(f, "  /* state {} */", state)?;
            write!(f, " ")?;
            for nonterminal in &self.nonterminals {
                let code = match self.table.goto(state, *nonterminal) {
                    Some(target) => target.raw() as i32,
                    None => -1,
                };
                write!(f, " {},", code)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}};")?;
        writeln!(f)
    }

    fn write_rule_tables(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar();

        writeln!(f, "/* Left-hand side symbol index per rule. */")?;
        writeln!(f, "static const short yyr1[] = {{")?;
        write!(f, " ")?;
        for (_, production) in g.productions() {
            let index = self.nonterminal_index(production.left()).unwrap_or(0);
            write!(f, " {},", index)?;
        }
        writeln!(f, "\n}};")?;
        writeln!(f)?;

        writeln!(f, "/* Right-hand side length per rule. */")?;
        writeln!(f, "static const short yyr2[] = {{")?;
        write!(f, " ")?;
        for (_, production) in g.productions() {
            write!(f, " {},", production.right().len())?;
        }
        writeln!(f, "\n}};")?;
        writeln!(f)
    }

    fn write_reduce_fn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar();

        writeln!(f, "static void yy_reduce(int rule_num, int* top, YYSTYPE* stack) {{")?;
        writeln!(f, "  int yylen = yyr2[rule_num];")?;
        writeln!(f, "  int yyi;")?;
        writeln!(f, "  YYSTYPE yyval;")?;
        writeln!(f, "  YYSTYPE yyvsp[YYMAXRHS + 1];")?;
        writeln!(f, "  for (yyi = 1; yyi <= yylen; yyi++) {{")?;
        writeln!(f, "    yyvsp[yyi] = stack[*top - yylen + yyi];")?;
        writeln!(f, "  }}")?;
        writeln!(f, "  if (yylen > 0) {{")?;
        writeln!(f, "    yyval = yyvsp[1];")?;
        writeln!(f, "  }}")?;
        writeln!(f, "  switch (rule_num) {{")?;
        for (id, production) in g.productions() {
            writeln!(f, "    case {}: /* {} */", id, production.display(g))?;
            if let Some(action) = self.expand_action(id) {
                writeln!(f, "      {{")?;
                writeln!(f, "        {}", action.trim())?;
                writeln!(f, "      }}")?;
            }
            writeln!(f, "      break;")?;
        }
        writeln!(f, "  }}")?;
        writeln!(f, "  stack[*top - yylen + 1] = yyval;")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn write_error_stub(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* Error reporting stub: no recovery is attempted. */")?;
        writeln!(f, "static void yyreport_error(int state, int token) {{")?;
        writeln!(f, "  int yyi;")?;
        writeln!(f, "  int printed = 0;")?;
        writeln!(
            f,
            "  fprintf(stderr, \"syntax error: unexpected %s, expecting\","
        )?;
        writeln!(
            f,
            "          token >= 0 ? yytname[token] : \"<invalid token>\");"
        )?;
        writeln!(f, "  for (yyi = 0; yyi < YYNTOKENS; yyi++) {{")?;
        writeln!(f, "    if (yytable[state * YYNTOKENS + yyi] != YYERRCODE) {{")?;
        writeln!(
            f,
            "      fprintf(stderr, \"%s %s\", printed ? \" or\" : \"\", yytname[yyi]);"
        )?;
        writeln!(f, "      printed = 1;")?;
        writeln!(f, "    }}")?;
        writeln!(f, "  }}")?;
        writeln!(f, "  fputc('\\n', stderr);")?;
        writeln!(f, "  yyerror(\"syntax error\");")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn write_parse_fn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "int yyparse(void) {{")?;
        writeln!(f, "  int state = 0;")?;
        writeln!(f, "  int top = 0;")?;
        writeln!(f, "  int token;")?;
        writeln!(f, "  YYSTYPE stack[YYMAXDEPTH];")?;
        writeln!(f, "  int state_stack[YYMAXDEPTH];")?;
        writeln!(f)?;
        writeln!(f, "  state_stack[0] = 0;")?;
        writeln!(f, "  token = yytranslate_token(yylex());")?;
        writeln!(f)?;
        writeln!(f, "  for (;;) {{")?;
        writeln!(f, "    int action;")?;
        writeln!(f, "    if (token == YYUNDEF) {{")?;
        writeln!(f, "      yyerror(\"unrecognized token\");")?;
        writeln!(f, "      return 1;")?;
        writeln!(f, "    }}")?;
        writeln!(f, "    action = yytable[state * YYNTOKENS + token];")?;
        writeln!(f, "    if (action == YYERRCODE) {{")?;
        writeln!(f, "      yyreport_error(state, token);")?;
        writeln!(f, "      return 1;")?;
        writeln!(f, "    }}")?;
        writeln!(f, "    if (action > 0) {{ /* shift */")?;
        writeln!(f, "      stack[++top] = yylval;")?;
        writeln!(f, "      state_stack[top] = action;")?;
        writeln!(f, "      state = action;")?;
        writeln!(f, "      token = yytranslate_token(yylex());")?;
        writeln!(f, "    }} else if (action < 0) {{ /* reduce */")?;
        writeln!(f, "      int rule = -action - 1;")?;
        writeln!(f, "      int nonterminal;")?;
        writeln!(f, "      int next_state;")?;
        writeln!(f, "      yy_reduce(rule, &top, stack);")?;
        writeln!(f, "      top -= yyr2[rule];")?;
        writeln!(f, "      nonterminal = yyr1[rule] - YYNTOKENS;")?;
        writeln!(
            f,
            "      next_state = yygoto[state_stack[top] * YYNNTS + nonterminal];"
        )?;
        writeln!(f, "      if (next_state < 0) {{")?;
        writeln!(f, "        yyerror(\"goto table error\");")?;
        writeln!(f, "        return 2;")?;
        writeln!(f, "      }}")?;
        writeln!(f, "      state_stack[++top] = next_state;")?;
        writeln!(f, "      state = next_state;")?;
        writeln!(f, "    }} else {{ /* accept */")?;
        writeln!(f, "      return 0;")?;
        writeln!(f, "    }}")?;
        writeln!(f, "  }}")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn write_header(&self, f: &mut fmt::Formatter<'_>, header_name: &str) -> fmt::Result {
        let g = self.grammar();
        let guard: String = header_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();

        writeln!(f, "/* Token definitions for the generated LR(1) parser. */")?;
        writeln!(f)?;
        writeln!(f, "#ifndef {}_INCLUDED", guard)?;
        writeln!(f, "# define {}_INCLUDED", guard)?;
        writeln!(f)?;
        writeln!(f, "#ifndef YYDEBUG")?;
        writeln!(f, "# define YYDEBUG 0")?;
        writeln!(f, "#endif")?;
        writeln!(f)?;

        writeln!(f, "#ifndef YYTOKENTYPE")?;
        writeln!(f, "# define YYTOKENTYPE")?;
        writeln!(f, "  enum yytokentype")?;
        writeln!(f, "  {{")?;
        writeln!(f, "    YYEOF = 0,")?;
        for (column, id) in self.terminals.iter().enumerate().skip(1) {
            let sym = g.symbol(*id);
            if sym.kind() == SymbolKind::Token {
                writeln!(f, "    {} = {},", sym.name(), self.raw_values[column])?;
            }
        }
        writeln!(f, "  }};")?;
        writeln!(f, "#endif")?;
        writeln!(f)?;

        writeln!(f, "#define YYEOF 0")?;
        for (column, id) in self.terminals.iter().enumerate().skip(1) {
            let sym = g.symbol(*id);
            if sym.kind() == SymbolKind::Token {
                writeln!(f, "#define {} {}", sym.name(), self.raw_values[column])?;
            }
        }
        writeln!(f)?;

        writeln!(f, "#if ! defined YYSTYPE && ! defined YYSTYPE_IS_DECLARED")?;
        writeln!(f, "union YYSTYPE")?;
        match &self.source.union_decl {
            Some(block) => {
                let inner = block
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                    .unwrap_or(block);
                writeln!(f, "{{{}}};", inner)?;
            }
            None => {
                writeln!(f, "{{")?;
                writeln!(f, "  int ival;")?;
                writeln!(f, "  char* sval;")?;
                writeln!(f, "}};")?;
            }
        }
        writeln!(f, "typedef union YYSTYPE YYSTYPE;")?;
        writeln!(f, "# define YYSTYPE_IS_TRIVIAL 1")?;
        writeln!(f, "# define YYSTYPE_IS_DECLARED 1")?;
        writeln!(f, "#endif")?;
        writeln!(f)?;
        writeln!(f, "extern YYSTYPE yylval;")?;
        writeln!(f)?;
        writeln!(f, "int yyparse(void);")?;
        writeln!(f)?;
        writeln!(f, "#endif /* !{}_INCLUDED */", guard)?;
        Ok(())
    }

    /// The user action with `$$` and `$N` rewritten to the value stack,
    /// member access appended where the symbol carries a `%type`/`%token`
    /// tag. Outer braces are stripped; the switch adds its own.
    fn expand_action(&self, id: ProductionID) -> Option<String> {
        let g = self.grammar();
        let production = g.production(id);
        let action = production.semantic_action()?;
        let inner = action
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(action);

        let bytes = inner.as_bytes();
        let mut out: Vec<u8> = Vec::with_capacity(inner.len());
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] == b'$' && pos + 1 < bytes.len() {
                if bytes[pos + 1] == b'$' {
                    out.extend_from_slice(b"yyval");
                    if let Some(tag) = g.symbol(production.left()).value_type() {
                        out.push(b'.');
                        out.extend_from_slice(tag.as_bytes());
                    }
                    pos += 2;
                    continue;
                }
                if bytes[pos + 1].is_ascii_digit() {
                    let start = pos + 1;
                    let mut end = start;
                    while end < bytes.len() && bytes[end].is_ascii_digit() {
                        end += 1;
                    }
                    let number: usize = inner[start..end].parse().expect("digits only");
                    if number >= 1 && number <= production.right().len() {
                        out.extend_from_slice(format!("yyvsp[{}]", number).as_bytes());
                        let symbol = production.right()[number - 1];
                        if let Some(tag) = g.symbol(symbol).value_type() {
                            out.push(b'.');
                            out.extend_from_slice(tag.as_bytes());
                        }
                        pos = end;
                        continue;
                    }
                }
            }
            out.push(bytes[pos]);
            pos += 1;
        }

        Some(String::from_utf8_lossy(&out).into_owned())
    }
}

/// The rendered C source, written next to the grammar file as
/// `<stem>.tab.c`.
pub struct SourceFile<'a> {
    codegen: &'a Codegen<'a>,
    header_name: &'a str,
}

impl fmt::Display for SourceFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.codegen.write_source(f, self.header_name)
    }
}

/// The rendered token header (`<stem>.tab.h`).
pub struct HeaderFile<'a> {
    codegen: &'a Codegen<'a>,
    header_name: &'a str,
}

impl fmt::Display for HeaderFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.codegen.write_header(f, self.header_name)
    }
}

fn c_escape(name: &str) -> String {
    name.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            c => vec![c],
        })
        .collect()
}
