use anyhow::Context as _;
use clap::Parser;
use ryacc::{
    codegen::Codegen, ingest, lr1::Automaton, parse_table::ParseTable, report, syntax, DisplayWith,
};
use std::{fs, path::PathBuf, time::Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "A Yacc-compatible LR(1) parser generator", long_about = None)]
struct Args {
    /// Write a PlantUML diagram of the state machine next to the input.
    #[arg(short = 'p', long)]
    plantuml: bool,

    /// Write a Markdown rendering of the ACTION/GOTO tables.
    #[arg(short = 'm', long)]
    markdown: bool,

    /// Write the token definitions header (`<stem>.tab.h`).
    #[arg(short = 'd', long)]
    definitions: bool,

    /// Override the path of the generated C source.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// The grammar file to process.
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    process_file(&args)
        .with_context(|| anyhow::anyhow!("errored during processing {}", args.input.display()))?;

    Ok(())
}

fn process_file(args: &Args) -> anyhow::Result<()> {
    let source = fs::read_to_string(&args.input) //
        .context("failed to read the grammar file")?;

    let s = Instant::now();
    let file = syntax::parse(&source)?;
    let parsed = ingest::ingest(&file)?;
    tracing::info!("grammar ingestion: {:?} elapsed", s.elapsed());

    for warning in parsed
        .warnings
        .iter()
        .chain(parsed.grammar.warnings().iter())
    {
        tracing::warn!("{}", warning);
    }

    let s = Instant::now();
    let automaton = Automaton::generate(&parsed.grammar)?;
    let table = ParseTable::generate(&parsed.grammar, &automaton);
    tracing::info!(
        "table construction: {:?} elapsed, {} states",
        s.elapsed(),
        automaton.state_count()
    );

    for diagnostic in automaton.diagnostics() {
        tracing::warn!("{}", diagnostic);
    }
    let conflicts = table.conflicts();
    if conflicts.total() > 0 {
        tracing::warn!("conflicts: {}", conflicts);
        for record in &conflicts.records {
            tracing::warn!("{}", record.display(&parsed.grammar));
        }
    }

    let stem = args
        .input
        .file_stem()
        .context("the input path has no file name")?
        .to_string_lossy()
        .into_owned();
    let sibling = |suffix: &str| {
        let mut path = args.input.clone();
        path.set_file_name(format!("{}{}", stem, suffix));
        path
    };

    let header_name = format!("{}.tab.h", stem);
    let codegen = Codegen::new(&parsed, &automaton, &table);

    let out_file = args.output.clone().unwrap_or_else(|| sibling(".tab.c"));
    fs::write(&out_file, codegen.source_file(&header_name).to_string())
        .with_context(|| anyhow::anyhow!("failed to write {}", out_file.display()))?;

    if args.definitions {
        let header_file = sibling(".tab.h");
        fs::write(&header_file, codegen.header_file(&header_name).to_string())
            .with_context(|| anyhow::anyhow!("failed to write {}", header_file.display()))?;
    }

    if args.plantuml {
        let diagram_file = sibling(".puml");
        fs::write(
            &diagram_file,
            report::plantuml(&parsed.grammar, &automaton).to_string(),
        )
        .with_context(|| anyhow::anyhow!("failed to write {}", diagram_file.display()))?;
    }

    if args.markdown {
        let markdown_file = sibling(".md");
        fs::write(
            &markdown_file,
            report::markdown(&parsed.grammar, &automaton, &table).to_string(),
        )
        .with_context(|| anyhow::anyhow!("failed to write {}", markdown_file.display()))?;
    }

    Ok(())
}
