use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use lampo::{HighlightBuffer, HighlightConfig, Registry, StyleQuery};

/// Highlight a file incrementally and print the style runs.
#[derive(Debug, Parser)]
#[command(name = "lampo", version)]
struct Cli {
    /// Grammar JSON files to load
    #[arg(short, long, required_unless_present = "registry")]
    grammar: Vec<PathBuf>,

    /// A registry dump made with `--dump`, loaded instead of grammar files
    #[arg(long, conflicts_with = "grammar")]
    registry: Option<PathBuf>,

    /// Grammar name, alias or file type. Defaults to the file extension.
    #[arg(short, long)]
    lang: Option<String>,

    /// Bytes between checkpoints
    #[arg(long, default_value_t = lampo::DEFAULT_BREAKPOINT_SPACING)]
    spacing: usize,

    /// Time budget of a single processing slice, in milliseconds
    #[arg(long, default_value_t = 5)]
    budget_ms: u64,

    /// Write the loaded grammars to this file and exit
    #[arg(long)]
    dump: Option<PathBuf>,

    file: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut registry = match &cli.registry {
        Some(path) => Registry::load_from_file(path)?,
        None => {
            let mut registry = Registry::new();
            for path in &cli.grammar {
                registry.add_grammar_from_path(path)?;
            }
            registry
        }
    };
    if !registry.contains_grammar(lampo::PLAIN_GRAMMAR_NAME) {
        registry.add_plain_grammar(&["txt"])?;
    }

    if let Some(out) = &cli.dump {
        registry.dump_to_file(out)?;
        println!("Registry written to {}", out.display());
        return Ok(());
    }

    let Some(file) = &cli.file else {
        return Err("no input file given".into());
    };
    let lang = cli.lang.clone().or_else(|| {
        file.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_owned)
    });
    let grammar = match &lang {
        Some(lang) => registry.get_or_plain(lang),
        None => registry.get_or_plain(lampo::PLAIN_GRAMMAR_NAME),
    };

    let text = fs::read_to_string(file)?;
    let config = HighlightConfig::new().breakpoint_spacing(cli.spacing);
    let mut buffer = HighlightBuffer::new(text, grammar, config);

    let budget = Duration::from_millis(cli.budget_ms);
    let start = Instant::now();
    let mut slices = 0;
    while buffer.needs_processing() {
        buffer.process(Instant::now() + budget);
        slices += 1;
    }
    let elapsed = start.elapsed();

    let styles = match buffer.get_styles(0, buffer.len()) {
        StyleQuery::Exact(styles) => styles,
        _ => return Err("highlighting did not settle".into()),
    };

    let grammar = buffer.grammar();
    let mut run_start = 0;
    for i in 1..=styles.len() {
        if i == styles.len() || styles[i] != styles[run_start] {
            println!(
                "{}..{} {}",
                run_start,
                i,
                grammar.style_name(styles[run_start])
            );
            run_start = i;
        }
    }

    eprintln!(
        "{} bytes with {} in {slices} slices ({elapsed:?}), {} checkpoints",
        buffer.len(),
        grammar.name,
        buffer.highlighter().breaks().len()
    );
    Ok(())
}
