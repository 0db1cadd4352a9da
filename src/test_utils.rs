use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::breaks::BreakIndex;
use crate::grammars::{CompiledGrammar, RawGrammar, StyleId};
use crate::options::HighlightConfig;
use crate::tokenizer::{ScanState, StyleSink, Tokenizer, highlight_from_scratch};

pub(crate) const C_GRAMMAR: &str = include_str!("fixtures/grammars/c.json");
pub(crate) const COMMENT_GRAMMAR: &str = include_str!("fixtures/grammars/comment.json");
pub(crate) const HEREDOC_GRAMMAR: &str = include_str!("fixtures/grammars/heredoc.json");
pub(crate) const NESTED_GRAMMAR: &str = include_str!("fixtures/grammars/nested.json");

pub(crate) fn compile(json: &str) -> CompiledGrammar {
    RawGrammar::load_from_str(json).unwrap().compile().unwrap()
}

/// One char per byte: the first letter of the style name, uppercased.
pub(crate) fn render_styles(grammar: &CompiledGrammar, styles: &[StyleId]) -> String {
    styles
        .iter()
        .map(|s| {
            grammar
                .style_name(*s)
                .chars()
                .next()
                .map_or('?', |c| c.to_ascii_uppercase())
        })
        .collect()
}

/// `lines` lines of C-ish code mixing every construct of the C fixture.
pub(crate) fn c_source(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        let _ = match i % 5 {
            0 => writeln!(out, "int v{i} = {i}; /* note {i} */"),
            1 => writeln!(out, "if (v{i}) {{ return {i}; }}"),
            2 => writeln!(out, "// line {i}"),
            3 => writeln!(out, "x = \"s{i}\\n\";"),
            _ => writeln!(out, "while (1) {{\n  v{i}++;\n}}"),
        };
    }
    out
}

pub(crate) fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// Every checkpoint must be a state the text can be re-highlighted from with
/// the same result as highlighting it all at once.
pub(crate) fn assert_breaks_consistent(
    grammar: &CompiledGrammar,
    config: &HighlightConfig,
    text: &str,
    breaks: &BreakIndex,
) {
    let expected = highlight_from_scratch(grammar, text, config.process_amount_unit());
    let tokenizer = Tokenizer::new(grammar, config.process_amount_unit());

    for (_, brk) in breaks.iter() {
        assert!(brk.pos <= text.len(), "break past the end: {brk:?}");
        let mut sink = StyleSink::new(brk.pos);
        let mut state = ScanState::new(brk.pos, brk.stack.clone());
        tokenizer.run(text, &mut state, text.len(), &mut sink);
        assert_eq!(
            sink.styles[..],
            expected[brk.pos..],
            "resuming from {brk:?} in {text:?}"
        );
    }
}

/// Small deterministic generator for randomized edit sequences.
pub(crate) struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n.max(1) as u64) as usize
    }
}
