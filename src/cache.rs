//! Per-byte styles for the renderer, computed on demand around the queried range.

use std::ops::Range;

use crate::breaks::BreakId;
use crate::grammars::{CompiledGrammar, DEFAULT_STYLE, StyleId};
use crate::highlighter::IncrementalHighlighter;
use crate::text::{TextChange, TextSource, floor_char_boundary};
use crate::tokenizer::{PatternStack, ScanState, StyleSink, Tokenizer};

/// The answer to a style query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleQuery<T> {
    /// Scanned from a checkpoint that is in sync with the text
    Exact(T),
    /// Scanned from a guessed state, may be wrong until the highlighter catches up
    Approximate(T),
    /// No checkpoint is close enough and the grammar doesn't allow guessing
    Unavailable,
}

impl<T> StyleQuery<T> {
    pub fn is_exact(&self) -> bool {
        matches!(self, StyleQuery::Exact(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            StyleQuery::Exact(v) | StyleQuery::Approximate(v) => Some(v),
            StyleQuery::Unavailable => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StyleQuery<U> {
        match self {
            StyleQuery::Exact(v) => StyleQuery::Exact(f(v)),
            StyleQuery::Approximate(v) => StyleQuery::Approximate(f(v)),
            StyleQuery::Unavailable => StyleQuery::Unavailable,
        }
    }
}

/// Contiguous styles starting at `start`, and the scanner state right after them.
#[derive(Debug)]
struct StyleRun {
    start: usize,
    styles: Vec<StyleId>,
    state: ScanState,
    exact: bool,
}

impl StyleRun {
    fn end(&self) -> usize {
        self.start + self.styles.len()
    }
}

/// Serves style queries by scanning forward from the closest trustworthy
/// checkpoint and keeping the result around, since the renderer asks for the
/// same neighbourhood over and over.
#[derive(Debug, Default)]
pub struct StyleQueryCache {
    run: Option<StyleRun>,
    /// Checkpoint the last seed came from
    hint: Option<BreakId>,
}

impl StyleQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Styles of the bytes `[pos, pos + n)`, clamped to the text.
    pub fn get_styles<T: TextSource + ?Sized>(
        &mut self,
        text: &T,
        highlighter: &IncrementalHighlighter,
        pos: usize,
        n: usize,
    ) -> StyleQuery<Vec<StyleId>> {
        let len = text.len();
        let pos = pos.min(len);
        let end = pos.saturating_add(n).min(len);
        let grammar = highlighter.grammar();

        if !grammar.has_patterns() {
            return StyleQuery::Exact(vec![DEFAULT_STYLE; end - pos]);
        }
        if pos == end {
            return StyleQuery::Exact(Vec::new());
        }

        let max_distance = highlighter.config().max_distance(grammar);
        let reusable = self.run.as_ref().is_some_and(|run| {
            run.start <= pos && pos <= run.end() + max_distance && (run.exact || !self.can_seed_exact(highlighter, pos))
        });
        if !reusable && !self.seed(text, highlighter, pos) {
            #[cfg(feature = "debug")]
            log::debug!("[get_styles] no checkpoint near {pos}");
            return StyleQuery::Unavailable;
        }

        let Some(run) = self.run.as_mut() else {
            return StyleQuery::Unavailable;
        };
        if run.end() < end {
            let tokenizer = Tokenizer::new(grammar, highlighter.config().process_amount_unit());
            let mut sink = StyleSink::new(run.end());
            tokenizer.run(text, &mut run.state, end, &mut sink);
            run.styles.extend(sink.styles);
        }
        trim_front(run, pos, max_distance);

        let styles = run.styles[pos - run.start..end - run.start].to_vec();
        if run.exact {
            StyleQuery::Exact(styles)
        } else {
            StyleQuery::Approximate(styles)
        }
    }

    pub fn get_style<T: TextSource + ?Sized>(
        &mut self,
        text: &T,
        highlighter: &IncrementalHighlighter,
        pos: usize,
    ) -> StyleQuery<StyleId> {
        match self.get_styles(text, highlighter, pos, 1) {
            StyleQuery::Exact(styles) => styles
                .first()
                .map_or(StyleQuery::Unavailable, |s| StyleQuery::Exact(*s)),
            StyleQuery::Approximate(styles) => styles
                .first()
                .map_or(StyleQuery::Unavailable, |s| StyleQuery::Approximate(*s)),
            StyleQuery::Unavailable => StyleQuery::Unavailable,
        }
    }

    fn can_seed_exact(&self, highlighter: &IncrementalHighlighter, pos: usize) -> bool {
        let checkpoint = highlighter.checkpoint_before(self.hint, pos);
        let max_distance = highlighter.config().max_distance(highlighter.grammar());
        pos - highlighter.breaks().pos(checkpoint) <= max_distance
    }

    /// Starts a new run before `pos`. Returns false if there is nothing to start from.
    fn seed<T: TextSource + ?Sized>(
        &mut self,
        text: &T,
        highlighter: &IncrementalHighlighter,
        pos: usize,
    ) -> bool {
        let grammar = highlighter.grammar();
        let config = highlighter.config();
        let checkpoint = highlighter.checkpoint_before(self.hint, pos);
        self.hint = Some(checkpoint);
        let brk = highlighter.breaks().get(checkpoint);

        let guess_start = floor_char_boundary(text, pos.saturating_sub(config.reparse_range()));
        let (state, exact) = if pos - brk.pos <= config.max_distance(grammar)
            || (grammar.approximate && brk.pos >= guess_start)
        {
            (ScanState::new(brk.pos, brk.stack.clone()), true)
        } else if grammar.approximate {
            (ScanState::new(guess_start, PatternStack::new()), false)
        } else {
            self.run = None;
            return false;
        };

        self.run = Some(StyleRun {
            start: state.pos,
            styles: Vec::new(),
            state,
            exact,
        });
        true
    }

    /// Must be called for every change of the text.
    pub fn on_text_edit(&mut self, change: &TextChange, grammar: &CompiledGrammar) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let reach = grammar.max_extend + 1;

        if change.begin >= run.end() + reach {
            return;
        }
        if change.old_end + reach <= run.start {
            // Same styles, but the state it was seeded from is no longer vouched for
            run.start = run.start.saturating_add_signed(change.delta);
            run.state.shift(change.delta);
            run.exact = false;
            return;
        }
        self.run = None;
    }

    /// Drops the run if its styles may have changed in `range`.
    pub fn invalidate(&mut self, range: Range<usize>) {
        if self
            .run
            .as_ref()
            .is_some_and(|run| range.start < run.end() && run.start < range.end)
        {
            self.run = None;
        }
    }

    pub fn reset(&mut self) {
        self.run = None;
        self.hint = None;
    }
}

/// Keeps the run from growing without bound as the queries move forward.
fn trim_front(run: &mut StyleRun, pos: usize, max_distance: usize) {
    if run.styles.len() <= 4 * max_distance {
        return;
    }
    let cut = (pos - run.start).saturating_sub(max_distance);
    if cut > 0 {
        run.styles.drain(..cut);
        run.start += cut;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::buffer::HighlightBuffer;
    use crate::options::HighlightConfig;
    use crate::test_utils::{
        C_GRAMMAR, COMMENT_GRAMMAR, XorShift, c_source, compile, far_future, render_styles,
    };
    use crate::text::TextBuffer;
    use crate::tokenizer::highlight_from_scratch;

    fn setup(json: &str, config: HighlightConfig, text: &str) -> (Arc<CompiledGrammar>, IncrementalHighlighter) {
        let grammar = Arc::new(compile(json));
        let hl = IncrementalHighlighter::new(Arc::clone(&grammar), config, text.len());
        (grammar, hl)
    }

    #[test]
    fn exact_after_processing() {
        let text = "a/*b*/c";
        let (grammar, mut hl) = setup(COMMENT_GRAMMAR, HighlightConfig::new(), text);
        hl.process(text, far_future());

        let mut cache = StyleQueryCache::new();
        let styles = cache.get_styles(text, &hl, 0, 100).value().unwrap();
        insta::assert_snapshot!(render_styles(&grammar, &styles), @"DCCCCCD");
        assert_eq!(cache.get_style(text, &hl, 3), StyleQuery::Exact(grammar.style_id("comment").unwrap()));
        assert_eq!(cache.get_styles(text, &hl, 7, 3), StyleQuery::Exact(vec![]));
    }

    #[test]
    fn far_from_checkpoints() {
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let text = c_source(400);
        let (grammar, hl) = setup(C_GRAMMAR, config, &text);
        let mut cache = StyleQueryCache::new();

        // Nothing processed yet: close to the start is fine, far away isn't
        assert!(cache.get_styles(text.as_str(), &hl, 10, 5).is_exact());
        assert_eq!(cache.get_styles(text.as_str(), &hl, 5000, 5), StyleQuery::Unavailable);

        // Unless the grammar accepts approximations
        let mut approximate = compile(C_GRAMMAR);
        approximate.approximate = true;
        let hl = IncrementalHighlighter::new(Arc::new(approximate), config, text.len());
        let query = cache.get_styles(text.as_str(), &hl, 5000, 5);
        assert!(matches!(query, StyleQuery::Approximate(_)));
        assert_eq!(
            query.value().unwrap(),
            highlight_from_scratch(&grammar, text.as_str(), 3000)[5000..5005]
        );
    }

    #[test]
    fn approximate_becomes_exact_once_processed() {
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let text = c_source(400);
        let mut grammar = compile(C_GRAMMAR);
        grammar.approximate = true;
        let mut hl = IncrementalHighlighter::new(Arc::new(grammar), config, text.len());
        let mut cache = StyleQueryCache::new();

        assert!(!cache.get_styles(text.as_str(), &hl, 6000, 10).is_exact());
        hl.process(text.as_str(), far_future());
        assert!(cache.get_styles(text.as_str(), &hl, 6000, 10).is_exact());
    }

    #[test]
    fn matches_scratch_everywhere() {
        let config = HighlightConfig::new().breakpoint_spacing(32);
        let text = c_source(300);
        let (grammar, mut hl) = setup(C_GRAMMAR, config, &text);
        hl.process(text.as_str(), far_future());
        let expected = highlight_from_scratch(&grammar, text.as_str(), 3000);

        let mut cache = StyleQueryCache::new();
        let mut pos = 0;
        while pos < text.len() {
            let styles = cache.get_styles(text.as_str(), &hl, pos, 40);
            let StyleQuery::Exact(styles) = styles else {
                panic!("inexact styles at {pos}");
            };
            assert_eq!(styles[..], expected[pos..(pos + 40).min(text.len())]);
            pos += 37;
        }
        // Jumping back works too
        let styles = cache.get_styles(text.as_str(), &hl, 100, 10).value().unwrap();
        assert_eq!(styles[..], expected[100..110]);
    }

    #[test]
    fn edits_relative_to_the_run() {
        let config = HighlightConfig::new();
        let mut text = TextBuffer::new(c_source(200));
        let (grammar, mut hl) = setup(C_GRAMMAR, config, text.as_str());
        hl.process(&text, far_future());
        let mut cache = StyleQueryCache::new();

        cache.get_styles(&text, &hl, 2000, 50);
        let (start, end) = {
            let run = cache.run.as_ref().unwrap();
            (run.start, run.end())
        };

        // After the run and out of reach: untouched
        let change = text.insert(end + 1000, "x");
        hl.on_text_edit(&change);
        cache.on_text_edit(&change, &grammar);
        assert_eq!(cache.run.as_ref().unwrap().start, start);
        assert!(cache.run.as_ref().unwrap().exact);

        // Before the run: shifted and approximate
        let change = text.insert(0, "xy");
        hl.on_text_edit(&change);
        cache.on_text_edit(&change, &grammar);
        assert_eq!(cache.run.as_ref().unwrap().start, start + 2);
        assert!(!cache.run.as_ref().unwrap().exact);

        // Inside: dropped
        let change = text.delete(2100..2101);
        hl.on_text_edit(&change);
        cache.on_text_edit(&change, &grammar);
        assert!(cache.run.is_none());

        cache.get_styles(&text, &hl, 10, 10);
        cache.invalidate(0..5);
        assert!(cache.run.is_none());
    }

    #[test]
    fn run_is_trimmed() {
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let text = c_source(2000);
        let (grammar, mut hl) = setup(C_GRAMMAR, config, &text);
        hl.process(text.as_str(), Instant::now() + std::time::Duration::from_secs(60));
        let max_distance = config.max_distance(&grammar);

        let mut cache = StyleQueryCache::new();
        let mut pos = 0;
        while pos + 100 < text.len() {
            cache.get_styles(text.as_str(), &hl, pos, 10);
            assert!(cache.run.as_ref().unwrap().styles.len() <= 4 * max_distance + 100);
            pos += 10;
        }
    }

    #[test]
    fn exact_answers_hold_while_edits_are_half_processed() {
        for approximate in [false, true] {
            let mut grammar = compile(C_GRAMMAR);
            grammar.approximate = approximate;
            let grammar = Arc::new(grammar);
            let config = HighlightConfig::new().breakpoint_spacing(32);
            let mut buffer = HighlightBuffer::new(c_source(300), Arc::clone(&grammar), config);
            let mut rng = XorShift::new(if approximate { 5 } else { 11 });
            let snippets = ["/*", "*/", "\"", "int ", "\n", "// y\n", "12", ""];
            let mut exact_answers = 0;

            for round in 0..120 {
                let len = buffer.len();
                let begin = rng.below(len + 1);
                let end = (begin + rng.below(8)).min(len);
                buffer.replace(begin..end, snippets[rng.below(snippets.len())]);

                for _ in 0..rng.below(3) {
                    buffer.process(Instant::now());
                }
                if round % 2 == 0 {
                    buffer.flush_updates();
                }
                if round % 3 == 0 {
                    buffer.process_until_idle();
                }

                let expected = highlight_from_scratch(&grammar, buffer.text(), buffer.len() + 1);
                for pos in [
                    begin.saturating_sub(20),
                    begin,
                    rng.below(buffer.len() + 1),
                    rng.below(buffer.len() + 1),
                ] {
                    let pos = pos.min(buffer.len());
                    let n = 1 + rng.below(60);
                    if let StyleQuery::Exact(styles) = buffer.get_styles(pos, n) {
                        exact_answers += 1;
                        assert_eq!(
                            styles[..],
                            expected[pos..(pos + n).min(buffer.len())],
                            "round {round}, {n} styles at {pos}"
                        );
                    }
                }
            }
            assert!(exact_answers > 150, "only {exact_answers} exact answers");
        }
    }

    #[test]
    fn plain_grammar_is_all_default() {
        let text = "anything";
        let hl = IncrementalHighlighter::new(
            Arc::new(CompiledGrammar::plain("plain")),
            HighlightConfig::new(),
            text.len(),
        );
        let mut cache = StyleQueryCache::new();
        assert_eq!(
            cache.get_styles(text, &hl, 2, 3),
            StyleQuery::Exact(vec![DEFAULT_STYLE; 3])
        );
    }
}
