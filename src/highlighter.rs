//! Background highlighting: keeps the checkpoint index in sync with the text, a
//! bounded slice of work at a time.

use std::ops::{ControlFlow, Range};
use std::sync::Arc;
use std::time::Instant;

use crate::breaks::{BreakId, BreakIndex, BreakKind, SetBreak};
use crate::grammars::{CompiledGrammar, StyleId};
use crate::options::HighlightConfig;
use crate::text::{TextChange, TextSource, ceil_char_boundary};
use crate::tokenizer::{Boundary, CaptureSpan, PatternStack, ScanEnd, ScanState, TokenSink, Tokenizer};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Interrupt {
    /// The new scan met an old break in the same state, the rest is unchanged
    FixedPoint,
    Deadline,
}

/// Stores checkpoints while the tokenizer advances the frontier.
struct BreakSink<'a, T: ?Sized> {
    text: &'a T,
    breaks: &'a mut BreakIndex,
    frontier: BreakId,
    restart_end: Option<usize>,
    spacing: usize,
    deadline: Instant,
    interrupt: Option<Interrupt>,
}

impl<T: TextSource + ?Sized> BreakSink<'_, T> {
    /// Whether an old break is waiting at or before `pos`.
    fn old_break_pending(&self, pos: usize) -> bool {
        self.breaks
            .next(self.frontier)
            .is_some_and(|next| self.breaks.pos(next) <= pos)
    }

    fn checkpoint(&mut self, pos: usize, kind: BreakKind, stack: &PatternStack) -> ControlFlow<()> {
        let frontier_pos = self.breaks.pos(self.frontier);
        if pos - frontier_pos < self.spacing && !self.old_break_pending(pos) {
            return ControlFlow::Continue(());
        }

        let allow_fixed_point = self.restart_end.is_none_or(|end| pos >= end);
        match self
            .breaks
            .set_break(self.frontier, pos, kind, stack, allow_fixed_point)
        {
            SetBreak::Inserted(id) | SetBreak::Reused(id) => self.frontier = id,
            SetBreak::FixedPoint(_) => {
                #[cfg(feature = "debug")]
                log::debug!(
                    "[checkpoint] fixed point at {pos}, old breaks kept up to {}",
                    self.breaks.pos(self.breaks.last())
                );
                self.frontier = self.breaks.last();
                self.restart_end = None;
                self.interrupt = Some(Interrupt::FixedPoint);
                return ControlFlow::Break(());
            }
        }

        if self.restart_end.is_some_and(|end| pos >= end) {
            self.restart_end = None;
        }
        if Instant::now() >= self.deadline {
            self.interrupt = Some(Interrupt::Deadline);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Any position inside text no pattern matched can be resumed from, so long
    /// plain runs still get evenly spaced checkpoints, and one wherever an old
    /// break sits so a fixed point can be found inside the run.
    fn checkpoint_plain_run(&mut self, run: Range<usize>, stack: &PatternStack) -> ControlFlow<()> {
        loop {
            let frontier_pos = self.breaks.pos(self.frontier);
            let grid = ceil_char_boundary(self.text, frontier_pos + self.spacing);
            let old = self
                .breaks
                .next(self.frontier)
                .map(|next| self.breaks.pos(next));

            let candidate = [Some(grid), old]
                .into_iter()
                .flatten()
                .filter(|pos| run.start < *pos && *pos < run.end)
                .min();
            let Some(pos) = candidate else {
                return ControlFlow::Continue(());
            };
            self.checkpoint(pos, BreakKind::Inter, stack)?;
        }
    }
}

impl<T: TextSource + ?Sized> TokenSink for BreakSink<'_, T> {
    fn token(&mut self, _span: Range<usize>, _style: StyleId, _captures: &[CaptureSpan]) {}

    fn boundary(&mut self, boundary: &Boundary, state: &ScanState) -> ControlFlow<()> {
        if boundary.plain {
            self.checkpoint_plain_run(boundary.start..state.pos, &state.stack)?;
        }
        self.checkpoint(state.pos, boundary.kind, &state.stack)
    }
}

/// Owns the checkpoints of one text and advances them towards the end of the
/// text, a time budget at a time.
///
/// Everything up to the frontier is in sync with the text. Edits rewind the
/// frontier to the last checkpoint they can't have affected, and keep the
/// checkpoints after the edit around: as soon as re-highlighting reaches one of
/// them in the same state, the rest of the text is known to be unchanged.
#[derive(Debug)]
pub struct IncrementalHighlighter {
    grammar: Arc<CompiledGrammar>,
    config: HighlightConfig,
    breaks: BreakIndex,
    frontier: BreakId,
    /// Set by edits made beyond the frontier since the last complete pass: the
    /// first position at which an old break may be taken as a fixed point.
    restart_end: Option<usize>,
    /// Where the last edit restarted from, a seek hint for the next one
    last_restart: Option<BreakId>,
    needs_processing: bool,
    dirty: Option<Range<usize>>,
}

impl IncrementalHighlighter {
    pub fn new(grammar: Arc<CompiledGrammar>, config: HighlightConfig, text_len: usize) -> Self {
        let breaks = BreakIndex::new();
        let frontier = breaks.first();
        let mut highlighter = Self {
            grammar,
            config,
            breaks,
            frontier,
            restart_end: None,
            last_restart: None,
            needs_processing: false,
            dirty: None,
        };
        highlighter.reset(text_len);
        highlighter
    }

    /// Swaps the grammar. Every checkpoint is dropped and the whole text is dirty.
    pub fn set_language_mode(&mut self, grammar: Arc<CompiledGrammar>, text_len: usize) {
        self.grammar = grammar;
        self.reset(text_len);
    }

    fn reset(&mut self, text_len: usize) {
        self.breaks.clear();
        self.frontier = self.breaks.first();
        self.restart_end = None;
        self.last_restart = None;
        self.needs_processing = self.grammar.has_patterns();
        self.mark_dirty(0..text_len);
    }

    pub fn grammar(&self) -> &Arc<CompiledGrammar> {
        &self.grammar
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    pub fn breaks(&self) -> &BreakIndex {
        &self.breaks
    }

    pub fn needs_processing(&self) -> bool {
        self.needs_processing
    }

    pub fn frontier_pos(&self) -> usize {
        self.breaks.pos(self.frontier)
    }

    /// The last checkpoint at or before `pos` that is known to be in sync with the
    /// text: checkpoints past the frontier may be stale.
    pub fn checkpoint_before(&self, hint: Option<BreakId>, pos: usize) -> BreakId {
        self.breaks.seek_before(hint, pos.min(self.frontier_pos()))
    }

    /// Union of the ranges whose styles may have changed since the last call.
    pub fn take_dirty(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }

    fn mark_dirty(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }

    /// Must be called for every change of the text, before it is processed or
    /// queried again.
    pub fn on_text_edit(&mut self, change: &TextChange) {
        let reach = self.grammar.max_extend + 1;

        // Breaks whose producing window could see the edit are stale
        let mut restart = self.breaks.seek_before(self.last_restart, change.begin);
        while !self.breaks.is_first(restart) && self.breaks.pos(restart) + reach > change.begin {
            self.breaks.move_prev(&mut restart);
        }
        let restart_pos = self.breaks.pos(restart);

        self.restart_end = self.restart_end.map(|end| change.translate(end));
        let first_allowed = if self.frontier_pos() >= restart_pos {
            let interrupted_at = self.frontier_pos();
            self.frontier = restart;
            // The breaks past an interrupted frontier were never checked against
            // earlier edits, they can't end the new pass before it gets there
            self.needs_processing
                .then(|| change.translate(interrupted_at) + 1)
        } else {
            // The old breaks up to the restart point are still fine but a fixed
            // point there would skip the edit
            Some(restart_pos + 1)
        };
        if let Some(first_allowed) = first_allowed {
            let marker = self
                .restart_end
                .map_or(first_allowed, |end| end.max(first_allowed));
            self.restart_end = Some(marker);
        }

        // Same for breaks whose look-behind reaches back into the edit
        let mut keep = self.breaks.next(restart);
        while let Some(id) = keep {
            if self.breaks.pos(id) > change.old_end + reach {
                break;
            }
            keep = self.breaks.next(id);
        }
        if let Some(stale) = self.breaks.next(restart)
            && Some(stale) != keep
        {
            self.breaks.delete_range(stale, keep);
        }
        if let Some(id) = keep {
            self.breaks.shift_from(id, change.delta);
        }

        if let Some(dirty) = self.dirty.take() {
            self.dirty = Some(change.translate(dirty.start)..change.translate(dirty.end));
        }

        #[cfg(feature = "debug")]
        log::debug!(
            "[on_text_edit] {change:?}: restart at {restart_pos}, frontier at {}, restart_end {:?}",
            self.frontier_pos(),
            self.restart_end
        );

        self.last_restart = Some(restart);
        self.needs_processing = self.grammar.has_patterns();
        self.mark_dirty(restart_pos..change.new_end());
    }

    /// Advances the frontier until the text is done or `deadline` has passed,
    /// returning how many bytes were scanned.
    ///
    /// The deadline is only looked at after storing a checkpoint, so every call
    /// makes some progress.
    pub fn process<T: TextSource + ?Sized>(&mut self, text: &T, deadline: Instant) -> usize {
        if !self.needs_processing {
            return 0;
        }

        let grammar = Arc::clone(&self.grammar);
        let tokenizer = Tokenizer::new(&grammar, self.config.process_amount_unit());
        let len = text.len();

        let brk = self.breaks.get(self.frontier);
        let mut state = ScanState::new(brk.pos, brk.stack.clone());
        let start = state.pos;

        let mut sink = BreakSink {
            text,
            breaks: &mut self.breaks,
            frontier: self.frontier,
            restart_end: self.restart_end,
            spacing: self.config.spacing(),
            deadline,
            interrupt: None,
        };
        let end = tokenizer.run(text, &mut state, len, &mut sink);
        let interrupt = sink.interrupt;
        self.frontier = sink.frontier;
        self.restart_end = sink.restart_end;

        let scanned = state.pos.saturating_sub(start);
        self.mark_dirty(start..state.pos);

        match interrupt {
            // The breaks after a fixed point, and the run from the last one to the
            // end of the text, were all produced by a pass that went to the end
            Some(Interrupt::FixedPoint) => self.finish(),
            Some(Interrupt::Deadline) => {}
            None => {
                if end == ScanEnd::EndOfText {
                    self.breaks.truncate_after(self.frontier);
                    self.finish();
                }
            }
        }
        scanned
    }

    fn finish(&mut self) {
        self.restart_end = None;
        self.needs_processing = false;
        #[cfg(feature = "debug")]
        log::debug!("[process] done, {} breaks", self.breaks.len());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_utils::{
        C_GRAMMAR, COMMENT_GRAMMAR, NESTED_GRAMMAR, XorShift, assert_breaks_consistent, compile,
        far_future,
    };
    use crate::text::TextBuffer;
    use crate::tokenizer::highlight_from_scratch;

    fn processed(grammar: &Arc<CompiledGrammar>, config: HighlightConfig, text: &str) -> IncrementalHighlighter {
        let mut hl = IncrementalHighlighter::new(Arc::clone(grammar), config, text.len());
        hl.process(text, far_future());
        assert!(!hl.needs_processing());
        hl
    }

    #[test]
    fn comment_scenario_breaks() {
        let grammar = Arc::new(compile(COMMENT_GRAMMAR));
        let mut hl = processed(&grammar, HighlightConfig::new().breakpoint_spacing(1), "a/*b*/c");
        let breaks: Vec<_> = hl
            .breaks()
            .iter()
            .map(|(_, b)| (b.pos, b.kind, b.stack.depth()))
            .collect();
        assert_eq!(
            breaks,
            vec![
                (0, BreakKind::Inter, 1),
                (1, BreakKind::Inter, 1),
                (3, BreakKind::Begin, 2),
                (4, BreakKind::Inter, 2),
                (6, BreakKind::End, 1),
                (7, BreakKind::Inter, 1),
            ]
        );
        assert_eq!(hl.take_dirty(), Some(0..7));
        assert_eq!(hl.take_dirty(), None);
    }

    #[test]
    fn insert_inside_comment_matches_scratch() {
        let grammar = Arc::new(compile(COMMENT_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(1);
        let mut text = TextBuffer::new("a/*b*/c");
        let mut hl = processed(&grammar, config, text.as_str());

        let change = text.insert(2, "X");
        hl.on_text_edit(&change);
        assert!(hl.needs_processing());
        assert_eq!(hl.frontier_pos(), 0);
        hl.process(&text, far_future());

        assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());
    }

    #[test]
    fn chunked_processing_is_consistent() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let text = crate::test_utils::c_source(40);

        let mut hl = IncrementalHighlighter::new(Arc::clone(&grammar), config, text.len());
        let mut calls = 0;
        while hl.needs_processing() {
            // An expired deadline stops after the first checkpoint
            hl.process(text.as_str(), Instant::now());
            calls += 1;
            assert!(calls < 10_000);
        }
        assert!(calls > 10);
        hl.breaks().assert_invariants();
        assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());


        // Without interruptions the same checkpoints come out every time
        let single = processed(&grammar, config, &text);
        let again = processed(&grammar, config, &text);
        let positions = |hl: &IncrementalHighlighter| -> Vec<usize> {
            hl.breaks().iter().map(|(_, b)| b.pos).collect()
        };
        assert_eq!(positions(&single), positions(&again));
    }

    #[test]
    fn random_edits_match_scratch() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(8);
        let mut text = TextBuffer::new(crate::test_utils::c_source(20));
        let mut hl = processed(&grammar, config, text.as_str());
        let mut rng = XorShift::new(7);
        let snippets = ["/*", "*/", "\"", "x", "if ", "\n", "// c\n", "42"];

        for round in 0..200 {
            let len = text.as_str().len();
            let begin = rng.below(len + 1);
            let end = (begin + rng.below(6)).min(len);
            let inserted = snippets[rng.below(snippets.len())];
            let change = text.replace(begin..end, inserted);
            hl.on_text_edit(&change);

            // Sometimes edit again before the previous edit is processed
            if round % 3 != 0 {
                hl.process(&text, Instant::now());
                continue;
            }
            hl.process(&text, far_future());
            assert!(!hl.needs_processing());
            hl.breaks().assert_invariants();
            assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());
        }
    }

    #[test]
    fn edit_far_from_end_stays_local() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(50);
        let mut text = TextBuffer::new(crate::test_utils::c_source(60_000));
        assert!(text.as_str().len() > 1_000_000);
        let mut hl = processed(&grammar, config, text.as_str());
        let breaks_before = hl.breaks().len();
        hl.take_dirty();

        let change = text.insert(120, "y");
        hl.on_text_edit(&change);
        let scanned = hl.process(&text, far_future());
        assert!(!hl.needs_processing());
        assert!(scanned < 20_000, "scanned {scanned} bytes");

        let dirty = hl.take_dirty().unwrap();
        assert!(dirty.start <= 120);
        assert!(dirty.end < 1_000, "dirty {dirty:?}");
        assert!(hl.breaks().len().abs_diff(breaks_before) < 10);
        hl.breaks().assert_invariants();
    }

    #[test]
    fn fixed_point_in_a_later_slice_keeps_the_tail() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(50);
        let mut text = TextBuffer::new(crate::test_utils::c_source(5_000));
        let mut hl = processed(&grammar, config, text.as_str());
        let last = hl.breaks().pos(hl.breaks().last());
        hl.take_dirty();

        // Opening a comment re-highlights up to the next `*/`, one slice at a time
        let change = text.insert(200, "/*");
        hl.on_text_edit(&change);
        let mut calls = 0;
        while hl.needs_processing() {
            hl.process(&text, Instant::now());
            calls += 1;
        }
        assert!(calls > 1);

        let dirty = hl.take_dirty().unwrap();
        assert!(dirty.start <= 200);
        assert!(dirty.end < 2_000, "dirty {dirty:?}");
        assert_eq!(hl.breaks().pos(hl.breaks().last()), last + 2);
        assert_eq!(hl.frontier_pos(), last + 2);

        // Nothing left to do, and nothing reported
        assert_eq!(hl.process(&text, far_future()), 0);
        assert_eq!(hl.take_dirty(), None);
    }

    #[test]
    fn random_edits_across_search_windows() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(64);
        let mut text = TextBuffer::new(crate::test_utils::c_source(400));
        assert!(text.as_str().len() > 2 * config.process_amount_unit());
        let mut hl = processed(&grammar, config, text.as_str());
        let mut rng = XorShift::new(31);
        let snippets = ["/*", "*/", "\"", "return ", "\n", "// x\n", "7", ""];

        for round in 0..60 {
            let len = text.as_str().len();
            let begin = rng.below(len + 1);
            let end = (begin + rng.below(12)).min(len);
            let change = text.replace(begin..end, snippets[rng.below(snippets.len())]);
            hl.on_text_edit(&change);

            // Leave most edits half processed
            for _ in 0..rng.below(4) {
                hl.process(&text, Instant::now());
            }
            if round % 4 != 3 {
                continue;
            }
            hl.process(&text, far_future());
            assert!(!hl.needs_processing());
            hl.breaks().assert_invariants();
            assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());
            assert_eq!(
                highlight_from_scratch(&grammar, text.as_str(), config.process_amount_unit()),
                highlight_from_scratch(&grammar, text.as_str(), text.as_str().len() + 1)
            );
        }
    }

    #[test]
    fn edits_beyond_an_interrupted_frontier() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let mut text = TextBuffer::new(crate::test_utils::c_source(200));
        let mut hl = processed(&grammar, config, text.as_str());

        // Rewind the frontier near the start, advance it a little
        let change = text.insert(10, "/*");
        hl.on_text_edit(&change);
        hl.process(&text, Instant::now());
        let frontier = hl.frontier_pos();
        assert!(hl.needs_processing());

        // then edit twice well beyond it
        let far = text.as_str().len() / 2;
        let change = text.insert(far, "*/");
        hl.on_text_edit(&change);
        assert_eq!(hl.frontier_pos(), frontier);
        let change = text.delete(far + 100..far + 104);
        hl.on_text_edit(&change);

        while hl.needs_processing() {
            hl.process(&text, Instant::now());
        }
        hl.breaks().assert_invariants();
        assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());
    }

    #[test]
    fn deep_nesting_resynchronizes() {
        let grammar = Arc::new(compile(NESTED_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(2);
        let mut text = TextBuffer::new(format!("{}x{}", "(".repeat(40), ")".repeat(40)));
        let mut hl = processed(&grammar, config, text.as_str());

        let change = text.insert(20, "((");
        hl.on_text_edit(&change);
        hl.process(&text, far_future());
        assert_breaks_consistent(&grammar, &config, text.as_str(), hl.breaks());
        assert!(hl.breaks().get(hl.breaks().last()).stack.is_root());
    }

    #[test]
    fn language_mode_resets_everything() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let text = crate::test_utils::c_source(10);
        let mut hl = processed(&grammar, HighlightConfig::new(), &text);
        hl.take_dirty();

        hl.set_language_mode(Arc::new(CompiledGrammar::plain("plain")), text.len());
        assert!(!hl.needs_processing());
        assert_eq!(hl.breaks().len(), 1);
        assert_eq!(hl.take_dirty(), Some(0..text.len()));
        assert_eq!(hl.process(text.as_str(), far_future()), 0);

        hl.set_language_mode(grammar, text.len());
        assert!(hl.needs_processing());
    }

    #[test]
    fn frontier_is_trusted_boundary() {
        let grammar = Arc::new(compile(C_GRAMMAR));
        let config = HighlightConfig::new().breakpoint_spacing(16);
        let mut text = TextBuffer::new(crate::test_utils::c_source(50));
        let mut hl = processed(&grammar, config, text.as_str());

        let change = text.insert(40, " ");
        hl.on_text_edit(&change);
        let checkpoint = hl.checkpoint_before(None, text.as_str().len());
        assert!(hl.breaks().pos(checkpoint) <= hl.frontier_pos());
        assert!(hl.frontier_pos() <= 40);

        let deadline = Instant::now() + Duration::from_secs(5);
        hl.process(&text, deadline);
        assert!(!hl.needs_processing());
        let checkpoint = hl.checkpoint_before(None, text.as_str().len());
        assert!(hl.breaks().is_last(checkpoint));
    }
}
