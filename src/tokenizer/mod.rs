use std::ops::{ControlFlow, Range};

use crate::breaks::BreakKind;
use crate::grammars::{CompiledGrammar, PatternId, RegexMatch, StyleId};
use crate::text::{TextSource, ceil_char_boundary};

mod stack;
mod window;

pub use stack::{PatternStack, STACK_SIZE, StackFrame};
use window::SearchWindow;

/// A capture group style override inside a token, absolute positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpan {
    pub span: Range<usize>,
    pub style: StyleId,
}

/// Reported after every positive-length token: the scan may stop here and later
/// resume from `state` and get the exact same tokens.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub kind: BreakKind,
    /// Start of the token that just ended at `state.pos`
    pub start: usize,
    /// The token was text no pattern matched. Scanning could have resumed at any
    /// position inside it with the same stack.
    pub plain: bool,
}

/// Where the scanner is and what it is nested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanState {
    pub pos: usize,
    pub stack: PatternStack,
    /// Position of the last zero-length match, so it is applied only once
    zero_len_at: Option<usize>,
}

impl ScanState {
    pub fn new(pos: usize, stack: PatternStack) -> Self {
        Self {
            pos,
            stack,
            zero_len_at: None,
        }
    }

    /// Moves the state along with text inserted or deleted before it.
    pub(crate) fn shift(&mut self, delta: isize) {
        self.pos = self.pos.saturating_add_signed(delta);
        self.zero_len_at = self.zero_len_at.map(|pos| pos.saturating_add_signed(delta));
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    /// The sink asked to stop or the requested limit was reached
    Stopped,
    EndOfText,
}

/// Receives what the scanner produces. The highlighter only cares about
/// boundaries, the style cache mostly about tokens.
pub trait TokenSink {
    fn token(&mut self, span: Range<usize>, style: StyleId, captures: &[CaptureSpan]);

    fn boundary(&mut self, boundary: &Boundary, state: &ScanState) -> ControlFlow<()>;
}

#[derive(Debug)]
enum Found {
    End(RegexMatch),
    Child(PatternId, RegexMatch),
}

impl Found {
    fn range(&self) -> (usize, usize) {
        match self {
            Found::End(m) | Found::Child(_, m) => (m.start, m.end),
        }
    }
}

/// Runs the pattern stack machine over a text.
///
/// Both the background highlighter and on-demand style queries go through
/// [`Tokenizer::run`], only the sink differs.
#[derive(Debug)]
pub struct Tokenizer<'g> {
    grammar: &'g CompiledGrammar,
    /// How many bytes a single search window covers
    process_amount_unit: usize,
}

impl<'g> Tokenizer<'g> {
    pub fn new(grammar: &'g CompiledGrammar, process_amount_unit: usize) -> Self {
        Self {
            grammar,
            process_amount_unit: process_amount_unit.max(1),
        }
    }

    /// Scans from `state` until the sink breaks, `state.pos` reaches `limit` or the
    /// text ends. `state` is left exactly at the last reported boundary, ready to
    /// be resumed.
    pub fn run<T, S>(&self, text: &T, state: &mut ScanState, limit: usize, sink: &mut S) -> ScanEnd
    where
        T: TextSource + ?Sized,
        S: TokenSink,
    {
        let len = text.len();
        let limit = limit.min(len);

        while state.pos < limit {
            let search_end = ceil_char_boundary(text, state.pos + self.process_amount_unit);
            let window = SearchWindow::new(text, state.pos, search_end, self.grammar.max_extend);

            while state.pos < search_end {
                if self.step(&window, state, sink).is_break() {
                    return ScanEnd::Stopped;
                }
                if state.pos >= limit {
                    break;
                }
            }
        }

        if state.pos >= len {
            ScanEnd::EndOfText
        } else {
            ScanEnd::Stopped
        }
    }

    /// Finds the next match in the window, emits the plain text before it and
    /// applies it.
    fn step<S: TokenSink>(
        &self,
        window: &SearchWindow,
        state: &mut ScanState,
        sink: &mut S,
    ) -> ControlFlow<()> {
        let Some(found) = self.find_next(window, state) else {
            let start = state.pos;
            let style = state.stack.style(self.grammar);
            sink.token(start..window.search_end, style, &[]);
            state.pos = window.search_end;
            return sink.boundary(
                &Boundary {
                    kind: BreakKind::Inter,
                    start,
                    plain: true,
                },
                state,
            );
        };

        let (match_start, match_end) = found.range();
        if match_start > state.pos {
            let start = state.pos;
            let style = state.stack.style(self.grammar);
            sink.token(start..match_start, style, &[]);
            state.pos = match_start;
            sink.boundary(
                &Boundary {
                    kind: BreakKind::Inter,
                    start,
                    plain: true,
                },
                state,
            )?;
        }

        if match_start == match_end {
            if state.zero_len_at == Some(match_start) {
                return self.force_advance(window, state, sink);
            }
            state.zero_len_at = Some(match_start);
        }

        let kind = match found {
            Found::End(m) => {
                let style = state.stack.style(self.grammar);
                let top = self.grammar.pattern(state.stack.top().pattern);
                self.emit(&m, style, &top.end_captures, sink);
                state.stack.pop();
                BreakKind::End
            }
            Found::Child(child_id, m) => {
                let child = self.grammar.pattern(child_id);
                if child.is_region() {
                    let pushed = child
                        .push_capture
                        .and_then(|group| window.group(&m, group));
                    if state.stack.push(child_id, pushed) {
                        let style = state.stack.style(self.grammar);
                        self.emit(&m, style, &child.begin_captures, sink);
                        BreakKind::Begin
                    } else {
                        #[cfg(feature = "debug")]
                        log::debug!(
                            "[step] stack full at {}, pattern {} degraded to a single token",
                            match_start,
                            *child_id
                        );
                        let style = child
                            .style
                            .unwrap_or_else(|| state.stack.style(self.grammar));
                        self.emit(&m, style, &child.begin_captures, sink);
                        BreakKind::Inter
                    }
                } else {
                    let style = child
                        .style
                        .unwrap_or_else(|| state.stack.style(self.grammar));
                    self.emit(&m, style, &child.begin_captures, sink);
                    BreakKind::Inter
                }
            }
        };

        state.pos = match_end;
        if match_end > match_start {
            sink.boundary(
                &Boundary {
                    kind,
                    start: match_start,
                    plain: false,
                },
                state,
            )
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Leftmost of the active region's end match and the children's begin
    /// matches, in absolute positions.
    fn find_next(&self, window: &SearchWindow, state: &ScanState) -> Option<Found> {
        let frame = state.stack.top();
        let top = self.grammar.pattern(frame.pattern);
        let subject: &str = &window.subject;
        let from = window.local(state.pos);
        let to = window.local(window.search_end);

        let end_match = top.end.and_then(|end| {
            let pushed = frame.pushed.as_deref();
            self.grammar
                .regex(end)
                .find_at(subject, from, to, window.options, |m| {
                    match (top.end_capture, pushed) {
                        (Some(group), Some(pushed)) => m.group(subject, group) == Some(pushed),
                        _ => true,
                    }
                })
        });

        // A child can only win if it starts no later than the end match
        let child_to = end_match.as_ref().map_or(to, |m| (m.start + 1).min(to));
        let child_match = self
            .grammar
            .child_set(top.id)
            .find_at(subject, from, child_to, window.options);

        let found = match (end_match, child_match) {
            (None, None) => return None,
            (Some(end), None) => Found::End(end),
            (None, Some((id, child))) => Found::Child(id, child),
            (Some(end), Some((id, child))) => {
                if child.start < end.start || (child.start == end.start && top.apply_end_pattern_last)
                {
                    Found::Child(id, child)
                } else {
                    Found::End(end)
                }
            }
        };

        Some(match found {
            Found::End(m) => Found::End(to_absolute(window, m)),
            Found::Child(id, m) => Found::Child(id, to_absolute(window, m)),
        })
    }

    /// Two zero-length matches in a row at the same spot would loop forever:
    /// the next char becomes a token of its own instead.
    fn force_advance<S: TokenSink>(
        &self,
        window: &SearchWindow,
        state: &mut ScanState,
        sink: &mut S,
    ) -> ControlFlow<()> {
        let start = state.pos;
        let local = window.local(start);
        let char_len = window.subject[local..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);

        #[cfg(feature = "debug")]
        log::trace!("[force_advance] repeated empty match at {start}");

        let style = state.stack.style(self.grammar);
        sink.token(start..start + char_len, style, &[]);
        state.pos = start + char_len;
        state.zero_len_at = None;
        sink.boundary(
            &Boundary {
                kind: BreakKind::Inter,
                start,
                plain: false,
            },
            state,
        )
    }

    fn emit<S: TokenSink>(
        &self,
        m: &RegexMatch,
        style: StyleId,
        capture_styles: &[Option<StyleId>],
        sink: &mut S,
    ) {
        if m.end == m.start {
            return;
        }

        let captures: Vec<CaptureSpan> = capture_styles
            .iter()
            .enumerate()
            .filter_map(|(group, style)| {
                let style = (*style)?;
                let (start, end) = (*m.capture_pos.get(group)?)?;
                let (start, end) = (start.max(m.start), end.min(m.end));
                (start < end).then_some(CaptureSpan {
                    span: start..end,
                    style,
                })
            })
            .collect();

        sink.token(m.start..m.end, style, &captures);
    }
}

fn to_absolute(window: &SearchWindow, m: RegexMatch) -> RegexMatch {
    RegexMatch {
        start: window.absolute(m.start),
        end: window.absolute(m.end),
        capture_pos: m
            .capture_pos
            .into_iter()
            .map(|pos| pos.map(|(s, e)| (window.absolute(s), window.absolute(e))))
            .collect(),
    }
}

/// Collects one style per byte, starting at `start`.
#[derive(Debug, Default)]
pub(crate) struct StyleSink {
    pub start: usize,
    pub styles: Vec<StyleId>,
}

impl StyleSink {
    pub fn new(start: usize) -> Self {
        Self {
            start,
            styles: Vec::new(),
        }
    }

    fn fill(&mut self, span: Range<usize>, style: StyleId) {
        if span.end <= self.start {
            return;
        }
        let from = span.start.max(self.start) - self.start;
        let to = span.end - self.start;
        if self.styles.len() < to {
            self.styles.resize(to, style);
        }
        self.styles[from..to].fill(style);
    }
}

impl TokenSink for StyleSink {
    fn token(&mut self, span: Range<usize>, style: StyleId, captures: &[CaptureSpan]) {
        self.fill(span, style);
        for capture in captures {
            self.fill(capture.span.clone(), capture.style);
        }
    }

    fn boundary(&mut self, _boundary: &Boundary, _state: &ScanState) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Highlights the whole text in one go, no checkpoints involved.
pub fn highlight_from_scratch<T: TextSource + ?Sized>(
    grammar: &CompiledGrammar,
    text: &T,
    process_amount_unit: usize,
) -> Vec<StyleId> {
    let mut sink = StyleSink::new(0);
    let mut state = ScanState::new(0, PatternStack::new());
    Tokenizer::new(grammar, process_amount_unit).run(text, &mut state, text.len(), &mut sink);
    sink.styles
}
