//! Incremental, interruptible syntax highlighting for buffers that are edited live.
//!
//! A [`HighlightBuffer`] keeps checkpoints of the scanner state every few hundred
//! bytes. After an edit only the text between the last unaffected checkpoint and
//! the first old checkpoint reached in the same state is scanned again, in time
//! bounded slices driven by the host's idle loop. Renderers query per-byte styles
//! at any time, from a small cache.

mod breaks;
mod buffer;
mod cache;
mod error;
mod grammars;
mod highlighter;
mod options;
mod registry;
mod text;
mod tokenizer;

#[cfg(test)]
mod test_utils;

pub use breaks::{Break, BreakId, BreakIndex, BreakKind, Iter as BreakIter, SetBreak};
pub use buffer::{HighlightBuffer, ListenerId};
pub use cache::{StyleQuery, StyleQueryCache};
pub use error::Error;
pub use grammars::{
    Capture, CompiledGrammar, DEFAULT_MAX_EXTEND, DEFAULT_STYLE, DEFAULT_STYLE_NAME, Pattern,
    PatternId, ROOT_PATTERN_ID, RawGrammar, RawPattern, Regex, RegexId, RegexMatch, StyleId,
};
pub use highlighter::IncrementalHighlighter;
pub use options::{DEFAULT_APPROXIMATE_REPARSE_RANGE, DEFAULT_BREAKPOINT_SPACING, HighlightConfig};
pub use registry::{PLAIN_GRAMMAR_NAME, Registry};
pub use text::{TextBuffer, TextChange, TextSource};
pub use tokenizer::{
    Boundary, CaptureSpan, PatternStack, STACK_SIZE, ScanEnd, ScanState, StackFrame, TokenSink,
    Tokenizer, highlight_from_scratch,
};
