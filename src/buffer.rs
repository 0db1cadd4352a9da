use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{StyleQuery, StyleQueryCache};
use crate::grammars::{CompiledGrammar, StyleId};
use crate::highlighter::IncrementalHighlighter;
use crate::options::HighlightConfig;
use crate::text::{TextBuffer, TextChange, TextSource};

/// How long a single slice of [`HighlightBuffer::process_until_idle`] may take.
const IDLE_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type UpdateListener = Box<dyn FnMut(Range<usize>)>;

/// A text buffer that keeps itself highlighted.
///
/// Edits go through the buffer so the highlighter and the style cache hear about
/// them. The host calls [`process`](Self::process) from its idle loop and
/// [`flush_updates`](Self::flush_updates) once per loop iteration to let
/// listeners repaint what changed.
pub struct HighlightBuffer {
    text: TextBuffer,
    highlighter: IncrementalHighlighter,
    cache: StyleQueryCache,
    listeners: Vec<(ListenerId, UpdateListener)>,
    next_listener: u64,
}

impl HighlightBuffer {
    pub fn new(text: impl Into<String>, grammar: Arc<CompiledGrammar>, config: HighlightConfig) -> Self {
        let text = TextBuffer::new(text);
        let highlighter = IncrementalHighlighter::new(grammar, config, text.len());
        Self {
            text,
            highlighter,
            cache: StyleQueryCache::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn grammar(&self) -> &Arc<CompiledGrammar> {
        self.highlighter.grammar()
    }

    pub fn highlighter(&self) -> &IncrementalHighlighter {
        &self.highlighter
    }

    /// Replaces `range` with `text`. Both ends of the range must be char boundaries.
    pub fn replace(&mut self, range: Range<usize>, text: &str) -> TextChange {
        let change = self.text.replace(range, text);
        self.highlighter.on_text_edit(&change);
        self.cache.on_text_edit(&change, self.highlighter.grammar());
        change
    }

    pub fn insert(&mut self, pos: usize, text: &str) -> TextChange {
        self.replace(pos..pos, text)
    }

    pub fn delete(&mut self, range: Range<usize>) -> TextChange {
        self.replace(range, "")
    }

    pub fn set_language_mode(&mut self, grammar: Arc<CompiledGrammar>) {
        self.highlighter.set_language_mode(grammar, self.text.len());
        self.cache.reset();
    }

    pub fn needs_processing(&self) -> bool {
        self.highlighter.needs_processing()
    }

    /// Highlights until `deadline`, returns the number of bytes scanned.
    pub fn process(&mut self, deadline: Instant) -> usize {
        self.highlighter.process(&self.text, deadline)
    }

    /// Highlights everything that is left, for tools and tests.
    pub fn process_until_idle(&mut self) -> usize {
        let mut scanned = 0;
        while self.highlighter.needs_processing() {
            scanned += self.process(Instant::now() + IDLE_SLICE);
        }
        scanned
    }

    pub fn get_style(&mut self, pos: usize) -> StyleQuery<StyleId> {
        self.cache.get_style(&self.text, &self.highlighter, pos)
    }

    pub fn get_styles(&mut self, pos: usize, n: usize) -> StyleQuery<Vec<StyleId>> {
        self.cache.get_styles(&self.text, &self.highlighter, pos, n)
    }

    /// `listener` is called with every range whose styles may have changed, from
    /// [`flush_updates`](Self::flush_updates).
    pub fn register_update_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(Range<usize>) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_update_listener(&mut self, id: ListenerId) -> bool {
        let count = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != count
    }

    /// Hands the union of everything that changed since the last flush to the
    /// listeners, once.
    pub fn flush_updates(&mut self) -> Option<Range<usize>> {
        let dirty = self.highlighter.take_dirty()?;
        let len = self.text.len();
        let range = dirty.start.min(len)..dirty.end.min(len);

        self.cache.invalidate(range.clone());
        for (_, listener) in &mut self.listeners {
            listener(range.clone());
        }
        Some(range)
    }
}

impl fmt::Debug for HighlightBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightBuffer")
            .field("len", &self.text.len())
            .field("grammar", &self.grammar().name)
            .field("highlighter", &self.highlighter)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
