//! The text buffer contract the highlighter consumes, plus a minimal buffer implementing it.

use std::borrow::Cow;
use std::ops::Range;

/// Read access to the text being highlighted.
///
/// Positions are byte offsets. The highlighter only ever asks for slices whose
/// bounds are char boundaries.
pub trait TextSource {
    fn len(&self) -> usize;

    fn slice(&self, range: Range<usize>) -> Cow<'_, str>;

    fn is_char_boundary(&self, pos: usize) -> bool;

    /// Whether `pos` is at the start of a line (the start of the text counts).
    fn is_line_start(&self, pos: usize) -> bool;

    /// Whether `pos` is at the end of a line (the end of the text counts).
    fn is_line_end(&self, pos: usize) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextSource for str {
    fn len(&self) -> usize {
        str::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, str> {
        Cow::Borrowed(&self[range])
    }

    fn is_char_boundary(&self, pos: usize) -> bool {
        str::is_char_boundary(self, pos)
    }

    fn is_line_start(&self, pos: usize) -> bool {
        pos == 0 || self.as_bytes().get(pos - 1) == Some(&b'\n')
    }

    fn is_line_end(&self, pos: usize) -> bool {
        pos >= str::len(self) || self.as_bytes()[pos] == b'\n'
    }
}

impl TextSource for String {
    fn len(&self) -> usize {
        self.as_str().len()
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, str> {
        self.as_str().slice(range)
    }

    fn is_char_boundary(&self, pos: usize) -> bool {
        self.as_str().is_char_boundary(pos)
    }

    fn is_line_start(&self, pos: usize) -> bool {
        self.as_str().is_line_start(pos)
    }

    fn is_line_end(&self, pos: usize) -> bool {
        self.as_str().is_line_end(pos)
    }
}

/// Largest char boundary `<= pos`.
pub(crate) fn floor_char_boundary<T: TextSource + ?Sized>(text: &T, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Smallest char boundary `>= pos`, clamped to the text length.
pub(crate) fn ceil_char_boundary<T: TextSource + ?Sized>(text: &T, pos: usize) -> usize {
    let len = text.len();
    let mut pos = pos.min(len);
    while pos < len && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// A change notification: the bytes `[begin, old_end)` were replaced and the text
/// length changed by `delta`.
///
/// Positions before `begin` are unchanged, positions at or after `old_end` move
/// by `delta`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub begin: usize,
    pub old_end: usize,
    pub delta: isize,
}

impl TextChange {
    pub fn new(begin: usize, old_end: usize, inserted_len: usize) -> Self {
        debug_assert!(begin <= old_end);
        Self {
            begin,
            old_end,
            delta: inserted_len as isize - (old_end - begin) as isize,
        }
    }

    /// End of the changed region in post-edit coordinates.
    pub fn new_end(&self) -> usize {
        self.old_end.saturating_add_signed(self.delta)
    }

    /// Translates a pre-edit position that is not inside the replaced range.
    pub fn translate(&self, pos: usize) -> usize {
        if pos >= self.old_end {
            pos.saturating_add_signed(self.delta)
        } else if pos > self.begin {
            self.begin
        } else {
            pos
        }
    }
}

/// A plain `String` backed buffer that reports a [`TextChange`] for every edit.
///
/// Real editors own their buffer (gap buffer, rope, ...) and only need to implement
/// [`TextSource`]; this one exists for the facade, the CLI and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    content: String,
}

impl TextBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Replaces `range` with `text`. Both range ends must be char boundaries.
    pub fn replace(&mut self, range: Range<usize>, text: &str) -> TextChange {
        assert!(
            range.start <= range.end && range.end <= self.content.len(),
            "edit range {range:?} out of bounds (len {})",
            self.content.len()
        );
        self.content.replace_range(range.clone(), text);
        TextChange::new(range.start, range.end, text.len())
    }

    pub fn insert(&mut self, pos: usize, text: &str) -> TextChange {
        self.replace(pos..pos, text)
    }

    pub fn delete(&mut self, range: Range<usize>) -> TextChange {
        self.replace(range, "")
    }
}

impl TextSource for TextBuffer {
    fn len(&self) -> usize {
        self.content.len()
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, str> {
        self.content.slice(range)
    }

    fn is_char_boundary(&self, pos: usize) -> bool {
        self.content.is_char_boundary(pos)
    }

    fn is_line_start(&self, pos: usize) -> bool {
        self.content.is_line_start(pos)
    }

    fn is_line_end(&self, pos: usize) -> bool {
        self.content.is_line_end(pos)
    }
}
