use std::borrow::Cow;

use onig::SearchOptions;

use crate::grammars::RegexMatch;
use crate::text::{TextSource, ceil_char_boundary, floor_char_boundary};

/// The slice of text handed to the regex engine for one stretch of scanning.
///
/// Matches may only start in `[pos, search_end)` but the regexes see `max_extend`
/// bytes of context on both sides, so look-behind and look-ahead behave the same
/// wherever the scan happened to resume.
#[derive(Debug)]
pub(crate) struct SearchWindow<'t> {
    pub subject: Cow<'t, str>,
    /// Absolute position of `subject[0]`
    pub offset: usize,
    /// Absolute position matches must start before
    pub search_end: usize,
    pub options: SearchOptions,
}

impl<'t> SearchWindow<'t> {
    pub fn new<T: TextSource + ?Sized>(
        text: &'t T,
        pos: usize,
        search_end: usize,
        max_extend: usize,
    ) -> Self {
        let start = floor_char_boundary(text, pos.saturating_sub(max_extend));
        let end = ceil_char_boundary(text, search_end.saturating_add(max_extend));

        let mut options = SearchOptions::SEARCH_OPTION_NONE;
        if !text.is_line_start(start) {
            options |= SearchOptions::SEARCH_OPTION_NOTBOL;
        }
        if !text.is_line_end(end) {
            options |= SearchOptions::SEARCH_OPTION_NOTEOL;
        }

        Self {
            subject: text.slice(start..end),
            offset: start,
            search_end,
            options,
        }
    }

    #[inline]
    pub fn local(&self, pos: usize) -> usize {
        pos - self.offset
    }

    #[inline]
    pub fn absolute(&self, local: usize) -> usize {
        local + self.offset
    }

    /// Text of a capture group of a match given in absolute positions.
    pub fn group(&self, m: &RegexMatch, index: usize) -> Option<&str> {
        let (start, end) = (*m.capture_pos.get(index)?)?;
        self.subject.get(self.local(start)..self.local(end))
    }
}
