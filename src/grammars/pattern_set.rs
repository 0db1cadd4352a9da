use std::fmt::{Debug, Formatter};

use onig::{RegSet, RegexOptions, SearchOptions};

use crate::grammars::PatternId;
use crate::grammars::regex::RegexMatch;

/// An eagerly compiled set of the begin regexes of a pattern's children, so that
/// finding the leftmost child match is a single onig RegSet search.
#[derive(Default)]
pub struct PatternSet {
    pattern_ids: Vec<PatternId>,
    regset: Option<RegSet>,
}

impl PatternSet {
    pub fn new(items: Vec<(PatternId, &str)>) -> Result<Self, String> {
        if items.is_empty() {
            return Ok(Self::default());
        }

        let (pattern_ids, patterns): (Vec<_>, Vec<_>) = items.into_iter().unzip();

        let regset = RegSet::with_options(&patterns, RegexOptions::REGEX_OPTION_CAPTURE_GROUP)
            .map_err(|e| {
                format!(
                    "Failed to compile pattern set with {} patterns: {:?}",
                    patterns.len(),
                    e
                )
            })?;

        Ok(Self {
            pattern_ids,
            regset: Some(regset),
        })
    }

    /// Leftmost match of any regex in the set starting in `[from, to)`. Ties go to
    /// the earlier child, which is grammar order. Matches may end past `to`.
    pub(crate) fn find_at(
        &self,
        subject: &str,
        from: usize,
        to: usize,
        options: SearchOptions,
    ) -> Option<(PatternId, RegexMatch)> {
        let regset = self.regset.as_ref()?;

        // The search limit is the end of the subject, `to` only bounds the start
        let (pattern_index, captures) = regset.captures_with_options(
            subject,
            from,
            subject.len(),
            onig::RegSetLead::Position,
            options,
        )?;
        let (start, end) = captures.pos(0)?;
        if start >= to {
            return None;
        }

        let capture_pos: Vec<Option<(usize, usize)>> =
            (0..captures.len()).map(|i| captures.pos(i)).collect();

        Some((
            self.pattern_ids[pattern_index],
            RegexMatch {
                start,
                end,
                capture_pos,
            },
        ))
    }
}

impl Debug for PatternSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatternSet({} patterns)", self.pattern_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_run_past_the_start_limit() {
        let set = PatternSet::new(vec![
            (PatternId(1), r"[a-z]+"),
            (PatternId(2), r"\d+"),
        ])
        .unwrap();
        let (id, m) = set
            .find_at("ab12cd345", 4, 7, SearchOptions::SEARCH_OPTION_NONE)
            .unwrap();
        assert_eq!((id, m.start, m.end), (PatternId(1), 4, 6));
        let (id, m) = set
            .find_at("ab12cd345", 6, 7, SearchOptions::SEARCH_OPTION_NONE)
            .unwrap();
        assert_eq!((id, m.start, m.end), (PatternId(2), 6, 9));
        assert!(
            set.find_at("ab12cd345", 7, 7, SearchOptions::SEARCH_OPTION_NONE)
                .is_none()
        );
    }
}
