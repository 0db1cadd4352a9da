use std::fmt;
use std::sync::{Arc, OnceLock};

use onig::{Region, SearchOptions};
use serde::{Deserialize, Serialize};

/// A successful match, positions relative to the searched subject.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RegexMatch {
    pub start: usize,
    pub end: usize,
    pub capture_pos: Vec<Option<(usize, usize)>>,
}

impl RegexMatch {
    fn from_region(region: &Region) -> Option<Self> {
        let (start, end) = region.pos(0)?;
        Some(Self {
            start,
            end,
            capture_pos: (0..region.len()).map(|i| region.pos(i)).collect(),
        })
    }

    /// The text captured by group `index`, if that group participated.
    pub fn group<'s>(&self, subject: &'s str, index: usize) -> Option<&'s str> {
        let (start, end) = (*self.capture_pos.get(index)?)?;
        subject.get(start..end)
    }
}

/// A regex wrapper that serializes as a string but compiles lazily at runtime
pub struct Regex {
    pattern: String,
    compiled: OnceLock<Option<Arc<onig::Regex>>>,
}

impl Clone for Regex {
    fn clone(&self) -> Self {
        // Create a new regex with the same pattern but fresh lazy compilation
        Regex::new(self.pattern.clone())
    }
}

impl PartialEq for Regex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl Regex {
    pub fn new(pattern: String) -> Self {
        Self {
            pattern,
            compiled: OnceLock::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn compiled(&self) -> Option<&Arc<onig::Regex>> {
        self.compiled
            .get_or_init(|| onig::Regex::new(&self.pattern).ok().map(Arc::new))
            .as_ref()
    }

    /// Validate that this regex pattern compiles successfully
    pub fn validate(&self) -> Result<(), onig::Error> {
        onig::Regex::new(&self.pattern).map(|_| ())
    }

    /// Finds the leftmost match starting in `[from, to)` of `subject`.
    ///
    /// `accept` plays the role of a regex callout: it sees every candidate and can
    /// veto it, in which case the search resumes one char after the vetoed start.
    /// The whole subject stays visible to look-behind and look-ahead, and a match
    /// may run past `to` up to the end of the subject.
    pub fn find_at<F>(
        &self,
        subject: &str,
        from: usize,
        to: usize,
        options: SearchOptions,
        mut accept: F,
    ) -> Option<RegexMatch>
    where
        F: FnMut(&RegexMatch) -> bool,
    {
        let re = self.compiled()?;
        let mut region = Region::new();
        let mut start = from;

        while start < to {
            region.clear();
            re.search_with_options(subject, start, subject.len(), options, Some(&mut region))?;
            let found = RegexMatch::from_region(&region)?;
            if found.start >= to {
                return None;
            }
            if accept(&found) {
                return Some(found);
            }

            #[cfg(feature = "debug")]
            log::trace!(
                "[find_at] vetoed match of {:?} at {}..{}",
                self.pattern,
                found.start,
                found.end
            );
            start = found.start + subject[found.start..].chars().next().map_or(1, char::len_utf8);
        }

        None
    }
}

impl Serialize for Regex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for Regex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        Ok(Regex::new(pattern))
    }
}
