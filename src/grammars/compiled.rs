use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, LampoResult};
use crate::grammars::pattern_set::PatternSet;
use crate::grammars::raw::{Capture, RawGrammar, RawPattern};
use crate::grammars::regex::Regex;

/// How far a regex may look around its match when a pattern doesn't say otherwise.
pub const DEFAULT_MAX_EXTEND: usize = 256;

/// Name of style 0, used for text outside of any styled pattern.
pub const DEFAULT_STYLE_NAME: &str = "default";

/// A style id, as stored per byte by the style cache.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct StyleId(pub u8);

impl Deref for StyleId {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const DEFAULT_STYLE: StyleId = StyleId(0);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub u16);

impl PatternId {
    #[inline]
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl Deref for PatternId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The grammar's top level patterns always live in pattern 0.
pub const ROOT_PATTERN_ID: PatternId = PatternId(0);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegexId(u16);

impl Deref for RegexId {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled pattern. Depending on which regexes are set it is:
/// - a container (no begin): only the root is left after compilation
/// - a match rule (begin, no end): a single INTER token
/// - a region (begin and end): pushed on the pattern stack until its end matches
#[derive(Debug, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub style: Option<StyleId>,
    pub begin: Option<RegexId>,
    pub end: Option<RegexId>,
    pub begin_captures: Vec<Option<StyleId>>,
    pub end_captures: Vec<Option<StyleId>>,
    pub push_capture: Option<usize>,
    pub end_capture: Option<usize>,
    pub apply_end_pattern_last: bool,
    pub max_extend: usize,
    /// Concrete child patterns, includes and containers already flattened
    pub children: Vec<PatternId>,
    #[serde(skip)]
    child_set: OnceLock<PatternSet>,
}

impl Pattern {
    fn placeholder(id: PatternId, max_extend: usize) -> Self {
        Self {
            id,
            style: None,
            begin: None,
            end: None,
            begin_captures: Vec::new(),
            end_captures: Vec::new(),
            push_capture: None,
            end_capture: None,
            apply_end_pattern_last: false,
            max_extend,
            children: Vec::new(),
            child_set: OnceLock::new(),
        }
    }

    pub fn is_region(&self) -> bool {
        self.end.is_some()
    }

    pub fn is_container(&self) -> bool {
        self.begin.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompiledGrammar {
    pub name: String,
    pub display_name: Option<String>,
    pub file_types: Vec<String>,
    /// Style names, indexed by `StyleId`
    pub styles: Vec<String>,
    pub regexes: Vec<Regex>,
    pub patterns: Vec<Pattern>,
    /// Largest `max_extend` of any pattern
    pub max_extend: usize,
    pub approximate: bool,
}

impl CompiledGrammar {
    pub fn from_raw_grammar(raw: RawGrammar) -> LampoResult<Self> {
        let default_extend = raw.max_extend.unwrap_or(DEFAULT_MAX_EXTEND);
        let grammar = Self {
            name: raw.name,
            display_name: raw.display_name,
            file_types: raw.file_types,
            styles: vec![DEFAULT_STYLE_NAME.to_owned()],
            regexes: Vec::new(),
            patterns: Vec::new(),
            max_extend: default_extend,
            approximate: raw.approximate,
        };

        let mut compiler = GrammarCompiler {
            grammar,
            default_extend,
            style_ids: HashMap::from([(DEFAULT_STYLE_NAME.to_owned(), DEFAULT_STYLE)]),
            unresolved: Vec::new(),
            repository: HashMap::new(),
        };

        let root = RawPattern {
            patterns: raw.patterns,
            ..Default::default()
        };
        let root_id = compiler.compile_pattern(root)?;
        assert_eq!(root_id, ROOT_PATTERN_ID);

        // Repository entries are compiled upfront so includes can be cyclic
        let mut names: Vec<_> = raw.repository.keys().cloned().collect();
        names.sort();
        let mut repository = raw.repository;
        for name in names {
            if let Some(entry) = repository.remove(&name) {
                let id = compiler.compile_pattern(entry)?;
                compiler.repository.insert(name, id);
            }
        }

        compiler.resolve_children()?;
        let mut grammar = compiler.grammar;
        grammar.max_extend = grammar
            .patterns
            .iter()
            .map(|p| p.max_extend)
            .max()
            .unwrap_or(default_extend);

        // Validates the child sets now rather than on the first keystroke
        for pattern in &grammar.patterns {
            if pattern.children.is_empty() {
                continue;
            }
            let set = grammar.build_child_set(pattern).map_err(|reason| Error::InvalidRegex {
                pattern: format!("<children of pattern {}>", *pattern.id),
                reason,
            })?;
            let _ = pattern.child_set.set(set);
        }

        Ok(grammar)
    }

    /// A grammar that highlights nothing.
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            display_name: None,
            file_types: Vec::new(),
            styles: vec![DEFAULT_STYLE_NAME.to_owned()],
            regexes: Vec::new(),
            patterns: vec![Pattern::placeholder(ROOT_PATTERN_ID, DEFAULT_MAX_EXTEND)],
            max_extend: DEFAULT_MAX_EXTEND,
            approximate: false,
        }
    }

    #[inline]
    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id.as_index()]
    }

    #[inline]
    pub fn regex(&self, id: RegexId) -> &Regex {
        &self.regexes[*id as usize]
    }

    /// Whether there is anything to highlight at all.
    pub fn has_patterns(&self) -> bool {
        !self.pattern(ROOT_PATTERN_ID).children.is_empty()
    }

    pub fn style_name(&self, id: StyleId) -> &str {
        self.styles
            .get(*id as usize)
            .map_or(DEFAULT_STYLE_NAME, String::as_str)
    }

    pub fn style_id(&self, name: &str) -> Option<StyleId> {
        self.styles
            .iter()
            .position(|s| s == name)
            .map(|i| StyleId(i as u8))
    }

    /// The begin regexes of the children of `id`, as one regex set.
    pub(crate) fn child_set(&self, id: PatternId) -> &PatternSet {
        let pattern = self.pattern(id);
        // Every set was validated at compile time, a dumped grammar only rebuilds them
        pattern
            .child_set
            .get_or_init(|| self.build_child_set(pattern).unwrap_or_default())
    }

    fn build_child_set(&self, pattern: &Pattern) -> Result<PatternSet, String> {
        let items = pattern
            .children
            .iter()
            .filter_map(|&child| {
                let begin = self.pattern(child).begin?;
                Some((child, self.regex(begin).pattern()))
            })
            .collect();
        PatternSet::new(items)
    }
}

impl fmt::Display for CompiledGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} patterns, {} styles)",
            self.display_name.as_deref().unwrap_or(&self.name),
            self.patterns.len(),
            self.styles.len()
        )
    }
}

enum ChildRef {
    Pattern(PatternId),
    Include(String),
}

struct GrammarCompiler {
    grammar: CompiledGrammar,
    default_extend: usize,
    style_ids: HashMap<String, StyleId>,
    /// Children of each pattern, as written in the grammar
    unresolved: Vec<Vec<ChildRef>>,
    repository: HashMap<String, PatternId>,
}

impl GrammarCompiler {
    fn compile_pattern(&mut self, raw: RawPattern) -> LampoResult<PatternId> {
        let id = PatternId(self.grammar.patterns.len() as u16);
        let max_extend = raw.max_extend.unwrap_or(self.default_extend);

        // push a placeholder to reserve its spot
        self.grammar
            .patterns
            .push(Pattern::placeholder(id, max_extend));
        self.unresolved.push(Vec::new());

        let style = raw.name.as_deref().map(|n| self.style_id(n)).transpose()?;

        let (begin, end) = match (raw.match_, raw.begin, raw.end) {
            (Some(pat), None, None) => (Some(self.compile_regex(pat)?), None),
            (None, Some(begin), Some(end)) => {
                (Some(self.compile_regex(begin)?), Some(self.compile_regex(end)?))
            }
            // a rule that has begin without end is just a match, probably a typo
            (None, Some(begin), None) => (Some(self.compile_regex(begin)?), None),
            (None, None, None) => (None, None),
            (_, _, _) => {
                return Err(Error::InvalidPattern(format!(
                    "pattern {} mixes `match` with `begin`/`end`",
                    *id
                )));
            }
        };

        let begin_captures = if raw.begin_captures.is_empty() {
            self.compile_captures(&raw.captures)?
        } else {
            self.compile_captures(&raw.begin_captures)?
        };
        let end_captures = if raw.end_captures.is_empty() {
            self.compile_captures(&raw.captures)?
        } else {
            self.compile_captures(&raw.end_captures)?
        };

        let mut children = Vec::with_capacity(raw.patterns.len());
        for child in raw.patterns {
            if let Some(include) = child.include {
                children.push(ChildRef::Include(include));
            } else {
                children.push(ChildRef::Pattern(self.compile_pattern(child)?));
            }
        }
        self.unresolved[id.as_index()] = children;

        let pattern = &mut self.grammar.patterns[id.as_index()];
        pattern.style = style;
        pattern.begin = begin;
        pattern.end = end;
        pattern.begin_captures = begin_captures;
        pattern.end_captures = end_captures;
        pattern.push_capture = raw.push_capture;
        pattern.end_capture = raw.end_capture;
        pattern.apply_end_pattern_last = raw.apply_end_pattern_last;
        Ok(id)
    }

    fn compile_regex(&mut self, pattern: String) -> LampoResult<RegexId> {
        let re = Regex::new(pattern);
        re.validate().map_err(|e| Error::InvalidRegex {
            pattern: re.pattern().to_owned(),
            reason: e.to_string(),
        })?;
        let regex_id = RegexId(self.grammar.regexes.len() as u16);
        self.grammar.regexes.push(re);
        Ok(regex_id)
    }

    fn compile_captures(
        &mut self,
        captures: &BTreeMap<String, Capture>,
    ) -> LampoResult<Vec<Option<StyleId>>> {
        if captures.is_empty() {
            return Ok(Vec::new());
        }

        let mut out: Vec<Option<StyleId>> = Vec::new();
        for (key, capture) in captures {
            let index: usize = key
                .parse()
                .map_err(|_| Error::InvalidPattern(format!("capture key '{key}' is not a group")))?;
            if out.len() <= index {
                out.resize(index + 1, None);
            }
            out[index] = Some(self.style_id(&capture.name)?);
        }
        Ok(out)
    }

    fn style_id(&mut self, name: &str) -> LampoResult<StyleId> {
        if let Some(id) = self.style_ids.get(name) {
            return Ok(*id);
        }
        let count = self.grammar.styles.len();
        if count > u8::MAX as usize {
            return Err(Error::TooManyStyles(count + 1));
        }
        let id = StyleId(count as u8);
        self.grammar.styles.push(name.to_owned());
        self.style_ids.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Turns every pattern's written children into the flat list of concrete
    /// patterns the tokenizer tries, in grammar order.
    fn resolve_children(&mut self) -> LampoResult<()> {
        for index in 0..self.grammar.patterns.len() {
            let mut out = Vec::new();
            let mut visited = HashSet::new();
            self.expand(PatternId(index as u16), &mut out, &mut visited)?;
            self.grammar.patterns[index].children = out;
        }
        Ok(())
    }

    fn expand(
        &self,
        id: PatternId,
        out: &mut Vec<PatternId>,
        visited: &mut HashSet<PatternId>,
    ) -> LampoResult<()> {
        for child in &self.unresolved[id.as_index()] {
            let target = match child {
                ChildRef::Pattern(target) => *target,
                ChildRef::Include(include) => self.resolve_include(include)?,
            };
            if !visited.insert(target) {
                continue;
            }
            if self.grammar.pattern(target).is_container() {
                self.expand(target, out, visited)?;
            } else {
                out.push(target);
            }
        }
        Ok(())
    }

    fn resolve_include(&self, include: &str) -> LampoResult<PatternId> {
        match include {
            "$self" | "$base" => Ok(ROOT_PATTERN_ID),
            s if s.starts_with('#') => self
                .repository
                .get(&s[1..])
                .copied()
                .ok_or_else(|| Error::UnresolvedInclude(include.to_owned())),
            _ => Err(Error::UnresolvedInclude(include.to_owned())),
        }
    }
}
