use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use super::compiled::CompiledGrammar;
use crate::error::LampoResult;

/// A capture group that assigns a style to the text it captured
///
/// # Examples
/// ```json
/// { "1": { "name": "keyword" }, "2": { "name": "string" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub name: String,
}

/// One entry of a grammar: a match rule, a begin/end region, an include or a
/// plain container of patterns. Which one it is depends on which fields are set.
///
/// # Examples
/// A single token:
/// ```json
/// { "name": "number", "match": "\\b\\d+\\b" }
/// ```
///
/// A region with nested patterns:
/// ```json
/// {
///   "name": "string",
///   "begin": "\"",
///   "end": "\"",
///   "patterns": [{ "name": "escape", "match": "\\\\." }]
/// }
/// ```
///
/// A here-doc whose terminator must repeat the word captured by the begin regex:
/// ```json
/// {
///   "name": "heredoc",
///   "begin": "<<(\\w+)",
///   "end": "^(\\w+)$",
///   "pushCapture": 1,
///   "endCapture": 1
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all(deserialize = "camelCase"))]
pub struct RawPattern {
    /// Reference to other patterns
    /// - "#name" - entry of the grammar repository
    /// - "$self" - the grammar's top level patterns
    pub include: Option<String>,
    /// Style name of the matched text, inherited from the enclosing region if missing
    pub name: Option<String>,
    #[serde(rename(deserialize = "match"))]
    pub match_: Option<String>,
    pub begin: Option<String>,
    pub end: Option<String>,
    /// Fallback for both `begin_captures` and `end_captures`
    pub captures: BTreeMap<String, Capture>,
    pub begin_captures: BTreeMap<String, Capture>,
    pub end_captures: BTreeMap<String, Capture>,
    /// Group of the begin match whose text is pushed with the region
    pub push_capture: Option<usize>,
    /// Group of the end match that must equal the pushed text
    pub end_capture: Option<usize>,
    /// On a tie between the end regex and a child, the child wins
    pub apply_end_pattern_last: bool,
    /// How many bytes a match of this pattern may look around
    pub max_extend: Option<usize>,
    pub patterns: Vec<RawPattern>,
}

/// Top-level structure of a grammar file
///
/// # Examples
/// ```json
/// {
///   "name": "c",
///   "fileTypes": ["c", "h"],
///   "maxExtend": 128,
///   "approximate": true,
///   "patterns": [{ "include": "#comment" }, { "name": "keyword", "match": "\\b(if|else)\\b" }],
///   "repository": {
///     "comment": { "name": "comment", "begin": "/\\*", "end": "\\*/" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct RawGrammar {
    /// Name the grammar is registered under
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    /// Default for patterns without their own `maxExtend`
    #[serde(default)]
    pub max_extend: Option<usize>,
    /// Whether style queries far from any checkpoint may be answered by an
    /// approximate local re-scan
    #[serde(default)]
    pub approximate: bool,
    #[serde(default)]
    pub repository: HashMap<String, RawPattern>,
    #[serde(default)]
    pub patterns: Vec<RawPattern>,
}

impl RawGrammar {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> LampoResult<Self> {
        let file = File::open(&path)?;
        let raw_grammar = serde_json::from_reader(BufReader::new(file))?;
        Ok(raw_grammar)
    }

    pub fn load_from_str(content: &str) -> LampoResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Compile this raw grammar, validating every regex
    pub fn compile(self) -> LampoResult<CompiledGrammar> {
        CompiledGrammar::from_raw_grammar(self)
    }
}
