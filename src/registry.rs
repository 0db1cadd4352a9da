use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, LampoResult};
use crate::grammars::{CompiledGrammar, RawGrammar};

/// The default grammar name, where nothing is highlighted
pub const PLAIN_GRAMMAR_NAME: &str = "plain";

/// Language modes a buffer can be switched to.
///
/// Grammars are compiled once and shared: every buffer using a language mode
/// holds an `Arc` of the same compiled grammar.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Registry {
    grammars: Vec<Arc<CompiledGrammar>>,
    // grammar name, alias or file type -> index in `grammars`
    grammar_id_by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_grammar_from_raw(&mut self, raw_grammar: RawGrammar) -> LampoResult<()> {
        let grammar = raw_grammar.compile()?;
        #[cfg(feature = "debug")]
        log::debug!("[add_grammar_from_raw] compiled {grammar}");

        let grammar_id = self.grammars.len();
        self.grammar_id_by_name
            .insert(grammar.name.clone(), grammar_id);
        for file_type in &grammar.file_types {
            self.grammar_id_by_name
                .entry(file_type.clone())
                .or_insert(grammar_id);
        }
        self.grammars.push(Arc::new(grammar));
        Ok(())
    }

    /// Reads the file and adds it as a grammar.
    pub fn add_grammar_from_path(&mut self, path: impl AsRef<Path>) -> LampoResult<()> {
        let raw_grammar = RawGrammar::load_from_file(path)?;
        self.add_grammar_from_raw(raw_grammar)
    }

    pub fn add_grammar_from_str(&mut self, content: &str) -> LampoResult<()> {
        let raw_grammar = RawGrammar::load_from_str(content)?;
        self.add_grammar_from_raw(raw_grammar)
    }

    /// Adds an empty grammar that will not match any token. Useful as a fallback if the grammar is not found.
    ///
    /// It will get the `plain` grammar name.
    pub fn add_plain_grammar(&mut self, aliases: &[&str]) -> LampoResult<()> {
        let raw = RawGrammar {
            name: PLAIN_GRAMMAR_NAME.to_owned(),
            ..Default::default()
        };
        self.add_grammar_from_raw(raw)?;
        for alias in aliases {
            self.add_alias(PLAIN_GRAMMAR_NAME, alias);
        }
        Ok(())
    }

    /// Adds an alias for the given grammar
    pub fn add_alias(&mut self, grammar_name: &str, alias: &str) {
        if let Some(grammar_id) = self.grammar_id_by_name.get(grammar_name) {
            self.grammar_id_by_name
                .insert(alias.to_string(), *grammar_id);
        }
    }

    pub fn contains_grammar(&self, name: &str) -> bool {
        self.grammar_id_by_name.contains_key(name)
    }

    /// The grammar registered under that name, alias or file type.
    pub fn get(&self, name: &str) -> LampoResult<Arc<CompiledGrammar>> {
        self.grammar_id_by_name
            .get(name)
            .map(|id| Arc::clone(&self.grammars[*id]))
            .ok_or_else(|| Error::GrammarNotFound(name.to_owned()))
    }

    /// Like [`Registry::get`] but falls back to a grammar highlighting nothing.
    pub fn get_or_plain(&self, name: &str) -> Arc<CompiledGrammar> {
        self.get(name)
            .or_else(|_| self.get(PLAIN_GRAMMAR_NAME))
            .unwrap_or_else(|_| Arc::new(CompiledGrammar::plain(PLAIN_GRAMMAR_NAME)))
    }

    #[cfg(feature = "dump")]
    /// Dump the compiled grammars to a binary file that can be loaded later
    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> LampoResult<()> {
        let data = bitcode::serialize(self)?;
        let compressed = zstd::encode_all(data.as_slice(), 0)?;
        std::fs::write(path, compressed)?;
        Ok(())
    }

    #[cfg(feature = "dump")]
    fn load_from_bytes(compressed_data: &[u8]) -> LampoResult<Self> {
        let data = zstd::decode_all(compressed_data)?;
        Ok(bitcode::deserialize(&data)?)
    }

    #[cfg(feature = "dump")]
    /// Read a binary dump made by [`Registry::dump_to_file`]
    pub fn load_from_file(path: impl AsRef<Path>) -> LampoResult<Self> {
        let compressed_data = std::fs::read(path)?;
        Self::load_from_bytes(&compressed_data)
    }
}
