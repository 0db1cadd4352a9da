use std::fmt;
use std::io;

pub(crate) type LampoResult<T> = Result<T, Error>;

/// Errors that can occur while loading grammars or building a registry.
///
/// The highlighting core itself never errors: once a grammar is compiled, every
/// failure mode at runtime is handled by a degradation policy instead.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    /// or a dump file if the `dump` feature is enabled
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// Encoding or decoding a registry dump failed.
    #[cfg(feature = "dump")]
    Dump(bitcode::Error),

    /// A regex in the grammar does not compile.
    #[allow(missing_docs)]
    InvalidRegex { pattern: String, reason: String },

    /// An `include` points to a repository entry that doesn't exist.
    UnresolvedInclude(String),

    /// A pattern is neither a match rule, a begin/end region, an include nor a container.
    InvalidPattern(String),

    /// A grammar uses more distinct style names than a `StyleId` can hold.
    TooManyStyles(usize),

    /// A grammar was not found in the registry.
    GrammarNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            #[cfg(feature = "dump")]
            Error::Dump(err) => write!(f, "registry dump error: {}", err),
            Error::InvalidRegex { pattern, reason } => {
                write!(f, "invalid regex '{}': {}", pattern, reason)
            }
            Error::UnresolvedInclude(name) => write!(f, "unresolved include '{}'", name),
            Error::InvalidPattern(reason) => write!(f, "invalid pattern: {}", reason),
            Error::TooManyStyles(count) => {
                write!(f, "grammar uses {} styles, at most 256 are supported", count)
            }
            Error::GrammarNotFound(name) => write!(f, "grammar '{}' not found", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            #[cfg(feature = "dump")]
            Error::Dump(err) => Some(err),
            Error::InvalidRegex { .. }
            | Error::UnresolvedInclude(_)
            | Error::InvalidPattern(_)
            | Error::TooManyStyles(_)
            | Error::GrammarNotFound(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

#[cfg(feature = "dump")]
impl From<bitcode::Error> for Error {
    fn from(err: bitcode::Error) -> Self {
        Error::Dump(err)
    }
}
