mod compiled;
mod pattern_set;
mod raw;
mod regex;

pub use compiled::*;
pub use raw::{Capture, RawGrammar, RawPattern};
pub use regex::{Regex, RegexMatch};
