use std::fmt;

use crate::grammars::{CompiledGrammar, DEFAULT_STYLE, PatternId, ROOT_PATTERN_ID, StyleId};

/// Maximum number of frames on a pattern stack, the root included.
pub const STACK_SIZE: usize = 16;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StackFrame {
    /// Region pattern that created this frame
    pub pattern: PatternId,
    /// Text of the begin match's `pushCapture` group, which the end match must repeat
    pub pushed: Option<Box<str>>,
}

/// The regions the scanner is currently nested in, root first.
///
/// Two stacks are equal when every frame has the same pattern and pushed text:
/// that is what makes a stored checkpoint reusable after an edit.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PatternStack {
    frames: Vec<StackFrame>,
}

impl PatternStack {
    /// A stack with only the root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![StackFrame {
                pattern: ROOT_PATTERN_ID,
                pushed: None,
            }],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_root(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= STACK_SIZE
    }

    /// Enters a region. Returns false, leaving the stack untouched, when it is full.
    pub fn push(&mut self, pattern: PatternId, pushed: Option<&str>) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames.push(StackFrame {
            pattern,
            pushed: pushed.map(Box::from),
        });
        true
    }

    /// Exits the current region, getting back to the parent. The root is never popped.
    pub fn pop(&mut self) -> Option<StackFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn top(&self) -> &StackFrame {
        self.frames.last().expect("stack never empty")
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Style of text that no pattern matches: the style of the innermost region
    /// that has one.
    pub fn style(&self, grammar: &CompiledGrammar) -> StyleId {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| grammar.pattern(frame.pattern).style)
            .unwrap_or(DEFAULT_STYLE)
    }
}

impl Default for PatternStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PatternStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatternStack[")?;
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{}", *frame.pattern)?;
            if let Some(pushed) = &frame.pushed {
                write!(f, "({pushed:?})")?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_is_bounded_and_root_stays() {
        let mut stack = PatternStack::new();
        assert!(stack.pop().is_none());
        for i in 1..STACK_SIZE {
            assert!(stack.push(PatternId(i as u16), None));
        }
        assert!(stack.is_full());
        assert!(!stack.push(PatternId(99), None));
        assert_eq!(stack.depth(), STACK_SIZE);

        while stack.pop().is_some() {}
        assert!(stack.is_root());
        assert_eq!(stack, PatternStack::new());
    }

    #[test]
    fn pushed_text_is_part_of_equality() {
        let mut a = PatternStack::new();
        let mut b = PatternStack::new();
        a.push(PatternId(3), Some("EOF"));
        b.push(PatternId(3), Some("END"));
        assert_ne!(a, b);
        b.pop();
        b.push(PatternId(3), Some("EOF"));
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), r#"PatternStack[0 > 3("EOF")]"#);
    }
}
