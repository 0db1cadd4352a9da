//! Checkpoints of the scanner state, ordered by position.

use crate::tokenizer::PatternStack;

/// The transition that produced the state stored in a break.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BreakKind {
    /// A region was entered by a begin match ending at the break
    Begin,
    /// A region was exited by an end match ending at the break
    End,
    /// Anything else: a match rule, plain text, a degraded begin
    Inter,
}

/// Stable handle of a break. It stays valid until that break is deleted, after
/// which its slot may be handed to a new break. An id kept across deletions is
/// only good as a seek hint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakId(u32);

impl BreakId {
    #[inline]
    fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// Scanning may resume at `pos` with `stack` active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Break {
    pub pos: usize,
    pub kind: BreakKind,
    pub stack: PatternStack,
}

#[derive(Debug)]
struct Node {
    brk: Break,
    prev: Option<BreakId>,
    next: Option<BreakId>,
}

/// What [`BreakIndex::set_break`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SetBreak {
    /// A new break was stored
    Inserted(BreakId),
    /// An identical break was already there but a fixed point is not allowed yet
    Reused(BreakId),
    /// An identical break was already there: everything after it is still valid
    FixedPoint(BreakId),
}

impl SetBreak {
    pub fn id(self) -> BreakId {
        match self {
            SetBreak::Inserted(id) | SetBreak::Reused(id) | SetBreak::FixedPoint(id) => id,
        }
    }
}

/// Breaks in an arena, doubly linked in position order, with a free list.
///
/// The first break is a sentinel at position 0 with the root-only stack. It can't
/// be deleted so there is always somewhere to resume from.
#[derive(Debug)]
pub struct BreakIndex {
    nodes: Vec<Option<Node>>,
    free: Vec<BreakId>,
    last: BreakId,
    len: usize,
}

const SENTINEL: BreakId = BreakId(0);

impl BreakIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                brk: Break {
                    pos: 0,
                    kind: BreakKind::Inter,
                    stack: PatternStack::new(),
                },
                prev: None,
                next: None,
            })],
            free: Vec::new(),
            last: SENTINEL,
            len: 1,
        }
    }

    /// Drops every break but the sentinel.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn first(&self) -> BreakId {
        SENTINEL
    }

    #[inline]
    pub fn last(&self) -> BreakId {
        self.last
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Never true: the sentinel break at 0 is always there.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `id` refers to a live break. It can't tell a deleted break from
    /// a newer one stored in the same slot.
    pub fn contains(&self, id: BreakId) -> bool {
        matches!(self.nodes.get(id.as_index()), Some(Some(_)))
    }

    fn node(&self, id: BreakId) -> &Node {
        match self.nodes.get(id.as_index()) {
            Some(Some(node)) => node,
            _ => panic!("break {id:?} was deleted"),
        }
    }

    fn node_mut(&mut self, id: BreakId) -> &mut Node {
        match self.nodes.get_mut(id.as_index()) {
            Some(Some(node)) => node,
            _ => panic!("break {id:?} was deleted"),
        }
    }

    pub fn get(&self, id: BreakId) -> &Break {
        &self.node(id).brk
    }

    #[inline]
    pub fn pos(&self, id: BreakId) -> usize {
        self.node(id).brk.pos
    }

    pub fn next(&self, id: BreakId) -> Option<BreakId> {
        self.node(id).next
    }

    pub fn prev(&self, id: BreakId) -> Option<BreakId> {
        self.node(id).prev
    }

    pub fn move_next(&self, id: &mut BreakId) {
        *id = self.next(*id).expect("moved past the last break");
    }

    pub fn move_prev(&self, id: &mut BreakId) {
        *id = self.prev(*id).expect("moved before the first break");
    }

    pub fn is_first(&self, id: BreakId) -> bool {
        id == SENTINEL
    }

    pub fn is_last(&self, id: BreakId) -> bool {
        id == self.last
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            index: self,
            cur: Some(SENTINEL),
        }
    }

    /// Last break at or before `pos`, walking from `hint` in whichever direction
    /// is needed. A deleted hint falls back to the first break.
    pub fn seek_before(&self, hint: Option<BreakId>, pos: usize) -> BreakId {
        let mut cur = match hint {
            Some(id) if self.contains(id) => id,
            _ => SENTINEL,
        };

        if self.pos(cur) <= pos {
            while let Some(next) = self.next(cur) {
                if self.pos(next) > pos {
                    break;
                }
                cur = next;
            }
        } else {
            while self.pos(cur) > pos {
                match self.prev(cur) {
                    Some(prev) => cur = prev,
                    None => break,
                }
            }
        }
        cur
    }

    /// Inserts a break right after `after`. Positions must stay ordered.
    pub fn insert_after(
        &mut self,
        after: BreakId,
        pos: usize,
        kind: BreakKind,
        stack: PatternStack,
    ) -> BreakId {
        let next = self.next(after);
        debug_assert!(self.pos(after) <= pos);
        debug_assert!(next.is_none_or(|n| pos <= self.pos(n)));

        let node = Node {
            brk: Break { pos, kind, stack },
            prev: Some(after),
            next,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.as_index()] = Some(node);
                id
            }
            None => {
                let id = BreakId(self.nodes.len() as u32);
                self.nodes.push(Some(node));
                id
            }
        };

        self.node_mut(after).next = Some(id);
        match next {
            Some(n) => self.node_mut(n).prev = Some(id),
            None => self.last = id,
        }
        self.len += 1;
        id
    }

    fn remove(&mut self, id: BreakId) {
        assert!(id != SENTINEL, "the first break can't be deleted");
        let Some(node) = self.nodes[id.as_index()].take() else {
            panic!("break {id:?} was already deleted");
        };

        // Every break but the sentinel has a previous one
        if let Some(prev) = node.prev {
            self.node_mut(prev).next = node.next;
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.last = node.prev.unwrap_or(SENTINEL),
        }
        self.free.push(id);
        self.len -= 1;
    }

    /// Deletes the breaks in `[from, to)`, `to == None` meaning up to the end.
    pub fn delete_range(&mut self, from: BreakId, to: Option<BreakId>) {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if Some(id) == to {
                break;
            }
            cur = self.next(id);
            self.remove(id);
        }
    }

    /// Deletes every break after `id`.
    pub fn truncate_after(&mut self, id: BreakId) {
        if let Some(next) = self.next(id) {
            self.delete_range(next, None);
        }
    }

    /// Moves `id` and every break after it by `delta` bytes.
    pub fn shift_from(&mut self, id: BreakId, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut cur = Some(id);
        while let Some(id) = cur {
            let node = self.node_mut(id);
            node.brk.pos = node.brk.pos.saturating_add_signed(delta);
            cur = node.next;
        }
    }

    /// Stores a checkpoint after `after`, replacing the stale breaks in between.
    ///
    /// Breaks before `pos` are deleted. A break exactly at `pos` with the same
    /// kind and stack is kept: from there on the old breaks describe the new text
    /// too, which is only reported as a fixed point when `allow_fixed_point` is set.
    pub fn set_break(
        &mut self,
        after: BreakId,
        pos: usize,
        kind: BreakKind,
        stack: &PatternStack,
        allow_fixed_point: bool,
    ) -> SetBreak {
        let mut cur = self.next(after);
        while let Some(id) = cur {
            let brk = self.get(id);
            if brk.pos > pos {
                break;
            }
            if brk.pos == pos && brk.kind == kind && brk.stack == *stack {
                return if allow_fixed_point {
                    SetBreak::FixedPoint(id)
                } else {
                    SetBreak::Reused(id)
                };
            }
            cur = self.next(id);
            self.remove(id);
        }

        SetBreak::Inserted(self.insert_after(after, pos, kind, stack.clone()))
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let first = self.get(SENTINEL);
        assert_eq!(first.pos, 0);
        assert!(first.stack.is_root());
        assert!(self.prev(SENTINEL).is_none());

        let mut count = 0;
        let mut prev: Option<BreakId> = None;
        for (id, brk) in self.iter() {
            assert_eq!(self.prev(id), prev);
            if let Some(p) = prev {
                assert!(self.pos(p) <= brk.pos, "breaks out of order at {id:?}");
            }
            prev = Some(id);
            count += 1;
        }
        assert_eq!(prev, Some(self.last));
        assert_eq!(count, self.len);
    }
}

impl Default for BreakIndex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a> {
    index: &'a BreakIndex,
    cur: Option<BreakId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (BreakId, &'a Break);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        let node = self.index.node(id);
        self.cur = node.next;
        Some((id, &node.brk))
    }
}
