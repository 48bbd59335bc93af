//! Depth-first enter/exit event stream over the music tree.
//!
//! Containers yield `Enter` before and `Exit` after their children; leaves
//! yield `Leaf`. Unfolded repeats are expanded here so consumers walk the
//! literal music. The stream also answers the look-behind and look-ahead
//! queries the translator needs at a given position.

use super::node::{Node, RepeatKind};

/// One step of the walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event<'a> {
    Enter(&'a Node),
    Leaf(&'a Node),
    Exit(&'a Node),
}

/// Where the look-ahead for a fork branch stops inside the fork container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchLimit {
    /// Branches are separated by `\\`
    Separator,
    /// Every child of the fork is its own branch
    Child,
}

#[derive(Debug)]
struct Frame<'a> {
    owner: &'a Node,
    children: Vec<&'a Node>,
    next: usize,
}

/// Iterator state over a tree.
pub struct Events<'a> {
    root: Option<&'a Node>,
    stack: Vec<Frame<'a>>,
    unfold_volta: bool,
    // true when the last yielded event pushed a frame
    entered: bool,
}

impl<'a> Events<'a> {
    pub fn new(root: &'a Node) -> Self {
        Self {
            root: Some(root),
            stack: Vec::new(),
            unfold_volta: false,
            entered: false,
        }
    }

    /// Expand volta repeats like unfold repeats.
    pub fn unfolding_volta(mut self, unfold: bool) -> Self {
        self.unfold_volta = unfold;
        self
    }

    /// Number of open containers.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The frame holding the most recently yielded node.
    fn current_frame(&self) -> Option<&Frame<'a>> {
        if self.entered {
            self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i))
        } else {
            self.stack.last()
        }
    }

    /// The sibling yielded just before the current node.
    pub fn previous_sibling(&self) -> Option<&'a Node> {
        let frame = self.current_frame()?;
        let index = frame.next.checked_sub(2)?;
        frame.children.get(index).copied()
    }

    /// The sibling that will follow the current node.
    pub fn next_sibling(&self) -> Option<&'a Node> {
        let frame = self.current_frame()?;
        frame.children.get(frame.next).copied()
    }

    /// The container owning the current node.
    pub fn parent(&self) -> Option<&'a Node> {
        self.current_frame().map(|f| f.owner)
    }

    /// Does any rhythmic node follow the current position inside the branch
    /// of the fork whose frame sits at `fork_depth` (as returned by
    /// [`Events::depth`] right after entering the fork)?
    pub fn rhythm_follows(&self, fork_depth: usize, limit: BranchLimit) -> bool {
        let Some(fork_index) = fork_depth.checked_sub(1) else {
            return false;
        };
        for (level, frame) in self.stack.iter().enumerate().skip(fork_index) {
            let remaining = frame.children.iter().skip(frame.next);
            if level == fork_index {
                if limit == BranchLimit::Child {
                    continue;
                }
                for node in remaining {
                    if matches!(node, Node::VoiceSeparator) {
                        break;
                    }
                    if node.contains_rhythm() {
                        return true;
                    }
                }
            } else if remaining.into_iter().any(|n| n.contains_rhythm()) {
                return true;
            }
        }
        false
    }

    /// Drop every child of the innermost open container past the first `keep`.
    pub fn truncate_children(&mut self, keep: usize) {
        if let Some(frame) = self.stack.last_mut() {
            frame.children.truncate(keep);
        }
    }

    fn push(&mut self, node: &'a Node) -> Event<'a> {
        match node.children() {
            Some(children) => {
                let children = match node {
                    Node::Repeat { repeat, count, .. } if self.unfolds(*repeat) => {
                        unfold_sequence(children, *count)
                    }
                    _ => children.iter().collect(),
                };
                self.stack.push(Frame {
                    owner: node,
                    children,
                    next: 0,
                });
                self.entered = true;
                Event::Enter(node)
            }
            None => {
                self.entered = false;
                Event::Leaf(node)
            }
        }
    }

    fn unfolds(&self, kind: RepeatKind) -> bool {
        match kind {
            RepeatKind::Unfold | RepeatKind::Percent => true,
            RepeatKind::Volta => self.unfold_volta,
            RepeatKind::Tremolo => false,
        }
    }
}

impl<'a> Iterator for Events<'a> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        if let Some(root) = self.root.take() {
            return Some(self.push(root));
        }
        let frame = self.stack.last_mut()?;
        if let Some(child) = frame.children.get(frame.next).copied() {
            frame.next += 1;
            return Some(self.push(child));
        }
        let frame = self.stack.pop()?;
        self.entered = false;
        Some(Event::Exit(frame.owner))
    }
}

/// Body nodes and ending branches of a repeat.
pub fn split_repeat(children: &[Node]) -> (Vec<&Node>, Vec<&Node>) {
    let mut body = Vec::new();
    let mut endings = Vec::new();
    for child in children {
        match child {
            Node::Alternative { children } => endings.extend(children.iter()),
            other => body.push(other),
        }
    }
    (body, endings)
}

/// Literal expansion of an `N`-times repeat.
///
/// Copy `i` is followed by ending `i` while endings last, then by the first
/// ending again. Endings beyond `N` never play.
pub fn unfold_sequence(children: &[Node], count: u32) -> Vec<&Node> {
    let (body, endings) = split_repeat(children);
    let mut out = Vec::with_capacity((body.len() + 1) * count as usize);
    for i in 0..count as usize {
        out.extend(body.iter().copied());
        if !endings.is_empty() {
            let ending = if i < endings.len() { i } else { 0 };
            out.push(endings[ending]);
        }
    }
    out
}
