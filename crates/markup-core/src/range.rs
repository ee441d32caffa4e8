use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::tree::{NodeId, Tree, clamp_to_char_boundary};

/// A boundary inside the tree. For text nodes `offset` is a byte offset;
/// for elements and the root it is a child index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub node: NodeId,
    pub offset: usize,
}

impl Point {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }

    /// The position just before `node` in its parent.
    pub fn before(tree: &Tree, node: NodeId) -> Result<Self, TreeError> {
        let parent = tree.parent(node).ok_or(TreeError::Detached(node))?;
        let ix = tree.index_of(node).ok_or(TreeError::Detached(node))?;
        Ok(Self::new(parent, ix))
    }

    /// The position just after `node` in its parent.
    pub fn after(tree: &Tree, node: NodeId) -> Result<Self, TreeError> {
        let before = Self::before(tree, node)?;
        Ok(Self::new(before.node, before.offset + 1))
    }
}

/// User-facing selection. The focus may precede the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

impl From<Range> for Selection {
    fn from(range: Range) -> Self {
        Self {
            anchor: range.start,
            focus: range.end,
        }
    }
}

/// A selection with its boundaries in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Point,
    pub end: Point,
}

impl Range {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn collapsed(point: Point) -> Self {
        Self::new(point, point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn from_selection(tree: &Tree, selection: &Selection) -> Result<Self, TreeError> {
        match tree.compare_points(&selection.anchor, &selection.focus)? {
            Ordering::Greater => Ok(Self::new(selection.focus, selection.anchor)),
            _ => Ok(Self::new(selection.anchor, selection.focus)),
        }
    }

    /// Range covering `first` through `last`, which must share a parent.
    pub fn covering(tree: &Tree, first: NodeId, last: NodeId) -> Result<Self, TreeError> {
        Ok(Self::new(Point::before(tree, first)?, Point::after(tree, last)?))
    }
}

impl Tree {
    /// Sort key for a point: the node's child-index path followed by the
    /// offset. Lexicographic order on keys is document order.
    pub fn point_key(&self, point: &Point) -> Result<Vec<usize>, TreeError> {
        let mut key = self.path(point.node)?;
        key.push(point.offset);
        Ok(key)
    }

    pub fn compare_points(&self, a: &Point, b: &Point) -> Result<Ordering, TreeError> {
        Ok(self.point_key(a)?.cmp(&self.point_key(b)?))
    }

    /// Deepest element (or the root) holding both ends of `range`.
    pub fn common_container(&self, range: &Range) -> Result<NodeId, TreeError> {
        let node = self
            .common_ancestor(range.start.node, range.end.node)
            .ok_or(TreeError::Detached(range.end.node))?;
        if self.is_text(node) || self.is_card(node) {
            return self.parent(node).ok_or(TreeError::Detached(node));
        }
        Ok(node)
    }
}

/// Splits `range` into sub-ranges that never cross a block or a card.
///
/// Every sub-range starts and ends in a text node, and together they cover
/// exactly the text selected by `range`, in document order. A collapsed range
/// yields nothing.
pub fn partition(tree: &Tree, range: &Range) -> Result<Vec<Range>, TreeError> {
    if range.is_collapsed() {
        return Ok(Vec::new());
    }
    let start_key = tree.point_key(&range.start)?;
    let end_key = tree.point_key(&range.end)?;
    if start_key >= end_key {
        return Ok(Vec::new());
    }

    struct Run {
        region: NodeId,
        start: Point,
        end: Point,
    }

    let mut out: Vec<Range> = Vec::new();
    let mut run: Option<Run> = None;

    for node in tree.descendants(tree.root()) {
        if tree.is_card(node) || tree.is_block(node) {
            let key = tree.point_key(&Point::new(node, 0))?;
            if key > start_key
                && key < end_key
                && let Some(done) = run.take()
            {
                out.push(Range::new(done.start, done.end));
            }
            continue;
        }

        let Some(text) = tree.text(node) else {
            continue;
        };
        let len = text.len();

        let lo = if node == range.start.node {
            clamp_to_char_boundary(text, range.start.offset)
        } else {
            if tree.point_key(&Point::new(node, len))? <= start_key {
                continue;
            }
            0
        };
        let hi = if node == range.end.node {
            clamp_to_char_boundary(text, range.end.offset)
        } else {
            if tree.point_key(&Point::new(node, 0))? >= end_key {
                break;
            }
            len
        };
        if lo >= hi {
            continue;
        }

        let region = tree.nearest_block(node);
        match run.as_mut() {
            Some(current) if current.region == region => {
                current.end = Point::new(node, hi);
            }
            _ => {
                if let Some(done) = run.take() {
                    out.push(Range::new(done.start, done.end));
                }
                run = Some(Run {
                    region,
                    start: Point::new(node, lo),
                    end: Point::new(node, hi),
                });
            }
        }
    }

    if let Some(done) = run {
        out.push(Range::new(done.start, done.end));
    }
    Ok(out)
}
