use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::error::TreeError;
use crate::range::{Point, Range, partition};
use crate::tag::Tag;
use crate::tree::{NodeId, NodeKind, Tree, clamp_to_char_boundary};

/// Whether a toggle over a selection adds or strips the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Apply,
    Remove,
}

/// Decides apply vs remove once for the whole selection, from its start:
/// apply unless the start sits inside a matching element or the start
/// container itself holds one.
pub fn toggle_mode(tree: &Tree, range: &Range, tag: &Tag) -> ToggleMode {
    let start = range.start.node;
    let enclosed = tree.closest_tag(start, tag).is_some();
    let nested = tree
        .descendants(start)
        .into_iter()
        .any(|node| tree.has_tag(node, tag));
    if enclosed || nested {
        ToggleMode::Remove
    } else {
        ToggleMode::Apply
    }
}

/// Inline tags wrapping `point`, up to its block.
pub fn active_tags(tree: &Tree, point: &Point) -> BTreeSet<Tag> {
    let mut out = BTreeSet::new();
    let mut current = Some(point.node);
    while let Some(node) = current {
        if node == tree.root() || tree.is_block(node) {
            break;
        }
        if let Some(tag) = tree.tag(node)
            && tag.is_inline()
        {
            out.insert(tag.clone());
        }
        current = tree.parent(node);
    }
    out
}

/// Toggles `tag` over a non-collapsed `range`.
///
/// Returns the range to restore as the selection, or `None` when there was
/// nothing to toggle.
pub fn toggle_range(
    tree: &mut Tree,
    range: &Range,
    tag: &Tag,
) -> Result<Option<Range>, TreeError> {
    let parts = partition(tree, range)?;
    if parts.is_empty() {
        return Ok(None);
    }

    let mode = toggle_mode(tree, range, tag);
    debug!(tag = %tag, ?mode, parts = parts.len(), "toggle inline");

    let mut covered: Vec<(NodeId, NodeId)> = Vec::with_capacity(parts.len());
    for part in &parts {
        let span = match mode {
            ToggleMode::Apply => apply(tree, part, tag)?,
            ToggleMode::Remove => unapply(tree, part, tag)?,
        };
        covered.extend(span);
    }

    let (Some(&(first, _)), Some(&(_, last))) = (covered.first(), covered.last()) else {
        return Ok(None);
    };
    let first = first_leaf(tree, first);
    let last = last_leaf(tree, last);

    let spanning = Range::new(Point::before(tree, first)?, Point::after(tree, last)?);
    let container = tree.common_container(&spanning)?;
    remove_empty_matches(tree, container, tag);
    merge_equal_siblings(tree, container)?;

    Ok(Some(Range::new(
        Point::before(tree, first)?,
        Point::after(tree, last)?,
    )))
}

fn apply(
    tree: &mut Tree,
    part: &Range,
    tag: &Tag,
) -> Result<Option<(NodeId, NodeId)>, TreeError> {
    let container = tree.common_container(part)?;
    let (index, nodes) = extract(tree, part, container)?;

    let wrapper = tree.create_element(tag.clone());
    for node in nodes {
        tree.append(wrapper, node)?;
    }
    tree.insert(container, index, wrapper)?;

    let content = merge_contiguous(tree, tag, wrapper)?;
    Ok(content.first().copied().zip(content.last().copied()))
}

/// Strips `tag` from `part`.
///
/// Ancestors between the range and the enclosing match survive: the split
/// clones every partially covered ancestor, so `<b><i>x</i></b>` loses only
/// the bold. The enclosing match keeps whatever lies outside the range on
/// either side; the covered middle is unwrapped in place.
pub fn unapply(
    tree: &mut Tree,
    part: &Range,
    tag: &Tag,
) -> Result<Option<(NodeId, NodeId)>, TreeError> {
    let container = tree.common_container(part)?;
    let target = match tree.closest_tag(part.start.node, tag) {
        Some(enclosing) if tree.contains(enclosing, container) => {
            tree.parent(enclosing).ok_or(TreeError::Detached(enclosing))?
        }
        _ => container,
    };

    let (start, end) = isolate(tree, part, target)?;
    let after = tree.children(target).get(end).copied();
    let covered = tree.children(target).get(start..end).unwrap_or(&[]).to_vec();
    for node in covered {
        let mut matches = vec![node];
        matches.extend(tree.descendants(node));
        for node in matches {
            if tree.has_tag(node, tag) {
                tree.replace_with_children(node)?;
            }
        }
    }

    let end = match after {
        Some(marker) => tree.index_of(marker).ok_or(TreeError::Detached(marker))?,
        None => tree.children(target).len(),
    };
    let cleaned = tree.children(target).get(start..end).unwrap_or(&[]);
    trace!(tag = %tag, nodes = cleaned.len(), "unapplied");
    Ok(cleaned.first().copied().zip(cleaned.last().copied()))
}

/// Normalizes duplicate instances of `tag` around a freshly wrapped element
/// and returns the wrapped content nodes that are still attached.
///
/// An element that lands inside an enclosing match of its own tag is
/// dissolved into it, so the tag never nests.
pub fn merge_contiguous(
    tree: &mut Tree,
    tag: &Tag,
    element: NodeId,
) -> Result<Vec<NodeId>, TreeError> {
    for node in tree.descendants(element) {
        if tree.has_tag(node, tag) {
            tree.replace_with_children(node)?;
        }
    }
    let content = tree.children(element).to_vec();

    let mut element = element;
    if let Some(parent) = tree.parent(element)
        && tree.closest_tag(parent, tag).is_some()
    {
        tree.replace_with_children(element)?;
        return Ok(connected(tree, content));
    }

    if let Some(previous) = adjacent_match(tree, element, tag, Side::Before) {
        tree.move_children(element, previous)?;
        tree.detach(element);
        element = previous;
    }
    if let Some(next) = adjacent_match(tree, element, tag, Side::After) {
        tree.move_children(next, element)?;
        tree.detach(next);
    }

    Ok(connected(tree, content))
}

fn connected(tree: &Tree, nodes: Vec<NodeId>) -> Vec<NodeId> {
    nodes
        .into_iter()
        .filter(|&node| tree.is_connected(node))
        .collect()
}

#[derive(Clone, Copy)]
enum Side {
    Before,
    After,
}

/// Sibling of `element` on `side` that carries the same tag and attributes,
/// looking past empty text nodes. Skipped empties are dropped on a match.
fn adjacent_match(tree: &mut Tree, element: NodeId, tag: &Tag, side: Side) -> Option<NodeId> {
    let attrs = tree.attrs(element).cloned();
    let mut skipped = Vec::new();
    let mut current = element;
    loop {
        let sibling = match side {
            Side::Before => tree.previous_sibling(current),
            Side::After => tree.next_sibling(current),
        }?;
        if tree.text(sibling).is_some_and(str::is_empty) {
            skipped.push(sibling);
            current = sibling;
            continue;
        }
        if tree.has_tag(sibling, tag) && tree.attrs(sibling).cloned() == attrs {
            for node in skipped {
                tree.detach(node);
            }
            return Some(sibling);
        }
        return None;
    }
}

/// Detaches every empty `tag` element below `container`.
pub fn remove_empty_matches(tree: &mut Tree, container: NodeId, tag: &Tag) {
    for node in tree.descendants(container) {
        if tree.has_tag(node, tag) && tree.is_empty(node) {
            tree.detach(node);
        }
    }
}

/// Folds adjacent inline siblings with the same tag and attributes anywhere
/// below `container`, undoing the element splits a toggle leaves behind.
pub fn merge_equal_siblings(tree: &mut Tree, container: NodeId) -> Result<(), TreeError> {
    let mut parents = vec![container];
    parents.extend(tree.descendants(container));
    for parent in parents {
        if !tree.is_connected(parent) {
            continue;
        }
        let mut ix = 1;
        while let (Some(&previous), Some(&node)) = (
            tree.children(parent).get(ix - 1),
            tree.children(parent).get(ix),
        ) {
            if same_inline_element(tree, previous, node) {
                tree.move_children(node, previous)?;
                tree.detach(node);
            } else {
                ix += 1;
            }
        }
    }
    Ok(())
}

fn same_inline_element(tree: &Tree, a: NodeId, b: NodeId) -> bool {
    match (tree.kind(a), tree.kind(b)) {
        (
            Some(NodeKind::Element { tag, attrs }),
            Some(NodeKind::Element {
                tag: other_tag,
                attrs: other_attrs,
            }),
        ) => tag.is_inline() && !tag.is_void() && tag == other_tag && attrs == other_attrs,
        _ => false,
    }
}

fn first_leaf(tree: &Tree, mut node: NodeId) -> NodeId {
    while let Some(&child) = tree.children(node).first() {
        node = child;
    }
    node
}

fn last_leaf(tree: &Tree, mut node: NodeId) -> NodeId {
    while let Some(&child) = tree.children(node).last() {
        node = child;
    }
    node
}

/// Cuts the content of `range` out of `container`.
///
/// The covered children found by [`isolate`] are detached and returned along
/// with the index they were taken from.
pub fn extract(
    tree: &mut Tree,
    range: &Range,
    container: NodeId,
) -> Result<(usize, Vec<NodeId>), TreeError> {
    let (start, end) = isolate(tree, range, container)?;
    let nodes = tree
        .children(container)
        .get(start..end)
        .unwrap_or(&[])
        .to_vec();
    for &node in &nodes {
        tree.detach(node);
    }
    Ok((start, nodes))
}

/// Splits every element between a boundary of `range` and `container` so the
/// range covers whole children of `container`, and returns their index span.
/// Splits never leave an empty half behind.
pub(crate) fn isolate(
    tree: &mut Tree,
    range: &Range,
    container: NodeId,
) -> Result<(usize, usize), TreeError> {
    let end_ix = split_up_to(tree, &range.end, container)?;
    let end_marker = tree.children(container).get(end_ix).copied();
    let start_ix = split_up_to(tree, &range.start, container)?;
    let end_ix = match end_marker {
        Some(marker) => tree.index_of(marker).ok_or(TreeError::Detached(marker))?,
        None => tree.children(container).len(),
    };
    Ok((start_ix, end_ix.max(start_ix)))
}

/// Turns `point` into a child index of `container`, splitting the text node
/// and every element on the way up.
pub(crate) fn split_up_to(
    tree: &mut Tree,
    point: &Point,
    container: NodeId,
) -> Result<usize, TreeError> {
    let node = point.node;
    let (mut parent, mut ix) = match tree.kind(node) {
        Some(NodeKind::Text(text)) => {
            let len = text.len();
            let offset = clamp_to_char_boundary(text, point.offset);
            let parent = tree.parent(node).ok_or(TreeError::Detached(node))?;
            let ix = tree.index_of(node).ok_or(TreeError::Detached(node))?;
            if offset == 0 {
                (parent, ix)
            } else if offset >= len {
                (parent, ix + 1)
            } else {
                tree.split_text(node, offset)?;
                (parent, ix + 1)
            }
        }
        Some(NodeKind::Card { .. }) => {
            let parent = tree.parent(node).ok_or(TreeError::Detached(node))?;
            let ix = tree.index_of(node).ok_or(TreeError::Detached(node))?;
            (parent, if point.offset == 0 { ix } else { ix + 1 })
        }
        Some(_) => (node, point.offset.min(tree.children(node).len())),
        None => return Err(TreeError::UnknownNode(node)),
    };

    while parent != container {
        let grand = tree.parent(parent).ok_or(TreeError::Detached(parent))?;
        let at = tree.index_of(parent).ok_or(TreeError::Detached(parent))?;
        let len = tree.children(parent).len();
        ix = if ix == 0 {
            at
        } else if ix >= len {
            at + 1
        } else {
            tree.split_element(parent, ix)?;
            at + 1
        };
        parent = grand;
    }
    Ok(ix)
}
