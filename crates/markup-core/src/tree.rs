use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::tag::Tag;

pub type Attrs = BTreeMap<String, String>;

/// Stable handle into a [`Tree`]. Handles stay valid after a node is
/// detached; the slot is simply no longer reachable from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element { tag: Tag, attrs: Attrs },
    Text(String),
    /// Opaque embed. Never split, never recursed into.
    Card { kind: String, attrs: Attrs },
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Owned node value used to hand content across the editor boundary
/// (initial load, paste) and to snapshot subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FragmentNode {
    Element(ElementValue),
    Text(TextValue),
    Card(CardValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementValue {
    pub tag: Tag,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<FragmentNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardValue {
    pub kind: String,
    #[serde(default)]
    pub attrs: Attrs,
}

pub type Fragment = Vec<FragmentNode>;

impl FragmentNode {
    pub fn element(tag: impl Into<Tag>, children: Vec<FragmentNode>) -> Self {
        FragmentNode::Element(ElementValue {
            tag: tag.into(),
            attrs: Attrs::default(),
            children,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        FragmentNode::Text(TextValue { text: text.into() })
    }

    pub fn card(kind: impl Into<String>) -> Self {
        FragmentNode::Card(CardValue {
            kind: kind.into(),
            attrs: Attrs::default(),
        })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::element(Tag::P, vec![Self::text(text)])
    }

    /// Adds an attribute. No-op on text nodes.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            FragmentNode::Element(el) => {
                el.attrs.insert(name.into(), value.into());
            }
            FragmentNode::Card(card) => {
                card.attrs.insert(name.into(), value.into());
            }
            FragmentNode::Text(_) => {}
        }
        self
    }
}

impl From<Tag> for NodeKind {
    fn from(tag: Tag) -> Self {
        NodeKind::Element {
            tag,
            attrs: Attrs::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Slot>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    pub fn from_fragment(fragment: &[FragmentNode]) -> Self {
        let mut tree = Self::new();
        let root = tree.root;
        for node in fragment {
            let id = tree.import(node);
            tree.slots[root.0].children.push(id);
            tree.slots[id.0].parent = Some(root);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        self.slots.get(id.0).ok_or(TreeError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, TreeError> {
        self.slots.get_mut(id.0).ok_or(TreeError::UnknownNode(id))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Node slots handed out so far, attached or not.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn create_element(&mut self, tag: Tag) -> NodeId {
        self.alloc(tag.into())
    }

    pub fn create_element_with_attrs(&mut self, tag: Tag, attrs: Attrs) -> NodeId {
        self.alloc(NodeKind::Element { tag, attrs })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_card(&mut self, kind: impl Into<String>, attrs: Attrs) -> NodeId {
        self.alloc(NodeKind::Card {
            kind: kind.into(),
            attrs,
        })
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.slots.get(id.0).map(|slot| &slot.kind)
    }

    pub fn tag(&self, id: NodeId) -> Option<&Tag> {
        match self.kind(id)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> Option<&Attrs> {
        match self.kind(id)? {
            NodeKind::Element { attrs, .. } | NodeKind::Card { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id)? {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
        match self.slots.get_mut(id.0).map(|slot| &mut slot.kind)? {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(id.0)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let ix = self.index_of(id)?;
        ix.checked_sub(1)
            .and_then(|ix| self.children(parent).get(ix).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let ix = self.index_of(id)?;
        self.children(parent).get(ix + 1).copied()
    }

    /// Length of a point-addressable node: bytes for text, child count otherwise.
    pub fn node_len(&self, id: NodeId) -> usize {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => text.len(),
            _ => self.children(id).len(),
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    pub fn is_card(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Card { .. }))
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(Tag::looks_block)
    }

    pub fn is_inline(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(|tag| !tag.looks_block())
    }

    pub fn is_list(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(Tag::is_list)
    }

    pub fn has_tag(&self, id: NodeId, tag: &Tag) -> bool {
        self.tag(id) == Some(tag)
    }

    fn can_hold_children(&self, id: NodeId) -> bool {
        match self.kind(id) {
            Some(NodeKind::Root) => true,
            Some(NodeKind::Element { tag, .. }) => !tag.is_void(),
            _ => false,
        }
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Child-index path from the root. Errors when the node is detached.
    pub fn path(&self, id: NodeId) -> Result<Vec<usize>, TreeError> {
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            let parent = self.parent(current).ok_or(TreeError::Detached(id))?;
            let ix = self
                .children(parent)
                .iter()
                .position(|&child| child == current)
                .ok_or(TreeError::Detached(id))?;
            path.push(ix);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Ancestor-or-self search. Returns the first node matching `pred`,
    /// giving up once a node matching `stop` has been checked.
    pub fn closest(
        &self,
        id: NodeId,
        pred: impl Fn(&Tree, NodeId) -> bool,
        stop: impl Fn(&Tree, NodeId) -> bool,
    ) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if pred(self, node) {
                return Some(node);
            }
            if node == self.root || stop(self, node) {
                return None;
            }
            current = self.parent(node);
        }
        None
    }

    /// Nearest enclosing element carrying `tag`, without leaving the block.
    pub fn closest_tag(&self, id: NodeId, tag: &Tag) -> Option<NodeId> {
        self.closest(id, |tree, node| tree.has_tag(node, tag), Tree::is_block)
    }

    /// Block (or the root) that delimits the inline region holding `id`.
    pub fn nearest_block(&self, id: NodeId) -> NodeId {
        let start = self.parent(id).unwrap_or(id);
        self.closest(
            start,
            |tree, node| node == tree.root || tree.is_block(node),
            |_, _| false,
        )
        .unwrap_or(self.root)
    }

    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut chain = vec![a];
        chain.extend(self.ancestors(a));
        let mut current = Some(b);
        while let Some(node) = current {
            if chain.contains(&node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).contains(&ancestor)
    }

    /// True when nothing visible lives below `id`. Void elements and cards
    /// count as content.
    pub fn is_empty(&self, id: NodeId) -> bool {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => text.is_empty(),
            Some(NodeKind::Card { .. }) | None => false,
            Some(NodeKind::Element { tag, .. }) if tag.is_void() => false,
            Some(_) => self
                .children(id)
                .iter()
                .all(|&child| self.is_empty(child)),
        }
    }

    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), TreeError> {
        if !self.can_hold_children(parent) {
            return Err(TreeError::NotAContainer(parent));
        }
        self.slot(child)?;
        self.detach(child);
        let len = self.children(parent).len();
        if index > len {
            return Err(TreeError::OffsetOutOfBounds {
                node: parent,
                offset: index,
                len,
            });
        }
        self.slot_mut(parent)?.children.insert(index, child);
        self.slot_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.slot(child)?;
        self.detach(child);
        let len = self.children(parent).len();
        self.insert(parent, len, child)
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<(), TreeError> {
        let parent = self.parent(reference).ok_or(TreeError::Detached(reference))?;
        self.detach(node);
        let ix = self.index_of(reference).ok_or(TreeError::Detached(reference))?;
        self.insert(parent, ix + 1, node)
    }

    /// Removes `id` from its parent. Returns the index it occupied.
    pub fn detach(&mut self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let ix = self.index_of(id)?;
        self.slots[parent.0].children.remove(ix);
        self.slots[id.0].parent = None;
        Some(ix)
    }

    /// Moves every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> Result<(), TreeError> {
        let children = self.children(from).to_vec();
        for child in children {
            self.append(to, child)?;
        }
        Ok(())
    }

    /// Replaces `id` with its own children, in place. Returns the hoisted
    /// children.
    pub fn replace_with_children(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let parent = self.parent(id).ok_or(TreeError::Detached(id))?;
        let ix = self.index_of(id).ok_or(TreeError::Detached(id))?;
        let children = self.children(id).to_vec();
        for (offset, &child) in children.iter().enumerate() {
            self.insert(parent, ix + 1 + offset, child)?;
        }
        self.detach(id);
        Ok(children)
    }

    /// Splits a text node at `offset`. The original keeps the head; the tail
    /// becomes a new sibling, which is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, TreeError> {
        let text = self.text(id).ok_or(TreeError::NotAContainer(id))?;
        if offset > text.len() {
            return Err(TreeError::OffsetOutOfBounds {
                node: id,
                offset,
                len: text.len(),
            });
        }
        let offset = clamp_to_char_boundary(text, offset);
        let tail = text[offset..].to_string();
        if let Some(text) = self.text_mut(id) {
            text.truncate(offset);
        }
        let tail = self.create_text(tail);
        self.insert_after(id, tail)?;
        Ok(tail)
    }

    /// Splits an element before child `index`. A shallow clone carrying the
    /// children from `index` on is inserted after the original and returned.
    pub fn split_element(&mut self, id: NodeId, index: usize) -> Result<NodeId, TreeError> {
        let kind = match self.kind(id) {
            Some(kind @ NodeKind::Element { .. }) => kind.clone(),
            Some(_) => return Err(TreeError::NotAContainer(id)),
            None => return Err(TreeError::UnknownNode(id)),
        };
        let tail_children = self.children(id).get(index..).unwrap_or(&[]).to_vec();
        let clone = self.alloc(kind);
        for child in tail_children {
            self.append(clone, child)?;
        }
        self.insert_after(id, clone)?;
        Ok(clone)
    }

    /// Pre-order walk below `id`, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(text) = self.text(id) {
            out.push_str(text);
        }
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Attaches a copy of `node` (and its subtree) as a detached node.
    pub fn import(&mut self, node: &FragmentNode) -> NodeId {
        match node {
            FragmentNode::Text(t) => self.create_text(t.text.clone()),
            FragmentNode::Card(card) => self.create_card(card.kind.clone(), card.attrs.clone()),
            FragmentNode::Element(el) => {
                let id = self.create_element_with_attrs(el.tag.clone(), el.attrs.clone());
                for child in &el.children {
                    let child = self.import(child);
                    self.slots[id.0].children.push(child);
                    self.slots[child.0].parent = Some(id);
                }
                id
            }
        }
    }

    pub fn export(&self, id: NodeId) -> Option<FragmentNode> {
        match self.kind(id)? {
            NodeKind::Root => None,
            NodeKind::Text(text) => Some(FragmentNode::text(text.clone())),
            NodeKind::Card { kind, attrs } => Some(FragmentNode::Card(CardValue {
                kind: kind.clone(),
                attrs: attrs.clone(),
            })),
            NodeKind::Element { tag, attrs } => Some(FragmentNode::Element(ElementValue {
                tag: tag.clone(),
                attrs: attrs.clone(),
                children: self.export_children(id),
            })),
        }
    }

    pub fn export_children(&self, id: NodeId) -> Fragment {
        self.children(id)
            .iter()
            .filter_map(|&child| self.export(child))
            .collect()
    }

    /// HTML-like rendering of the subtree below `id`, for assertions and
    /// logs. Adjacent text nodes render as one run.
    pub fn markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        match self.kind(id) {
            Some(NodeKind::Root) => {
                for &child in self.children(id) {
                    self.write_markup(child, &mut out);
                }
            }
            Some(_) => self.write_markup(id, &mut out),
            None => {}
        }
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => escape_into(text, out),
            Some(NodeKind::Card { kind, attrs }) => {
                out.push_str("<card kind=\"");
                escape_into(kind, out);
                out.push('"');
                write_attrs(attrs, out);
                out.push_str("/>");
            }
            Some(NodeKind::Element { tag, attrs }) => {
                out.push('<');
                out.push_str(tag.name());
                write_attrs(attrs, out);
                out.push('>');
                if tag.is_void() {
                    return;
                }
                for &child in self.children(id) {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(tag.name());
                out.push('>');
            }
            Some(NodeKind::Root) => {
                for &child in self.children(id) {
                    self.write_markup(child, out);
                }
            }
            None => {}
        }
    }
}

/// Renders a detached fragment the same way [`Tree::markup`] renders a
/// subtree.
pub fn fragment_markup(fragment: &[FragmentNode]) -> String {
    let tree = Tree::from_fragment(fragment);
    tree.markup(tree.root())
}

fn write_attrs(attrs: &Attrs, out: &mut String) {
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(value, out);
        out.push('"');
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}
