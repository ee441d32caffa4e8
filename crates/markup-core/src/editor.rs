use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{CommandError, EditorError, PolicyError, QueryError, TreeError};
use crate::plugin::{ExtensionRegistry, KeyStroke};
use crate::policy::TagPolicy;
use crate::range::{Point, Range, Selection};
use crate::scrub::{ScrubContext, Scrubber};
use crate::session::{SuppressToken, ToggleSession};
use crate::tag::Tag;
use crate::toggle::{active_tags, extract, split_up_to, toggle_range};
use crate::tree::{Fragment, FragmentNode, NodeId, NodeKind, Tree, clamp_to_char_boundary};
use crate::value::MarkupValue;

/// Fixed for the lifetime of an editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub policy: TagPolicy,
    pub default_leaf: Tag,
    pub bind_default_shortcuts: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            policy: TagPolicy::default(),
            default_leaf: Tag::P,
            bind_default_shortcuts: true,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        self.policy.validate()?;
        if !self.policy.is_leaf(&self.default_leaf) {
            return Err(PolicyError::DefaultLeafNotAllowed(self.default_leaf.clone()));
        }
        Ok(())
    }
}

/// A selection change reported by the host. `token` is set when the change
/// was caused by applying a [`SelectionUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaretEvent {
    pub selection: Option<Selection>,
    pub token: Option<SuppressToken>,
}

impl CaretEvent {
    pub fn moved(selection: Selection) -> Self {
        Self {
            selection: Some(selection),
            token: None,
        }
    }

    pub fn restored(update: &SelectionUpdate) -> Self {
        Self {
            selection: Some(update.selection),
            token: Some(update.token),
        }
    }
}

/// Selection the host should apply after an edit. The token goes back with
/// the caret event that applying it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionUpdate {
    pub selection: Selection,
    pub token: SuppressToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled(Option<SelectionUpdate>),
    Ignored,
}

pub struct Editor {
    tree: Tree,
    selection: Option<Selection>,
    session: ToggleSession,
    scrubber: Scrubber,
    registry: ExtensionRegistry,
    last_update: Option<SelectionUpdate>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        let registry = ExtensionRegistry::core(config.bind_default_shortcuts);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: EditorConfig, registry: ExtensionRegistry) -> Self {
        Self {
            tree: Tree::new(),
            selection: None,
            session: ToggleSession::new(),
            scrubber: Scrubber::new(config.policy, config.default_leaf),
            registry,
            last_update: None,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn session(&self) -> &ToggleSession {
        &self.session
    }

    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn markup(&self) -> String {
        self.tree.markup(self.tree.root())
    }

    pub fn fragment(&self) -> Fragment {
        self.tree.export_children(self.tree.root())
    }

    pub fn to_value(&self) -> MarkupValue {
        MarkupValue::from_fragment(self.fragment())
    }

    /// Runs `fragment` through the editor's scrubber without touching the
    /// document.
    pub fn scrub(&self, fragment: &[FragmentNode]) -> Fragment {
        self.scrubber.scrub(fragment)
    }

    /// Replaces the document with the scrubbed `fragment` and puts the caret
    /// at the start of the first text.
    pub fn load(&mut self, fragment: &[FragmentNode]) {
        let leaves = self.scrubber.scrub(fragment);
        debug!(leaves = leaves.len(), "loading document");
        self.tree = Tree::from_fragment(&leaves);
        self.session.reset();
        self.last_update = None;

        let root = self.tree.root();
        let caret = self
            .tree
            .descendants(root)
            .into_iter()
            .find(|&node| self.tree.is_text(node))
            .map_or(Point::new(root, 0), |text| Point::new(text, 0));
        self.selection = Some(Selection::collapsed(caret));
        self.session.set_active(active_tags(&self.tree, &caret));
    }

    pub fn load_value_json(&mut self, json: &str) -> Result<(), EditorError> {
        let value = MarkupValue::from_json_str(json)?;
        self.load(&value.into_fragment());
        Ok(())
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<(), EditorError> {
        self.on_caret_change(CaretEvent {
            selection,
            token: None,
        })
    }

    pub fn on_caret_change(&mut self, event: CaretEvent) -> Result<(), EditorError> {
        let active = match &event.selection {
            Some(selection) => {
                self.tree.path(selection.anchor.node)?;
                self.tree.path(selection.focus.node)?;
                active_tags(&self.tree, &selection.focus)
            }
            None => BTreeSet::new(),
        };
        self.selection = event.selection;
        self.session.on_caret_change(active, event.token);
        Ok(())
    }

    /// True when typing at the caret would produce text inside `tag`.
    pub fn is_active(&self, tag: &str) -> bool {
        self.session.is_active(&Tag::parse(tag))
    }

    pub fn active_tags(&self) -> BTreeSet<Tag> {
        self.session
            .active_tags()
            .union(self.session.toggled_tags())
            .filter(|tag| self.session.is_active(tag))
            .cloned()
            .collect()
    }

    /// Selection update produced by the last edit, if the host has not
    /// collected it yet.
    pub fn take_selection_update(&mut self) -> Option<SelectionUpdate> {
        self.last_update.take()
    }

    /// Toggles an inline tag. Over a selection the tree is rewritten; at a
    /// collapsed caret the tag is queued for the next typed text.
    pub fn toggle_inline(&mut self, tag: &str) -> Result<Option<SelectionUpdate>, EditorError> {
        let Some(selection) = self.selection else {
            trace!(tag, "toggle without selection");
            return Ok(None);
        };
        let tag = Tag::parse(tag);
        if tag.looks_block() {
            debug!(tag = %tag, "refusing to toggle a block tag");
            return Ok(None);
        }

        let range = Range::from_selection(&self.tree, &selection)?;
        let update = if range.is_collapsed() {
            let token = self.session.on_toggle_request(tag);
            SelectionUpdate { selection, token }
        } else {
            let Some(restored) = toggle_range(&mut self.tree, &range, &tag)? else {
                return Ok(None);
            };
            self.restore_selection(Selection::from(restored))
        };
        self.last_update = Some(update);
        Ok(Some(update))
    }

    /// Types `text` at the caret, replacing any selected content, then wraps
    /// it in every tag queued by a collapsed toggle.
    pub fn insert_text(&mut self, text: &str) -> Result<Option<SelectionUpdate>, EditorError> {
        let Some(selection) = self.selection else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }

        let range = Range::from_selection(&self.tree, &selection)?;
        let caret = if range.is_collapsed() {
            range.start
        } else {
            self.delete_range(&range)?
        };

        let (node, start, end) = self.insert_at(caret, text)?;
        let pending = self.session.on_character_inserted();
        let mut inserted = Range::new(Point::new(node, start), Point::new(node, end));
        for tag in &pending {
            if let Some(covered) = toggle_range(&mut self.tree, &inserted, tag)? {
                inserted = covered;
            }
        }
        if !pending.is_empty() {
            debug!(tags = ?pending, "applied pending toggles to typed text");
        }

        let caret = text_point_before(&self.tree, inserted.end);
        let update = self.restore_selection(Selection::collapsed(caret));
        self.last_update = Some(update);
        Ok(Some(update))
    }

    /// Scrubs `fragment` and inserts it at the selection. Inside a list item
    /// the content stays inline; elsewhere it lands as whole leaves, except
    /// that plain inline content flows into the current block.
    pub fn paste(
        &mut self,
        fragment: &[FragmentNode],
    ) -> Result<Option<SelectionUpdate>, EditorError> {
        let Some(selection) = self.selection else {
            return Ok(None);
        };
        let range = Range::from_selection(&self.tree, &selection)?;
        let caret = if range.is_collapsed() {
            range.start
        } else {
            self.delete_range(&range)?
        };

        let list_item = self
            .tree
            .closest(caret.node, |tree, node| tree.has_tag(node, &Tag::Li), |_, _| false);

        let (container, content) = match list_item {
            Some(li) => (li, self.scrubber.scrub_in(fragment, ScrubContext::ListItem)),
            None => {
                let leaves = self.scrubber.scrub(fragment);
                let block = if self.tree.is_block(caret.node) {
                    caret.node
                } else {
                    self.tree.nearest_block(caret.node)
                };
                match self.inline_run(&leaves) {
                    Some(inline) if block != self.tree.root() => (block, inline),
                    _ => (self.tree.root(), leaves),
                }
            }
        };
        if content.is_empty() {
            trace!("nothing left to paste after scrubbing");
            return Ok(None);
        }
        debug!(nodes = content.len(), list_item = list_item.is_some(), "pasting");

        let ix = if caret.node == container {
            caret.offset.min(self.tree.children(container).len())
        } else {
            split_up_to(&mut self.tree, &caret, container)?
        };
        for (offset, node) in content.iter().enumerate() {
            let id = self.tree.import(node);
            self.tree.insert(container, ix + offset, id)?;
        }
        self.drop_empty_blocks(container);

        let last = self.tree.children(container).get(ix + content.len() - 1).copied();
        let end = match last {
            Some(last) => Point::after(&self.tree, last)?,
            None => Point::new(container, self.tree.children(container).len()),
        };
        let caret = text_point_before(&self.tree, end);
        let update = self.restore_selection(Selection::collapsed(caret));
        self.last_update = Some(update);
        Ok(Some(update))
    }

    pub fn on_key(&mut self, stroke: &KeyStroke) -> Result<KeyOutcome, CommandError> {
        if let Some(shortcut) = self.registry.shortcut_for(stroke) {
            trace!(command = %shortcut.command, "shortcut");
            self.last_update = None;
            self.run_command(&shortcut.command, shortcut.args)?;
            return Ok(KeyOutcome::Handled(self.take_selection_update()));
        }
        match stroke.typed_text() {
            Some(text) => {
                let update = self.insert_text(text)?;
                self.last_update = None;
                Ok(KeyOutcome::Handled(update))
            }
            None => Ok(KeyOutcome::Ignored),
        }
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn restore_selection(&mut self, selection: Selection) -> SelectionUpdate {
        self.selection = Some(selection);
        self.session
            .set_active(active_tags(&self.tree, &selection.focus));
        let token = self.session.issue_token();
        SelectionUpdate { selection, token }
    }

    /// Removes the selected content and returns the collapsed caret.
    ///
    /// When whole blocks went, the caret lands at the start of the block that
    /// followed the selection, or in a fresh default leaf if none did.
    fn delete_range(&mut self, range: &Range) -> Result<Point, EditorError> {
        let root = self.tree.root();
        let container = self.tree.common_container(range)?;
        let (ix, removed) = extract(&mut self.tree, range, container)?;
        trace!(nodes = removed.len(), "deleted selection");

        let crossed_blocks =
            container == root || removed.iter().any(|&node| self.tree.is_block(node));
        if crossed_blocks {
            if let Some(&tail) = self.tree.children(container).get(ix) {
                return Ok(text_point_at_start(&self.tree, tail)?);
            }
            if container == root {
                let leaf = self.tree.create_element(self.scrubber.default_leaf().clone());
                self.tree.insert(root, ix, leaf)?;
                return Ok(Point::new(leaf, 0));
            }
        }
        Ok(text_point_before(&self.tree, Point::new(container, ix)))
    }

    /// Children of `leaves` when it is a single default leaf without
    /// attributes, i.e. content that was inline to begin with.
    fn inline_run(&self, leaves: &[FragmentNode]) -> Option<Fragment> {
        match leaves {
            [FragmentNode::Element(el)]
                if &el.tag == self.scrubber.default_leaf() && el.attrs.is_empty() =>
            {
                Some(el.children.clone())
            }
            _ => None,
        }
    }

    fn drop_empty_blocks(&mut self, container: NodeId) {
        let root = self.tree.root();
        if container != root {
            return;
        }
        for block in self.tree.children(root).to_vec() {
            if self.tree.is_empty(block) {
                self.tree.detach(block);
            }
        }
    }

    /// Inserts `text` at `caret`. Returns the text node holding it and the
    /// byte span it occupies there.
    fn insert_at(
        &mut self,
        caret: Point,
        text: &str,
    ) -> Result<(NodeId, usize, usize), EditorError> {
        let (parent, ix) = match self.tree.kind(caret.node) {
            Some(NodeKind::Text(existing)) => {
                let at = clamp_to_char_boundary(existing, caret.offset);
                if let Some(existing) = self.tree.text_mut(caret.node) {
                    existing.insert_str(at, text);
                }
                return Ok((caret.node, at, at + text.len()));
            }
            Some(NodeKind::Card { .. }) => {
                let anchor = if caret.offset == 0 {
                    Point::before(&self.tree, caret.node)?
                } else {
                    Point::after(&self.tree, caret.node)?
                };
                (anchor.node, anchor.offset)
            }
            Some(_) => (
                caret.node,
                caret.offset.min(self.tree.children(caret.node).len()),
            ),
            None => return Err(TreeError::UnknownNode(caret.node).into()),
        };

        if parent == self.tree.root() {
            let leaf = self.tree.create_element(self.scrubber.default_leaf().clone());
            let node = self.tree.create_text(text);
            self.tree.append(leaf, node)?;
            self.tree.insert(parent, ix, leaf)?;
            return Ok((node, 0, text.len()));
        }

        let children = self.tree.children(parent);
        let before = ix.checked_sub(1).and_then(|i| children.get(i).copied());
        let after = children.get(ix).copied();
        if let Some(prev) = before.filter(|&n| self.tree.is_text(n)) {
            let start = self.tree.node_len(prev);
            if let Some(existing) = self.tree.text_mut(prev) {
                existing.push_str(text);
            }
            return Ok((prev, start, start + text.len()));
        }
        if let Some(next) = after.filter(|&n| self.tree.is_text(n)) {
            if let Some(existing) = self.tree.text_mut(next) {
                existing.insert_str(0, text);
            }
            return Ok((next, 0, text.len()));
        }
        let node = self.tree.create_text(text);
        self.tree.insert(parent, ix, node)?;
        Ok((node, 0, text.len()))
    }
}

/// Start of the first text in `node`. Cards and void elements yield the
/// point just before them.
fn text_point_at_start(tree: &Tree, node: NodeId) -> Result<Point, TreeError> {
    let mut node = node;
    loop {
        if tree.is_text(node) {
            return Ok(Point::new(node, 0));
        }
        if tree.is_card(node) || tree.tag(node).is_some_and(Tag::is_void) {
            return Point::before(tree, node);
        }
        match tree.children(node).first() {
            Some(&first) => node = first,
            None => return Ok(Point::new(node, 0)),
        }
    }
}

/// Moves an element point onto the end of the text just before it, so typing
/// continues inside the formatting that precedes the caret.
fn text_point_before(tree: &Tree, point: Point) -> Point {
    if tree.is_text(point.node) || point.offset == 0 {
        return point;
    }
    let Some(&child) = tree.children(point.node).get(point.offset - 1) else {
        return point;
    };
    let mut node = child;
    loop {
        if tree.is_text(node) {
            return Point::new(node, tree.node_len(node));
        }
        if tree.is_card(node) || tree.tag(node).is_some_and(Tag::is_void) {
            return point;
        }
        match tree.children(node).last() {
            Some(&last) => node = last,
            None => return Point::new(node, 0),
        }
    }
}
