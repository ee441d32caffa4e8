//! Content normalizer.
//!
//! [`Scrubber`] rewrites an arbitrary fragment into one that obeys a
//! [`TagPolicy`]: policy leaves at the top level, only text and policy
//! children below them, policy-approved attributes only, and no empty
//! elements apart from void tags. It is a single depth-first pass over the
//! input with a stack of open output elements whose bottom frame is the
//! current leaf. Output order equals input order and emitted nodes are never
//! revisited.

use tracing::trace;

use crate::policy::TagPolicy;
use crate::tag::Tag;
use crate::tree::{Attrs, CardValue, ElementValue, Fragment, FragmentNode, TextValue};

/// Where the scrubbed content is going to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrubContext {
    /// Between top-level blocks.
    #[default]
    Root,
    /// Inline, inside an existing list item. The output is the inline content
    /// for that item rather than a sequence of leaves.
    ListItem,
}

#[derive(Debug, Clone)]
pub struct Scrubber {
    policy: TagPolicy,
    default_leaf: Tag,
}

impl Default for Scrubber {
    fn default() -> Self {
        Self::new(TagPolicy::default(), Tag::P)
    }
}

impl Scrubber {
    pub fn new(policy: TagPolicy, default_leaf: Tag) -> Self {
        Self {
            policy,
            default_leaf,
        }
    }

    pub fn policy(&self) -> &TagPolicy {
        &self.policy
    }

    pub fn default_leaf(&self) -> &Tag {
        &self.default_leaf
    }

    pub fn scrub(&self, fragment: &[FragmentNode]) -> Fragment {
        self.scrub_in(fragment, ScrubContext::Root)
    }

    /// Scrubs `fragment` for insertion at `context`. Blank top-level nodes
    /// are skipped between leaves; inside a list item whitespace is content.
    pub fn scrub_in(&self, fragment: &[FragmentNode], context: ScrubContext) -> Fragment {
        let mut pass = Pass::new(self, context);
        for node in fragment {
            if context == ScrubContext::Root && !is_meaningful(node) {
                continue;
            }
            pass.visit(node);
        }
        pass.finish()
    }
}

struct Frame {
    id: usize,
    tag: Tag,
    attrs: Attrs,
    children: Vec<FragmentNode>,
}

struct Pass<'a> {
    scrubber: &'a Scrubber,
    out: Fragment,
    stack: Vec<Frame>,
    /// Frames below this depth belong to the insertion context and are never
    /// closed by the pass.
    floor: usize,
    next_id: usize,
}

impl<'a> Pass<'a> {
    fn new(scrubber: &'a Scrubber, context: ScrubContext) -> Self {
        let mut pass = Self {
            scrubber,
            out: Vec::new(),
            stack: Vec::new(),
            floor: 0,
            next_id: 0,
        };
        if context == ScrubContext::ListItem {
            pass.open(Tag::Li, Attrs::new());
            pass.floor = 1;
        }
        pass
    }

    fn policy(&self) -> &TagPolicy {
        &self.scrubber.policy
    }

    fn in_list_item(&self) -> bool {
        self.stack.iter().any(|frame| frame.tag == Tag::Li)
    }

    /// Depth just above the innermost open list item.
    fn item_depth(&self) -> usize {
        self.stack
            .iter()
            .rposition(|frame| frame.tag == Tag::Li)
            .map_or(self.floor, |ix| ix + 1)
    }

    /// An inline `tag` is already open within the current block.
    fn inline_open(&self, tag: &Tag) -> bool {
        self.stack
            .iter()
            .rev()
            .take_while(|frame| !frame.tag.is_block())
            .any(|frame| frame.tag == *tag)
    }

    fn visit(&mut self, node: &FragmentNode) {
        match node {
            FragmentNode::Card(card) => self.promote_card(card),
            FragmentNode::Text(text) => self.push_text(&text.text),
            FragmentNode::Element(el) => {
                let tag = &el.tag;
                // A list item only nests directly under an open list.
                let under_list = self.stack.last().is_some_and(|frame| frame.tag.is_list());
                let is_child = self.policy().is_child(tag) && (*tag != Tag::Li || under_list);
                let is_leaf = self.policy().is_leaf(tag) || (!is_child && tag.looks_block());
                if tag.is_list() {
                    if self.in_list_item() {
                        self.close_to(self.item_depth());
                        self.nest(el);
                    } else {
                        self.promote(el);
                    }
                } else if is_leaf {
                    if self.in_list_item() {
                        self.visit_children(&el.children);
                    } else {
                        self.promote(el);
                    }
                } else if is_child && !(tag.is_inline() && self.inline_open(tag)) {
                    self.nest(el);
                } else {
                    trace!(tag = %tag, "unwrapping transparent element");
                    self.visit_children(&el.children);
                }
            }
        }
    }

    fn visit_children(&mut self, children: &[FragmentNode]) {
        for child in children {
            self.visit(child);
        }
    }

    fn promote_card(&mut self, card: &CardValue) {
        self.close_to(self.floor);
        let node = FragmentNode::Card(card.clone());
        match self.stack.last_mut() {
            Some(host) => host.children.push(node),
            None => self.out.push(node),
        }
    }

    fn promote(&mut self, el: &ElementValue) {
        self.close_to(self.floor);
        let tag = if self.policy().is_leaf(&el.tag) {
            el.tag.clone()
        } else {
            trace!(tag = %el.tag, leaf = %self.scrubber.default_leaf, "promoting as default leaf");
            self.scrubber.default_leaf.clone()
        };
        let attrs = self.policy().leaf_attrs(&tag, &el.attrs);
        let id = self.open(tag, attrs);
        self.visit_children(&el.children);
        self.close(id);
    }

    fn nest(&mut self, el: &ElementValue) {
        if self.stack.is_empty() {
            self.open_implicit_leaf();
        }
        let attrs = self.policy().child_attrs(&el.tag, &el.attrs);
        let id = self.open(el.tag.clone(), attrs);
        if !el.tag.is_void() {
            self.visit_children(&el.children);
        }
        self.close(id);
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.stack.is_empty() {
            if text.trim().is_empty() {
                return;
            }
            self.open_implicit_leaf();
        }
        if let Some(frame) = self.stack.last_mut() {
            append_child(&mut frame.children, FragmentNode::text(text));
        }
    }

    fn open_implicit_leaf(&mut self) {
        let tag = self.scrubber.default_leaf.clone();
        self.open(tag, Attrs::new());
    }

    fn open(&mut self, tag: Tag, attrs: Attrs) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(Frame {
            id,
            tag,
            attrs,
            children: Vec::new(),
        });
        id
    }

    /// Closes frame `id` and everything opened after it. No-op if a
    /// promotion already closed it.
    fn close(&mut self, id: usize) {
        if let Some(depth) = self.stack.iter().position(|frame| frame.id == id)
            && depth >= self.floor
        {
            self.close_to(depth);
        }
    }

    fn close_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            let Some(frame) = self.stack.pop() else {
                break;
            };
            let is_leaf = self.stack.is_empty();
            let emitted = finish_frame(frame, is_leaf);
            match self.stack.last_mut() {
                Some(parent) => {
                    for node in emitted {
                        append_child(&mut parent.children, node);
                    }
                }
                None => self.out.extend(emitted),
            }
        }
    }

    fn finish(mut self) -> Fragment {
        self.close_to(self.floor);
        match self.stack.pop() {
            Some(host) => host.children,
            None => self.out,
        }
    }
}

/// What a closed frame leaves behind: the element itself, nothing, or (for a
/// whitespace-only inline element) its bare whitespace.
fn finish_frame(frame: Frame, is_leaf: bool) -> Vec<FragmentNode> {
    let Frame {
        tag,
        attrs,
        children,
        ..
    } = frame;
    if tag.is_void() {
        return vec![FragmentNode::Element(ElementValue {
            tag,
            attrs,
            children: Vec::new(),
        })];
    }
    if children.is_empty() {
        trace!(tag = %tag, "dropping empty element");
        return Vec::new();
    }
    if !children.iter().any(is_meaningful) {
        trace!(tag = %tag, "dropping blank element");
        return if is_leaf { Vec::new() } else { children };
    }
    vec![FragmentNode::Element(ElementValue {
        tag,
        attrs,
        children,
    })]
}

fn append_child(children: &mut Vec<FragmentNode>, node: FragmentNode) {
    if let FragmentNode::Text(TextValue { text }) = &node
        && let Some(FragmentNode::Text(last)) = children.last_mut()
    {
        last.text.push_str(text);
        return;
    }
    children.push(node);
}

/// Non-whitespace text, a card, or a void element somewhere in `node`.
fn is_meaningful(node: &FragmentNode) -> bool {
    match node {
        FragmentNode::Text(text) => !text.text.trim().is_empty(),
        FragmentNode::Card(_) => true,
        FragmentNode::Element(el) => el.tag.is_void() || el.children.iter().any(is_meaningful),
    }
}
