use std::collections::BTreeSet;

use tracing::{trace, warn};

use crate::tag::Tag;

/// Handed out with every programmatic selection restore. The host passes it
/// back with the caret event that restore causes, so that one event does not
/// wipe the pending toggles. Each token is honoured once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuppressToken(u64);

/// Per-editor inline formatting state.
///
/// `active` holds the inline tags around the caret; `toggled` holds tags the
/// user asked to flip at a collapsed caret that have not been typed yet.
#[derive(Debug, Default, Clone)]
pub struct ToggleSession {
    active: BTreeSet<Tag>,
    toggled: BTreeSet<Tag>,
    pending_suppress: Option<SuppressToken>,
    next_token: u64,
}

impl ToggleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tags(&self) -> &BTreeSet<Tag> {
        &self.active
    }

    pub fn toggled_tags(&self) -> &BTreeSet<Tag> {
        &self.toggled
    }

    /// What typing at the caret would produce: inside the tag XOR toggled.
    pub fn is_active(&self, tag: &Tag) -> bool {
        self.active.contains(tag) != self.toggled.contains(tag)
    }

    pub fn on_caret_change(&mut self, active: BTreeSet<Tag>, token: Option<SuppressToken>) {
        self.active = active;
        let suppressed = match (token, self.pending_suppress) {
            (Some(token), Some(pending)) if token == pending => true,
            (Some(token), _) => {
                warn!(?token, "ignoring stale suppress token");
                false
            }
            (None, _) => false,
        };
        self.pending_suppress = None;
        if suppressed {
            trace!("caret change suppressed");
            return;
        }
        self.toggled.clear();
    }

    /// Flips `tag` in the pending set. The returned token must accompany the
    /// caret event caused by restoring the selection.
    pub fn on_toggle_request(&mut self, tag: Tag) -> SuppressToken {
        if !self.toggled.remove(&tag) {
            self.toggled.insert(tag);
        }
        self.issue_token()
    }

    /// Drains the pending set so it can be applied to freshly typed text.
    pub fn on_character_inserted(&mut self) -> BTreeSet<Tag> {
        std::mem::take(&mut self.toggled)
    }

    pub fn set_active(&mut self, active: BTreeSet<Tag>) {
        self.active = active;
    }

    pub fn issue_token(&mut self) -> SuppressToken {
        self.next_token += 1;
        let token = SuppressToken(self.next_token);
        self.pending_suppress = Some(token);
        token
    }

    pub fn reset(&mut self) {
        self.active.clear();
        self.toggled.clear();
        self.pending_suppress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_consumed_once() {
        let mut session = ToggleSession::new();
        let token = session.on_toggle_request(Tag::Em);

        session.on_caret_change(BTreeSet::new(), Some(token));
        assert!(session.is_active(&Tag::Em));

        session.on_caret_change(BTreeSet::new(), Some(token));
        assert!(!session.is_active(&Tag::Em));
    }

    #[test]
    fn plain_caret_change_clears_toggles() {
        let mut session = ToggleSession::new();
        session.on_toggle_request(Tag::Strong);
        session.on_caret_change(BTreeSet::from([Tag::Strong]), None);

        assert!(session.toggled_tags().is_empty());
        assert!(session.is_active(&Tag::Strong));
    }
}
