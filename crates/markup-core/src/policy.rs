use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::PolicyError;
use crate::tag::Tag;
use crate::tree::Attrs;

/// How one attribute is judged. `true`/`false` in JSON is an exact allow
/// flag; the object forms check the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrRule {
    Allow(bool),
    Check(AttrCheck),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrCheck {
    /// Relative URLs pass; absolute ones need a listed scheme.
    Url { schemes: Vec<String> },
    OneOf(Vec<String>),
}

impl AttrRule {
    pub fn permits(&self, value: &str) -> bool {
        match self {
            AttrRule::Allow(allowed) => *allowed,
            AttrRule::Check(AttrCheck::OneOf(values)) => values.iter().any(|v| v == value),
            AttrRule::Check(AttrCheck::Url { schemes }) => match url_scheme(value) {
                Some(scheme) => schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)),
                None => true,
            },
        }
    }
}

/// Scheme of `value`, ignoring the whitespace and control characters browsers
/// skip when resolving a URL (`java\tscript:` is still `javascript:`).
fn url_scheme(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let end = cleaned.find([':', '/', '?', '#'])?;
    if !cleaned[end..].starts_with(':') || end == 0 {
        return None;
    }
    Some(cleaned[..end].to_ascii_lowercase())
}

pub type AttrRules = BTreeMap<String, AttrRule>;

/// Static table of which tags may appear as top-level leaves and which may
/// nest inside them, with the attributes each keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPolicy {
    #[serde(default)]
    pub leaf: BTreeMap<Tag, AttrRules>,
    #[serde(default)]
    pub child: BTreeMap<Tag, AttrRules>,
}

impl TagPolicy {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: TagPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, PolicyError> {
        let policy: TagPolicy = serde_json::from_value(value)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.leaf.is_empty() {
            return Err(PolicyError::NoLeafTags);
        }
        Ok(())
    }

    pub fn is_leaf(&self, tag: &Tag) -> bool {
        self.leaf.contains_key(tag)
    }

    pub fn is_child(&self, tag: &Tag) -> bool {
        self.child.contains_key(tag)
    }

    /// Attributes of `tag` that survive as a leaf.
    pub fn leaf_attrs(&self, tag: &Tag, attrs: &Attrs) -> Attrs {
        filter_attrs(tag, self.leaf.get(tag), attrs)
    }

    /// Attributes of `tag` that survive when nested.
    pub fn child_attrs(&self, tag: &Tag, attrs: &Attrs) -> Attrs {
        filter_attrs(tag, self.child.get(tag), attrs)
    }
}

fn filter_attrs(tag: &Tag, rules: Option<&AttrRules>, attrs: &Attrs) -> Attrs {
    let mut out = Attrs::new();
    for (name, value) in attrs {
        let name = name.to_ascii_lowercase();
        let keep = rules
            .and_then(|rules| rules.get(&name))
            .is_some_and(|rule| rule.permits(value));
        if keep {
            out.insert(name, value.clone());
        } else {
            trace!(tag = %tag, attr = %name, "attribute dropped by policy");
        }
    }
    out
}

impl Default for TagPolicy {
    fn default() -> Self {
        let none = AttrRules::new;
        let link = || {
            AttrRules::from([
                (
                    "href".to_string(),
                    AttrRule::Check(AttrCheck::Url {
                        schemes: vec!["http".into(), "https".into(), "mailto".into()],
                    }),
                ),
                ("title".to_string(), AttrRule::Allow(true)),
                (
                    "target".to_string(),
                    AttrRule::Check(AttrCheck::OneOf(vec!["_blank".into()])),
                ),
            ])
        };
        let ordered = || {
            AttrRules::from([
                ("start".to_string(), AttrRule::Allow(true)),
                ("reversed".to_string(), AttrRule::Allow(true)),
            ])
        };

        let mut leaf = BTreeMap::new();
        leaf.insert(Tag::P, none());
        for level in 1..=6 {
            leaf.insert(Tag::Heading(level), none());
        }
        leaf.insert(
            Tag::Blockquote,
            AttrRules::from([("cite".to_string(), AttrRule::Allow(true))]),
        );
        leaf.insert(Tag::Pre, none());
        leaf.insert(Tag::Ul, none());
        leaf.insert(Tag::Ol, ordered());

        let mut child = BTreeMap::new();
        for tag in [
            Tag::Strong,
            Tag::Em,
            Tag::Mark,
            Tag::U,
            Tag::S,
            Tag::Code,
            Tag::Sub,
            Tag::Sup,
            Tag::Br,
            Tag::Li,
            Tag::Ul,
        ] {
            child.insert(tag, none());
        }
        child.insert(Tag::Ol, ordered());
        child.insert(Tag::A, link());

        Self { leaf, child }
    }
}
