use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Element names the editor understands.
///
/// Aliases collapse to one variant at parse time, so `b` and `strong` are the
/// same logical tag everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    P,
    Heading(u8),
    Blockquote,
    Pre,
    Ul,
    Ol,
    Li,
    Strong,
    Em,
    Mark,
    U,
    S,
    Code,
    Sub,
    Sup,
    A,
    Br,
    Other(String),
}

/// Names that are not part of the closed set but still read as block level
/// when they show up in pasted content.
const BLOCK_LIKE: &[&str] = &[
    "address",
    "article",
    "aside",
    "center",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "header",
    "hgroup",
    "hr",
    "main",
    "menu",
    "nav",
    "section",
    "summary",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
];

impl Tag {
    pub fn parse(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "p" => Tag::P,
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "mark" => Tag::Mark,
            "u" | "ins" => Tag::U,
            "s" | "strike" | "del" => Tag::S,
            "code" => Tag::Code,
            "sub" => Tag::Sub,
            "sup" => Tag::Sup,
            "a" => Tag::A,
            "br" => Tag::Br,
            _ => Tag::Other(lower),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::P => "p",
            Tag::Heading(1) => "h1",
            Tag::Heading(2) => "h2",
            Tag::Heading(3) => "h3",
            Tag::Heading(4) => "h4",
            Tag::Heading(5) => "h5",
            Tag::Heading(_) => "h6",
            Tag::Blockquote => "blockquote",
            Tag::Pre => "pre",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Strong => "strong",
            Tag::Em => "em",
            Tag::Mark => "mark",
            Tag::U => "u",
            Tag::S => "s",
            Tag::Code => "code",
            Tag::Sub => "sub",
            Tag::Sup => "sup",
            Tag::A => "a",
            Tag::Br => "br",
            Tag::Other(name) => name,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Tag::P
                | Tag::Heading(_)
                | Tag::Blockquote
                | Tag::Pre
                | Tag::Ul
                | Tag::Ol
                | Tag::Li
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Strong
                | Tag::Em
                | Tag::Mark
                | Tag::U
                | Tag::S
                | Tag::Code
                | Tag::Sub
                | Tag::Sup
                | Tag::A
                | Tag::Br
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Tag::Ul | Tag::Ol)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Br) || matches!(self, Tag::Other(name) if name == "hr")
    }

    /// Generic block heuristic used for names outside the closed set.
    pub fn looks_block(&self) -> bool {
        match self {
            Tag::Other(name) => BLOCK_LIKE.contains(&name.as_str()),
            tag => tag.is_block(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::parse(value)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Tag::parse(&name))
    }
}
