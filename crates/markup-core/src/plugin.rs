use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::editor::Editor;
use crate::error::{CommandError, QueryError};
use crate::tree::Fragment;
use crate::value::MarkupValue;

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;
pub type QueryHandler =
    Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

/// One key press as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStroke {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyStroke {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// The text this stroke types, if any.
    pub fn typed_text(&self) -> Option<&str> {
        if self.ctrl || self.meta || self.alt {
            return None;
        }
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if !ch.is_control() => Some(&self.key),
            _ => None,
        }
    }
}

/// A binding like `Mod+B`, where `Mod` is Ctrl or Cmd.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    key: String,
    primary: bool,
    alt: bool,
    shift: bool,
}

impl Shortcut {
    pub fn parse(spec: &str) -> Option<Self> {
        let mut shortcut = Shortcut {
            key: String::new(),
            primary: false,
            alt: false,
            shift: false,
        };
        for part in spec.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "mod" | "ctrl" | "cmd" | "meta" => shortcut.primary = true,
                "alt" | "option" => shortcut.alt = true,
                "shift" => shortcut.shift = true,
                "" => return None,
                key => shortcut.key = key.to_string(),
            }
        }
        if shortcut.key.is_empty() {
            return None;
        }
        Some(shortcut)
    }

    pub fn matches(&self, stroke: &KeyStroke) -> bool {
        stroke.key.eq_ignore_ascii_case(&self.key)
            && (stroke.ctrl || stroke.meta) == self.primary
            && stroke.alt == self.alt
            && stroke.shift == self.shift
    }
}

#[derive(Clone)]
pub struct ShortcutSpec {
    pub shortcut: Shortcut,
    pub command: String,
    pub args: Option<Value>,
}

pub trait Extension: Send + Sync {
    fn id(&self) -> &'static str;
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
    fn shortcuts(&self) -> Vec<ShortcutSpec> {
        Vec::new()
    }
}

/// Behaviors composed around one editor.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: Vec<&'static str>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
    shortcuts: Vec<ShortcutSpec>,
}

impl ExtensionRegistry {
    pub fn new(extensions: impl IntoIterator<Item = Box<dyn Extension>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for extension in extensions {
            registry.register(extension)?;
        }
        Ok(registry)
    }

    pub fn core(bind_default_shortcuts: bool) -> Self {
        let mut extensions: Vec<Box<dyn Extension>> =
            vec![Box::new(InlineFormatExtension), Box::new(ContentExtension)];
        if bind_default_shortcuts {
            extensions.push(Box::new(DefaultShortcutsExtension));
        }
        Self::new(extensions).expect("core registry must be valid")
    }

    pub fn register(&mut self, extension: Box<dyn Extension>) -> Result<(), String> {
        for cmd in extension.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in extension.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        for spec in extension.shortcuts() {
            if self.shortcuts.iter().any(|s| s.shortcut == spec.shortcut) {
                return Err(format!("Duplicate shortcut for command: {}", spec.command));
            }
            self.shortcuts.push(spec);
        }

        self.extensions.push(extension.id());
        Ok(())
    }

    pub fn extension_ids(&self) -> &[&'static str] {
        &self.extensions
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn shortcut_for(&self, stroke: &KeyStroke) -> Option<ShortcutSpec> {
        self.shortcuts
            .iter()
            .find(|spec| spec.shortcut.matches(stroke))
            .cloned()
    }
}

fn tag_arg(args: Option<&Value>) -> Option<&str> {
    args.and_then(|v| v.get("tag")).and_then(|v| v.as_str())
}

struct InlineFormatExtension;

impl Extension for InlineFormatExtension {
    fn id(&self) -> &'static str {
        "inline.format"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("inline.toggle", "Toggle inline style", |editor, args| {
                let tag = tag_arg(args.as_ref())
                    .ok_or_else(|| CommandError::new("Missing args.tag"))?;
                editor.toggle_inline(tag)?;
                Ok(())
            })
            .description("Toggle an inline tag over the selection, or at the caret.")
            .keywords(["bold", "italic", "mark", "format"])
            .args_example(json!({ "tag": "strong" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("inline.is_active", |editor, args| {
                let tag = tag_arg(args.as_ref())
                    .ok_or_else(|| QueryError::new("Missing args.tag"))?;
                Ok(Value::Bool(editor.is_active(tag)))
            }),
            QuerySpec::new("inline.active_tags", |editor, _args| {
                Ok(Value::Array(
                    editor
                        .active_tags()
                        .into_iter()
                        .map(|tag| Value::String(tag.name().to_string()))
                        .collect(),
                ))
            }),
        ]
    }
}

struct ContentExtension;

impl Extension for ContentExtension {
    fn id(&self) -> &'static str {
        "content"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("content.paste", "Paste content", |editor, args| {
                let args = args.ok_or_else(|| CommandError::new("Missing args.fragment"))?;
                let fragment: Fragment = match args.get("fragment") {
                    Some(fragment) => serde_json::from_value(fragment.clone()),
                    None => serde_json::from_value(args),
                }
                .map_err(|err| CommandError::new(format!("Invalid fragment: {err}")))?;
                editor.paste(&fragment)?;
                Ok(())
            })
            .description("Scrub a fragment and insert it at the selection.")
            .keywords(["paste", "insert"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("content.policy", |editor, _args| {
                serde_json::to_value(editor.scrubber().policy())
                    .map_err(|err| QueryError::new(format!("Failed to encode policy: {err}")))
            }),
            QuerySpec::new("content.value", |editor, _args| {
                serde_json::to_value(MarkupValue::from_fragment(editor.fragment()))
                    .map_err(|err| QueryError::new(format!("Failed to encode value: {err}")))
            }),
        ]
    }
}

struct DefaultShortcutsExtension;

impl Extension for DefaultShortcutsExtension {
    fn id(&self) -> &'static str {
        "inline.shortcuts"
    }

    fn shortcuts(&self) -> Vec<ShortcutSpec> {
        [("Mod+B", "strong"), ("Mod+I", "em")]
            .into_iter()
            .filter_map(|(binding, tag)| {
                Some(ShortcutSpec {
                    shortcut: Shortcut::parse(binding)?,
                    command: "inline.toggle".to_string(),
                    args: Some(json!({ "tag": tag })),
                })
            })
            .collect()
    }
}
