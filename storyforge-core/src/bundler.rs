//! # bundler: structural model of a bundler configuration
//!
//! These types mirror the `{module: {rules: [...]}, plugins: [...]}` shape a
//! bundler consumes. They are produced and transformed by [`crate::preset`]
//! and never executed here.
//!
//! Keys this layer does not model are kept in `extra` maps so a caller's
//! configuration survives a round trip through composition untouched.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// A regex condition: compiled regex plus its JavaScript literal parts.
///
/// Displays as the literal (`/\.md$/`, `/\.svg$/i`) and compares by source
/// and flags. The `i`, `m` and `s` flags apply to matching; other flags are
/// only carried through.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

const REGEX_FLAGS: &str = "dgimsuvy";

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        Self::with_flags(source, "")
    }

    pub fn with_flags(
        source: impl Into<String>,
        flags: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let source = source.into();
        let flags = flags.into();
        let inline: String = flags
            .chars()
            .filter(|&c| matches!(c, 'i' | 'm' | 's'))
            .collect();
        let regex = if inline.is_empty() {
            Regex::new(&source)?
        } else {
            Regex::new(&format!("(?{inline}){source}"))?
        };
        Ok(Self {
            source,
            flags,
            regex,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Split `/source/flags` into its parts, if `raw` has that shape.
fn split_literal(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let (source, flags) = (&body[..end], &body[end + 1..]);
    if source.is_empty() || !flags.chars().all(|c| REGEX_FLAGS.contains(c)) {
        return None;
    }
    Some((source, flags))
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// A rule condition (`test`, `include`, `exclude`).
///
/// Strings in regex literal form become [`Condition::Regex`], other strings
/// are path prefixes. Anything else (arrays, `and`/`or` objects, literals the
/// regex engine rejects) is carried as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Regex(Pattern),
    Path(String),
    Other(Value),
}

impl Condition {
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            Condition::Regex(pattern) => pattern.is_match(path),
            Condition::Path(prefix) => path.starts_with(prefix.as_str()),
            Condition::Other(_) => false,
        }
    }

    fn from_value(value: Value) -> Self {
        let raw = match value {
            Value::String(raw) => raw,
            other => return Condition::Other(other),
        };
        let parsed =
            split_literal(&raw).map(|(source, flags)| Pattern::with_flags(source, flags));
        match parsed {
            Some(Ok(pattern)) => Condition::Regex(pattern),
            Some(Err(_)) => Condition::Other(Value::String(raw)),
            None => Condition::Path(raw),
        }
    }
}

impl From<Pattern> for Condition {
    fn from(pattern: Pattern) -> Self {
        Condition::Regex(pattern)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Regex(pattern) => fmt::Display::fmt(pattern, f),
            Condition::Path(path) => f.write_str(path),
            Condition::Other(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Condition::Regex(pattern) => serializer.collect_str(pattern),
            Condition::Path(path) => serializer.serialize_str(path),
            Condition::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Condition::from_value)
    }
}

/// Whether a rule runs before or after the normal loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforce {
    Pre,
    Post,
}

/// One step of a rule's loader chain in object form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleUse {
    pub loader: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RuleUse {
    pub fn new(loader: impl Into<String>, options: Value) -> Self {
        Self {
            loader: loader.into(),
            options: Some(options),
            extra: Map::new(),
        }
    }
}

/// One loader in a `use` list: a bare loader name or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UseEntry {
    Loader(String),
    Full(RuleUse),
}

impl UseEntry {
    pub fn loader(&self) -> &str {
        match self {
            UseEntry::Loader(loader) => loader,
            UseEntry::Full(full) => &full.loader,
        }
    }

    pub fn options(&self) -> Option<&Value> {
        match self {
            UseEntry::Loader(_) => None,
            UseEntry::Full(full) => full.options.as_ref(),
        }
    }
}

/// A rule's `use` value in whichever shape the caller wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleUses {
    List(Vec<UseEntry>),
    Single(UseEntry),
    Other(Value),
}

impl RuleUses {
    pub fn entries(&self) -> &[UseEntry] {
        match self {
            RuleUses::List(entries) => entries,
            RuleUses::Single(entry) => std::slice::from_ref(entry),
            RuleUses::Other(_) => &[],
        }
    }
}

/// A module transform rule. Every rule matching a file is applied, so the
/// position of a rule in [`ModuleConfig::rules`] is part of its meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Condition>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<RuleUses>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce: Option<Enforce>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModuleRule {
    /// A rule matching `test` that pipes files through `uses` in order.
    pub fn chain(test: Pattern, uses: Vec<RuleUse>) -> Self {
        Self {
            test: Some(test.into()),
            uses: Some(RuleUses::List(uses.into_iter().map(UseEntry::Full).collect())),
            ..Default::default()
        }
    }

    /// The rule's `test` as written, if it has one.
    pub fn test_literal(&self) -> Option<String> {
        self.test.as_ref().map(|t| t.to_string())
    }

    pub fn use_entries(&self) -> &[UseEntry] {
        self.uses.as_ref().map(RuleUses::entries).unwrap_or_default()
    }

    /// Loader identifiers in application order, including a single `loader`.
    pub fn loaders(&self) -> Vec<&str> {
        self.loader
            .iter()
            .map(String::as_str)
            .chain(self.use_entries().iter().map(UseEntry::loader))
            .collect()
    }
}

/// A bundler plugin instance, described by constructor name and options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

impl Plugin {
    pub const DLL_REFERENCE: &'static str = "DllReferencePlugin";

    /// Links the build against a precompiled shared bundle.
    pub fn dll_reference(context: &str, manifest: &str) -> Self {
        Self {
            name: Self::DLL_REFERENCE.to_string(),
            options: serde_json::json!({
                "context": context,
                "manifest": manifest,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub rules: Vec<ModuleRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The bundler configuration handed to and returned from the preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundlerConfig {
    #[serde(default)]
    pub module: ModuleConfig,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BundlerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
