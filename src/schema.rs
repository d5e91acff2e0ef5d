//! Declarative description of settings, sections and their fields.
//!
//! A settings page is described by a set of [`Section`]s, each keyed by the
//! identifier of the setting it stores. Every omitted key falls back to its
//! default, so both of these describe the same field:
//!
//! ```json
//! { "type": "text" }
//! {}
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::Action;
use crate::sanitize::Sanitize;

/// The kind of a field, controlling both its widget and its sanitizer.
///
/// Unknown type names are kept as [`FieldType::Other`] and behave like
/// [`FieldType::Text`], except that the name is used as the `type` attribute of
/// the rendered input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Text,
    Checkbox,
    Radio,
    Select,
    Media,
    Textarea,
    Multi,
    Action,
    Email,
    Url,
    Number,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Select => "select",
            FieldType::Media => "media",
            FieldType::Textarea => "textarea",
            FieldType::Multi => "multi",
            FieldType::Action => "action",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Number => "number",
            FieldType::Other(name) => name,
        }
    }

    /// Whether the field can't be rendered meaningfully without `options`.
    pub fn needs_options(&self) -> bool {
        matches!(self, FieldType::Radio | FieldType::Select | FieldType::Multi)
    }
}

impl From<&str> for FieldType {
    fn from(value: &str) -> Self {
        match value {
            "text" => FieldType::Text,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "select" => FieldType::Select,
            "media" => FieldType::Media,
            "textarea" => FieldType::Textarea,
            "multi" => FieldType::Multi,
            "action" => FieldType::Action,
            "email" => FieldType::Email,
            "url" => FieldType::Url,
            "number" => FieldType::Number,
            other => FieldType::Other(other.to_string()),
        }
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        FieldType::from(value.as_str())
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declarative descriptor of a single form field.
///
/// Callbacks (`sanitize`, `action`) can't be read from JSON and have to be
/// attached with [`FieldSpec::sanitize_with`] and [`FieldSpec::action_with`].
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Materialized into the stored bundle when the setting is first registered.
    pub default: Option<Value>,
    #[serde(skip)]
    pub sanitize: Option<Arc<dyn Sanitize>>,
    pub attributes: IndexMap<String, String>,
    pub options: Option<IndexMap<String, String>>,
    #[serde(skip)]
    pub action: Option<Arc<dyn Action>>,
}

impl FieldSpec {
    pub fn new(kind: impl Into<FieldType>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the default value. `Value::Null` means "no default".
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = match value.into() {
            Value::Null => None,
            value => Some(value),
        };
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.options
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), label.into());
        self
    }

    /// Replaces the built-in, type-based sanitizer.
    pub fn sanitize_with<S>(mut self, sanitizer: S) -> Self
    where
        S: Sanitize + 'static,
    {
        self.sanitize = Some(Arc::new(sanitizer));
        self
    }

    /// Attaches the handler triggered by an `action` field.
    pub fn action_with<A>(mut self, action: A) -> Self
    where
        A: Action + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Returns the options, treating an empty mapping like a missing one.
    pub fn options(&self) -> Option<&IndexMap<String, String>> {
        self.options.as_ref().filter(|options| !options.is_empty())
    }
}

impl Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("description", &self.description)
            .field("default", &self.default)
            .field("sanitize", &self.sanitize.is_some())
            .field("attributes", &self.attributes)
            .field("options", &self.options)
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// A titled group of fields stored together under one setting identifier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Section {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldSpec>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: FieldSpec) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

/// The sections of a settings page, keyed by setting identifier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Schemas(pub IndexMap<String, Section>);

impl Schemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses schemas from JSON, filling in defaults for every omitted key.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn setting(mut self, id: impl Into<String>, section: Section) -> Self {
        self.0.insert(id.into(), section);
        self
    }
}

impl IntoIterator for Schemas {
    type Item = (String, Section);
    type IntoIter = indexmap::map::IntoIter<String, Section>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A registered setting: one section bound to its storage identifier.
#[derive(Debug, Clone)]
pub struct SettingSchema {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldSpec>,
}

impl SettingSchema {
    pub(crate) fn new(id: String, section: Section) -> Self {
        Self {
            id,
            title: section.title,
            description: section.description,
            fields: section.fields,
        }
    }

    /// The bundle written on first registration: every non-null default.
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, field)| {
                field
                    .default
                    .as_ref()
                    .filter(|value| !value.is_null())
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_defaults() {
        let schemas = Schemas::from_json(r#"{ "general": { "fields": { "name": {} } } }"#).unwrap();
        let section = &schemas.0["general"];
        let field = &section.fields["name"];

        assert_eq!(section.title, None);
        assert_eq!(field.kind, FieldType::Text);
        assert_eq!(field.label, None);
        assert_eq!(field.default, None);
        assert!(field.sanitize.is_none());
        assert!(field.attributes.is_empty());
        assert!(field.options.is_none());
        assert!(field.action.is_none());
    }

    #[test]
    fn test_field_type_names() {
        assert_eq!(FieldType::from("multi"), FieldType::Multi);
        assert_eq!(FieldType::from("color"), FieldType::Other("color".into()));
        assert_eq!(FieldType::Other("color".into()).as_str(), "color");

        let field: FieldSpec = serde_json::from_str(r#"{ "type": "date" }"#).unwrap();
        assert_eq!(field.kind.as_str(), "date");
    }

    #[test]
    fn test_defaults_skip_null() {
        let schemas = Schemas::from_json(
            r#"{ "s": { "fields": {
                "a": { "default": "x" },
                "b": { "default": null },
                "c": { "type": "number", "default": 3 }
            } } }"#,
        )
        .unwrap();

        let (id, section) = schemas.into_iter().next().unwrap();
        let schema = SettingSchema::new(id, section);

        assert_eq!(
            Value::Object(schema.defaults()),
            json!({ "a": "x", "c": 3 })
        );
    }

    #[test]
    fn test_builder_keeps_option_order() {
        let field = FieldSpec::new("select")
            .option("zeta", "Zeta")
            .option("alpha", "Alpha")
            .default(Value::Null);

        let keys: Vec<_> = field.options().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(field.default, None);
    }

    #[test]
    fn test_empty_options_are_missing() {
        let field: FieldSpec = serde_json::from_str(r#"{ "type": "radio", "options": {} }"#).unwrap();
        assert!(field.options.is_some());
        assert!(field.options().is_none());
    }
}
