use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::SettingsError;
use crate::sanitize::{is_truthy, sanitize_field};
use crate::schema::{FieldType, Schemas, SettingSchema};
use crate::store::OptionStore;

/// Handler of an `action` field, invoked out of band from form submissions.
pub trait Action: Send + Sync {
    fn invoke(&self) -> anyhow::Result<()>;
}

impl<F> Action for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self) -> anyhow::Result<()> {
        self()
    }
}

/// The settings registered by one settings page.
///
/// Schemas are registered once and stay immutable afterwards. The registry
/// owns no storage; every operation touching persisted bundles borrows an
/// [`OptionStore`].
pub struct Registry {
    page: String,
    schemas: IndexMap<String, SettingSchema>,
    actions: HashMap<String, Arc<dyn Action>>,
}

impl Registry {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            schemas: IndexMap::new(),
            actions: HashMap::new(),
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    /// Registers settings and materializes their defaults.
    ///
    /// A setting with no record in `store` gets its default bundle written.
    /// Existing records are left untouched.
    pub fn register(
        &mut self,
        store: &mut dyn OptionStore,
        schemas: Schemas,
    ) -> Result<(), SettingsError> {
        for (id, section) in schemas {
            if self.schemas.contains_key(&id) {
                return Err(SettingsError::Duplicate(id));
            }

            let schema = SettingSchema::new(id.clone(), section);

            for (name, field) in &schema.fields {
                if let (FieldType::Action, Some(action)) = (&field.kind, &field.action) {
                    let key = format!("{id}_{name}");
                    tracing::debug!("registered action {}", key);
                    self.actions.insert(key, action.clone());
                }
            }

            if !store.exists(&id)? {
                let defaults = schema.defaults();
                tracing::info!("initializing setting {} with {} defaults", id, defaults.len());
                store.set(&id, Value::Object(defaults))?;
            }

            self.schemas.insert(id, schema);
        }

        Ok(())
    }

    pub fn schema(&self, id: &str) -> Option<&SettingSchema> {
        self.schemas.get(id)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &SettingSchema> {
        self.schemas.values()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.values().all(|schema| schema.fields.is_empty())
    }

    /// Default bundle of a setting, empty for unknown identifiers.
    pub fn defaults(&self, id: &str) -> Map<String, Value> {
        self.schemas
            .get(id)
            .map(SettingSchema::defaults)
            .unwrap_or_default()
    }

    /// Name of the hidden input telling which setting a form submits.
    pub fn marker_key(&self) -> String {
        format!("{}_setting", self.page)
    }

    /// Name of the submit button requesting a reset to defaults.
    pub fn reset_key(&self) -> String {
        format!("{}_reset", self.page)
    }

    /// Sanitizes one submitted setting into a storage-ready bundle.
    ///
    /// The setting is looked up through the hidden marker input. Without a
    /// marker the submission is returned as is, while a marker naming no
    /// registered setting yields an empty bundle. Fields missing from the submission are sanitized as `null`; fields
    /// whose sanitizer yields nothing are left out of the bundle.
    pub fn sanitize(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        let Some(marker) = raw.get(&self.marker_key()).filter(|value| is_truthy(value)) else {
            tracing::warn!("submission to page {} has no marker, storing it unsanitized", self.page);
            return raw.clone();
        };

        let Some(schema) = marker.as_str().and_then(|id| self.schemas.get(id)) else {
            tracing::warn!("submission to page {} names unknown setting {}", self.page, marker);
            return Map::new();
        };

        let mut values = Map::new();

        for (name, field) in &schema.fields {
            let input = raw.get(name).unwrap_or(&Value::Null);

            if let Some(value) = sanitize_field(name, field, input) {
                values.insert(name.clone(), value);
            }
        }

        tracing::debug!("sanitized {} fields of setting {}", values.len(), schema.id);

        values
    }

    /// Names of all invokable actions, `{setting}_{field}`.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Runs the action registered under `name`.
    pub fn invoke(&self, name: &str) -> anyhow::Result<()> {
        let Some(action) = self.actions.get(name) else {
            anyhow::bail!("no action registered under '{name}'");
        };

        tracing::info!("invoking action {}", name);
        action.invoke()
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("page", &self.page)
            .field("schemas", &self.schemas)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Section};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schemas() -> Schemas {
        Schemas::new().setting(
            "theme",
            Section::new()
                .field("a", FieldSpec::new("text").default("x"))
                .field("b", FieldSpec::new("text"))
                .field("c", FieldSpec::new("number").default(3))
                .field("d", FieldSpec::new("checkbox")),
        )
    }

    fn submission(fields: Value) -> Map<String, Value> {
        let mut raw = fields.as_object().cloned().unwrap_or_default();
        raw.insert("page_setting".into(), json!("theme"));
        raw
    }

    #[test]
    fn test_default_materialization() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        assert_eq!(store.get("theme").unwrap(), Some(json!({ "a": "x", "c": 3 })));
    }

    #[test]
    fn test_existing_record_is_kept() {
        let mut store = MemoryStore::new();
        store.set("theme", json!({ "a": "custom" })).unwrap();

        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        assert_eq!(store.get("theme").unwrap(), Some(json!({ "a": "custom" })));
    }

    #[test]
    fn test_duplicate_setting() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        assert!(matches!(
            registry.register(&mut store, schemas()),
            Err(SettingsError::Duplicate(id)) if id == "theme"
        ));
    }

    #[test]
    fn test_full_replace() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        let values = registry.sanitize(&submission(json!({ "a": "hello" })));

        assert_eq!(
            Value::Object(values),
            json!({ "a": "hello", "b": "", "c": 0.0, "d": 0 })
        );
    }

    #[test]
    fn test_missing_marker_passthrough() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        let raw = json!({ "a": "<b>raw</b>" }).as_object().cloned().unwrap();
        assert_eq!(registry.sanitize(&raw), raw);

        let mut empty = raw.clone();
        empty.insert("page_setting".into(), json!(""));
        assert_eq!(registry.sanitize(&empty), empty);
    }

    #[test]
    fn test_unknown_marker_yields_empty_bundle() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas()).unwrap();

        let raw = json!({ "page_setting": "nope", "a": "<b>raw</b>" });
        assert!(registry.sanitize(raw.as_object().unwrap()).is_empty());

        let raw = json!({ "page_setting": 7, "a": "x" });
        assert!(registry.sanitize(raw.as_object().unwrap()).is_empty());
    }

    #[test]
    fn test_actions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let schemas = Schemas::new().setting(
            "tools",
            Section::new()
                .field(
                    "flush",
                    FieldSpec::new("action").action_with(move || -> anyhow::Result<()> {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .field("orphan", FieldSpec::new("action")),
        );

        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas).unwrap();

        assert_eq!(registry.actions().collect::<Vec<_>>(), ["tools_flush"]);
        registry.invoke("tools_flush").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.invoke("tools_orphan").is_err());

        let mut raw = Map::new();
        raw.insert("page_setting".into(), json!("tools"));
        raw.insert("flush".into(), json!("1"));
        assert!(registry.sanitize(&raw).is_empty());
    }
}
