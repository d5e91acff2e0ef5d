//! Reading stored settings back.
//!
//! `multi` fields are stored as JSON-encoded strings. The free functions here
//! decode *any* stored string holding a non-empty JSON object or array, no
//! matter which field it belongs to, which keeps them compatible with bundles
//! written by other tools. [`Registry::read`] narrows the decoding to fields
//! declared as `multi`.

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::registry::Registry;
use crate::schema::FieldType;
use crate::store::OptionStore;

/// Decodes a stored value holding a JSON object or array.
///
/// Anything else, including strings holding other JSON values and empty
/// collections, is returned unchanged.
pub fn parse_multi(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if !map.is_empty() => Value::Object(map),
        Ok(Value::Array(list)) if !list.is_empty() => Value::Array(list),
        _ => value,
    }
}

/// Returns the whole bundle of a setting with JSON-encoded values decoded.
///
/// `None` when the setting has no record. A record that isn't an object is
/// returned as stored.
pub fn get_setting(store: &dyn OptionStore, id: &str) -> Result<Option<Value>, StoreError> {
    Ok(store.get(id)?.map(|record| match record {
        Value::Object(bundle) => Value::Object(
            bundle
                .into_iter()
                .map(|(name, value)| (name, parse_multi(value)))
                .collect(),
        ),
        other => other,
    }))
}

/// Returns a single stored field, decoded like in [`get_setting`].
///
/// `None` when the setting has no record, when the record isn't an object, or
/// when the field isn't in it.
pub fn get_field(
    store: &dyn OptionStore,
    id: &str,
    name: &str,
) -> Result<Option<Value>, StoreError> {
    Ok(match store.get(id)? {
        Some(Value::Object(mut bundle)) => bundle.remove(name).map(parse_multi),
        _ => None,
    })
}

impl Registry {
    /// Reads the bundle of a registered setting, decoding only `multi` fields.
    ///
    /// Values of fields that aren't declared in the schema are kept as stored.
    pub fn read(
        &self,
        store: &dyn OptionStore,
        id: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let Some(Value::Object(bundle)) = store.get(id)? else {
            return Ok(None);
        };

        let schema = self.schema(id);

        let bundle = bundle
            .into_iter()
            .map(|(name, value)| {
                let multi = schema
                    .and_then(|schema| schema.field(&name))
                    .is_some_and(|field| field.kind == FieldType::Multi);

                let value = if multi { parse_multi(value) } else { value };
                (name, value)
            })
            .collect();

        Ok(Some(bundle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, Schemas, Section};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_missing_setting() {
        let store = MemoryStore::new();
        assert_eq!(get_setting(&store, "nope").unwrap(), None);
        assert_eq!(get_field(&store, "nope", "a").unwrap(), None);
    }

    #[test]
    fn test_scalar_record_passthrough() {
        let mut store = MemoryStore::new();
        store.set("legacy", json!("plain")).unwrap();

        assert_eq!(get_setting(&store, "legacy").unwrap(), Some(json!("plain")));
        assert_eq!(get_field(&store, "legacy", "a").unwrap(), None);
    }

    #[test]
    fn test_decode_is_type_agnostic() {
        let mut store = MemoryStore::new();
        store
            .set(
                "s",
                json!({
                    "multi": r#"{"opt1":1,"opt2":0}"#,
                    "text": "[1,2]",
                    "number": "42",
                    "empty": "{}",
                    "plain": "hello",
                }),
            )
            .unwrap();

        assert_eq!(
            get_setting(&store, "s").unwrap(),
            Some(json!({
                "multi": { "opt1": 1, "opt2": 0 },
                "text": [1, 2],
                "number": "42",
                "empty": "{}",
                "plain": "hello",
            }))
        );
        assert_eq!(
            get_field(&store, "s", "multi").unwrap(),
            Some(json!({ "opt1": 1, "opt2": 0 }))
        );
        assert_eq!(get_field(&store, "s", "missing").unwrap(), None);
    }

    #[test]
    fn test_multi_round_trip() {
        let schemas = Schemas::new().setting(
            "s",
            Section::new()
                .field(
                    "flags",
                    FieldSpec::new("multi").option("opt1", "A").option("opt2", "B"),
                )
                .field("text", FieldSpec::new("text")),
        );

        let mut store = MemoryStore::new();
        let mut registry = Registry::new("page");
        registry.register(&mut store, schemas).unwrap();

        let raw = json!({ "page_setting": "s", "flags": { "opt1": "1" }, "text": "[1,2]" });
        let values = registry.sanitize(raw.as_object().unwrap());
        store.set("s", Value::Object(values)).unwrap();

        let typed = registry.read(&store, "s").unwrap().unwrap();
        assert_eq!(typed["flags"], json!({ "opt1": 1, "opt2": 0 }));
        assert_eq!(typed["text"], json!("[1,2]"));

        assert_eq!(
            get_field(&store, "s", "flags").unwrap(),
            Some(json!({ "opt1": 1, "opt2": 0 }))
        );
    }
}
