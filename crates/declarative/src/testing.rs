//! Fixtures shared by the crate's tests.

use crate::error::{Error, Result};
use crate::policy::{alert_condition, none};
use crate::remote::MockRemote;
use crate::resource::{FieldSpec, ResourceType, Schema, Strategy, document_text, parse_document};
use crate::types::Record;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "rule",
        vec![
            FieldSpec::attribute("name"),
            FieldSpec::document("condition", Strategy::Canonical(alert_condition())),
            FieldSpec::document("layout", Strategy::Canonical(none())),
            FieldSpec::document("widgets", Strategy::Digest),
            FieldSpec::computed("state"),
            FieldSpec::derived("source"),
        ],
    )
});

/// A small resource type with one field of every kind.
#[derive(Debug)]
pub struct Rule;

impl ResourceType for Rule {
    fn kind(&self) -> &'static str {
        "rule"
    }

    fn description(&self) -> &'static str {
        "Test rule"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn to_payload(&self, record: &Record) -> Result<Value> {
        let mut body = Map::new();
        if let Some(name) = record.get("name") {
            body.insert("name".into(), name.clone());
        }
        if let Some(source) = record.get("source") {
            body.insert("source".into(), source.clone());
        }
        for field in ["condition", "layout", "widgets"] {
            if let Some(value) = parse_document(record, field)? {
                body.insert(field.into(), value);
            }
        }
        Ok(Value::Object(body))
    }

    fn from_response(&self, response: &Value) -> Result<Record> {
        let id = response["id"].as_str().ok_or_else(|| Error::Payload {
            kind: "rule".into(),
            message: "response has no id".into(),
        })?;
        let mut record = Record::new().with_id(id);
        for field in ["name", "state", "source"] {
            record.set(field, response[field].clone());
        }
        for field in ["condition", "layout", "widgets"] {
            if let Some(text) = document_text(&response[field]) {
                record.set(field, text);
            }
        }
        Ok(record)
    }
}

/// A remote that behaves like a server injecting defaults: it adds
/// `absentFor`/`alertOnAbsent` to conditions, a lifecycle state and a
/// default source.
pub fn rewriting_remote() -> MockRemote {
    MockRemote::new().with_rewrite(|_, payload| {
        let mut stored = payload.clone();
        if let Some(condition) = stored.get_mut("condition").and_then(Value::as_object_mut) {
            condition.insert("absentFor".into(), json!(0));
            condition.insert("alertOnAbsent".into(), json!(false));
        }
        stored["state"] = json!("inactive");
        if stored.get("source").is_none() {
            stored["source"] = json!("http://server/rules");
        }
        stored
    })
}

/// Desired record used across tests.
pub fn desired() -> Record {
    Record::new()
        .with("name", "cpu")
        .with("condition", r#"{ "op": ">", "target": 80 }"#)
        .with("layout", r#"[{"i": "a", "x": 0}]"#)
        .with("widgets", r#"[{"id": "a", "title": "CPU"}]"#)
}
