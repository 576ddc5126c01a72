//! Dashboards (`/api/v1/dashboards`)

use declarative::resource::{document_text, parse_document};
use declarative::{Address, Error, FieldSpec, Record, ResourceType, Schema, Strategy, policy};
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

use super::{Shape, default_to, id_of, observe};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "dashboard",
        vec![
            FieldSpec::attribute("title"),
            FieldSpec::attribute("name"),
            FieldSpec::attribute("description"),
            FieldSpec::attribute("collapsable_rows_migrated"),
            FieldSpec::attribute("uploaded_grafana"),
            FieldSpec::attribute("tags"),
            FieldSpec::document("layout", Strategy::Canonical(policy::none())),
            FieldSpec::document("variables", Strategy::Canonical(policy::none())),
            FieldSpec::document("panel_map", Strategy::Canonical(policy::none())),
            // Only the digest of the applied widgets is kept, so widgets
            // edited in the SigNoz UI are overwritten on the next manifest change.
            FieldSpec::document("widgets", Strategy::Digest),
            FieldSpec::derived("version"),
            FieldSpec::derived("source"),
            FieldSpec::computed("created_at"),
            FieldSpec::computed("created_by"),
            FieldSpec::computed("updated_at"),
            FieldSpec::computed("updated_by"),
        ],
    )
});

pub const SHAPES: &[(&str, Shape)] = &[
    ("collapsable_rows_migrated", Shape::Flag),
    ("uploaded_grafana", Shape::Flag),
    ("tags", Shape::List),
];

/// Fields stored inside the dashboard's `data` object
const DATA: &[(&str, &str)] = &[
    ("title", "title"),
    ("name", "name"),
    ("description", "description"),
    ("version", "version"),
    ("source", "source"),
];

const DOCUMENTS: &[(&str, &str)] = &[
    ("layout", "layout"),
    ("variables", "variables"),
    ("panel_map", "panelMap"),
    ("widgets", "widgets"),
];

/// Audit fields at the top level of the response
const AUDIT: &[(&str, &str)] = &[
    ("created_at", "created_at"),
    ("created_by", "created_by"),
    ("updated_at", "updated_at"),
    ("updated_by", "updated_by"),
];

/// A SigNoz dashboard
#[derive(Debug, Clone)]
pub struct Dashboard {
    default_source: String,
}

impl Dashboard {
    pub fn new(endpoint: &str) -> Self {
        Self {
            default_source: format!("{endpoint}/dashboard"),
        }
    }

    pub fn apply_defaults(&self, address: &Address, record: &mut Record) {
        default_to(record, "title", address.name.as_str());
        default_to(record, "description", "");
        default_to(record, "collapsable_rows_migrated", false);
        default_to(record, "uploaded_grafana", false);
        default_to(record, "tags", json!([]));
        default_to(record, "layout", "[]");
        default_to(record, "variables", "{}");
        default_to(record, "source", self.default_source.as_str());
        // An empty panel map is sent as `{}`
        if record.get_str("panel_map").is_none_or(|text| text.trim().is_empty()) {
            record.set("panel_map", "{}");
        }
    }
}

impl ResourceType for Dashboard {
    fn kind(&self) -> &'static str {
        "dashboard"
    }

    fn description(&self) -> &'static str {
        "Dashboard"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn to_payload(&self, record: &Record) -> declarative::Result<Value> {
        let mut body = Map::new();
        for (field, key) in DATA {
            if let Some(value) = record.get(field) {
                body.insert((*key).to_string(), value.clone());
            }
        }
        body.insert(
            "collapsableRowsMigrated".into(),
            Value::Bool(record.get_bool("collapsable_rows_migrated").unwrap_or(false)),
        );
        body.insert(
            "uploadedGrafana".into(),
            Value::Bool(record.get_bool("uploaded_grafana").unwrap_or(false)),
        );
        body.insert("tags".into(), record.get("tags").cloned().unwrap_or_else(|| json!([])));

        for (field, key) in DOCUMENTS {
            if let Some(value) = parse_document(record, field)? {
                body.insert((*key).to_string(), value);
            }
        }
        if !body.contains_key("widgets") {
            return Err(Error::MissingField {
                kind: "dashboard".into(),
                field: "widgets".into(),
            });
        }

        Ok(Value::Object(body))
    }

    fn from_response(&self, response: &Value) -> declarative::Result<Record> {
        // Dashboards are addressed by uuid; older servers only report `id`
        let id = id_of(&response["uuid"])
            .or_else(|| id_of(&response["id"]))
            .ok_or_else(|| Error::Payload {
                kind: "dashboard".into(),
                message: "response has no dashboard id".into(),
            })?;
        let mut record = Record::new().with_id(id);

        // Stored dashboards wrap their body in `data`; echoes of a payload do not
        let data = match &response["data"] {
            Value::Object(_) => &response["data"],
            _ => response,
        };

        for (field, key) in DATA {
            observe(&mut record, field, &data[*key]);
        }
        for (field, key) in AUDIT {
            observe(&mut record, field, &response[*key]);
        }
        record.set(
            "collapsable_rows_migrated",
            data["collapsableRowsMigrated"].as_bool().unwrap_or(false),
        );
        record.set("uploaded_grafana", data["uploadedGrafana"].as_bool().unwrap_or(false));
        let tags = match &data["tags"] {
            Value::Array(items) => Value::Array(items.clone()),
            _ => json!([]),
        };
        record.set("tags", tags);

        for (field, key) in DOCUMENTS {
            if let Some(text) = document_text(&data[*key]) {
                record.set(field, text);
            }
        }

        Ok(record)
    }
}
