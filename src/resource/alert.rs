//! Alert rules (`/api/v1/rules`)

use declarative::resource::{document_text, parse_document};
use declarative::{Address, Error, FieldSpec, Record, ResourceType, Schema, Strategy, policy};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

use super::{Shape, ValidationError, check_one_of, default_to, id_of, observe, require};

pub const ALERT_TYPES: &[&str] = &[
    "METRIC_BASED_ALERT",
    "LOGS_BASED_ALERT",
    "TRACES_BASED_ALERT",
    "EXCEPTIONS_BASED_ALERT",
];

pub const RULE_TYPES: &[&str] = &["threshold_rule", "promql_rule"];

pub const SEVERITIES: &[&str] = &["critical", "error", "warning", "info"];

pub const DEFAULT_DESCRIPTION: &str =
    "This alert is fired when the defined metric (current value: {{$value}}) crosses the threshold ({{$threshold}})";
pub const DEFAULT_SUMMARY: &str =
    "The rule threshold is set to {{$threshold}}, and the observed metric value is {{$value}}";
pub const DEFAULT_EVAL_WINDOW: &str = "5m0s";
pub const DEFAULT_FREQUENCY: &str = "1m0s";
pub const DEFAULT_VERSION: &str = "v4";

/// Label marking rules owned by settle. Stripped again on read.
const MANAGED_BY: (&str, &str) = ("managedBy", "settle");

/// Label keys written from other fields; declaring them in `labels` would never converge
const RESERVED_LABELS: &[&str] = &[MANAGED_BY.0, "severity"];

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+h)?([0-9]+m)?([0-9]+s)?$").expect("valid duration pattern"));
static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v\d+$").expect("valid version pattern"));

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(
        "alert",
        vec![
            FieldSpec::attribute("alert"),
            FieldSpec::attribute("alert_type"),
            FieldSpec::attribute("broadcast_to_all"),
            FieldSpec::document("condition", Strategy::Canonical(policy::alert_condition())),
            FieldSpec::attribute("description"),
            FieldSpec::attribute("disabled"),
            FieldSpec::attribute("eval_window"),
            FieldSpec::attribute("frequency"),
            FieldSpec::attribute("labels"),
            FieldSpec::attribute("preferred_channels"),
            FieldSpec::attribute("rule_type"),
            FieldSpec::attribute("severity"),
            FieldSpec::derived("source"),
            FieldSpec::attribute("summary"),
            FieldSpec::attribute("version"),
            FieldSpec::computed("state"),
            FieldSpec::computed("create_at"),
            FieldSpec::computed("create_by"),
            FieldSpec::computed("update_at"),
            FieldSpec::computed("update_by"),
        ],
    )
});

/// Attribute shapes other than plain strings
pub const SHAPES: &[(&str, Shape)] = &[
    ("broadcast_to_all", Shape::Flag),
    ("disabled", Shape::Flag),
    ("labels", Shape::Map),
    ("preferred_channels", Shape::List),
];

/// Record fields that map one-to-one onto a top-level camelCase key
const PLAIN: &[(&str, &str)] = &[
    ("alert", "alert"),
    ("alert_type", "alertType"),
    ("eval_window", "evalWindow"),
    ("frequency", "frequency"),
    ("rule_type", "ruleType"),
    ("source", "source"),
    ("version", "version"),
];

const AUDIT: &[(&str, &str)] = &[
    ("state", "state"),
    ("create_at", "createAt"),
    ("create_by", "createBy"),
    ("update_at", "updateAt"),
    ("update_by", "updateBy"),
];

/// A SigNoz alert rule
#[derive(Debug, Clone)]
pub struct Alert {
    default_source: String,
}

impl Alert {
    pub fn new(endpoint: &str) -> Self {
        Self {
            default_source: format!("{endpoint}/alerts"),
        }
    }

    /// Fill the values SigNoz would otherwise default differently or echo back.
    pub fn apply_defaults(&self, address: &Address, record: &mut Record) {
        default_to(record, "alert", address.name.as_str());
        default_to(record, "description", DEFAULT_DESCRIPTION);
        default_to(record, "summary", DEFAULT_SUMMARY);
        default_to(record, "eval_window", DEFAULT_EVAL_WINDOW);
        default_to(record, "frequency", DEFAULT_FREQUENCY);
        default_to(record, "version", DEFAULT_VERSION);
        default_to(record, "disabled", false);
        default_to(record, "broadcast_to_all", false);
        default_to(record, "rule_type", "threshold_rule");
        default_to(record, "labels", json!({}));
        default_to(record, "preferred_channels", json!([]));
        default_to(record, "source", self.default_source.as_str());
    }

    pub fn validate(&self, address: &Address, record: &Record) -> Result<(), ValidationError> {
        require(address, record, "alert_type")?;
        require(address, record, "condition")?;
        check_one_of(address, record, "alert_type", ALERT_TYPES)?;
        check_one_of(address, record, "rule_type", RULE_TYPES)?;
        check_one_of(address, record, "severity", SEVERITIES)?;

        for field in ["eval_window", "frequency"] {
            if let Some(value) = record.get_str(field)
                && !DURATION.is_match(value)
            {
                return Err(ValidationError::Invalid {
                    address: address.clone(),
                    field: field.to_string(),
                    value: value.to_string(),
                    expected: "a duration like 5m0s".to_string(),
                });
            }
        }
        if let Some(value) = record.get_str("version")
            && !VERSION.is_match(value)
        {
            return Err(ValidationError::Invalid {
                address: address.clone(),
                field: "version".to_string(),
                value: value.to_string(),
                expected: "a version like v4".to_string(),
            });
        }

        if let Some(labels) = record.get("labels").and_then(Value::as_object)
            && let Some(key) = RESERVED_LABELS.iter().find(|key| labels.contains_key(**key))
        {
            return Err(ValidationError::Invalid {
                address: address.clone(),
                field: "labels".to_string(),
                value: (*key).to_string(),
                expected: "free of reserved keys (use the `severity` field for severity)".to_string(),
            });
        }
        Ok(())
    }
}

impl ResourceType for Alert {
    fn kind(&self) -> &'static str {
        "alert"
    }

    fn description(&self) -> &'static str {
        "Alert"
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn to_payload(&self, record: &Record) -> declarative::Result<Value> {
        let mut body = Map::new();
        for (field, key) in PLAIN {
            if let Some(value) = record.get(field) {
                body.insert((*key).to_string(), value.clone());
            }
        }

        body.insert(
            "annotations".into(),
            json!({
                "description": record.get_str("description").unwrap_or_default(),
                "summary": record.get_str("summary").unwrap_or_default(),
            }),
        );
        body.insert(
            "broadcastToAll".into(),
            Value::Bool(record.get_bool("broadcast_to_all").unwrap_or(false)),
        );
        body.insert("disabled".into(), Value::Bool(record.get_bool("disabled").unwrap_or(false)));

        let condition = parse_document(record, "condition")?.ok_or_else(|| Error::MissingField {
            kind: "alert".into(),
            field: "condition".into(),
        })?;
        body.insert("condition".into(), condition);

        let mut labels = record
            .get("labels")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        labels.insert(MANAGED_BY.0.into(), MANAGED_BY.1.into());
        if let Some(severity) = record.get_str("severity") {
            labels.insert("severity".into(), severity.into());
        }
        body.insert("labels".into(), Value::Object(labels));

        body.insert(
            "preferredChannels".into(),
            record.get("preferred_channels").cloned().unwrap_or_else(|| json!([])),
        );

        Ok(Value::Object(body))
    }

    fn from_response(&self, response: &Value) -> declarative::Result<Record> {
        let id = id_of(&response["id"]).ok_or_else(|| Error::Payload {
            kind: "alert".into(),
            message: "response has no rule id".into(),
        })?;
        let mut record = Record::new().with_id(id);

        for (field, key) in PLAIN.iter().chain(AUDIT) {
            observe(&mut record, field, &response[*key]);
        }
        observe(&mut record, "description", &response["annotations"]["description"]);
        observe(&mut record, "summary", &response["annotations"]["summary"]);
        record.set(
            "broadcast_to_all",
            response["broadcastToAll"].as_bool().unwrap_or(false),
        );
        record.set("disabled", response["disabled"].as_bool().unwrap_or(false));

        if let Some(text) = document_text(&response["condition"]) {
            record.set("condition", text);
        }

        let mut labels = response["labels"].as_object().cloned().unwrap_or_default();
        labels.remove(MANAGED_BY.0);
        if let Some(severity) = labels.remove("severity") {
            record.set("severity", severity);
        }
        record.set("labels", Value::Object(labels));

        let channels = match &response["preferredChannels"] {
            Value::Array(items) => Value::Array(items.clone()),
            _ => json!([]),
        };
        record.set("preferred_channels", channels);

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Driver, MockRemote, RemoteApi};

    fn alert() -> Alert {
        Alert::new("http://signoz:3301")
    }

    fn addr() -> Address {
        Address::new("alert", "cpu-high")
    }

    fn declared() -> Record {
        let mut record = Record::new()
            .with("alert_type", "METRIC_BASED_ALERT")
            .with("severity", "warning")
            .with("labels", json!({ "team": "infra" }))
            .with("condition", r#"{"op": "1", "target": 80, "compositeQuery": {"queryType": "builder"}}"#);
        alert().apply_defaults(&addr(), &mut record);
        record
    }

    /// Remote that stores what it is sent and adds what SigNoz adds.
    fn signoz() -> MockRemote {
        MockRemote::new().with_rewrite(|_, payload| {
            let mut stored = payload.clone();
            if let Some(condition) = stored.get_mut("condition").and_then(Value::as_object_mut) {
                condition.insert("absentFor".into(), json!(0));
                condition.insert("alertOnAbsent".into(), json!(false));
            }
            stored["state"] = json!("inactive");
            stored["createAt"] = json!("2024-05-01T10:00:00Z");
            stored["createBy"] = json!("admin@example.com");
            stored
        })
    }

    #[test]
    fn test_defaults() {
        let record = declared();
        assert_eq!(record.get_str("alert"), Some("cpu-high"));
        assert_eq!(record.get_str("eval_window"), Some("5m0s"));
        assert_eq!(record.get_str("frequency"), Some("1m0s"));
        assert_eq!(record.get_str("version"), Some("v4"));
        assert_eq!(record.get_str("rule_type"), Some("threshold_rule"));
        assert_eq!(record.get_str("source"), Some("http://signoz:3301/alerts"));
        assert_eq!(record.get_bool("disabled"), Some(false));
        assert_eq!(record.get_str("description"), Some(DEFAULT_DESCRIPTION));

        let mut custom = Record::new().with("source", "https://ops/alerts").with("frequency", "30s");
        alert().apply_defaults(&addr(), &mut custom);
        assert_eq!(custom.get_str("source"), Some("https://ops/alerts"));
        assert_eq!(custom.get_str("frequency"), Some("30s"));
    }

    #[test]
    fn test_validate() {
        assert!(alert().validate(&addr(), &declared()).is_ok());

        let bad_window = declared().with("eval_window", "5 minutes");
        assert!(matches!(
            alert().validate(&addr(), &bad_window),
            Err(ValidationError::Invalid { field, .. }) if field == "eval_window"
        ));

        let bad_version = declared().with("version", "4");
        assert!(alert().validate(&addr(), &bad_version).is_err());

        let bad_severity = declared().with("severity", "fatal");
        let err = alert().validate(&addr(), &bad_severity).unwrap_err();
        assert_eq!(
            err.to_string(),
            "alert.cpu-high: `severity` must be one of critical, error, warning, info, got `fatal`"
        );

        let mut no_type = declared();
        no_type.remove("alert_type");
        assert!(matches!(
            alert().validate(&addr(), &no_type),
            Err(ValidationError::Missing { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_reserved_labels() {
        for key in ["severity", "managedBy"] {
            let record = declared().with("labels", json!({ "team": "infra", key: "critical" }));
            assert!(matches!(
                alert().validate(&addr(), &record),
                Err(ValidationError::Invalid { field, value, .. }) if field == "labels" && value == key
            ));
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = alert().to_payload(&declared()).unwrap();
        assert_eq!(payload["alert"], "cpu-high");
        assert_eq!(payload["alertType"], "METRIC_BASED_ALERT");
        assert_eq!(payload["evalWindow"], "5m0s");
        assert_eq!(payload["annotations"]["summary"], DEFAULT_SUMMARY);
        assert_eq!(payload["condition"]["target"], 80);
        assert_eq!(
            payload["labels"],
            json!({ "team": "infra", "severity": "warning", "managedBy": "settle" })
        );
        assert_eq!(payload["preferredChannels"], json!([]));
    }

    #[test]
    fn test_payload_rejects_malformed_condition() {
        let record = declared().with("condition", "{\"op\": ");
        assert!(matches!(
            alert().to_payload(&record),
            Err(Error::MalformedInput { field, .. }) if field == "condition"
        ));
    }

    #[test]
    fn test_response_strips_managed_labels() {
        let response = json!({
            "id": 7,
            "alert": "cpu-high",
            "alertType": "METRIC_BASED_ALERT",
            "annotations": { "description": "d", "summary": "s" },
            "condition": { "target": 80, "absentFor": 0 },
            "labels": { "team": "infra", "severity": "critical", "managedBy": "settle" },
            "preferredChannels": null,
            "state": "firing",
            "updateBy": "ops@example.com"
        });
        let record = alert().from_response(&response).unwrap();
        assert_eq!(record.id.as_deref(), Some("7"));
        assert_eq!(record.get("labels"), Some(&json!({ "team": "infra" })));
        assert_eq!(record.get_str("severity"), Some("critical"));
        assert_eq!(record.get("preferred_channels"), Some(&json!([])));
        assert_eq!(record.get_bool("disabled"), Some(false));
        assert_eq!(record.get_str("state"), Some("firing"));
        assert_eq!(record.get_str("update_by"), Some("ops@example.com"));
        assert_eq!(record.get_str("description"), Some("d"));
        assert!(record.get_str("condition").unwrap().contains("absentFor"));
    }

    #[test]
    fn test_converges_against_injected_defaults() {
        let remote = signoz();
        let driver = Driver::new(&remote);
        let rt = alert();

        let created = driver.create(&rt, &declared()).unwrap();
        assert_eq!(created.get_str("state"), Some("inactive"));
        assert_eq!(created.get_str("create_by"), Some("admin@example.com"));

        for _ in 0..3 {
            let refreshed = driver.read(&rt, &created).unwrap().unwrap();
            let proposal = driver.plan(&rt, Some(&declared()), Some(&refreshed)).unwrap();
            assert_eq!(proposal.action, declarative::Action::NoChange);
        }
        assert_eq!(remote.write_calls(), 1);

        let id = created.id.clone().unwrap();
        let stored = remote.read("alert", &id).unwrap().unwrap();
        assert_eq!(stored["labels"]["managedBy"], "settle");
    }
}
