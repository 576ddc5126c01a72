//! Merge policy: the next persisted state of a resource, field by field.
//!
//! The remote system is authoritative for existence, identifiers and
//! server-computed fields. The reconciler is authoritative for the textual
//! shape of structured fields, because the server's reformatting is cosmetic
//! and must not cause endless no-op updates.
//!
//! | Kind       | Create          | Read                              | Update                          |
//! |------------|-----------------|-----------------------------------|---------------------------------|
//! | Attribute  | desired         | observed                          | desired                         |
//! | Document   | desired         | previous (observed if none)       | previous if equivalent, desired |
//! | Computed   | response        | observed                          | previous                        |
//! | Derived    | response, desired | observed                        | desired if set, previous        |
//!
//! Both document strategies keep the previous value on read. A digest is
//! only taken from the server on the first read after import.

use crate::error::{Error, Result};
use crate::resource::{FieldKind, Schema};
use crate::types::{Record, Transition};

/// Compute the next persisted state for a transition.
///
/// `observed` is the create response for [`Transition::Create`] and the read
/// response for [`Transition::Read`]; it is ignored for updates. Deletes
/// produce no state.
pub fn reconcile(
    schema: &Schema,
    transition: Transition,
    desired: Option<&Record>,
    previous: Option<&Record>,
    observed: Option<&Record>,
) -> Result<Option<Record>> {
    let missing = |what: &str| Error::Payload {
        kind: schema.kind().to_string(),
        message: format!("{transition} requires a {what} record"),
    };

    match transition {
        Transition::Create => {
            let desired = desired.ok_or_else(|| missing("desired"))?;
            let created = observed.ok_or_else(|| missing("created"))?;
            on_create(schema, desired, created).map(Some)
        }
        Transition::Read => {
            let observed = observed.ok_or_else(|| missing("observed"))?;
            on_read(schema, previous, observed).map(Some)
        }
        Transition::Update => {
            let desired = desired.ok_or_else(|| missing("desired"))?;
            let previous = previous.ok_or_else(|| missing("previous"))?;
            on_update(schema, desired, previous).map(Some)
        }
        Transition::Delete => Ok(None),
    }
}

/// State after a successful create.
pub fn on_create(schema: &Schema, desired: &Record, created: &Record) -> Result<Record> {
    let id = created.id.clone().ok_or_else(|| Error::MissingIdentifier {
        kind: schema.kind().to_string(),
    })?;
    let mut next = Record::new().with_id(id);

    for field in schema.fields() {
        let name = field.name;
        match field.kind {
            FieldKind::Attribute => copy(&mut next, desired, name),
            FieldKind::Document(strategy) => {
                if let Some(text) = desired.get_str(name) {
                    next.set(name, strategy.persist(name, text)?);
                }
            }
            FieldKind::Computed => copy(&mut next, created, name),
            FieldKind::Derived => {
                if created.is_set(name) {
                    copy(&mut next, created, name);
                } else {
                    copy(&mut next, desired, name);
                }
            }
        }
    }
    Ok(next)
}

/// State after a refresh. `previous` is `None` on the first read after import.
pub fn on_read(schema: &Schema, previous: Option<&Record>, observed: &Record) -> Result<Record> {
    let id = observed
        .id
        .clone()
        .or_else(|| previous.and_then(|p| p.id.clone()))
        .ok_or_else(|| Error::MissingIdentifier {
            kind: schema.kind().to_string(),
        })?;
    let mut next = Record::new().with_id(id);

    for field in schema.fields() {
        let name = field.name;
        match field.kind {
            FieldKind::Attribute | FieldKind::Computed | FieldKind::Derived => {
                copy(&mut next, observed, name);
            }
            FieldKind::Document(strategy) => {
                let kept = previous.and_then(|p| p.get_str(name));
                match (kept, observed.get_str(name)) {
                    (Some(kept), Some(seen)) => {
                        if !strategy.equivalent(seen, kept) {
                            log::info!(
                                "{}: remote `{name}` differs from last applied value; keeping applied value",
                                schema.kind()
                            );
                        }
                        next.set(name, kept);
                    }
                    (Some(kept), None) => next.set(name, kept),
                    (None, Some(seen)) => next.set(name, strategy.observe(name, seen)?),
                    (None, None) => {}
                }
            }
        }
    }
    Ok(next)
}

/// State after a successful update.
pub fn on_update(schema: &Schema, desired: &Record, previous: &Record) -> Result<Record> {
    let id = previous.id.clone().ok_or_else(|| Error::MissingIdentifier {
        kind: schema.kind().to_string(),
    })?;
    let mut next = Record::new().with_id(id);

    for field in schema.fields() {
        let name = field.name;
        match field.kind {
            FieldKind::Attribute => copy(&mut next, desired, name),
            FieldKind::Document(strategy) => {
                if let Some(text) = desired.get_str(name) {
                    let value = match previous.get_str(name) {
                        Some(kept) if strategy.equivalent(text, kept) => kept.to_string(),
                        _ => strategy.persist(name, text)?,
                    };
                    next.set(name, value);
                }
            }
            FieldKind::Computed => copy(&mut next, previous, name),
            FieldKind::Derived => {
                if desired.is_set(name) {
                    copy(&mut next, desired, name);
                } else {
                    copy(&mut next, previous, name);
                }
            }
        }
    }
    Ok(next)
}

/// The record to send on update: the user's values, with the identifier and
/// server-managed fields carried over from `previous`.
pub fn update_payload_source(schema: &Schema, desired: &Record, previous: &Record) -> Record {
    let mut source = desired.clone();
    source.id.clone_from(&previous.id);

    for field in schema.fields() {
        let carry = match field.kind {
            FieldKind::Computed => true,
            FieldKind::Derived => !desired.is_set(field.name),
            FieldKind::Attribute | FieldKind::Document(_) => false,
        };
        if carry {
            copy(&mut source, previous, field.name);
        }
    }
    source
}

/// Fields whose persisted value would change, excluding server-computed ones.
pub fn changed_fields(schema: &Schema, next: &Record, previous: &Record) -> Vec<String> {
    schema
        .fields()
        .iter()
        .filter(|f| !matches!(f.kind, FieldKind::Computed))
        .filter(|f| next.get(f.name) != previous.get(f.name))
        .map(|f| f.name.to_string())
        .collect()
}

fn copy(into: &mut Record, from: &Record, field: &str) {
    match from.get(field) {
        Some(value) => into.set(field, value.clone()),
        None => {
            into.remove(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::policy::{alert_condition, none};
    use crate::resource::{FieldSpec, Strategy};

    fn schema() -> Schema {
        Schema::new(
            "alert",
            vec![
                FieldSpec::attribute("name"),
                FieldSpec::document("condition", Strategy::Canonical(alert_condition())),
                FieldSpec::document("layout", Strategy::Canonical(none())),
                FieldSpec::document("widgets", Strategy::Digest),
                FieldSpec::computed("state"),
                FieldSpec::computed("create_at"),
                FieldSpec::derived("source"),
            ],
        )
    }

    fn previous() -> Record {
        Record::new()
            .with_id("7")
            .with("name", "cpu")
            .with("condition", r#"{"a":1}"#)
            .with("state", "inactive")
            .with("create_at", "2024-01-01")
            .with("source", "http://x/alerts")
    }

    #[test]
    fn test_create_takes_desired_and_server_fields() {
        let desired = Record::new()
            .with("name", "cpu")
            .with("condition", r#"{ "a": 1 }"#)
            .with("widgets", r#"[{"id":"w"}]"#);
        let created = Record::new()
            .with_id("9")
            .with("name", "cpu")
            .with("condition", r#"{"a":1,"absentFor":0}"#)
            .with("state", "inactive")
            .with("source", "http://x/alerts");

        let next = on_create(&schema(), &desired, &created).unwrap();
        assert_eq!(next.id.as_deref(), Some("9"));
        assert_eq!(next.get_str("condition"), Some(r#"{ "a": 1 }"#));
        assert_eq!(next.get_str("state"), Some("inactive"));
        assert_eq!(next.get_str("source"), Some("http://x/alerts"));
        let widgets = next.get_str("widgets").unwrap();
        assert_eq!(widgets, Digest::of_text(r#"[{"id":"w"}]"#).unwrap().as_str());
    }

    #[test]
    fn test_create_without_identifier_fails() {
        let desired = Record::new().with("name", "cpu");
        let err = on_create(&schema(), &desired, &Record::new()).unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier { .. }));
    }

    #[test]
    fn test_create_malformed_document_is_fatal() {
        let desired = Record::new().with("condition", "{\"a\":");
        let created = Record::new().with_id("1");
        let err = on_create(&schema(), &desired, &created).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { ref field, .. } if field == "condition"));
    }

    #[test]
    fn test_read_masks_reformatting() {
        let observed = Record::new()
            .with_id("7")
            .with("name", "cpu")
            .with("condition", r#"{"absentFor":0,"alertOnAbsent":false,"a":1}"#)
            .with("state", "firing")
            .with("source", "http://x/alerts");

        let next = on_read(&schema(), Some(&previous()), &observed).unwrap();
        assert_eq!(next.get_str("condition"), Some(r#"{"a":1}"#));
        assert_eq!(next.get_str("state"), Some("firing"));
        // Server dropped create_at from its response
        assert!(!next.is_set("create_at"));
    }

    #[test]
    fn test_read_after_import_uses_observed_canonical_form() {
        let observed = Record::new()
            .with_id("7")
            .with("condition", r#"{"b":2,"groupBy":[],"a":1}"#);
        let next = on_read(&schema(), None, &observed).unwrap();
        assert_eq!(next.get_str("condition"), Some(r#"{"a":1,"b":2}"#));
    }

    #[test]
    fn test_read_keeps_previous_digest() {
        let applied = Digest::of_text("[1]").unwrap().to_string();
        let prev = previous().with("widgets", applied.as_str());
        let observed = Record::new().with_id("7").with("widgets", r#"[1, {"injected": true}]"#);
        let next = on_read(&schema(), Some(&prev), &observed).unwrap();
        assert_eq!(next.get_str("widgets"), Some(applied.as_str()));

        // first read after import digests what the server reports
        let imported = on_read(&schema(), None, &observed).unwrap();
        assert_eq!(
            imported.get_str("widgets"),
            Some(Digest::of_text(r#"[1,{"injected":true}]"#).unwrap().as_str())
        );
    }

    #[test]
    fn test_update_equivalent_document_keeps_previous() {
        let desired = Record::new()
            .with("name", "cpu")
            .with("condition", r#"{"absentFor":0,"alertOnAbsent":false,"a":1}"#);
        let next = on_update(&schema(), &desired, &previous()).unwrap();
        assert_eq!(next.get_str("condition"), Some(r#"{"a":1}"#));
        assert!(changed_fields(&schema(), &next, &previous()).is_empty());
    }

    #[test]
    fn test_update_real_change_takes_desired() {
        let desired = Record::new().with("name", "cpu").with("condition", r#"{"a":2}"#);
        let next = on_update(&schema(), &desired, &previous()).unwrap();
        assert_eq!(next.get_str("condition"), Some(r#"{"a":2}"#));
        assert_eq!(changed_fields(&schema(), &next, &previous()), vec!["condition"]);
    }

    #[test]
    fn test_update_carries_server_fields() {
        let desired = Record::new()
            .with("name", "mem")
            .with("condition", r#"{"a":1}"#)
            .with("state", "bogus");
        let next = on_update(&schema(), &desired, &previous()).unwrap();
        assert_eq!(next.id.as_deref(), Some("7"));
        assert_eq!(next.get_str("state"), Some("inactive"));
        assert_eq!(next.get_str("create_at"), Some("2024-01-01"));
        assert_eq!(next.get_str("source"), Some("http://x/alerts"));
        assert_eq!(next.get_str("name"), Some("mem"));
    }

    #[test]
    fn test_update_payload_source() {
        let desired = Record::new().with("name", "cpu").with("condition", r#"{"a":2}"#);
        let source = update_payload_source(&schema(), &desired, &previous());
        assert_eq!(source.id.as_deref(), Some("7"));
        assert_eq!(source.get_str("condition"), Some(r#"{"a":2}"#));
        assert_eq!(source.get_str("state"), Some("inactive"));
        assert_eq!(source.get_str("source"), Some("http://x/alerts"));
    }

    #[test]
    fn test_dispatch() {
        let s = schema();
        assert!(reconcile(&s, Transition::Delete, None, Some(&previous()), None)
            .unwrap()
            .is_none());
        assert!(reconcile(&s, Transition::Update, None, Some(&previous()), None).is_err());
        let desired = Record::new().with("name", "cpu").with("condition", r#"{"a":1}"#);
        let next = reconcile(&s, Transition::Update, Some(&desired), Some(&previous()), None)
            .unwrap()
            .unwrap();
        assert_eq!(next.get_str("condition"), Some(r#"{"a":1}"#));
    }
}
