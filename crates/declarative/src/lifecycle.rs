//! Lifecycle driver: runs one reconciliation cycle against the remote API.
//!
//! Each cycle validates the desired record, calls the remote API at most once
//! for writes, and hands back the next persisted record computed by the
//! merge policy in [`crate::reconcile`]. Nothing here retries; remote failures
//! come back as [`Error::Remote`] unchanged.

use crate::error::{Error, Result};
use crate::reconcile::{changed_fields, on_create, on_read, on_update, update_payload_source};
use crate::remote::{ErrorCategory, RemoteApi};
use crate::resource::ResourceType;
use crate::types::{Action, Record};

/// What a cycle would do, computed without writing anything.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub action: Action,
    /// Next persisted record for updates and no-ops. Creates only know it
    /// after the server answers; deletes have none.
    pub next: Option<Record>,
}

/// Outcome of a cycle that ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action: Action,
    /// Record to persist, or `None` when the resource is gone.
    pub record: Option<Record>,
}

/// Drives create/read/update/delete for any resource type.
#[derive(Clone, Copy)]
pub struct Driver<'a> {
    remote: &'a dyn RemoteApi,
}

impl<'a> Driver<'a> {
    pub fn new(remote: &'a dyn RemoteApi) -> Self {
        Self { remote }
    }

    /// Reject desired records whose documents do not parse, before any remote call.
    pub fn validate(&self, rt: &dyn ResourceType, desired: &Record) -> Result<()> {
        for (field, strategy) in rt.schema().documents() {
            if let Some(text) = desired.get_str(field) {
                strategy.persist(field, text)?;
            }
        }
        Ok(())
    }

    /// Create the resource remotely.
    pub fn create(&self, rt: &dyn ResourceType, desired: &Record) -> Result<Record> {
        self.validate(rt, desired)?;
        let payload = rt.to_payload(desired)?;
        let response = self.remote.create(rt.kind(), &payload)?;
        let created = rt.from_response(&response)?;
        let next = on_create(rt.schema(), desired, &created)?;
        log::info!(
            "created {} {}",
            rt.kind(),
            next.id.as_deref().unwrap_or_default()
        );
        Ok(next)
    }

    /// Refresh a persisted record. `Ok(None)` when the remote object is gone.
    pub fn read(&self, rt: &dyn ResourceType, previous: &Record) -> Result<Option<Record>> {
        let id = require_id(rt, previous)?;
        match self.remote.read(rt.kind(), id)? {
            None => {
                log::warn!("{} {id} no longer exists remotely", rt.kind());
                Ok(None)
            }
            Some(response) => {
                let observed = rt.from_response(&response)?;
                on_read(rt.schema(), Some(previous), &observed).map(Some)
            }
        }
    }

    /// Adopt an existing remote object by identifier.
    pub fn import(&self, rt: &dyn ResourceType, id: &str) -> Result<Record> {
        let response = self.remote.read(rt.kind(), id)?.ok_or_else(|| Error::NotFound {
            kind: rt.kind().to_string(),
            id: id.to_string(),
        })?;
        let mut observed = rt.from_response(&response)?;
        if observed.id.is_none() {
            observed.id = Some(id.to_string());
        }
        log::info!("imported {} {id}", rt.kind());
        on_read(rt.schema(), None, &observed)
    }

    /// Decide what a cycle would do, without writing.
    pub fn plan(
        &self,
        rt: &dyn ResourceType,
        desired: Option<&Record>,
        previous: Option<&Record>,
    ) -> Result<Proposal> {
        match (desired, previous) {
            (Some(desired), None) => {
                self.validate(rt, desired)?;
                Ok(Proposal {
                    action: Action::Create,
                    next: None,
                })
            }
            (Some(desired), Some(previous)) => {
                let next = on_update(rt.schema(), desired, previous)?;
                let changed = changed_fields(rt.schema(), &next, previous);
                let action = if changed.is_empty() {
                    Action::NoChange
                } else {
                    Action::Update { changed }
                };
                Ok(Proposal {
                    action,
                    next: Some(next),
                })
            }
            (None, Some(_)) => Ok(Proposal {
                action: Action::Delete,
                next: None,
            }),
            (None, None) => Ok(Proposal {
                action: Action::NoChange,
                next: None,
            }),
        }
    }

    /// Update the resource remotely. No call is made when nothing changed.
    pub fn update(&self, rt: &dyn ResourceType, desired: &Record, previous: &Record) -> Result<Outcome> {
        let id = require_id(rt, previous)?;
        let next = on_update(rt.schema(), desired, previous)?;
        let changed = changed_fields(rt.schema(), &next, previous);
        if changed.is_empty() {
            log::debug!("{} {id} unchanged", rt.kind());
            return Ok(Outcome {
                action: Action::NoChange,
                record: Some(next),
            });
        }

        let payload = rt.to_payload(&update_payload_source(rt.schema(), desired, previous))?;
        self.remote.update(rt.kind(), id, &payload)?;
        log::info!("updated {} {id}: {}", rt.kind(), changed.join(", "));
        Ok(Outcome {
            action: Action::Update { changed },
            record: Some(next),
        })
    }

    /// Delete the resource remotely. An object that is already gone counts as deleted.
    pub fn delete(&self, rt: &dyn ResourceType, previous: &Record) -> Result<()> {
        let id = require_id(rt, previous)?;
        match self.remote.delete(rt.kind(), id) {
            Ok(()) => {
                log::info!("deleted {} {id}", rt.kind());
                Ok(())
            }
            Err(err) if err.category() == ErrorCategory::NotFound => {
                log::warn!("{} {id} was already deleted", rt.kind());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run whichever transition takes `previous` to `desired`.
    pub fn converge(
        &self,
        rt: &dyn ResourceType,
        desired: Option<&Record>,
        previous: Option<&Record>,
    ) -> Result<Outcome> {
        match (desired, previous) {
            (Some(desired), None) => Ok(Outcome {
                action: Action::Create,
                record: Some(self.create(rt, desired)?),
            }),
            (Some(desired), Some(previous)) => self.update(rt, desired, previous),
            (None, Some(previous)) => {
                self.delete(rt, previous)?;
                Ok(Outcome {
                    action: Action::Delete,
                    record: None,
                })
            }
            (None, None) => Ok(Outcome {
                action: Action::NoChange,
                record: None,
            }),
        }
    }
}

fn require_id<'r>(rt: &dyn ResourceType, record: &'r Record) -> Result<&'r str> {
    record.id.as_deref().ok_or_else(|| Error::MissingIdentifier {
        kind: rt.kind().to_string(),
    })
}
