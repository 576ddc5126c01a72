//! Declared resources, read from TOML
//!
//! A manifest is one `.toml` file or a directory of them. Each file declares
//! resources as tables keyed by kind and then by name:
//!
//! ```toml
//! [alert.cpu-high]
//! alert_type = "METRIC_BASED_ALERT"
//! severity = "warning"
//! condition = '''{"op": "1", "target": 80}'''
//!
//! [dashboard.hosts]
//! widgets = [{ id = "cpu", title = "CPU" }]
//! ```
//!
//! Document fields may be JSON text or inline TOML, which is converted to
//! JSON text before reconciliation.

use anyhow::{Context, Result, bail};
use declarative::{Address, FieldKind, Record};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::resource::Catalog;

/// Every declared resource, with defaults applied
#[derive(Debug, Default)]
pub struct Manifest {
    pub resources: BTreeMap<Address, Record>,
    /// File each resource was declared in
    pub sources: BTreeMap<Address, PathBuf>,
}

impl Manifest {
    /// Load a file or a directory of `*.toml` files.
    pub fn load(path: &Path, catalog: &Catalog) -> Result<Self> {
        let mut manifest = Self::default();
        for file in manifest_files(path)? {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read manifest: {}", file.display()))?;
            let declared = parse(&content, catalog)
                .with_context(|| format!("Invalid manifest: {}", file.display()))?;
            for (address, record) in declared {
                manifest.insert(address, record, &file)?;
            }
        }
        log::debug!("Loaded {} resource(s) from {}", manifest.len(), path.display());
        Ok(manifest)
    }

    fn insert(&mut self, address: Address, record: Record, file: &Path) -> Result<()> {
        if let Some(first) = self.sources.get(&address) {
            bail!(
                "{address} is declared twice: {} and {}",
                first.display(),
                file.display()
            );
        }
        self.sources.insert(address.clone(), file.to_path_buf());
        self.resources.insert(address, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Files making up a manifest, in path order
fn manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Manifest not found: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !name.ends_with(".toml") {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Parse one file's declarations
fn parse(content: &str, catalog: &Catalog) -> Result<Vec<(Address, Record)>> {
    let doc: toml::Table = toml::from_str(content)?;
    let mut declared = Vec::new();

    for (kind, entries) in doc {
        let schema = catalog.schema(&kind)?;
        let toml::Value::Table(entries) = entries else {
            bail!("`{kind}` must be a table of named resources, e.g. [{kind}.my-name]");
        };

        for (name, body) in entries {
            let address = Address::new(kind.as_str(), name);
            let toml::Value::Table(body) = body else {
                bail!("{address} must be a table");
            };

            let mut record = Record::new();
            for (field, value) in body {
                let value = to_json(value).with_context(|| format!("{address}: field `{field}`"))?;
                let is_document = schema
                    .field(&field)
                    .is_some_and(|spec| matches!(spec.kind, FieldKind::Document(_)));
                let value = match value {
                    Value::String(text) => Value::String(text),
                    other if is_document => Value::String(serde_json::to_string(&other)?),
                    other => other,
                };
                record.set(&field, value);
            }

            catalog.prepare(&address, &mut record)?;
            declared.push((address, record));
        }
    }
    Ok(declared)
}

/// Convert a TOML value to JSON. Datetimes become RFC 3339 strings.
fn to_json(value: toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Value::Number(
            Number::from_f64(f).with_context(|| format!("{f} cannot be represented in JSON"))?,
        ),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect::<Result<_>>()?),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| Ok((k, to_json(v)?)))
                .collect::<Result<Map<_, _>>>()?,
        ),
    })
}
