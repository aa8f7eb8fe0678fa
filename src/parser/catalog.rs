//! Catalog lookup – resolve a [`TypeRef`] to its component definition.
//!
//! [`LibraryCatalog`] scans library directories for `*.xml` files whose root
//! is `<component>`, parses them in parallel, and keeps the first
//! definition found for each type reference (directories are searched in
//! the order given).

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use walkdir::WalkDir;

use super::parse_component_from_text;
use crate::model::{ComponentDef, TypeRef};

/// Source of component definitions.
pub trait Catalog {
    fn resolve(&self, type_ref: &TypeRef) -> Option<Arc<ComponentDef>>;
}

/// Definitions registered by hand, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    defs: BTreeMap<TypeRef, Arc<ComponentDef>>,
}

impl MemoryCatalog {
    /// Register `def`. Definitions without a valid type reference are ignored.
    pub fn insert(&mut self, def: ComponentDef) -> Option<Arc<ComponentDef>> {
        let key = def.type_ref.clone().filter(TypeRef::is_valid)?;
        let def = Arc::new(def);
        self.defs.insert(key, def.clone());
        Some(def)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn type_refs(&self) -> impl Iterator<Item = &TypeRef> {
        self.defs.keys()
    }
}

impl Catalog for MemoryCatalog {
    fn resolve(&self, type_ref: &TypeRef) -> Option<Arc<ComponentDef>> {
        self.defs.get(type_ref).cloned()
    }
}

/// Outcome of a library scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files that produced a definition.
    pub loaded: Vec<Utf8PathBuf>,
    /// XML files that were not valid component definitions.
    pub failed: Vec<(Utf8PathBuf, String)>,
    /// Definitions shadowed by an earlier one with the same type reference.
    pub duplicates: Vec<(TypeRef, Utf8PathBuf)>,
}

/// Catalog built from library directories on disk.
#[derive(Debug, Clone, Default)]
pub struct LibraryCatalog {
    search_paths: Vec<Utf8PathBuf>,
    defs: MemoryCatalog,
}

impl LibraryCatalog {
    /// Scan the provided directories in order.
    pub fn scan<P: AsRef<Utf8Path>>(
        paths: impl IntoIterator<Item = P>,
    ) -> Result<(Self, ScanReport)> {
        let search_paths: Vec<Utf8PathBuf> = paths
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        let mut files = Vec::new();
        for dir in &search_paths {
            files.extend(xml_files(dir).with_context(|| format!("Scan library {}", dir))?);
        }
        let parsed: Vec<(Utf8PathBuf, Result<ComponentDef>)> = files
            .par_iter()
            .map(|p| {
                let res = std::fs::read_to_string(p.as_std_path())
                    .with_context(|| format!("Failed to read {}", p))
                    .and_then(|text| parse_component_from_text(&text, Some(p.as_str())));
                (p.clone(), res)
            })
            .collect();

        let mut catalog = LibraryCatalog {
            search_paths,
            defs: MemoryCatalog::default(),
        };
        let mut report = ScanReport::default();
        for (path, res) in parsed {
            match res {
                Ok(def) => {
                    let Some(key) = def.type_ref.clone().filter(TypeRef::is_valid) else {
                        report
                            .failed
                            .push((path, "definition has no complete type reference".into()));
                        continue;
                    };
                    if catalog.defs.resolve(&key).is_some() {
                        log::debug!(type_ref:% = key, path:% = path; "shadowed definition");
                        report.duplicates.push((key, path));
                        continue;
                    }
                    catalog.defs.insert(def);
                    report.loaded.push(path);
                }
                Err(e) => {
                    log::warn!(path:% = path, err:% = format!("{:#}", e); "skipping library file");
                    report.failed.push((path, format!("{:#}", e)));
                }
            }
        }
        log::info!(
            definitions = catalog.defs.len(),
            failed = report.failed.len();
            "library scan finished"
        );
        Ok((catalog, report))
    }

    pub fn search_paths(&self) -> &[Utf8PathBuf] {
        &self.search_paths
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn type_refs(&self) -> impl Iterator<Item = &TypeRef> {
        self.defs.type_refs()
    }
}

impl Catalog for LibraryCatalog {
    fn resolve(&self, type_ref: &TypeRef) -> Option<Arc<ComponentDef>> {
        self.defs.resolve(type_ref)
    }
}

/// `*.xml` files below `dir` that hold a `<component>` element, in a
/// stable order.
fn xml_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir.as_std_path()).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
            continue;
        };
        if path.extension() != Some("xml") {
            continue;
        }
        let text = std::fs::read_to_string(path.as_std_path()).unwrap_or_default();
        if text.contains("<component ") || text.contains("<component>") {
            files.push(path);
        }
    }
    Ok(files)
}
