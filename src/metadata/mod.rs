//! Runtime type table resolver
//!
//! An alternate route to the session root. The runtime keeps a table of class
//! descriptors; we resolve a class by its fully-qualified name, then read one of
//! its static fields, which (directly or through a short pointer chain) holds the
//! same root object the graph locator finds by walking the node list.
//!
//! Resolution costs one bulk read of the table plus two scatter rounds: the
//! descriptors' name pointers, then the name strings themselves.

use crate::locator::{classify_label, read_label, LocateResult, LocatorConfig};
use crate::platform::{is_user_address, MemoryReader};
use crate::scatter::ScatterPipeline;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::{debug, info};

/// Location and size of the runtime's type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTable {
    /// Address of the first entry
    pub base: usize,
    /// Number of entries
    pub count: usize,
}

/// Static field holding (a path to) the root object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFieldPath {
    /// Fully-qualified class name, `Namespace.Name`
    pub class_name: String,
    /// Offset of the field inside the class's static data
    pub field_offset: usize,
    /// Extra dereferences from the field value to the root
    pub chain: Vec<usize>,
}

impl Default for StaticFieldPath {
    fn default() -> Self {
        Self {
            class_name: "EFT.GameWorld".to_string(),
            field_offset: 0x0,
            chain: Vec::new(),
        }
    }
}

/// Descriptor layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeTableConfig {
    /// Descriptor to its name string pointer
    pub name_offset: usize,
    /// Descriptor to its namespace string pointer
    pub namespace_offset: usize,
    /// Descriptor to its static data pointer
    pub static_fields_offset: usize,
    /// Bytes read per name string
    pub name_max_len: usize,
    /// Static field leading to the session root
    pub root_field: StaticFieldPath,
}

impl Default for TypeTableConfig {
    fn default() -> Self {
        Self {
            name_offset: 0x10,
            namespace_offset: 0x18,
            static_fields_offset: 0xB8,
            name_max_len: 128,
            root_field: StaticFieldPath::default(),
        }
    }
}

/// Resolves classes by name through the type table
#[derive(Debug, Clone, Default)]
pub struct TypeTableResolver {
    config: TypeTableConfig,
}

impl TypeTableResolver {
    /// Resolver for the given descriptor layout
    pub fn new(config: TypeTableConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &TypeTableConfig {
        &self.config
    }

    /// Address of the descriptor whose `Namespace.Name` equals `full_name`
    /// (ASCII case-insensitive)
    ///
    /// Fails with [`Error::NotFound`] when nothing matches and
    /// [`Error::Ambiguous`] when more than one distinct descriptor does.
    pub fn resolve_class<R: MemoryReader>(
        &self,
        reader: &R,
        table: TypeTable,
        full_name: &str,
    ) -> Result<usize> {
        let descriptors = self.read_descriptors(reader, table)?;
        debug!(entries = descriptors.len(), "type table read");

        let name_offset = self.config.name_offset;
        let namespace_offset = self.config.namespace_offset;
        let len = self.config.name_max_len;
        let matches = RefCell::new(Vec::new());
        let matches_ref = &matches;

        let mut pipeline = ScatterPipeline::new();
        let pointers = pipeline.add_round();
        let _strings = pipeline.add_round();

        for &descriptor in &descriptors {
            let round = pipeline.round(pointers);
            round.prepare_read::<u64>(descriptor + name_offset);
            round.prepare_read::<u64>(descriptor + namespace_offset);
        }

        pipeline.round(pointers).on_completed(move |results, next| {
            let mut pending = Vec::with_capacity(descriptors.len());

            for descriptor in descriptors {
                let Some(name) = results.try_read_pointer(descriptor + name_offset) else {
                    continue;
                };
                let namespace = results.try_read_pointer(descriptor + namespace_offset);

                next.prepare(name, len);
                if let Some(ns) = namespace {
                    next.prepare(ns, len);
                }
                pending.push((descriptor, name, namespace));
            }

            next.on_completed(move |results, _| {
                for (descriptor, name, namespace) in pending {
                    let Some(name) = results.try_read_string(name, len) else {
                        continue;
                    };
                    let namespace = namespace
                        .and_then(|ns| results.try_read_string(ns, len))
                        .unwrap_or_default();

                    if qualified_name_matches(&namespace, &name, full_name) {
                        matches_ref.borrow_mut().push(descriptor);
                    }
                }
            });
        });

        pipeline.execute(reader)?;

        let mut matches = matches.into_inner();
        matches.sort_unstable();
        matches.dedup();

        match matches.as_slice() {
            [] => Err(Error::NotFound(format!("class '{}' not in type table", full_name))),
            [class] => {
                debug!(class = full_name, address = format_args!("0x{:X}", class), "class resolved");
                Ok(*class)
            }
            many => Err(Error::Ambiguous {
                name: full_name.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Follow a class's static field to the object it designates
    pub fn read_static_root<R: MemoryReader>(
        &self,
        reader: &R,
        class: usize,
        path: &StaticFieldPath,
    ) -> Result<usize> {
        let root = reader
            .read_pointer(class + self.config.static_fields_offset)
            .and_then(|statics| reader.read_pointer(statics + path.field_offset))
            .and_then(|value| reader.read_pointer_chain(value, &path.chain));

        match root {
            Ok(root) => Ok(root),
            Err(e) if e.is_hard() => Err(e.into()),
            Err(e) => Err(Error::NotFound(format!(
                "static root of '{}' unreadable: {}",
                path.class_name, e
            ))),
        }
    }

    /// Find the session root through the configured static field
    ///
    /// The session label is read and classified exactly as the graph locator
    /// does, so both routes agree on what counts as a real session.
    pub fn locate<R: MemoryReader>(
        &self,
        reader: &R,
        table: TypeTable,
        labels: &LocatorConfig,
    ) -> Result<LocateResult> {
        let path = &self.config.root_field;
        let class = self.resolve_class(reader, table, &path.class_name)?;
        let root_address = self.read_static_root(reader, class, path)?;

        let session_label = read_label(reader, root_address, labels)
            .and_then(|label| classify_label(labels, &label).map(|_| label))
            .map_err(|reason| Error::NotFound(format!("root at 0x{:X}: {}", root_address, reason)))?;

        info!(
            class = %path.class_name,
            root = format_args!("0x{:X}", root_address),
            label = %session_label,
            "session root found through type table"
        );

        Ok(LocateResult {
            root_address,
            session_label,
        })
    }

    /// Descriptor pointers from the table, in one read; null slots dropped
    fn read_descriptors<R: MemoryReader>(&self, reader: &R, table: TypeTable) -> Result<Vec<usize>> {
        if !is_user_address(table.base) || table.count == 0 {
            return Err(Error::NotFound(format!(
                "type table at 0x{:X} with {} entries",
                table.base, table.count
            )));
        }

        let entries = match reader.read_pointer_array(table.base, table.count) {
            Ok(entries) => entries,
            Err(e) if e.is_hard() => return Err(e.into()),
            Err(e) => return Err(Error::NotFound(format!("type table unreadable: {}", e))),
        };

        Ok(entries
            .into_iter()
            .filter(|&descriptor| is_user_address(descriptor))
            .collect())
    }
}

fn qualified_name_matches(namespace: &str, name: &str, wanted: &str) -> bool {
    if namespace.is_empty() {
        return name.eq_ignore_ascii_case(wanted);
    }

    // `Namespace.Name` without allocating
    wanted.len() == namespace.len() + 1 + name.len()
        && wanted.is_char_boundary(namespace.len())
        && wanted[..namespace.len()].eq_ignore_ascii_case(namespace)
        && wanted.as_bytes()[namespace.len()] == b'.'
        && wanted[namespace.len() + 1..].eq_ignore_ascii_case(name)
}
