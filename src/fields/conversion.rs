//! Snapshot and restore protocol for destructive field changes.
//!
//! A destructive change never drops the old storage. [`snapshot`] renames it
//! to a backup name and records it in a [`BackupData`], together with the
//! field definition, its select options and, for link rows, the mirroring
//! field on the other table. The new storage is then created with
//! [`materialize`] and filled from the backup by [`populate_from_backup`].
//!
//! A backup is later either put back in place with [`restore`] or dropped for
//! good with [`discard`]. All functions run inside the caller's storage
//! transaction and catalog draft, so a failure leaves nothing half done.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::{CatalogResult, CatalogState, Field, FieldId, FieldKind, FieldObject, SelectOption};
use crate::fields::error::{FieldError, FieldResult};
use crate::fields::registry::{field_type, storage_of, StorageShape, StoredValue};
use crate::storage::{CellValue, ColumnName, LinkSide, RelationName, StorageError};
use crate::transaction::{Transaction, TxActive};

/// A field definition with its select options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub field: Field,
    #[serde(default)]
    pub select_options: Vec<SelectOption>,
}

impl FieldSnapshot {
    /// Capture the current definition of a field.
    pub fn capture(meta: &CatalogState, field_id: FieldId) -> CatalogResult<Self> {
        Ok(Self {
            field: meta.field(field_id)?.clone(),
            select_options: meta.options_of(field_id).into_iter().cloned().collect(),
        })
    }

    pub fn object(&self) -> FieldObject {
        FieldObject {
            field: self.field.clone(),
            options: self.select_options.clone(),
        }
    }
}

/// Storage renamed aside by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupArtifact {
    Column {
        relation: RelationName,
        column: ColumnName,
    },
    LinkTable {
        name: RelationName,
    },
}

/// Everything needed to put a field back the way it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupData {
    pub field: FieldSnapshot,
    /// The other half of a link row pair, removed together with the field.
    #[serde(default)]
    pub related_field: Option<FieldSnapshot>,
    pub artifacts: Vec<BackupArtifact>,
}

fn backup_tag() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// Rename the storage of `field_id` aside and record it.
///
/// For a link row field the mirroring field is removed from the catalog and
/// kept in the backup; both halves share the renamed link table.
pub(crate) fn snapshot(
    tx: &mut Transaction<TxActive>,
    meta: &mut CatalogState,
    field_id: FieldId,
) -> FieldResult<BackupData> {
    let field = FieldSnapshot::capture(meta, field_id)?;
    let relation = meta.table(field.field.table_id)?.relation.clone();
    let tag = backup_tag();

    let artifact = match storage_of(&field.field) {
        StorageShape::Column(column) => {
            let backup = column.backup(&tag).map_err(StorageError::from)?;
            tx.rename_column(&relation, &column, &backup)?;
            BackupArtifact::Column {
                relation,
                column: backup,
            }
        }
        StorageShape::Links { table, .. } => {
            let backup = table.backup(&tag).map_err(StorageError::from)?;
            tx.rename_link_table(&table, &backup)?;
            BackupArtifact::LinkTable { name: backup }
        }
    };

    let related_field = match field.field.kind.link_row_related_field_id() {
        Some(related_id) if related_id != field_id && meta.has_field(related_id) => {
            let related = FieldSnapshot::capture(meta, related_id)?;
            meta.remove_field(related_id)?;
            Some(related)
        }
        _ => None,
    };

    tracing::info!(
        field_id,
        related_field_id = related_field.as_ref().map(|r| r.field.id),
        artifact = ?artifact,
        "created field backup"
    );

    Ok(BackupData {
        field,
        related_field,
        artifacts: vec![artifact],
    })
}

/// Create fresh storage for the current definition of `field_id`.
///
/// A link row field to another table gets a new mirroring field there, named
/// after this field's table.
pub(crate) fn materialize(
    tx: &mut Transaction<TxActive>,
    meta: &mut CatalogState,
    field_id: FieldId,
) -> FieldResult<()> {
    let mut field = meta.field(field_id)?.clone();

    if let FieldKind::LinkRow {
        link_row_table_id, ..
    } = field.kind
    {
        let related = if link_row_table_id == field.table_id {
            None
        } else {
            let own_table = meta.table(field.table_id)?.name.clone();
            let name = meta.find_unused_name(link_row_table_id, &own_table, "", None);
            let partner = meta.insert_field(
                link_row_table_id,
                name,
                FieldKind::LinkRow {
                    link_row_table_id: field.table_id,
                    link_row_related_field_id: Some(field_id),
                },
            )?;
            Some(partner.id)
        };
        field.kind = FieldKind::LinkRow {
            link_row_table_id,
            link_row_related_field_id: related,
        };
        meta.update_field_kind(field_id, field.kind.clone())?;
    }

    let relation = meta.table(field.table_id)?.relation.clone();
    match storage_of(&field) {
        StorageShape::Column(column) => {
            let default = match field_type(&field.kind).default_value(&field) {
                StoredValue::Cell(cell) => cell,
                StoredValue::Links(_) => CellValue::Null,
            };
            tx.add_column(&relation, &column, default)?;
        }
        StorageShape::Links { table, .. } => tx.create_link_table(&table)?,
    }
    Ok(())
}

enum BackupSource {
    Column(ColumnName),
    Links(RelationName, LinkSide),
}

fn backup_source(backup: &BackupData) -> FieldResult<BackupSource> {
    let missing = || FieldError::BackupMissing(format!("no storage for field {}", backup.field.field.id));
    match storage_of(&backup.field.field) {
        StorageShape::Column(_) => backup
            .artifacts
            .iter()
            .find_map(|a| match a {
                BackupArtifact::Column { column, .. } => Some(BackupSource::Column(column.clone())),
                _ => None,
            })
            .ok_or_else(missing),
        StorageShape::Links { side, .. } => backup
            .artifacts
            .iter()
            .find_map(|a| match a {
                BackupArtifact::LinkTable { name } => Some(BackupSource::Links(name.clone(), side)),
                _ => None,
            })
            .ok_or_else(missing),
    }
}

/// Fill the storage of `field_id` by converting every row's value from the
/// backup with the target type's conversion rule.
pub(crate) fn populate_from_backup(
    tx: &mut Transaction<TxActive>,
    meta: &CatalogState,
    backup: &BackupData,
    field_id: FieldId,
) -> FieldResult<()> {
    let source = backup.field.object();
    let source_type = field_type(&source.field.kind);
    let reader = backup_source(backup)?;

    let target = FieldSnapshot::capture(meta, field_id)?.object();
    let target_type = field_type(&target.field.kind);
    let target_shape = storage_of(&target.field);
    let relation = meta.table(target.field.table_id)?.relation.clone();

    for row in tx.scan(&relation)? {
        let stored = match &reader {
            BackupSource::Column(column) => {
                StoredValue::Cell(row.get(column.as_str()).cloned().unwrap_or_default())
            }
            BackupSource::Links(table, side) => StoredValue::Links(tx.link_targets(table, *side, row.id)?),
        };
        let exported = source_type.export_for_conversion(&source, &stored);
        let converted = target_type.convert_value(&target, &exported);

        match (&target_shape, converted) {
            (StorageShape::Column(column), StoredValue::Cell(cell)) => {
                tx.update_cells(&relation, row.id, BTreeMap::from([(column.clone(), cell)]))?;
            }
            (StorageShape::Links { table, side, .. }, StoredValue::Links(ids)) if !ids.is_empty() => {
                tx.set_links(table, *side, row.id, &ids)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Put `backup` back in place as field `field_id`.
///
/// The current storage of the field must already be out of the way. Names
/// taken in the meantime are resolved with `suffix`; select options are
/// restored by id, replacing whatever options the field has now.
pub(crate) fn restore(
    tx: &mut Transaction<TxActive>,
    meta: &mut CatalogState,
    field_id: FieldId,
    backup: &BackupData,
    suffix: &str,
) -> FieldResult<()> {
    restore_definition(meta, &backup.field, suffix)?;
    if let Some(related) = &backup.related_field {
        restore_definition(meta, related, suffix)?;
    }

    let field = meta.field(field_id)?.clone();
    let shape = storage_of(&field);
    for artifact in &backup.artifacts {
        match (artifact, &shape) {
            (BackupArtifact::Column { relation, column }, StorageShape::Column(canonical)) => {
                if !tx.has_column(relation, column.as_str()) {
                    return Err(FieldError::BackupMissing(format!("{relation}.{column}")));
                }
                tx.rename_column(relation, column, canonical)?;
            }
            (BackupArtifact::LinkTable { name }, StorageShape::Links { table, .. }) => {
                if !tx.has_link_table(name) {
                    return Err(FieldError::BackupMissing(name.to_string()));
                }
                tx.rename_link_table(name, table)?;
            }
            (artifact, _) => {
                return Err(FieldError::BackupMissing(format!(
                    "{artifact:?} does not match the storage of field {field_id}"
                )))
            }
        }
    }

    tracing::info!(field_id, artifacts = backup.artifacts.len(), "restored field backup");
    Ok(())
}

fn restore_definition(meta: &mut CatalogState, snapshot: &FieldSnapshot, suffix: &str) -> FieldResult<()> {
    let mut field = snapshot.field.clone();
    let name = meta.find_unused_name(field.table_id, &field.name, suffix, Some(field.id));
    if name != field.name {
        tracing::info!(field_id = field.id, from = %field.name, to = %name, "resolved field name collision");
        field.name = name;
    }
    let field_id = field.id;
    meta.put_field(field)?;
    meta.replace_options(field_id, snapshot.select_options.clone())?;
    Ok(())
}

/// Drop the storage held by a backup. Storage that is already gone, for
/// example because its table was deleted, is skipped.
pub(crate) fn discard(tx: &mut Transaction<TxActive>, backup: &BackupData) -> FieldResult<()> {
    for artifact in &backup.artifacts {
        match artifact {
            BackupArtifact::Column { relation, column } => {
                if tx.has_column(relation, column.as_str()) {
                    tx.drop_column(relation, column)?;
                    tracing::info!(%relation, %column, "discarded backup column");
                } else {
                    tracing::debug!(%relation, %column, "backup column already gone");
                }
            }
            BackupArtifact::LinkTable { name } => {
                if tx.has_link_table(name) {
                    tx.drop_link_table(name)?;
                    tracing::info!(table = %name, "discarded backup link table");
                } else {
                    tracing::debug!(table = %name, "backup link table already gone");
                }
            }
        }
    }
    Ok(())
}
