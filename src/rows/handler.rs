//! Row handler: create, read, update and delete rows of user tables.

use crate::catalog::{FieldId, FieldKind, TableId, TableMeta, TableModel, User};
use crate::db::Database;
use crate::fields::{
    extract_field_ids, prepare_new_row, prepare_values, storage_of, FieldError, LinkTargets,
    RawValues, RelationValue, StorageShape,
};
use crate::rows::error::{RowError, RowResult};
use crate::rows::ordering::{self, ORDER_EPSILON};
use crate::rows::{LinkSnapshot, Row, RowSnapshot};
use crate::storage::{LinkSide, RelationName, RowId};
use crate::transaction::{LockTarget, Transaction, TxActive};

/// A link table a row of the table takes part in.
struct LinkSlot {
    field_id: FieldId,
    table: RelationName,
    side: LinkSide,
    targets: LinkTargets,
    /// Links rows of the table to rows of the same table, so the row may
    /// also sit on the opposite side.
    self_link: bool,
}

fn link_slots(model: &TableModel) -> Vec<LinkSlot> {
    model
        .fields
        .iter()
        .filter_map(|f| match storage_of(&f.field) {
            StorageShape::Links {
                table,
                side,
                targets,
            } => Some(LinkSlot {
                field_id: f.field.id,
                table,
                side,
                targets,
                self_link: matches!(
                    f.field.kind,
                    FieldKind::LinkRow { link_row_table_id, .. } if link_row_table_id == model.table.id
                ),
            }),
            StorageShape::Column(_) => None,
        })
        .collect()
}

fn apply_relations(
    tx: &mut Transaction<TxActive>,
    row_id: RowId,
    relations: &[RelationValue],
) -> RowResult<()> {
    for relation in relations {
        tx.set_links(&relation.table, relation.side, row_id, &relation.ids)?;
    }
    Ok(())
}

/// Entry point for row operations.
pub struct RowHandler<'a> {
    db: &'a Database,
}

impl<'a> RowHandler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn not_found(table_id: TableId, row_id: RowId) -> RowError {
        RowError::RowNotFound { table_id, row_id }
    }

    fn load_in(
        tx: &Transaction<TxActive>,
        model: &TableModel,
        row_id: RowId,
    ) -> RowResult<Row> {
        let stored = tx
            .read_row(model.relation(), row_id)?
            .ok_or_else(|| Self::not_found(model.table.id, row_id))?;
        Ok(Row::load(model, &stored, |table, side, row| {
            tx.link_targets(table, side, row)
        })?)
    }

    /// Fail with a validation error when a link points at a row that does
    /// not exist.
    fn check_link_targets(&self, tx: &Transaction<TxActive>, relations: &[RelationValue]) -> RowResult<()> {
        for relation in relations {
            let LinkTargets::Rows(table_id) = relation.targets else {
                continue;
            };
            let target = self.db.catalog().table(table_id)?;
            for id in &relation.ids {
                if tx.read_row(&target.relation, *id)?.is_none() {
                    return Err(FieldError::validation(
                        relation.field_id,
                        format!("row {id} does not exist in table {table_id}"),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Fetch one row.
    pub fn get_row(&self, user: &User, table_id: TableId, row_id: RowId) -> RowResult<Row> {
        let table = self.db.catalog().table_for_user(user, table_id)?;
        let model = self.db.catalog().get_model(table_id, None)?;
        let store = self.db.tables().store();
        let stored = store
            .read_row(&table.relation, row_id)?
            .ok_or_else(|| Self::not_found(table_id, row_id))?;
        Ok(Row::load(&model, &stored, |t, side, row| store.link_targets(t, side, row))?)
    }

    /// All rows of a table in display order.
    pub fn list_rows(&self, user: &User, table_id: TableId) -> RowResult<Vec<Row>> {
        let table = self.db.catalog().table_for_user(user, table_id)?;
        let model = self.db.catalog().get_model(table_id, None)?;
        let store = self.db.tables().store();
        store
            .scan(&table.relation)?
            .iter()
            .map(|stored| {
                Row::load(&model, stored, |t, side, row| store.link_targets(t, side, row))
                    .map_err(RowError::from)
            })
            .collect()
    }

    /// Create a row from raw values, appended or placed directly before the
    /// row `before`. Fields without a value get their default.
    pub fn create_row(
        &self,
        user: &User,
        table_id: TableId,
        values: &RawValues,
        before: Option<RowId>,
    ) -> RowResult<Row> {
        let table = self.db.catalog().table_for_user(user, table_id)?;

        let row = self.db.tables().with_transaction(|tx| -> RowResult<Row> {
            tx.lock_shared(LockTarget::Table(table.relation.clone()))?;
            tx.lock(LockTarget::Ordering(table.relation.clone()))?;
            let model = self.db.catalog().get_model(table_id, None)?;
            let prepared = prepare_new_row(&model, values)?;
            self.check_link_targets(tx, &prepared.relations)?;

            let order = match before {
                Some(anchor) => ordering::order_before(tx, table_id, &table.relation, anchor)?,
                None => ordering::order_for_append(tx, &table.relation)?,
            };
            let row_id = tx.insert_row(&table.relation, None, order, prepared.cells)?;
            apply_relations(tx, row_id, &prepared.relations)?;
            Self::load_in(tx, &model, row_id)
        })?;

        tracing::debug!(table_id, row_id = row.id, order = %row.order, "created row");
        Ok(row)
    }

    /// Update the given fields of a row.
    ///
    /// The row is locked for the rest of the transaction, so concurrent
    /// updates of the same row run one after the other. The table is held
    /// shared, which keeps field conversions out until the update commits.
    pub fn update_row(
        &self,
        user: &User,
        table_id: TableId,
        row_id: RowId,
        values: &RawValues,
    ) -> RowResult<Row> {
        let table = self.db.catalog().table_for_user(user, table_id)?;

        self.db.tables().with_transaction(|tx| -> RowResult<Row> {
            tx.lock_shared(LockTarget::Table(table.relation.clone()))?;
            tx.select_for_update(&table.relation, row_id)?
                .ok_or_else(|| Self::not_found(table_id, row_id))?;

            let field_ids = extract_field_ids(values);
            let model = self.db.catalog().get_model(table_id, Some(&field_ids))?;
            let prepared = prepare_values(&model, values)?;
            self.check_link_targets(tx, &prepared.relations)?;

            if !prepared.cells.is_empty() {
                tx.update_cells(&table.relation, row_id, prepared.cells)?;
            }
            apply_relations(tx, row_id, &prepared.relations)?;

            let model = self.db.catalog().get_model(table_id, None)?;
            Self::load_in(tx, &model, row_id)
        })
    }

    /// Delete a row and its links.
    pub fn delete_row(&self, user: &User, table_id: TableId, row_id: RowId) -> RowResult<()> {
        self.delete_with_snapshot(user, table_id, row_id).map(|_| ())
    }

    /// Delete a row, returning what is needed to bring it back.
    pub(crate) fn delete_with_snapshot(
        &self,
        user: &User,
        table_id: TableId,
        row_id: RowId,
    ) -> RowResult<RowSnapshot> {
        let table = self.db.catalog().table_for_user(user, table_id)?;

        let snapshot = self.db.tables().with_transaction(|tx| -> RowResult<RowSnapshot> {
            tx.lock_shared(LockTarget::Table(table.relation.clone()))?;
            let stored = tx
                .select_for_update(&table.relation, row_id)?
                .ok_or_else(|| Self::not_found(table_id, row_id))?;
            let model = self.db.catalog().get_model(table_id, None)?;

            let mut links = Vec::new();
            for slot in link_slots(&model) {
                let mut sides = vec![slot.side];
                if slot.self_link {
                    sides.push(slot.side.opposite());
                }
                for side in sides {
                    let targets = tx.link_targets(&slot.table, side, row_id)?;
                    if !targets.is_empty() {
                        links.push(LinkSnapshot {
                            table: slot.table.clone(),
                            side,
                            targets,
                        });
                    }
                }
                tx.unlink_row(&slot.table, slot.side, row_id, slot.self_link)?;
            }

            tx.delete_row(&table.relation, row_id)?;
            Ok(RowSnapshot {
                id: stored.id,
                order: stored.order,
                cells: stored.cells,
                links,
            })
        })?;

        tracing::debug!(table_id, row_id, links = snapshot.links.len(), "deleted row");
        Ok(snapshot)
    }

    /// Insert a previously deleted row again.
    ///
    /// Cells of columns and links of link tables that no longer exist are
    /// dropped, as are links to rows or options that are gone. The original
    /// order is kept unless another row took it in the meantime.
    pub(crate) fn restore_row(&self, user: &User, table_id: TableId, snapshot: &RowSnapshot) -> RowResult<Row> {
        let table = self.db.catalog().table_for_user(user, table_id)?;

        self.db.tables().with_transaction(|tx| -> RowResult<Row> {
            tx.lock_shared(LockTarget::Table(table.relation.clone()))?;
            tx.lock(LockTarget::Ordering(table.relation.clone()))?;
            let model = self.db.catalog().get_model(table_id, None)?;

            let cells = snapshot
                .cells
                .iter()
                .filter(|(column, _)| tx.has_column(&table.relation, column.as_str()))
                .map(|(column, cell)| (column.clone(), cell.clone()))
                .collect();

            let taken = tx.min_order_in(&table.relation, snapshot.order - ORDER_EPSILON, snapshot.order)?
                == Some(snapshot.order);
            let order = if taken {
                ordering::order_for_append(tx, &table.relation)?
            } else {
                snapshot.order
            };
            tx.insert_row(&table.relation, Some(snapshot.id), order, cells)?;

            let slots = link_slots(&model);
            for link in &snapshot.links {
                let slot = slots
                    .iter()
                    .find(|s| s.table == link.table && (s.side == link.side || s.self_link));
                let Some(slot) = slot else {
                    tracing::debug!(table = %link.table, row_id = snapshot.id, "skipped links of a removed field");
                    continue;
                };
                let targets = self.existing_targets(tx, &model.table, slot, &link.targets)?;
                tx.set_links(&link.table, link.side, snapshot.id, &targets)?;
            }

            Self::load_in(tx, &model, snapshot.id)
        })
    }

    fn existing_targets(
        &self,
        tx: &Transaction<TxActive>,
        table: &TableMeta,
        slot: &LinkSlot,
        ids: &[RowId],
    ) -> RowResult<Vec<RowId>> {
        let relation = match slot.targets {
            LinkTargets::Rows(target) if target == table.id => table.relation.clone(),
            LinkTargets::Rows(target) => self.db.catalog().table(target)?.relation,
            LinkTargets::Options => {
                return Ok(self.db.catalog().read(|meta| {
                    ids.iter()
                        .copied()
                        .filter(|id| meta.option(*id).is_ok_and(|o| o.field_id == slot.field_id))
                        .collect()
                }))
            }
        };
        let mut kept = Vec::with_capacity(ids.len());
        for id in ids {
            if tx.read_row(&relation, *id)?.is_some() {
                kept.push(*id);
            }
        }
        Ok(kept)
    }
}
