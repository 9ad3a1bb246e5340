//! In-memory physical table store.
//!
//! This is the central component of the storage layer. It holds every
//! relation and link table of one physical store behind a lock and provides
//! the primitive reads and writes the rest of the system uses. Every write
//! returns a [`Compensation`] describing how to revert it, which is what the
//! transaction layer journals for rollback.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::relation::{LinkTable, Relation, StoredRow};
use crate::storage::types::{CellValue, ColumnName, LinkSide, RelationName, RowId};

/// A physical table store.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct TableStore {
    inner: Arc<TableStoreInner>,
}

struct TableStoreInner {
    label: String,
    state: RwLock<StoreState>,
}

/// Everything held by one store.
#[derive(Debug, Default)]
pub struct StoreState {
    relations: BTreeMap<RelationName, Relation>,
    link_tables: BTreeMap<RelationName, LinkTable>,
}

/// The inverse of a single write, applied in reverse order on rollback.
#[derive(Debug, Clone)]
pub enum Compensation {
    DropRelation(RelationName),
    RestoreRelation(Relation),
    DropColumn {
        relation: RelationName,
        column: ColumnName,
    },
    RestoreColumn {
        relation: RelationName,
        column: ColumnName,
        values: BTreeMap<RowId, CellValue>,
    },
    RenameColumn {
        relation: RelationName,
        from: ColumnName,
        to: ColumnName,
    },
    RemoveRow {
        relation: RelationName,
        row: RowId,
    },
    RestoreRow {
        relation: RelationName,
        row: StoredRow,
    },
    RestoreOrders {
        relation: RelationName,
        orders: Vec<(RowId, Decimal)>,
    },
    DropLinkTable(RelationName),
    RestoreLinkTable(LinkTable),
    RenameLinkTable {
        from: RelationName,
        to: RelationName,
    },
    SetLinks {
        table: RelationName,
        side: LinkSide,
        row: RowId,
        targets: Vec<RowId>,
    },
    /// Several compensations produced by one logical write.
    Batch(Vec<Compensation>),
}

impl TableStore {
    /// Create an empty store.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TableStoreInner {
                label: label.into(),
                state: RwLock::new(StoreState::default()),
            }),
        }
    }

    /// Label identifying the physical store.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Execute a function with read access to the store.
    pub fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&StoreState) -> T,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Execute a function with write access to the store.
    pub(crate) fn write<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut StoreState) -> T,
    {
        let mut state = self.inner.state.write();
        f(&mut state)
    }

    // ==================== Convenience Reads ====================

    pub fn relation_exists(&self, relation: &RelationName) -> bool {
        self.read(|s| s.relations.contains_key(relation))
    }

    pub fn column_exists(&self, relation: &RelationName, column: &str) -> bool {
        self.read(|s| {
            s.relations
                .get(relation)
                .map(|r| r.has_column(column))
                .unwrap_or(false)
        })
    }

    pub fn link_table_exists(&self, table: &RelationName) -> bool {
        self.read(|s| s.link_tables.contains_key(table))
    }

    pub fn read_row(&self, relation: &RelationName, id: RowId) -> StorageResult<Option<StoredRow>> {
        self.read(|s| s.read_row(relation, id))
    }

    pub fn scan(&self, relation: &RelationName) -> StorageResult<Vec<StoredRow>> {
        self.read(|s| s.scan(relation))
    }

    pub fn link_targets(
        &self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
    ) -> StorageResult<Vec<RowId>> {
        self.read(|s| s.link_targets(table, side, row))
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("label", &self.inner.label)
            .finish()
    }
}

impl StoreState {
    fn relation(&self, name: &RelationName) -> StorageResult<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| StorageError::RelationNotFound(name.clone()))
    }

    fn relation_mut(&mut self, name: &RelationName) -> StorageResult<&mut Relation> {
        self.relations
            .get_mut(name)
            .ok_or_else(|| StorageError::RelationNotFound(name.clone()))
    }

    fn link_table(&self, name: &RelationName) -> StorageResult<&LinkTable> {
        self.link_tables
            .get(name)
            .ok_or_else(|| StorageError::LinkTableNotFound(name.clone()))
    }

    fn link_table_mut(&mut self, name: &RelationName) -> StorageResult<&mut LinkTable> {
        self.link_tables
            .get_mut(name)
            .ok_or_else(|| StorageError::LinkTableNotFound(name.clone()))
    }

    // ==================== Reads ====================

    pub fn has_relation(&self, name: &RelationName) -> bool {
        self.relations.contains_key(name)
    }

    pub fn has_column(&self, relation: &RelationName, column: &str) -> bool {
        self.relations
            .get(relation)
            .map(|r| r.has_column(column))
            .unwrap_or(false)
    }

    pub fn has_link_table(&self, name: &RelationName) -> bool {
        self.link_tables.contains_key(name)
    }

    pub fn relation_names(&self) -> Vec<RelationName> {
        self.relations.keys().cloned().collect()
    }

    pub fn columns(&self, relation: &RelationName) -> StorageResult<Vec<ColumnName>> {
        Ok(self.relation(relation)?.columns().cloned().collect())
    }

    pub fn link_table_names(&self) -> Vec<RelationName> {
        self.link_tables.keys().cloned().collect()
    }

    pub fn read_row(&self, relation: &RelationName, id: RowId) -> StorageResult<Option<StoredRow>> {
        Ok(self.relation(relation)?.row(id).cloned())
    }

    /// All rows of a relation in display order.
    pub fn scan(&self, relation: &RelationName) -> StorageResult<Vec<StoredRow>> {
        Ok(self
            .relation(relation)?
            .ordered_rows()
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn row_ids(&self, relation: &RelationName) -> StorageResult<Vec<RowId>> {
        Ok(self
            .relation(relation)?
            .ordered_rows()
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    pub fn max_order(&self, relation: &RelationName) -> StorageResult<Option<Decimal>> {
        Ok(self.relation(relation)?.max_order())
    }

    pub fn min_order_in(
        &self,
        relation: &RelationName,
        lower: Decimal,
        upper: Decimal,
    ) -> StorageResult<Option<Decimal>> {
        Ok(self.relation(relation)?.min_order_in(lower, upper))
    }

    pub fn link_targets(
        &self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
    ) -> StorageResult<Vec<RowId>> {
        Ok(self.link_table(table)?.targets_of(side, row))
    }

    // ==================== Relations ====================

    pub(crate) fn create_relation(&mut self, name: &RelationName) -> StorageResult<Compensation> {
        if self.relations.contains_key(name) {
            return Err(StorageError::RelationAlreadyExists(name.clone()));
        }
        self.relations.insert(name.clone(), Relation::new(name.clone()));
        Ok(Compensation::DropRelation(name.clone()))
    }

    pub(crate) fn drop_relation(&mut self, name: &RelationName) -> StorageResult<Compensation> {
        let relation = self
            .relations
            .remove(name)
            .ok_or_else(|| StorageError::RelationNotFound(name.clone()))?;
        Ok(Compensation::RestoreRelation(relation))
    }

    // ==================== Columns ====================

    /// Add a column, filling every existing row with `default`.
    pub(crate) fn add_column(
        &mut self,
        relation: &RelationName,
        column: &ColumnName,
        default: CellValue,
    ) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;
        if !rel.columns_mut().insert(column.clone()) {
            return Err(StorageError::ColumnAlreadyExists {
                relation: relation.clone(),
                column: column.clone(),
            });
        }
        for row in rel.rows_mut().values_mut() {
            row.cells.insert(column.clone(), default.clone());
        }
        Ok(Compensation::DropColumn {
            relation: relation.clone(),
            column: column.clone(),
        })
    }

    pub(crate) fn drop_column(
        &mut self,
        relation: &RelationName,
        column: &ColumnName,
    ) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;
        if !rel.columns_mut().remove(column) {
            return Err(StorageError::ColumnNotFound {
                relation: relation.clone(),
                column: column.clone(),
            });
        }
        let mut values = BTreeMap::new();
        for row in rel.rows_mut().values_mut() {
            if let Some(value) = row.cells.remove(column) {
                values.insert(row.id, value);
            }
        }
        Ok(Compensation::RestoreColumn {
            relation: relation.clone(),
            column: column.clone(),
            values,
        })
    }

    pub(crate) fn rename_column(
        &mut self,
        relation: &RelationName,
        from: &ColumnName,
        to: &ColumnName,
    ) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;
        if !rel.has_column(from.as_str()) {
            return Err(StorageError::ColumnNotFound {
                relation: relation.clone(),
                column: from.clone(),
            });
        }
        if rel.has_column(to.as_str()) {
            return Err(StorageError::ColumnAlreadyExists {
                relation: relation.clone(),
                column: to.clone(),
            });
        }
        rel.columns_mut().remove(from);
        rel.columns_mut().insert(to.clone());
        for row in rel.rows_mut().values_mut() {
            if let Some(value) = row.cells.remove(from) {
                row.cells.insert(to.clone(), value);
            }
        }
        Ok(Compensation::RenameColumn {
            relation: relation.clone(),
            from: to.clone(),
            to: from.clone(),
        })
    }

    // ==================== Rows ====================

    /// Insert a row. Columns missing from `cells` are stored as null; an
    /// explicit `id` is used when restoring a previously deleted row.
    pub(crate) fn insert_row(
        &mut self,
        relation: &RelationName,
        id: Option<RowId>,
        order: Decimal,
        mut cells: BTreeMap<ColumnName, CellValue>,
    ) -> StorageResult<(RowId, Compensation)> {
        let rel = self.relation_mut(relation)?;

        if let Some(unknown) = cells.keys().find(|c| !rel.has_column(c.as_str())) {
            return Err(StorageError::ColumnNotFound {
                relation: relation.clone(),
                column: unknown.clone(),
            });
        }

        let id = match id {
            Some(id) if rel.row(id).is_some() => {
                return Err(StorageError::RowAlreadyExists {
                    relation: relation.clone(),
                    row: id,
                });
            }
            Some(id) => {
                rel.observe_id(id);
                id
            }
            None => rel.allocate_id(),
        };

        let columns: Vec<ColumnName> = rel.columns().cloned().collect();
        for column in columns {
            cells.entry(column).or_default();
        }

        rel.rows_mut().insert(id, StoredRow { id, order, cells });
        Ok((
            id,
            Compensation::RemoveRow {
                relation: relation.clone(),
                row: id,
            },
        ))
    }

    /// Overwrite the given cells of one row.
    pub(crate) fn update_cells(
        &mut self,
        relation: &RelationName,
        id: RowId,
        cells: BTreeMap<ColumnName, CellValue>,
    ) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;

        if let Some(unknown) = cells.keys().find(|c| !rel.has_column(c.as_str())) {
            return Err(StorageError::ColumnNotFound {
                relation: relation.clone(),
                column: unknown.clone(),
            });
        }

        let row = rel
            .rows_mut()
            .get_mut(&id)
            .ok_or_else(|| StorageError::RowNotFound {
                relation: relation.clone(),
                row: id,
            })?;
        let before = row.clone();
        row.cells.extend(cells);

        Ok(Compensation::RestoreRow {
            relation: relation.clone(),
            row: before,
        })
    }

    pub(crate) fn delete_row(&mut self, relation: &RelationName, id: RowId) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;
        let row = rel
            .rows_mut()
            .remove(&id)
            .ok_or_else(|| StorageError::RowNotFound {
                relation: relation.clone(),
                row: id,
            })?;
        Ok(Compensation::RestoreRow {
            relation: relation.clone(),
            row,
        })
    }

    /// Add `delta` to the order of every row with `lower < order <= upper`
    /// in one pass. Returns the number of shifted rows.
    pub(crate) fn shift_orders(
        &mut self,
        relation: &RelationName,
        lower: Decimal,
        upper: Decimal,
        delta: Decimal,
    ) -> StorageResult<(usize, Compensation)> {
        let rel = self.relation_mut(relation)?;
        let mut previous = Vec::new();
        for row in rel.rows_mut().values_mut() {
            if row.order > lower && row.order <= upper {
                previous.push((row.id, row.order));
                row.order += delta;
            }
        }
        Ok((
            previous.len(),
            Compensation::RestoreOrders {
                relation: relation.clone(),
                orders: previous,
            },
        ))
    }

    /// Assign explicit orders to rows.
    pub(crate) fn set_orders(
        &mut self,
        relation: &RelationName,
        orders: &[(RowId, Decimal)],
    ) -> StorageResult<Compensation> {
        let rel = self.relation_mut(relation)?;
        let mut previous = Vec::with_capacity(orders.len());
        for (id, order) in orders {
            if let Some(row) = rel.rows_mut().get_mut(id) {
                previous.push((row.id, row.order));
                row.order = *order;
            }
        }
        Ok(Compensation::RestoreOrders {
            relation: relation.clone(),
            orders: previous,
        })
    }

    // ==================== Link Tables ====================

    pub(crate) fn create_link_table(&mut self, name: &RelationName) -> StorageResult<Compensation> {
        if self.link_tables.contains_key(name) {
            return Err(StorageError::LinkTableAlreadyExists(name.clone()));
        }
        self.link_tables.insert(name.clone(), LinkTable::new(name.clone()));
        Ok(Compensation::DropLinkTable(name.clone()))
    }

    pub(crate) fn drop_link_table(&mut self, name: &RelationName) -> StorageResult<Compensation> {
        let table = self
            .link_tables
            .remove(name)
            .ok_or_else(|| StorageError::LinkTableNotFound(name.clone()))?;
        Ok(Compensation::RestoreLinkTable(table))
    }

    pub(crate) fn rename_link_table(
        &mut self,
        from: &RelationName,
        to: &RelationName,
    ) -> StorageResult<Compensation> {
        if self.link_tables.contains_key(to) {
            return Err(StorageError::LinkTableAlreadyExists(to.clone()));
        }
        let mut table = self
            .link_tables
            .remove(from)
            .ok_or_else(|| StorageError::LinkTableNotFound(from.clone()))?;
        table.rename(to.clone());
        self.link_tables.insert(to.clone(), table);
        Ok(Compensation::RenameLinkTable {
            from: to.clone(),
            to: from.clone(),
        })
    }

    pub(crate) fn set_links(
        &mut self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
        targets: &[RowId],
    ) -> StorageResult<Compensation> {
        let previous = self.link_table_mut(table)?.set_targets(side, row, targets);
        Ok(Compensation::SetLinks {
            table: table.clone(),
            side,
            row,
            targets: previous,
        })
    }

    /// Remove every pair referencing `row` on `side` and also, when
    /// `both_sides` is set, on the opposite side (self-referencing links).
    pub(crate) fn unlink_row(
        &mut self,
        table: &RelationName,
        side: LinkSide,
        row: RowId,
        both_sides: bool,
    ) -> StorageResult<Compensation> {
        let links = self.link_table_mut(table)?;
        let mut batch = Vec::new();

        let previous = links.remove_all(side, row);
        batch.push(Compensation::SetLinks {
            table: table.clone(),
            side,
            row,
            targets: previous,
        });

        if both_sides {
            let other = side.opposite();
            let previous = links.remove_all(other, row);
            batch.push(Compensation::SetLinks {
                table: table.clone(),
                side: other,
                row,
                targets: previous,
            });
        }

        Ok(Compensation::Batch(batch))
    }

    /// Revert one write. Compensations are only ever applied to the state
    /// that produced them, so missing targets are skipped.
    pub(crate) fn compensate(&mut self, compensation: Compensation) {
        match compensation {
            Compensation::DropRelation(name) => {
                self.relations.remove(&name);
            }
            Compensation::RestoreRelation(relation) => {
                self.relations.insert(relation.name().clone(), relation);
            }
            Compensation::DropColumn { relation, column } => {
                let _ = self.drop_column(&relation, &column);
            }
            Compensation::RestoreColumn {
                relation,
                column,
                values,
            } => {
                if let Ok(rel) = self.relation_mut(&relation) {
                    rel.columns_mut().insert(column.clone());
                    for row in rel.rows_mut().values_mut() {
                        let value = values.get(&row.id).cloned().unwrap_or_default();
                        row.cells.insert(column.clone(), value);
                    }
                }
            }
            Compensation::RenameColumn { relation, from, to } => {
                let _ = self.rename_column(&relation, &from, &to);
            }
            Compensation::RemoveRow { relation, row } => {
                let _ = self.delete_row(&relation, row);
            }
            Compensation::RestoreRow { relation, row } => {
                if let Ok(rel) = self.relation_mut(&relation) {
                    rel.observe_id(row.id);
                    rel.rows_mut().insert(row.id, row);
                }
            }
            Compensation::RestoreOrders { relation, orders } => {
                let _ = self.set_orders(&relation, &orders);
            }
            Compensation::DropLinkTable(name) => {
                self.link_tables.remove(&name);
            }
            Compensation::RestoreLinkTable(table) => {
                self.link_tables.insert(table.name().clone(), table);
            }
            Compensation::RenameLinkTable { from, to } => {
                let _ = self.rename_link_table(&from, &to);
            }
            Compensation::SetLinks {
                table,
                side,
                row,
                targets,
            } => {
                let _ = self.set_links(&table, side, row, &targets);
            }
            Compensation::Batch(batch) => {
                for compensation in batch.into_iter().rev() {
                    self.compensate(compensation);
                }
            }
        }
    }
}
