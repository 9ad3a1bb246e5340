//! Relations and link tables held by a table store.
//!
//! A relation is a physical table: a set of named columns and rows keyed by
//! id, every row carrying its display `order`. A link table stores pairs of
//! row ids and backs many-to-many relations between rows (or between rows and
//! select options).

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::storage::types::{CellValue, ColumnName, LinkSide, RelationName, RowId};

/// A stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RowId,
    /// Display position; unique per relation, need not be contiguous.
    pub order: Decimal,
    pub cells: BTreeMap<ColumnName, CellValue>,
}

impl StoredRow {
    /// get a cell by column name
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }
}

/// A physical table of rows.
#[derive(Debug, Clone)]
pub struct Relation {
    name: RelationName,
    columns: BTreeSet<ColumnName>,
    rows: BTreeMap<RowId, StoredRow>,
    next_id: RowId,
}

impl Relation {
    pub fn new(name: RelationName) -> Self {
        Self {
            name,
            columns: BTreeSet::new(),
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn name(&self) -> &RelationName {
        &self.name
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnName> {
        self.columns.iter()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn row(&self, id: RowId) -> Option<&StoredRow> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by display position, ties broken by id.
    pub fn ordered_rows(&self) -> Vec<&StoredRow> {
        let mut rows: Vec<&StoredRow> = self.rows.values().collect();
        rows.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn max_order(&self) -> Option<Decimal> {
        self.rows.values().map(|r| r.order).max()
    }

    /// Lowest order among rows with `lower < order <= upper`.
    pub fn min_order_in(&self, lower: Decimal, upper: Decimal) -> Option<Decimal> {
        self.rows
            .values()
            .map(|r| r.order)
            .filter(|order| *order > lower && *order <= upper)
            .min()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut BTreeMap<RowId, StoredRow> {
        &mut self.rows
    }

    pub(crate) fn columns_mut(&mut self) -> &mut BTreeSet<ColumnName> {
        &mut self.columns
    }

    /// Reserve the next row id. Ids are never reused, even after rollback.
    pub(crate) fn allocate_id(&mut self) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Make sure ids handed out later never collide with `id`.
    pub(crate) fn observe_id(&mut self, id: RowId) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    pub(crate) fn rename(&mut self, name: RelationName) {
        self.name = name;
    }
}

/// Pairs of row ids backing a many-to-many relation.
#[derive(Debug, Clone)]
pub struct LinkTable {
    name: RelationName,
    pairs: BTreeSet<(RowId, RowId)>,
}

impl LinkTable {
    pub fn new(name: RelationName) -> Self {
        Self {
            name,
            pairs: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &RelationName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Ids linked to `row` when it sits on `side`, ascending.
    pub fn targets_of(&self, side: LinkSide, row: RowId) -> Vec<RowId> {
        match side {
            LinkSide::Left => self
                .pairs
                .range((row, RowId::MIN)..=(row, RowId::MAX))
                .map(|(_, right)| *right)
                .collect(),
            LinkSide::Right => {
                let mut targets: Vec<RowId> = self
                    .pairs
                    .iter()
                    .filter(|(_, right)| *right == row)
                    .map(|(left, _)| *left)
                    .collect();
                targets.sort_unstable();
                targets
            }
        }
    }

    /// Replace the links of `row`, returning the previous targets.
    pub(crate) fn set_targets(&mut self, side: LinkSide, row: RowId, targets: &[RowId]) -> Vec<RowId> {
        let previous = self.targets_of(side, row);
        for target in &previous {
            self.pairs.remove(&Self::pair(side, row, *target));
        }
        for target in targets {
            self.pairs.insert(Self::pair(side, row, *target));
        }
        previous
    }

    /// Drop every pair whose `side` element is `id`. Returns the affected
    /// targets.
    pub(crate) fn remove_all(&mut self, side: LinkSide, id: RowId) -> Vec<RowId> {
        self.set_targets(side, id, &[])
    }

    pub(crate) fn rename(&mut self, name: RelationName) {
        self.name = name;
    }

    fn pair(side: LinkSide, row: RowId, target: RowId) -> (RowId, RowId) {
        match side {
            LinkSide::Left => (row, target),
            LinkSide::Right => (target, row),
        }
    }
}
