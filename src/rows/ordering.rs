//! Order value allocation.
//!
//! Appended rows get the next whole number after the current maximum. A row
//! inserted before an anchor gets `anchor - ORDER_EPSILON`; rows already
//! squeezed in front of the anchor within the same integer bucket move down
//! by the same epsilon in one bulk shift, so earlier inserts keep their
//! relative position.
//!
//! Each bucket holds about 10^20 inserts before its rows would reach the
//! integer floor. When that happens the relation is renumbered to `1..=n` in
//! display order and the insert is retried once.
//!
//! Callers hold the relation's ordering lock for the whole transaction.

use rust_decimal::Decimal;

use crate::catalog::TableId;
use crate::rows::error::{RowError, RowResult};
use crate::storage::{RelationName, RowId};
use crate::transaction::{Transaction, TxActive};

/// Distance between a row inserted before an anchor and the anchor.
pub const ORDER_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 20);

/// Order for a row appended after every existing row.
pub(crate) fn order_for_append(
    tx: &Transaction<TxActive>,
    relation: &RelationName,
) -> RowResult<Decimal> {
    let max = tx.max_order(relation)?.unwrap_or(Decimal::ZERO);
    Ok(max.ceil() + Decimal::ONE)
}

/// Order for a row inserted directly before `anchor`.
pub(crate) fn order_before(
    tx: &mut Transaction<TxActive>,
    table_id: TableId,
    relation: &RelationName,
    anchor: RowId,
) -> RowResult<Decimal> {
    let exhausted = || RowError::OrderPrecisionExhausted { table_id, anchor };

    for attempt in 0..2 {
        let anchor_order = tx
            .read_row(relation, anchor)?
            .ok_or(RowError::RowNotFound {
                table_id,
                row_id: anchor,
            })?
            .order;

        // Rounding swallows epsilon once the integer part is too wide.
        let order = anchor_order.checked_sub(ORDER_EPSILON).ok_or_else(exhausted)?;
        if order >= anchor_order {
            return Err(exhausted());
        }

        let floor = order.floor();
        let crowded = order == floor
            || tx
                .min_order_in(relation, floor, order)?
                .map(|lowest| lowest - ORDER_EPSILON <= floor)
                .unwrap_or(false);

        if !crowded {
            tx.shift_orders(relation, floor, order, -ORDER_EPSILON)?;
            return Ok(order);
        }
        if attempt == 0 {
            renumber(tx, relation)?;
        }
    }
    Err(exhausted())
}

/// Give every row of the relation a whole number order, keeping the display
/// sequence.
pub(crate) fn renumber(tx: &mut Transaction<TxActive>, relation: &RelationName) -> RowResult<()> {
    let orders: Vec<(RowId, Decimal)> = tx
        .scan(relation)?
        .iter()
        .zip(1u64..)
        .map(|(row, n)| (row.id, Decimal::from(n)))
        .collect();
    tracing::info!(%relation, rows = orders.len(), "renumbered row orders");
    tx.set_orders(relation, &orders)?;
    Ok(())
}
