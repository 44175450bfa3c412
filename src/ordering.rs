//! Integer sort keys inside a parent scope.
//!
//! Keys are caller-supplied and never compacted; gaps are fine. Only the
//! relative order of (`sort_order`, `id`) matters.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect,
};

use crate::entities::{section, subtask, task_item};
use crate::error::AppError;
use crate::model::{OrderEntry, ReorderOutcome};

/// An entity whose rows are ordered inside a parent scope.
pub trait Ordered: EntityTrait {
    fn id_column() -> Self::Column;
    fn scope_column() -> Self::Column;
    fn order_column() -> Self::Column;
    fn updated_column() -> Self::Column;

    /// Rows a reorder may touch. Trashed rows keep their key untouched.
    fn live_condition() -> Condition {
        Condition::all()
    }
}

impl Ordered for section::Entity {
    fn id_column() -> Self::Column {
        section::Column::Id
    }
    fn scope_column() -> Self::Column {
        section::Column::ProjectId
    }
    fn order_column() -> Self::Column {
        section::Column::SortOrder
    }
    fn updated_column() -> Self::Column {
        section::Column::UpdatedAt
    }
    fn live_condition() -> Condition {
        Condition::all().add(section::Column::DeletedAt.is_null())
    }
}

impl Ordered for task_item::Entity {
    fn id_column() -> Self::Column {
        task_item::Column::Id
    }
    fn scope_column() -> Self::Column {
        task_item::Column::SectionId
    }
    fn order_column() -> Self::Column {
        task_item::Column::SortOrder
    }
    fn updated_column() -> Self::Column {
        task_item::Column::UpdatedAt
    }
    fn live_condition() -> Condition {
        Condition::all().add(task_item::Column::DeletedAt.is_null())
    }
}

impl Ordered for subtask::Entity {
    fn id_column() -> Self::Column {
        subtask::Column::Id
    }
    fn scope_column() -> Self::Column {
        subtask::Column::TaskItemId
    }
    fn order_column() -> Self::Column {
        subtask::Column::SortOrder
    }
    fn updated_column() -> Self::Column {
        subtask::Column::UpdatedAt
    }
}

/// Append position after the current maximum.
pub fn append_position(max: Option<i32>) -> i32 {
    match max {
        Some(max) => max.saturating_add(1),
        None => 1,
    }
}

/// Next key for a row appended to `scope_id`. Trashed rows count, so a
/// later restore cannot land on the same key.
pub async fn next_order<E, C>(db: &C, scope_id: i64) -> Result<i32, AppError>
where
    E: Ordered,
    C: ConnectionTrait,
{
    let max = E::find()
        .select_only()
        .column_as(E::order_column().max(), "max_order")
        .filter(E::scope_column().eq(scope_id))
        .into_tuple::<Option<i32>>()
        .one(db)
        .await?
        .flatten();
    Ok(append_position(max))
}

/// Writes each `{id, order}` pair whose row lives in `scope_id`. Rows from
/// another scope are left alone and reported as ignored. The caller owns
/// the transaction.
pub async fn apply_orders<E, C>(
    db: &C,
    scope_id: i64,
    entries: &[OrderEntry],
) -> Result<ReorderOutcome, AppError>
where
    E: Ordered,
    C: ConnectionTrait,
{
    let now = Utc::now();
    let mut outcome = ReorderOutcome::default();
    for entry in entries {
        let result = E::update_many()
            .col_expr(E::order_column(), Expr::value(entry.order))
            .col_expr(E::updated_column(), Expr::value(now))
            .filter(E::id_column().eq(entry.id))
            .filter(E::scope_column().eq(scope_id))
            .filter(E::live_condition())
            .exec(db)
            .await?;
        if result.rows_affected > 0 {
            outcome.applied.push(entry.id);
        } else {
            outcome.ignored.push(entry.id);
        }
    }
    Ok(outcome)
}
