use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use tracing::{debug, info};

use super::{finalize_transaction, App};
use crate::entities::{section, subtask, task_item};
use crate::error::AppError;
use crate::model::{OrderEntry, ReorderOutcome};
use crate::ordering::apply_orders;

impl App {
    /// Applies a batch of section keys at project scope. Ids from another
    /// project, or trashed ones, are skipped without failing the batch.
    pub async fn reorder_sections(
        &self,
        project_id: i64,
        entries: &[OrderEntry],
    ) -> Result<ReorderOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<ReorderOutcome, AppError> = async {
            self.owned_project_with_conn(&txn, project_id).await?;
            apply_orders::<section::Entity, _>(&txn, project_id, entries).await
        }
        .await;

        let outcome = finalize_transaction(txn, result).await?;
        log_outcome("sections", project_id, &outcome);
        Ok(outcome)
    }

    pub async fn reorder_items(
        &self,
        project_id: i64,
        section_id: i64,
        entries: &[OrderEntry],
    ) -> Result<ReorderOutcome, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<ReorderOutcome, AppError> = async {
            self.active_section_with_conn(&txn, project_id, section_id)
                .await?;
            apply_orders::<task_item::Entity, _>(&txn, section_id, entries).await
        }
        .await;

        let outcome = finalize_transaction(txn, result).await?;
        log_outcome("task items", section_id, &outcome);
        Ok(outcome)
    }

    pub async fn reorder_subtasks(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        entries: &[OrderEntry],
    ) -> Result<(ReorderOutcome, Option<i32>), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(ReorderOutcome, Option<i32>), AppError> = async {
            self.active_item_with_conn(&txn, project_id, section_id, item_id)
                .await?;
            let outcome = apply_orders::<subtask::Entity, _>(&txn, item_id, entries).await?;
            let progress = self.refresh_item_progress_with_conn(&txn, item_id).await?;
            Ok((outcome, progress))
        }
        .await;

        let (outcome, progress) = finalize_transaction(txn, result).await?;
        log_outcome("subtasks", item_id, &outcome);
        Ok((outcome, progress))
    }

    /// Moves one task item into `to_section_id` at `order`. The section it
    /// leaves keeps its remaining keys as they are.
    pub async fn move_item(
        &self,
        project_id: i64,
        from_section_id: i64,
        item_id: i64,
        to_section_id: i64,
        order: i32,
    ) -> Result<task_item::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<task_item::Model, AppError> = async {
            let item = self
                .active_item_with_conn(&txn, project_id, from_section_id, item_id)
                .await?;
            self.active_section_with_conn(&txn, project_id, to_section_id)
                .await?;
            let mut active: task_item::ActiveModel = item.into();
            active.section_id = Set(Some(to_section_id));
            active.sort_order = Set(order);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        let moved = finalize_transaction(txn, result).await?;
        info!(item_id, from_section_id, to_section_id, order, "task item moved");
        Ok(moved)
    }
}

fn log_outcome(kind: &str, scope_id: i64, outcome: &ReorderOutcome) {
    info!(
        scope_id,
        applied = outcome.applied.len(),
        ignored = outcome.ignored.len(),
        "reordered {kind}"
    );
    if !outcome.ignored.is_empty() {
        debug!(scope_id, ignored = ?outcome.ignored, "ids outside scope were skipped");
    }
}
