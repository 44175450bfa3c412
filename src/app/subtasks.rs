use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};

use super::{ensure_non_empty, finalize_transaction, App};
use crate::entities::subtask;
use crate::error::AppError;
use crate::model::SubtaskChanges;
use crate::ordering::next_order;

// Every mutation here recomputes the parent item's progress inside the same
// transaction. The returned `Option<i32>` is the recomputed value, `None`
// when the item is left without subtasks.
impl App {
    pub async fn list_subtasks(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
    ) -> Result<Vec<subtask::Model>, AppError> {
        self.active_item_with_conn(&self.db, project_id, section_id, item_id)
            .await?;
        self.subtasks_for_item_with_conn(&self.db, item_id).await
    }

    pub async fn get_subtask(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    ) -> Result<subtask::Model, AppError> {
        self.scoped_subtask_with_conn(&self.db, project_id, section_id, item_id, subtask_id)
            .await
    }

    pub async fn create_subtask(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        title: String,
    ) -> Result<(subtask::Model, Option<i32>), AppError> {
        ensure_non_empty("subtask title", &title)?;
        let txn = self.db.begin().await?;
        let result: Result<(subtask::Model, Option<i32>), AppError> = async {
            self.active_item_with_conn(&txn, project_id, section_id, item_id)
                .await?;
            let sort_order = next_order::<subtask::Entity, _>(&txn, item_id).await?;
            let now = Utc::now();
            let active = subtask::ActiveModel {
                task_item_id: Set(item_id),
                title: Set(title),
                is_completed: Set(false),
                sort_order: Set(sort_order),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = subtask::Entity::insert(active).exec(&txn).await?;
            let created = subtask::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("subtask not found after insert".to_string()))?;
            let progress = self.refresh_item_progress_with_conn(&txn, item_id).await?;
            Ok((created, progress))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn update_subtask(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
        changes: SubtaskChanges,
    ) -> Result<(subtask::Model, Option<i32>), AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_non_empty("subtask title", title)?;
        }
        let txn = self.db.begin().await?;
        let result: Result<(subtask::Model, Option<i32>), AppError> = async {
            let subtask = self
                .scoped_subtask_with_conn(&txn, project_id, section_id, item_id, subtask_id)
                .await?;
            let mut active: subtask::ActiveModel = subtask.into();
            if let Some(title) = changes.title {
                active.title = Set(title);
            }
            if let Some(is_completed) = changes.is_completed {
                active.is_completed = Set(is_completed);
            }
            active.updated_at = Set(Utc::now());
            let updated = active.update(&txn).await?;
            let progress = self.refresh_item_progress_with_conn(&txn, item_id).await?;
            Ok((updated, progress))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn toggle_subtask(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    ) -> Result<(subtask::Model, Option<i32>), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(subtask::Model, Option<i32>), AppError> = async {
            let subtask = self
                .scoped_subtask_with_conn(&txn, project_id, section_id, item_id, subtask_id)
                .await?;
            let flipped = !subtask.is_completed;
            let mut active: subtask::ActiveModel = subtask.into();
            active.is_completed = Set(flipped);
            active.updated_at = Set(Utc::now());
            let updated = active.update(&txn).await?;
            let progress = self.refresh_item_progress_with_conn(&txn, item_id).await?;
            Ok((updated, progress))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Subtasks have no trash; the row is removed.
    pub async fn delete_subtask(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    ) -> Result<Option<i32>, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<Option<i32>, AppError> = async {
            self.scoped_subtask_with_conn(&txn, project_id, section_id, item_id, subtask_id)
                .await?;
            subtask::Entity::delete_by_id(subtask_id).exec(&txn).await?;
            self.refresh_item_progress_with_conn(&txn, item_id).await
        }
        .await;

        finalize_transaction(txn, result).await
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::EntityTrait;

    use crate::app::testing::{
        create_item, create_project, create_section, create_subtask, setup_app,
    };
    use crate::entities::{subtask, task_item};
    use crate::error::AppError;
    use crate::model::{SubtaskChanges, TaskItemChanges};

    #[tokio::test]
    async fn completing_subtasks_updates_progress() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        let a = create_subtask(&app, project.id, section.id, item.id, "A").await;
        let b = create_subtask(&app, project.id, section.id, item.id, "B").await;
        create_subtask(&app, project.id, section.id, item.id, "C").await;

        let (_, progress) = app
            .toggle_subtask(project.id, section.id, item.id, a.id)
            .await
            .expect("toggle a");
        assert_eq!(progress, Some(33));

        let (_, progress) = app
            .update_subtask(
                project.id,
                section.id,
                item.id,
                b.id,
                SubtaskChanges {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .expect("complete b");
        assert_eq!(progress, Some(67));

        let stored = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert_eq!(stored.progress, 67);
        assert_eq!(stored.alt_progress, 67);
    }

    #[tokio::test]
    async fn adding_subtask_lowers_progress() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        let a = create_subtask(&app, project.id, section.id, item.id, "A").await;
        app.toggle_subtask(project.id, section.id, item.id, a.id)
            .await
            .expect("toggle");

        let (created, progress) = app
            .create_subtask(project.id, section.id, item.id, "B".to_string())
            .await
            .expect("create");
        assert_eq!(created.sort_order, 2);
        assert!(!created.is_completed);
        assert_eq!(progress, Some(50));
    }

    #[tokio::test]
    async fn deleting_last_subtask_keeps_progress() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        let a = create_subtask(&app, project.id, section.id, item.id, "A").await;
        app.toggle_subtask(project.id, section.id, item.id, a.id)
            .await
            .expect("toggle");
        let before = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");

        let progress = app
            .delete_subtask(project.id, section.id, item.id, a.id)
            .await
            .expect("delete");
        assert_eq!(progress, None);

        let gone = subtask::Entity::find_by_id(a.id)
            .one(&app.db)
            .await
            .expect("find");
        assert!(gone.is_none());
        let stored = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.alt_progress, 100);
        assert_eq!(stored.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn manual_progress_survives_until_subtasks_change() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        app.update_item(
            project.id,
            section.id,
            item.id,
            TaskItemChanges {
                progress: Some(80),
                ..Default::default()
            },
        )
        .await
        .expect("manual");

        let (_, progress) = app
            .create_subtask(project.id, section.id, item.id, "A".to_string())
            .await
            .expect("create");
        assert_eq!(progress, Some(0));
    }

    #[tokio::test]
    async fn subtask_of_other_item_is_forbidden() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let first = create_item(&app, project.id, section.id, "First").await;
        let second = create_item(&app, project.id, section.id, "Second").await;
        let sub = create_subtask(&app, project.id, section.id, first.id, "A").await;

        let err = app
            .toggle_subtask(project.id, section.id, second.id, sub.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = app
            .delete_subtask(project.id, section.id, first.id, 4040)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let unchanged = app
            .get_subtask(project.id, section.id, first.id, sub.id)
            .await
            .expect("get");
        assert!(!unchanged.is_completed);
    }

    #[tokio::test]
    async fn blank_subtask_title_is_rejected() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        let err = app
            .create_subtask(project.id, section.id, item.id, "".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let listed = app
            .list_subtasks(project.id, section.id, item.id)
            .await
            .expect("list");
        assert!(listed.is_empty());
    }
}
