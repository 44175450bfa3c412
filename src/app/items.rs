use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::{ensure_non_empty, finalize_transaction, App};
use crate::entities::{comment, subtask, task_item};
use crate::error::AppError;
use crate::model::{TaskItemChanges, TaskItemDetail, TaskItemInput};
use crate::ordering::next_order;
use crate::progress::{compute_progress, is_valid_progress};

impl App {
    pub async fn create_item(
        &self,
        project_id: i64,
        section_id: i64,
        input: TaskItemInput,
    ) -> Result<task_item::Model, AppError> {
        ensure_non_empty("task item title", &input.title)?;
        let txn = self.db.begin().await?;
        let result: Result<task_item::Model, AppError> = async {
            self.active_section_with_conn(&txn, project_id, section_id)
                .await?;
            let sort_order = next_order::<task_item::Entity, _>(&txn, section_id).await?;
            let now = Utc::now();
            let active = task_item::ActiveModel {
                project_id: Set(project_id),
                section_id: Set(Some(section_id)),
                title: Set(input.title),
                description: Set(input.description),
                progress: Set(0),
                alt_progress: Set(0),
                subtasks: Set(input.subtasks),
                date: Set(input.date),
                sort_order: Set(sort_order),
                deleted_at: Set(None),
                deleted_by: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = task_item::Entity::insert(active).exec(&txn).await?;
            task_item::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("task item not found after insert".to_string()))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Active items of one section, in board order.
    pub async fn list_items(
        &self,
        project_id: i64,
        section_id: i64,
    ) -> Result<Vec<task_item::Model>, AppError> {
        self.active_section_with_conn(&self.db, project_id, section_id)
            .await?;
        Ok(task_item::Entity::find()
            .filter(task_item::Column::SectionId.eq(section_id))
            .filter(task_item::Column::DeletedAt.is_null())
            .order_by_asc(task_item::Column::SortOrder)
            .order_by_asc(task_item::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_item(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
    ) -> Result<TaskItemDetail, AppError> {
        let item = self
            .active_item_with_conn(&self.db, project_id, section_id, item_id)
            .await?;
        let subtasks = self.subtasks_for_item_with_conn(&self.db, item_id).await?;
        let comments = comment::Entity::find()
            .filter(comment::Column::TaskItemId.eq(item_id))
            .filter(comment::Column::DeletedAt.is_null())
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await?;
        Ok(TaskItemDetail {
            item,
            subtasks_list: subtasks,
            comments,
        })
    }

    pub async fn update_item(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        changes: TaskItemChanges,
    ) -> Result<task_item::Model, AppError> {
        if let Some(title) = changes.title.as_deref() {
            ensure_non_empty("task item title", title)?;
        }
        if let Some(progress) = changes.progress {
            if !is_valid_progress(progress) {
                return Err(AppError::InvalidInput(format!(
                    "progress must be between 0 and 100, got {progress}"
                )));
            }
        }

        let txn = self.db.begin().await?;
        let result: Result<task_item::Model, AppError> = async {
            let item = self
                .active_item_with_conn(&txn, project_id, section_id, item_id)
                .await?;
            let mut active: task_item::ActiveModel = item.into();
            if let Some(title) = changes.title {
                active.title = Set(title);
            }
            if let Some(description) = changes.description {
                active.description = Set(Some(description));
            }
            if let Some(date) = changes.date {
                active.date = Set(Some(date));
            }
            if let Some(summary) = changes.subtasks {
                active.subtasks = Set(Some(summary));
            }
            if let Some(progress) = changes.progress {
                active.progress = Set(progress);
                active.alt_progress = Set(progress);
            }
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub(super) async fn subtasks_for_item_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        item_id: i64,
    ) -> Result<Vec<subtask::Model>, AppError> {
        Ok(subtask::Entity::find()
            .filter(subtask::Column::TaskItemId.eq(item_id))
            .order_by_asc(subtask::Column::SortOrder)
            .order_by_asc(subtask::Column::Id)
            .all(db)
            .await?)
    }

    /// Writes `progress` and its legacy mirror together.
    pub(super) async fn write_progress_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        item_id: i64,
        progress: i32,
    ) -> Result<(), AppError> {
        task_item::Entity::update_many()
            .set(task_item::ActiveModel {
                progress: Set(progress),
                alt_progress: Set(progress),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(task_item::Column::Id.eq(item_id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Recomputes an item's progress from its subtasks. Returns the value
    /// written, or `None` when the item has no subtasks and was left alone.
    pub(super) async fn refresh_item_progress_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        item_id: i64,
    ) -> Result<Option<i32>, AppError> {
        let total = subtask::Entity::find()
            .filter(subtask::Column::TaskItemId.eq(item_id))
            .count(db)
            .await?;
        let completed = subtask::Entity::find()
            .filter(subtask::Column::TaskItemId.eq(item_id))
            .filter(subtask::Column::IsCompleted.eq(true))
            .count(db)
            .await?;
        let Some(progress) = compute_progress(completed, total) else {
            return Ok(None);
        };

        let item = task_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task item id {item_id}")))?;
        if item.progress != progress || item.alt_progress != progress {
            debug!(item_id, from = item.progress, to = progress, "progress recomputed");
            self.write_progress_with_conn(db, item_id, progress).await?;
        }
        Ok(Some(progress))
    }
}

#[cfg(test)]
mod tests {
    use crate::app::testing::{
        as_user, create_item, create_project, create_section, create_subtask, setup_app,
        titles_of_items, OTHER,
    };
    use crate::error::AppError;
    use crate::model::{TaskItemChanges, TaskItemInput};

    #[tokio::test]
    async fn items_append_per_section() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let backlog = create_section(&app, project.id, "Backlog").await;
        let doing = create_section(&app, project.id, "Doing").await;

        let design = create_item(&app, project.id, backlog.id, "Design").await;
        let build = create_item(&app, project.id, backlog.id, "Build").await;
        let review = create_item(&app, project.id, doing.id, "Review").await;
        assert_eq!(design.sort_order, 1);
        assert_eq!(build.sort_order, 2);
        assert_eq!(review.sort_order, 1);
        assert_eq!(design.progress, 0);
        assert_eq!(design.alt_progress, 0);

        let items = app.list_items(project.id, backlog.id).await.expect("list");
        assert_eq!(titles_of_items(&items), vec!["Design", "Build"]);
    }

    #[tokio::test]
    async fn create_item_keeps_legacy_fields() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = app
            .create_item(
                project.id,
                section.id,
                TaskItemInput {
                    title: "Design".to_string(),
                    description: Some("Wireframes".to_string()),
                    date: Some("next week".to_string()),
                    subtasks: Some("- sketch\n- review".to_string()),
                },
            )
            .await
            .expect("create");
        assert_eq!(item.date.as_deref(), Some("next week"));
        assert_eq!(item.subtasks.as_deref(), Some("- sketch\n- review"));
        assert_eq!(item.section_id, Some(section.id));
    }

    #[tokio::test]
    async fn item_in_other_section_is_forbidden() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let backlog = create_section(&app, project.id, "Backlog").await;
        let doing = create_section(&app, project.id, "Doing").await;
        let item = create_item(&app, project.id, backlog.id, "Design").await;

        let err = app
            .update_item(
                project.id,
                doing.id,
                item.id,
                TaskItemChanges {
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = app.get_item(project.id, backlog.id, 9999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let bob = as_user(&app, OTHER);
        let err = bob.get_item(project.id, backlog.id, item.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn manual_progress_updates_both_fields() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;

        let updated = app
            .update_item(
                project.id,
                section.id,
                item.id,
                TaskItemChanges {
                    progress: Some(70),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.progress, 70);
        assert_eq!(updated.alt_progress, 70);

        let err = app
            .update_item(
                project.id,
                section.id,
                item.id,
                TaskItemChanges {
                    progress: Some(120),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn get_item_includes_subtasks_in_order() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        create_subtask(&app, project.id, section.id, item.id, "Sketch").await;
        create_subtask(&app, project.id, section.id, item.id, "Review").await;

        let detail = app
            .get_item(project.id, section.id, item.id)
            .await
            .expect("detail");
        let titles: Vec<_> = detail
            .subtasks_list
            .iter()
            .map(|subtask| subtask.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Sketch", "Review"]);
        assert!(detail.comments.is_empty());
    }
}
