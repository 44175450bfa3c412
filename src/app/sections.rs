use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::warn;

use super::{ensure_non_empty, finalize_transaction, App};
use crate::entities::{section, subtask, task_item};
use crate::error::AppError;
use crate::model::{SectionView, TaskItemView};
use crate::ordering::next_order;
use crate::progress::compute_progress;

impl App {
    pub async fn create_section(
        &self,
        project_id: i64,
        title: String,
    ) -> Result<section::Model, AppError> {
        ensure_non_empty("section title", &title)?;
        let txn = self.db.begin().await?;
        let result: Result<section::Model, AppError> = async {
            self.owned_project_with_conn(&txn, project_id).await?;
            let sort_order = next_order::<section::Entity, _>(&txn, project_id).await?;
            let now = Utc::now();
            let active = section::ActiveModel {
                project_id: Set(project_id),
                title: Set(title),
                sort_order: Set(sort_order),
                deleted_at: Set(None),
                deleted_by: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = section::Entity::insert(active).exec(&txn).await?;
            section::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("section not found after insert".to_string()))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn update_section(
        &self,
        project_id: i64,
        section_id: i64,
        title: String,
    ) -> Result<section::Model, AppError> {
        ensure_non_empty("section title", &title)?;
        let txn = self.db.begin().await?;
        let result: Result<section::Model, AppError> = async {
            let section = self
                .active_section_with_conn(&txn, project_id, section_id)
                .await?;
            let mut active: section::ActiveModel = section.into();
            active.title = Set(title);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Active sections of a project with their active items and subtasks.
    ///
    /// Items whose stored progress disagrees with their subtasks are
    /// corrected in storage before the listing is returned.
    pub async fn list_sections(&self, project_id: i64) -> Result<Vec<SectionView>, AppError> {
        self.owned_project_with_conn(&self.db, project_id).await?;
        let sections = section::Entity::find()
            .filter(section::Column::ProjectId.eq(project_id))
            .filter(section::Column::DeletedAt.is_null())
            .order_by_asc(section::Column::SortOrder)
            .order_by_asc(section::Column::Id)
            .all(&self.db)
            .await?;
        if sections.is_empty() {
            return Ok(Vec::new());
        }

        let section_ids: Vec<i64> = sections.iter().map(|section| section.id).collect();
        let items = task_item::Entity::find()
            .filter(task_item::Column::ProjectId.eq(project_id))
            .filter(task_item::Column::SectionId.is_in(section_ids))
            .filter(task_item::Column::DeletedAt.is_null())
            .order_by_asc(task_item::Column::SortOrder)
            .order_by_asc(task_item::Column::Id)
            .all(&self.db)
            .await?;
        let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let mut subtasks_by_item: HashMap<i64, Vec<subtask::Model>> = HashMap::new();
        if !item_ids.is_empty() {
            let subtasks = subtask::Entity::find()
                .filter(subtask::Column::TaskItemId.is_in(item_ids))
                .order_by_asc(subtask::Column::SortOrder)
                .order_by_asc(subtask::Column::Id)
                .all(&self.db)
                .await?;
            for subtask in subtasks {
                subtasks_by_item
                    .entry(subtask.task_item_id)
                    .or_default()
                    .push(subtask);
            }
        }

        let mut corrections = Vec::new();
        let mut items_by_section: HashMap<i64, Vec<TaskItemView>> = HashMap::new();
        for mut item in items {
            let subtasks = subtasks_by_item.remove(&item.id).unwrap_or_default();
            let completed = subtasks.iter().filter(|subtask| subtask.is_completed).count();
            if let Some(progress) = compute_progress(completed as u64, subtasks.len() as u64) {
                if item.progress != progress || item.alt_progress != progress {
                    warn!(
                        item_id = item.id,
                        stored = item.progress,
                        computed = progress,
                        "task item progress out of sync; correcting"
                    );
                    corrections.push((item.id, progress));
                    item.progress = progress;
                    item.alt_progress = progress;
                }
            }
            if let Some(section_id) = item.section_id {
                items_by_section
                    .entry(section_id)
                    .or_default()
                    .push(TaskItemView {
                        item,
                        subtasks_list: subtasks,
                    });
            }
        }

        if !corrections.is_empty() {
            let txn = self.db.begin().await?;
            let result: Result<(), AppError> = async {
                for (item_id, progress) in &corrections {
                    self.write_progress_with_conn(&txn, *item_id, *progress)
                        .await?;
                }
                Ok(())
            }
            .await;
            finalize_transaction(txn, result).await?;
        }

        Ok(sections
            .into_iter()
            .map(|section| {
                let items = items_by_section.remove(&section.id).unwrap_or_default();
                SectionView {
                    item_count: items.len(),
                    section,
                    items,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

    use crate::app::testing::{
        as_user, create_item, create_project, create_section, create_subtask, setup_app, OTHER,
    };
    use crate::entities::task_item;
    use crate::error::AppError;
    use crate::model::SubtaskChanges;

    #[tokio::test]
    async fn sections_append_in_order() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let backlog = create_section(&app, project.id, "Backlog").await;
        let doing = create_section(&app, project.id, "Doing").await;
        assert_eq!(backlog.sort_order, 1);
        assert_eq!(doing.sort_order, 2);

        let listed = app.list_sections(project.id).await.expect("list");
        let titles: Vec<_> = listed.iter().map(|view| view.section.title.as_str()).collect();
        assert_eq!(titles, vec!["Backlog", "Doing"]);
    }

    #[tokio::test]
    async fn create_section_rejects_blank_title_before_writing() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let err = app
            .create_section(project.id, " ".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(app.list_sections(project.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_section_checks_project_scope() {
        let (_dir, app) = setup_app().await;
        let first = create_project(&app, "First").await;
        let second = create_project(&app, "Second").await;
        let section = create_section(&app, first.id, "Backlog").await;

        let err = app
            .update_section(second.id, section.id, "Moved".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = app
            .update_section(first.id, 999, "Missing".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let updated = app
            .update_section(first.id, section.id, "Ideas".to_string())
            .await
            .expect("update");
        assert_eq!(updated.title, "Ideas");
        assert_eq!(updated.sort_order, section.sort_order);
    }

    #[tokio::test]
    async fn other_identity_cannot_list_or_create() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let bob = as_user(&app, OTHER);

        let err = bob.list_sections(project.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = bob
            .create_section(project.id, "Intruder".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn listing_reconciles_stale_progress() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Design").await;
        let first = create_subtask(&app, project.id, section.id, item.id, "Sketch").await;
        create_subtask(&app, project.id, section.id, item.id, "Review").await;
        create_subtask(&app, project.id, section.id, item.id, "Ship").await;
        app.update_subtask(
            project.id,
            section.id,
            item.id,
            first.id,
            SubtaskChanges {
                is_completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("complete");

        // Corrupt the stored value behind the store's back.
        task_item::Entity::update_many()
            .set(task_item::ActiveModel {
                progress: Set(90),
                alt_progress: Set(10),
                ..Default::default()
            })
            .filter(task_item::Column::Id.eq(item.id))
            .exec(&app.db)
            .await
            .expect("corrupt");

        let listed = app.list_sections(project.id).await.expect("list");
        assert_eq!(listed[0].items[0].item.progress, 33);
        assert_eq!(listed[0].items[0].item.alt_progress, 33);

        let stored = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert_eq!(stored.progress, 33);
        assert_eq!(stored.alt_progress, 33);
    }

    #[tokio::test]
    async fn listing_leaves_items_without_subtasks_alone() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "Manual").await;

        task_item::Entity::update_many()
            .set(task_item::ActiveModel {
                progress: Set(40),
                alt_progress: Set(40),
                ..Default::default()
            })
            .filter(task_item::Column::Id.eq(item.id))
            .exec(&app.db)
            .await
            .expect("set progress");
        let before = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");

        let listed = app.list_sections(project.id).await.expect("list");
        assert_eq!(listed[0].items[0].item.progress, 40);

        let after = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.progress, 40);
    }
}
