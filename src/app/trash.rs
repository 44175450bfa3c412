use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{info, warn};

use super::{finalize_transaction, App};
use crate::entities::{section, subtask, task_item};
use crate::error::AppError;
use crate::model::{SectionCascade, TrashListing, TrashState, TrashedSection, TrashedTaskItem};

impl App {
    /// Trashes a section and every active task item in it, as one unit.
    pub async fn delete_section(
        &self,
        project_id: i64,
        section_id: i64,
    ) -> Result<SectionCascade, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<SectionCascade, AppError> = async {
            let section = self
                .active_section_with_conn(&txn, project_id, section_id)
                .await?;
            let state = TrashState::trash(&self.user, Utc::now());
            self.set_section_state_with_conn(&txn, section, state)
                .await
                .map_err(AppError::into_cascade)
        }
        .await;

        let cascade = finish_cascade(txn, result, "delete section", section_id).await?;
        info!(
            section_id,
            items = cascade.items_affected,
            by = %self.user,
            "section moved to trash"
        );
        Ok(cascade)
    }

    /// Restores a trashed section together with every trashed task item
    /// under it, including items that were trashed on their own earlier.
    /// A section that is not in trash is returned unchanged and its items
    /// are not touched.
    pub async fn restore_section(
        &self,
        project_id: i64,
        section_id: i64,
    ) -> Result<SectionCascade, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<SectionCascade, AppError> = async {
            let section = self
                .scoped_section_with_conn(&txn, project_id, section_id)
                .await?;
            if !section.trash_state().is_trashed() {
                return Ok(SectionCascade {
                    section,
                    items_affected: 0,
                });
            }
            self.set_section_state_with_conn(&txn, section, TrashState::Active)
                .await
                .map_err(AppError::into_cascade)
        }
        .await;

        let cascade = finish_cascade(txn, result, "restore section", section_id).await?;
        info!(
            section_id,
            items = cascade.items_affected,
            "section restored from trash"
        );
        Ok(cascade)
    }

    /// Trashes one task item. Its subtasks stay attached.
    pub async fn delete_item(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
    ) -> Result<task_item::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<task_item::Model, AppError> = async {
            let item = self
                .active_item_with_conn(&txn, project_id, section_id, item_id)
                .await?;
            let state = TrashState::trash(&self.user, Utc::now());
            set_item_state_with_conn(&txn, item, state).await
        }
        .await;

        let item = finalize_transaction(txn, result).await?;
        info!(item_id, by = %self.user, "task item moved to trash");
        Ok(item)
    }

    /// Brings a task item back at its recorded section and order.
    pub async fn restore_item(
        &self,
        project_id: i64,
        item_id: i64,
    ) -> Result<task_item::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<task_item::Model, AppError> = async {
            let item = self
                .scoped_item_with_conn(&txn, project_id, None, item_id)
                .await?;
            if !item.trash_state().is_trashed() {
                return Ok(item);
            }
            set_item_state_with_conn(&txn, item, TrashState::Active).await
        }
        .await;

        let item = finalize_transaction(txn, result).await?;
        info!(item_id, "task item restored from trash");
        Ok(item)
    }

    /// Trashed sections and task items of a project, most recent first.
    pub async fn list_trash(&self, project_id: i64) -> Result<TrashListing, AppError> {
        self.owned_project_with_conn(&self.db, project_id).await?;

        let trashed_sections = section::Entity::find()
            .filter(section::Column::ProjectId.eq(project_id))
            .filter(section::Column::DeletedAt.is_not_null())
            .order_by_desc(section::Column::DeletedAt)
            .order_by_desc(section::Column::Id)
            .all(&self.db)
            .await?;
        let mut sections = Vec::with_capacity(trashed_sections.len());
        for section in trashed_sections {
            let trashed_item_count = task_item::Entity::find()
                .filter(task_item::Column::SectionId.eq(section.id))
                .filter(task_item::Column::DeletedAt.is_not_null())
                .count(&self.db)
                .await?;
            sections.push(TrashedSection {
                section,
                trashed_item_count,
            });
        }

        let trashed_items = task_item::Entity::find()
            .filter(task_item::Column::ProjectId.eq(project_id))
            .filter(task_item::Column::DeletedAt.is_not_null())
            .order_by_desc(task_item::Column::DeletedAt)
            .order_by_desc(task_item::Column::Id)
            .all(&self.db)
            .await?;
        let section_ids: Vec<i64> = trashed_items
            .iter()
            .filter_map(|item| item.section_id)
            .collect();
        let section_titles: HashMap<i64, String> = if section_ids.is_empty() {
            HashMap::new()
        } else {
            section::Entity::find()
                .filter(section::Column::Id.is_in(section_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|section| (section.id, section.title))
                .collect()
        };
        let mut items = Vec::with_capacity(trashed_items.len());
        for item in trashed_items {
            let subtask_count = subtask::Entity::find()
                .filter(subtask::Column::TaskItemId.eq(item.id))
                .count(&self.db)
                .await?;
            let section_title = item
                .section_id
                .and_then(|section_id| section_titles.get(&section_id).cloned());
            items.push(TrashedTaskItem {
                item,
                subtask_count,
                section_title,
            });
        }

        Ok(TrashListing { sections, items })
    }

    /// Applies `state` to the section and carries it to its task items.
    /// Trashing touches only active items; restoring touches every trashed
    /// item of the section.
    async fn set_section_state_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        section: section::Model,
        state: TrashState,
    ) -> Result<SectionCascade, AppError> {
        let section_id = section.id;
        let trashing = state.is_trashed();
        let (deleted_at, deleted_by) = state.into_columns();
        let now = deleted_at.unwrap_or_else(Utc::now);

        let mut active: section::ActiveModel = section.into();
        active.deleted_at = Set(deleted_at);
        active.deleted_by = Set(deleted_by.clone());
        active.updated_at = Set(now);
        let section = active.update(db).await?;

        let mut children = task_item::Entity::update_many()
            .set(task_item::ActiveModel {
                deleted_at: Set(deleted_at),
                deleted_by: Set(deleted_by),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(task_item::Column::SectionId.eq(section_id));
        children = if trashing {
            children.filter(task_item::Column::DeletedAt.is_null())
        } else {
            children.filter(task_item::Column::DeletedAt.is_not_null())
        };
        let result = children.exec(db).await?;

        Ok(SectionCascade {
            section,
            items_affected: result.rows_affected,
        })
    }
}

async fn set_item_state_with_conn<C: ConnectionTrait>(
    db: &C,
    item: task_item::Model,
    state: TrashState,
) -> Result<task_item::Model, AppError> {
    let (deleted_at, deleted_by): (Option<DateTime<Utc>>, Option<String>) = state.into_columns();
    let mut active: task_item::ActiveModel = item.into();
    active.deleted_at = Set(deleted_at);
    active.deleted_by = Set(deleted_by);
    active.updated_at = Set(deleted_at.unwrap_or_else(Utc::now));
    Ok(active.update(db).await?)
}

async fn finish_cascade(
    txn: sea_orm::DatabaseTransaction,
    result: Result<SectionCascade, AppError>,
    action: &str,
    section_id: i64,
) -> Result<SectionCascade, AppError> {
    if let Err(AppError::Cascade(err)) = &result {
        warn!(section_id, error = %err, "{action} rolled back");
    }
    finalize_transaction(txn, result).await
}

#[cfg(test)]
mod tests {
    use sea_orm::{ConnectionTrait, DatabaseBackend, EntityTrait, Statement};

    use crate::app::testing::{
        as_user, create_item, create_project, create_section, create_subtask, setup_app,
        titles_of_items, OTHER, OWNER,
    };
    use crate::entities::{section, task_item};
    use crate::error::AppError;
    use crate::model::TrashState;

    async fn install_trigger(app: &crate::app::App, sql: &str) {
        app.db
            .execute(Statement::from_string(DatabaseBackend::Sqlite, sql))
            .await
            .expect("install trigger");
    }

    #[tokio::test]
    async fn deleting_section_trashes_its_items() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let a = create_item(&app, project.id, section.id, "A").await;
        create_item(&app, project.id, section.id, "B").await;

        let cascade = app
            .delete_section(project.id, section.id)
            .await
            .expect("delete");
        assert_eq!(cascade.items_affected, 2);
        match cascade.section.trash_state() {
            TrashState::Trashed { by, .. } => assert_eq!(by.as_deref(), Some(OWNER)),
            TrashState::Active => panic!("section should be trashed"),
        }

        let item = task_item::Entity::find_by_id(a.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert!(item.trash_state().is_trashed());
        assert_eq!(item.deleted_by.as_deref(), Some(OWNER));
        assert!(app.list_sections(project.id).await.expect("list").is_empty());

        let err = app
            .delete_section(project.id, section.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn restore_section_brings_back_all_trashed_items() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let early = create_item(&app, project.id, section.id, "Early").await;
        create_item(&app, project.id, section.id, "Cascaded").await;

        app.delete_item(project.id, section.id, early.id)
            .await
            .expect("trash early");
        app.delete_section(project.id, section.id)
            .await
            .expect("delete section");

        let cascade = app
            .restore_section(project.id, section.id)
            .await
            .expect("restore");
        assert_eq!(cascade.items_affected, 2);
        assert!(!cascade.section.trash_state().is_trashed());
        assert!(cascade.section.deleted_by.is_none());

        let items = app.list_items(project.id, section.id).await.expect("list");
        assert_eq!(titles_of_items(&items), vec!["Early", "Cascaded"]);
    }

    #[tokio::test]
    async fn restoring_active_section_does_not_resurrect_items() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let a = create_item(&app, project.id, section.id, "A").await;
        create_item(&app, project.id, section.id, "B").await;

        app.delete_section(project.id, section.id)
            .await
            .expect("delete");
        app.restore_section(project.id, section.id)
            .await
            .expect("restore");
        app.delete_item(project.id, section.id, a.id)
            .await
            .expect("trash a");

        let again = app
            .restore_section(project.id, section.id)
            .await
            .expect("restore again");
        assert_eq!(again.items_affected, 0);
        let items = app.list_items(project.id, section.id).await.expect("list");
        assert_eq!(titles_of_items(&items), vec!["B"]);
    }

    #[tokio::test]
    async fn restored_item_keeps_section_and_order() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        create_item(&app, project.id, section.id, "A").await;
        let b = create_item(&app, project.id, section.id, "B").await;
        create_item(&app, project.id, section.id, "C").await;
        create_subtask(&app, project.id, section.id, b.id, "Sub").await;

        app.delete_item(project.id, section.id, b.id)
            .await
            .expect("trash");
        let items = app.list_items(project.id, section.id).await.expect("list");
        assert_eq!(titles_of_items(&items), vec!["A", "C"]);
        let appended = create_item(&app, project.id, section.id, "D").await;
        assert_eq!(appended.sort_order, 4);

        let restored = app.restore_item(project.id, b.id).await.expect("restore");
        assert_eq!(restored.section_id, Some(section.id));
        assert_eq!(restored.sort_order, b.sort_order);
        let items = app.list_items(project.id, section.id).await.expect("list");
        assert_eq!(titles_of_items(&items), vec!["A", "B", "C", "D"]);
        let subtasks = app
            .list_subtasks(project.id, section.id, b.id)
            .await
            .expect("subtasks");
        assert_eq!(subtasks.len(), 1);
    }

    #[tokio::test]
    async fn trash_listing_reports_counts_and_recency() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let backlog = create_section(&app, project.id, "Backlog").await;
        let doing = create_section(&app, project.id, "Doing").await;
        let lonely = create_item(&app, project.id, doing.id, "Lonely").await;
        create_subtask(&app, project.id, doing.id, lonely.id, "One").await;
        create_subtask(&app, project.id, doing.id, lonely.id, "Two").await;
        create_item(&app, project.id, backlog.id, "A").await;
        create_item(&app, project.id, backlog.id, "B").await;

        app.delete_item(project.id, doing.id, lonely.id)
            .await
            .expect("trash item");
        app.delete_section(project.id, backlog.id)
            .await
            .expect("trash section");

        let trash = app.list_trash(project.id).await.expect("trash");
        assert_eq!(trash.sections.len(), 1);
        assert_eq!(trash.sections[0].section.id, backlog.id);
        assert_eq!(trash.sections[0].trashed_item_count, 2);
        assert_eq!(trash.sections[0].section.deleted_by.as_deref(), Some(OWNER));

        let titles: Vec<_> = trash.items.iter().map(|t| t.item.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "Lonely"]);
        let lonely_entry = &trash.items[2];
        assert_eq!(lonely_entry.subtask_count, 2);
        assert_eq!(lonely_entry.section_title.as_deref(), Some("Doing"));
        assert_eq!(trash.items[0].section_title.as_deref(), Some("Backlog"));
    }

    #[tokio::test]
    async fn other_identity_cannot_touch_trash() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "A").await;
        let bob = as_user(&app, OTHER);

        let err = bob
            .delete_section(project.id, section.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = bob.list_trash(project.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        app.delete_item(project.id, section.id, item.id)
            .await
            .expect("trash");
        let err = bob.restore_item(project.id, item.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn failed_delete_cascade_rolls_back() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "A").await;
        install_trigger(
            &app,
            "CREATE TRIGGER fail_item_trash BEFORE UPDATE ON task_items \
             WHEN NEW.deleted_at IS NOT NULL AND OLD.deleted_at IS NULL \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .await;

        let err = app
            .delete_section(project.id, section.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cascade(_)), "got {err:?}");

        let stored_section = section::Entity::find_by_id(section.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("section");
        assert!(stored_section.deleted_at.is_none());
        assert!(stored_section.deleted_by.is_none());
        let stored_item = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert!(stored_item.deleted_at.is_none());
    }

    #[tokio::test]
    async fn failed_restore_cascade_rolls_back() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let section = create_section(&app, project.id, "Backlog").await;
        let item = create_item(&app, project.id, section.id, "A").await;
        app.delete_section(project.id, section.id)
            .await
            .expect("delete");
        install_trigger(
            &app,
            "CREATE TRIGGER fail_item_restore BEFORE UPDATE ON task_items \
             WHEN NEW.deleted_at IS NULL AND OLD.deleted_at IS NOT NULL \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .await;

        let err = app
            .restore_section(project.id, section.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cascade(_)), "got {err:?}");

        let stored_section = section::Entity::find_by_id(section.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("section");
        assert!(stored_section.trash_state().is_trashed());
        let stored_item = task_item::Entity::find_by_id(item.id)
            .one(&app.db)
            .await
            .expect("find")
            .expect("item");
        assert!(stored_item.trash_state().is_trashed());
    }

    #[tokio::test]
    async fn board_round_trip_through_trash() {
        let (_dir, app) = setup_app().await;
        let project = create_project(&app, "Board").await;
        let backlog = create_section(&app, project.id, "Backlog").await;
        assert_eq!(backlog.sort_order, 1);
        let design = create_item(&app, project.id, backlog.id, "Design").await;
        assert_eq!(design.sort_order, 1);
        let first = create_subtask(&app, project.id, backlog.id, design.id, "Sketch").await;
        create_subtask(&app, project.id, backlog.id, design.id, "Review").await;
        let (_, progress) = app
            .toggle_subtask(project.id, backlog.id, design.id, first.id)
            .await
            .expect("toggle");
        assert_eq!(progress, Some(50));

        app.delete_section(project.id, backlog.id)
            .await
            .expect("delete");
        let trash = app.list_trash(project.id).await.expect("trash");
        assert_eq!(trash.sections[0].section.title, "Backlog");
        assert_eq!(trash.items[0].item.title, "Design");

        app.restore_section(project.id, backlog.id)
            .await
            .expect("restore");
        let listed = app.list_sections(project.id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].section.sort_order, 1);
        assert_eq!(listed[0].items[0].item.title, "Design");
        assert_eq!(listed[0].items[0].item.sort_order, 1);
        assert_eq!(listed[0].items[0].item.progress, 50);
        assert!(app.list_trash(project.id).await.expect("trash").items.is_empty());
    }
}
