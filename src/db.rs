use std::fs::{self, File, OpenOptions};
use std::path::Path;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{comment, project, section, subtask, task_item};
use crate::error::AppError;

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Advisory lock next to the database file. Holding the write side
/// serializes whole requests across processes.
pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut project_stmt = schema.create_table_from_entity(project::Entity);
    project_stmt.if_not_exists();
    db.execute(builder.build(&project_stmt)).await?;

    let mut section_stmt = schema.create_table_from_entity(section::Entity);
    section_stmt.if_not_exists();
    db.execute(builder.build(&section_stmt)).await?;

    let mut item_stmt = schema.create_table_from_entity(task_item::Entity);
    item_stmt.if_not_exists();
    db.execute(builder.build(&item_stmt)).await?;

    let mut subtask_stmt = schema.create_table_from_entity(subtask::Entity);
    subtask_stmt.if_not_exists();
    db.execute(builder.build(&subtask_stmt)).await?;

    let mut comment_stmt = schema.create_table_from_entity(comment::Entity);
    comment_stmt.if_not_exists();
    db.execute(builder.build(&comment_stmt)).await?;

    let mut project_owner_index = Index::create()
        .name("idx_projects_owner")
        .table(project::Entity)
        .col(project::Column::Owner)
        .to_owned();
    project_owner_index.if_not_exists();
    db.execute(builder.build(&project_owner_index)).await?;

    let mut section_index = Index::create()
        .name("idx_sections_project_order")
        .table(section::Entity)
        .col(section::Column::ProjectId)
        .col(section::Column::SortOrder)
        .to_owned();
    section_index.if_not_exists();
    db.execute(builder.build(&section_index)).await?;

    let mut item_index = Index::create()
        .name("idx_task_items_section_order")
        .table(task_item::Entity)
        .col(task_item::Column::SectionId)
        .col(task_item::Column::SortOrder)
        .to_owned();
    item_index.if_not_exists();
    db.execute(builder.build(&item_index)).await?;

    let mut item_project_index = Index::create()
        .name("idx_task_items_project")
        .table(task_item::Entity)
        .col(task_item::Column::ProjectId)
        .to_owned();
    item_project_index.if_not_exists();
    db.execute(builder.build(&item_project_index)).await?;

    let mut subtask_index = Index::create()
        .name("idx_subtasks_item_order")
        .table(subtask::Entity)
        .col(subtask::Column::TaskItemId)
        .col(subtask::Column::SortOrder)
        .to_owned();
    subtask_index.if_not_exists();
    db.execute(builder.build(&subtask_index)).await?;

    let mut comment_index = Index::create()
        .name("idx_comments_item")
        .table(comment::Entity)
        .col(comment::Column::TaskItemId)
        .to_owned();
    comment_index.if_not_exists();
    db.execute(builder.build(&comment_index)).await?;

    Ok(())
}
