use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait};

use crate::entities::{project, section, subtask, task_item};
use crate::error::AppError;

mod comments;
mod items;
mod projects;
mod reorder;
mod sections;
mod subtasks;
mod trash;

#[cfg(test)]
pub(crate) mod testing;

/// Board operations on behalf of one identity. Every object reached
/// through it must sit in a project that identity owns.
pub struct App {
    db: DatabaseConnection,
    user: String,
}

impl App {
    pub fn new(db: DatabaseConnection, user: String) -> Self {
        Self { db, user }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl App {
    async fn owned_project_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
    ) -> Result<project::Model, AppError> {
        let project = project::Entity::find_by_id(project_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project id {project_id}")))?;
        if project.owner != self.user {
            return Err(AppError::Forbidden(format!(
                "project id {project_id} is not owned by {}",
                self.user
            )));
        }
        if project.is_archived() {
            return Err(AppError::NotFound(format!(
                "project id {project_id} is archived"
            )));
        }
        Ok(project)
    }

    /// Section in the project, trashed or not.
    async fn scoped_section_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: i64,
    ) -> Result<section::Model, AppError> {
        self.owned_project_with_conn(db, project_id).await?;
        let section = section::Entity::find_by_id(section_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("section id {section_id}")))?;
        if section.project_id != project_id {
            return Err(AppError::Forbidden(format!(
                "section id {section_id} does not belong to project id {project_id}"
            )));
        }
        Ok(section)
    }

    async fn active_section_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: i64,
    ) -> Result<section::Model, AppError> {
        let section = self
            .scoped_section_with_conn(db, project_id, section_id)
            .await?;
        if section.deleted_at.is_some() {
            return Err(AppError::NotFound(format!(
                "section id {section_id} is in trash"
            )));
        }
        Ok(section)
    }

    /// Task item in the project, trashed or not. When `section_id` is given
    /// the item must currently sit in that section.
    async fn scoped_item_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: Option<i64>,
        item_id: i64,
    ) -> Result<task_item::Model, AppError> {
        if let Some(section_id) = section_id {
            self.scoped_section_with_conn(db, project_id, section_id)
                .await?;
        } else {
            self.owned_project_with_conn(db, project_id).await?;
        }
        let item = task_item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task item id {item_id}")))?;
        if item.project_id != project_id {
            return Err(AppError::Forbidden(format!(
                "task item id {item_id} does not belong to project id {project_id}"
            )));
        }
        if let Some(section_id) = section_id {
            if item.section_id != Some(section_id) {
                return Err(AppError::Forbidden(format!(
                    "task item id {item_id} does not belong to section id {section_id}"
                )));
            }
        }
        Ok(item)
    }

    /// Active task item inside an active section.
    async fn active_item_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: i64,
        item_id: i64,
    ) -> Result<task_item::Model, AppError> {
        self.active_section_with_conn(db, project_id, section_id)
            .await?;
        let item = self
            .scoped_item_with_conn(db, project_id, Some(section_id), item_id)
            .await?;
        if item.deleted_at.is_some() {
            return Err(AppError::NotFound(format!(
                "task item id {item_id} is in trash"
            )));
        }
        Ok(item)
    }

    async fn scoped_subtask_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    ) -> Result<subtask::Model, AppError> {
        self.active_item_with_conn(db, project_id, section_id, item_id)
            .await?;
        let subtask = subtask::Entity::find_by_id(subtask_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subtask id {subtask_id}")))?;
        if subtask.task_item_id != item_id {
            return Err(AppError::Forbidden(format!(
                "subtask id {subtask_id} does not belong to task item id {item_id}"
            )));
        }
        Ok(subtask)
    }
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}
