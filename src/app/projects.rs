use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::info;

use super::{ensure_non_empty, finalize_transaction, App};
use crate::entities::project;
use crate::error::AppError;
use crate::model::{ProjectChanges, ProjectInput};

impl App {
    pub async fn create_project(&self, input: ProjectInput) -> Result<project::Model, AppError> {
        ensure_non_empty("project name", &input.name)?;
        let now = Utc::now();
        let active = project::ActiveModel {
            owner: Set(self.user.clone()),
            name: Set(input.name),
            description: Set(input.description),
            archived_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let insert = project::Entity::insert(active).exec(&self.db).await?;
        let created = project::Entity::find_by_id(insert.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("project not found after insert".to_string()))?;
        info!(project_id = created.id, owner = %self.user, "project created");
        Ok(created)
    }

    /// Projects owned by the current identity, archived ones excluded.
    pub async fn list_projects(&self) -> Result<Vec<project::Model>, AppError> {
        Ok(project::Entity::find()
            .filter(project::Column::Owner.eq(self.user.as_str()))
            .filter(project::Column::ArchivedAt.is_null())
            .order_by_asc(project::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_project(&self, project_id: i64) -> Result<project::Model, AppError> {
        self.owned_project_with_conn(&self.db, project_id).await
    }

    pub async fn update_project(
        &self,
        project_id: i64,
        changes: ProjectChanges,
    ) -> Result<project::Model, AppError> {
        if let Some(name) = changes.name.as_deref() {
            ensure_non_empty("project name", name)?;
        }
        let txn = self.db.begin().await?;
        let result: Result<project::Model, AppError> = async {
            let project = self.owned_project_with_conn(&txn, project_id).await?;
            let mut active: project::ActiveModel = project.into();
            if let Some(name) = changes.name {
                active.name = Set(name);
            }
            if let Some(description) = changes.description {
                active.description = Set(Some(description));
            }
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Soft-deletes the project. Its sections and items stay untouched and
    /// come back with it.
    pub async fn archive_project(&self, project_id: i64) -> Result<project::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<project::Model, AppError> = async {
            let project = self.owned_project_with_conn(&txn, project_id).await?;
            let now = Utc::now();
            let mut active: project::ActiveModel = project.into();
            active.archived_at = Set(Some(now));
            active.updated_at = Set(now);
            Ok(active.update(&txn).await?)
        }
        .await;

        let archived = finalize_transaction(txn, result).await?;
        info!(project_id, "project archived");
        Ok(archived)
    }

    pub async fn unarchive_project(&self, project_id: i64) -> Result<project::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<project::Model, AppError> = async {
            let project = project::Entity::find_by_id(project_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("project id {project_id}")))?;
            if project.owner != self.user {
                return Err(AppError::Forbidden(format!(
                    "project id {project_id} is not owned by {}",
                    self.user
                )));
            }
            if !project.is_archived() {
                return Ok(project);
            }
            let mut active: project::ActiveModel = project.into();
            active.archived_at = Set(None);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }
}
