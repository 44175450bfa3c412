use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use super::{ensure_non_empty, finalize_transaction, App};
use crate::entities::comment;
use crate::error::AppError;

impl App {
    pub async fn list_comments(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
    ) -> Result<Vec<comment::Model>, AppError> {
        self.active_item_with_conn(&self.db, project_id, section_id, item_id)
            .await?;
        Ok(comment::Entity::find()
            .filter(comment::Column::TaskItemId.eq(item_id))
            .filter(comment::Column::DeletedAt.is_null())
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn add_comment(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        body: String,
    ) -> Result<comment::Model, AppError> {
        ensure_non_empty("comment", &body)?;
        let txn = self.db.begin().await?;
        let result: Result<comment::Model, AppError> = async {
            self.active_item_with_conn(&txn, project_id, section_id, item_id)
                .await?;
            let now = Utc::now();
            let active = comment::ActiveModel {
                task_item_id: Set(item_id),
                author: Set(self.user.clone()),
                body: Set(body),
                deleted_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let insert = comment::Entity::insert(active).exec(&txn).await?;
            comment::Entity::find_by_id(insert.last_insert_id)
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("comment not found after insert".to_string()))
        }
        .await;

        finalize_transaction(txn, result).await
    }

    /// Only the author may edit. Owning the project is not enough, and the
    /// item must still be active in a live project.
    pub async fn update_comment(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        comment_id: i64,
        body: String,
    ) -> Result<comment::Model, AppError> {
        ensure_non_empty("comment", &body)?;
        let txn = self.db.begin().await?;
        let result: Result<comment::Model, AppError> = async {
            let comment = self
                .authored_comment_with_conn(&txn, project_id, section_id, item_id, comment_id)
                .await?;
            let mut active: comment::ActiveModel = comment.into();
            active.body = Set(body);
            active.updated_at = Set(Utc::now());
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    pub async fn delete_comment(
        &self,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        comment_id: i64,
    ) -> Result<comment::Model, AppError> {
        let txn = self.db.begin().await?;
        let result: Result<comment::Model, AppError> = async {
            let comment = self
                .authored_comment_with_conn(&txn, project_id, section_id, item_id, comment_id)
                .await?;
            let now = Utc::now();
            let mut active: comment::ActiveModel = comment.into();
            active.deleted_at = Set(Some(now));
            active.updated_at = Set(now);
            Ok(active.update(&txn).await?)
        }
        .await;

        finalize_transaction(txn, result).await
    }

    async fn authored_comment_with_conn<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: i64,
        section_id: i64,
        item_id: i64,
        comment_id: i64,
    ) -> Result<comment::Model, AppError> {
        self.active_item_with_conn(db, project_id, section_id, item_id)
            .await?;
        let comment = comment::Entity::find_by_id(comment_id)
            .one(db)
            .await?
            .filter(|comment| comment.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("comment id {comment_id}")))?;
        if comment.task_item_id != item_id {
            return Err(AppError::Forbidden(format!(
                "comment id {comment_id} does not belong to task item id {item_id}"
            )));
        }
        if comment.author != self.user {
            return Err(AppError::Forbidden(format!(
                "comment id {comment_id} was written by someone else"
            )));
        }
        Ok(comment)
    }
}
