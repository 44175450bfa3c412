use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::{project, task_item};
use crate::model::TrashState;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub deleted_at: Option<DateTimeUtc>,
    pub deleted_by: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn trash_state(&self) -> TrashState {
        TrashState::from_columns(self.deleted_at, self.deleted_by.as_deref())
    }
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Project,
    TaskItem,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Project => Entity::belongs_to(project::Entity)
                .from(Column::ProjectId)
                .to(project::Column::Id)
                .into(),
            Self::TaskItem => Entity::has_many(task_item::Entity).into(),
        }
    }
}

impl Related<project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<task_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
