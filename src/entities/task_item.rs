use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::{comment, section, subtask};
use crate::model::TrashState;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "task_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub section_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub progress: i32,
    pub alt_progress: i32,
    /// Legacy free-text checklist; the subtask rows are authoritative.
    pub subtasks: Option<String>,
    pub date: Option<String>,
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
    Section,
    Subtask,
    Comment,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Section => Entity::belongs_to(section::Entity)
                .from(Column::SectionId)
                .to(section::Column::Id)
                .into(),
            Self::Subtask => Entity::has_many(subtask::Entity).into(),
            Self::Comment => Entity::has_many(comment::Entity).into(),
        }
    }
}

impl Related<section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl Related<subtask::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subtask.def()
    }
}

impl Related<comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
