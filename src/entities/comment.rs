use sea_orm::entity::prelude::*;
use serde::Serialize;

use super::task_item;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "comments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub task_item_id: i64,
    pub author: String,
    pub body: String,
    pub deleted_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    TaskItem,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::TaskItem => Entity::belongs_to(task_item::Entity)
                .from(Column::TaskItemId)
                .to(task_item::Column::Id)
                .into(),
        }
    }
}

impl Related<task_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
