use tempfile::TempDir;

use super::App;
use crate::db;
use crate::entities::{project, section, subtask, task_item};
use crate::model::{ProjectInput, TaskItemInput};

pub const OWNER: &str = "alice";
pub const OTHER: &str = "bob";

pub async fn setup_app() -> (TempDir, App) {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("taskboard.db");
    db::ensure_parent_dir(&db_path).expect("ensure parent");
    let db = db::connect(&db_path).await.expect("connect db");
    db::ensure_schema(&db).await.expect("ensure schema");
    (dir, App::new(db, OWNER.to_string()))
}

/// Same database, different identity.
pub fn as_user(app: &App, user: &str) -> App {
    App::new(app.db.clone(), user.to_string())
}

pub async fn create_project(app: &App, name: &str) -> project::Model {
    app.create_project(ProjectInput {
        name: name.to_string(),
        description: None,
    })
    .await
    .expect("create project")
}

pub async fn create_section(app: &App, project_id: i64, title: &str) -> section::Model {
    app.create_section(project_id, title.to_string())
        .await
        .expect("create section")
}

pub async fn create_item(
    app: &App,
    project_id: i64,
    section_id: i64,
    title: &str,
) -> task_item::Model {
    app.create_item(
        project_id,
        section_id,
        TaskItemInput {
            title: title.to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("create item")
}

pub async fn create_subtask(
    app: &App,
    project_id: i64,
    section_id: i64,
    item_id: i64,
    title: &str,
) -> subtask::Model {
    let (subtask, _) = app
        .create_subtask(project_id, section_id, item_id, title.to_string())
        .await
        .expect("create subtask");
    subtask
}

pub fn titles_of_items(items: &[task_item::Model]) -> Vec<&str> {
    items.iter().map(|item| item.title.as_str()).collect()
}
