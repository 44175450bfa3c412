//! JSON request/response surface over [`App`].
//!
//! One request is a JSON object tagged by `op`; one response is
//! `{"ok": true, "data": ...}` or `{"ok": false, "error": "..."}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::app::App;
use crate::error::AppError;
use crate::model::{
    OrderEntry, ProjectChanges, ProjectInput, SubtaskChanges, TaskItemChanges, TaskItemInput,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListProjects,
    CreateProject {
        name: String,
        description: Option<String>,
    },
    GetProject {
        project_id: i64,
    },
    UpdateProject {
        project_id: i64,
        name: Option<String>,
        description: Option<String>,
    },
    ArchiveProject {
        project_id: i64,
    },
    UnarchiveProject {
        project_id: i64,
    },

    ListSections {
        project_id: i64,
    },
    CreateSection {
        project_id: i64,
        title: String,
    },
    UpdateSection {
        project_id: i64,
        section_id: i64,
        title: String,
    },
    DeleteSection {
        project_id: i64,
        section_id: i64,
    },
    RestoreSection {
        project_id: i64,
        section_id: i64,
    },
    ReorderSections {
        project_id: i64,
        orders: Vec<OrderEntry>,
    },

    ListItems {
        project_id: i64,
        section_id: i64,
    },
    GetItem {
        project_id: i64,
        section_id: i64,
        item_id: i64,
    },
    CreateItem {
        project_id: i64,
        section_id: i64,
        title: String,
        description: Option<String>,
        date: Option<String>,
        subtasks: Option<String>,
    },
    UpdateItem {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        title: Option<String>,
        description: Option<String>,
        date: Option<String>,
        subtasks: Option<String>,
        progress: Option<i32>,
    },
    DeleteItem {
        project_id: i64,
        section_id: i64,
        item_id: i64,
    },
    RestoreItem {
        project_id: i64,
        item_id: i64,
    },
    ReorderItems {
        project_id: i64,
        section_id: i64,
        orders: Vec<OrderEntry>,
    },
    MoveItem {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        to_section_id: i64,
        order: i32,
    },

    ListSubtasks {
        project_id: i64,
        section_id: i64,
        item_id: i64,
    },
    GetSubtask {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    },
    CreateSubtask {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        title: String,
    },
    UpdateSubtask {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
        title: Option<String>,
        is_completed: Option<bool>,
    },
    ToggleSubtask {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    },
    DeleteSubtask {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        subtask_id: i64,
    },
    ReorderSubtasks {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        orders: Vec<OrderEntry>,
    },

    ListComments {
        project_id: i64,
        section_id: i64,
        item_id: i64,
    },
    AddComment {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        body: String,
    },
    UpdateComment {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        comment_id: i64,
        body: String,
    },
    DeleteComment {
        project_id: i64,
        section_id: i64,
        item_id: i64,
        comment_id: i64,
    },

    ListTrash {
        project_id: i64,
    },
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Runs one request and folds any error into a response that does not
/// reveal whether a foreign object exists.
pub async fn handle(app: &App, request: Request) -> Response {
    match dispatch(app, request).await {
        Ok(data) => Response::success(data),
        Err(err) => {
            warn!(user = app.user(), error = %err, "request failed");
            Response::failure(err.public_message())
        }
    }
}

/// Parses one line of input and runs it.
pub async fn handle_line(app: &App, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(app, request).await,
        Err(err) => {
            debug!(error = %err, "unparseable request");
            Response::failure(format!("invalid request: {err}"))
        }
    }
}

pub async fn dispatch(app: &App, request: Request) -> Result<Value, AppError> {
    let value = match request {
        Request::ListProjects => to_value(app.list_projects().await?)?,
        Request::CreateProject { name, description } => to_value(
            app.create_project(ProjectInput { name, description })
                .await?,
        )?,
        Request::GetProject { project_id } => to_value(app.get_project(project_id).await?)?,
        Request::UpdateProject {
            project_id,
            name,
            description,
        } => to_value(
            app.update_project(project_id, ProjectChanges { name, description })
                .await?,
        )?,
        Request::ArchiveProject { project_id } => {
            to_value(app.archive_project(project_id).await?)?
        }
        Request::UnarchiveProject { project_id } => {
            to_value(app.unarchive_project(project_id).await?)?
        }

        Request::ListSections { project_id } => to_value(app.list_sections(project_id).await?)?,
        Request::CreateSection { project_id, title } => {
            to_value(app.create_section(project_id, title).await?)?
        }
        Request::UpdateSection {
            project_id,
            section_id,
            title,
        } => to_value(app.update_section(project_id, section_id, title).await?)?,
        Request::DeleteSection {
            project_id,
            section_id,
        } => to_value(app.delete_section(project_id, section_id).await?)?,
        Request::RestoreSection {
            project_id,
            section_id,
        } => to_value(app.restore_section(project_id, section_id).await?)?,
        Request::ReorderSections { project_id, orders } => {
            to_value(app.reorder_sections(project_id, &orders).await?)?
        }

        Request::ListItems {
            project_id,
            section_id,
        } => to_value(app.list_items(project_id, section_id).await?)?,
        Request::GetItem {
            project_id,
            section_id,
            item_id,
        } => to_value(app.get_item(project_id, section_id, item_id).await?)?,
        Request::CreateItem {
            project_id,
            section_id,
            title,
            description,
            date,
            subtasks,
        } => to_value(
            app.create_item(
                project_id,
                section_id,
                TaskItemInput {
                    title,
                    description,
                    date,
                    subtasks,
                },
            )
            .await?,
        )?,
        Request::UpdateItem {
            project_id,
            section_id,
            item_id,
            title,
            description,
            date,
            subtasks,
            progress,
        } => to_value(
            app.update_item(
                project_id,
                section_id,
                item_id,
                TaskItemChanges {
                    title,
                    description,
                    date,
                    subtasks,
                    progress,
                },
            )
            .await?,
        )?,
        Request::DeleteItem {
            project_id,
            section_id,
            item_id,
        } => to_value(app.delete_item(project_id, section_id, item_id).await?)?,
        Request::RestoreItem {
            project_id,
            item_id,
        } => to_value(app.restore_item(project_id, item_id).await?)?,
        Request::ReorderItems {
            project_id,
            section_id,
            orders,
        } => to_value(app.reorder_items(project_id, section_id, &orders).await?)?,
        Request::MoveItem {
            project_id,
            section_id,
            item_id,
            to_section_id,
            order,
        } => to_value(
            app.move_item(project_id, section_id, item_id, to_section_id, order)
                .await?,
        )?,

        Request::ListSubtasks {
            project_id,
            section_id,
            item_id,
        } => to_value(app.list_subtasks(project_id, section_id, item_id).await?)?,
        Request::GetSubtask {
            project_id,
            section_id,
            item_id,
            subtask_id,
        } => to_value(
            app.get_subtask(project_id, section_id, item_id, subtask_id)
                .await?,
        )?,
        Request::CreateSubtask {
            project_id,
            section_id,
            item_id,
            title,
        } => {
            let (subtask, progress) = app
                .create_subtask(project_id, section_id, item_id, title)
                .await?;
            json!({ "subtask": subtask, "progress": progress })
        }
        Request::UpdateSubtask {
            project_id,
            section_id,
            item_id,
            subtask_id,
            title,
            is_completed,
        } => {
            let (subtask, progress) = app
                .update_subtask(
                    project_id,
                    section_id,
                    item_id,
                    subtask_id,
                    SubtaskChanges {
                        title,
                        is_completed,
                    },
                )
                .await?;
            json!({ "subtask": subtask, "progress": progress })
        }
        Request::ToggleSubtask {
            project_id,
            section_id,
            item_id,
            subtask_id,
        } => {
            let (subtask, progress) = app
                .toggle_subtask(project_id, section_id, item_id, subtask_id)
                .await?;
            json!({ "subtask": subtask, "progress": progress })
        }
        Request::DeleteSubtask {
            project_id,
            section_id,
            item_id,
            subtask_id,
        } => {
            let progress = app
                .delete_subtask(project_id, section_id, item_id, subtask_id)
                .await?;
            json!({ "deleted": subtask_id, "progress": progress })
        }
        Request::ReorderSubtasks {
            project_id,
            section_id,
            item_id,
            orders,
        } => {
            let (outcome, progress) = app
                .reorder_subtasks(project_id, section_id, item_id, &orders)
                .await?;
            json!({
                "applied": outcome.applied,
                "ignored": outcome.ignored,
                "progress": progress,
            })
        }

        Request::ListComments {
            project_id,
            section_id,
            item_id,
        } => to_value(app.list_comments(project_id, section_id, item_id).await?)?,
        Request::AddComment {
            project_id,
            section_id,
            item_id,
            body,
        } => to_value(
            app.add_comment(project_id, section_id, item_id, body)
                .await?,
        )?,
        Request::UpdateComment {
            project_id,
            section_id,
            item_id,
            comment_id,
            body,
        } => to_value(
            app.update_comment(project_id, section_id, item_id, comment_id, body)
                .await?,
        )?,
        Request::DeleteComment {
            project_id,
            section_id,
            item_id,
            comment_id,
        } => to_value(
            app.delete_comment(project_id, section_id, item_id, comment_id)
                .await?,
        )?,

        Request::ListTrash { project_id } => to_value(app.list_trash(project_id).await?)?,
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value)?)
}
