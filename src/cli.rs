use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::Request;
use crate::model::OrderEntry;

#[derive(Parser, Debug)]
#[command(
    name = "taskboard",
    version,
    about = "Manage sectioned task boards with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "SQLite database file (defaults to TASKBOARD_DB, then TASKBOARD_HOME)"
    )]
    pub db: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "NAME",
        help = "Acting identity (defaults to TASKBOARD_USER)"
    )]
    pub user: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Section(SectionCommand),
    #[command(subcommand)]
    Item(ItemCommand),
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    #[command(subcommand)]
    Comment(CommentCommand),
    #[command(subcommand)]
    Trash(TrashCommand),
    /// Read one JSON request per line from stdin, answer one JSON line each.
    Api,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    List,
    Add(ProjectAdd),
    Show(ProjectRef),
    Update(ProjectUpdate),
    Archive(ProjectRef),
    Unarchive(ProjectRef),
}

#[derive(Subcommand, Debug)]
pub enum SectionCommand {
    List(ProjectRef),
    Add(SectionAdd),
    Update(SectionUpdate),
    Remove(SectionRef),
    Restore(SectionRef),
    Reorder(SectionReorder),
}

#[derive(Subcommand, Debug)]
pub enum ItemCommand {
    List(SectionRef),
    Show(ItemRef),
    Add(ItemAdd),
    Update(ItemUpdate),
    Remove(ItemRef),
    Restore(ItemRestore),
    Reorder(ItemReorder),
    Move(ItemMove),
}

#[derive(Subcommand, Debug)]
pub enum SubtaskCommand {
    List(ItemRef),
    Show(SubtaskRef),
    Add(SubtaskAdd),
    Update(SubtaskUpdate),
    Toggle(SubtaskRef),
    Remove(SubtaskRef),
    Reorder(SubtaskReorder),
}

#[derive(Subcommand, Debug)]
pub enum CommentCommand {
    List(ItemRef),
    Add(CommentAdd),
    Edit(CommentEdit),
    Remove(CommentRef),
}

#[derive(Subcommand, Debug)]
pub enum TrashCommand {
    List(ProjectRef),
}

#[derive(Args, Debug)]
pub struct ProjectRef {
    pub project_id: i64,
}

#[derive(Args, Debug)]
pub struct ProjectAdd {
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProjectUpdate {
    pub project_id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct SectionRef {
    pub project_id: i64,
    pub section_id: i64,
}

#[derive(Args, Debug)]
pub struct SectionAdd {
    pub project_id: i64,
    pub title: String,
}

#[derive(Args, Debug)]
pub struct SectionUpdate {
    pub project_id: i64,
    pub section_id: i64,
    pub title: String,
}

#[derive(Args, Debug)]
pub struct SectionReorder {
    pub project_id: i64,
    #[arg(value_name = "ID:ORDER", num_args = 1.., value_parser = parse_order_entry)]
    pub orders: Vec<OrderEntry>,
}

#[derive(Args, Debug)]
pub struct ItemRef {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
}

#[derive(Args, Debug)]
pub struct ItemAdd {
    pub project_id: i64,
    pub section_id: i64,
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,
    #[arg(long, value_name = "TEXT", help = "Free-form subtask notes kept with the item")]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ItemUpdate {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub notes: Option<String>,
    #[arg(long, value_name = "0-100")]
    pub progress: Option<i32>,
}

#[derive(Args, Debug)]
pub struct ItemRestore {
    pub project_id: i64,
    pub item_id: i64,
}

#[derive(Args, Debug)]
pub struct ItemReorder {
    pub project_id: i64,
    pub section_id: i64,
    #[arg(value_name = "ID:ORDER", num_args = 1.., value_parser = parse_order_entry)]
    pub orders: Vec<OrderEntry>,
}

#[derive(Args, Debug)]
pub struct ItemMove {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    #[arg(long = "to", value_name = "SECTION_ID")]
    pub to_section_id: i64,
    #[arg(long)]
    pub order: i32,
}

#[derive(Args, Debug)]
pub struct SubtaskRef {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub subtask_id: i64,
}

#[derive(Args, Debug)]
pub struct SubtaskAdd {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub title: String,
}

#[derive(Args, Debug)]
pub struct SubtaskUpdate {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub subtask_id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "undone")]
    pub done: bool,
    #[arg(long)]
    pub undone: bool,
}

#[derive(Args, Debug)]
pub struct SubtaskReorder {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    #[arg(value_name = "ID:ORDER", num_args = 1.., value_parser = parse_order_entry)]
    pub orders: Vec<OrderEntry>,
}

#[derive(Args, Debug)]
pub struct CommentAdd {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub body: String,
}

#[derive(Args, Debug)]
pub struct CommentEdit {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub comment_id: i64,
    pub body: String,
}

#[derive(Args, Debug)]
pub struct CommentRef {
    pub project_id: i64,
    pub section_id: i64,
    pub item_id: i64,
    pub comment_id: i64,
}

fn parse_order_entry(value: &str) -> Result<OrderEntry, String> {
    let (id, order) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ID:ORDER, got '{value}'"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid id in '{value}'"))?;
    let order = order
        .trim()
        .parse()
        .map_err(|_| format!("invalid order in '{value}'"))?;
    Ok(OrderEntry { id, order })
}

impl Command {
    /// The request a subcommand stands for. `api` has none; it reads its
    /// requests from stdin.
    pub fn into_request(self) -> Option<Request> {
        let request = match self {
            Command::Project(command) => command.into(),
            Command::Section(command) => command.into(),
            Command::Item(command) => command.into(),
            Command::Subtask(command) => command.into(),
            Command::Comment(command) => command.into(),
            Command::Trash(TrashCommand::List(args)) => Request::ListTrash {
                project_id: args.project_id,
            },
            Command::Api => return None,
        };
        Some(request)
    }
}

impl From<ProjectCommand> for Request {
    fn from(command: ProjectCommand) -> Self {
        match command {
            ProjectCommand::List => Request::ListProjects,
            ProjectCommand::Add(args) => Request::CreateProject {
                name: args.name,
                description: args.description,
            },
            ProjectCommand::Show(args) => Request::GetProject {
                project_id: args.project_id,
            },
            ProjectCommand::Update(args) => Request::UpdateProject {
                project_id: args.project_id,
                name: args.name,
                description: args.description,
            },
            ProjectCommand::Archive(args) => Request::ArchiveProject {
                project_id: args.project_id,
            },
            ProjectCommand::Unarchive(args) => Request::UnarchiveProject {
                project_id: args.project_id,
            },
        }
    }
}

impl From<SectionCommand> for Request {
    fn from(command: SectionCommand) -> Self {
        match command {
            SectionCommand::List(args) => Request::ListSections {
                project_id: args.project_id,
            },
            SectionCommand::Add(args) => Request::CreateSection {
                project_id: args.project_id,
                title: args.title,
            },
            SectionCommand::Update(args) => Request::UpdateSection {
                project_id: args.project_id,
                section_id: args.section_id,
                title: args.title,
            },
            SectionCommand::Remove(args) => Request::DeleteSection {
                project_id: args.project_id,
                section_id: args.section_id,
            },
            SectionCommand::Restore(args) => Request::RestoreSection {
                project_id: args.project_id,
                section_id: args.section_id,
            },
            SectionCommand::Reorder(args) => Request::ReorderSections {
                project_id: args.project_id,
                orders: args.orders,
            },
        }
    }
}

impl From<ItemCommand> for Request {
    fn from(command: ItemCommand) -> Self {
        match command {
            ItemCommand::List(args) => Request::ListItems {
                project_id: args.project_id,
                section_id: args.section_id,
            },
            ItemCommand::Show(args) => Request::GetItem {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
            },
            ItemCommand::Add(args) => Request::CreateItem {
                project_id: args.project_id,
                section_id: args.section_id,
                title: args.title,
                description: args.description,
                date: args.date,
                subtasks: args.notes,
            },
            ItemCommand::Update(args) => Request::UpdateItem {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                title: args.title,
                description: args.description,
                date: args.date,
                subtasks: args.notes,
                progress: args.progress,
            },
            ItemCommand::Remove(args) => Request::DeleteItem {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
            },
            ItemCommand::Restore(args) => Request::RestoreItem {
                project_id: args.project_id,
                item_id: args.item_id,
            },
            ItemCommand::Reorder(args) => Request::ReorderItems {
                project_id: args.project_id,
                section_id: args.section_id,
                orders: args.orders,
            },
            ItemCommand::Move(args) => Request::MoveItem {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                to_section_id: args.to_section_id,
                order: args.order,
            },
        }
    }
}

impl From<SubtaskCommand> for Request {
    fn from(command: SubtaskCommand) -> Self {
        match command {
            SubtaskCommand::List(args) => Request::ListSubtasks {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
            },
            SubtaskCommand::Show(args) => Request::GetSubtask {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                subtask_id: args.subtask_id,
            },
            SubtaskCommand::Add(args) => Request::CreateSubtask {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                title: args.title,
            },
            SubtaskCommand::Update(args) => {
                let is_completed = match (args.done, args.undone) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                Request::UpdateSubtask {
                    project_id: args.project_id,
                    section_id: args.section_id,
                    item_id: args.item_id,
                    subtask_id: args.subtask_id,
                    title: args.title,
                    is_completed,
                }
            }
            SubtaskCommand::Toggle(args) => Request::ToggleSubtask {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                subtask_id: args.subtask_id,
            },
            SubtaskCommand::Remove(args) => Request::DeleteSubtask {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                subtask_id: args.subtask_id,
            },
            SubtaskCommand::Reorder(args) => Request::ReorderSubtasks {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                orders: args.orders,
            },
        }
    }
}

impl From<CommentCommand> for Request {
    fn from(command: CommentCommand) -> Self {
        match command {
            CommentCommand::List(args) => Request::ListComments {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
            },
            CommentCommand::Add(args) => Request::AddComment {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                body: args.body,
            },
            CommentCommand::Edit(args) => Request::UpdateComment {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                comment_id: args.comment_id,
                body: args.body,
            },
            CommentCommand::Remove(args) => Request::DeleteComment {
                project_id: args.project_id,
                section_id: args.section_id,
                item_id: args.item_id,
                comment_id: args.comment_id,
            },
        }
    }
}
