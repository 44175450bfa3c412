pub mod comment;
pub mod project;
pub mod section;
pub mod subtask;
pub mod task_item;
