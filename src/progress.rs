/// Percentage of completed subtasks, rounded half away from zero.
/// `None` when there is nothing to count; the stored value is then kept.
pub fn compute_progress(completed: u64, total: u64) -> Option<i32> {
    if total == 0 {
        return None;
    }
    let completed = completed.min(total);
    // Both operands are non-negative, so half-up equals half-away-from-zero.
    let rounded = (200 * completed + total) / (2 * total);
    Some(rounded as i32)
}

pub fn is_valid_progress(value: i32) -> bool {
    (0..=100).contains(&value)
}
