use super::classify::ProgressUpdate;

/// Callbacks a supervisor delivers to whoever owns the task.
///
/// Called from the supervisor's tokio task, never while the supervisor holds a
/// lock. `complete` and `error` are terminal; at most one of them fires per
/// admission cycle, and neither fires after cancellation.
pub trait TaskEvents: Send + Sync {
    fn progress(&self, update: ProgressUpdate);
    fn title(&self, title: String);
    fn notice(&self, message: String);
    fn complete(&self);
    fn error(&self, message: String);
}
