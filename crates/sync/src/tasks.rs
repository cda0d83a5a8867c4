//! Server-side task and backup progress, as reported over the push channel.

use std::collections::HashMap;

use strato_protocol::constants::TaskType;
use strato_protocol::messages::BackupProgressContent;

/// Lifecycle of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    InProgress,
    Complete,
    Cancelled,
    Failed,
}

impl TaskStage {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskStage::InProgress)
    }
}

/// A scan or zip task announced by `taskCreated`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub task_id: String,
    pub task_type: TaskType,
    /// What the task works on, for display.
    pub target: String,
    pub stage: TaskStage,
    pub progress_percent: f64,
    pub tasks_complete: u64,
    pub tasks_total: u64,
    pub tasks_failed: u64,
    pub working_on: Option<String>,
    pub last_finished: Option<String>,
    pub runtime_ms: Option<u64>,
    pub note: Option<String>,
    pub error: Option<String>,
    /// Server-side artifact id, e.g. the takeout of a finished zip.
    pub result_id: Option<String>,
}

impl TaskProgress {
    fn new(task_id: &str, task_type: TaskType, target: String) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_type,
            target,
            stage: TaskStage::InProgress,
            progress_percent: 0.0,
            tasks_complete: 0,
            tasks_total: 0,
            tasks_failed: 0,
            working_on: None,
            last_finished: None,
            runtime_ms: None,
            note: None,
            error: None,
            result_id: None,
        }
    }
}

/// A progress report for a running task. `None` fields leave the
/// tracked value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub progress_percent: Option<f64>,
    pub tasks_complete: Option<u64>,
    pub tasks_total: Option<u64>,
    pub tasks_failed: Option<u64>,
    pub working_on: Option<String>,
    pub finished: Option<String>,
}

#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: HashMap<String, TaskProgress>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task, or refreshes the type and target of a known one.
    pub fn upsert_task(&mut self, task_id: &str, task_type: TaskType, target: impl Into<String>) {
        let target = target.into();
        match self.tasks.get_mut(task_id) {
            Some(task) => {
                task.task_type = task_type;
                task.target = target;
            }
            None => {
                self.tasks.insert(
                    task_id.to_string(),
                    TaskProgress::new(task_id, task_type, target),
                );
            }
        }
    }

    /// Applies a progress report. Unknown and finished tasks are left alone.
    pub fn update_progress(&mut self, task_id: &str, update: TaskUpdate) -> bool {
        let Some(task) = self.running(task_id) else {
            return false;
        };
        if let Some(p) = update.progress_percent {
            task.progress_percent = p.clamp(0.0, 100.0);
        }
        if let Some(n) = update.tasks_complete {
            task.tasks_complete = n;
        }
        if let Some(n) = update.tasks_total {
            task.tasks_total = n;
        }
        if let Some(n) = update.tasks_failed {
            task.tasks_failed = n;
        }
        if update.working_on.is_some() {
            task.working_on = update.working_on;
        }
        if update.finished.is_some() {
            task.last_finished = update.finished;
        }
        true
    }

    pub fn cancel_task(&mut self, task_id: &str) -> bool {
        let Some(task) = self.running(task_id) else {
            return false;
        };
        task.stage = TaskStage::Cancelled;
        true
    }

    pub fn fail_task(&mut self, task_id: &str, error: Option<String>) -> bool {
        let Some(task) = self.running(task_id) else {
            return false;
        };
        task.stage = TaskStage::Failed;
        task.error = error;
        true
    }

    /// Marks a task complete. `runtime_ms` is omitted when the server does not report one.
    pub fn set_task_complete(
        &mut self,
        task_id: &str,
        runtime_ms: Option<u64>,
        note: Option<String>,
        result_id: Option<String>,
    ) -> bool {
        let Some(task) = self.running(task_id) else {
            return false;
        };
        task.stage = TaskStage::Complete;
        task.progress_percent = 100.0;
        task.runtime_ms = runtime_ms;
        task.note = note;
        task.result_id = result_id;
        true
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskProgress> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskProgress> {
        self.tasks.values()
    }

    /// Forgets finished tasks and returns how many were dropped.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| !t.stage.is_finished());
        before - self.tasks.len()
    }

    fn running(&mut self, task_id: &str) -> Option<&mut TaskProgress> {
        self.tasks
            .get_mut(task_id)
            .filter(|t| !t.stage.is_finished())
    }
}

/// Backup progress for one remote core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupProgress {
    pub core_id: String,
    pub running: bool,
    pub progress_current: u64,
    pub progress_total: u64,
    pub files_total: u64,
}

#[derive(Debug, Default)]
pub struct BackupTracker {
    backups: HashMap<String, BackupProgress>,
}

impl BackupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, core_id: &str) {
        self.backups.insert(
            core_id.to_string(),
            BackupProgress {
                core_id: core_id.to_string(),
                running: true,
                ..Default::default()
            },
        );
    }

    pub fn update(&mut self, content: &BackupProgressContent) {
        let entry = self
            .backups
            .entry(content.core_id.clone())
            .or_insert_with(|| BackupProgress {
                core_id: content.core_id.clone(),
                running: true,
                ..Default::default()
            });
        entry.progress_current = content.progress_current;
        entry.progress_total = content.progress_total;
        entry.files_total = content.files_total;
    }

    pub fn complete(&mut self, core_id: &str) {
        if let Some(b) = self.backups.get_mut(core_id) {
            b.running = false;
            b.progress_current = b.progress_total;
        }
    }

    pub fn get(&self, core_id: &str) -> Option<&BackupProgress> {
        self.backups.get(core_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_lifecycle() {
        let mut tracker = TaskTracker::new();
        tracker.upsert_task("t1", TaskType::ScanDirectory, "photos");

        assert!(tracker.update_progress(
            "t1",
            TaskUpdate {
                progress_percent: Some(40.0),
                tasks_total: Some(10),
                working_on: Some("a.jpg".into()),
                ..Default::default()
            }
        ));
        let t = tracker.get("t1").unwrap();
        assert_eq!(t.stage, TaskStage::InProgress);
        assert_eq!(t.progress_percent, 40.0);
        assert_eq!(t.tasks_total, 10);
        assert_eq!(t.working_on.as_deref(), Some("a.jpg"));

        assert!(tracker.set_task_complete("t1", Some(1200), None, None));
        let t = tracker.get("t1").unwrap();
        assert_eq!(t.stage, TaskStage::Complete);
        assert_eq!(t.progress_percent, 100.0);
        assert_eq!(t.runtime_ms, Some(1200));
    }

    #[test]
    fn finished_tasks_ignore_late_events() {
        let mut tracker = TaskTracker::new();
        tracker.upsert_task("t1", TaskType::CreateZip, "a.txt");
        assert!(tracker.cancel_task("t1"));

        assert!(!tracker.cancel_task("t1"));
        assert!(!tracker.fail_task("t1", Some("late".into())));
        assert!(!tracker.update_progress(
            "t1",
            TaskUpdate {
                progress_percent: Some(50.0),
                ..Default::default()
            }
        ));
        let t = tracker.get("t1").unwrap();
        assert_eq!(t.stage, TaskStage::Cancelled);
        assert!(t.error.is_none());
    }

    #[test]
    fn upsert_keeps_progress() {
        let mut tracker = TaskTracker::new();
        tracker.upsert_task("t1", TaskType::ScanDirectory, "x");
        tracker.update_progress(
            "t1",
            TaskUpdate {
                tasks_complete: Some(3),
                ..Default::default()
            },
        );
        tracker.upsert_task("t1", TaskType::ScanDirectory, "x");
        assert_eq!(tracker.get("t1").unwrap().tasks_complete, 3);
        assert_eq!(tracker.tasks().count(), 1);
    }

    #[test]
    fn unknown_task_updates_are_ignored() {
        let mut tracker = TaskTracker::new();
        assert!(!tracker.update_progress("nope", TaskUpdate::default()));
        assert!(!tracker.fail_task("nope", None));
        assert!(tracker.get("nope").is_none());
    }

    #[test]
    fn clear_finished_keeps_running() {
        let mut tracker = TaskTracker::new();
        tracker.upsert_task("a", TaskType::ScanDirectory, "");
        tracker.upsert_task("b", TaskType::ScanDirectory, "");
        tracker.fail_task("b", None);
        assert_eq!(tracker.clear_finished(), 1);
        assert!(tracker.get("a").is_some());
    }

    #[test]
    fn backup_progress_by_core() {
        let mut backups = BackupTracker::new();
        backups.start("core-1");
        backups.update(&BackupProgressContent {
            core_id: "core-1".into(),
            progress_current: 4,
            progress_total: 10,
            files_total: 2,
        });
        let b = backups.get("core-1").unwrap();
        assert!(b.running);
        assert_eq!(b.progress_current, 4);

        backups.complete("core-1");
        let b = backups.get("core-1").unwrap();
        assert!(!b.running);
        assert_eq!(b.progress_current, 10);
    }
}
