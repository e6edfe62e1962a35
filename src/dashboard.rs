use crate::api::TaskApi;
use crate::error::Result;
use crate::models::{normalize_collection, normalize_created, FilterMode, Stats, Task, TaskDraft};
use crate::optimistic::{Change, Ledger, Patch, Ticket};
use serde_json::Value;
use tracing::{debug, info, warn};

/// A user intent that is shown before the server confirms it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Toggle(String),
    SaveEdit,
    Delete(String),
}

#[derive(Clone, Debug)]
enum Request {
    Update { task_id: String, fields: Value },
    Delete { task_id: String },
}

/// Server request for a mutation that has already been applied locally.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub ticket: Ticket,
    request: Request,
}

impl PendingRequest {
    pub async fn send<A: TaskApi + ?Sized>(&self, api: &A) -> Result<()> {
        match &self.request {
            Request::Update { task_id, fields } => api.update_task(task_id, fields).await,
            Request::Delete { task_id } => api.delete_task(task_id).await,
        }
    }
}

// Resets the loading flag however `load` exits, including a dropped future
struct LoadingGuard<'a>(&'a mut bool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

pub struct Dashboard<A> {
    api: A,
    loading: bool,
    tasks: Vec<Task>,
    pub search: String,
    pub filter: FilterMode,
    editing: Option<String>,
    pub edit_draft: TaskDraft,
    pub new_task: TaskDraft,
    ledger: Ledger,
}

impl<A: TaskApi> Dashboard<A> {
    pub fn new(api: A) -> Self {
        Dashboard {
            api,
            loading: true,
            tasks: Vec::new(),
            search: String::new(),
            filter: FilterMode::All,
            editing: None,
            edit_draft: TaskDraft::default(),
            new_task: TaskDraft::default(),
            ledger: Ledger::default(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub async fn load(&mut self) -> Result<()> {
        self.loading = true;
        let _guard = LoadingGuard(&mut self.loading);

        let payload = self.api.fetch_tasks().await?;
        let (tasks, rejected) = normalize_collection(&payload);
        for err in &rejected {
            warn!(error = %err, "dropping task from collection");
        }

        info!(count = tasks.len(), "tasks loaded");
        self.tasks = tasks;
        self.ledger.clear();
        Ok(())
    }

    /// Creates the task in the add form. Returns false without a request
    /// when the title is blank.
    pub async fn add(&mut self) -> Result<bool> {
        let title = self.new_task.title.trim().to_string();
        let description = self.new_task.description.trim().to_string();
        if title.is_empty() {
            return Ok(false);
        }

        let payload = self.api.create_task(&title, &description).await?;
        let created = normalize_created(&payload)?;
        info!(task_id = %created.id, "task created");
        self.tasks.insert(0, created);
        self.new_task.clear();
        Ok(true)
    }

    /// Starts editing a task, abandoning any other unsaved edit.
    pub fn begin_edit(&mut self, task_id: &str) -> bool {
        let Some(task) = self.tasks.iter().find(|task| task.id == task_id) else {
            return false;
        };
        self.edit_draft = TaskDraft {
            title: task.title.clone(),
            description: task.description.clone(),
        };
        self.editing = Some(task.id.clone());
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.edit_draft.clear();
    }

    /// Applies a mutation locally and returns the request that confirms
    /// it. `None` means nothing changed and nothing needs sending.
    pub fn begin(&mut self, mutation: Mutation) -> Option<PendingRequest> {
        match mutation {
            Mutation::Toggle(task_id) => {
                let status = self
                    .tasks
                    .iter()
                    .find(|task| task.id == task_id)?
                    .status
                    .toggled();
                self.begin_patch(&task_id, Patch::Status(status))
            }
            Mutation::SaveEdit => {
                let title = self.edit_draft.title.trim().to_string();
                if title.is_empty() {
                    return None;
                }
                let description = self.edit_draft.description.trim().to_string();
                let task_id = self.editing.take()?;
                self.edit_draft.clear();
                self.begin_patch(&task_id, Patch::Content { title, description })
            }
            Mutation::Delete(task_id) => {
                let ticket = self.ledger.begin(&mut self.tasks, &task_id, Change::Remove)?;
                Some(PendingRequest {
                    ticket,
                    request: Request::Delete { task_id },
                })
            }
        }
    }

    fn begin_patch(&mut self, task_id: &str, patch: Patch) -> Option<PendingRequest> {
        let fields = patch.to_wire();
        let ticket = self
            .ledger
            .begin(&mut self.tasks, task_id, Change::Patch(patch))?;
        Some(PendingRequest {
            ticket,
            request: Request::Update {
                task_id: task_id.to_string(),
                fields,
            },
        })
    }

    /// Reconciles local state with the server's answer to a mutation.
    pub fn settle(&mut self, ticket: Ticket, outcome: &Result<()>) {
        if !self.ledger.is_current(&ticket) {
            debug!(task_id = %ticket.task_id(), "answer belongs to a previous load or session");
            return;
        }
        if let Err(err) = outcome {
            warn!(task_id = %ticket.task_id(), error = %err, "rolling back optimistic change");
        }
        self.ledger.settle(&mut self.tasks, ticket, outcome.is_ok());
    }

    /// Whether `ticket` was issued since the last load or reset.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.ledger.is_current(ticket)
    }

    /// Runs a mutation end to end. Failures are rolled back before the
    /// error is returned. `Ok(false)` means the mutation was a no-op.
    pub async fn apply(&mut self, mutation: Mutation) -> Result<bool> {
        let Some(pending) = self.begin(mutation) else {
            return Ok(false);
        };
        let outcome = pending.send(&self.api).await;
        self.settle(pending.ticket, &outcome);
        outcome.map(|_| true)
    }

    pub async fn toggle(&mut self, task_id: &str) -> Result<bool> {
        self.apply(Mutation::Toggle(task_id.to_string())).await
    }

    pub async fn save_edit(&mut self) -> Result<bool> {
        self.apply(Mutation::SaveEdit).await
    }

    pub async fn delete(&mut self, task_id: &str) -> Result<bool> {
        self.apply(Mutation::Delete(task_id.to_string())).await
    }

    /// Tasks passing both the search text and the status filter
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let needle = if self.search.trim().is_empty() {
            None
        } else {
            Some(self.search.to_lowercase())
        };

        self.tasks
            .iter()
            .filter(|task| match &needle {
                Some(needle) => task.matches_search(needle),
                None => true,
            })
            .filter(|task| self.filter.admits(task))
            .collect()
    }

    pub fn stats(&self) -> Stats {
        let total = self.tasks.len();
        let done = self
            .tasks
            .iter()
            .filter(|task| task.status.is_completed())
            .count();
        Stats {
            total,
            done,
            pending: total - done,
        }
    }

    /// Drops everything tied to the current session.
    pub fn reset(&mut self) {
        self.loading = true;
        self.tasks.clear();
        self.search.clear();
        self.filter = FilterMode::All;
        self.cancel_edit();
        self.new_task.clear();
        self.ledger.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TodoError;
    use crate::models::TaskStatus;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeApi {
        collection: Mutex<Value>,
        fail: AtomicBool,
        requests: AtomicUsize,
        updates: Mutex<Vec<(String, Value)>>,
    }

    impl FakeApi {
        fn with_collection(collection: Value) -> Self {
            FakeApi {
                collection: Mutex::new(collection),
                ..FakeApi::default()
            }
        }

        fn failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(TodoError::api_error(StatusCode::BAD_GATEWAY, "down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TaskApi for FakeApi {
        async fn fetch_tasks(&self) -> Result<Value> {
            self.check()?;
            Ok(self.collection.lock().unwrap().clone())
        }

        async fn create_task(&self, title: &str, description: &str) -> Result<Value> {
            self.check()?;
            Ok(json!({"task": {"_id": "new", "title": title, "description": description}}))
        }

        async fn update_task(&self, task_id: &str, fields: &Value) -> Result<()> {
            self.check()?;
            self.updates
                .lock()
                .unwrap()
                .push((task_id.to_string(), fields.clone()));
            Ok(())
        }

        async fn delete_task(&self, _task_id: &str) -> Result<()> {
            self.check()
        }
    }

    async fn loaded(collection: Value) -> Dashboard<FakeApi> {
        let mut dashboard = Dashboard::new(FakeApi::with_collection(collection));
        dashboard.load().await.unwrap();
        dashboard
    }

    fn sample() -> Value {
        json!({"items": [
            {"_id": "1", "title": "Buy milk", "status": "Pendiente"},
            {"_id": "2", "title": "Write report", "description": "Minutes of the meeting", "status": "Completada"},
            {"_id": "3", "title": "Call mom", "status": "En Progreso"},
            {"_id": "4", "title": "Gym", "description": "legs"}
        ]})
    }

    #[tokio::test]
    async fn test_load_scenario_stats() {
        let dashboard = loaded(json!([{"_id": "1", "title": "A", "status": "Completada"}])).await;
        assert!(!dashboard.is_loading());
        assert_eq!(
            dashboard.stats(),
            Stats {
                total: 1,
                done: 1,
                pending: 0
            }
        );
    }

    #[tokio::test]
    async fn test_load_failure_clears_loading() {
        let api = FakeApi::default();
        api.failing(true);
        let mut dashboard = Dashboard::new(api);
        assert!(dashboard.is_loading());
        assert!(dashboard.load().await.is_err());
        assert!(!dashboard.is_loading());
        assert!(dashboard.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_load_keeps_server_order_and_skips_unidentified() {
        let dashboard = loaded(json!([{"_id": "b"}, {"title": "x"}, {"id": "a"}])).await;
        let ids: Vec<&str> = dashboard.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_add_prepends_and_clears_form() {
        let mut dashboard = loaded(sample()).await;
        dashboard.new_task.title = "  Plan trip ".into();
        dashboard.new_task.description = " beach ".into();

        assert!(dashboard.add().await.unwrap());
        assert_eq!(dashboard.tasks().len(), 5);
        assert_eq!(dashboard.tasks()[0].title, "Plan trip");
        assert_eq!(dashboard.tasks()[0].description, "beach");
        assert_eq!(dashboard.new_task, TaskDraft::default());
    }

    #[tokio::test]
    async fn test_add_blank_title_sends_nothing() {
        let mut dashboard = loaded(sample()).await;
        let before = dashboard.api().request_count();
        dashboard.new_task.title = "  ".into();

        assert!(!dashboard.add().await.unwrap());
        assert_eq!(dashboard.tasks().len(), 4);
        assert_eq!(dashboard.api().request_count(), before);
    }

    #[tokio::test]
    async fn test_add_failure_propagates_and_keeps_form() {
        let mut dashboard = loaded(sample()).await;
        dashboard.api().failing(true);
        dashboard.new_task.title = "Plan trip".into();

        assert!(dashboard.add().await.is_err());
        assert_eq!(dashboard.tasks().len(), 4);
        assert_eq!(dashboard.new_task.title, "Plan trip");
    }

    #[tokio::test]
    async fn test_toggle_success() {
        let mut dashboard = loaded(sample()).await;
        assert!(dashboard.toggle("1").await.unwrap());
        assert_eq!(dashboard.tasks()[0].status, TaskStatus::Completed);

        let updates = dashboard.api().updates.lock().unwrap().clone();
        assert_eq!(updates, vec![("1".to_string(), json!({"status": "Completada"}))]);
    }

    #[tokio::test]
    async fn test_toggle_in_progress_goes_to_pending() {
        let mut dashboard = loaded(sample()).await;
        dashboard.toggle("3").await.unwrap();
        assert_eq!(dashboard.tasks()[2].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_toggle_failure_rolls_back() {
        let mut dashboard = loaded(sample()).await;
        dashboard.api().failing(true);
        for id in ["1", "2", "3", "1", "1"] {
            let before = dashboard.tasks().to_vec();
            assert!(dashboard.toggle(id).await.is_err());
            assert_eq!(dashboard.tasks(), before.as_slice());
        }
    }

    #[tokio::test]
    async fn test_toggle_is_optimistic_until_settled() {
        let mut dashboard = loaded(sample()).await;
        let pending = dashboard.begin(Mutation::Toggle("1".into())).unwrap();
        assert_eq!(dashboard.tasks()[0].status, TaskStatus::Completed);
        assert_eq!(dashboard.stats().done, 2);

        dashboard.settle(pending.ticket, &Err(TodoError::InvalidResponse("x".into())));
        assert_eq!(dashboard.tasks()[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_edit_flow() {
        let mut dashboard = loaded(sample()).await;
        assert!(dashboard.begin_edit("4"));
        assert_eq!(dashboard.edit_draft.title, "Gym");
        assert_eq!(dashboard.edit_draft.description, "legs");

        dashboard.edit_draft.title = " Gym day ".into();
        dashboard.edit_draft.description = " arms ".into();
        assert!(dashboard.save_edit().await.unwrap());
        assert_eq!(dashboard.editing_id(), None);
        assert_eq!(dashboard.tasks()[3].title, "Gym day");
        assert_eq!(dashboard.tasks()[3].description, "arms");
    }

    #[tokio::test]
    async fn test_save_edit_blank_title_stays_in_edit_mode() {
        let mut dashboard = loaded(sample()).await;
        dashboard.begin_edit("1");
        dashboard.edit_draft.title = "   ".into();
        let before = dashboard.api().request_count();

        assert!(!dashboard.save_edit().await.unwrap());
        assert_eq!(dashboard.editing_id(), Some("1"));
        assert_eq!(dashboard.api().request_count(), before);
    }

    #[tokio::test]
    async fn test_save_edit_failure_restores_task() {
        let mut dashboard = loaded(sample()).await;
        let before = dashboard.tasks()[1].clone();
        dashboard.begin_edit("2");
        dashboard.edit_draft.title = "Changed".into();
        dashboard.api().failing(true);

        assert!(dashboard.save_edit().await.is_err());
        assert_eq!(dashboard.tasks()[1], before);
        assert_eq!(dashboard.editing_id(), None);
    }

    #[tokio::test]
    async fn test_begin_edit_abandons_previous_draft() {
        let mut dashboard = loaded(sample()).await;
        dashboard.begin_edit("1");
        dashboard.edit_draft.title = "unsaved".into();
        dashboard.begin_edit("2");
        assert_eq!(dashboard.editing_id(), Some("2"));
        assert_eq!(dashboard.edit_draft.title, "Write report");
        assert_eq!(dashboard.tasks()[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn test_delete_success_and_failure() {
        let mut dashboard = loaded(sample()).await;
        assert!(dashboard.delete("2").await.unwrap());
        assert_eq!(dashboard.tasks().len(), 3);

        dashboard.api().failing(true);
        let before = dashboard.tasks().to_vec();
        assert!(dashboard.delete("3").await.is_err());
        assert_eq!(dashboard.tasks(), before.as_slice());
    }

    #[tokio::test]
    async fn test_search_title_or_description() {
        let mut dashboard = loaded(sample()).await;
        dashboard.search = "mi".into();
        let ids: Vec<&str> = dashboard.visible_tasks().iter().map(|t| t.id.as_str()).collect();
        // "Buy milk" by title, "Write report" by "Minutes" in the description
        assert_eq!(ids, vec!["1", "2"]);

        dashboard.search = "MOM".into();
        assert_eq!(dashboard.visible_tasks().len(), 1);

        dashboard.search = "   ".into();
        assert_eq!(dashboard.visible_tasks().len(), 4);
    }

    #[tokio::test]
    async fn test_filters_partition_the_list() {
        let mut dashboard = loaded(sample()).await;
        dashboard.filter = FilterMode::Active;
        let active = dashboard.visible_tasks().len();
        dashboard.filter = FilterMode::Completed;
        let completed = dashboard.visible_tasks().len();
        dashboard.filter = FilterMode::All;
        let all = dashboard.visible_tasks().len();

        assert_eq!(active, 3);
        assert_eq!(completed, 1);
        assert_eq!(active + completed, all);
    }

    #[tokio::test]
    async fn test_search_and_filter_compose() {
        let mut dashboard = loaded(sample()).await;
        dashboard.search = "mi".into();
        dashboard.filter = FilterMode::Active;
        let ids: Vec<&str> = dashboard.visible_tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_reset_discards_session_state() {
        let mut dashboard = loaded(sample()).await;
        dashboard.search = "x".into();
        dashboard.begin_edit("1");
        dashboard.reset();

        assert!(dashboard.tasks().is_empty());
        assert!(dashboard.search.is_empty());
        assert_eq!(dashboard.editing_id(), None);
        assert_eq!(dashboard.stats(), Stats::default());
    }

    #[tokio::test]
    async fn test_failed_delete_after_reset_stays_gone() {
        let mut dashboard = loaded(json!([{"_id": "alice-secret"}])).await;
        let pending = dashboard.begin(Mutation::Delete("alice-secret".into())).unwrap();
        dashboard.reset();

        dashboard.api().failing(true);
        let outcome = pending.send(dashboard.api()).await;
        assert!(!dashboard.is_current(&pending.ticket));
        dashboard.settle(pending.ticket, &outcome);
        assert!(dashboard.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_answer_from_before_reload_is_ignored() {
        let mut dashboard = loaded(sample()).await;
        let pending = dashboard.begin(Mutation::Toggle("1".into())).unwrap();
        dashboard.load().await.unwrap();

        dashboard.settle(pending.ticket, &Err(TodoError::InvalidResponse("late".into())));
        assert_eq!(dashboard.tasks()[0].status, TaskStatus::Pending);
        assert_eq!(dashboard.tasks().len(), 4);
    }
}
