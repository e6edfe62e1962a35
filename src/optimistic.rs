//! Optimistic changes to the task list.
//!
//! A change is applied to the visible list immediately and produces a
//! [`Ticket`]. When the server answers, the ticket is settled: a success
//! folds the change into the confirmed state, a failure takes it back out.
//!
//! Field changes on a task are tracked per task as the last confirmed value
//! plus an ordered list of in-flight patches. What the user sees is the
//! confirmed value with the pending patches replayed on top, so responses
//! may settle in any order and failures never resurrect a stale snapshot.

use crate::models::{Task, TaskStatus};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Patch {
    Status(TaskStatus),
    Content { title: String, description: String },
}

impl Patch {
    pub fn apply(&self, task: &mut Task) {
        match self {
            Patch::Status(status) => task.status = *status,
            Patch::Content { title, description } => {
                task.title = title.clone();
                task.description = description.clone();
            }
        }
    }

    /// Body of the PUT request carrying this patch
    pub fn to_wire(&self) -> Value {
        match self {
            Patch::Status(status) => json!({ "status": status }),
            Patch::Content { title, description } => {
                json!({ "title": title, "description": description })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Patch(Patch),
    Remove,
}

/// Handle for one speculative change awaiting the server's answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    kind: TicketKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TicketKind {
    Patch { task_id: String, seq: u64 },
    Removal { index: usize, task: Task },
}

impl Ticket {
    pub fn task_id(&self) -> &str {
        match &self.kind {
            TicketKind::Patch { task_id, .. } => task_id,
            TicketKind::Removal { task, .. } => &task.id,
        }
    }
}

#[derive(Debug)]
struct Entry {
    confirmed: Task,
    pending: Vec<(u64, Patch)>,
}

impl Entry {
    fn visible(&self) -> Task {
        let mut task = self.confirmed.clone();
        for (_, patch) in &self.pending {
            patch.apply(&mut task);
        }
        task
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    epoch: u64,
}

impl Ledger {
    /// Applies `change` to the task with `task_id` in `tasks`. Returns `None`
    /// when no such task is visible.
    pub fn begin(&mut self, tasks: &mut Vec<Task>, task_id: &str, change: Change) -> Option<Ticket> {
        let index = tasks.iter().position(|task| task.id == task_id)?;

        let kind = match change {
            Change::Remove => {
                let task = tasks.remove(index);
                debug!(task_id, index, "optimistic removal");
                TicketKind::Removal { index, task }
            }
            Change::Patch(patch) => {
                let seq = self.next_seq;
                self.next_seq += 1;

                let entry = self
                    .entries
                    .entry(task_id.to_string())
                    .or_insert_with(|| Entry {
                        confirmed: tasks[index].clone(),
                        pending: Vec::new(),
                    });
                entry.pending.push((seq, patch));
                tasks[index] = entry.visible();
                debug!(task_id, seq, in_flight = entry.pending.len(), "optimistic patch");

                TicketKind::Patch {
                    task_id: task_id.to_string(),
                    seq,
                }
            }
        };

        Some(Ticket {
            epoch: self.epoch,
            kind,
        })
    }

    /// Commits or reverts the change behind `ticket`. Tickets issued before
    /// the last `clear` are ignored.
    pub fn settle(&mut self, tasks: &mut Vec<Task>, ticket: Ticket, succeeded: bool) {
        if !self.is_current(&ticket) {
            debug!(task_id = ticket.task_id(), epoch = ticket.epoch, "ignoring stale answer");
            return;
        }

        match ticket.kind {
            TicketKind::Patch { task_id, seq } => {
                let Some(entry) = self.entries.get_mut(&task_id) else {
                    // bookkeeping was dropped by a confirmed delete
                    return;
                };
                let Some(position) = entry.pending.iter().position(|(s, _)| *s == seq) else {
                    return;
                };

                let (_, patch) = entry.pending.remove(position);
                if succeeded {
                    patch.apply(&mut entry.confirmed);
                }
                let visible = entry.visible();
                if entry.pending.is_empty() {
                    self.entries.remove(&task_id);
                }

                if let Some(slot) = tasks.iter_mut().find(|task| task.id == task_id) {
                    *slot = visible;
                }
            }
            TicketKind::Removal { index, task } => {
                if succeeded {
                    self.entries.remove(&task.id);
                    return;
                }
                if tasks.iter().any(|t| t.id == task.id) {
                    return;
                }
                let restored = self
                    .entries
                    .get(&task.id)
                    .map(Entry::visible)
                    .unwrap_or(task);
                let index = index.min(tasks.len());
                tasks.insert(index, restored);
            }
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.epoch == self.epoch
    }

    #[cfg(test)]
    fn in_flight(&self, task_id: &str) -> usize {
        self.entries
            .get(task_id)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    /// Forgets all pending bookkeeping and starts a new epoch, so answers
    /// to earlier tickets are ignored.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.epoch += 1;
    }
}
