use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use super::types::GenerationTask;
use crate::service::{StatusReport, SubmitRequest};

static COUNTER: AtomicUsize = AtomicUsize::new(1);

struct Entry {
    task: GenerationTask,
    polls: u32,
    seq: u64,
}

/// In-memory job table with optional JSON snapshotting. Holds at most
/// `capacity` tasks; the oldest insertions are dropped first.
pub struct TaskStore {
    snapshot: Option<PathBuf>,
    capacity: usize,
    seq: AtomicU64,
    tasks: RwLock<HashMap<String, Entry>>,
}

impl TaskStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshot: None,
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Store that rewrites `path` after every change, seeded with whatever
    /// the file already holds.
    pub fn with_snapshot(path: PathBuf, capacity: usize) -> Self {
        let mut restored = Self::load_from_disk(&path).unwrap_or_default();
        restored.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let store = Self {
            snapshot: Some(path),
            ..Self::new(capacity)
        };
        if let Ok(mut map) = store.tasks.write() {
            for task in restored {
                let seq = store.seq.fetch_add(1, Ordering::SeqCst);
                map.insert(task.task_id.clone(), Entry { task, polls: 0, seq });
            }
            evict(&mut map, store.capacity);
            tracing::info!(tasks = map.len(), "task snapshot restored");
        }
        store
    }

    pub fn create(&self, request: &SubmitRequest) -> GenerationTask {
        let id = next_id();
        let task = GenerationTask::new(&id, request);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut map) = self.tasks.write() {
            map.insert(
                id,
                Entry {
                    task: task.clone(),
                    polls: 0,
                    seq,
                },
            );
            evict(&mut map, self.capacity);
        }
        self.save_if_needed();
        task
    }

    pub fn update(&self, id: &str, report: &StatusReport) -> Option<GenerationTask> {
        let mut updated = None;
        if let Ok(mut map) = self.tasks.write() {
            if let Some(entry) = map.get_mut(id) {
                entry.task.apply(report);
                updated = Some(entry.task.clone());
            }
        }
        self.save_if_needed();
        updated
    }

    /// Counts one status query against the task and returns the new count.
    pub fn record_poll(&self, id: &str) -> Option<(GenerationTask, u32)> {
        let mut map = self.tasks.write().ok()?;
        let entry = map.get_mut(id)?;
        entry.polls += 1;
        Some((entry.task.clone(), entry.polls))
    }

    pub fn get(&self, id: &str) -> Option<GenerationTask> {
        let map = self.tasks.read().ok()?;
        map.get(id).map(|entry| entry.task.clone())
    }

    pub fn list(&self, limit: usize) -> Vec<GenerationTask> {
        let map = match self.tasks.read() {
            Ok(lock) => lock,
            Err(_) => return vec![],
        };
        let mut items: Vec<GenerationTask> = map.values().map(|entry| entry.task.clone()).collect();
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.task_id.cmp(&a.task_id))
        });
        if items.len() > limit {
            items.truncate(limit);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save_if_needed(&self) {
        let path = match &self.snapshot {
            Some(path) => path,
            None => return,
        };
        let map = match self.tasks.read() {
            Ok(lock) => lock,
            Err(_) => return,
        };
        let list: Vec<&GenerationTask> = map.values().map(|entry| &entry.task).collect();
        match serde_json::to_string_pretty(&list) {
            Ok(serialized) => {
                if let Err(err) = fs::write(path, serialized) {
                    tracing::warn!(path = %path.display(), %err, "task snapshot not written");
                }
            }
            Err(err) => tracing::warn!(%err, "task snapshot not serialized"),
        }
    }

    pub fn load_from_disk(path: &Path) -> Option<Vec<GenerationTask>> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Vec<GenerationTask>>(&data) {
            Ok(tasks) => Some(tasks),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "task snapshot unreadable");
                None
            }
        }
    }
}

fn evict(map: &mut HashMap<String, Entry>, capacity: usize) {
    while map.len() > capacity {
        let oldest = map
            .iter()
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                map.remove(&id);
            }
            None => break,
        }
    }
}

fn next_id() -> String {
    let count = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("task_{}_{}", Utc::now().timestamp_millis(), count)
}
