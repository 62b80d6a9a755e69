//! Scheduled tasks — timers that inject system turns.
//!
//! Each task is a tokio task sleeping until its next firing. A firing
//! appends `Running scheduled task: <description>` as a system turn; it
//! does not start an orchestration cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use px_domain::error::{Error, Result};

use super::agent::Agent;

/// Text of the system turn appended when a task fires.
pub fn scheduled_turn_text(description: &str) -> String {
    format!("Running scheduled task: {description}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// When a task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Once, `delay_secs` from now.
    Once { delay_secs: u64 },
    /// Once, at a wall-clock instant. Past instants fire immediately.
    At { at: DateTime<Utc> },
    /// Repeatedly, every `interval_secs`, starting one interval from now.
    Every { interval_secs: u64 },
}

impl ScheduleSpec {
    fn validate(&self) -> Result<()> {
        if let ScheduleSpec::Every { interval_secs: 0 } = self {
            return Err(Error::Validation("interval must be at least 1 second".into()));
        }
        Ok(())
    }

    /// Delay until the first firing, measured from `now`.
    fn first_delay(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            ScheduleSpec::Once { delay_secs } => Duration::from_secs(delay_secs),
            ScheduleSpec::At { at } => (at - now).to_std().unwrap_or(Duration::ZERO),
            ScheduleSpec::Every { interval_secs } => Duration::from_secs(interval_secs),
        }
    }

    fn repeat(&self) -> Option<Duration> {
        match *self {
            ScheduleSpec::Every { interval_secs } => Some(Duration::from_secs(interval_secs)),
            _ => None,
        }
    }
}

/// A registered task as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub description: String,
    pub spec: ScheduleSpec,
    pub created_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u32,
}

struct Entry {
    task: ScheduledTask,
    handle: JoinHandle<()>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Scheduler {
    agent: Agent,
    tasks: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl Scheduler {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a task. Must be called inside a tokio runtime.
    pub fn schedule(&self, description: &str, spec: ScheduleSpec) -> Result<ScheduledTask> {
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::Validation("description must not be empty".into()));
        }
        spec.validate()?;

        let now = Utc::now();
        let first = spec.first_delay(now);
        let task = ScheduledTask {
            id: Uuid::new_v4(),
            description: description.to_owned(),
            spec,
            created_at: now,
            next_run_at: chrono::Duration::from_std(first).ok().map(|d| now + d),
            last_run_at: None,
            run_count: 0,
        };

        // Insert under the same lock the task takes when it fires, so a
        // zero-delay task always finds its own entry.
        let mut tasks = self.tasks.lock();
        let handle = tokio::spawn(fire_loop(
            self.agent.clone(),
            Arc::clone(&self.tasks),
            task.id,
            scheduled_turn_text(description),
            first,
            spec.repeat(),
        ));
        tasks.insert(
            task.id,
            Entry {
                task: task.clone(),
                handle,
            },
        );
        drop(tasks);

        tracing::info!(task_id = %task.id, description = %task.description, ?spec, "task scheduled");
        Ok(task)
    }

    /// All registered tasks, soonest first.
    pub fn list(&self) -> Vec<ScheduledTask> {
        let mut all: Vec<_> = self.tasks.lock().values().map(|e| e.task.clone()).collect();
        all.sort_by_key(|t| (t.next_run_at, t.created_at));
        all
    }

    /// Stop and forget a task. Returns false for unknown ids.
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.tasks.lock().remove(id) {
            Some(entry) => {
                entry.handle.abort();
                tracing::info!(task_id = %id, "task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        for (_, entry) in self.tasks.lock().drain() {
            entry.handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn fire_loop(
    agent: Agent,
    tasks: Arc<Mutex<HashMap<Uuid, Entry>>>,
    id: Uuid,
    text: String,
    first: Duration,
    repeat: Option<Duration>,
) {
    let mut delay = first;
    loop {
        tokio::time::sleep(delay).await;

        let fired_at = Utc::now();
        match agent.inject_scheduled_turn(&text) {
            Ok(turn) => tracing::info!(task_id = %id, turn_id = %turn.id, "scheduled task fired"),
            Err(e) => tracing::warn!(task_id = %id, error = %e, "scheduled injection failed"),
        }

        let Some(interval) = repeat else {
            tasks.lock().remove(&id);
            return;
        };

        if let Some(entry) = tasks.lock().get_mut(&id) {
            entry.task.run_count += 1;
            entry.task.last_run_at = Some(fired_at);
            entry.task.next_run_at = chrono::Duration::from_std(interval)
                .ok()
                .map(|d| fired_at + d);
        }
        delay = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use px_domain::config::AgentConfig;
    use px_domain::turn::Role;
    use px_providers::ScriptedBackend;
    use px_tools::ToolRegistry;
    use px_transcript::MemoryTranscript;

    fn agent() -> Agent {
        Agent::new(
            Arc::new(MemoryTranscript::new()),
            Arc::new(ScriptedBackend::new(Vec::new())),
            Arc::new(ToolRegistry::new()),
            &AgentConfig::default(),
            None,
        )
    }

    #[tokio::test]
    async fn one_shot_task_injects_and_removes_itself() {
        let agent = agent();
        let scheduler = Scheduler::new(agent.clone());
        scheduler
            .schedule("nightly backup", ScheduleSpec::Once { delay_secs: 0 })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let turns = agent.transcript().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].text(), "Running scheduled task: nightly backup");
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn past_instant_fires_immediately() {
        let agent = agent();
        let scheduler = Scheduler::new(agent.clone());
        let at = Utc::now() - chrono::Duration::seconds(5);
        scheduler.schedule("late", ScheduleSpec::At { at }).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(agent.transcript().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_task_never_fires() {
        let agent = agent();
        let scheduler = Scheduler::new(agent.clone());
        let task = scheduler
            .schedule("later", ScheduleSpec::Once { delay_secs: 1 })
            .unwrap();
        assert_eq!(scheduler.list().len(), 1);
        assert!(scheduler.cancel(&task.id));
        assert!(!scheduler.cancel(&task.id));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(agent.transcript().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_tasks_are_rejected() {
        let scheduler = Scheduler::new(agent());
        assert!(matches!(
            scheduler.schedule("tick", ScheduleSpec::Every { interval_secs: 0 }),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            scheduler.schedule("  ", ScheduleSpec::Once { delay_secs: 1 }),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn spec_serializes_with_kind_tag() {
        let spec: ScheduleSpec =
            serde_json::from_value(serde_json::json!({"kind": "every", "interval_secs": 60}))
                .unwrap();
        assert_eq!(spec, ScheduleSpec::Every { interval_secs: 60 });
    }
}
