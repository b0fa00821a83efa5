use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Backoff,
    Failed,
}

/// Last-known state of one supervised task, for the health view spec §4.14
/// names ("last-known state, current backoff, and restart count").
#[derive(Debug, Clone, Serialize)]
pub struct TaskHealth {
    pub name: String,
    pub state: TaskState,
    pub restart_count: u32,
    #[serde(with = "duration_millis")]
    pub current_backoff: Duration,
    pub last_error: Option<String>,
}

impl TaskHealth {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Running,
            restart_count: 0,
            current_backoff: Duration::ZERO,
            last_error: None,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
