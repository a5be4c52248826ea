//! Back-end task and result-slot types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::endpoints;

/// Status of a back-end task (Celery `AsyncResult.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Retry,
    Failure,
    Success,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failure | Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Failure => "FAILURE",
            Self::Success => "SUCCESS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
}

/// Response of the prediction request: one task per result slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionTasks {
    pub wall_task: Task,
    pub icon_task: Task,
    pub spaces_task: Task,
    pub statistics_task: Task,
    pub background_task: Task,
}

impl PredictionTasks {
    pub fn task(&self, slot: Slot) -> &Task {
        match slot {
            Slot::Walls => &self.wall_task,
            Slot::Icons => &self.icon_task,
            Slot::Spaces => &self.spaces_task,
            Slot::Background => &self.background_task,
            Slot::Statistics => &self.statistics_task,
        }
    }

    pub fn locator(&self, slot: Slot) -> ResultLocator {
        ResultLocator::new(self.task(slot).id.clone(), slot.result_format())
    }
}

/// One of the independently polled result categories of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Walls,
    Icons,
    Spaces,
    Background,
    Statistics,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::Walls,
        Slot::Icons,
        Slot::Spaces,
        Slot::Background,
        Slot::Statistics,
    ];

    /// Geometric overlays, polled together first.
    pub const FIRST_BATCH: [Slot; 3] = [Slot::Walls, Slot::Icons, Slot::Spaces];

    /// Derived from the first batch, polled once it has resolved.
    pub const SECOND_BATCH: [Slot; 2] = [Slot::Background, Slot::Statistics];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn result_format(self) -> ResultFormat {
        match self {
            Slot::Statistics => ResultFormat::Json,
            _ => ResultFormat::Svg,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Walls => "walls",
            Slot::Icons => "icons",
            Slot::Spaces => "spaces",
            Slot::Background => "background",
            Slot::Statistics => "statistics",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Svg,
    Json,
}

impl ResultFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ResultFormat::Svg => "svg",
            ResultFormat::Json => "json",
        }
    }
}

/// Where a task's result is retrieved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocator {
    pub task_id: String,
    pub format: ResultFormat,
}

impl ResultLocator {
    pub fn new(task_id: impl Into<String>, format: ResultFormat) -> Self {
        Self {
            task_id: task_id.into(),
            format,
        }
    }

    /// Path relative to the base API URL.
    pub fn path(&self) -> String {
        format!(
            "{}/{}.{}",
            endpoints::RETRIEVE_RESULTS,
            self.task_id,
            self.format.extension()
        )
    }
}

impl fmt::Display for ResultLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
