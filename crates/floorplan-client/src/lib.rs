//! floorplan-client: upload a floor plan, start recognition, and collect the
//! wall, icon, space, background and statistics results as they finish.

mod version;

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod poller;
pub mod preloaded;
pub mod prediction;
pub mod results;
pub mod stats;
pub mod task;
pub mod timers;
pub mod upload;

pub use aggregator::PlanUploader;
pub use api::{ApiClient, UploadTarget};
pub use config::{ClientConfig, Environment, PollConfig, UploadLimits};
pub use error::{ClientError, Result};
pub use poller::{PollOutcome, Poller, ResultPayload, ResultSource};
pub use results::{
    DirResourceStore, MemoryResourceStore, PublishedResult, ResourceRef, ResourceStore,
    ResultBoard,
};
pub use stats::{Statistics, StatsReport, StatsStatus, area_stats, count_stats};
pub use task::{PredictionTasks, ResultFormat, ResultLocator, Slot, Task, TaskStatus};
pub use timers::{PollHandle, TimerTable};
pub use upload::{Anonymous, AuthProvider, StaticSession, UploadFile, User};
pub use version::CLIENT_VERSION;
