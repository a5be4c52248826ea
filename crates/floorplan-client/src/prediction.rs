//! Prediction requester.

use crate::api::ApiClient;
use crate::error::Result;
use crate::task::{PredictionTasks, Slot};

/// Ask the back end to start processing `image_name`.
///
/// Returns one task handle per result slot. Errors pass through untouched.
pub async fn request_prediction(api: &ApiClient, image_name: &str) -> Result<PredictionTasks> {
    let tasks = api.request_prediction(image_name).await?;

    for slot in Slot::ALL {
        let task = tasks.task(slot);
        tracing::debug!(
            image_name,
            slot = %slot,
            task_id = %task.id,
            status = task.status.as_str(),
            "Prediction task queued"
        );
    }
    tracing::info!(image_name, "Prediction requested");

    Ok(tasks)
}
