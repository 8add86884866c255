//! Demo data for local runs.
//!
//! Seeds one hazmat transport with a delivery stage of two tasks, the shape
//! the delivery handler expects.

use courier_core::{JobId, Priority, StageId, StageKind, TaskId};
use courier_engine::{JobSpec, Producer, Result, StageSpec, TaskSpec};
use tracing::info;

use crate::types::{
    Delivery, DeliveryMetadata, HazmatData, HazmatMetadata, HazmatTransport, ItemData, TimeWindow,
};

/// Ids of the seeded records.
#[derive(Debug, Clone)]
pub struct SeededJob {
    /// Hazmat transport job
    pub job_id: JobId,
    /// Its delivery stage
    pub stage_id: StageId,
    /// Delivery tasks
    pub task_ids: Vec<TaskId>,
}

/// Create the demo hazmat delivery.
pub async fn seed_data(producer: &dyn Producer) -> Result<SeededJob> {
    let job = producer
        .create_job(JobSpec::typed::<HazmatTransport>(
            Priority::High,
            &HazmatData {
                un_number: "UN1993".to_string(),
                hazard_class: "3".to_string(),
            },
            &HazmatMetadata {
                leaks_count: Some(0),
                casualty_count: Some(2),
            },
        )?)
        .await?;

    let now = chrono::Utc::now();
    let stage = producer
        .create_stage(
            job.id,
            StageSpec::typed::<Delivery>(
                &TimeWindow {
                    location: "Warehouse 42".to_string(),
                    time_window_start: now,
                    time_window_end: now + chrono::Duration::hours(1),
                },
                &DeliveryMetadata {
                    signatured_by: Some(String::new()),
                },
            )?,
        )
        .await?;

    let items = [("ITEM123", 5), ("ITEM456", 3)];
    let specs = items
        .iter()
        .map(|(item_id, quantity)| {
            TaskSpec::typed::<Delivery>(&ItemData {
                item_id: item_id.to_string(),
                quantity: *quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let tasks = producer.create_tasks(stage.id, Delivery::NAME, specs).await?;

    info!("Seeded job {} with {} delivery tasks", job.id, tasks.len());

    Ok(SeededJob {
        job_id: job.id,
        stage_id: stage.id,
        task_ids: tasks.into_iter().map(|task| task.id).collect(),
    })
}
