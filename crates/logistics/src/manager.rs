//! Logistics task handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::TaskOf;
use courier_work::{HandlerError, TaskHandler, TaskHandlerContext};
use rand::Rng;
use tracing::info;

use crate::types::{
    Delivery, DeliveryMetadata, Drive, HazmatTransport, LegMetadata, Pickup, PickupTaskMetadata,
    StandardTransport,
};

/// Validation message for a delivery with more casualties than items.
pub const CASUALTY_COUNT_EXCEEDED: &str = "Casualty count exceeds quantity to be picked up";

/// Handler settings.
#[derive(Debug, Clone)]
pub struct LogisticsConfig {
    /// Name recorded as the delivery signatory
    pub signatory: String,

    /// Name recorded as the pickup operator
    pub operator: String,

    /// Upper bound of the simulated transport delay
    pub max_transport_delay: Duration,
}

impl Default for LogisticsConfig {
    fn default() -> Self {
        Self {
            signatory: "John Doe".to_string(),
            operator: "John Doe".to_string(),
            max_transport_delay: Duration::from_secs(120),
        }
    }
}

/// Handles pickup, drive and delivery tasks.
#[derive(Debug, Clone, Default)]
pub struct LogisticsManager {
    config: Arc<LogisticsConfig>,
}

impl LogisticsManager {
    /// Create a manager.
    pub fn new(config: LogisticsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Current settings.
    pub fn config(&self) -> &LogisticsConfig {
        &self.config
    }

    /// Random delay in `[0, max_transport_delay)`.
    fn transport_delay(&self) -> Duration {
        let max = self.config.max_transport_delay.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }

    /// Deliver the items of a hazmat delivery task and record the signatory.
    pub async fn handle_delivery_task(
        &self,
        task: &TaskOf<Delivery>,
        ctx: &TaskHandlerContext<HazmatTransport, Delivery>,
    ) -> Result<(), HandlerError> {
        info!(parent: ctx.span(), quantity = task.data.quantity, "Handling delivery task");

        let casualty_count = ctx.job().user_metadata.casualty_count.unwrap_or(0);
        if casualty_count > task.data.quantity {
            return Err(HandlerError::validation(CASUALTY_COUNT_EXCEEDED));
        }

        ctx.sleep(self.transport_delay()).await?;

        ctx.update_stage_user_metadata(&DeliveryMetadata {
            signatured_by: Some(self.config.signatory.clone()),
        })
        .await
    }

    /// Pick up the items of a hazmat pickup task and record the operator.
    pub async fn handle_pickup_task(
        &self,
        task: &TaskOf<Pickup>,
        ctx: &TaskHandlerContext<HazmatTransport, Pickup>,
    ) -> Result<(), HandlerError> {
        info!(
            parent: ctx.span(),
            item = %task.data.item_id,
            quantity = task.data.quantity,
            "Handling pickup task"
        );

        if task.data.quantity == 0 {
            return Err(HandlerError::validation("Nothing to pick up"));
        }

        ctx.sleep(self.transport_delay()).await?;

        ctx.update_task_user_metadata(&PickupTaskMetadata {
            picked_by: Some(self.config.operator.clone()),
        })
        .await
    }

    /// Drive one leg of a standard transport and record when it ran.
    pub async fn handle_drive_task(
        &self,
        task: &TaskOf<Drive>,
        ctx: &TaskHandlerContext<StandardTransport, Drive>,
    ) -> Result<(), HandlerError> {
        info!(
            parent: ctx.span(),
            route = %ctx.stage().data.route_id,
            distance = task.data.distance,
            "Handling drive task"
        );

        if task.data.distance <= 0.0 {
            return Err(HandlerError::validation("Leg distance must be positive"));
        }
        let weather = &ctx.job().data;
        if weather.visibility <= 0.0 {
            return Err(HandlerError::validation(format!(
                "Road closed: no visibility ({:?})",
                weather.condition
            )));
        }

        let started_at = chrono::Utc::now();
        ctx.sleep(self.transport_delay()).await?;

        ctx.update_task_user_metadata(&LegMetadata {
            started_at: Some(started_at),
            ended_at: Some(chrono::Utc::now()),
        })
        .await
    }
}

#[async_trait]
impl TaskHandler<HazmatTransport, Delivery> for LogisticsManager {
    async fn handle(
        &self,
        task: &TaskOf<Delivery>,
        ctx: &TaskHandlerContext<HazmatTransport, Delivery>,
    ) -> Result<(), HandlerError> {
        self.handle_delivery_task(task, ctx).await
    }
}

#[async_trait]
impl TaskHandler<HazmatTransport, Pickup> for LogisticsManager {
    async fn handle(
        &self,
        task: &TaskOf<Pickup>,
        ctx: &TaskHandlerContext<HazmatTransport, Pickup>,
    ) -> Result<(), HandlerError> {
        self.handle_pickup_task(task, ctx).await
    }
}

#[async_trait]
impl TaskHandler<StandardTransport, Drive> for LogisticsManager {
    async fn handle(
        &self,
        task: &TaskOf<Drive>,
        ctx: &TaskHandlerContext<StandardTransport, Drive>,
    ) -> Result<(), HandlerError> {
        self.handle_drive_task(task, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Condition, HazmatData, HazmatMetadata, ItemData, LegData, RouteData, TimeWindow,
        WeatherData,
    };
    use courier_work::testing::{fake_context, fake_job, fake_stage, fake_task, RecordingClient};
    use courier_work::HandlerErrorKind;
    use serde_json::json;

    fn instant() -> LogisticsManager {
        LogisticsManager::new(LogisticsConfig {
            max_transport_delay: Duration::ZERO,
            ..Default::default()
        })
    }

    fn window() -> TimeWindow {
        let now = chrono::Utc::now();
        TimeWindow {
            location: "Warehouse 42".to_string(),
            time_window_start: now,
            time_window_end: now + chrono::Duration::hours(1),
        }
    }

    fn delivery_context(
        casualty_count: Option<u32>,
        quantity: u32,
        client: Arc<RecordingClient>,
    ) -> (TaskOf<Delivery>, TaskHandlerContext<HazmatTransport, Delivery>) {
        let job = fake_job::<HazmatTransport>(
            HazmatData {
                un_number: "UN1993".to_string(),
                hazard_class: "3".to_string(),
            },
            HazmatMetadata {
                leaks_count: Some(0),
                casualty_count,
            },
        );
        let stage = fake_stage::<Delivery>(job.id, window(), Default::default());
        let task = fake_task::<Delivery>(
            stage.id,
            ItemData {
                item_id: "ITEM123".to_string(),
                quantity,
            },
        );
        let ctx = fake_context(job, stage, &task, client);
        (task, ctx)
    }

    #[tokio::test]
    async fn test_delivery_rejects_casualties_above_quantity() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(Some(15), 10, client.clone());

        let err = instant().handle_delivery_task(&task, &ctx).await.unwrap_err();

        assert_eq!(err.kind(), HandlerErrorKind::Validation);
        assert_eq!(err.to_string(), CASUALTY_COUNT_EXCEEDED);
        assert_eq!(client.update_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_signs_stage_once() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(Some(0), 10, client.clone());

        instant().handle_delivery_task(&task, &ctx).await.unwrap();

        assert_eq!(client.update_count(), 1);
        assert_eq!(
            client.stage_updates(),
            vec![json!({ "signaturedBy": "John Doe" })]
        );
    }

    #[tokio::test]
    async fn test_delivery_is_deterministic() {
        let manager = instant();
        for _ in 0..2 {
            let client = Arc::new(RecordingClient::new());
            let (task, ctx) = delivery_context(Some(15), 10, client.clone());
            let err = manager.handle_delivery_task(&task, &ctx).await.unwrap_err();
            assert_eq!(err.to_string(), CASUALTY_COUNT_EXCEEDED);
            assert_eq!(client.update_count(), 0);
        }
        for _ in 0..2 {
            let client = Arc::new(RecordingClient::new());
            let (task, ctx) = delivery_context(Some(0), 10, client.clone());
            manager.handle_delivery_task(&task, &ctx).await.unwrap();
            assert_eq!(client.update_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_delivery_accepts_casualties_equal_to_quantity() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(Some(10), 10, client.clone());

        instant().handle_delivery_task(&task, &ctx).await.unwrap();
        assert_eq!(client.update_count(), 1);
    }

    #[tokio::test]
    async fn test_delivery_treats_missing_casualty_count_as_zero() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(None, 0, client.clone());

        instant().handle_delivery_task(&task, &ctx).await.unwrap();
        assert_eq!(client.update_count(), 1);
    }

    #[tokio::test]
    async fn test_delivery_uses_configured_signatory() {
        let manager = LogisticsManager::new(LogisticsConfig {
            signatory: "Ada".to_string(),
            max_transport_delay: Duration::ZERO,
            ..Default::default()
        });
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(Some(1), 3, client.clone());

        manager.handle_delivery_task(&task, &ctx).await.unwrap();
        assert_eq!(client.stage_updates(), vec![json!({ "signaturedBy": "Ada" })]);
    }

    #[tokio::test]
    async fn test_delivery_propagates_refused_update() {
        let client = Arc::new(RecordingClient::rejecting());
        let (task, ctx) = delivery_context(Some(0), 10, client);

        let err = instant().handle_delivery_task(&task, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), HandlerErrorKind::Propagation);
    }

    #[tokio::test]
    async fn test_delivery_stops_on_termination_signal() {
        let manager = LogisticsManager::new(LogisticsConfig::default());
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = delivery_context(Some(0), 10, client.clone());

        ctx.signal().cancel();
        let err = manager.handle_delivery_task(&task, &ctx).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(client.update_count(), 0);
    }

    #[tokio::test]
    async fn test_pickup_records_operator() {
        let client = Arc::new(RecordingClient::new());
        let job = fake_job::<HazmatTransport>(
            HazmatData {
                un_number: "UN1993".to_string(),
                hazard_class: "3".to_string(),
            },
            Default::default(),
        );
        let stage = fake_stage::<Pickup>(job.id, window(), Default::default());
        let task = fake_task::<Pickup>(
            stage.id,
            ItemData {
                item_id: "ITEM456".to_string(),
                quantity: 3,
            },
        );
        let ctx = fake_context(job, stage, &task, client.clone());

        instant().handle_pickup_task(&task, &ctx).await.unwrap();
        assert_eq!(client.task_updates(), vec![json!({ "pickedBy": "John Doe" })]);
    }

    #[tokio::test]
    async fn test_pickup_rejects_empty_quantity() {
        let client = Arc::new(RecordingClient::new());
        let job = fake_job::<HazmatTransport>(
            HazmatData {
                un_number: "UN1993".to_string(),
                hazard_class: "3".to_string(),
            },
            Default::default(),
        );
        let stage = fake_stage::<Pickup>(job.id, window(), Default::default());
        let task = fake_task::<Pickup>(
            stage.id,
            ItemData {
                item_id: "ITEM456".to_string(),
                quantity: 0,
            },
        );
        let ctx = fake_context(job, stage, &task, client.clone());

        let err = instant().handle_pickup_task(&task, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), HandlerErrorKind::Validation);
        assert_eq!(client.update_count(), 0);
    }

    fn drive_context(
        visibility: f64,
        distance: f64,
        client: Arc<RecordingClient>,
    ) -> (TaskOf<Drive>, TaskHandlerContext<StandardTransport, Drive>) {
        let job = fake_job::<StandardTransport>(
            WeatherData {
                condition: Condition::Rain,
                visibility,
                temperature: 12.0,
                wind_speed: 20.0,
            },
            Default::default(),
        );
        let stage = fake_stage::<Drive>(
            job.id,
            RouteData {
                route_id: "R-7".to_string(),
                estimated_duration: 45,
            },
            Default::default(),
        );
        let task = fake_task::<Drive>(stage.id, LegData { distance });
        let ctx = fake_context(job, stage, &task, client);
        (task, ctx)
    }

    #[tokio::test]
    async fn test_drive_records_leg_times() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = drive_context(800.0, 12.5, client.clone());

        instant().handle_drive_task(&task, &ctx).await.unwrap();

        let updates = client.task_updates();
        assert_eq!(updates.len(), 1);
        let leg: LegMetadata = serde_json::from_value(updates[0].clone()).unwrap();
        let (started, ended) = (leg.started_at.unwrap(), leg.ended_at.unwrap());
        assert!(started <= ended);
    }

    #[tokio::test]
    async fn test_drive_refuses_zero_visibility() {
        let client = Arc::new(RecordingClient::new());
        let (task, ctx) = drive_context(0.0, 12.5, client.clone());

        let err = instant().handle_drive_task(&task, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), HandlerErrorKind::Validation);
        assert_eq!(client.update_count(), 0);
    }

    #[test]
    fn test_transport_delay_stays_below_maximum() {
        let manager = LogisticsManager::new(LogisticsConfig {
            max_transport_delay: Duration::from_millis(20),
            ..Default::default()
        });
        for _ in 0..50 {
            assert!(manager.transport_delay() < Duration::from_millis(20));
        }
        assert_eq!(instant().transport_delay(), Duration::ZERO);
    }
}
