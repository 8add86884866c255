//! Logistics job and stage kinds.
//!
//! Metadata fields are all optional: the same type is used for the stored
//! document and for partial updates.

use courier_core::{JobKind, StageKind, Time};
use serde::{Deserialize, Serialize};

// === Jobs ===

/// Transport of hazardous materials.
pub struct HazmatTransport;

impl JobKind for HazmatTransport {
    const NAME: &'static str = "hazmatTransport";
    type Data = HazmatData;
    type UserMetadata = HazmatMetadata;
}

/// Hazardous cargo identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazmatData {
    /// UN number, e.g. `UN1993`
    pub un_number: String,
    /// Hazard class, e.g. `3`
    pub hazard_class: String,
}

/// Incident counters reported during a hazmat transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazmatMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaks_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casualty_count: Option<u32>,
}

/// Transport of ordinary goods.
pub struct StandardTransport;

impl JobKind for StandardTransport {
    const NAME: &'static str = "standardTransport";
    type Data = WeatherData;
    type UserMetadata = StandardMetadata;
}

/// Road weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Clear,
    Rain,
    Snow,
}

/// Weather along the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub condition: Condition,
    /// Meters
    pub visibility: f64,
    /// Celsius
    pub temperature: f64,
    /// km/h
    pub wind_speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fugitives_count: Option<u32>,
}

// === Stages ===

/// Collecting goods from a location.
pub struct Pickup;

impl StageKind for Pickup {
    const NAME: &'static str = "pickup";
    type Data = TimeWindow;
    type UserMetadata = PickupMetadata;
    type TaskData = ItemData;
    type TaskUserMetadata = PickupTaskMetadata;
}

/// Driving a route.
pub struct Drive;

impl StageKind for Drive {
    const NAME: &'static str = "drive";
    type Data = RouteData;
    type UserMetadata = DriveMetadata;
    type TaskData = LegData;
    type TaskUserMetadata = LegMetadata;
}

/// Handing goods over at a location.
pub struct Delivery;

impl StageKind for Delivery {
    const NAME: &'static str = "delivery";
    type Data = TimeWindow;
    type UserMetadata = DeliveryMetadata;
    type TaskData = ItemData;
    type TaskUserMetadata = DeliveryTaskMetadata;
}

/// A location and the window in which it must be visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub location: String,
    pub time_window_start: Time,
    pub time_window_end: Time,
}

/// An item and how many of it to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupTaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    pub route_id: String,
    /// Minutes
    pub estimated_duration: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

/// One leg of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegData {
    /// Kilometers
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Time>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatured_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_by: Option<String>,
}
