//! Logistics domain for the Courier worker.
//!
//! Job and stage kinds for hazmat and standard transports, the
//! [`LogisticsManager`] handlers, and a demo seeder.

pub mod manager;
pub mod seeder;
pub mod types;

pub use manager::{LogisticsConfig, LogisticsManager, CASUALTY_COUNT_EXCEEDED};
pub use seeder::{seed_data, SeededJob};
pub use types::{Delivery, Drive, HazmatTransport, Pickup, StandardTransport};
