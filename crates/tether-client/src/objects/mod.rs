//! Local domain objects.
//!
//! Security and server hold their state locally (the stack needs both before
//! any controller exchange can happen); the device object proxies to the
//! controller but keeps a domain fallback for time-zone writes. Everything
//! else the client exposes is a plain [`crate::proxy::ObjectProxy`].

use tether_proto::ObjectId;

mod device;
mod security;
mod server;

pub use device::DeviceObject;
pub use security::{SecurityInstance, SecurityObject};
pub use server::{ServerInstance, ServerObject};

/// Security object (`/0`).
pub const SECURITY_OBJECT_ID: ObjectId = 0;
/// Server object (`/1`).
pub const SERVER_OBJECT_ID: ObjectId = 1;
/// Access control object (`/2`).
pub const ACCESS_CONTROL_OBJECT_ID: ObjectId = 2;
/// Device object (`/3`).
pub const DEVICE_OBJECT_ID: ObjectId = 3;
/// Connectivity monitoring object (`/4`).
pub const CONNECTIVITY_MONITORING_OBJECT_ID: ObjectId = 4;
/// Firmware update object (`/5`).
pub const FIRMWARE_OBJECT_ID: ObjectId = 5;
/// Location object (`/6`).
pub const LOCATION_OBJECT_ID: ObjectId = 6;
/// Connectivity statistics object (`/7`).
pub const CONNECTIVITY_STATISTICS_OBJECT_ID: ObjectId = 7;
