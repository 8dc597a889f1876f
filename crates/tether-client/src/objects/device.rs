//! Device object (`/3`).
//!
//! The controller answers device reads and writes like any proxied object,
//! but a handful of time resources are writable by the server even when the
//! controller refuses the write: the 4.05 fallback lands here and is
//! absorbed locally.

use async_trait::async_trait;
use tether_proto::{InstanceId, ObjectId, ResourceId, ResourceValue, Status, Value};

use crate::{
    channel::ControllerLink,
    object::{Lwm2mObject, ReadReply},
    objects::DEVICE_OBJECT_ID,
    proxy::ObjectProxy,
};

/// Current time (writable for clock sync).
pub const RES_CURRENT_TIME: ResourceId = 13;
/// UTC offset, e.g. `"+02:00"`.
pub const RES_UTC_OFFSET: ResourceId = 14;
/// Timezone, e.g. `"Europe/Berlin"`.
pub const RES_TIMEZONE: ResourceId = 15;

/// Device object: a controller proxy with a local time-resource fallback.
#[derive(Debug, Clone)]
pub struct DeviceObject {
    proxy: ObjectProxy,
    utc_offset: String,
    timezone: String,
}

impl DeviceObject {
    /// Device object bound to `/3`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxy: ObjectProxy::new(DEVICE_OBJECT_ID),
            utc_offset: String::new(),
            timezone: String::new(),
        }
    }

    /// UTC offset last written by the server.
    #[must_use]
    pub fn utc_offset(&self) -> &str {
        &self.utc_offset
    }

    /// Timezone last written by the server.
    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

impl Default for DeviceObject {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Lwm2mObject for DeviceObject {
    fn object_id(&self) -> ObjectId {
        self.proxy.object_id()
    }

    fn instances(&self) -> Vec<InstanceId> {
        self.proxy.instances()
    }

    async fn read(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        self.proxy.read(link, instance_id, ids).await
    }

    async fn write(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status {
        self.proxy.write(link, instance_id, values).await
    }

    async fn execute(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        resource_id: ResourceId,
        args: &[u8],
    ) -> Status {
        self.proxy.execute(link, instance_id, resource_id, args).await
    }

    async fn discover(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        self.proxy.discover(link, instance_id, ids).await
    }

    async fn create(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status {
        self.proxy.create(link, instance_id, values).await
    }

    async fn delete(&mut self, link: &mut dyn ControllerLink, instance_id: InstanceId) -> Status {
        self.proxy.delete(link, instance_id).await
    }

    async fn write_fallback(&mut self, values: &[ResourceValue]) -> Status {
        for resource in values {
            let Value::String(text) = &resource.value else {
                return Status::BAD_REQUEST;
            };
            match resource.id {
                // The controller owns the clock; nothing to store.
                RES_CURRENT_TIME => {
                    tracing::debug!(value = %text, "current time write absorbed");
                },
                RES_UTC_OFFSET => self.utc_offset = text.clone(),
                RES_TIMEZONE => self.timezone = text.clone(),
                _ => return Status::METHOD_NOT_ALLOWED,
            }
        }
        Status::CHANGED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_accepts_time_resources() {
        let mut device = DeviceObject::new();
        let status = device
            .write_fallback(&[
                ResourceValue::new(RES_UTC_OFFSET, Value::String("+02:00".into())),
                ResourceValue::new(RES_TIMEZONE, Value::String("Europe/Berlin".into())),
            ])
            .await;
        assert_eq!(status, Status::CHANGED);
        assert_eq!(device.utc_offset(), "+02:00");
        assert_eq!(device.timezone(), "Europe/Berlin");
    }

    #[tokio::test]
    async fn fallback_keeps_refusing_other_resources() {
        let mut device = DeviceObject::new();
        let status = device
            .write_fallback(&[ResourceValue::new(0, Value::String("manufacturer".into()))])
            .await;
        assert_eq!(status, Status::METHOD_NOT_ALLOWED);
    }
}
