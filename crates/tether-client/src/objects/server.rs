//! Server object (`/1`).
//!
//! Registration parameters for one LWM2M server: lifetime, binding and the
//! short server id. Local state, backed up around bootstrap together with
//! the security object.

use async_trait::async_trait;
use tether_proto::{InstanceId, ObjectId, ResourceId, ResourceValue, Status, Value};

use crate::{
    channel::ControllerLink,
    object::{Lwm2mObject, ReadReply},
    objects::SERVER_OBJECT_ID,
};

/// Short server id.
pub const RES_SHORT_SERVER_ID: ResourceId = 0;
/// Registration lifetime in seconds.
pub const RES_LIFETIME: ResourceId = 1;
/// Whether notifications are stored while the server is offline.
pub const RES_NOTIFICATION_STORING: ResourceId = 6;
/// Transport binding (`"U"` for UDP).
pub const RES_BINDING: ResourceId = 7;
/// Registration update trigger (executable).
pub const RES_REGISTRATION_UPDATE: ResourceId = 8;

const READABLE: [ResourceId; 4] =
    [RES_SHORT_SERVER_ID, RES_LIFETIME, RES_NOTIFICATION_STORING, RES_BINDING];

/// One server account.
#[derive(Debug, Clone)]
pub struct ServerInstance {
    /// Instance id.
    pub instance_id: InstanceId,
    /// Short id matching a security instance.
    pub short_server_id: u16,
    /// Registration lifetime in seconds.
    pub lifetime: i64,
    /// Store-notifications-when-offline flag.
    pub storing: bool,
    /// Transport binding.
    pub binding: String,
}

impl ServerInstance {
    fn resource(&self, id: ResourceId) -> Option<Value> {
        match id {
            RES_SHORT_SERVER_ID => Some(Value::Integer(i64::from(self.short_server_id))),
            RES_LIFETIME => Some(Value::Integer(self.lifetime)),
            RES_NOTIFICATION_STORING => Some(Value::Boolean(self.storing)),
            RES_BINDING => Some(Value::String(self.binding.clone())),
            _ => None,
        }
    }

    fn set_resource(&mut self, resource: &ResourceValue) -> Status {
        match (resource.id, &resource.value) {
            (RES_LIFETIME, Value::Integer(lifetime)) => self.lifetime = *lifetime,
            (RES_NOTIFICATION_STORING, Value::Boolean(storing)) => self.storing = *storing,
            (RES_BINDING, Value::String(binding)) => self.binding = binding.clone(),
            // The short id is read-only once configured.
            (RES_SHORT_SERVER_ID, _) => return Status::METHOD_NOT_ALLOWED,
            (RES_LIFETIME | RES_NOTIFICATION_STORING | RES_BINDING, _) => {
                return Status::BAD_REQUEST;
            },
            _ => return Status::NOT_FOUND,
        }
        Status::CHANGED
    }
}

/// The server object: locally stored registration parameters.
#[derive(Debug, Clone, Default)]
pub struct ServerObject {
    instances: Vec<ServerInstance>,
}

impl ServerObject {
    /// Server object with a single account.
    #[must_use]
    pub fn new(instance: ServerInstance) -> Self {
        Self { instances: vec![instance] }
    }

    /// Lifetime of the account in `instance_id`, if present.
    #[must_use]
    pub fn lifetime(&self, instance_id: InstanceId) -> Option<i64> {
        self.instances.iter().find(|i| i.instance_id == instance_id).map(|i| i.lifetime)
    }
}

#[async_trait(?Send)]
impl Lwm2mObject for ServerObject {
    fn object_id(&self) -> ObjectId {
        SERVER_OBJECT_ID
    }

    fn instances(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.instance_id).collect()
    }

    async fn read(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        let Some(instance) = self.instances.iter().find(|i| i.instance_id == instance_id)
        else {
            return Err(Status::NOT_FOUND);
        };

        let requested: &[ResourceId] = if ids.is_empty() { &READABLE } else { ids };
        let mut values = Vec::with_capacity(requested.len());
        for &id in requested {
            let value = instance.resource(id).ok_or(Status::NOT_FOUND)?;
            values.push(ResourceValue::new(id, value));
        }
        Ok(ReadReply { status: Status::CONTENT, values })
    }

    async fn write(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status {
        let Some(instance) =
            self.instances.iter_mut().find(|i| i.instance_id == instance_id)
        else {
            return Status::NOT_FOUND;
        };
        for value in values {
            let status = instance.set_resource(value);
            if status != Status::CHANGED {
                return status;
            }
        }
        Status::CHANGED
    }

    async fn execute(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        resource_id: ResourceId,
        _args: &[u8],
    ) -> Status {
        if self.instances.iter().all(|i| i.instance_id != instance_id) {
            return Status::NOT_FOUND;
        }
        match resource_id {
            RES_REGISTRATION_UPDATE => {
                tracing::info!(instance_id, "registration update triggered");
                Status::CHANGED
            },
            _ => Status::METHOD_NOT_ALLOWED,
        }
    }

    async fn discover(
        &mut self,
        _link: &mut dyn ControllerLink,
        _instance_id: InstanceId,
        _ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        Err(Status::NOT_IMPLEMENTED)
    }

    async fn create(
        &mut self,
        _link: &mut dyn ControllerLink,
        _instance_id: InstanceId,
        _values: &[ResourceValue],
    ) -> Status {
        Status::NOT_IMPLEMENTED
    }

    async fn delete(&mut self, _link: &mut dyn ControllerLink, instance_id: InstanceId) -> Status {
        let before = self.instances.len();
        self.instances.retain(|i| i.instance_id != instance_id);
        if self.instances.len() == before { Status::NOT_FOUND } else { Status::CHANGED }
    }

    fn snapshot(&self) -> Option<Box<dyn Lwm2mObject>> {
        Some(Box::new(self.clone()))
    }
}
