//! The generic object proxy.
//!
//! A proxy owns nothing but its object id: every operation builds a request
//! frame, performs one exchange over the borrowed controller link, validates
//! the reply header and decodes the body. The controller is the source of
//! truth for the object's state.
//!
//! Status mapping: a request the client cannot serialise is 4.00; a timed
//! out exchange is 5.01; a malformed reply is logged as 5.00 and surfaced
//! as 4.00 to keep the stack-facing contract; a well-formed reply's status
//! byte is returned verbatim.

use async_trait::async_trait;
use tether_proto::{
    InstanceId, ObjectId, ProtocolError, Reply, ResourceId, ResourceValue, Status, read_request,
    write_request,
};

use crate::{
    channel::{ChannelError, Command, ControllerLink},
    object::{Lwm2mObject, ReadReply},
};

/// Message id stamped on every request until multiplexing exists.
pub const MESSAGE_ID: u8 = 0x01;

/// Most resources one operation may carry (the count field is 16-bit).
const MAX_RESOURCES: usize = u16::MAX as usize;

/// Generic proxy forwarding one object's operations to the controller.
#[derive(Debug, Clone)]
pub struct ObjectProxy {
    object_id: ObjectId,
    instances: Vec<InstanceId>,
}

impl ObjectProxy {
    /// Bind a proxy to an object id, seeded with the default instance.
    #[must_use]
    pub fn new(object_id: ObjectId) -> Self {
        Self { object_id, instances: vec![0] }
    }
}

/// Log a request that could not be serialised and yield 4.00.
fn reject_request(command: Command, err: &ProtocolError) -> Status {
    tracing::error!(%command, status = %Status::BAD_REQUEST, error = %err, "request not serialisable");
    Status::BAD_REQUEST
}

/// Map an exchange failure: timeouts surface as-is, protocol errors are
/// logged with their real status and surfaced as 4.00.
fn reject_exchange(command: Command, err: &ChannelError) -> Status {
    let status = err.status();
    tracing::error!(%command, %status, error = %err, "controller exchange failed");
    match err {
        ChannelError::Timeout => status,
        _ => Status::BAD_REQUEST,
    }
}

/// Log a malformed reply with its internal 5.00 and yield the caller-facing
/// 4.00.
fn reject_reply(command: Command, err: &ProtocolError) -> Status {
    tracing::error!(%command, status = %err.status(), error = %err, "controller reply rejected");
    Status::BAD_REQUEST
}

#[async_trait(?Send)]
impl Lwm2mObject for ObjectProxy {
    fn object_id(&self) -> ObjectId {
        self.object_id
    }

    fn instances(&self) -> Vec<InstanceId> {
        self.instances.clone()
    }

    async fn read(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        if ids.len() > MAX_RESOURCES {
            return Err(Status::BAD_REQUEST);
        }
        tracing::debug!(
            object_id = self.object_id,
            instance_id,
            requested = ids.len(),
            "read"
        );

        let frame = read_request(MESSAGE_ID, self.object_id, instance_id, ids)
            .map_err(|e| reject_request(Command::Read, &e))?;
        let raw = link
            .exchange(Command::Read, &frame)
            .await
            .map_err(|e| reject_exchange(Command::Read, &e))?;

        let reply =
            Reply::parse(&raw, MESSAGE_ID).map_err(|e| reject_reply(Command::Read, &e))?;
        let status = reply.status();
        if !status.is_success() {
            return Err(status);
        }

        let values = reply.values().map_err(|e| reject_reply(Command::Read, &e))?;
        tracing::debug!(object_id = self.object_id, %status, count = values.len(), "read done");
        Ok(ReadReply { status, values })
    }

    async fn write(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status {
        if values.len() > MAX_RESOURCES {
            return Status::BAD_REQUEST;
        }
        tracing::debug!(
            object_id = self.object_id,
            instance_id,
            count = values.len(),
            "write"
        );

        let frame = match write_request(MESSAGE_ID, self.object_id, instance_id, values) {
            Ok(frame) => frame,
            Err(e) => return reject_request(Command::Write, &e),
        };
        let raw = match link.exchange(Command::Write, &frame).await {
            Ok(raw) => raw,
            Err(e) => return reject_exchange(Command::Write, &e),
        };

        // A write reply is header-only as far as this client is concerned;
        // its count bytes are never consumed.
        let status = match Reply::parse(&raw, MESSAGE_ID) {
            Ok(reply) => reply.status(),
            Err(e) => return reject_reply(Command::Write, &e),
        };
        tracing::debug!(object_id = self.object_id, %status, "write done");
        status
    }

    // The remaining operations are reserved until the bridge defines frame
    // layouts for them.

    async fn execute(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        resource_id: ResourceId,
        _args: &[u8],
    ) -> Status {
        tracing::debug!(object_id = self.object_id, instance_id, resource_id, "execute reserved");
        Status::NOT_IMPLEMENTED
    }

    async fn discover(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        _ids: &[ResourceId],
    ) -> Result<ReadReply, Status> {
        tracing::debug!(object_id = self.object_id, instance_id, "discover reserved");
        Err(Status::NOT_IMPLEMENTED)
    }

    async fn create(
        &mut self,
        _link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        _values: &[ResourceValue],
    ) -> Status {
        tracing::debug!(object_id = self.object_id, instance_id, "create reserved");
        Status::NOT_IMPLEMENTED
    }

    async fn delete(&mut self, _link: &mut dyn ControllerLink, instance_id: InstanceId) -> Status {
        tracing::debug!(object_id = self.object_id, instance_id, "delete reserved");
        Status::NOT_IMPLEMENTED
    }
}
