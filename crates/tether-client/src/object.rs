//! The object capability seam.
//!
//! The LWM2M stack sees every object through the same six operations. The
//! original expressed this as a table of C function pointers on the object
//! record; here it is a trait, and the generic controller proxy is one
//! implementation among the local domain objects.
//!
//! Operations borrow the controller link from the caller for their duration,
//! which is what makes "one request in flight" a compile-time property
//! rather than a locking discipline.

use async_trait::async_trait;
use tether_proto::{InstanceId, ObjectId, ResourceId, ResourceValue, Status};

use crate::channel::ControllerLink;

/// Outcome of a successful read or discover.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadReply {
    /// Status reported by whoever served the operation (2.05 on success).
    pub status: Status,
    /// The resource values, in reply order.
    pub values: Vec<ResourceValue>,
}

/// One LWM2M object and its six operations.
///
/// Errors are statuses, never panics; an operation that cannot be served
/// returns the CoAP code the stack should answer with.
#[async_trait(?Send)]
pub trait Lwm2mObject {
    /// The object id this object serves.
    fn object_id(&self) -> ObjectId;

    /// Instances currently present on this object.
    fn instances(&self) -> Vec<InstanceId>;

    /// Read the listed resources, or all resources when `ids` is empty.
    async fn read(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status>;

    /// Write the given resource values.
    async fn write(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status;

    /// Execute a resource with opaque arguments.
    async fn execute(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        resource_id: ResourceId,
        args: &[u8],
    ) -> Status;

    /// Discover the resources an instance carries.
    async fn discover(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        ids: &[ResourceId],
    ) -> Result<ReadReply, Status>;

    /// Create an instance from the given values.
    async fn create(
        &mut self,
        link: &mut dyn ControllerLink,
        instance_id: InstanceId,
        values: &[ResourceValue],
    ) -> Status;

    /// Delete an instance.
    async fn delete(&mut self, link: &mut dyn ControllerLink, instance_id: InstanceId) -> Status;

    /// Domain fallback tried when a routed write answers 4.05.
    ///
    /// The device object accepts time-zone writes this way; everything else
    /// keeps the 4.05.
    async fn write_fallback(&mut self, values: &[ResourceValue]) -> Status {
        let _ = values;
        Status::METHOD_NOT_ALLOWED
    }

    /// Deep copy for bootstrap backup.
    ///
    /// Only objects with local authoritative state (security, server)
    /// return one; proxied objects have nothing to save.
    fn snapshot(&self) -> Option<Box<dyn Lwm2mObject>> {
        None
    }
}
