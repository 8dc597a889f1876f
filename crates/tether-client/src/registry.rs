//! Owned object collection and value-changed routing.
//!
//! The registry owns every object exclusively; the stack and driver address
//! them by object id. It also carries the two pieces of cross-object glue:
//! the value-changed helper (server-initiated writes routed to the owning
//! object, with the device fallback on 4.05) and the bootstrap
//! backup/restore of locally stateful objects.

use tether_proto::{ObjectId, ResourceValue, Status, Value};

use crate::{
    channel::ControllerLink,
    object::Lwm2mObject,
    uri::Uri,
};

/// Exclusive owner of the client's objects.
#[derive(Default)]
pub struct Registry {
    objects: Vec<Box<dyn Lwm2mObject>>,
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object. Replaces any existing object with the same id.
    pub fn insert(&mut self, object: Box<dyn Lwm2mObject>) {
        self.remove(object.object_id());
        self.objects.push(object);
    }

    /// Remove and return the object serving `object_id`.
    pub fn remove(&mut self, object_id: ObjectId) -> Option<Box<dyn Lwm2mObject>> {
        let index = self.objects.iter().position(|o| o.object_id() == object_id)?;
        Some(self.objects.swap_remove(index))
    }

    /// The object serving `object_id`, if registered.
    pub fn get_mut(&mut self, object_id: ObjectId) -> Option<&mut Box<dyn Lwm2mObject>> {
        self.objects.iter_mut().find(|o| o.object_id() == object_id)
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no objects are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// CoRE link paths of every object instance, for registration.
    #[must_use]
    pub fn registration_paths(&self) -> String {
        let mut paths = Vec::new();
        for object in &self.objects {
            for instance in object.instances() {
                paths.push(format!("</{}/{}>", object.object_id(), instance));
            }
        }
        paths.join(",")
    }

    /// Route a server-initiated value change to the owning object.
    ///
    /// The value arrives as one string-typed resource; if the object's write
    /// answers 4.05 its domain fallback gets a chance (the device object
    /// accepts time-zone writes that way).
    pub async fn value_changed(
        &mut self,
        link: &mut dyn ControllerLink,
        uri: &Uri,
        value: &str,
    ) -> Status {
        let Some(object) = self.get_mut(uri.object_id) else {
            tracing::warn!(%uri, "value changed for unknown object");
            return Status::NOT_FOUND;
        };

        let values = [ResourceValue::new(uri.resource_id, Value::String(value.to_owned()))];
        let mut status = object.write(link, uri.instance_id, &values).await;
        if status == Status::METHOD_NOT_ALLOWED {
            status = object.write_fallback(&values).await;
        }

        if status == Status::CHANGED {
            tracing::info!(%uri, "value changed");
        } else {
            tracing::warn!(%uri, %status, "failed to change value");
        }
        status
    }

    /// Snapshot the listed objects (those with local state) for bootstrap.
    #[must_use]
    pub fn backup(&self, object_ids: &[ObjectId]) -> Vec<Box<dyn Lwm2mObject>> {
        self.objects
            .iter()
            .filter(|o| object_ids.contains(&o.object_id()))
            .filter_map(|o| o.snapshot())
            .collect()
    }

    /// Put saved objects back, replacing whatever bootstrap left behind.
    pub fn restore(&mut self, saved: Vec<Box<dyn Lwm2mObject>>) {
        for object in saved {
            tracing::info!(object_id = object.object_id(), "object restored from backup");
            self.insert(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tether_proto::{InstanceId, ResourceId};

    use super::*;
    use crate::object::ReadReply;

    /// Records writes; optionally refuses them with 4.05.
    struct Recorder {
        object_id: ObjectId,
        refuse_writes: bool,
        writes: Vec<ResourceValue>,
        fallbacks: usize,
    }

    impl Recorder {
        fn new(object_id: ObjectId, refuse_writes: bool) -> Self {
            Self { object_id, refuse_writes, writes: Vec::new(), fallbacks: 0 }
        }
    }

    #[async_trait(?Send)]
    impl Lwm2mObject for Recorder {
        fn object_id(&self) -> ObjectId {
            self.object_id
        }

        fn instances(&self) -> Vec<InstanceId> {
            vec![0]
        }

        async fn read(
            &mut self,
            _link: &mut dyn ControllerLink,
            _instance_id: InstanceId,
            _ids: &[ResourceId],
        ) -> Result<ReadReply, Status> {
            Err(Status::NOT_IMPLEMENTED)
        }

        async fn write(
            &mut self,
            _link: &mut dyn ControllerLink,
            _instance_id: InstanceId,
            values: &[ResourceValue],
        ) -> Status {
            if self.refuse_writes {
                return Status::METHOD_NOT_ALLOWED;
            }
            self.writes.extend_from_slice(values);
            Status::CHANGED
        }

        async fn execute(
            &mut self,
            _link: &mut dyn ControllerLink,
            _instance_id: InstanceId,
            _resource_id: ResourceId,
            _args: &[u8],
        ) -> Status {
            Status::NOT_IMPLEMENTED
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

        async fn delete(
            &mut self,
            _link: &mut dyn ControllerLink,
            _instance_id: InstanceId,
        ) -> Status {
            Status::NOT_IMPLEMENTED
        }

        async fn write_fallback(&mut self, _values: &[ResourceValue]) -> Status {
            self.fallbacks += 1;
            Status::CHANGED
        }
    }

    /// Link that refuses to be used.
    struct NoLink;

    #[async_trait(?Send)]
    impl ControllerLink for NoLink {
        async fn exchange(
            &mut self,
            _command: crate::channel::Command,
            _frame: &[u8],
        ) -> Result<Vec<u8>, crate::channel::ChannelError> {
            Err(crate::channel::ChannelError::Closed)
        }
    }

    #[tokio::test]
    async fn value_changed_writes_string_resource() {
        let mut registry = Registry::new();
        registry.insert(Box::new(Recorder::new(3, false)));

        let uri: Uri = "/3/0/13".parse().expect("should parse");
        let status = registry.value_changed(&mut NoLink, &uri, "12345").await;
        assert_eq!(status, Status::CHANGED);
    }

    #[tokio::test]
    async fn value_changed_falls_back_on_method_not_allowed() {
        let mut registry = Registry::new();
        registry.insert(Box::new(Recorder::new(3, true)));

        let uri: Uri = "/3/0/15".parse().expect("should parse");
        let status = registry.value_changed(&mut NoLink, &uri, "Europe/Berlin").await;
        assert_eq!(status, Status::CHANGED);
    }

    #[tokio::test]
    async fn value_changed_unknown_object_is_not_found() {
        let mut registry = Registry::new();
        let uri: Uri = "/9/0/0".parse().expect("should parse");
        assert_eq!(registry.value_changed(&mut NoLink, &uri, "x").await, Status::NOT_FOUND);
    }

    #[test]
    fn registration_paths_list_every_instance() {
        let mut registry = Registry::new();
        registry.insert(Box::new(Recorder::new(1, false)));
        registry.insert(Box::new(Recorder::new(3, false)));
        let paths = registry.registration_paths();
        assert!(paths.contains("</1/0>"));
        assert!(paths.contains("</3/0>"));
    }

    #[test]
    fn insert_replaces_same_object_id() {
        let mut registry = Registry::new();
        registry.insert(Box::new(Recorder::new(3, false)));
        registry.insert(Box::new(Recorder::new(3, true)));
        assert_eq!(registry.len(), 1);
    }
}
