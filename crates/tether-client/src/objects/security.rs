//! Security object (`/0`).
//!
//! Carries the server URI and DTLS-PSK credentials the stack connects with.
//! State is local and authoritative, which also makes this one of the two
//! objects backed up around a bootstrap exchange.

use async_trait::async_trait;
use tether_proto::{InstanceId, ObjectId, ResourceId, ResourceValue, Status, Value};

use crate::{
    channel::ControllerLink,
    object::{Lwm2mObject, ReadReply},
    objects::SECURITY_OBJECT_ID,
};

/// LWM2M server URI.
pub const RES_SERVER_URI: ResourceId = 0;
/// Bootstrap-server flag.
pub const RES_BOOTSTRAP_SERVER: ResourceId = 1;
/// Security mode (0 = PSK, 3 = NoSec).
pub const RES_SECURITY_MODE: ResourceId = 2;
/// PSK identity.
pub const RES_PSK_IDENTITY: ResourceId = 3;
/// PSK secret key.
pub const RES_SECRET_KEY: ResourceId = 5;
/// Short server id this instance belongs to.
pub const RES_SHORT_SERVER_ID: ResourceId = 10;

const MODE_PSK: i64 = 0;
const MODE_NOSEC: i64 = 3;

const READABLE: [ResourceId; 6] = [
    RES_SERVER_URI,
    RES_BOOTSTRAP_SERVER,
    RES_SECURITY_MODE,
    RES_PSK_IDENTITY,
    RES_SECRET_KEY,
    RES_SHORT_SERVER_ID,
];

/// One security instance: a server (or bootstrap server) and its credentials.
#[derive(Debug, Clone)]
pub struct SecurityInstance {
    /// Instance id.
    pub instance_id: InstanceId,
    /// `coap://` or `coaps://` URI of the server.
    pub server_uri: String,
    /// Whether this entry describes a bootstrap server.
    pub bootstrap_server: bool,
    /// PSK identity, when DTLS-PSK is in use.
    pub psk_identity: Option<String>,
    /// PSK secret key, when DTLS-PSK is in use.
    pub psk_key: Option<Vec<u8>>,
    /// Short id tying this entry to a server object instance.
    pub short_server_id: u16,
}

impl SecurityInstance {
    fn security_mode(&self) -> i64 {
        if self.psk_key.is_some() { MODE_PSK } else { MODE_NOSEC }
    }

    fn resource(&self, id: ResourceId) -> Option<Value> {
        match id {
            RES_SERVER_URI => Some(Value::String(self.server_uri.clone())),
            RES_BOOTSTRAP_SERVER => Some(Value::Boolean(self.bootstrap_server)),
            RES_SECURITY_MODE => Some(Value::Integer(self.security_mode())),
            RES_PSK_IDENTITY => {
                Some(Value::String(self.psk_identity.clone().unwrap_or_default()))
            },
            RES_SECRET_KEY => Some(Value::Opaque(self.psk_key.clone().unwrap_or_default())),
            RES_SHORT_SERVER_ID => Some(Value::Integer(i64::from(self.short_server_id))),
            _ => None,
        }
    }

    fn set_resource(&mut self, resource: &ResourceValue) -> Status {
        match (resource.id, &resource.value) {
            (RES_SERVER_URI, Value::String(uri)) => self.server_uri = uri.clone(),
            (RES_BOOTSTRAP_SERVER, Value::Boolean(flag)) => self.bootstrap_server = *flag,
            // The mode is derived from the presence of a key; accept writes
            // for compatibility without storing them.
            (RES_SECURITY_MODE, Value::Integer(_)) => {},
            (RES_PSK_IDENTITY, Value::String(identity)) => {
                self.psk_identity = Some(identity.clone());
            },
            (RES_SECRET_KEY, Value::Opaque(key)) => self.psk_key = Some(key.clone()),
            (RES_SHORT_SERVER_ID, Value::Integer(id)) => {
                let Ok(id) = u16::try_from(*id) else { return Status::BAD_REQUEST };
                self.short_server_id = id;
            },
            (RES_SERVER_URI | RES_BOOTSTRAP_SERVER | RES_SECURITY_MODE | RES_PSK_IDENTITY
            | RES_SECRET_KEY | RES_SHORT_SERVER_ID, _) => return Status::BAD_REQUEST,
            _ => return Status::NOT_FOUND,
        }
        Status::CHANGED
    }
}

/// The security object: locally stored server entries.
#[derive(Debug, Clone, Default)]
pub struct SecurityObject {
    instances: Vec<SecurityInstance>,
}

impl SecurityObject {
    /// Security object with a single server entry.
    #[must_use]
    pub fn new(instance: SecurityInstance) -> Self {
        Self { instances: vec![instance] }
    }

    /// URI of the server described by `instance_id`.
    #[must_use]
    pub fn server_uri(&self, instance_id: InstanceId) -> Option<&str> {
        self.instance(instance_id).map(|i| i.server_uri.as_str())
    }

    fn instance(&self, instance_id: InstanceId) -> Option<&SecurityInstance> {
        self.instances.iter().find(|i| i.instance_id == instance_id)
    }

    fn instance_mut(&mut self, instance_id: InstanceId) -> Option<&mut SecurityInstance> {
        self.instances.iter_mut().find(|i| i.instance_id == instance_id)
    }
}

#[async_trait(?Send)]
impl Lwm2mObject for SecurityObject {
    fn object_id(&self) -> ObjectId {
        SECURITY_OBJECT_ID
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
        let Some(instance) = self.instance(instance_id) else {
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
        let Some(instance) = self.instance_mut(instance_id) else {
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
        _instance_id: InstanceId,
        _resource_id: ResourceId,
        _args: &[u8],
    ) -> Status {
        Status::METHOD_NOT_ALLOWED
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

#[cfg(test)]
mod tests {
    use super::*;

    fn psk_instance() -> SecurityInstance {
        SecurityInstance {
            instance_id: 0,
            server_uri: "coaps://localhost:5684".to_owned(),
            bootstrap_server: false,
            psk_identity: Some("identity".to_owned()),
            psk_key: Some(vec![0x01, 0x02]),
            short_server_id: 123,
        }
    }

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
    async fn read_all_lists_every_resource() {
        let mut object = SecurityObject::new(psk_instance());
        let reply = object.read(&mut NoLink, 0, &[]).await.expect("should read");
        assert_eq!(reply.status, Status::CONTENT);
        assert_eq!(reply.values.len(), READABLE.len());
        assert_eq!(
            reply.values[0],
            ResourceValue::new(RES_SERVER_URI, Value::String("coaps://localhost:5684".into()))
        );
    }

    #[tokio::test]
    async fn psk_presence_selects_security_mode() {
        let mut with_psk = SecurityObject::new(psk_instance());
        let reply =
            with_psk.read(&mut NoLink, 0, &[RES_SECURITY_MODE]).await.expect("should read");
        assert_eq!(reply.values[0].value, Value::Integer(MODE_PSK));

        let mut instance = psk_instance();
        instance.psk_identity = None;
        instance.psk_key = None;
        let mut without = SecurityObject::new(instance);
        let reply =
            without.read(&mut NoLink, 0, &[RES_SECURITY_MODE]).await.expect("should read");
        assert_eq!(reply.values[0].value, Value::Integer(MODE_NOSEC));
    }

    #[tokio::test]
    async fn write_updates_server_uri() {
        let mut object = SecurityObject::new(psk_instance());
        let status = object
            .write(
                &mut NoLink,
                0,
                &[ResourceValue::new(
                    RES_SERVER_URI,
                    Value::String("coap://example:5683".into()),
                )],
            )
            .await;
        assert_eq!(status, Status::CHANGED);
        assert_eq!(object.server_uri(0), Some("coap://example:5683"));
    }

    #[tokio::test]
    async fn write_rejects_type_mismatch() {
        let mut object = SecurityObject::new(psk_instance());
        let status = object
            .write(&mut NoLink, 0, &[ResourceValue::new(RES_SERVER_URI, Value::Integer(1))])
            .await;
        assert_eq!(status, Status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_instance_is_not_found() {
        let mut object = SecurityObject::new(psk_instance());
        assert_eq!(object.read(&mut NoLink, 9, &[]).await.unwrap_err(), Status::NOT_FOUND);
    }
}
