//! Embedded LWM2M client core.
//!
//! Every resource operation the stack raises against a bridged object is
//! forwarded to the parent controller over stdin/stdout and the controller's
//! answer becomes the CoAP status the stack sees. The pieces:
//!
//! - [`channel`]: the line transport (`"/<cmd>:<base64>"` out,
//!   `"/resp:<cmd>:<base64>"` back, one exchange in flight, 1.5 s bound).
//! - [`proxy::ObjectProxy`]: the generic object, forwarding read/write and
//!   reserving the remaining operations.
//! - [`object::Lwm2mObject`]: the capability seam every object implements.
//! - [`registry::Registry`]: exclusive owner of the objects, value-changed
//!   routing and bootstrap backup.
//! - [`objects`]: the local security/server/device objects.
//!
//! The model is single-threaded cooperative: operations borrow the
//! controller link for their duration, so no two exchanges can interleave.

pub mod channel;
pub mod object;
pub mod objects;
pub mod proxy;
pub mod registry;
pub mod uri;

pub use channel::{ChannelError, Command, ControllerLink, InboundLine, StdioChannel};
pub use object::{Lwm2mObject, ReadReply};
pub use proxy::{MESSAGE_ID, ObjectProxy};
pub use registry::Registry;
pub use tether_proto::{
    InstanceId, ObjectId, ResourceId, ResourceValue, Status, Value,
};
pub use uri::Uri;
