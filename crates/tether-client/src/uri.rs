//! Resource addressing.
//!
//! A fully qualified resource path, `/<object>/<instance>/<resource>`. The
//! stack's own URI handling stays external; this type only carries the
//! coordinates the value-changed helper routes on.

use std::{fmt, str::FromStr};

use thiserror::Error;
use tether_proto::{InstanceId, ObjectId, ResourceId};

/// A `(object, instance, resource)` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uri {
    /// Object id.
    pub object_id: ObjectId,
    /// Instance id within the object.
    pub instance_id: InstanceId,
    /// Resource id within the instance.
    pub resource_id: ResourceId,
}

/// The string was not a `/<object>/<instance>/<resource>` path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected /<object>/<instance>/<resource>, got {0:?}")]
pub struct ParseUriError(String);

impl FromStr for Uri {
    type Err = ParseUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseUriError(s.to_owned());
        let mut segments = s.strip_prefix('/').ok_or_else(malformed)?.split('/');
        let mut next = || -> Result<u16, ParseUriError> {
            segments.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())
        };
        let uri =
            Self { object_id: next()?, instance_id: next()?, resource_id: next()? };
        if segments.next().is_some() {
            return Err(malformed());
        }
        Ok(uri)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.object_id, self.instance_id, self.resource_id)
    }
}
