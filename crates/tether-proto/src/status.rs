//! CoAP status codes.
//!
//! Outcomes cross the bridge as the raw CoAP code byte: three class bits and
//! five detail bits, so 2.05 Content travels as `0x45`. The controller echoes
//! these in reply frames and the client hands them back to the stack
//! unchanged; errors in this codebase are status values, never exceptions.

use std::fmt;

/// A CoAP response code in its one-byte wire form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(u8);

impl Status {
    /// 2.04 Changed — successful write.
    pub const CHANGED: Self = Self(0x44);
    /// 2.05 Content — successful read.
    pub const CONTENT: Self = Self(0x45);
    /// 4.00 Bad Request.
    pub const BAD_REQUEST: Self = Self(0x80);
    /// 4.04 Not Found.
    pub const NOT_FOUND: Self = Self(0x84);
    /// 4.05 Method Not Allowed.
    pub const METHOD_NOT_ALLOWED: Self = Self(0x85);
    /// 5.00 Internal Server Error.
    pub const INTERNAL_SERVER_ERROR: Self = Self(0xA0);
    /// 5.01 Not Implemented.
    pub const NOT_IMPLEMENTED: Self = Self(0xA1);

    /// Wrap a raw status byte from the wire.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// The raw wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Response class (upper three bits), e.g. `2` for 2.05.
    #[must_use]
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Response detail (lower five bits), e.g. `5` for 2.05.
    #[must_use]
    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Whether this is a 2.xx success code.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({self})")
    }
}
