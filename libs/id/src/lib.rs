//! # hostpool-id
//!
//! Typed identifiers for hostpool entities.
//!
//! Engine-assigned IDs use a prefixed format: `{prefix}_{ulid}`.
//!
//! - `srv_01HV4Z2WQXKJNM8GPQY6VBKC3D` (server)
//! - `svc_01HV4Z3MXNKPQR9HSTZ7WCLD4E` (service)
//! - `pkg_01HV4Z4NYPLTRS0JTUA8XDME5F` (service package)
//! - `usr_01HV4Z5PZQMUST1KVVB9YENF6G` (user)
//!
//! The prefix makes a stray ID of the wrong kind fail to parse, and the ULID
//! keeps IDs ordered by creation time. Server selection relies on that order.
//!
//! Invoice IDs are assigned by the billing provider and are kept as opaque
//! strings, see [`InvoiceId`].

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
