//! Embedded dictionary engine serving ordered lookups over large,
//! read-mostly keyword → description collections.
//!
//! Three backends share one collation:
//! - [`dict::StaticDict`] reads the delimiter-framed static file format,
//!   optionally inside a dictzip container and optionally SHCM-compressed.
//! - [`dict::SqlDict`] is an editable SQLite store whose key order is the
//!   same collation, registered as a comparator callback.
//! - [`dict::HybridDict`] overlays a dynamic dictionary on a static one,
//!   presenting a merged sorted view while all edits go to the dynamic side.
//!
//! [`builder`] is the offline counterpart: it sorts a parsed entry list,
//! computes the sparse position index and writes the static format.

pub mod block;
pub mod builder;
pub mod collation;
pub mod dict;
pub mod escape;
pub mod shcm;
