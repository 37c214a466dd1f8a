//! Node Module
//!
//! Raw registry records, the flat descriptor schema, and the normalize /
//! validate pair that turns one into the other.

pub mod descriptor;
pub mod normalize;
pub mod record;
pub mod validate;

pub use descriptor::{CloudPlacement, NodeDescriptor};
pub use normalize::normalize;
pub use record::{RawNodeRecord, RunList, RunListItem};
pub use validate::{is_present, validate};
