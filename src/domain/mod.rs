pub mod field;
pub mod record;
pub mod text;

pub use field::{Field, FieldKind, ORDERED_FIELDS};
pub use record::{FIXED_PRICE, HOURLY, JobRecord, MissingFieldSet};

/// Origin used to absolutize site-relative job URLs.
pub const UPWORK_ORIGIN: &str = "https://www.upwork.com";
