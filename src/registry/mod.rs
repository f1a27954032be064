//! Flag registry abstraction and the in-memory implementation.

mod flag_registry;
mod flag_set;
mod value;

pub use flag_registry::{FlagRecord, FlagRegistry};
pub use flag_set::FlagSet;
pub use value::{FlagKind, format_duration, parse_bool, parse_duration};
