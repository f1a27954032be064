//! Core flag merging and reload types.

mod builder;
pub mod dump;
mod engine;
mod generation;
mod merger;
mod parser;

pub use builder::HotswapFlagsBuilder;
pub use dump::{CONFIG_FLAG, DUMP_FLAGS_FLAG, UPDATE_INTERVAL_FLAG, format_flags, write_flags};
pub use engine::{FlagChanges, HotswapFlags, ReloadResult};
pub use generation::GenerationTracker;
pub use merger::{ChangeSet, MergeMode, Merger};
pub use parser::{ConfigEntry, parse_file, parse_line, parse_reader};
