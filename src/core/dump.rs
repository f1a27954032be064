//! Writing the current flag state in config file format.

use crate::registry::FlagRegistry;
use std::io::{self, Write};

/// Name of the flag holding the config file path.
pub const CONFIG_FLAG: &str = "config";

/// Name of the flag holding the periodic reload interval.
pub const UPDATE_INTERVAL_FLAG: &str = "configUpdateInterval";

/// Name of the flag requesting a dump at startup.
pub const DUMP_FLAGS_FLAG: &str = "dumpflags";

/// Render every flag except `config` and `dumpflags` as a config file.
///
/// Each flag gets its description as a comment followed by a `name value`
/// line. Feeding the output back as a config file reproduces the same state.
/// Flags holding an empty value only get the comment, since a bare key
/// would read back as `true`.
pub fn format_flags(registry: &dyn FlagRegistry) -> String {
    let mut out = String::new();
    for record in registry.enumerate_all() {
        if record.name == CONFIG_FLAG || record.name == DUMP_FLAGS_FLAG {
            continue;
        }
        let description = record.description.replace("\r\n", "\n").replace('\n', "\n#\t");
        out.push_str(&format!("# {}\n", description));
        if !record.current_value.is_empty() {
            out.push_str(&format!("{} {}\n", record.name, record.current_value));
        } else if !record.default_value.is_empty() {
            tracing::warn!(
                flag = %record.name,
                default = %record.default_value,
                "empty flag value cannot be dumped; reading the dump back restores the default"
            );
        }
    }
    out
}

/// Write [`format_flags`] output to `writer`.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_flags<W: Write>(registry: &dyn FlagRegistry, mut writer: W) -> io::Result<()> {
    writer.write_all(format_flags(registry).as_bytes())?;
    writer.flush()
}
