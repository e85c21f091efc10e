//! Global mix database name tables
//!
//! A global mix database is a tab-separated text table whose first column is
//! a filename; any further columns (descriptions and the like) are ignored.
//! Names are hashed with the target generation's identifier hash to build a
//! lookup table for archives that carry no local database.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use ccmix_crypto::FileIdHash;
use tracing::debug;

use super::error::{MixError, MixResult};

/// Read a name table, mapping each name's identifier to the name
///
/// Blank lines are skipped. A field wrapped in double quotes is unquoted,
/// with `""` standing for a literal quote. Later lines win when two names
/// share an identifier.
pub fn read_gmd<R: BufRead>(reader: R, hash: FileIdHash) -> MixResult<HashMap<u32, String>> {
    let mut names = HashMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => MixError::InvalidGmd {
                line: line_no,
                reason: "not valid UTF-8".to_string(),
            },
            _ => MixError::Io(e),
        })?;

        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let field = line.split('\t').next().unwrap_or_default();
        let name = unquote(field).ok_or_else(|| MixError::InvalidGmd {
            line: line_no,
            reason: format!("unterminated quoted field {field:?}"),
        })?;
        if name.is_empty() {
            return Err(MixError::InvalidGmd {
                line: line_no,
                reason: "empty filename".to_string(),
            });
        }

        names.insert(hash.hash(&name), name);
    }

    debug!("Read {} names from global mix database", names.len());
    Ok(names)
}

/// Load a name table from a file
pub fn load_gmd(path: impl AsRef<Path>, hash: FileIdHash) -> MixResult<HashMap<u32, String>> {
    let file = File::open(path.as_ref())?;
    read_gmd(BufReader::new(file), hash)
}

fn unquote(field: &str) -> Option<String> {
    match field.strip_prefix('"') {
        None => Some(field.to_string()),
        Some(rest) => rest.strip_suffix('"').map(|inner| inner.replace("\"\"", "\"")),
    }
}
