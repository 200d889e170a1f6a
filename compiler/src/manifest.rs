// manifest.rs — External channel manifest
//
// A JSON list of the channels a program may use without declaring them:
// `[{"name": "ox_pt_1", "key": 12, "type": "f64"}, ...]`. Types use source
// spelling; a `chan T` spelling and a bare `T` both declare a channel of
// `T` values.
//
// Preconditions: none.
// Postconditions: every entry becomes a `Channel` symbol in a `MapResolver`.
// Failure modes: malformed JSON, unknown type names, duplicate names →
//                `CliError`.
// Side effects: `load` reads the file.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CliError;
use crate::symbol::MapResolver;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub name: String,
    pub key: u32,
    #[serde(rename = "type")]
    pub ty: String,
}

pub fn load(path: &Path) -> Result<MapResolver, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<ChannelEntry> =
        serde_json::from_str(&text).map_err(|source| CliError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
    resolver(&entries)
}

pub fn resolver(entries: &[ChannelEntry]) -> Result<MapResolver, CliError> {
    let mut seen = HashSet::new();
    let mut resolver = MapResolver::new();
    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            return Err(CliError::DuplicateChannel {
                name: entry.name.clone(),
            });
        }
        let ty = Type::parse(&entry.ty).ok_or_else(|| CliError::ChannelType {
            name: entry.name.clone(),
            ty: entry.ty.clone(),
        })?;
        resolver = resolver.channel(&entry.name, entry.key, ty.into_inner());
    }
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Kind, Resolver};

    fn entries(json: &str) -> Vec<ChannelEntry> {
        serde_json::from_str(json).expect("json")
    }

    #[test]
    fn entries_become_channels() {
        let resolver = resolver(&entries(
            r#"[{"name": "ox_pt_1", "key": 12, "type": "f64"},
                {"name": "cmd", "key": 13, "type": "chan u8"}]"#,
        ))
        .expect("resolver");
        let pt = resolver.resolve("ox_pt_1").expect("ox_pt_1");
        assert_eq!(pt.kind, Kind::Channel);
        assert_eq!(pt.id, Some(12));
        assert_eq!(pt.ty, Type::chan(Type::F64));
        assert_eq!(resolver.resolve("cmd").map(|s| s.ty), Some(Type::chan(Type::U8)));
    }

    #[test]
    fn unknown_type() {
        let err = resolver(&entries(r#"[{"name": "x", "key": 1, "type": "f128"}]"#)).unwrap_err();
        assert_eq!(err.to_string(), "channel 'x': unknown type 'f128'");
    }

    #[test]
    fn duplicate_names() {
        let err = resolver(&entries(
            r#"[{"name": "x", "key": 1, "type": "f64"}, {"name": "x", "key": 2, "type": "f64"}]"#,
        ))
        .unwrap_err();
        assert!(matches!(err, CliError::DuplicateChannel { .. }));
    }
}
