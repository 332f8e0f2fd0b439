//! Component initialization parameter loading (spec.md §4.4, SPEC_FULL.md
//! §0 "Configuration").
//!
//! `spec.md` types a component's initialization parameters as a `Value`
//! map; this module supplies the on-disk side of that — a TOML table keyed
//! by component name, parsed the way teacher's `PluginConfig` parses a TOML
//! table into a typed struct, except the destination here is the dynamic
//! `Value` tree itself rather than a `serde` struct, since component params
//! are schema-free by design.

use crate::error::Error;
use crate::value::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Parses a TOML document into a table mapping component name to its
/// initialization parameters (a `Value::map()`).
///
/// ```toml
/// [my-source]
/// inputs = ["a.ctf", "b.ctf"]
///
/// [my-sink]
/// address = "127.0.0.1:9000"
/// ```
pub fn load_component_params(toml_text: &str) -> Result<BTreeMap<String, Value>, Error> {
    let doc: toml::Value = toml::from_str(toml_text)?;
    let table = match doc {
        toml::Value::Table(t) => t,
        _ => return Err(Error::other("component params document must be a TOML table")),
    };
    let mut out = BTreeMap::new();
    for (name, params) in table {
        out.insert(name, Value::from_toml(&params));
    }
    Ok(out)
}

pub fn load_component_params_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, Value>, Error> {
    let text = std::fs::read_to_string(path)?;
    load_component_params(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"
[fs-source]
inputs = ["a.ctf", "b.ctf"]
clock-class-offset-ns = -1

[net-sink]
address = "127.0.0.1:9000"
retry-duration-us = 100
"#;

    #[test]
    fn parses_per_component_tables_into_value_maps() {
        let params = load_component_params(DOC).unwrap();
        assert_eq!(params.len(), 2);

        let fs_source = &params["fs-source"];
        assert_eq!(fs_source.map_get("clock-class-offset-ns").unwrap().as_signed_integer(), Some(-1));
        let inputs = fs_source.map_get("inputs").unwrap();
        assert_eq!(inputs.array_len(), Some(2));
        assert_eq!(inputs.array_get(0).unwrap().as_string().unwrap(), "a.ctf");

        let net_sink = &params["net-sink"];
        assert_eq!(net_sink.map_get("address").unwrap().as_string().unwrap(), "127.0.0.1:9000");
    }

    #[test]
    fn rejects_non_table_top_level() {
        let err = load_component_params("just a string").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(&path, DOC).unwrap();
        let params = load_component_params_file(&path).unwrap();
        assert_eq!(params.len(), 2);
    }
}
