//! Declared resource files.
//!
//! ```json
//! {
//!   "params": { "vg": "vg0" },
//!   "resources": [
//!     { "id": "data", "kind": "lvm.logicalvolume",
//!       "config": { "group": "{{param \"vg\"}}", "name": "data", "size": "10G" } }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceFile {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ResourceFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid resource file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: ResourceFile = serde_json::from_str(raw)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for decl in &self.resources {
            if decl.id.is_empty() {
                bail!("resource of kind '{}' has an empty id", decl.kind);
            }
            if !seen.insert(decl.id.as_str()) {
                bail!("duplicate resource id '{}'", decl.id);
            }
        }
        Ok(())
    }

    /// File params overlaid with `overrides`.
    pub fn params_with(&self, overrides: &[(String, String)]) -> BTreeMap<String, String> {
        let mut params = self.params.clone();
        params.extend(overrides.iter().cloned());
        params
    }
}

/// Parse a `key=value` command-line parameter.
pub fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "params": { "vg": "vg0" },
        "resources": [
            { "id": "data", "kind": "lvm.logicalvolume",
              "config": { "group": "{{param \"vg\"}}", "name": "data", "size": "10G" } }
        ]
    }"#;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = ResourceFile::load(file.path()).unwrap();
        assert_eq!(loaded.params["vg"], "vg0");
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.resources[0].kind, "lvm.logicalvolume");
        assert_eq!(loaded.resources[0].config["size"], "10G");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ResourceFile::load(Path::new("/nonexistent/hostconv.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let raw = r#"{ "resources": [
            { "id": "a", "kind": "lvm.logicalvolume" },
            { "id": "a", "kind": "lvm.logicalvolume" }
        ] }"#;
        let err = ResourceFile::parse(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate resource id 'a'"));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        assert!(ResourceFile::parse(r#"{ "resources": [], "modules": [] }"#).is_err());
    }

    #[test]
    fn test_params_with_overrides() {
        let file = ResourceFile::parse(SAMPLE).unwrap();
        let params = file.params_with(&[
            ("vg".to_string(), "vg1".to_string()),
            ("extra".to_string(), "x".to_string()),
        ]);
        assert_eq!(params["vg"], "vg1");
        assert_eq!(params["extra"], "x");
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("vg=vg0").unwrap(),
            ("vg".to_string(), "vg0".to_string())
        );
        assert_eq!(
            parse_param("size=").unwrap(),
            ("size".to_string(), String::new())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
