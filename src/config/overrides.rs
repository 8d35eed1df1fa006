//! Command-line overrides of the worker configuration (`-o key=val,...`)
//!
//! Overrides only ever change the value of an existing leaf. New keys and
//! changes of type category are rejected, and nothing is written unless the
//! whole override set applies cleanly.

use super::value::{ConfigValue, ValueKind};
use crate::errors::{Result, WorkerError};
use log::debug;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// A single parsed `dotted.key=value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub path: Vec<String>,
    pub value: String,
}

impl Override {
    pub fn key(&self) -> String {
        self.path.join(".")
    }
}

/// Parse `opt1=val1,opt2.sub=val2` into overrides
pub fn parse_overrides(spec: &str) -> Result<Vec<Override>> {
    spec.split(',')
        .map(|opt| {
            let parts: Vec<&str> = opt.split('=').collect();
            if parts.len() != 2 || parts[0].is_empty() {
                return Err(WorkerError::InvalidOverride(opt.to_string()));
            }
            Ok(Override {
                path: parts[0].split('.').map(str::to_string).collect(),
                value: parts[1].to_string(),
            })
        })
        .collect()
}

/// Apply a single override to a loaded tree
pub fn apply_override(tree: &mut ConfigValue, opt: &Override) -> Result<()> {
    let (leaf, parents) = opt
        .path
        .split_last()
        .ok_or_else(|| WorkerError::InvalidOverride(opt.key()))?;

    let root_kind = tree.kind().name();
    let mut node = tree
        .as_map_mut()
        .ok_or_else(|| WorkerError::ManualEditRequired {
            key: opt.key(),
            kind: root_kind,
        })?;

    for key in parents {
        let sub = node
            .get_mut(key)
            .ok_or_else(|| WorkerError::KeyNotFound(key.clone()))?;
        let found = sub.kind().name();
        node = sub.as_map_mut().ok_or_else(|| WorkerError::NotAMap {
            key: key.clone(),
            found,
        })?;
    }

    let prev = node
        .get_mut(leaf)
        .ok_or_else(|| WorkerError::UnknownOption(leaf.clone()))?;
    *prev = coerce(leaf, prev, &opt.value)?;

    debug!("override {} = {:?}", opt.key(), prev);
    Ok(())
}

/// Coerce `raw` into the category of the existing value
fn coerce(key: &str, prev: &ConfigValue, raw: &str) -> Result<ConfigValue> {
    match prev.kind() {
        ValueKind::String => Ok(ConfigValue::String(raw.to_string())),
        ValueKind::Number => raw
            .parse::<i64>()
            .map(ConfigValue::Integer)
            .map_err(|source| WorkerError::InvalidInteger {
                key: key.to_string(),
                value: raw.to_string(),
                source,
            }),
        ValueKind::Boolean => match raw.to_lowercase().as_str() {
            "true" => Ok(ConfigValue::Boolean(true)),
            "false" => Ok(ConfigValue::Boolean(false)),
            _ => Err(WorkerError::InvalidBoolean {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        },
        kind => Err(WorkerError::ManualEditRequired {
            key: key.to_string(),
            kind: kind.name(),
        }),
    }
}

/// Apply `spec` to the tree read from `base_path` and save the merged result
/// to `output_path`.
///
/// `base_path` is never modified. On error `output_path` is left untouched.
pub fn apply_overrides(base_path: &Path, output_path: &Path, spec: &str) -> Result<()> {
    let overrides = parse_overrides(spec)?;

    let content = fs::read_to_string(base_path)?;
    let mut tree = ConfigValue::from_json_str(&content)?;

    for opt in &overrides {
        apply_override(&mut tree, opt)?;
    }

    write_atomic(output_path, &tree.to_pretty_json()?)
}

/// Mode of the written overrides file, same as the base config
const OVERRIDES_MODE: u32 = 0o644;

/// Replace `path` with `content` via a rename from the same directory
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(OVERRIDES_MODE))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| WorkerError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BASE: &str = r#"{
        "worker_port": 5000,
        "server_mode": "lambda",
        "log_output": true,
        "limits": {"mem_mb": 50, "procs": 10},
        "features": {"import_cache": "tree", "reuse_cgroups": false},
        "packages": ["a"],
        "nothing": null
    }"#;

    fn setup() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let tmp = tempdir().unwrap();
        let base = tmp.path().join("config.json");
        let out = tmp.path().join("config.json.overrides");
        fs::write(&base, BASE).unwrap();
        (tmp, base, out)
    }

    fn read(path: &Path) -> ConfigValue {
        ConfigValue::from_json_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_overrides_splits_pairs() {
        let parsed = parse_overrides("worker_port=6000,limits.mem_mb=128").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].path, vec!["worker_port"]);
        assert_eq!(parsed[1].path, vec!["limits", "mem_mb"]);
        assert_eq!(parsed[1].value, "128");
        assert_eq!(parsed[1].key(), "limits.mem_mb");
    }

    #[test]
    fn test_parse_overrides_rejects_malformed_pairs() {
        for spec in ["worker_port", "a=b=c", "=1", "a=1,"] {
            assert!(
                matches!(parse_overrides(spec), Err(WorkerError::InvalidOverride(_))),
                "{spec} should be rejected"
            );
        }
    }

    #[test]
    fn test_apply_overrides_coerces_every_scalar_kind() {
        let (_tmp, base, out) = setup();
        apply_overrides(
            &base,
            &out,
            "worker_port=6000,server_mode=sock,log_output=FALSE,limits.mem_mb=128,features.reuse_cgroups=True",
        )
        .unwrap();

        let tree = read(&out);
        assert_eq!(tree.get_path("worker_port"), Some(&ConfigValue::Integer(6000)));
        assert_eq!(
            tree.get_path("server_mode"),
            Some(&ConfigValue::String("sock".to_string()))
        );
        assert_eq!(tree.get_path("log_output"), Some(&ConfigValue::Boolean(false)));
        assert_eq!(tree.get_path("limits.mem_mb"), Some(&ConfigValue::Integer(128)));
        assert_eq!(tree.get_path("limits.procs"), Some(&ConfigValue::Integer(10)));
        assert_eq!(
            tree.get_path("features.reuse_cgroups"),
            Some(&ConfigValue::Boolean(true))
        );
    }

    #[test]
    fn test_base_file_is_left_untouched() {
        let (_tmp, base, out) = setup();
        apply_overrides(&base, &out, "worker_port=6000").unwrap();
        assert_eq!(fs::read_to_string(&base).unwrap(), BASE);
    }

    #[test]
    fn test_missing_keys_fail_without_writing_output() {
        let (_tmp, base, out) = setup();

        let err = apply_overrides(&base, &out, "nope=1").unwrap_err();
        assert!(matches!(err, WorkerError::UnknownOption(ref k) if k == "nope"));

        let err = apply_overrides(&base, &out, "missing.mem_mb=1").unwrap_err();
        assert!(matches!(err, WorkerError::KeyNotFound(ref k) if k == "missing"));

        let err = apply_overrides(&base, &out, "limits.missing=1").unwrap_err();
        assert!(matches!(err, WorkerError::UnknownOption(ref k) if k == "missing"));

        assert!(!out.exists());
    }

    #[test]
    fn test_intermediate_scalar_is_not_a_map() {
        let (_tmp, base, out) = setup();
        let err = apply_overrides(&base, &out, "worker_port.inner=1").unwrap_err();
        match err {
            WorkerError::NotAMap { key, found } => {
                assert_eq!(key, "worker_port");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn test_wrong_category_is_rejected_and_value_kept() {
        let (_tmp, base, out) = setup();

        assert!(matches!(
            apply_overrides(&base, &out, "worker_port=abc"),
            Err(WorkerError::InvalidInteger { .. })
        ));
        assert!(matches!(
            apply_overrides(&base, &out, "log_output=yes"),
            Err(WorkerError::InvalidBoolean { .. })
        ));
        assert!(!out.exists());

        let tree = read(&base);
        assert_eq!(tree.get_path("worker_port"), Some(&ConfigValue::Integer(5000)));
        assert_eq!(tree.get_path("log_output"), Some(&ConfigValue::Boolean(true)));
    }

    #[test]
    fn test_non_scalar_leaves_require_manual_edit() {
        let (_tmp, base, out) = setup();
        for (spec, kind) in [("limits=1", "map"), ("packages=b", "array"), ("nothing=x", "null")] {
            match apply_overrides(&base, &out, spec).unwrap_err() {
                WorkerError::ManualEditRequired { kind: found, .. } => assert_eq!(found, kind),
                other => panic!("unexpected error for {spec}: {other}"),
            }
        }
        assert!(!out.exists());
    }

    #[test]
    fn test_one_bad_override_aborts_the_whole_set() {
        let (_tmp, base, out) = setup();
        assert!(apply_overrides(&base, &out, "worker_port=6000,log_output=maybe").is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_reapplying_same_spec_is_byte_identical() {
        let (_tmp, base, out) = setup();
        let spec = "worker_port=6000,limits.procs=4";

        apply_overrides(&base, &out, spec).unwrap();
        let first = fs::read(&out).unwrap();
        apply_overrides(&base, &out, spec).unwrap();
        let second = fs::read(&out).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out.json");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_overrides_file_is_world_readable() {
        let (_tmp, base, out) = setup();
        apply_overrides(&base, &out, "worker_port=6000").unwrap();

        let mode = fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, OVERRIDES_MODE);
    }

    #[test]
    fn test_non_map_root_reports_its_own_kind() {
        let mut tree = ConfigValue::from_json_str("[1, 2]").unwrap();
        let opt = Override {
            path: vec!["worker_port".to_string()],
            value: "1".to_string(),
        };
        match apply_override(&mut tree, &opt) {
            Err(WorkerError::ManualEditRequired { kind, .. }) => assert_eq!(kind, "array"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
