//! Run namespaces for node storage
//!
//! Every experiment value runs against its own namespace, so no two runs can
//! read or write each other's keys, certificates or shares. Isolation comes
//! from naming alone; nothing is locked.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, EnumAccess, MapAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::ca_file_backend::{reset_dir, FileStore};
use crate::ca_interface::{Architecture, NodeId, NodeStore, StorageError};
use crate::ca_memory_backend::MemoryStore;

/// Where node stores live
///
/// In YAML, `memory`, a tagged `!directory <path>`, a `directory: <path>` map
/// or a bare path (any string other than `memory`) are all accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Fresh in-memory stores per run
    #[default]
    Memory,
    /// One directory tree per run below this base path
    Directory(PathBuf),
}

struct StorageModeVisitor;

impl<'de> Visitor<'de> for StorageModeVisitor {
    type Value = StorageMode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("`memory`, a directory path, or `directory: <path>`")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<StorageMode, E> {
        match v {
            "memory" => Ok(StorageMode::Memory),
            "" => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            path => Ok(StorageMode::Directory(PathBuf::from(path))),
        }
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<StorageMode, A::Error> {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let mode = match key.as_str() {
            "directory" => StorageMode::Directory(map.next_value()?),
            "memory" => {
                map.next_value::<de::IgnoredAny>()?;
                StorageMode::Memory
            }
            other => return Err(de::Error::unknown_variant(other, &["memory", "directory"])),
        };
        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom("storage mode takes a single entry"));
        }
        Ok(mode)
    }

    // YAML tags (`!directory out/runs`) arrive as enums
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<StorageMode, A::Error> {
        let (variant, access): (String, _) = data.variant()?;
        match variant.as_str() {
            "memory" => {
                access.unit_variant()?;
                Ok(StorageMode::Memory)
            }
            "directory" => Ok(StorageMode::Directory(access.newtype_variant()?)),
            other => Err(de::Error::unknown_variant(other, &["memory", "directory"])),
        }
    }
}

impl<'de> Deserialize<'de> for StorageMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StorageModeVisitor)
    }
}

impl StorageMode {
    /// Create (or clear) the namespace for `run_id`
    pub fn namespace(&self, run_id: &str) -> Result<RunNamespace, StorageError> {
        let run_id = sanitize(run_id);
        let root = match self {
            StorageMode::Memory => None,
            StorageMode::Directory(base) => {
                let root = base.join(format!("run_{}", run_id));
                reset_dir(&root)?;
                Some(root)
            }
        };
        log::debug!("opened storage namespace run_{} ({:?})", run_id, root);
        Ok(RunNamespace { run_id, root })
    }
}

fn sanitize(run_id: &str) -> String {
    run_id
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Storage namespace of a single experiment run
#[derive(Debug, Clone)]
pub struct RunNamespace {
    run_id: String,
    root: Option<PathBuf>,
}

impl RunNamespace {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory of this run, `None` for in-memory runs
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Store of one node of an architecture
    pub fn open_node(
        &self,
        architecture: Architecture,
        node: NodeId,
    ) -> Result<Box<dyn NodeStore>, StorageError> {
        self.open(architecture, &format!("node_{}", node))
    }

    /// Shared public area of the distributed CA (root certificate, public key)
    pub fn open_authority(&self) -> Result<Box<dyn NodeStore>, StorageError> {
        self.open(Architecture::Distributed, "authority")
    }

    fn open(&self, architecture: Architecture, area: &str) -> Result<Box<dyn NodeStore>, StorageError> {
        match &self.root {
            None => Ok(Box::new(MemoryStore::new())),
            Some(root) => Ok(Box::new(FileStore::open(
                root.join(architecture.as_str()).join(area),
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_namespaces_are_isolated() {
        let ns = StorageMode::Memory.namespace("30_single").unwrap();
        assert!(ns.root().is_none());

        let mut a = ns.open_node(Architecture::Centralized, 0).unwrap();
        let b = ns.open_node(Architecture::Centralized, 0).unwrap();
        a.put("root_key.pem", b"k").unwrap();
        assert_eq!(b.get("root_key.pem").unwrap(), None);
    }

    #[test]
    fn test_directory_layout() {
        let dir = TempDir::new().unwrap();
        let mode = StorageMode::Directory(dir.path().to_path_buf());
        let ns = mode.namespace("30_M_5").unwrap();

        let mut node = ns.open_node(Architecture::Distributed, 3).unwrap();
        node.put("share.json", b"{}").unwrap();
        let mut authority = ns.open_authority().unwrap();
        authority.put("root_cert.pem", b"c").unwrap();

        let run = dir.path().join("run_30_M_5");
        assert!(run.join("distributed").join("node_3").join("share.json").is_file());
        assert!(run.join("distributed").join("authority").join("root_cert.pem").is_file());
    }

    #[test]
    fn test_namespace_is_cleared_on_reopen() {
        let dir = TempDir::new().unwrap();
        let mode = StorageMode::Directory(dir.path().to_path_buf());

        let ns = mode.namespace("run a/b").unwrap();
        assert_eq!(ns.run_id(), "run_a_b");
        let mut node = ns.open_node(Architecture::Centralized, 0).unwrap();
        node.put("root_key.pem", b"old").unwrap();

        let ns = mode.namespace("run a/b").unwrap();
        let node = ns.open_node(Architecture::Centralized, 0).unwrap();
        assert_eq!(node.get("root_key.pem").unwrap(), None);
    }

    #[test]
    fn test_storage_mode_yaml() {
        let mode: StorageMode = serde_yaml::from_str("memory").unwrap();
        assert_eq!(mode, StorageMode::Memory);

        let expected = StorageMode::Directory(PathBuf::from("out/runs"));
        for text in ["!directory out/runs", "directory: out/runs", "out/runs"] {
            let mode: StorageMode = serde_yaml::from_str(text).unwrap();
            assert_eq!(mode, expected, "{}", text);
        }

        assert!(serde_yaml::from_str::<StorageMode>("cache: out").is_err());
        assert!(serde_yaml::from_str::<StorageMode>("''").is_err());
    }

    #[test]
    fn test_storage_mode_yaml_round_trip() {
        let mode = StorageMode::Directory(PathBuf::from("platform_verification"));
        let text = serde_yaml::to_string(&mode).unwrap();
        assert_eq!(serde_yaml::from_str::<StorageMode>(&text).unwrap(), mode);

        let text = serde_yaml::to_string(&StorageMode::Memory).unwrap();
        assert_eq!(serde_yaml::from_str::<StorageMode>(&text).unwrap(), StorageMode::Memory);
    }
}
