// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! SDK resolver discovery.
//!
//! Resolvers live under a root directory with the layout
//! `root/<Name>/<Name>.<ext>`. When a manifest `root/<Name>/<Name>.xml`
//! exists it takes precedence: its `<Path>` element names the artifact
//! (relative paths resolve against the manifest's directory) and an
//! optional `<ResolvableSdkPattern>` regex restricts which SDK names the
//! resolver handles.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Discovery failures. The three manifest-shaped kinds are distinct so
/// callers can report them differently.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A resolver directory has neither an artifact nor a manifest.
    #[error("resolver {name}: no {name}.{ext} artifact and no {name}.xml manifest under {dir}")]
    MissingArtifact {
        /// Resolver name (the directory name).
        name: String,
        /// Artifact extension looked for.
        ext: String,
        /// The resolver directory.
        dir: PathBuf,
    },
    /// A manifest exists but cannot be parsed, or lacks its `<Path>`.
    #[error("resolver manifest {path} is malformed: {reason}")]
    MalformedManifest {
        /// Manifest path.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
    /// A manifest's `<Path>` points at a file that does not exist.
    #[error("resolver manifest {path} points at missing artifact {target}")]
    DanglingManifestPath {
        /// Manifest path.
        path: PathBuf,
        /// The nonexistent target.
        target: PathBuf,
    },
    /// The root or a resolver directory could not be read.
    #[error("i/o error under {path}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// One discovered resolver.
#[derive(Debug)]
pub struct SdkResolverLocation {
    /// Resolver name (the directory name).
    pub name: String,
    /// Absolute-ish path to the resolver artifact.
    pub path: PathBuf,
    /// Optional pattern restricting which SDK names this resolver serves.
    pub resolvable_sdk_pattern: Option<Regex>,
}

#[derive(Debug, Deserialize)]
struct ResolverManifest {
    #[serde(rename = "Path")]
    path: Option<String>,
    #[serde(rename = "ResolvableSdkPattern")]
    resolvable_sdk_pattern: Option<String>,
}

/// Scans `root` for resolver artifacts with extension `ext`.
///
/// Directories are visited in name order, so discovery is deterministic
/// for a given tree. Non-directory entries under the root are ignored.
pub fn find_resolvers(root: &Path, ext: &str) -> Result<Vec<SdkResolverLocation>, DiscoveryError> {
    let mut names: Vec<String> = Vec::new();
    let entries = std::fs::read_dir(root).map_err(|source| DiscoveryError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let is_dir = entry
            .file_type()
            .map_err(|source| DiscoveryError::Io {
                path: entry.path(),
                source,
            })?
            .is_dir();
        if is_dir {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
    }
    names.sort();

    let mut locations = Vec::with_capacity(names.len());
    for name in names {
        let dir = root.join(&name);
        let manifest_path = dir.join(format!("{name}.xml"));
        if manifest_path.is_file() {
            locations.push(load_manifest(&name, &dir, &manifest_path)?);
            continue;
        }
        let artifact = dir.join(format!("{name}.{ext}"));
        if artifact.is_file() {
            debug!(name = %name, path = %artifact.display(), "found resolver artifact");
            locations.push(SdkResolverLocation {
                name,
                path: artifact,
                resolvable_sdk_pattern: None,
            });
            continue;
        }
        return Err(DiscoveryError::MissingArtifact {
            name,
            ext: ext.to_owned(),
            dir,
        });
    }
    Ok(locations)
}

fn load_manifest(
    name: &str,
    dir: &Path,
    manifest_path: &Path,
) -> Result<SdkResolverLocation, DiscoveryError> {
    let text =
        std::fs::read_to_string(manifest_path).map_err(|source| DiscoveryError::Io {
            path: manifest_path.to_path_buf(),
            source,
        })?;
    let manifest: ResolverManifest =
        quick_xml::de::from_str(&text).map_err(|e| DiscoveryError::MalformedManifest {
            path: manifest_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let Some(raw_path) = manifest.path.filter(|p| !p.trim().is_empty()) else {
        return Err(DiscoveryError::MalformedManifest {
            path: manifest_path.to_path_buf(),
            reason: "missing <Path> element".to_owned(),
        });
    };
    let target = {
        let candidate = PathBuf::from(raw_path.trim());
        if candidate.is_absolute() {
            candidate
        } else {
            dir.join(candidate)
        }
    };
    if !target.is_file() {
        return Err(DiscoveryError::DanglingManifestPath {
            path: manifest_path.to_path_buf(),
            target,
        });
    }

    let resolvable_sdk_pattern = match manifest.resolvable_sdk_pattern {
        Some(pattern) => Some(Regex::new(&pattern).map_err(|e| {
            DiscoveryError::MalformedManifest {
                path: manifest_path.to_path_buf(),
                reason: format!("bad ResolvableSdkPattern: {e}"),
            }
        })?),
        None => None,
    };

    debug!(name = %name, path = %target.display(), "found resolver via manifest");
    Ok(SdkResolverLocation {
        name: name.to_owned(),
        path: target,
        resolvable_sdk_pattern,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn finds_plain_artifacts_in_name_order() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("Beta/Beta.dll"), "");
        write(&root.path().join("Alpha/Alpha.dll"), "");
        let found = find_resolvers(root.path(), "dll").unwrap();
        let names: Vec<&str> = found.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
    }

    #[test]
    fn manifest_path_takes_precedence() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("Res/impl/real.dll"), "");
        write(
            &root.path().join("Res/Res.xml"),
            "<SdkResolver><Path>impl/real.dll</Path></SdkResolver>",
        );
        // An adjacent artifact is ignored once a manifest exists.
        write(&root.path().join("Res/Res.dll"), "");
        let found = find_resolvers(root.path(), "dll").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("impl/real.dll"));
    }

    #[test]
    fn manifest_pattern_parses() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("Res/real.dll"), "");
        write(
            &root.path().join("Res/Res.xml"),
            "<SdkResolver><Path>real.dll</Path><ResolvableSdkPattern>^MySdk\\..*</ResolvableSdkPattern></SdkResolver>",
        );
        let found = find_resolvers(root.path(), "dll").unwrap();
        let pattern = found[0].resolvable_sdk_pattern.as_ref().unwrap();
        assert!(pattern.is_match("MySdk.Web"));
        assert!(!pattern.is_match("OtherSdk"));
    }

    #[test]
    fn missing_artifact_malformed_and_dangling_are_distinct() {
        let empty = tempfile::tempdir().unwrap();
        fs::create_dir_all(empty.path().join("Bare")).unwrap();
        assert!(matches!(
            find_resolvers(empty.path(), "dll").unwrap_err(),
            DiscoveryError::MissingArtifact { .. }
        ));

        let malformed = tempfile::tempdir().unwrap();
        write(&malformed.path().join("Res/Res.xml"), "<SdkResolver><");
        assert!(matches!(
            find_resolvers(malformed.path(), "dll").unwrap_err(),
            DiscoveryError::MalformedManifest { .. }
        ));

        let dangling = tempfile::tempdir().unwrap();
        write(
            &dangling.path().join("Res/Res.xml"),
            "<SdkResolver><Path>nope.dll</Path></SdkResolver>",
        );
        assert!(matches!(
            find_resolvers(dangling.path(), "dll").unwrap_err(),
            DiscoveryError::DanglingManifestPath { .. }
        ));
    }
}
