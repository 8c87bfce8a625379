//! Stable node identifiers
//!
//! Every node is addressed by a string of the form
//! `<project>/<path>#<kind>:<name>`. The path uses forward slashes; `#`,
//! `/`, and `:` are forbidden in the name segment. Synthetic nodes
//! (packages, externals) use an empty path: `proj//#package:react`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::NodeKind;

/// Parsed form of the stable node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentifier {
    pub project: String,
    pub path: String,
    pub kind: NodeKind,
    pub name: String,
}

impl NodeIdentifier {
    pub fn new(
        project: impl Into<String>,
        path: impl Into<String>,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.contains(['#', '/', ':']) {
            return Err(Error::InvalidIdentifier {
                input: name,
                reason: "name may not contain '#', '/' or ':'".into(),
            });
        }
        Ok(NodeIdentifier {
            project: project.into(),
            path: path.into(),
            kind,
            name,
        })
    }

    /// Address of a file node: `proj/src/a.ts#file:a.ts`. Forbidden
    /// characters in the basename are replaced, so this cannot fail for a
    /// real path.
    pub fn file(project: &str, path: &str) -> Result<Self, Error> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let name = name.replace(['#', ':'], "-");
        Self::new(project, path, NodeKind::File, name)
    }

    /// Address of a synthetic package node: `proj//#package:react`.
    pub fn package(project: &str, library: &str) -> Result<Self, Error> {
        // Scoped names keep their '@scope/name' spelling; '/' is only
        // forbidden in non-package names, so store it escaped.
        Self::new(project, "", NodeKind::Package, library.replace('/', "__"))
    }

    /// Address of a declaration inside a file.
    pub fn member(project: &str, path: &str, kind: NodeKind, name: &str) -> Result<Self, Error> {
        Self::new(project, path, kind, name)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Synthetic nodes have an empty path and render with a double
        // slash: `proj//#package:react`.
        if self.path.is_empty() {
            write!(f, "{}//#{}:{}", self.project, self.kind, self.name)
        } else {
            write!(
                f,
                "{}/{}#{}:{}",
                self.project, self.path, self.kind, self.name
            )
        }
    }
}

impl FromStr for NodeIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The name segment cannot contain '#', so the last '#' separates
        // the locator from the kind:name suffix.
        let (locator, suffix) = s.rsplit_once('#').ok_or_else(|| Error::InvalidIdentifier {
            input: s.into(),
            reason: "missing '#'".into(),
        })?;
        let (kind, name) = suffix.split_once(':').ok_or_else(|| Error::InvalidIdentifier {
            input: s.into(),
            reason: "missing ':' after kind".into(),
        })?;
        let kind = NodeKind::parse(kind).ok_or_else(|| Error::InvalidIdentifier {
            input: s.into(),
            reason: format!("unknown kind '{kind}'"),
        })?;
        let (project, path) = locator.split_once('/').ok_or_else(|| Error::InvalidIdentifier {
            input: s.into(),
            reason: "missing '/' after project".into(),
        })?;
        if project.is_empty() {
            return Err(Error::InvalidIdentifier {
                input: s.into(),
                reason: "empty project".into(),
            });
        }
        // The synthetic double-slash form leaves a bare '/' behind after
        // the project is split off; paths are repository-relative and
        // never a lone slash themselves.
        let path = if path == "/" { "" } else { path };
        NodeIdentifier::new(project, path, kind, name)
    }
}

impl Serialize for NodeIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let id = NodeIdentifier::new("proj", "src/UserService.ts", NodeKind::Class, "UserService")
            .unwrap();
        let s = id.to_string();
        assert_eq!(s, "proj/src/UserService.ts#class:UserService");
        assert_eq!(s.parse::<NodeIdentifier>().unwrap(), id);
    }

    #[test]
    fn package_identifier_has_empty_path() {
        let id = NodeIdentifier::package("proj", "react").unwrap();
        assert_eq!(id.to_string(), "proj//#package:react");
        let parsed: NodeIdentifier = "proj//#package:react".parse().unwrap();
        assert_eq!(parsed.path, "");
        assert_eq!(parsed.kind, NodeKind::Package);
    }

    #[test]
    fn rejects_forbidden_characters_in_name() {
        assert!(NodeIdentifier::new("proj", "a.ts", NodeKind::Function, "a:b").is_err());
        assert!(NodeIdentifier::new("proj", "a.ts", NodeKind::Function, "a/b").is_err());
        assert!(NodeIdentifier::new("proj", "a.ts", NodeKind::Function, "a#b").is_err());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("no-hash".parse::<NodeIdentifier>().is_err());
        assert!("proj/a.ts#file".parse::<NodeIdentifier>().is_err());
        assert!("proj/a.ts#widget:X".parse::<NodeIdentifier>().is_err());
        assert!("/a.ts#file:a.ts".parse::<NodeIdentifier>().is_err());
    }

    #[test]
    fn path_may_contain_slashes() {
        let parsed: NodeIdentifier = "proj/src/helpers/Helper.ts#file:Helper.ts".parse().unwrap();
        assert_eq!(parsed.project, "proj");
        assert_eq!(parsed.path, "src/helpers/Helper.ts");
        assert_eq!(parsed.name, "Helper.ts");
    }
}
