//! MDL (OPC) text-container reading.
//!
//! An MDL file is a MathWorks OPC text package: a header followed by a
//! sequence of parts, each introduced by a `__MWOPC_PART_BEGIN__ <path>`
//! line. Parts are kept verbatim and in encounter order so that the
//! sidecar can reproduce the original file byte-for-byte.

use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;

use crate::error::TranslateError;

pub const PACKAGE_BEGIN: &str = "__MWOPC_PACKAGE_BEGIN__";
pub const PART_BEGIN: &str = "__MWOPC_PART_BEGIN__";

#[derive(Debug, Default)]
pub struct OpcExtractor {
    parts: IndexMap<String, String>,
}

impl OpcExtractor {
    /// Read and split an MDL file from disk.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path.as_std_path())
            .with_context(|| format!("Failed to read {}", path))?;
        let extractor = Self::parse(&content)
            .with_context(|| format!("Failed to parse MDL container {}", path))?;
        Ok(extractor)
    }

    /// Split MDL text into parts on the part-begin markers.
    pub fn parse(content: &str) -> std::result::Result<Self, TranslateError> {
        let mut parts = IndexMap::new();
        let marker = format!("{} ", PART_BEGIN);

        let mut pos = 0;
        while let Some(found) = content[pos..].find(&marker) {
            let path_start = pos + found + marker.len();
            let Some(line_end) = content[path_start..].find('\n') else {
                break;
            };
            let part_line = &content[path_start..path_start + line_end];
            // The path ends at the first space; a `BASE64` suffix may follow.
            let part_path = part_line
                .split(' ')
                .next()
                .unwrap_or(part_line)
                .trim_end_matches(['\r', ' '])
                .to_string();

            let body_start = path_start + line_end + 1;
            let body_end = content[body_start..]
                .find(PART_BEGIN)
                .map(|next| body_start + next)
                .unwrap_or(content.len());

            let body = content[body_start..body_end].trim_end_matches(['\n', '\r', ' ']);
            parts.insert(part_path, body.to_string());
            pos = body_end;
        }

        if parts.is_empty() {
            return Err(TranslateError::ContainerMalformed(
                "no __MWOPC_PART_BEGIN__ markers found".to_string(),
            ));
        }
        Ok(OpcExtractor { parts })
    }

    pub fn part(&self, path: &str) -> Option<&str> {
        self.parts.get(path).map(String::as_str)
    }

    /// Part paths in original file order.
    pub fn part_paths(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Paths of the per-system XML parts, in file order.
    pub fn system_paths(&self) -> Vec<&str> {
        self.parts
            .keys()
            .filter(|p| {
                p.contains("/simulink/systems/system_")
                    && p.ends_with(".xml")
                    && !p.contains(".xml.rels")
            })
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// System id from a part path: last component minus the `.xml` suffix.
pub fn system_id_from_path(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".xml").unwrap_or(file)
}
