//! Sidecar metadata: the canonical projection of an IR model plus its
//! OPC container that, combined with the OC text, makes the reverse
//! translation byte-exact.

use anyhow::Result;
use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TranslateError;
use crate::model::Model;
use crate::opc::OpcExtractor;

pub const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub library_type: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortPropertyMeta {
    pub port_type: String,
    pub index: u32,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaskParamMeta {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockMeta {
    pub sid: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub position: Vec<i32>,
    #[serde(default)]
    pub zorder: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub background_color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subsystem_ref: String,
    #[serde(default)]
    pub port_in: u32,
    #[serde(default)]
    pub port_out: u32,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask: Vec<MaskParamMeta>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mask_display_xml: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_properties: Vec<PortPropertyMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchMeta {
    #[serde(default)]
    pub zorder: i32,
    pub dst: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub zorder: i32,
    pub src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub labels: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<i32>,
    #[serde(default = "default_zoom")]
    pub zoom_factor: i32,
    #[serde(default)]
    pub sid_highwatermark: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub open: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub report_name: String,
    #[serde(default)]
    pub blocks: Vec<BlockMeta>,
    #[serde(default)]
    pub connections: Vec<ConnectionMeta>,
}

fn default_zoom() -> i32 {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    pub model: ModelInfo,
    /// Original OPC part order; the emitter writes parts in this order.
    #[serde(default)]
    pub part_order: Vec<String>,
    /// Verbatim part contents, bytes in, bytes out.
    #[serde(default)]
    pub raw_parts: IndexMap<String, String>,
    #[serde(default)]
    pub systems: BTreeMap<String, SystemMeta>,
}

/// Capture everything codegen cannot recover from the OC text.
pub fn build_metadata(model: &Model, opc: &OpcExtractor) -> Metadata {
    let mut meta = Metadata {
        version: METADATA_VERSION,
        model: ModelInfo {
            uuid: model.uuid.clone(),
            library_type: model.library_type.clone(),
            name: model.name.clone(),
        },
        ..Metadata::default()
    };

    for path in opc.part_paths() {
        meta.part_order.push(path.to_string());
        if let Some(content) = opc.part(path) {
            meta.raw_parts.insert(path.to_string(), content.to_string());
        }
    }

    for (sys_id, sys) in &model.systems {
        let mut sm = SystemMeta {
            location: sys.location.clone(),
            zoom_factor: sys.zoom_factor,
            sid_highwatermark: sys.sid_highwatermark,
            open: sys.open.clone(),
            report_name: sys.report_name.clone(),
            ..SystemMeta::default()
        };

        for blk in &sys.blocks {
            let mut bm = BlockMeta {
                sid: blk.sid.clone(),
                block_type: blk.block_type.clone(),
                name: blk.name.clone(),
                position: blk.position.clone(),
                zorder: blk.zorder,
                subsystem_ref: blk.subsystem_ref.clone().unwrap_or_default(),
                port_in: blk.port_in,
                port_out: blk.port_out,
                mask_display_xml: blk.mask_display_xml.clone().unwrap_or_default(),
                ..BlockMeta::default()
            };

            for (k, v) in &blk.parameters {
                // Position and ZOrder ride as first-class fields.
                if k == "Position" || k == "ZOrder" {
                    continue;
                }
                if k == "BackgroundColor" {
                    bm.background_color = v.clone();
                }
                bm.parameters.insert(k.clone(), v.clone());
            }

            for mp in &blk.mask_parameters {
                bm.mask.push(MaskParamMeta {
                    name: mp.name.clone(),
                    param_type: mp.param_type.clone(),
                    prompt: mp.prompt.clone(),
                    value: mp.value.clone(),
                });
            }

            for pi in blk.input_ports.iter().chain(blk.output_ports.iter()) {
                bm.port_properties.push(PortPropertyMeta {
                    port_type: pi.port_type.clone(),
                    index: pi.index,
                    properties: pi.properties.clone(),
                });
            }

            sm.blocks.push(bm);
        }

        for conn in &sys.connections {
            let mut cm = ConnectionMeta {
                name: conn.name.clone(),
                zorder: conn.zorder,
                src: conn.source.clone(),
                dst: conn.destination.clone(),
                labels: conn.labels.clone(),
                points: conn.points.clone(),
                ..ConnectionMeta::default()
            };
            for br in &conn.branches {
                cm.branches.push(BranchMeta {
                    zorder: br.zorder,
                    dst: br.destination.clone(),
                    points: br.points.clone(),
                });
            }
            sm.connections.push(cm);
        }

        meta.systems.insert(sys_id.clone(), sm);
    }

    meta
}

pub fn to_json_string(meta: &Metadata) -> Result<String, TranslateError> {
    serde_json::to_string_pretty(meta).map_err(|e| TranslateError::Metadata(e.to_string()))
}

pub fn from_json_str(content: &str) -> Result<Metadata, TranslateError> {
    serde_json::from_str(content).map_err(|e| TranslateError::Metadata(e.to_string()))
}

pub fn write_file(path: impl AsRef<Utf8Path>, meta: &Metadata) -> Result<()> {
    let path = path.as_ref();
    let json = to_json_string(meta)?;
    std::fs::write(path.as_std_path(), json)
        .map_err(|e| TranslateError::Metadata(format!("{}: {}", path, e)))?;
    Ok(())
}

pub fn read_file(path: impl AsRef<Utf8Path>) -> Result<Metadata, TranslateError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path.as_std_path())
        .map_err(|e| TranslateError::Metadata(format!("{}: {}", path, e)))?;
    from_json_str(&content)
}
