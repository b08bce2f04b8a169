use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TranslateError;

/// Which side of a block a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    In,
    Out,
}

impl PortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PortKind::In => "in",
            PortKind::Out => "out",
        }
    }
}

/// An address into the graph: block SID, port side, 1-based port index.
///
/// The wire format `"<sid>#<kind>:<idx>"` is fixed by the MDL format and
/// is preserved exactly on round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub block_sid: String,
    pub port_kind: PortKind,
    pub port_index: u32,
}

impl Endpoint {
    pub fn parse(spec: &str) -> Result<Endpoint, TranslateError> {
        let malformed = || TranslateError::EndpointMalformed(spec.to_string());
        let (sid, rest) = spec.split_once('#').ok_or_else(malformed)?;
        let (kind, idx) = rest.split_once(':').ok_or_else(malformed)?;
        let port_kind = match kind.trim() {
            "in" => PortKind::In,
            "out" => PortKind::Out,
            _ => return Err(malformed()),
        };
        let port_index: u32 = idx.trim().parse().map_err(|_| malformed())?;
        if port_index == 0 {
            return Err(malformed());
        }
        Ok(Endpoint {
            block_sid: sid.trim().to_string(),
            port_kind,
            port_index,
        })
    }

    pub fn format(&self) -> String {
        format!(
            "{}#{}:{}",
            self.block_sid,
            self.port_kind.as_str(),
            self.port_index
        )
    }
}

/// One `<MaskParameter>`: per-instance configuration on a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaskParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub prompt: String,
    pub value: String,
}

/// A named port from `<PortProperties>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortInfo {
    pub port_type: String,
    pub index: u32,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub sid: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub name: String,
    pub position: Vec<i32>,
    pub zorder: i32,
    pub port_in: u32,
    pub port_out: u32,
    /// Parameter values are uninterpreted strings; insertion order is
    /// the XML order and is replayed by the sidecar.
    pub parameters: IndexMap<String, String>,
    pub mask_parameters: Vec<MaskParameter>,
    pub input_ports: Vec<PortInfo>,
    pub output_ports: Vec<PortInfo>,
    pub mask_display_xml: Option<String>,
    pub subsystem_ref: Option<String>,
}

impl Default for Block {
    fn default() -> Self {
        Block {
            sid: String::new(),
            block_type: String::new(),
            name: String::new(),
            position: Vec::new(),
            zorder: 0,
            port_in: 1,
            port_out: 1,
            parameters: IndexMap::new(),
            mask_parameters: Vec::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            mask_display_xml: None,
            subsystem_ref: None,
        }
    }
}

impl Block {
    pub fn is_inport(&self) -> bool {
        self.block_type == "Inport"
    }

    pub fn is_outport(&self) -> bool {
        self.block_type == "Outport"
    }

    pub fn is_subsystem(&self) -> bool {
        self.block_type == "SubSystem"
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn mask_param(&self, key: &str) -> Option<&str> {
        self.mask_parameters
            .iter()
            .find(|mp| mp.name == key)
            .map(|mp| mp.value.as_str())
    }

    /// `Port` parameter as an integer; blocks without one default to 1.
    pub fn port_number(&self) -> u32 {
        self.param("Port")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branch {
    pub zorder: i32,
    pub destination: String,
    pub points: Vec<i32>,
}

impl Branch {
    pub fn destination_endpoint(&self) -> Result<Endpoint, TranslateError> {
        Endpoint::parse(&self.destination)
    }
}

/// A directed hyperedge. `source`/`destination` keep the raw endpoint
/// strings so the sidecar can replay them byte-for-byte; parsed views
/// are available through the accessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    pub zorder: i32,
    pub source: String,
    pub destination: String,
    pub points: Vec<i32>,
    pub labels: String,
    pub branches: Vec<Branch>,
}

impl Connection {
    pub fn source_endpoint(&self) -> Result<Endpoint, TranslateError> {
        Endpoint::parse(&self.source)
    }

    pub fn destination_endpoint(&self) -> Result<Endpoint, TranslateError> {
        Endpoint::parse(&self.destination)
    }

    /// Every destination endpoint string: the direct one (if any)
    /// followed by the branches in input order.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        let direct = if self.destination.is_empty() {
            None
        } else {
            Some(self.destination.as_str())
        };
        direct.into_iter().chain(
            self.branches
                .iter()
                .filter(|b| !b.destination.is_empty())
                .map(|b| b.destination.as_str()),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    pub name: String,
    pub location: Vec<i32>,
    pub zoom_factor: i32,
    pub sid_highwatermark: i32,
    pub open: String,
    pub report_name: String,
    pub blocks: Vec<Block>,
    pub connections: Vec<Connection>,
}

impl System {
    /// Inport blocks ordered by their `Port` parameter. The order forms
    /// the system's input vector.
    pub fn inports(&self) -> Vec<&Block> {
        let mut ports: Vec<&Block> = self.blocks.iter().filter(|b| b.is_inport()).collect();
        ports.sort_by_key(|b| b.port_number());
        ports
    }

    /// Outport blocks ordered by their `Port` parameter.
    pub fn outports(&self) -> Vec<&Block> {
        let mut ports: Vec<&Block> = self.blocks.iter().filter(|b| b.is_outport()).collect();
        ports.sort_by_key(|b| b.port_number());
        ports
    }

    pub fn subsystems(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.is_subsystem())
    }

    pub fn find_block_by_sid(&self, sid: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.sid == sid)
    }

    pub fn find_block_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub uuid: String,
    pub name: String,
    pub library_type: String,
    pub systems: BTreeMap<String, System>,
}

impl Model {
    pub fn root_system(&self) -> Option<&System> {
        self.systems.get("system_root")
    }

    pub fn get_system(&self, id: &str) -> Option<&System> {
        self.systems.get(id)
    }
}

/// Parse a MATLAB-style integer array like `"[355, 180, 400, 220]"` or
/// `"[50, 0; 0, -105]"`.
pub fn parse_int_array(s: &str) -> Vec<i32> {
    s.split(|c: char| !(c.is_ascii_digit() || c == '-'))
        .filter(|tok| !tok.is_empty() && *tok != "-")
        .filter_map(|tok| tok.parse().ok())
        .collect()
}

/// Format an integer array back into the `[a, b, c]` form the MDL XML uses.
pub fn format_int_array(values: &[i32]) -> String {
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}
