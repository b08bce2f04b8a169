//! MDL XML parsing: OPC parts into the IR model.

use anyhow::Result;
use camino::Utf8Path;
use roxmltree::{Document, Node};

use crate::error::TranslateError;
use crate::model::*;
use crate::opc::{system_id_from_path, OpcExtractor};

/// A fully parsed MDL container: the IR model plus the raw parts it was
/// built from (kept for the sidecar).
pub struct MdlDocument {
    pub model: Model,
    pub opc: OpcExtractor,
}

impl MdlDocument {
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let opc = OpcExtractor::load(path)?;
        let mut doc = Self::from_opc(opc)?;
        doc.model.name = path.file_stem().unwrap_or("model").to_string();
        Ok(doc)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let opc = OpcExtractor::parse(content)?;
        Self::from_opc(opc)
    }

    pub fn from_opc(opc: OpcExtractor) -> Result<Self> {
        let mut model = Model::default();

        if let Some(blockdiagram) = opc.part("/simulink/blockdiagram.xml") {
            parse_blockdiagram(blockdiagram, &mut model)?;
        }

        for sys_path in opc.system_paths() {
            let sys_id = system_id_from_path(sys_path);
            let content = opc.part(sys_path).unwrap_or_default();
            let sys = parse_system(sys_id, content)?;
            model.systems.insert(sys_id.to_string(), sys);
        }

        Ok(MdlDocument { model, opc })
    }
}

fn xml_error(path: &str, err: roxmltree::Error) -> TranslateError {
    TranslateError::XmlMalformed {
        path: path.to_string(),
        message: err.to_string(),
    }
}

/// Read model identity from `/simulink/blockdiagram.xml`. A `<Library>`
/// element wins over `<Model>` when both are present.
fn parse_blockdiagram(content: &str, model: &mut Model) -> Result<(), TranslateError> {
    let doc =
        Document::parse(content).map_err(|e| xml_error("/simulink/blockdiagram.xml", e))?;
    let root = doc.root_element();

    let model_elem = root
        .children()
        .find(|n| n.is_element() && n.has_tag_name("Library"))
        .or_else(|| {
            root.children()
                .find(|n| n.is_element() && n.has_tag_name("Model"))
        });

    if let Some(elem) = model_elem {
        for p in elem.children().filter(|c| c.is_element() && c.has_tag_name("P")) {
            match p.attribute("Name") {
                Some("ModelUUID") => model.uuid = p.text().unwrap_or("").to_string(),
                Some("LibraryType") => model.library_type = p.text().unwrap_or("").to_string(),
                _ => {}
            }
        }
    }
    Ok(())
}

/// Parse one `system_*.xml` part into an IR [`System`].
pub fn parse_system(sys_id: &str, content: &str) -> Result<System, TranslateError> {
    let doc = Document::parse(content).map_err(|e| xml_error(sys_id, e))?;
    let root = doc
        .descendants()
        .find(|n| n.is_element() && n.has_tag_name("System"))
        .ok_or_else(|| TranslateError::XmlMalformed {
            path: sys_id.to_string(),
            message: "no <System> root".to_string(),
        })?;

    let mut sys = System {
        id: sys_id.to_string(),
        zoom_factor: 100,
        ..System::default()
    };

    for child in root.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "P" => {
                let value = child.text().unwrap_or("");
                match child.attribute("Name") {
                    Some("Location") => sys.location = parse_int_array(value),
                    Some("ZoomFactor") => {
                        sys.zoom_factor = value.trim().parse().unwrap_or(100)
                    }
                    Some("SIDHighWatermark") => {
                        sys.sid_highwatermark = value.trim().parse().unwrap_or(0)
                    }
                    Some("Open") => sys.open = value.to_string(),
                    Some("ReportName") => sys.report_name = value.to_string(),
                    _ => {}
                }
            }
            "Block" => sys.blocks.push(parse_block(child, content)),
            "Line" => sys.connections.push(parse_connection(child)),
            _ => {}
        }
    }

    Ok(sys)
}

fn parse_block(node: Node, source: &str) -> Block {
    let mut blk = Block {
        block_type: node.attribute("BlockType").unwrap_or("").to_string(),
        name: node.attribute("Name").unwrap_or("").to_string(),
        sid: node.attribute("SID").unwrap_or("").to_string(),
        ..Block::default()
    };

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "PortCounts" => {
                if let Some(v) = child.attribute("in").and_then(|s| s.parse().ok()) {
                    blk.port_in = v;
                }
                if let Some(v) = child.attribute("out").and_then(|s| s.parse().ok()) {
                    blk.port_out = v;
                }
            }
            "P" => {
                if let Some(name) = child.attribute("Name") {
                    let value = child.text().unwrap_or("").to_string();
                    match name {
                        "Position" => blk.position = parse_int_array(&value),
                        "ZOrder" => blk.zorder = value.trim().parse().unwrap_or(0),
                        _ => {}
                    }
                    blk.parameters.insert(name.to_string(), value);
                }
            }
            "System" => {
                if let Some(r) = child.attribute("Ref") {
                    blk.subsystem_ref = Some(r.to_string());
                }
            }
            "Mask" => parse_mask(child, source, &mut blk),
            "PortProperties" => parse_port_properties(child, &mut blk),
            _ => {}
        }
    }

    blk
}

fn parse_mask(node: Node, source: &str, blk: &mut Block) {
    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "MaskParameter" => {
                let mut mp = MaskParameter {
                    name: child.attribute("Name").unwrap_or("").to_string(),
                    param_type: child.attribute("Type").unwrap_or("").to_string(),
                    ..MaskParameter::default()
                };
                for sub in child.children().filter(|c| c.is_element()) {
                    match sub.tag_name().name() {
                        "Prompt" => mp.prompt = sub.text().unwrap_or("").to_string(),
                        "Value" => mp.value = sub.text().unwrap_or("").to_string(),
                        _ => {}
                    }
                }
                blk.mask_parameters.push(mp);
            }
            "Display" => {
                // Keep the raw element text; the emitter replays it verbatim.
                let range = child.range();
                blk.mask_display_xml = Some(source[range].to_string());
            }
            _ => {}
        }
    }
}

fn parse_port_properties(node: Node, blk: &mut Block) {
    for port in node
        .children()
        .filter(|c| c.is_element() && c.has_tag_name("Port"))
    {
        let mut info = PortInfo {
            port_type: port.attribute("Type").unwrap_or("").to_string(),
            index: port
                .attribute("Index")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            ..PortInfo::default()
        };
        for p in port
            .children()
            .filter(|c| c.is_element() && c.has_tag_name("P"))
        {
            if let Some(nm) = p.attribute("Name") {
                info.properties
                    .insert(nm.to_string(), p.text().unwrap_or("").to_string());
            }
        }
        if info.port_type == "in" {
            blk.input_ports.push(info);
        } else {
            blk.output_ports.push(info);
        }
    }
}

fn parse_connection(node: Node) -> Connection {
    let mut conn = Connection::default();

    for child in node.children().filter(|c| c.is_element()) {
        match child.tag_name().name() {
            "P" => {
                let value = child.text().unwrap_or("");
                match child.attribute("Name") {
                    Some("Name") => conn.name = value.to_string(),
                    Some("ZOrder") => conn.zorder = value.trim().parse().unwrap_or(0),
                    Some("Src") => conn.source = value.to_string(),
                    Some("Dst") => conn.destination = value.to_string(),
                    Some("Points") => conn.points = parse_int_array(value),
                    Some("Labels") => conn.labels = value.to_string(),
                    _ => {}
                }
            }
            "Branch" => {
                let mut branch = Branch::default();
                for p in child
                    .children()
                    .filter(|c| c.is_element() && c.has_tag_name("P"))
                {
                    let value = p.text().unwrap_or("");
                    match p.attribute("Name") {
                        Some("ZOrder") => branch.zorder = value.trim().parse().unwrap_or(0),
                        Some("Dst") => branch.destination = value.to_string(),
                        Some("Points") => branch.points = parse_int_array(value),
                        _ => {}
                    }
                }
                conn.branches.push(branch);
            }
            _ => {}
        }
    }

    conn
}
