//! MDL (OPC) container emission.
//!
//! Two modes: verbatim replay of the sidecar's recorded parts, which
//! reproduces the original file byte-for-byte, and synthesis of a fresh
//! container around systems lifted from OC text.

pub mod system_xml;

use std::fmt::Write as _;

use uuid::Uuid;

use crate::metadata::Metadata;
use crate::model::Model;

fn header(out: &mut String) {
    out.push_str("# MathWorks OPC Text Package\n");
    out.push_str("Model {\n");
    out.push_str("  Version  24.2\n");
    out.push_str("  Description \"Simulink model saved in R2024b\"\n");
    out.push_str("}\n");
    out.push_str("__MWOPC_PACKAGE_BEGIN__ R2024b\n");
}

fn write_part(out: &mut String, path: &str, content: &str) {
    let is_base64 = path.ends_with(".mxarray");
    out.push_str("__MWOPC_PART_BEGIN__ ");
    out.push_str(path);
    if is_base64 {
        out.push_str(" BASE64");
    }
    out.push('\n');
    out.push_str(content);
    out.push('\n');
    // Text parts carry a blank-line separator; BASE64 parts do not.
    if !is_base64 {
        out.push('\n');
    }
}

/// Verbatim mode: replay every recorded part in recorded order. A system
/// part missing from the raw blob is regenerated from its structured
/// record.
pub fn write_with_metadata(meta: &Metadata) -> String {
    let mut out = String::new();
    header(&mut out);

    if meta.part_order.is_empty() {
        for (path, content) in &meta.raw_parts {
            write_part(&mut out, path, content);
        }
        return out;
    }

    for path in &meta.part_order {
        if let Some(content) = meta.raw_parts.get(path) {
            write_part(&mut out, path, content);
        } else if let Some(sys_id) = path
            .strip_prefix("/simulink/systems/")
            .and_then(|f| f.strip_suffix(".xml"))
        {
            if let Some(sys) = meta.systems.get(sys_id) {
                write_part(&mut out, path, &system_xml::system_meta_xml(sys));
            }
        }
    }
    out
}

/// Synthesized mode: a fixed OPC skeleton around the given model's
/// systems (`system_root` plus one system per element and component).
pub fn write_from_model(model: &Model) -> String {
    let uuid = Uuid::new_v4().to_string();
    let mut out = String::new();
    header(&mut out);

    write_part(&mut out, "/[Content_Types].xml", CONTENT_TYPES);
    write_part(&mut out, "/_rels/.rels", RELS);
    write_part(&mut out, "/metadata/coreProperties.xml", CORE_PROPERTIES);
    write_part(&mut out, "/metadata/mwcoreProperties.xml", MW_CORE_PROPERTIES);
    write_part(
        &mut out,
        "/metadata/mwcorePropertiesExtension.xml",
        &mw_core_extension(&uuid),
    );
    write_part(
        &mut out,
        "/metadata/mwcorePropertiesReleaseInfo.xml",
        RELEASE_INFO,
    );
    write_part(
        &mut out,
        "/simulink/_rels/blockdiagram.xml.rels",
        BLOCKDIAGRAM_RELS,
    );
    write_part(
        &mut out,
        "/simulink/_rels/configSetInfo.xml.rels",
        CONFIG_SET_INFO_RELS,
    );
    write_part(&mut out, "/simulink/bddefaults.xml", BD_DEFAULTS);
    write_part(&mut out, "/simulink/blockdiagram.xml", &blockdiagram(&uuid));
    write_part(&mut out, "/simulink/configSet0.xml", CONFIG_SET);
    write_part(&mut out, "/simulink/configSetInfo.xml", CONFIG_SET_INFO);
    write_part(&mut out, "/simulink/modelDictionary.xml", MODEL_DICTIONARY);

    // Child systems in numeric order after the root.
    let mut child_ids: Vec<&str> = model
        .systems
        .keys()
        .filter(|id| *id != "system_root")
        .map(String::as_str)
        .collect();
    child_ids.sort_by_key(|id| {
        id.rsplit('_')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(u32::MAX)
    });

    write_part(
        &mut out,
        "/simulink/systems/_rels/system_root.xml.rels",
        &system_rels(&child_ids),
    );

    if let Some(root) = model.root_system() {
        write_part(
            &mut out,
            "/simulink/systems/system_root.xml",
            &system_xml::system_xml(root),
        );
    }
    for id in &child_ids {
        if let Some(sys) = model.get_system(id) {
            write_part(
                &mut out,
                &format!("/simulink/systems/{}.xml", id),
                &system_xml::system_xml(sys),
            );
        }
    }

    write_part(&mut out, "/simulink/windowsInfo.xml", WINDOWS_INFO);
    out
}

fn blockdiagram(uuid: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ModelInformation Version=\"1.0\">\n");
    out.push_str("  <Library>\n");
    let _ = writeln!(out, "    <P Name=\"ModelUUID\">{}</P>", uuid);
    out.push_str("    <P Name=\"LibraryType\">BlockLibrary</P>\n");
    out.push_str("    <System Ref=\"system_root\"/>\n");
    out.push_str("  </Library>\n");
    out.push_str("</ModelInformation>");
    out
}

fn mw_core_extension(uuid: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\" ?>\n\
         <mwcoreProperties xmlns=\"http://schemas.mathworks.com/package/2014/corePropertiesExtension\">\n\
         \x20\x20<uuid>{}</uuid>\n\
         </mwcoreProperties>",
        uuid
    )
}

fn system_rels(child_ids: &[&str]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\" ?>\n");
    out.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\n",
    );
    for id in child_ids {
        let _ = writeln!(
            out,
            "  <Relationship Id=\"{}\" Target=\"{}.xml\" Type=\"http://schemas.mathworks.com/simulink/2010/relationships/system\"/>",
            id, id
        );
    }
    out.push_str("</Relationships>");
    out
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default ContentType="application/vnd.mathworks.matlab.mxarray+binary" Extension="mxarray"/>
  <Default ContentType="application/vnd.openxmlformats-package.relationships+xml" Extension="rels"/>
  <Default ContentType="application/vnd.mathworks.simulink.mdl+xml" Extension="xml"/>
  <Override ContentType="application/vnd.openxmlformats-package.core-properties+xml" PartName="/metadata/coreProperties.xml"/>
  <Override ContentType="application/vnd.mathworks.package.coreProperties+xml" PartName="/metadata/mwcoreProperties.xml"/>
  <Override ContentType="application/vnd.mathworks.package.corePropertiesExtension+xml" PartName="/metadata/mwcorePropertiesExtension.xml"/>
  <Override ContentType="application/vnd.mathworks.package.corePropertiesReleaseInfo+xml" PartName="/metadata/mwcorePropertiesReleaseInfo.xml"/>
  <Override ContentType="application/vnd.mathworks.simulink.configSet+xml" PartName="/simulink/configSet0.xml"/>
  <Override ContentType="application/vnd.mathworks.simulink.configSetInfo+xml" PartName="/simulink/configSetInfo.xml"/>
  <Override ContentType="application/vnd.mathworks.simulink.mf0+xml" PartName="/simulink/modelDictionary.xml"/>
  <Override ContentType="application/vnd.mathworks.simulink.blockDiagram+xml" PartName="/simulink/windowsInfo.xml"/>
</Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="blockDiagram" Target="simulink/blockdiagram.xml" Type="http://schemas.mathworks.com/simulink/2010/relationships/blockDiagram"/>
  <Relationship Id="blockDiagramDefaults" Target="simulink/bddefaults.xml" Type="http://schemas.mathworks.com/simulink/2017/relationships/blockDiagramDefaults"/>
  <Relationship Id="configSetInfo" Target="simulink/configSetInfo.xml" Type="http://schemas.mathworks.com/simulink/2014/relationships/configSetInfo"/>
  <Relationship Id="modelDictionary" Target="simulink/modelDictionary.xml" Type="http://schemas.mathworks.com/simulinkModel/2016/relationships/modelDictionary"/>
  <Relationship Id="rId1" Target="metadata/mwcoreProperties.xml" Type="http://schemas.mathworks.com/package/2012/relationships/coreProperties"/>
  <Relationship Id="rId2" Target="metadata/mwcorePropertiesExtension.xml" Type="http://schemas.mathworks.com/package/2014/relationships/corePropertiesExtension"/>
  <Relationship Id="rId3" Target="metadata/mwcorePropertiesReleaseInfo.xml" Type="http://schemas.mathworks.com/package/2019/relationships/corePropertiesReleaseInfo"/>
  <Relationship Id="rId4" Target="metadata/coreProperties.xml" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties"/>
</Relationships>"#;

const CORE_PROPERTIES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <cp:category>library</cp:category>
  <dcterms:created xsi:type="dcterms:W3CDTF">2026-01-01T00:00:00Z</dcterms:created>
  <dc:creator>oc_to_mdl</dc:creator>
  <cp:lastModifiedBy>oc_to_mdl</cp:lastModifiedBy>
  <dcterms:modified xsi:type="dcterms:W3CDTF">2026-01-01T00:00:00Z</dcterms:modified>
  <cp:revision>1.0</cp:revision>
  <cp:version>R2024b</cp:version>
</cp:coreProperties>"#;

const MW_CORE_PROPERTIES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<mwcoreProperties xmlns="http://schemas.mathworks.com/package/2012/coreProperties">
  <contentType>application/vnd.mathworks.simulink.model</contentType>
  <contentTypeFriendlyName>Simulink Model</contentTypeFriendlyName>
  <matlabRelease>R2024b</matlabRelease>
</mwcoreProperties>"#;

const RELEASE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MathWorks_version_info>
  <version>24.2.0.2863752</version>
  <release>R2024b</release>
  <description>Update 5</description>
  <date>Jan 31 2025</date>
  <checksum>2052451712</checksum>
</MathWorks_version_info>"#;

const BLOCKDIAGRAM_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="system_root" Target="systems/system_root.xml" Type="http://schemas.mathworks.com/simulink/2010/relationships/system"/>
  <Relationship Id="windowsInfo" Target="windowsInfo.xml" Type="http://schemas.mathworks.com/simulinkModel/2019/relationships/windowsInfo"/>
</Relationships>"#;

const CONFIG_SET_INFO_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="configSet0" Target="configSet0.xml" Type="http://schemas.mathworks.com/simulink/2014/relationships/configSet"/>
</Relationships>"#;

const BD_DEFAULTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<BlockDiagramDefaults>
  <MaskDefaults SelfModifiable="off">
    <Display IconFrame="on" IconOpaque="opaque" RunInitForIconRedraw="analyze" IconRotate="none" PortRotate="default" IconUnits="autoscale"/>
    <MaskParameter Evaluate="on" Tunable="on" NeverSave="off" Internal="off" ReadOnly="off" Enabled="on" Visible="on" ToolTip="on"/>
    <DialogControl>
      <ControlOptions Visible="on" Enabled="on" Row="new" HorizontalStretch="on" PromptLocation="top" Orientation="horizontal" Scale="linear" TextType="Plain Text" Expand="off" ShowFilter="on" ShowParameterName="on" WordWrap="on" AlignPrompts="off"/>
    </DialogControl>
  </MaskDefaults>
</BlockDiagramDefaults>"#;

const CONFIG_SET: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ConfigSet>
  <Object Version="24.1.0" ClassName="Simulink.ConfigSet">
    <P Name="DisabledProps" Class="double">[]</P>
    <P Name="Description"/>
    <Array PropName="Components" Type="Handle" Dimension="1*1">
      <Object ObjectID="2" Version="24.1.0" ClassName="Simulink.SolverCC">
        <P Name="DisabledProps" Class="double">[]</P>
        <P Name="Description"/>
        <P Name="Components" Class="double">[]</P>
        <P Name="SolverName">VariableStepAuto</P>
      </Object>
    </Array>
  </Object>
</ConfigSet>"#;

const CONFIG_SET_INFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ConfigSetInfo>
  <ConfigSet Ref="configSet0" Active="true"/>
</ConfigSetInfo>"#;

const MODEL_DICTIONARY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ModelDictionary/>"#;

const WINDOWS_INFO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<WindowsInfo>
  <Object PropName="BdWindowsInfo" ObjectID="1" ClassName="Simulink.BDWindowsInfo">
    <Object PropName="WindowsInfo" ObjectID="2" ClassName="Simulink.WindowInfo">
      <P Name="IsActive" Class="logical">1</P>
      <P Name="Location" Class="double">[0.0, 0.0, 1920.0, 1080.0]</P>
    </Object>
  </Object>
</WindowsInfo>"#;
