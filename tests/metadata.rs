use oclink::metadata::{build_metadata, from_json_str, to_json_string};
use oclink::parser::MdlDocument;

const SAMPLE_MDL: &str = concat!(
    "# MathWorks OPC Text Package\n",
    "Model {\n",
    "  Version  24.2\n",
    "  Description \"Simulink model saved in R2024b\"\n",
    "}\n",
    "__MWOPC_PACKAGE_BEGIN__ R2024b\n",
    "__MWOPC_PART_BEGIN__ /simulink/blockdiagram.xml\n",
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
    "<ModelInformation Version=\"1.0\">\n",
    "  <Library>\n",
    "    <P Name=\"ModelUUID\">deadbeef-1234</P>\n",
    "    <P Name=\"LibraryType\">BlockLibrary</P>\n",
    "  </Library>\n",
    "</ModelInformation>\n",
    "\n",
    "__MWOPC_PART_BEGIN__ /simulink/systems/system_1.xml\n",
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n",
    "<System>\n",
    "  <P Name=\"Location\">[-1, -8, 1921, 1033]</P>\n",
    "  <P Name=\"ZoomFactor\">100</P>\n",
    "  <P Name=\"SIDHighWatermark\">2</P>\n",
    "  <Block BlockType=\"Gain\" Name=\"G\" SID=\"1\">\n",
    "    <P Name=\"Position\">[10, 20, 50, 56]</P>\n",
    "    <P Name=\"ZOrder\">1</P>\n",
    "    <P Name=\"Gain\">k</P>\n",
    "    <P Name=\"BackgroundColor\">orange</P>\n",
    "    <Mask>\n",
    "      <MaskParameter Name=\"k\" Type=\"edit\">\n",
    "        <Prompt>Gain value</Prompt>\n",
    "        <Value>2.0</Value>\n",
    "      </MaskParameter>\n",
    "    </Mask>\n",
    "    <PortProperties>\n",
    "      <Port Type=\"in\" Index=\"1\">\n",
    "        <P Name=\"Name\">drive</P>\n",
    "      </Port>\n",
    "    </PortProperties>\n",
    "  </Block>\n",
    "  <Block BlockType=\"Outport\" Name=\"y\" SID=\"2\">\n",
    "    <P Name=\"Position\">[100, 30, 130, 44]</P>\n",
    "    <P Name=\"ZOrder\">2</P>\n",
    "  </Block>\n",
    "  <Line>\n",
    "    <P Name=\"Name\">drive</P>\n",
    "    <P Name=\"ZOrder\">1</P>\n",
    "    <P Name=\"Src\">1#out:1</P>\n",
    "    <P Name=\"Points\">[50, 0]</P>\n",
    "    <Branch>\n",
    "      <P Name=\"ZOrder\">2</P>\n",
    "      <P Name=\"Dst\">2#in:1</P>\n",
    "    </Branch>\n",
    "  </Line>\n",
    "</System>\n",
    "\n",
);

#[test]
fn captures_everything_codegen_cannot_recover() {
    let doc = MdlDocument::from_str(SAMPLE_MDL).unwrap();
    let meta = build_metadata(&doc.model, &doc.opc);

    assert_eq!(meta.version, 1);
    assert_eq!(meta.model.uuid, "deadbeef-1234");
    assert_eq!(meta.model.library_type, "BlockLibrary");

    assert_eq!(
        meta.part_order,
        vec![
            "/simulink/blockdiagram.xml".to_string(),
            "/simulink/systems/system_1.xml".to_string(),
        ]
    );
    assert_eq!(meta.raw_parts.len(), 2);
    assert!(meta.raw_parts["/simulink/systems/system_1.xml"].contains("BlockType=\"Gain\""));

    let sys = &meta.systems["system_1"];
    assert_eq!(sys.sid_highwatermark, 2);
    assert_eq!(sys.location, vec![-1, -8, 1921, 1033]);

    let gain = &sys.blocks[0];
    assert_eq!(gain.sid, "1");
    assert_eq!(gain.block_type, "Gain");
    assert_eq!(gain.position, vec![10, 20, 50, 56]);
    assert_eq!(gain.zorder, 1);
    assert_eq!(gain.background_color, "orange");
    assert_eq!(gain.parameters.get("Gain").map(String::as_str), Some("k"));
    // Position and ZOrder ride as first-class fields, not parameters.
    assert!(!gain.parameters.contains_key("Position"));
    assert!(!gain.parameters.contains_key("ZOrder"));
    assert_eq!(gain.mask.len(), 1);
    assert_eq!(gain.mask[0].name, "k");
    assert_eq!(gain.mask[0].value, "2.0");
    assert_eq!(gain.port_properties.len(), 1);
    assert_eq!(
        gain.port_properties[0].properties.get("Name").map(String::as_str),
        Some("drive")
    );

    let conn = &sys.connections[0];
    assert_eq!(conn.name, "drive");
    assert_eq!(conn.src, "1#out:1");
    assert_eq!(conn.points, vec![50, 0]);
    assert_eq!(conn.branches.len(), 1);
    assert_eq!(conn.branches[0].dst, "2#in:1");
}

#[test]
fn json_round_trip_preserves_the_document() {
    let doc = MdlDocument::from_str(SAMPLE_MDL).unwrap();
    let meta = build_metadata(&doc.model, &doc.opc);

    let json = to_json_string(&meta).unwrap();
    let back = from_json_str(&json).unwrap();

    assert_eq!(back.version, meta.version);
    assert_eq!(back.model.uuid, meta.model.uuid);
    assert_eq!(back.part_order, meta.part_order);
    assert_eq!(back.raw_parts, meta.raw_parts);
    assert_eq!(back.systems.len(), meta.systems.len());

    let sys = &back.systems["system_1"];
    assert_eq!(sys.blocks.len(), 2);
    assert_eq!(sys.blocks[0].parameters.get("Gain").map(String::as_str), Some("k"));
    assert_eq!(sys.connections[0].branches[0].dst, "2#in:1");
}

#[test]
fn required_top_level_keys_are_present() {
    let doc = MdlDocument::from_str(SAMPLE_MDL).unwrap();
    let meta = build_metadata(&doc.model, &doc.opc);
    let json = to_json_string(&meta).unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for key in ["version", "model", "part_order", "raw_parts", "systems"] {
        assert!(value.get(key).is_some(), "missing top-level key {}", key);
    }
}

#[test]
fn unreadable_documents_surface_a_metadata_error() {
    assert!(from_json_str("{ not json").is_err());
    assert!(from_json_str("").is_err());
}
