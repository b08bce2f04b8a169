use oclink::codegen::Generator;
use oclink::generator;
use oclink::lift::Lifter;
use oclink::metadata::build_metadata;
use oclink::model::Model;
use oclink::ocparse::parse_str;
use oclink::ocwrite;
use oclink::parser::MdlDocument;

const HEADER: &str = "# MathWorks OPC Text Package\n\
                      Model {\n\
                      \x20 Version  24.2\n\
                      \x20 Description \"Simulink model saved in R2024b\"\n\
                      }\n\
                      __MWOPC_PACKAGE_BEGIN__ R2024b\n";

const BLOCKDIAGRAM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ModelInformation Version="1.0">
  <Library>
    <P Name="ModelUUID">4a5b6c7d-0000-1111-2222-333344445555</P>
    <P Name="LibraryType">BlockLibrary</P>
    <System Ref="system_root"/>
  </Library>
</ModelInformation>"#;

const SYSTEM_ROOT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<System>
  <P Name="Location">[-1, -8, 1921, 1033]</P>
  <P Name="ZoomFactor">100</P>
  <P Name="SIDHighWatermark">1</P>
  <Block BlockType="SubSystem" Name="Controller" SID="1">
    <PortCounts in="2" out="1"/>
    <P Name="Position">[100, 100, 220, 180]</P>
    <P Name="ZOrder">1</P>
    <System Ref="system_1"/>
  </Block>
</System>"#;

const SYSTEM_1: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<System>
  <P Name="Location">[-1, -8, 1921, 1033]</P>
  <P Name="ZoomFactor">100</P>
  <P Name="SIDHighWatermark">5</P>
  <Block BlockType="Inport" Name="u" SID="1">
    <P Name="Position">[50, 50, 80, 64]</P>
    <P Name="ZOrder">1</P>
  </Block>
  <Block BlockType="Gain" Name="Gain" SID="2">
    <P Name="Position">[150, 45, 190, 81]</P>
    <P Name="ZOrder">2</P>
    <P Name="Gain">k</P>
  </Block>
  <Block BlockType="Sum" Name="Sum" SID="3">
    <PortCounts in="2" out="1"/>
    <P Name="Position">[250, 47, 286, 83]</P>
    <P Name="ZOrder">3</P>
    <P Name="Inputs">++</P>
  </Block>
  <Block BlockType="Inport" Name="v" SID="4">
    <P Name="Position">[50, 110, 80, 124]</P>
    <P Name="ZOrder">4</P>
    <P Name="Port">2</P>
  </Block>
  <Block BlockType="Outport" Name="y" SID="5">
    <P Name="Position">[350, 57, 380, 71]</P>
    <P Name="ZOrder">5</P>
  </Block>
  <Line>
    <P Name="ZOrder">1</P>
    <P Name="Src">1#out:1</P>
    <P Name="Dst">2#in:1</P>
  </Line>
  <Line>
    <P Name="ZOrder">2</P>
    <P Name="Src">2#out:1</P>
    <P Name="Dst">3#in:1</P>
  </Line>
  <Line>
    <P Name="ZOrder">3</P>
    <P Name="Src">4#out:1</P>
    <P Name="Dst">3#in:2</P>
  </Line>
  <Line>
    <P Name="ZOrder">4</P>
    <P Name="Src">3#out:1</P>
    <P Name="Dst">5#in:1</P>
  </Line>
</System>"#;

fn part(path: &str, content: &str) -> String {
    format!("__MWOPC_PART_BEGIN__ {}\n{}\n\n", path, content)
}

fn sample_mdl() -> String {
    format!(
        "{}{}{}{}",
        HEADER,
        part("/simulink/blockdiagram.xml", BLOCKDIAGRAM),
        part("/simulink/systems/system_root.xml", SYSTEM_ROOT),
        part("/simulink/systems/system_1.xml", SYSTEM_1),
    )
}

#[test]
fn parser_reads_the_container() {
    let doc = MdlDocument::from_str(&sample_mdl()).unwrap();
    assert_eq!(doc.model.uuid, "4a5b6c7d-0000-1111-2222-333344445555");
    assert_eq!(doc.model.library_type, "BlockLibrary");
    assert_eq!(doc.model.systems.len(), 2);

    let sys = doc.model.get_system("system_1").unwrap();
    assert_eq!(sys.sid_highwatermark, 5);
    assert_eq!(sys.blocks.len(), 5);
    assert_eq!(sys.connections.len(), 4);

    let gain = sys.find_block_by_name("Gain").unwrap();
    assert_eq!(gain.param("Gain"), Some("k"));
    assert_eq!(gain.position, vec![150, 45, 190, 81]);

    // Part order follows the file.
    let order: Vec<&str> = doc.opc.part_paths().collect();
    assert_eq!(
        order,
        vec![
            "/simulink/blockdiagram.xml",
            "/simulink/systems/system_root.xml",
            "/simulink/systems/system_1.xml",
        ]
    );
    assert_eq!(doc.opc.system_paths().len(), 2);
}

#[test]
fn verbatim_sidecar_round_trip() {
    let mdl = sample_mdl();
    let doc = MdlDocument::from_str(&mdl).unwrap();
    let meta = build_metadata(&doc.model, &doc.opc);
    let out = generator::write_with_metadata(&meta);
    assert_eq!(out, mdl);
}

#[test]
fn oc_output_is_stable_across_a_full_round_trip() {
    // mdl -> oc, oc -> (lift) -> model -> oc again: both OC texts match.
    let doc = MdlDocument::from_str(&sample_mdl()).unwrap();
    let root = doc.model.root_system().unwrap();
    let sub = root.subsystems().next().unwrap();
    let mut named = doc
        .model
        .get_system(sub.subsystem_ref.as_deref().unwrap())
        .unwrap()
        .clone();
    named.name = sub.name.clone();

    let mut generator1 = Generator::new(&doc.model);
    let parts1 = generator1.generate_parts(&named).unwrap();
    let oc1 = ocwrite::write_oc_file(&parts1, "plant");

    let outcome = parse_str(&oc1);
    assert!(outcome.success(), "errors: {:?}", outcome.errors);
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    assert!(lifter.diagnostics().is_empty(), "{:?}", lifter.diagnostics());

    let mut model2 = Model::default();
    let lifted_id = lifted.system.id.clone();
    model2.systems.insert(lifted_id.clone(), lifted.system);
    for (id, sys) in lifted.children {
        model2.systems.insert(id, sys);
    }

    let sys2 = model2.get_system(&lifted_id).unwrap();
    let mut generator2 = Generator::new(&model2);
    let parts2 = generator2.generate_parts(sys2).unwrap();
    let oc2 = ocwrite::write_oc_file(&parts2, "plant");

    assert_eq!(oc1, oc2);
}

#[test]
fn synthesized_mdl_parses_back() {
    // Forward to OC, lift, synthesize a fresh container, re-parse it.
    let doc = MdlDocument::from_str(&sample_mdl()).unwrap();
    let root = doc.model.root_system().unwrap();
    let sub = root.subsystems().next().unwrap();
    let mut named = doc
        .model
        .get_system(sub.subsystem_ref.as_deref().unwrap())
        .unwrap()
        .clone();
    named.name = sub.name.clone();

    let mut generator1 = Generator::new(&doc.model);
    let parts = generator1.generate_parts(&named).unwrap();
    let oc = ocwrite::write_oc_file(&parts, "plant");

    let outcome = parse_str(&oc);
    let ns = &outcome.file.namespaces[0];
    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);

    let mut model2 = Model {
        library_type: "BlockLibrary".to_string(),
        ..Model::default()
    };
    let mut root2 = oclink::model::System {
        id: "system_root".to_string(),
        zoom_factor: 100,
        sid_highwatermark: 1,
        ..oclink::model::System::default()
    };
    root2.blocks.push(oclink::model::Block {
        sid: "1".to_string(),
        block_type: "SubSystem".to_string(),
        name: "Controller".to_string(),
        position: vec![100, 100, 220, 180],
        zorder: 1,
        port_in: 2,
        port_out: 1,
        subsystem_ref: Some(lifted.system.id.clone()),
        ..oclink::model::Block::default()
    });
    model2
        .systems
        .insert(lifted.system.id.clone(), lifted.system);
    model2.systems.insert("system_root".to_string(), root2);

    let mdl2 = generator::write_from_model(&model2);
    assert!(mdl2.starts_with(HEADER));
    assert!(mdl2.contains("__MWOPC_PART_BEGIN__ /simulink/systems/system_root.xml\n"));
    assert!(mdl2.contains("__MWOPC_PART_BEGIN__ /simulink/systems/system_1.xml\n"));

    let doc2 = MdlDocument::from_str(&mdl2).unwrap();
    assert_eq!(doc2.model.library_type, "BlockLibrary");
    let root3 = doc2.model.root_system().unwrap();
    let sub3 = root3.subsystems().next().unwrap();
    assert_eq!(sub3.name, "Controller");

    let sys3 = doc2
        .model
        .get_system(sub3.subsystem_ref.as_deref().unwrap())
        .unwrap();
    assert_eq!(sys3.blocks.len(), 5);
    let types: Vec<&str> = sys3.blocks.iter().map(|b| b.block_type.as_str()).collect();
    assert_eq!(types, vec!["Inport", "Inport", "Gain", "Sum", "Outport"]);
    assert_eq!(sys3.find_block_by_name("Gain").unwrap().param("Gain"), Some("k"));
}
