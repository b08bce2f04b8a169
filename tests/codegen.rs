use oclink::blocks::sanitize;
use oclink::codegen::{CodegenOptions, Generator, SubsystemMode};
use oclink::model::{Block, Connection, MaskParameter, Model, System};
use oclink::ocwrite;

fn block(sid: &str, ty: &str, name: &str) -> Block {
    Block {
        sid: sid.to_string(),
        block_type: ty.to_string(),
        name: name.to_string(),
        ..Block::default()
    }
}

fn conn(src: &str, dst: &str) -> Connection {
    Connection {
        source: src.to_string(),
        destination: dst.to_string(),
        ..Connection::default()
    }
}

fn single_system_model(sys: System) -> Model {
    let mut model = Model::default();
    model.systems.insert(sys.id.clone(), sys);
    model
}

/// Inport u -> Gain (mask k=2.0) -> Sum <- Inport v; Sum -> Outport y.
fn gain_sum_model() -> Model {
    let mut gain = block("2", "Gain", "Gain");
    gain.parameters.insert("Gain".to_string(), "k".to_string());
    gain.mask_parameters.push(MaskParameter {
        name: "k".to_string(),
        param_type: "edit".to_string(),
        prompt: "Gain value".to_string(),
        value: "2.0".to_string(),
    });
    let mut sum = block("3", "Sum", "Sum");
    sum.parameters.insert("Inputs".to_string(), "++".to_string());
    let mut v = block("4", "Inport", "v");
    v.parameters.insert("Port".to_string(), "2".to_string());

    single_system_model(System {
        id: "system_1".to_string(),
        name: "Controller".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            gain,
            sum,
            v,
            block("5", "Outport", "y"),
        ],
        connections: vec![
            conn("1#out:1", "2#in:1"),
            conn("2#out:1", "3#in:1"),
            conn("4#out:1", "3#in:2"),
            conn("3#out:1", "5#in:1"),
        ],
        ..System::default()
    })
}

#[test]
fn gain_sum_update_body() {
    let model = gain_sum_model();
    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    let expected = "        // Gain: Gain\n\
                    \x20       auto Gain = in.u * cfg.k;\n\
                    \x20       // Sum: Sum\n\
                    \x20       auto Sum = Gain + in.v;\n\
                    \n\
                    \x20       // Outputs\n\
                    \x20       out.y = Sum;\n";
    assert_eq!(parts.update_code, expected);

    assert_eq!(
        parts.inports,
        vec![
            ("u".to_string(), "float".to_string()),
            ("v".to_string(), "float".to_string())
        ]
    );
    assert_eq!(parts.outports, vec![("y".to_string(), "float".to_string())]);
    assert!(parts.state_vars.is_empty());
    assert_eq!(
        parts.config_vars.iter().cloned().collect::<Vec<_>>(),
        vec!["k".to_string()]
    );
}

#[test]
fn gain_sum_oc_file_layout() {
    let model = gain_sum_model();
    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();
    let oc = ocwrite::write_oc_file(&parts, "plant");

    assert!(oc.starts_with("namespace plant {\n\n"));
    assert!(oc.ends_with("} // namespace plant\n"));
    assert!(oc.contains("element Controller {\n    frequency: 1kHz;\n"));
    assert!(oc.contains("    input {\n        float u;\n        float v;\n    }\n"));
    assert!(oc.contains("    output {\n        float y;\n    }\n"));
    assert!(oc.contains(
        "    config {\n        float k;\n        float dt = 0.001;  // sample time\n    }\n"
    ));
}

#[test]
fn unit_delay_emission() {
    let mut delay = block("2", "UnitDelay", "D");
    delay
        .parameters
        .insert("InitialCondition".to_string(), "0".to_string());
    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Delayed".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            delay,
            block("3", "Outport", "y"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    let expected = "        // UnitDelay: D\n\
                    \x20       state.D_state = in.u;  // update for next step\n\
                    \n\
                    \x20       // Outputs\n\
                    \x20       out.y = state.D_state;\n";
    assert_eq!(parts.update_code, expected);

    assert_eq!(parts.state_vars.len(), 1);
    assert_eq!(parts.state_vars[0].name, "D_state");
    assert_eq!(parts.state_vars[0].comment, "UnitDelay in root");

    // cfg.dt is declared even with no other config variables.
    let oc = ocwrite::write_oc_file(&parts, "plant");
    assert!(oc.contains("    state {\n        float D_state = 0.0;  // UnitDelay in root\n    }\n"));
    assert!(oc.contains("        float dt = 0.001;  // sample time\n"));
}

#[test]
fn transfer_fcn_first_order_emission() {
    let mut tf = block("2", "TransferFcn", "H");
    tf.parameters
        .insert("Numerator".to_string(), "[1]".to_string());
    tf.parameters
        .insert("Denominator".to_string(), "[0.02 1]".to_string());
    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Lag".to_string(),
        blocks: vec![block("1", "Inport", "u"), tf, block("3", "Outport", "y")],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts.update_code.contains("// TransferFcn: H\n"));
    assert!(parts.update_code.contains("            float k = 2.0f / cfg.dt;\n"));
    assert!(parts
        .update_code
        .contains("            float b0_d = 0.000000f * k + 1.000000f;\n"));
    assert!(parts
        .update_code
        .contains("            float a0_d = 0.020000f * k + 1.000000f;\n"));
    assert!(parts
        .update_code
        .contains("            float y_n = (b0_d * u_n + b1_d * state.H_tf_u0 - a1_d * state.H_tf_x0) / a0_d;\n"));
    assert!(parts.update_code.contains("        auto H = state.H_tf_x0;\n"));
    assert!(parts.update_code.contains("        out.y = state.H_tf_x0;\n"));

    let names: Vec<&str> = parts.state_vars.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["H_tf_x0", "H_tf_u0"]);
}

#[test]
fn transfer_fcn_high_order_passes_through() {
    let mut tf = block("2", "TransferFcn", "H");
    tf.parameters
        .insert("Numerator".to_string(), "[1]".to_string());
    tf.parameters
        .insert("Denominator".to_string(), "[1 0 0 1]".to_string());
    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Cubic".to_string(),
        blocks: vec![block("1", "Inport", "u"), tf, block("3", "Outport", "y")],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts
        .update_code
        .contains("// order 3 transfer function not supported"));
    assert!(parts.update_code.contains("auto H = in.u;"));
    assert!(generator
        .diagnostics()
        .iter()
        .any(|d| d.contains("order 3")));
}

#[test]
fn fan_out_shares_one_local() {
    let mut g1 = block("2", "Gain", "G1");
    g1.parameters.insert("Gain".to_string(), "2.0".to_string());
    let mut g2 = block("3", "Gain", "G2");
    g2.parameters.insert("Gain".to_string(), "3.0".to_string());

    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Fan".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            g1,
            g2,
            block("4", "Outport", "a"),
            {
                let mut b = block("5", "Outport", "b");
                b.parameters.insert("Port".to_string(), "2".to_string());
                b
            },
        ],
        connections: vec![
            Connection {
                source: "1#out:1".to_string(),
                branches: vec![
                    oclink::model::Branch {
                        destination: "2#in:1".to_string(),
                        ..oclink::model::Branch::default()
                    },
                    oclink::model::Branch {
                        destination: "3#in:1".to_string(),
                        ..oclink::model::Branch::default()
                    },
                ],
                ..Connection::default()
            },
            conn("2#out:1", "4#in:1"),
            conn("3#out:1", "5#in:1"),
        ],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts.update_code.contains("auto G1 = in.u * 2.0;"));
    assert!(parts.update_code.contains("auto G2 = in.u * 3.0;"));
}

#[test]
fn every_emitted_block_carries_its_marker() {
    let model = gain_sum_model();
    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    for blk in &sys.blocks {
        if blk.is_inport() || blk.is_outport() {
            continue;
        }
        let marker = format!("// {}: {}\n", blk.block_type, blk.name);
        assert!(
            parts.update_code.contains(&marker),
            "missing marker for {}",
            blk.name
        );
    }
    assert!(parts.update_code.contains("\n        // Outputs\n"));
}

#[test]
fn missing_inputs_are_annotated() {
    // Gain with no incoming connection.
    let mut gain = block("1", "Gain", "G");
    gain.parameters.insert("Gain".to_string(), "2.0".to_string());
    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Orphan".to_string(),
        blocks: vec![gain, block("2", "Outport", "y")],
        connections: vec![conn("1#out:1", "2#in:1")],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();
    assert!(parts.update_code.contains("0.0f /* missing input 1 */"));
}

#[test]
fn unknown_block_type_passes_through_with_note() {
    let model = single_system_model(System {
        id: "system_1".to_string(),
        name: "Odd".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            block("2", "Quantizer", "Q"),
            block("3", "Outport", "y"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    });

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts.update_code.contains("// Quantizer: Q\n"));
    assert!(parts
        .update_code
        .contains("auto Q = in.u;  // unsupported block type Quantizer"));
    assert!(generator
        .diagnostics()
        .iter()
        .any(|d| d.contains("Quantizer")));
}

#[test]
fn subsystem_inlining_prefixes_names() {
    // Outer: u -> SubSystem(PI) -> y; inner: e -> Gain(Kp) -> out.
    let mut inner_gain = block("2", "Gain", "Kp");
    inner_gain
        .parameters
        .insert("Gain".to_string(), "kp".to_string());
    let inner = System {
        id: "system_2".to_string(),
        blocks: vec![
            block("1", "Inport", "e"),
            inner_gain,
            block("3", "Outport", "u_out"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    };

    let mut sub = block("2", "SubSystem", "PI");
    sub.subsystem_ref = Some("system_2".to_string());
    let outer = System {
        id: "system_1".to_string(),
        name: "Ctrl".to_string(),
        blocks: vec![
            block("1", "Inport", "err"),
            sub,
            block("3", "Outport", "cmd"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    };

    let mut model = Model::default();
    model.systems.insert("system_1".to_string(), outer);
    model.systems.insert("system_2".to_string(), inner);

    let sys = model.get_system("system_1").unwrap();
    let mut generator = Generator::new(&model);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts.update_code.contains("// --- subsystem PI ---"));
    assert!(parts.update_code.contains("auto PI_Kp = in.err * cfg.kp;"));
    assert!(parts.update_code.contains("auto PI_out1 = PI_Kp;"));
    assert!(parts.update_code.contains("// --- end PI ---"));
    assert!(parts.update_code.contains("out.cmd = PI_out1;"));
    assert!(parts.config_vars.contains("kp"));
    assert!(parts.components.is_empty());
}

#[test]
fn subsystem_extraction_emits_component_call() {
    let mut inner_gain = block("2", "Gain", "Kp");
    inner_gain
        .parameters
        .insert("Gain".to_string(), "kp".to_string());
    let inner = System {
        id: "system_2".to_string(),
        blocks: vec![
            block("1", "Inport", "e"),
            inner_gain,
            block("3", "Outport", "u_out"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    };

    let mut sub = block("2", "SubSystem", "PI");
    sub.subsystem_ref = Some("system_2".to_string());
    let outer = System {
        id: "system_1".to_string(),
        name: "Ctrl".to_string(),
        blocks: vec![
            block("1", "Inport", "err"),
            sub,
            block("3", "Outport", "cmd"),
        ],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "3#in:1")],
        ..System::default()
    };

    let mut model = Model::default();
    model.systems.insert("system_1".to_string(), outer);
    model.systems.insert("system_2".to_string(), inner);

    let sys = model.get_system("system_1").unwrap();
    let options = CodegenOptions {
        subsystem_mode: SubsystemMode::Extract,
        ..CodegenOptions::default()
    };
    let mut generator = Generator::with_options(&model, options);
    let parts = generator.generate_parts(sys).unwrap();

    assert!(parts.update_code.contains("// Component call: PI\n"));
    assert!(parts.update_code.contains("PI_input PI_in{.e = in.err};"));
    assert!(parts.update_code.contains("PI_output PI_out{};"));
    assert!(parts
        .update_code
        .contains("PI_update(PI_in, state.PI_state, PI_out);"));
    assert!(parts.update_code.contains("auto PI_out1 = PI_out.u_out;"));
    assert!(parts.update_code.contains("out.cmd = PI_out1;"));

    // The component is generated once, before the element.
    assert_eq!(parts.components.len(), 1);
    let comp = &parts.components[0];
    assert_eq!(comp.name, "PI");
    assert!(comp.update_code.contains("auto Kp = in.e * cfg.kp;"));
    assert!(comp.config_vars.contains("kp"));

    // The parent holds the component state.
    assert!(parts
        .state_vars
        .iter()
        .any(|s| s.name == "PI_state" && s.ty == "PI_state"));

    let oc = ocwrite::write_oc_file(&parts, "plant");
    let comp_pos = oc.find("component PI {").unwrap();
    let elem_pos = oc.find("element Ctrl {").unwrap();
    assert!(comp_pos < elem_pos);
}

#[test]
fn sanitize_is_idempotent_and_clean() {
    for name in ["Motor Speed", "3phase", "a-b.c", "x__y", "já!", "9"] {
        let once = sanitize(name);
        assert!(!once.starts_with(|c: char| c.is_ascii_digit()));
        assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(sanitize(&once), once);
    }
    assert_eq!(sanitize("Motor Speed"), "Motor_Speed");
    assert_eq!(sanitize("3phase"), "_3phase");
}
