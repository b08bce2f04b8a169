use oclink::codegen::{CodegenOptions, Generator, SubsystemMode};
use oclink::lift::Lifter;
use oclink::model::{Block, Connection, Model, System};
use oclink::ocparse::parse_str;
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

fn has_wire(sys: &System, src: &str, dst: &str) -> bool {
    sys.connections.iter().any(|c| {
        c.source == src
            && (c.destination == dst || c.branches.iter().any(|b| b.destination == dst))
    })
}

#[test]
fn gain_sum_reverse() {
    let src = r#"namespace plant {

element Controller {
    frequency: 1kHz;

    input {
        float u;
        float v;
    }

    output {
        float y;
    }

    config {
        float k;
        float dt = 0.001;  // sample time
    }

    update {
        // Gain: Gain
        auto Gain = in.u * cfg.k;
        // Sum: Sum
        auto Sum = Gain + in.v;

        // Outputs
        out.y = Sum;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success(), "errors: {:?}", outcome.errors);
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    assert!(lifter.diagnostics().is_empty(), "{:?}", lifter.diagnostics());

    let sys = &lifted.system;
    assert_eq!(sys.id, "system_1");
    assert_eq!(sys.name, "Controller");
    assert_eq!(sys.blocks.len(), 5);

    let types: Vec<&str> = sys.blocks.iter().map(|b| b.block_type.as_str()).collect();
    assert_eq!(types, vec!["Inport", "Inport", "Gain", "Sum", "Outport"]);

    let gain = sys.find_block_by_name("Gain").unwrap();
    assert_eq!(gain.param("Gain"), Some("k"));
    let sum = sys.find_block_by_name("Sum").unwrap();
    assert_eq!(sum.param("Inputs"), Some("|++"));
    assert_eq!(sum.port_in, 2);

    // u -> Gain, Gain -> Sum:1, v -> Sum:2, Sum -> y.
    assert!(has_wire(sys, "1#out:1", "3#in:1"));
    assert!(has_wire(sys, "3#out:1", "4#in:1"));
    assert!(has_wire(sys, "2#out:1", "4#in:2"));
    assert!(has_wire(sys, "4#out:1", "5#in:1"));
    assert_eq!(sys.connections.len(), 4);
}

#[test]
fn unit_delay_reverse() {
    let src = r#"namespace plant {

element Delayed {

    input {
        float u;
    }

    output {
        float y;
    }

    state {
        float D_state = 0.0;  // UnitDelay in root
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // UnitDelay: D
        state.D_state = in.u;  // update for next step

        // Outputs
        out.y = state.D_state;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    assert_eq!(sys.blocks.len(), 3);
    let delay = sys.find_block_by_name("D").unwrap();
    assert_eq!(delay.block_type, "UnitDelay");

    // The delay output resolves forward into the outport.
    assert!(has_wire(sys, "1#out:1", &format!("{}#in:1", delay.sid)));
    assert!(has_wire(sys, &format!("{}#out:1", delay.sid), "3#in:1"));
}

#[test]
fn integrator_reverse() {
    let src = r#"namespace plant {

element Ramp {

    input {
        float u;
    }

    output {
        float y;
    }

    state {
        float I_state = 0.0;  // Integrator in root
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // Integrator: I
        state.I_state += in.u * cfg.dt;

        // Outputs
        out.y = state.I_state;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    let integ = sys.find_block_by_name("I").unwrap();
    assert_eq!(integ.block_type, "Integrator");
    assert!(has_wire(sys, "1#out:1", &format!("{}#in:1", integ.sid)));
    assert!(has_wire(sys, &format!("{}#out:1", integ.sid), "3#in:1"));
}

#[test]
fn transfer_fcn_coefficients_recovered() {
    // Exactly the scoped form the forward pass emits for
    // H(s) = 1 / (0.02 s + 1).
    let src = r#"namespace plant {

element Lag {

    input {
        float u;
    }

    output {
        float y;
    }

    state {
        float H_tf_x0 = 0.0;
        float H_tf_u0 = 0.0;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // TransferFcn: H
        {
            float k = 2.0f / cfg.dt;
            float b0_d = 0.000000f * k + 1.000000f;
            float b1_d = -0.000000f * k + 1.000000f;
            float a0_d = 0.020000f * k + 1.000000f;
            float a1_d = -0.020000f * k + 1.000000f;
            float u_n = in.u;
            float y_n = (b0_d * u_n + b1_d * state.H_tf_u0 - a1_d * state.H_tf_x0) / a0_d;
            state.H_tf_u0 = u_n;
            state.H_tf_x0 = y_n;
        }
        auto H = state.H_tf_x0;

        // Outputs
        out.y = H;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success(), "errors: {:?}", outcome.errors);
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    let tf = sys.find_block_by_name("H").unwrap();
    assert_eq!(tf.block_type, "TransferFcn");
    assert_eq!(tf.param("Numerator"), Some("[1]"));
    assert_eq!(tf.param("Denominator"), Some("[0.02 1]"));

    assert!(has_wire(sys, "1#out:1", &format!("{}#in:1", tf.sid)));
    assert!(has_wire(sys, &format!("{}#out:1", tf.sid), "3#in:1"));
}

#[test]
fn second_order_transfer_fcn_recovered() {
    let src = r#"namespace plant {

element Reso {

    input {
        float u;
    }

    output {
        float y;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // TransferFcn: H
        {
            float k = 2.0f / cfg.dt;
            float k2 = k * k;
            float b0_d = 0.000000f*k2 + 0.000000f*k + 1.000000f;
            float b1_d = 2.0f*1.000000f - 2.0f*0.000000f*k2;
            float b2_d = 0.000000f*k2 - 0.000000f*k + 1.000000f;
            float a0_d = 1.000000f*k2 + 2.000000f*k + 1.000000f;
            float a1_d = 2.0f*1.000000f - 2.0f*1.000000f*k2;
            float a2_d = 1.000000f*k2 - 2.000000f*k + 1.000000f;
            float u_n = in.u;
            float y_n = (b0_d*u_n + b1_d*state.H_tf_u0 + b2_d*state.H_tf_u1 - a1_d*state.H_tf_x0 - a2_d*state.H_tf_x1) / a0_d;
            state.H_tf_u1 = state.H_tf_u0;
            state.H_tf_u0 = u_n;
            state.H_tf_x1 = state.H_tf_x0;
            state.H_tf_x0 = y_n;
        }
        auto H = state.H_tf_x0;

        // Outputs
        out.y = H;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);

    let tf = lifted.system.find_block_by_name("H").unwrap();
    assert_eq!(tf.param("Numerator"), Some("[1]"));
    assert_eq!(tf.param("Denominator"), Some("[1 2 1]"));
}

#[test]
fn fan_out_becomes_one_connection_with_branches() {
    let src = r#"namespace plant {

element Fan {

    input {
        float u;
    }

    output {
        float a;
        float b;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // Gain: G1
        auto G1 = in.u * 2.0;
        // Gain: G2
        auto G2 = in.u * 3.0;

        // Outputs
        out.a = G1;
        out.b = G2;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    let shared = sys
        .connections
        .iter()
        .find(|c| c.source == "1#out:1")
        .expect("fan-out connection");
    assert!(shared.destination.is_empty());
    assert_eq!(shared.branches.len(), 2);
    assert_eq!(shared.branches[0].destination, "2#in:1");
    assert_eq!(shared.branches[1].destination, "3#in:1");
}

#[test]
fn saturate_switch_and_relational_reverse() {
    let src = r#"namespace plant {

element Mix {

    input {
        float u;
        float v;
    }

    output {
        float y;
    }

    config {
        float hi;
        float dt = 0.001;  // sample time
    }

    update {
        // Saturate: Clamp
        auto Clamp = std::clamp(in.u, -1.0f, cfg.hi);
        // RelationalOperator: Cmp
        auto Cmp = (in.u > in.v) ? 1.0f : 0.0f;
        // Switch: Pick
        auto Pick = (in.v >= 0.5) ? Clamp : Cmp;

        // Outputs
        out.y = Pick;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    assert!(lifter.diagnostics().is_empty(), "{:?}", lifter.diagnostics());
    let sys = &lifted.system;

    let clamp = sys.find_block_by_name("Clamp").unwrap();
    assert_eq!(clamp.block_type, "Saturate");
    assert_eq!(clamp.param("LowerLimit"), Some("-1.0f"));
    assert_eq!(clamp.param("UpperLimit"), Some("hi"));

    let cmp = sys.find_block_by_name("Cmp").unwrap();
    assert_eq!(cmp.param("Operator"), Some(">"));

    let pick = sys.find_block_by_name("Pick").unwrap();
    assert_eq!(pick.block_type, "Switch");
    assert_eq!(pick.param("Criteria"), Some("u2 >= Threshold"));
    assert_eq!(pick.param("Threshold"), Some("0.5"));
    // Port 1: taken value, port 2: condition, port 3: alternative.
    assert!(has_wire(sys, &format!("{}#out:1", clamp.sid), &format!("{}#in:1", pick.sid)));
    assert!(has_wire(sys, "2#out:1", &format!("{}#in:2", pick.sid)));
    assert!(has_wire(sys, &format!("{}#out:1", cmp.sid), &format!("{}#in:3", pick.sid)));
}

#[test]
fn logic_operators_reverse() {
    let src = r#"namespace plant {

element Gates {

    input {
        float a;
        float b;
    }

    output {
        float y;
        float z;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // Logic: Both
        auto Both = ((in.a != 0.0f) && (in.b != 0.0f)) ? 1.0f : 0.0f;
        // Logic: Neg
        auto Neg = (in.a == 0.0f) ? 1.0f : 0.0f;

        // Outputs
        out.y = Both;
        out.z = Neg;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    let both = sys.find_block_by_name("Both").unwrap();
    assert_eq!(both.param("Operator"), Some("AND"));
    assert_eq!(both.port_in, 2);

    let neg = sys.find_block_by_name("Neg").unwrap();
    assert_eq!(neg.param("Operator"), Some("NOT"));
    assert_eq!(neg.port_in, 1);
}

#[test]
fn unresolved_references_are_reported_not_dropped_silently() {
    let src = r#"namespace plant {

element Odd {

    input {
        float u;
    }

    output {
        float y;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // Gain: G
        auto G = mystery * 2.0;

        // Outputs
        out.y = G;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);

    assert!(lifter
        .diagnostics()
        .iter()
        .any(|d| d.contains("mystery")));

    // No connection was invented for the unknown name.
    let gain = lifted.system.find_block_by_name("G").unwrap();
    let gain_in = format!("{}#in:1", gain.sid);
    assert!(!lifted
        .system
        .connections
        .iter()
        .any(|c| c.destination == gain_in));
}

#[test]
fn component_call_round_trip() {
    // Build the model, emit in extraction mode, then lift the result.
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

    let options = CodegenOptions {
        subsystem_mode: SubsystemMode::Extract,
        ..CodegenOptions::default()
    };
    let mut generator = Generator::with_options(&model, options);
    let parts = generator
        .generate_parts(model.get_system("system_1").unwrap())
        .unwrap();
    let oc = ocwrite::write_oc_file(&parts, "plant");

    let outcome = parse_str(&oc);
    assert!(outcome.success(), "errors: {:?}", outcome.errors);
    let ns = &outcome.file.namespaces[0];
    assert_eq!(ns.components.len(), 1);

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    assert!(lifter.diagnostics().is_empty(), "{:?}", lifter.diagnostics());

    let sys = &lifted.system;
    assert_eq!(sys.blocks.len(), 3);
    let call = sys.find_block_by_name("PI").unwrap();
    assert_eq!(call.block_type, "SubSystem");
    assert_eq!(call.subsystem_ref.as_deref(), Some("system_2"));

    assert!(has_wire(sys, "1#out:1", &format!("{}#in:1", call.sid)));
    assert!(has_wire(sys, &format!("{}#out:1", call.sid), "3#in:1"));

    assert_eq!(lifted.children.len(), 1);
    let (child_id, child) = &lifted.children[0];
    assert_eq!(child_id, "system_2");
    let kp = child.find_block_by_name("Kp").unwrap();
    assert_eq!(kp.block_type, "Gain");
    assert_eq!(kp.param("Gain"), Some("kp"));
}

#[test]
fn blocks_receive_layout_positions() {
    let src = r#"namespace plant {

element Chain {

    input {
        float u;
    }

    output {
        float y;
    }

    config {
        float dt = 0.001;  // sample time
    }

    update {
        // Gain: G
        auto G = in.u * 2.0;
        // Abs: A
        auto A = std::abs(G);

        // Outputs
        out.y = A;
    }
}

} // namespace plant
"#;
    let outcome = parse_str(src);
    assert!(outcome.success());
    let ns = &outcome.file.namespaces[0];

    let mut counter = 0;
    let mut lifter = Lifter::new(&ns.components);
    let lifted = lifter.lift_element(&ns.elements[0], &mut counter);
    let sys = &lifted.system;

    // Column 0 for the inport, then one column per chain step, outport last.
    let x_of = |name: &str| sys.find_block_by_name(name).unwrap().position[0];
    assert_eq!(x_of("u"), 50);
    assert_eq!(x_of("G"), 210);
    assert_eq!(x_of("A"), 370);
    assert_eq!(x_of("y"), 530);
    for blk in &sys.blocks {
        assert_eq!(blk.position.len(), 4);
    }
}
