use oclink::error::TranslateError;
use oclink::model::{Block, Connection, System};
use oclink::schedule::schedule;

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

fn gain_sum_system() -> System {
    System {
        id: "system_1".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            block("2", "Gain", "Gain"),
            block("3", "Sum", "Sum"),
            block("4", "Inport", "v"),
            block("5", "Outport", "y"),
        ],
        connections: vec![
            conn("1#out:1", "2#in:1"),
            conn("2#out:1", "3#in:1"),
            conn("4#out:1", "3#in:2"),
            conn("3#out:1", "5#in:1"),
        ],
        ..System::default()
    }
}

#[test]
fn every_non_inport_block_appears_once() {
    let sys = gain_sum_system();
    let order = schedule(&sys).unwrap();
    assert_eq!(order.len(), 3);
    for sid in ["2", "3", "5"] {
        assert_eq!(order.iter().filter(|s| s.as_str() == sid).count(), 1);
    }
}

#[test]
fn dependencies_precede_dependents() {
    let sys = gain_sum_system();
    let order = schedule(&sys).unwrap();
    let pos = |sid: &str| order.iter().position(|s| s == sid).unwrap();
    assert!(pos("2") < pos("3"));
    assert!(pos("3") < pos("5"));
}

#[test]
fn order_is_deterministic() {
    let sys = gain_sum_system();
    let first = schedule(&sys).unwrap();
    let second = schedule(&sys).unwrap();
    assert_eq!(first, second);

    let clone = sys.clone();
    assert_eq!(schedule(&clone).unwrap(), first);
}

#[test]
fn stateful_blocks_break_feedback_loops() {
    // u -> Sum -> Delay -> back into Sum.
    let sys = System {
        id: "system_fb".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            block("2", "Sum", "Sum"),
            block("3", "UnitDelay", "D"),
            block("4", "Outport", "y"),
        ],
        connections: vec![
            conn("1#out:1", "2#in:1"),
            conn("2#out:1", "3#in:1"),
            conn("3#out:1", "2#in:2"),
            conn("3#out:1", "4#in:1"),
        ],
        ..System::default()
    };

    let order = schedule(&sys).unwrap();
    assert_eq!(order.len(), 3);
    // The delay edge into the Sum carries no dependency, so the Sum is
    // ready first by insertion order.
    let pos = |sid: &str| order.iter().position(|s| s == sid).unwrap();
    assert!(pos("2") < pos("3"));
}

#[test]
fn combinational_cycles_are_reported() {
    let sys = System {
        id: "system_loop".to_string(),
        blocks: vec![block("1", "Gain", "A"), block("2", "Gain", "B")],
        connections: vec![conn("1#out:1", "2#in:1"), conn("2#out:1", "1#in:1")],
        ..System::default()
    };

    match schedule(&sys) {
        Err(TranslateError::UnbreakableCycle { system, blocks }) => {
            assert_eq!(system, "system_loop");
            assert_eq!(blocks.len(), 2);
        }
        other => panic!("expected UnbreakableCycle, got {:?}", other),
    }
}

#[test]
fn duplicate_fanout_edges_count_once() {
    // One source feeding two ports of the same Sum must not deadlock
    // the in-degree bookkeeping.
    let sys = System {
        id: "system_dup".to_string(),
        blocks: vec![
            block("1", "Inport", "u"),
            block("2", "Gain", "G"),
            block("3", "Sum", "S"),
        ],
        connections: vec![
            conn("1#out:1", "2#in:1"),
            Connection {
                source: "2#out:1".to_string(),
                branches: vec![
                    oclink::model::Branch {
                        destination: "3#in:1".to_string(),
                        ..oclink::model::Branch::default()
                    },
                    oclink::model::Branch {
                        destination: "3#in:2".to_string(),
                        ..oclink::model::Branch::default()
                    },
                ],
                ..Connection::default()
            },
        ],
        ..System::default()
    };

    let order = schedule(&sys).unwrap();
    assert_eq!(order, vec!["2".to_string(), "3".to_string()]);
}
