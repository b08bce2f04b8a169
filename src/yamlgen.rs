//! Ancillary YAML schema emission: one `_schema.yaml` per element,
//! describing its signal groups.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::blocks::{is_stateful_type, sanitize};
use crate::codegen::extract_config_idents;
use crate::model::{Block, Model, System};

#[derive(Debug, Clone, Default)]
pub struct SignalDef {
    pub name: String,
    pub description: String,
    pub ty: String,
    pub array_size: u32,
    pub default_value: String,
    pub units: String,
}

#[derive(Debug, Clone, Default)]
pub struct ElementSchema {
    pub name: String,
    pub description: String,
    pub parent_library: String,
    pub inputs: Vec<SignalDef>,
    pub config: Vec<SignalDef>,
    pub outputs: Vec<SignalDef>,
    pub state: Vec<SignalDef>,
}

pub fn write_schema(schema: &ElementSchema) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str("metadata:\n");
    let _ = writeln!(out, "    name: {}", schema.name);
    out.push_str("    type: A\n");
    out.push_str("    revision: 0\n");
    out.push_str("    format_version: 0.0\n");
    let _ = writeln!(
        out,
        "    description: '{}'",
        escape_yaml(&schema.description)
    );
    let _ = writeln!(out, "    parent_library: '{}'", schema.parent_library);
    out.push_str("    category: 'element'\n");
    out.push('\n');

    let groups: [(&str, &str, &[SignalDef]); 4] = [
        ("IN", "inputs_group", &schema.inputs),
        ("CONFIG", "config_group", &schema.config),
        ("OUT", "outputs_group", &schema.outputs),
        ("STATE", "state_group", &schema.state),
    ];
    for (title, use_name, signals) in groups {
        if signals.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}:", title);
        let _ = writeln!(out, "    use: {}", use_name);
        if title == "CONFIG" {
            out.push_str("    description: 'Configuration parameters'\n");
        }
        out.push_str("    signals:\n");
        for sig in signals {
            let _ = writeln!(out, "        {}:", sig.name);
            let _ = writeln!(
                out,
                "            description: '{}'",
                escape_yaml(&sig.description)
            );
            let _ = writeln!(out, "            type: {}", sig.ty);
            if sig.array_size > 0 {
                let _ = writeln!(out, "            array: {}", sig.array_size);
            }
            if !sig.default_value.is_empty() {
                let _ = writeln!(out, "            default: {}", sig.default_value);
            }
            if !sig.units.is_empty() {
                let _ = writeln!(out, "            units: '{}'", sig.units);
            }
        }
        out.push('\n');
    }

    out
}

pub fn convert(model: &Model, sys: &System, library_name: &str) -> ElementSchema {
    let mut schema = ElementSchema {
        name: sanitize(if sys.name.is_empty() { &sys.id } else { &sys.name }),
        parent_library: library_name.to_string(),
        description: format!("Imported from Simulink subsystem {}", sys.id),
        ..ElementSchema::default()
    };

    for inp in sys.inports() {
        schema.inputs.push(port_signal(inp, "Input port"));
    }
    for outp in sys.outports() {
        schema.outputs.push(port_signal(outp, "Output port"));
    }

    let mut seen = BTreeSet::new();
    collect_config_state(
        model,
        sys,
        &mut schema.config,
        &mut schema.state,
        &mut seen,
        0,
    );

    schema
}

/// Port names may carry a `[n]` suffix marking an array signal.
fn port_signal(blk: &Block, what: &str) -> SignalDef {
    let mut sig = SignalDef {
        name: sanitize(&blk.name),
        description: format!("{} {}", what, blk.name),
        ty: "float".to_string(),
        default_value: "0.0f".to_string(),
        ..SignalDef::default()
    };
    if let (Some(open), Some(close)) = (blk.name.find('['), blk.name.find(']')) {
        if open < close {
            if let Ok(size) = blk.name[open + 1..close].trim().parse() {
                sig.array_size = size;
                sig.name = sanitize(&blk.name[..open]);
            }
        }
    }
    sig
}

fn collect_config_state(
    model: &Model,
    sys: &System,
    config: &mut Vec<SignalDef>,
    state: &mut Vec<SignalDef>,
    seen: &mut BTreeSet<String>,
    depth: usize,
) {
    if depth > 10 {
        return;
    }

    const PARAM_NAMES: [&str; 8] = [
        "Gain",
        "UpperLimit",
        "LowerLimit",
        "Value",
        "InitialCondition",
        "SampleTime",
        "Threshold",
        "OnSwitchValue",
    ];

    for blk in &sys.blocks {
        for mp in &blk.mask_parameters {
            if !seen.insert(mp.name.clone()) {
                continue;
            }
            config.push(SignalDef {
                name: mp.name.clone(),
                description: if mp.prompt.is_empty() {
                    mp.name.clone()
                } else {
                    mp.prompt.clone()
                },
                ty: "float".to_string(),
                default_value: if mp.value.is_empty() {
                    "0.0f".to_string()
                } else {
                    mp.value.clone()
                },
                ..SignalDef::default()
            });
        }

        for pname in PARAM_NAMES {
            let Some(value) = blk.param(pname) else {
                continue;
            };
            let mut idents = BTreeSet::new();
            extract_config_idents(value, &mut idents);
            for ident in idents {
                if !seen.insert(ident.clone()) {
                    continue;
                }
                config.push(SignalDef {
                    name: ident,
                    description: format!("Workspace variable used in {}.{}", blk.name, pname),
                    ty: "float".to_string(),
                    default_value: "0.0f".to_string(),
                    ..SignalDef::default()
                });
            }
        }

        if is_stateful_type(&blk.block_type) {
            let state_name = format!("{}_state", sanitize(&blk.name));
            if seen.insert(state_name.clone()) {
                state.push(SignalDef {
                    name: state_name,
                    description: format!("State for {}", blk.name),
                    ty: "float".to_string(),
                    default_value: "0.0f".to_string(),
                    ..SignalDef::default()
                });
            }
        }

        if blk.is_subsystem() {
            if let Some(subsys) = blk
                .subsystem_ref
                .as_deref()
                .and_then(|r| model.get_system(r))
            {
                collect_config_state(model, subsys, config, state, seen, depth + 1);
            }
        }
    }
}

fn escape_yaml(s: &str) -> String {
    s.replace('\'', "''")
}
