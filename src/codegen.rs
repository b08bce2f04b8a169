//! Forward code generation: walk the IR and emit the OC update body,
//! aggregating config and state across nested subsystems.
//!
//! Emission discipline matters here: every block is preceded by a
//! `// <BlockType>: <BlockName>` comment and the trailing section opens
//! with `// Outputs`. The reverse lifter anchors on exactly these
//! markers, so losing one is a correctness bug on both sides.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::blocks::{sanitize, BlockKind};
use crate::discretize::{format_float, TransferFunction};
use crate::error::TranslateError;
use crate::model::{Block, Endpoint, Model, System};
use crate::schedule;

const INDENT: &str = "        ";

/// MATLAB builtins that never become config variables.
static MATLAB_BUILTINS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "sqrt", "exp", "log", "log10", "sin", "cos", "tan", "asin", "acos", "atan", "sinh",
        "cosh", "tanh", "abs", "floor", "ceil", "round", "mod", "sign", "max", "min", "pi",
        "inf", "nan", "eps", "true", "false",
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsystemMode {
    /// Copy subsystem blocks into the parent scope with prefixed names.
    #[default]
    Inline,
    /// Emit a reusable `component` per subsystem and call it.
    Extract,
}

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub subsystem_mode: SubsystemMode,
    pub max_depth: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            subsystem_mode: SubsystemMode::Inline,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateVar {
    pub name: String,
    /// `float` for scalar state; a component state type in extract mode.
    pub ty: String,
    pub comment: String,
}

/// Everything one element (or component) contributes to the OC output.
#[derive(Debug, Clone, Default)]
pub struct GeneratedParts {
    pub name: String,
    pub inports: Vec<(String, String)>,
    pub outports: Vec<(String, String)>,
    pub state_vars: Vec<StateVar>,
    pub config_vars: BTreeSet<String>,
    pub update_code: String,
    /// Extracted components, depth-first (children before their callers).
    pub components: Vec<GeneratedParts>,
}

pub struct Generator<'m> {
    model: &'m Model,
    options: CodegenOptions,
    state_vars: Vec<StateVar>,
    config_vars: BTreeSet<String>,
    components: Vec<GeneratedParts>,
    diagnostics: Vec<String>,
}

impl<'m> Generator<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self::with_options(model, CodegenOptions::default())
    }

    pub fn with_options(model: &'m Model, options: CodegenOptions) -> Self {
        Generator {
            model,
            options,
            state_vars: Vec::new(),
            config_vars: BTreeSet::new(),
            components: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Local, recoverable conditions met during the last `generate_parts`
    /// call (unknown block types, unresolved outport sources, ...).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn generate_parts(&mut self, sys: &System) -> Result<GeneratedParts, TranslateError> {
        self.generate_parts_at(sys, 0)
    }

    fn generate_parts_at(
        &mut self,
        sys: &System,
        depth: usize,
    ) -> Result<GeneratedParts, TranslateError> {
        self.state_vars.clear();
        self.config_vars.clear();
        self.components.clear();
        self.diagnostics.clear();

        self.collect_variables(sys, "", depth);

        let name = sanitize(if sys.name.is_empty() {
            &sys.id
        } else {
            &sys.name
        });

        let inport_blocks = sys.inports();
        let outport_blocks = sys.outports();

        let inports: Vec<(String, String)> = inport_blocks
            .iter()
            .map(|b| (sanitize(&b.name), "float".to_string()))
            .collect();
        let outports: Vec<(String, String)> = outport_blocks
            .iter()
            .map(|b| (sanitize(&b.name), "float".to_string()))
            .collect();

        let mut signal_map: IndexMap<String, String> = IndexMap::new();
        for inp in &inport_blocks {
            signal_map.insert(
                format!("{}#out:1", inp.sid),
                format!("in.{}", sanitize(&inp.name)),
            );
        }

        let mut code = String::new();
        self.emit_system(sys, "", &mut signal_map, &mut code, depth)?;

        let _ = write!(code, "\n{}// Outputs\n", INDENT);
        for outp in &outport_blocks {
            let mut assigned = false;
            for conn in &sys.connections {
                for dst_str in conn.destinations() {
                    let Ok(dst) = Endpoint::parse(dst_str) else {
                        continue;
                    };
                    if dst.block_sid != outp.sid {
                        continue;
                    }
                    let Ok(src) = Endpoint::parse(&conn.source) else {
                        continue;
                    };
                    if let Some(var) = signal_map.get(&src.format()) {
                        let _ = writeln!(
                            code,
                            "{}out.{} = {};",
                            INDENT,
                            sanitize(&outp.name),
                            var
                        );
                        assigned = true;
                    }
                }
            }
            if !assigned {
                self.diagnostics
                    .push(format!("outport '{}' has no resolvable source", outp.name));
            }
        }

        Ok(GeneratedParts {
            name,
            inports,
            outports,
            state_vars: std::mem::take(&mut self.state_vars),
            config_vars: std::mem::take(&mut self.config_vars),
            update_code: code,
            components: std::mem::take(&mut self.components),
        })
    }

    // Aggregation pre-walk

    fn collect_variables(&mut self, sys: &System, prefix: &str, depth: usize) {
        if depth > self.options.max_depth {
            return;
        }

        for blk in &sys.blocks {
            let var_prefix = join_prefix(prefix, &sanitize(&blk.name));
            let kind = BlockKind::from_type(&blk.block_type);

            if kind.is_stateful() {
                let scope = if prefix.is_empty() { "root" } else { prefix };
                self.state_vars.push(StateVar {
                    name: format!("{}_state", var_prefix),
                    ty: "float".to_string(),
                    comment: format!("{} in {}", blk.block_type, scope),
                });
            }

            if kind == BlockKind::TransferFcn {
                let tf = TransferFunction::from_block(blk);
                if tf.order <= 2 {
                    for i in 0..tf.order {
                        self.state_vars.push(StateVar {
                            name: format!("{}_tf_x{}", var_prefix, i),
                            ty: "float".to_string(),
                            comment: format!("TransferFcn output history {}", i),
                        });
                        self.state_vars.push(StateVar {
                            name: format!("{}_tf_u{}", var_prefix, i),
                            ty: "float".to_string(),
                            comment: format!("TransferFcn input history {}", i),
                        });
                    }
                }
            }

            self.collect_config_from_block(blk);

            if blk.is_subsystem() {
                match self.options.subsystem_mode {
                    SubsystemMode::Inline => {
                        if let Some(subsys) = blk
                            .subsystem_ref
                            .as_deref()
                            .and_then(|r| self.model.get_system(r))
                        {
                            self.collect_variables(subsys, &var_prefix, depth + 1);
                        }
                    }
                    SubsystemMode::Extract => {
                        self.state_vars.push(StateVar {
                            name: format!("{}_state", var_prefix),
                            ty: format!("{}_state", var_prefix),
                            comment: "component state".to_string(),
                        });
                    }
                }
            }
        }
    }

    fn collect_config_from_block(&mut self, blk: &Block) {
        const PARAM_NAMES: [&str; 8] = [
            "Gain",
            "UpperLimit",
            "LowerLimit",
            "Value",
            "InitialCondition",
            "Threshold",
            "Numerator",
            "Denominator",
        ];
        for pname in PARAM_NAMES {
            if let Some(v) = blk.param(pname) {
                extract_config_idents(v, &mut self.config_vars);
            }
        }
        for mp in &blk.mask_parameters {
            extract_config_idents(&mp.value, &mut self.config_vars);
        }
    }

    // Per-system emission

    fn emit_system(
        &mut self,
        sys: &System,
        prefix: &str,
        signal_map: &mut IndexMap<String, String>,
        code: &mut String,
        depth: usize,
    ) -> Result<(), TranslateError> {
        if depth > self.options.max_depth {
            let _ = writeln!(code, "{}// max subsystem depth reached", INDENT);
            self.diagnostics
                .push(format!("max subsystem depth reached in {}", sys.id));
            return Ok(());
        }

        // Pre-assign every block's output value names so references can
        // be resolved regardless of emission position.
        let mut state_var_map: IndexMap<String, String> = IndexMap::new();
        for blk in &sys.blocks {
            if BlockKind::from_type(&blk.block_type).is_stateful() {
                let var_prefix = join_prefix(prefix, &sanitize(&blk.name));
                state_var_map.insert(blk.sid.clone(), format!("state.{}_state", var_prefix));
            }
        }

        for blk in &sys.blocks {
            if blk.is_inport() || blk.is_outport() {
                continue;
            }
            let var_prefix = join_prefix(prefix, &sanitize(&blk.name));
            if blk.is_subsystem() {
                for i in 1..=blk.port_out.max(1) {
                    signal_map.insert(
                        format!("{}#out:{}", blk.sid, i),
                        format!("{}_out{}", var_prefix, i),
                    );
                }
                continue;
            }
            for i in 1..=blk.port_out.max(1) {
                let key = format!("{}#out:{}", blk.sid, i);
                let var = if let Some(state_var) = state_var_map.get(&blk.sid) {
                    state_var.clone()
                } else if blk.port_out > 1 {
                    format!("{}_{}", var_prefix, i)
                } else {
                    var_prefix.clone()
                };
                signal_map.insert(key, var);
            }
        }

        // Source endpoint key per destination port, resolved lazily at
        // emission time so pass-through remappings are visible downstream.
        let mut input_keys: IndexMap<String, Vec<Option<String>>> = IndexMap::new();
        for conn in &sys.connections {
            let Ok(src) = Endpoint::parse(&conn.source) else {
                continue;
            };
            let src_key = src.format();
            for dst_str in conn.destinations() {
                let Ok(dst) = Endpoint::parse(dst_str) else {
                    continue;
                };
                let slots = input_keys.entry(dst.block_sid.clone()).or_default();
                let idx = dst.port_index as usize;
                if slots.len() < idx {
                    slots.resize(idx, None);
                }
                slots[idx - 1] = Some(src_key.clone());
            }
        }

        let order = schedule::schedule(sys)?;
        for sid in &order {
            let Some(blk) = sys.find_block_by_sid(sid) else {
                continue;
            };
            if blk.is_inport() || blk.is_outport() {
                continue;
            }
            let keys = input_keys.get(sid).cloned().unwrap_or_default();
            self.emit_block(blk, &keys, prefix, &state_var_map, signal_map, code, depth)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_block(
        &mut self,
        blk: &Block,
        input_keys: &[Option<String>],
        prefix: &str,
        state_var_map: &IndexMap<String, String>,
        signal_map: &mut IndexMap<String, String>,
        code: &mut String,
        depth: usize,
    ) -> Result<(), TranslateError> {
        let var_prefix = join_prefix(prefix, &sanitize(&blk.name));
        let kind = BlockKind::from_type(&blk.block_type);

        if kind == BlockKind::SubSystem {
            return self.emit_subsystem(blk, input_keys, &var_prefix, signal_map, code, depth);
        }

        let out_var = signal_map
            .get(&format!("{}#out:1", blk.sid))
            .cloned()
            .unwrap_or_else(|| var_prefix.clone());

        let resolve_input = |map: &IndexMap<String, String>, idx: usize| -> String {
            match input_keys.get(idx) {
                Some(Some(key)) => map
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| "0.0f /* unknown */".to_string()),
                _ => format!("0.0f /* missing input {} */", idx + 1),
            }
        };
        let get_input = |idx: usize| resolve_input(signal_map, idx);
        let get_param = |name: &str, default: &str| -> String {
            blk.param(name)
                .map(format_param_value)
                .unwrap_or_else(|| default.to_string())
        };

        let _ = writeln!(code, "{}// {}: {}", INDENT, blk.block_type, blk.name);

        match kind {
            BlockKind::Gain => {
                let gain = get_param("Gain", "1.0f");
                let _ = writeln!(
                    code,
                    "{}auto {} = {} * {};",
                    INDENT,
                    out_var,
                    get_input(0),
                    gain
                );
            }
            BlockKind::Sum => {
                let spec = blk.param("Inputs").unwrap_or("++");
                let _ = write!(code, "{}auto {} = ", INDENT, out_var);
                let mut first = true;
                let mut idx = 0;
                for c in spec.chars() {
                    match c {
                        '|' => {}
                        '+' | '-' => {
                            if !first {
                                code.push(' ');
                            }
                            if c == '-' {
                                code.push_str("- ");
                            } else if !first {
                                code.push_str("+ ");
                            }
                            code.push_str(&get_input(idx));
                            idx += 1;
                            first = false;
                        }
                        _ => {}
                    }
                }
                code.push_str(";\n");
            }
            BlockKind::Product => {
                let spec = blk.param("Inputs").unwrap_or("**");
                if spec.contains('/') && !spec.contains('*') {
                    self.diagnostics.push(format!(
                        "Product '{}' has a division-only Inputs spec '{}'",
                        blk.name, spec
                    ));
                }
                let _ = write!(code, "{}auto {} = ", INDENT, out_var);
                let mut first = true;
                let mut idx = 0;
                for c in spec.chars() {
                    if c == '*' || c == '/' {
                        if !first {
                            code.push_str(if c == '*' { " * " } else { " / " });
                        }
                        code.push_str(&get_input(idx));
                        idx += 1;
                        first = false;
                    }
                }
                if idx == 0 {
                    code.push_str(&get_input(0));
                    code.push_str(" * ");
                    code.push_str(&get_input(1));
                }
                code.push_str(";\n");
            }
            BlockKind::Saturate => {
                let upper = get_param("UpperLimit", "1.0f");
                let lower = get_param("LowerLimit", "-1.0f");
                let _ = writeln!(
                    code,
                    "{}auto {} = std::clamp({}, {}, {});",
                    INDENT,
                    out_var,
                    get_input(0),
                    lower,
                    upper
                );
            }
            BlockKind::MinMax => {
                let func = blk.param("Function").unwrap_or("min");
                let f = if func.eq_ignore_ascii_case("max") {
                    "std::max"
                } else {
                    "std::min"
                };
                let _ = writeln!(
                    code,
                    "{}auto {} = {}({}, {});",
                    INDENT,
                    out_var,
                    f,
                    get_input(0),
                    get_input(1)
                );
            }
            BlockKind::Abs => {
                let _ = writeln!(
                    code,
                    "{}auto {} = std::abs({});",
                    INDENT,
                    out_var,
                    get_input(0)
                );
            }
            BlockKind::Constant => {
                let value = get_param("Value", "0.0f");
                let _ = writeln!(code, "{}auto {} = {};", INDENT, out_var, value);
            }
            BlockKind::UnitDelay | BlockKind::Memory => {
                let state_var = state_var_map.get(&blk.sid).cloned().unwrap_or_default();
                let _ = writeln!(
                    code,
                    "{}{} = {};  // update for next step",
                    INDENT,
                    state_var,
                    get_input(0)
                );
            }
            BlockKind::Integrator | BlockKind::DiscreteIntegrator => {
                let state_var = state_var_map.get(&blk.sid).cloned().unwrap_or_default();
                let _ = writeln!(
                    code,
                    "{}{} += {} * cfg.dt;",
                    INDENT,
                    state_var,
                    get_input(0)
                );
            }
            BlockKind::RelationalOperator => {
                let op = blk.param("Operator").unwrap_or("==");
                let op = if op == "~=" { "!=" } else { op };
                let _ = writeln!(
                    code,
                    "{}auto {} = ({} {} {}) ? 1.0f : 0.0f;",
                    INDENT,
                    out_var,
                    get_input(0),
                    op,
                    get_input(1)
                );
            }
            BlockKind::Logic => {
                let op = blk.param("Operator").unwrap_or("AND");
                if op == "NOT" {
                    let _ = writeln!(
                        code,
                        "{}auto {} = ({} == 0.0f) ? 1.0f : 0.0f;",
                        INDENT,
                        out_var,
                        get_input(0)
                    );
                } else {
                    let c_op = match op {
                        "OR" => "||",
                        "XOR" => "!=",
                        _ => "&&",
                    };
                    let _ = writeln!(
                        code,
                        "{}auto {} = (({} != 0.0f) {} ({} != 0.0f)) ? 1.0f : 0.0f;",
                        INDENT,
                        out_var,
                        get_input(0),
                        c_op,
                        get_input(1)
                    );
                }
            }
            BlockKind::Switch => {
                let threshold = get_param("Threshold", "0.0f");
                let criteria = blk.param("Criteria").unwrap_or("u2 >= Threshold");
                let cond = if criteria.contains(">=") {
                    format!("{} >= {}", get_input(1), threshold)
                } else if criteria.contains('>') {
                    format!("{} > {}", get_input(1), threshold)
                } else if criteria.contains("~=") || criteria.contains("!=") {
                    format!("{} != {}", get_input(1), threshold)
                } else {
                    format!("{} != 0.0f", get_input(1))
                };
                let _ = writeln!(
                    code,
                    "{}auto {} = ({}) ? {} : {};",
                    INDENT,
                    out_var,
                    cond,
                    get_input(0),
                    get_input(2)
                );
            }
            BlockKind::Trigonometry => {
                let func = blk.param("Operator").unwrap_or("sin");
                if func == "atan2" {
                    let _ = writeln!(
                        code,
                        "{}auto {} = std::atan2({}, {});",
                        INDENT,
                        out_var,
                        get_input(0),
                        get_input(1)
                    );
                } else {
                    let _ = writeln!(
                        code,
                        "{}auto {} = std::{}({});",
                        INDENT,
                        out_var,
                        func,
                        get_input(0)
                    );
                }
            }
            BlockKind::Math => {
                let func = blk.param("Operator").unwrap_or("sqrt");
                match func {
                    "sqrt" | "exp" | "log" | "log10" => {
                        let _ = writeln!(
                            code,
                            "{}auto {} = std::{}({});",
                            INDENT,
                            out_var,
                            func,
                            get_input(0)
                        );
                    }
                    "square" => {
                        let input = get_input(0);
                        let _ = writeln!(
                            code,
                            "{}auto {} = {} * {};",
                            INDENT,
                            out_var,
                            input,
                            input
                        );
                    }
                    "pow" => {
                        let _ = writeln!(
                            code,
                            "{}auto {} = std::pow({}, {});",
                            INDENT,
                            out_var,
                            get_input(0),
                            get_input(1)
                        );
                    }
                    other => {
                        self.diagnostics
                            .push(format!("Math operator '{}' in '{}'", other, blk.name));
                        let _ = writeln!(
                            code,
                            "{}auto {} = {};  // unsupported Math operator {}",
                            INDENT,
                            out_var,
                            get_input(0),
                            other
                        );
                    }
                }
            }
            BlockKind::TransferFcn => {
                self.emit_transfer_fcn(blk, &get_input(0), &out_var, &var_prefix, code);
            }
            BlockKind::Demux => {
                // Pass-through: every output shares the scalar input.
                let input = resolve_input(signal_map, 0);
                for i in 1..=blk.port_out.max(1) {
                    signal_map.insert(
                        format!("{}#out:{}", blk.sid, i),
                        format!("{} /* demux {} */", input, i),
                    );
                }
            }
            BlockKind::Mux => {
                let _ = writeln!(
                    code,
                    "{}auto {} = {};  // Mux passes first input",
                    INDENT,
                    out_var,
                    get_input(0)
                );
            }
            BlockKind::Inport | BlockKind::Outport | BlockKind::SubSystem => {}
            BlockKind::Unknown(ref t) => {
                eprintln!(
                    "[oclink] warning: unknown block type '{}' ({}), passing through",
                    t, blk.name
                );
                self.diagnostics
                    .push(format!("unknown block type '{}' in '{}'", t, blk.name));
                let _ = writeln!(
                    code,
                    "{}auto {} = {};  // unsupported block type {}",
                    INDENT,
                    out_var,
                    get_input(0),
                    t
                );
            }
        }

        Ok(())
    }

    fn emit_transfer_fcn(
        &mut self,
        blk: &Block,
        input: &str,
        out_var: &str,
        var_prefix: &str,
        code: &mut String,
    ) {
        let tf = TransferFunction::from_block(blk);
        let state = format!("state.{}_tf_", var_prefix);

        match tf.order {
            1 => {
                let (b0, b1, a0, a1) = tf.first_order_coeffs();
                let _ = writeln!(code, "{}{{", INDENT);
                let _ = writeln!(code, "{}    float k = 2.0f / cfg.dt;", INDENT);
                let _ = writeln!(
                    code,
                    "{}    float b0_d = {} * k + {};",
                    INDENT,
                    format_float(b0),
                    format_float(b1)
                );
                let _ = writeln!(
                    code,
                    "{}    float b1_d = -{} * k + {};",
                    INDENT,
                    format_float(b0),
                    format_float(b1)
                );
                let _ = writeln!(
                    code,
                    "{}    float a0_d = {} * k + {};",
                    INDENT,
                    format_float(a0),
                    format_float(a1)
                );
                let _ = writeln!(
                    code,
                    "{}    float a1_d = -{} * k + {};",
                    INDENT,
                    format_float(a0),
                    format_float(a1)
                );
                let _ = writeln!(code, "{}    float u_n = {};", INDENT, input);
                let _ = writeln!(
                    code,
                    "{}    float y_n = (b0_d * u_n + b1_d * {}u0 - a1_d * {}x0) / a0_d;",
                    INDENT, state, state
                );
                let _ = writeln!(code, "{}    {}u0 = u_n;", INDENT, state);
                let _ = writeln!(code, "{}    {}x0 = y_n;", INDENT, state);
                let _ = writeln!(code, "{}}}", INDENT);
                let _ = writeln!(code, "{}auto {} = {}x0;", INDENT, out_var, state);
            }
            2 => {
                let (b0, b1, b2, a0, a1, a2) = tf.second_order_coeffs();
                let _ = writeln!(code, "{}{{", INDENT);
                let _ = writeln!(code, "{}    float k = 2.0f / cfg.dt;", INDENT);
                let _ = writeln!(code, "{}    float k2 = k * k;", INDENT);
                let _ = writeln!(
                    code,
                    "{}    float b0_d = {}*k2 + {}*k + {};",
                    INDENT,
                    format_float(b0),
                    format_float(b1),
                    format_float(b2)
                );
                let _ = writeln!(
                    code,
                    "{}    float b1_d = 2.0f*{} - 2.0f*{}*k2;",
                    INDENT,
                    format_float(b2),
                    format_float(b0)
                );
                let _ = writeln!(
                    code,
                    "{}    float b2_d = {}*k2 - {}*k + {};",
                    INDENT,
                    format_float(b0),
                    format_float(b1),
                    format_float(b2)
                );
                let _ = writeln!(
                    code,
                    "{}    float a0_d = {}*k2 + {}*k + {};",
                    INDENT,
                    format_float(a0),
                    format_float(a1),
                    format_float(a2)
                );
                let _ = writeln!(
                    code,
                    "{}    float a1_d = 2.0f*{} - 2.0f*{}*k2;",
                    INDENT,
                    format_float(a2),
                    format_float(a0)
                );
                let _ = writeln!(
                    code,
                    "{}    float a2_d = {}*k2 - {}*k + {};",
                    INDENT,
                    format_float(a0),
                    format_float(a1),
                    format_float(a2)
                );
                let _ = writeln!(code, "{}    float u_n = {};", INDENT, input);
                let _ = writeln!(
                    code,
                    "{}    float y_n = (b0_d*u_n + b1_d*{s}u0 + b2_d*{s}u1 - a1_d*{s}x0 - a2_d*{s}x1) / a0_d;",
                    INDENT,
                    s = state
                );
                let _ = writeln!(code, "{}    {s}u1 = {s}u0;", INDENT, s = state);
                let _ = writeln!(code, "{}    {}u0 = u_n;", INDENT, state);
                let _ = writeln!(code, "{}    {s}x1 = {s}x0;", INDENT, s = state);
                let _ = writeln!(code, "{}    {}x0 = y_n;", INDENT, state);
                let _ = writeln!(code, "{}}}", INDENT);
                let _ = writeln!(code, "{}auto {} = {}x0;", INDENT, out_var, state);
            }
            n => {
                eprintln!(
                    "[oclink] warning: TransferFcn '{}' has order {}, passing through",
                    blk.name, n
                );
                self.diagnostics
                    .push(format!("TransferFcn '{}' has order {}", blk.name, n));
                let _ = writeln!(
                    code,
                    "{}// order {} transfer function not supported",
                    INDENT, n
                );
                let _ = writeln!(code, "{}auto {} = {};", INDENT, out_var, input);
            }
        }
    }

    fn emit_subsystem(
        &mut self,
        blk: &Block,
        input_keys: &[Option<String>],
        var_prefix: &str,
        signal_map: &mut IndexMap<String, String>,
        code: &mut String,
        depth: usize,
    ) -> Result<(), TranslateError> {
        let resolved_inputs: Vec<String> = (0..input_keys.len().max(blk.port_in as usize))
            .map(|i| match input_keys.get(i) {
                Some(Some(key)) => signal_map
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| "0.0f /* unknown */".to_string()),
                _ => format!("0.0f /* missing input {} */", i + 1),
            })
            .collect();

        let Some(subsys) = blk
            .subsystem_ref
            .as_deref()
            .and_then(|r| self.model.get_system(r))
        else {
            eprintln!(
                "[oclink] warning: subsystem '{}' has no resolvable system reference",
                blk.name
            );
            self.diagnostics
                .push(format!("subsystem '{}' not found", blk.name));
            let _ = writeln!(code, "{}// missing subsystem {}", INDENT, sanitize(&blk.name));
            let input = resolved_inputs
                .first()
                .cloned()
                .unwrap_or_else(|| "0.0f /* missing input 1 */".to_string());
            let _ = writeln!(code, "{}auto {}_out1 = {};", INDENT, var_prefix, input);
            return Ok(());
        };

        match self.options.subsystem_mode {
            SubsystemMode::Inline => {
                self.emit_subsystem_inline(subsys, blk, &resolved_inputs, var_prefix, signal_map, code, depth)
            }
            SubsystemMode::Extract => {
                self.emit_component_call(subsys, blk, &resolved_inputs, var_prefix, code, depth)
            }
        }
    }

    fn emit_subsystem_inline(
        &mut self,
        subsys: &System,
        blk: &Block,
        inputs: &[String],
        var_prefix: &str,
        signal_map: &mut IndexMap<String, String>,
        code: &mut String,
        depth: usize,
    ) -> Result<(), TranslateError> {
        let _ = writeln!(code, "{}// --- subsystem {} ---", INDENT, sanitize(&blk.name));

        // The subsystem sees the parent scope plus its own inport bindings.
        let mut sub_map = signal_map.clone();
        for (i, inp) in subsys.inports().iter().enumerate() {
            let value = inputs
                .get(i)
                .cloned()
                .unwrap_or_else(|| "0.0f /* missing subsystem input */".to_string());
            sub_map.insert(format!("{}#out:1", inp.sid), value);
        }

        self.emit_system(subsys, var_prefix, &mut sub_map, code, depth + 1)?;

        for (i, outp) in subsys.outports().iter().enumerate() {
            let mut value = "0.0f /* unmapped outport */".to_string();
            for conn in &subsys.connections {
                for dst_str in conn.destinations() {
                    let Ok(dst) = Endpoint::parse(dst_str) else {
                        continue;
                    };
                    if dst.block_sid != outp.sid {
                        continue;
                    }
                    if let Ok(src) = Endpoint::parse(&conn.source) {
                        if let Some(v) = sub_map.get(&src.format()) {
                            value = v.clone();
                        }
                    }
                }
            }
            let alias = format!("{}_out{}", var_prefix, i + 1);
            let _ = writeln!(code, "{}auto {} = {};", INDENT, alias, value);
            signal_map.insert(format!("{}#out:{}", blk.sid, i + 1), alias);
        }

        let _ = writeln!(code, "{}// --- end {} ---", INDENT, sanitize(&blk.name));
        Ok(())
    }

    fn emit_component_call(
        &mut self,
        subsys: &System,
        blk: &Block,
        inputs: &[String],
        var_prefix: &str,
        code: &mut String,
        depth: usize,
    ) -> Result<(), TranslateError> {
        // Generate the component itself once, depth-first.
        if !self.components.iter().any(|c| c.name == var_prefix) {
            let mut named = subsys.clone();
            named.name = var_prefix.to_string();
            let mut child = Generator::with_options(self.model, self.options.clone());
            let parts = child.generate_parts_at(&named, depth + 1)?;
            self.diagnostics.extend(child.diagnostics.iter().cloned());
            let mut queue = parts.components.clone();
            self.components.append(&mut queue);
            let flat = GeneratedParts {
                components: Vec::new(),
                ..parts
            };
            self.components.push(flat);
        }

        let in_fields: Vec<String> = subsys
            .inports()
            .iter()
            .enumerate()
            .map(|(i, inp)| {
                let value = inputs
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("0.0f /* missing input {} */", i + 1));
                format!(".{} = {}", sanitize(&inp.name), value)
            })
            .collect();

        let _ = writeln!(code, "{}// Component call: {}", INDENT, blk.name);
        let _ = writeln!(
            code,
            "{}{}_input {}_in{{{}}};",
            INDENT,
            var_prefix,
            var_prefix,
            in_fields.join(", ")
        );
        let _ = writeln!(code, "{}{}_output {}_out{{}};", INDENT, var_prefix, var_prefix);
        let _ = writeln!(
            code,
            "{}{}_update({}_in, state.{}_state, {}_out);",
            INDENT, var_prefix, var_prefix, var_prefix, var_prefix
        );
        for (i, outp) in subsys.outports().iter().enumerate() {
            let _ = writeln!(
                code,
                "{}auto {}_out{} = {}_out.{};",
                INDENT,
                var_prefix,
                i + 1,
                var_prefix,
                sanitize(&outp.name)
            );
        }
        Ok(())
    }
}

fn join_prefix(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

/// Collect candidate config identifiers out of a parameter expression:
/// every alphabetic-leading word that is not a MATLAB builtin.
pub fn extract_config_idents(expr: &str, vars: &mut BTreeSet<String>) {
    let mut current = String::new();
    for c in expr.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else {
            if current
                .chars()
                .next()
                .is_some_and(|f| f.is_ascii_alphabetic())
                && !MATLAB_BUILTINS.contains(current.as_str())
            {
                vars.insert(current.clone());
            }
            current.clear();
        }
    }
}

/// Format a block parameter value for emission: MATLAB constants become
/// literals, a pure identifier becomes a `cfg.` reference, anything else
/// is passed through verbatim.
pub fn format_param_value(value: &str) -> String {
    if value.is_empty() {
        return "0.0f".to_string();
    }

    let mut result = value.to_string();
    result = replace_word(&result, "pi", "3.14159265358979f");
    result = replace_word(&result, "inf", "std::numeric_limits<float>::infinity()");
    result = replace_word(&result, "eps", "std::numeric_limits<float>::epsilon()");

    let is_identifier = result
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && result.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if is_identifier {
        return format!("cfg.{}", result);
    }
    result
}

/// Whole-word replacement: `from` must not be flanked by identifier chars.
fn replace_word(s: &str, from: &str, to: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut pos = 0;
    while let Some(found) = s[pos..].find(from) {
        let start = pos + found;
        let end = start + from.len();
        let word_start = start == 0 || !(bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_');
        let word_end = end >= s.len() || !(bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
        result.push_str(&s[pos..start]);
        if word_start && word_end {
            result.push_str(to);
        } else {
            result.push_str(from);
        }
        pos = end;
    }
    result.push_str(&s[pos..]);
    result
}
