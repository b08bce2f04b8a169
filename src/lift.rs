//! Reverse lifting: reconstruct an IR system from the update body the
//! forward pass emitted.
//!
//! The lifter's domain is exactly the output of this crate's codegen; it
//! anchors on the `// <BlockType>: <BlockName>` markers and the
//! `// Outputs` section and inverts the per-block emission table. It is
//! deliberately not a general OC compiler.

use indexmap::IndexMap;

use crate::blocks::BlockKind;
use crate::discretize::format_coefficient_list;
use crate::layout;
use crate::model::{Block, Branch, Connection, System};
use crate::ocparse::{OcComponent, OcElement, SectionKind};

/// A lifted element or component body plus the child systems created
/// for component calls.
#[derive(Debug, Default)]
pub struct LiftedSystem {
    pub system: System,
    pub children: Vec<(String, System)>,
}

struct IrConn {
    src_sid: u32,
    src_port: u32,
    dst_sid: u32,
    dst_port: u32,
}

#[derive(Debug, Clone)]
struct StateEntry {
    state_key: String,
    /// `state.X += ...` (integrators) as opposed to `state.X = ...`.
    accumulating: bool,
    sid: u32,
}

#[derive(Debug, Clone, Default)]
struct TfScan {
    input_var: String,
    numerator: String,
    denominator: String,
}

pub struct Lifter<'a> {
    components: &'a [OcComponent],
    diagnostics: Vec<String>,
}

impl<'a> Lifter<'a> {
    pub fn new(components: &'a [OcComponent]) -> Self {
        Lifter {
            components,
            diagnostics: Vec::new(),
        }
    }

    /// Unresolved references and other local conditions met while lifting.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn lift_element(&mut self, elem: &OcElement, sys_counter: &mut u32) -> LiftedSystem {
        *sys_counter += 1;
        let id = format!("system_{}", sys_counter);
        self.lift_entity(
            &id,
            &elem.name,
            elem.section_vars(SectionKind::Input),
            elem.section_vars(SectionKind::Output),
            &elem.update,
            sys_counter,
        )
    }

    pub fn lift_component(&mut self, comp: &OcComponent, sys_counter: &mut u32) -> LiftedSystem {
        *sys_counter += 1;
        let id = format!("system_{}", sys_counter);
        self.lift_entity(
            &id,
            &comp.name,
            comp.section_vars(SectionKind::Input),
            comp.section_vars(SectionKind::Output),
            &comp.update,
            sys_counter,
        )
    }

    fn lift_entity(
        &mut self,
        id: &str,
        name: &str,
        inputs: &[crate::ocparse::VarDecl],
        outputs: &[crate::ocparse::VarDecl],
        update: &str,
        sys_counter: &mut u32,
    ) -> LiftedSystem {
        let lines: Vec<&str> = update.lines().collect();

        let mut blocks: Vec<Block> = Vec::new();
        let mut conns: Vec<IrConn> = Vec::new();
        let mut var_map: IndexMap<String, (u32, u32)> = IndexMap::new();
        let mut children: Vec<(String, System)> = Vec::new();
        let mut sid: u32 = 1;

        for (i, var) in inputs.iter().enumerate() {
            let mut blk = Block {
                sid: sid.to_string(),
                block_type: "Inport".to_string(),
                name: var.name.clone(),
                port_in: 0,
                port_out: 1,
                ..Block::default()
            };
            if i > 0 {
                blk.parameters
                    .insert("Port".to_string(), (i + 1).to_string());
            }
            var_map.insert(format!("in.{}", var.name), (sid, 1));
            blocks.push(blk);
            sid += 1;
        }

        self.parse_update_body(
            &lines,
            &mut blocks,
            &mut conns,
            &mut var_map,
            &mut sid,
            sys_counter,
            &mut children,
        );

        let output_assignments = extract_output_assignments(&lines);
        for (i, var) in outputs.iter().enumerate() {
            let mut blk = Block {
                sid: sid.to_string(),
                block_type: "Outport".to_string(),
                name: var.name.clone(),
                port_in: 1,
                port_out: 0,
                ..Block::default()
            };
            if i > 0 {
                blk.parameters
                    .insert("Port".to_string(), (i + 1).to_string());
            }
            let dst = sid;
            blocks.push(blk);
            sid += 1;
            if let Some(src_var) = output_assignments.get(&var.name) {
                self.resolve_input(src_var, &var_map, &mut conns, dst, 1);
            }
        }

        let mut sys = System {
            id: id.to_string(),
            name: name.to_string(),
            zoom_factor: 100,
            sid_highwatermark: (sid - 1) as i32,
            blocks,
            connections: group_connections(&conns),
            ..System::default()
        };
        layout::auto_layout(&mut sys);

        LiftedSystem {
            system: sys,
            children,
        }
    }

    // Pre-scan

    /// Reserve SIDs for stateful blocks (their outputs resolve forward)
    /// and read Tustin coefficient lines back into continuous
    /// numerator/denominator parameters.
    #[allow(clippy::type_complexity)]
    fn prescan(
        &mut self,
        lines: &[&str],
        var_map: &mut IndexMap<String, (u32, u32)>,
        sid: &mut u32,
    ) -> (Vec<StateEntry>, IndexMap<String, TfScan>) {
        let mut state_entries = Vec::new();
        let mut tf_data: IndexMap<String, TfScan> = IndexMap::new();

        let mut pending_type = String::new();
        let mut pending_name = String::new();

        let mut in_tf_scope = false;
        let mut tf_depth = 0i32;
        let mut tf_name = String::new();
        let mut tf = TfScan::default();
        let mut tf_num: Option<Vec<f64>> = None;
        let mut tf_den: Option<Vec<f64>> = None;

        for raw in lines {
            let t = raw.trim();
            if t.is_empty() {
                continue;
            }

            if let Some(comment) = t.strip_prefix("//") {
                let comment = comment.trim();
                if comment == "Outputs" {
                    break;
                }
                if let Some((ty, nm)) = split_marker(comment) {
                    pending_type = ty;
                    pending_name = nm;
                }
                continue;
            }

            if in_tf_scope {
                for c in t.chars() {
                    if c == '{' {
                        tf_depth += 1;
                    }
                    if c == '}' {
                        tf_depth -= 1;
                    }
                }
                if let Some(rest) = t.strip_prefix("float u_n = ") {
                    tf.input_var = rest.trim_end_matches(';').trim().to_string();
                }
                if let Some(coeffs) = parse_coeff_line(t, "b0_d") {
                    tf_num = Some(coeffs);
                }
                if let Some(coeffs) = parse_coeff_line(t, "a0_d") {
                    tf_den = Some(coeffs);
                }
                if tf_depth <= 0 {
                    if let Some(num) = tf_num.take() {
                        tf.numerator = format_coefficient_list(&num);
                    } else {
                        tf.numerator = "[1]".to_string();
                    }
                    if let Some(den) = tf_den.take() {
                        tf.denominator = format_coefficient_list(&den);
                    } else {
                        tf.denominator = "[1]".to_string();
                    }
                    tf_data.insert(tf_name.clone(), std::mem::take(&mut tf));
                    in_tf_scope = false;
                    pending_type.clear();
                    pending_name.clear();
                }
                continue;
            }

            if t == "{" && pending_type == "TransferFcn" {
                in_tf_scope = true;
                tf_depth = 1;
                tf_name = pending_name.clone();
                tf = TfScan::default();
                tf_num = None;
                tf_den = None;
                continue;
            }

            // Integrator form: state.X += expr * cfg.dt;
            if t.starts_with("state.")
                && t.contains("+=")
                && t.contains("* cfg.dt")
                && (pending_type == "Integrator" || pending_type == "DiscreteIntegrator")
            {
                if let Some(state_var) = between(t, "state.", "+=") {
                    let rsid = *sid;
                    *sid += 1;
                    state_entries.push(StateEntry {
                        state_key: format!("state.{}", state_var),
                        accumulating: true,
                        sid: rsid,
                    });
                    var_map.insert(format!("state.{}", state_var), (rsid, 1));
                }
                pending_type.clear();
                continue;
            }

            // Delay form: state.X = expr;  // update for next step
            if t.starts_with("state.")
                && t.contains('=')
                && !t.contains("+=")
                && !t.contains("_tf_")
                && (pending_type == "UnitDelay" || pending_type == "Memory")
            {
                if let Some(state_var) = between(t, "state.", "=") {
                    let rsid = *sid;
                    *sid += 1;
                    state_entries.push(StateEntry {
                        state_key: format!("state.{}", state_var),
                        accumulating: false,
                        sid: rsid,
                    });
                    var_map.insert(format!("state.{}", state_var), (rsid, 1));
                }
                pending_type.clear();
                continue;
            }
        }

        (state_entries, tf_data)
    }

    // Main pass

    #[allow(clippy::too_many_arguments)]
    fn parse_update_body(
        &mut self,
        lines: &[&str],
        blocks: &mut Vec<Block>,
        conns: &mut Vec<IrConn>,
        var_map: &mut IndexMap<String, (u32, u32)>,
        sid: &mut u32,
        sys_counter: &mut u32,
        children: &mut Vec<(String, System)>,
    ) {
        let (state_entries, tf_data) = self.prescan(lines, var_map, sid);

        let mut pending_type = String::new();
        let mut pending_name = String::new();

        let mut i = 0;
        while i < lines.len() {
            let t = lines[i].trim();
            if t.is_empty() {
                i += 1;
                continue;
            }

            if let Some(comment) = t.strip_prefix("//") {
                let comment = comment.trim();
                if comment == "Outputs" {
                    break;
                }
                if let Some((ty, nm)) = split_marker(comment) {
                    pending_type = ty;
                    pending_name = nm;

                    // Demux is comment-only: no statement follows it.
                    if pending_type == "Demux" {
                        let mut blk = Block {
                            sid: sid.to_string(),
                            block_type: "Demux".to_string(),
                            name: pending_name.clone(),
                            port_in: 1,
                            port_out: 2,
                            ..Block::default()
                        };
                        blk.parameters
                            .insert("Outputs".to_string(), "2".to_string());
                        blocks.push(blk);
                        *sid += 1;
                        pending_type.clear();
                        pending_name.clear();
                    }
                }
                i += 1;
                continue;
            }

            // Component call pattern spans several lines.
            if pending_type == "Component call" {
                i = self.lift_component_call(
                    lines,
                    i,
                    &pending_name,
                    blocks,
                    conns,
                    var_map,
                    sid,
                    sys_counter,
                    children,
                );
                pending_type.clear();
                pending_name.clear();
                continue;
            }

            // TransferFcn scope internals are consumed by the pre-scan.
            if t == "{" || t == "}" {
                i += 1;
                continue;
            }
            if t.starts_with("float ") {
                i += 1;
                continue;
            }
            if t.starts_with("state.") && t.contains("_tf_") {
                i += 1;
                continue;
            }

            if let Some(rest) = t.strip_prefix("auto ") {
                if let Some((var_name, expr)) = split_assignment(rest) {
                    if pending_type.is_empty() {
                        // Alias: keep fan-through wiring resolvable.
                        if let Some(target) = self.lookup(&expr, var_map) {
                            var_map.insert(var_name, target);
                        }
                        i += 1;
                        continue;
                    }

                    let blk_sid = *sid;
                    *sid += 1;
                    let mut blk = Block {
                        sid: blk_sid.to_string(),
                        block_type: pending_type.clone(),
                        name: pending_name.clone(),
                        ..Block::default()
                    };

                    if pending_type == "TransferFcn" {
                        blk.port_in = 1;
                        blk.port_out = 1;
                        if let Some(tf) = tf_data.get(&pending_name) {
                            self.resolve_input(&tf.input_var, var_map, conns, blk_sid, 1);
                            blk.parameters
                                .insert("Numerator".to_string(), tf.numerator.clone());
                            blk.parameters
                                .insert("Denominator".to_string(), tf.denominator.clone());
                        } else {
                            self.resolve_input(&expr, var_map, conns, blk_sid, 1);
                        }
                    } else {
                        self.create_block(&mut blk, &expr, var_map, conns);
                    }

                    blocks.push(blk);
                    var_map.insert(var_name, (blk_sid, 1));
                    pending_type.clear();
                    pending_name.clear();
                }
                i += 1;
                continue;
            }

            // Integrator update: state.X += expr * cfg.dt;
            if t.starts_with("state.") && t.contains("+=") && t.contains("* cfg.dt") {
                if pending_type == "Integrator" || pending_type == "DiscreteIntegrator" {
                    if let Some(state_var) = between(t, "state.", "+=") {
                        let key = format!("state.{}", state_var);
                        let blk_sid = state_entries
                            .iter()
                            .find(|e| e.state_key == key && e.accumulating)
                            .map(|e| e.sid)
                            .unwrap_or_else(|| {
                                let s = *sid;
                                *sid += 1;
                                s
                            });
                        let blk = Block {
                            sid: blk_sid.to_string(),
                            block_type: pending_type.clone(),
                            name: pending_name.clone(),
                            port_in: 1,
                            port_out: 1,
                            ..Block::default()
                        };
                        let input = t
                            .split("+=")
                            .nth(1)
                            .and_then(|rest| rest.split("* cfg.dt").next())
                            .unwrap_or("")
                            .trim()
                            .to_string();
                        self.resolve_input(&input, var_map, conns, blk_sid, 1);
                        blocks.push(blk);
                    }
                    pending_type.clear();
                    pending_name.clear();
                }
                i += 1;
                continue;
            }

            // Delay update: state.X = expr;  // update for next step
            if t.starts_with("state.") && t.contains('=') && !t.contains("+=") {
                if pending_type == "UnitDelay" || pending_type == "Memory" {
                    if let Some(state_var) = between(t, "state.", "=") {
                        let key = format!("state.{}", state_var);
                        let blk_sid = state_entries
                            .iter()
                            .find(|e| e.state_key == key && !e.accumulating)
                            .map(|e| e.sid)
                            .unwrap_or_else(|| {
                                let s = *sid;
                                *sid += 1;
                                s
                            });
                        let blk = Block {
                            sid: blk_sid.to_string(),
                            block_type: pending_type.clone(),
                            name: pending_name.clone(),
                            port_in: 1,
                            port_out: 1,
                            ..Block::default()
                        };
                        let input = t
                            .split('=')
                            .nth(1)
                            .unwrap_or("")
                            .to_string();
                        self.resolve_input(&input, var_map, conns, blk_sid, 1);
                        blocks.push(blk);
                        var_map.insert(key, (blk_sid, 1));
                    }
                    pending_type.clear();
                    pending_name.clear();
                }
                i += 1;
                continue;
            }

            i += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lift_component_call(
        &mut self,
        lines: &[&str],
        i: usize,
        display_name: &str,
        blocks: &mut Vec<Block>,
        conns: &mut Vec<IrConn>,
        var_map: &mut IndexMap<String, (u32, u32)>,
        sid: &mut u32,
        sys_counter: &mut u32,
        children: &mut Vec<(String, System)>,
    ) -> usize {
        let t = lines[i].trim();
        let Some(underscore) = t.find("_input ") else {
            return i + 1;
        };
        let comp_type = t[..underscore].to_string();

        let comp_def = self.components.iter().find(|c| c.name == comp_type);
        let (in_count, out_count) = match comp_def {
            Some(c) => (
                c.section_vars(SectionKind::Input).len(),
                c.section_vars(SectionKind::Output).len(),
            ),
            None => (0, 0),
        };

        // `.field = value` initializers of the input struct.
        let mut input_values = Vec::new();
        if let (Some(open), Some(close)) = (t.find('{'), t.rfind('}')) {
            if open < close {
                for field in split_top_level(&t[open + 1..close], ',') {
                    if let Some((_, value)) = field.split_once('=') {
                        input_values.push(value.trim().to_string());
                    }
                }
            }
        }

        let blk_sid = *sid;
        *sid += 1;
        let mut blk = Block {
            sid: blk_sid.to_string(),
            block_type: "SubSystem".to_string(),
            name: display_name.to_string(),
            port_in: (in_count.max(input_values.len())) as u32,
            port_out: out_count.max(1) as u32,
            ..Block::default()
        };

        if let Some(comp) = comp_def {
            let lifted = self.lift_component(comp, sys_counter);
            blk.subsystem_ref = Some(lifted.system.id.clone());
            children.push((lifted.system.id.clone(), lifted.system));
            children.extend(lifted.children);
        } else {
            self.diagnostics
                .push(format!("component '{}' has no definition", comp_type));
        }

        for (p, value) in input_values.iter().enumerate() {
            self.resolve_input(value, var_map, conns, blk_sid, (p + 1) as u32);
        }
        blocks.push(blk);

        // Skip the output-struct and update-call lines, then consume the
        // `auto <comp>_outN = <comp>_out.<field>;` extractions.
        let mut j = i + 3;
        let out_prefix = format!("{}_out.", comp_type);
        let mut out_port = 1u32;
        while j < lines.len() {
            let next = lines[j].trim();
            let Some(rest) = next.strip_prefix("auto ") else {
                break;
            };
            let Some((var_name, expr)) = split_assignment(rest) else {
                break;
            };
            if !expr.starts_with(&out_prefix) {
                break;
            }
            var_map.insert(var_name, (blk_sid, out_port));
            out_port += 1;
            j += 1;
        }
        j
    }

    // Per-kind inverse constructors

    fn create_block(
        &mut self,
        blk: &mut Block,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        let blk_sid: u32 = blk.sid.parse().unwrap_or(0);
        match BlockKind::from_type(&blk.block_type) {
            BlockKind::Gain => self.create_gain(blk, blk_sid, expr, var_map, conns),
            BlockKind::Sum => self.create_sum(blk, blk_sid, expr, var_map, conns),
            BlockKind::Product => self.create_product(blk, blk_sid, expr, var_map, conns),
            BlockKind::Constant => {
                blk.port_in = 0;
                blk.port_out = 1;
                blk.parameters
                    .insert("Value".to_string(), strip_cfg(expr).to_string());
            }
            BlockKind::Saturate => self.create_saturate(blk, blk_sid, expr, var_map, conns),
            BlockKind::MinMax => self.create_minmax(blk, blk_sid, expr, var_map, conns),
            BlockKind::Switch => self.create_switch(blk, blk_sid, expr, var_map, conns),
            BlockKind::RelationalOperator => {
                self.create_relational(blk, blk_sid, expr, var_map, conns)
            }
            BlockKind::Logic => self.create_logic(blk, blk_sid, expr, var_map, conns),
            BlockKind::Abs => {
                blk.port_in = 1;
                blk.port_out = 1;
                if let Some(arg) = call_args(expr).and_then(|a| a.into_iter().next()) {
                    self.resolve_input(&arg, var_map, conns, blk_sid, 1);
                }
            }
            BlockKind::Trigonometry => self.create_trig(blk, blk_sid, expr, var_map, conns),
            BlockKind::Math => self.create_math(blk, blk_sid, expr, var_map, conns),
            BlockKind::Mux => {
                blk.port_in = 1;
                blk.port_out = 1;
                self.resolve_input(expr, var_map, conns, blk_sid, 1);
            }
            _ => {
                // Unknown types were emitted as pass-throughs.
                blk.port_in = 1;
                blk.port_out = 1;
                self.resolve_input(expr, var_map, conns, blk_sid, 1);
            }
        }
    }

    fn create_gain(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 1;
        blk.port_out = 1;

        if let Some((left, right)) = expr.split_once(" * ") {
            let (left, right) = (left.trim(), right.trim());
            if self.is_variable(left, var_map) {
                self.resolve_input(left, var_map, conns, sid, 1);
                blk.parameters
                    .insert("Gain".to_string(), strip_cfg(right).to_string());
            } else if self.is_variable(right, var_map) {
                self.resolve_input(right, var_map, conns, sid, 1);
                blk.parameters
                    .insert("Gain".to_string(), strip_cfg(left).to_string());
            } else {
                self.resolve_input(left, var_map, conns, sid, 1);
                blk.parameters
                    .insert("Gain".to_string(), strip_cfg(right).to_string());
            }
        } else if let Some((left, right)) = expr.split_once(" / ") {
            self.resolve_input(left.trim(), var_map, conns, sid, 1);
            blk.parameters
                .insert("Gain".to_string(), format!("1/{}", strip_cfg(right.trim())));
        } else {
            self.resolve_input(expr, var_map, conns, sid, 1);
            blk.parameters.insert("Gain".to_string(), "1".to_string());
        }
    }

    fn create_sum(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_out = 1;

        let mut signs = String::new();
        let mut operands: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut sign = '+';
        for c in expr.chars().chain(std::iter::once('\0')) {
            if c == '+' || c == '-' || c == '\0' {
                let operand = current.trim();
                if !operand.is_empty() {
                    signs.push(sign);
                    operands.push(operand.to_string());
                }
                sign = if c == '-' { '-' } else { '+' };
                current.clear();
            } else {
                current.push(c);
            }
        }

        blk.port_in = operands.len() as u32;
        blk.parameters
            .insert("Inputs".to_string(), format!("|{}", signs));
        for (p, operand) in operands.iter().enumerate() {
            self.resolve_input(operand, var_map, conns, sid, (p + 1) as u32);
        }
    }

    fn create_product(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_out = 1;

        if let Some((left, right)) = expr.split_once(" / ") {
            blk.port_in = 2;
            blk.parameters.insert("Inputs".to_string(), "*/".to_string());
            self.resolve_input(left.trim(), var_map, conns, sid, 1);
            self.resolve_input(right.trim(), var_map, conns, sid, 2);
            return;
        }

        let operands: Vec<&str> = expr.split(" * ").map(str::trim).collect();
        if operands.len() < 2 {
            blk.port_in = 1;
            blk.parameters.insert("Inputs".to_string(), "1".to_string());
            self.resolve_input(expr, var_map, conns, sid, 1);
            return;
        }

        blk.port_in = operands.len() as u32;
        blk.parameters
            .insert("Inputs".to_string(), "*".repeat(operands.len()));
        for (p, operand) in operands.iter().enumerate() {
            self.resolve_input(operand, var_map, conns, sid, (p + 1) as u32);
        }
    }

    fn create_saturate(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 1;
        blk.port_out = 1;
        if let Some(args) = call_args(expr) {
            if args.len() >= 3 {
                self.resolve_input(&args[0], var_map, conns, sid, 1);
                blk.parameters
                    .insert("LowerLimit".to_string(), strip_cfg(&args[1]).to_string());
                blk.parameters
                    .insert("UpperLimit".to_string(), strip_cfg(&args[2]).to_string());
            }
        }
    }

    fn create_minmax(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_out = 1;
        let func = if expr.contains("std::max") { "max" } else { "min" };
        blk.parameters
            .insert("Function".to_string(), func.to_string());
        if let Some(args) = call_args(expr) {
            blk.port_in = args.len() as u32;
            for (p, arg) in args.iter().enumerate() {
                self.resolve_input(arg, var_map, conns, sid, (p + 1) as u32);
            }
        } else {
            blk.port_in = 2;
        }
    }

    fn create_switch(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 3;
        blk.port_out = 1;

        let Some((cond, true_val, false_val)) = split_ternary(expr) else {
            return;
        };
        let cond = strip_outer_parens(&cond);

        let (cond_input, criteria, threshold) = if let Some((l, r)) = cond.split_once(" >= ") {
            (l.trim().to_string(), "u2 >= Threshold", Some(r.trim().to_string()))
        } else if let Some((l, r)) = cond.split_once(" > ") {
            (l.trim().to_string(), "u2 > Threshold", Some(r.trim().to_string()))
        } else if let Some((l, _)) = cond.split_once(" != ") {
            (l.trim().to_string(), "u2 ~= 0", None)
        } else {
            return;
        };

        blk.parameters
            .insert("Criteria".to_string(), criteria.to_string());
        if let Some(th) = threshold {
            blk.parameters
                .insert("Threshold".to_string(), strip_cfg(&th).to_string());
        }

        self.resolve_input(&true_val, var_map, conns, sid, 1);
        self.resolve_input(&cond_input, var_map, conns, sid, 2);
        self.resolve_input(&false_val, var_map, conns, sid, 3);
    }

    fn create_relational(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 2;
        blk.port_out = 1;

        let Some((cond, _, _)) = split_ternary(expr) else {
            return;
        };
        let cond = strip_outer_parens(&cond);

        for op in [" >= ", " <= ", " == ", " != ", " > ", " < "] {
            if let Some((left, right)) = cond.split_once(op) {
                let mdl_op = match op.trim() {
                    "!=" => "~=",
                    other => other,
                };
                blk.parameters
                    .insert("Operator".to_string(), mdl_op.to_string());
                self.resolve_input(left.trim(), var_map, conns, sid, 1);
                self.resolve_input(right.trim(), var_map, conns, sid, 2);
                return;
            }
        }
    }

    fn create_logic(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_out = 1;

        let Some((cond, _, _)) = split_ternary(expr) else {
            blk.port_in = 1;
            return;
        };

        // NOT is the only unary form: (x == 0.0f)
        if cond.contains("== 0.0f") && !cond.contains("&&") && !cond.contains("||") {
            blk.parameters
                .insert("Operator".to_string(), "NOT".to_string());
            blk.port_in = 1;
            for operand in comparison_operands(&cond, " == 0.0f)") {
                self.resolve_input(&operand, var_map, conns, sid, 1);
            }
            return;
        }

        let op = if cond.contains("&&") {
            "AND"
        } else if cond.contains("||") {
            "OR"
        } else {
            "XOR"
        };
        blk.parameters.insert("Operator".to_string(), op.to_string());

        let operands = comparison_operands(&cond, " != 0.0f)");
        blk.port_in = operands.len() as u32;
        blk.parameters
            .insert("Ports".to_string(), format!("[{}, 1]", operands.len()));
        for (p, operand) in operands.iter().enumerate() {
            self.resolve_input(operand, var_map, conns, sid, (p + 1) as u32);
        }
    }

    fn create_trig(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 1;
        blk.port_out = 1;

        if let Some(func) = std_call_name(expr) {
            if func == "atan2" {
                blk.port_in = 2;
            }
            blk.parameters.insert("Operator".to_string(), func);
        }

        if let Some(args) = call_args(expr) {
            for (p, arg) in args.iter().take(blk.port_in as usize).enumerate() {
                self.resolve_input(arg, var_map, conns, sid, (p + 1) as u32);
            }
        }
    }

    fn create_math(
        &mut self,
        blk: &mut Block,
        sid: u32,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
    ) {
        blk.port_in = 1;
        blk.port_out = 1;

        if let Some(func) = std_call_name(expr) {
            if func == "pow" {
                blk.port_in = 2;
            }
            blk.parameters.insert("Operator".to_string(), func);
            if let Some(args) = call_args(expr) {
                for (p, arg) in args.iter().take(blk.port_in as usize).enumerate() {
                    self.resolve_input(arg, var_map, conns, sid, (p + 1) as u32);
                }
            }
            return;
        }

        // Squaring is emitted as `x * x`.
        if let Some((left, right)) = expr.split_once(" * ") {
            if left.trim() == right.trim() {
                blk.parameters
                    .insert("Operator".to_string(), "square".to_string());
                self.resolve_input(left.trim(), var_map, conns, sid, 1);
                return;
            }
        }

        self.resolve_input(expr, var_map, conns, sid, 1);
    }

    // Variable resolution

    fn lookup(
        &self,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
    ) -> Option<(u32, u32)> {
        let clean = strip_expr_comments(expr);
        let clean = clean.trim();
        if clean.is_empty() {
            return None;
        }
        if let Some(target) = var_map.get(clean) {
            return Some(*target);
        }
        if !clean.starts_with("state.") {
            if let Some(target) = var_map.get(&format!("state.{}_state", clean)) {
                return Some(*target);
            }
        }
        if let Some(bare) = clean.strip_prefix("state.") {
            if let Some(target) = var_map.get(bare) {
                return Some(*target);
            }
        }
        None
    }

    /// Resolve `expr` to a source endpoint and record a connection; a
    /// plain value produces nothing, an unknown name is surfaced as a
    /// diagnostic.
    fn resolve_input(
        &mut self,
        expr: &str,
        var_map: &IndexMap<String, (u32, u32)>,
        conns: &mut Vec<IrConn>,
        dst_sid: u32,
        dst_port: u32,
    ) {
        let clean = strip_expr_comments(expr);
        let clean = clean.trim();
        if clean.is_empty() {
            return;
        }
        // Literals and config references carry values, not wires.
        if clean.starts_with("cfg.") || clean.contains("std::") {
            return;
        }
        let mut chars = clean.chars();
        let first = chars.next().unwrap_or(' ');
        if first.is_ascii_digit() || (first == '-' && chars.next().is_some_and(|c| c.is_ascii_digit())) {
            return;
        }

        if let Some((src_sid, src_port)) = self.lookup(clean, var_map) {
            conns.push(IrConn {
                src_sid,
                src_port,
                dst_sid,
                dst_port,
            });
            return;
        }

        self.diagnostics
            .push(format!("unresolved reference '{}'", clean));
    }

    fn is_variable(&self, name: &str, var_map: &IndexMap<String, (u32, u32)>) -> bool {
        if self.lookup(name, var_map).is_some() {
            return true;
        }
        if var_map.contains_key(&format!("in.{}", name)) {
            return true;
        }
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        (first.is_ascii_alphabetic() || first == '_')
            && !name.contains('*')
            && !name.contains('+')
            && !name.contains('(')
            && !name.contains('.')
    }
}

// Line helpers

/// `// <Type>: <Name>` marker comments. The type must look like a block
/// type name (possibly with spaces, as in `Component call`); decorated
/// scope comments never match because they carry no colon.
fn split_marker(comment: &str) -> Option<(String, String)> {
    let (ty, nm) = comment.split_once(':')?;
    let ty = ty.trim();
    let nm = nm.trim();
    if ty.is_empty() || nm.is_empty() {
        return None;
    }
    let mut chars = ty.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    if !ty
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
    {
        return None;
    }
    Some((ty.to_string(), nm.to_string()))
}

/// `<name> = <expr>;` with trailing comments removed.
fn split_assignment(rest: &str) -> Option<(String, String)> {
    let (name, expr) = rest.split_once('=')?;
    let expr = strip_expr_comments(expr);
    let expr = expr.trim().trim_end_matches(';').trim();
    Some((name.trim().to_string(), expr.to_string()))
}

/// Drop `// ...` tails and `/* ... */` islands from an expression.
fn strip_expr_comments(expr: &str) -> String {
    let mut s = expr.trim().trim_end_matches(';').to_string();
    if let Some(p) = s.find("//") {
        s.truncate(p);
    }
    while let (Some(open), Some(close)) = (s.find("/*"), s.find("*/")) {
        if close <= open {
            break;
        }
        s.replace_range(open..close + 2, "");
    }
    s.trim().trim_end_matches(';').trim().to_string()
}

fn between<'t>(t: &'t str, prefix: &str, stop: &str) -> Option<String> {
    let rest = t.strip_prefix(prefix)?;
    let end = rest.find(stop)?;
    Some(rest[..end].trim().to_string())
}

fn strip_cfg(value: &str) -> &str {
    let v = value.trim();
    v.strip_prefix("cfg.").unwrap_or(v)
}

/// Arguments of the outermost call in `expr`, split at top level.
fn call_args(expr: &str) -> Option<Vec<String>> {
    let open = expr.find('(')?;
    let close = expr.rfind(')')?;
    if close <= open {
        return None;
    }
    Some(
        split_top_level(&expr[open + 1..close], ',')
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// `std::<name>(...)` callee name.
fn std_call_name(expr: &str) -> Option<String> {
    let rest = expr.trim().strip_prefix("std::")?;
    let end = rest.find('(')?;
    Some(rest[..end].to_string())
}

fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
        if c == sep && depth == 0 {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// `cond ? a : b`, splitting at the top-level `?` and the matching `:`
/// (skipping `::`).
fn split_ternary(expr: &str) -> Option<(String, String, String)> {
    let q = expr.find('?')?;
    let bytes = expr.as_bytes();
    let mut i = q + 1;
    while i < bytes.len() {
        if bytes[i] == b':' {
            if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                i += 2;
                continue;
            }
            if i > 0 && bytes[i - 1] == b':' {
                i += 1;
                continue;
            }
            let cond = expr[..q].trim().to_string();
            let t_val = expr[q + 1..i].trim().to_string();
            let f_val = expr[i + 1..].trim().to_string();
            return Some((cond, t_val, f_val));
        }
        i += 1;
    }
    None
}

fn strip_outer_parens(s: &str) -> String {
    let t = s.trim();
    if t.starts_with('(') && t.ends_with(')') {
        t[1..t.len() - 1].trim().to_string()
    } else {
        t.to_string()
    }
}

/// Operand names out of `(x != 0.0f)`-style groups; `suffix` selects the
/// comparison tail to look for.
fn comparison_operands(cond: &str, suffix: &str) -> Vec<String> {
    let mut operands = Vec::new();
    let mut search = 0;
    while let Some(found) = cond[search..].find(suffix) {
        let end = search + found;
        if let Some(open) = cond[..end].rfind('(') {
            let operand = cond[open + 1..end].trim();
            if !operand.is_empty() {
                operands.push(operand.to_string());
            }
        }
        search = end + suffix.len();
    }
    operands
}

/// `out.<name> = <expr>;` assignments after the `// Outputs` marker.
fn extract_output_assignments(lines: &[&str]) -> IndexMap<String, String> {
    let mut result = IndexMap::new();
    let mut in_outputs = false;
    for raw in lines {
        let t = raw.trim();
        if t == "// Outputs" {
            in_outputs = true;
            continue;
        }
        if !in_outputs {
            continue;
        }
        if let Some(rest) = t.strip_prefix("out.") {
            if let Some((name, expr)) = split_assignment(rest) {
                result.insert(name, expr);
            }
        }
    }
    result
}

/// Parse a Tustin coefficient declaration back into its continuous
/// multipliers. Order 1 lines read `float b0_d = M * k + C;`, order 2
/// lines `float b0_d = M2*k2 + M1*k + C;`.
fn parse_coeff_line(t: &str, which: &str) -> Option<Vec<f64>> {
    let rest = t.strip_prefix(&format!("float {} = ", which))?;
    let value = rest.trim_end_matches(';').trim();

    if value.contains("*k2") {
        let parts: Vec<&str> = value.split(" + ").collect();
        if parts.len() != 3 {
            return None;
        }
        let c2 = parse_float_literal(parts[0].strip_suffix("*k2")?)?;
        let c1 = parse_float_literal(parts[1].strip_suffix("*k")?)?;
        let c0 = parse_float_literal(parts[2])?;
        return Some(vec![c2, c1, c0]);
    }

    let (mult, constant) = value.split_once(" * k + ")?;
    Some(vec![
        parse_float_literal(mult)?,
        parse_float_literal(constant)?,
    ])
}

fn parse_float_literal(s: &str) -> Option<f64> {
    s.trim()
        .trim_end_matches(['f', 'F'])
        .parse()
        .ok()
}

fn group_connections(conns: &[IrConn]) -> Vec<Connection> {
    let mut groups: IndexMap<(u32, u32), Vec<(u32, u32)>> = IndexMap::new();
    for c in conns {
        groups
            .entry((c.src_sid, c.src_port))
            .or_default()
            .push((c.dst_sid, c.dst_port));
    }

    let mut result = Vec::new();
    let mut zorder = 1;
    for ((src_sid, src_port), dests) in groups {
        let mut conn = Connection {
            zorder,
            source: format!("{}#out:{}", src_sid, src_port),
            ..Connection::default()
        };
        zorder += 1;
        if dests.len() == 1 {
            conn.destination = format!("{}#in:{}", dests[0].0, dests[0].1);
        } else {
            for (dst_sid, dst_port) in dests {
                conn.branches.push(Branch {
                    zorder,
                    destination: format!("{}#in:{}", dst_sid, dst_port),
                    points: Vec::new(),
                });
                zorder += 1;
            }
        }
        result.push(conn);
    }
    result
}
