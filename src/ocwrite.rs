//! Render generated parts into OC source text.

use std::fmt::Write as _;

use crate::codegen::GeneratedParts;

/// One OC file: the extracted components (depth-first) followed by the
/// element, wrapped in a namespace.
pub fn write_oc_file(parts: &GeneratedParts, ns_name: &str) -> String {
    let mut out = String::new();
    let _ = write!(out, "namespace {} {{\n\n", ns_name);

    for comp in &parts.components {
        write_component(&mut out, comp);
    }
    write_element(&mut out, parts);

    let _ = write!(out, "}} // namespace {}\n", ns_name);
    out
}

fn write_element(out: &mut String, parts: &GeneratedParts) {
    let _ = writeln!(out, "element {} {{", parts.name);
    let _ = writeln!(out, "    frequency: 1kHz;");
    write_sections(out, parts);
    let _ = writeln!(out, "}}");
    out.push('\n');
}

fn write_component(out: &mut String, parts: &GeneratedParts) {
    let _ = writeln!(out, "component {} {{", parts.name);
    write_sections(out, parts);
    let _ = writeln!(out, "}}");
    out.push('\n');
}

fn write_sections(out: &mut String, parts: &GeneratedParts) {
    if !parts.inports.is_empty() {
        let _ = write!(out, "\n    input {{\n");
        for (name, ty) in &parts.inports {
            let _ = writeln!(out, "        {} {};", ty, name);
        }
        let _ = writeln!(out, "    }}");
    }

    if !parts.outports.is_empty() {
        let _ = write!(out, "\n    output {{\n");
        for (name, ty) in &parts.outports {
            let _ = writeln!(out, "        {} {};", ty, name);
        }
        let _ = writeln!(out, "    }}");
    }

    if !parts.state_vars.is_empty() {
        let _ = write!(out, "\n    state {{\n");
        for sv in &parts.state_vars {
            if sv.ty == "float" {
                let _ = write!(out, "        float {} = 0.0;", sv.name);
            } else {
                let _ = write!(out, "        {} {};", sv.ty, sv.name);
            }
            if sv.comment.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "  // {}", sv.comment);
            }
        }
        let _ = writeln!(out, "    }}");
    }

    // `cfg.dt` is referenced by every stateful emission, so the config
    // section is always present.
    let _ = write!(out, "\n    config {{\n");
    for var in &parts.config_vars {
        let _ = writeln!(out, "        float {};", var);
    }
    let _ = writeln!(out, "        float dt = 0.001;  // sample time");
    let _ = writeln!(out, "    }}");

    let _ = write!(out, "\n    update {{\n");
    out.push_str(&parts.update_code);
    let _ = writeln!(out, "    }}");
}
