//! Generate Simulink system XML text, either from a sidecar system
//! record or from a lifted IR system.
//!
//! Output uses 2-space indentation and the element ordering Simulink
//! writes: system properties, blocks, lines.

use std::fmt::Write as _;

use crate::metadata::SystemMeta;
use crate::model::{format_int_array, System};

/// Escape text content for XML. Simulink encodes `&`, `<`, `>`, `"`,
/// and `'` even in text content.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#xA;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Regenerate a system XML part from its sidecar record. Used when the
/// raw part is missing; byte-for-byte replay prefers the raw blob.
pub fn system_meta_xml(sys: &SystemMeta) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<System>\n");

    if !sys.location.is_empty() {
        let _ = writeln!(
            out,
            "  <P Name=\"Location\">{}</P>",
            format_int_array(&sys.location)
        );
    }
    if !sys.open.is_empty() {
        let _ = writeln!(out, "  <P Name=\"Open\">{}</P>", sys.open);
    }
    let _ = writeln!(out, "  <P Name=\"ZoomFactor\">{}</P>", sys.zoom_factor);
    if !sys.report_name.is_empty() {
        let _ = writeln!(out, "  <P Name=\"ReportName\">{}</P>", sys.report_name);
    }
    if sys.sid_highwatermark > 0 {
        let _ = writeln!(
            out,
            "  <P Name=\"SIDHighWatermark\">{}</P>",
            sys.sid_highwatermark
        );
    }

    for blk in &sys.blocks {
        let _ = writeln!(
            out,
            "  <Block BlockType=\"{}\" Name=\"{}\" SID=\"{}\">",
            blk.block_type,
            xml_escape(&blk.name),
            blk.sid
        );

        if blk.port_in > 0 || blk.port_out > 0 {
            out.push_str("    <PortCounts");
            if blk.port_in > 0 {
                let _ = write!(out, " in=\"{}\"", blk.port_in);
            }
            if blk.port_out > 0 {
                let _ = write!(out, " out=\"{}\"", blk.port_out);
            }
            out.push_str("/>\n");
        }

        if !blk.position.is_empty() {
            let _ = writeln!(
                out,
                "    <P Name=\"Position\">{}</P>",
                format_int_array(&blk.position)
            );
        }
        let _ = writeln!(out, "    <P Name=\"ZOrder\">{}</P>", blk.zorder);

        for (k, v) in &blk.parameters {
            if k == "Position" || k == "ZOrder" {
                continue;
            }
            let _ = writeln!(out, "    <P Name=\"{}\">{}</P>", k, xml_escape(v));
        }

        if !blk.mask.is_empty() {
            out.push_str("    <Mask>\n");
            if blk.mask_display_xml.is_empty() {
                out.push_str("      <Display RunInitForIconRedraw=\"off\"/>\n");
            } else {
                let _ = writeln!(out, "      {}", blk.mask_display_xml);
            }
            for mp in &blk.mask {
                let _ = writeln!(
                    out,
                    "      <MaskParameter Name=\"{}\" Type=\"{}\">",
                    mp.name, mp.param_type
                );
                let _ = writeln!(out, "        <Prompt>{}</Prompt>", xml_escape(&mp.prompt));
                let _ = writeln!(out, "        <Value>{}</Value>", xml_escape(&mp.value));
                out.push_str("      </MaskParameter>\n");
            }
            out.push_str("    </Mask>\n");
        }

        if !blk.port_properties.is_empty() {
            out.push_str("    <PortProperties>\n");
            for pp in &blk.port_properties {
                let _ = writeln!(
                    out,
                    "      <Port Type=\"{}\" Index=\"{}\">",
                    pp.port_type, pp.index
                );
                for (k, v) in &pp.properties {
                    let _ = writeln!(out, "        <P Name=\"{}\">{}</P>", k, xml_escape(v));
                }
                out.push_str("      </Port>\n");
            }
            out.push_str("    </PortProperties>\n");
        }

        if !blk.subsystem_ref.is_empty() {
            let _ = writeln!(out, "    <System Ref=\"{}\"/>", blk.subsystem_ref);
        }

        out.push_str("  </Block>\n");
    }

    for conn in &sys.connections {
        out.push_str("  <Line>\n");
        if !conn.name.is_empty() {
            let _ = writeln!(out, "    <P Name=\"Name\">{}</P>", xml_escape(&conn.name));
        }
        let _ = writeln!(out, "    <P Name=\"ZOrder\">{}</P>", conn.zorder);
        if !conn.labels.is_empty() {
            let _ = writeln!(out, "    <P Name=\"Labels\">{}</P>", conn.labels);
        }
        let _ = writeln!(out, "    <P Name=\"Src\">{}</P>", conn.src);
        if !conn.points.is_empty() {
            let _ = writeln!(
                out,
                "    <P Name=\"Points\">{}</P>",
                format_int_array(&conn.points)
            );
        }
        if !conn.dst.is_empty() && conn.branches.is_empty() {
            let _ = writeln!(out, "    <P Name=\"Dst\">{}</P>", conn.dst);
        }
        for br in &conn.branches {
            out.push_str("    <Branch>\n");
            let _ = writeln!(out, "      <P Name=\"ZOrder\">{}</P>", br.zorder);
            if !br.points.is_empty() {
                let _ = writeln!(
                    out,
                    "      <P Name=\"Points\">{}</P>",
                    format_int_array(&br.points)
                );
            }
            let _ = writeln!(out, "      <P Name=\"Dst\">{}</P>", br.dst);
            out.push_str("    </Branch>\n");
        }
        out.push_str("  </Line>\n");
    }

    out.push_str("</System>");
    out
}

/// Emit a system XML part from a lifted IR system.
pub fn system_xml(sys: &System) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<System>\n");
    out.push_str("  <P Name=\"Location\">[-1, -8, 1921, 1033]</P>\n");
    let _ = writeln!(out, "  <P Name=\"ZoomFactor\">{}</P>", sys.zoom_factor);
    if sys.sid_highwatermark > 0 {
        let _ = writeln!(
            out,
            "  <P Name=\"SIDHighWatermark\">{}</P>",
            sys.sid_highwatermark
        );
    }

    for blk in &sys.blocks {
        let _ = writeln!(
            out,
            "  <Block BlockType=\"{}\" Name=\"{}\" SID=\"{}\">",
            blk.block_type,
            xml_escape(&blk.name),
            blk.sid
        );

        // PortCounts only where the default shape does not apply.
        let needs_portcounts =
            blk.is_subsystem() || blk.port_in > 1 || blk.port_out > 1;
        if needs_portcounts && (blk.port_in > 0 || blk.port_out > 0) {
            out.push_str("    <PortCounts");
            if blk.port_in > 0 {
                let _ = write!(out, " in=\"{}\"", blk.port_in);
            }
            if blk.port_out > 0 {
                let _ = write!(out, " out=\"{}\"", blk.port_out);
            }
            out.push_str("/>\n");
        }

        if !blk.position.is_empty() {
            let _ = writeln!(
                out,
                "    <P Name=\"Position\">{}</P>",
                format_int_array(&blk.position)
            );
        }
        let _ = writeln!(out, "    <P Name=\"ZOrder\">{}</P>", blk.sid);

        for (k, v) in &blk.parameters {
            let _ = writeln!(out, "    <P Name=\"{}\">{}</P>", k, xml_escape(v));
        }

        if let Some(r) = &blk.subsystem_ref {
            let _ = writeln!(out, "    <System Ref=\"{}\"/>", r);
        }

        out.push_str("  </Block>\n");
    }

    for conn in &sys.connections {
        out.push_str("  <Line>\n");
        let _ = writeln!(out, "    <P Name=\"ZOrder\">{}</P>", conn.zorder);
        let _ = writeln!(out, "    <P Name=\"Src\">{}</P>", conn.source);
        if conn.branches.is_empty() {
            let _ = writeln!(out, "    <P Name=\"Dst\">{}</P>", conn.destination);
        } else {
            for br in &conn.branches {
                out.push_str("    <Branch>\n");
                let _ = writeln!(out, "      <P Name=\"ZOrder\">{}</P>", br.zorder);
                let _ = writeln!(out, "      <P Name=\"Dst\">{}</P>", br.destination);
                out.push_str("    </Branch>\n");
            }
        }
        out.push_str("  </Line>\n");
    }

    out.push_str("</System>");
    out
}
