use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use oclink::model::{Block, Endpoint, Model, System};
use oclink::parser::MdlDocument;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump the structure of an MDL file",
    long_about = None
)]
struct Cli {
    /// Input MDL file
    #[arg(value_name = "INPUT_MDL")]
    input: Utf8PathBuf,

    /// Only dump subsystems whose name contains this string
    #[arg(value_name = "SUBSYSTEM_NAME")]
    filter: Option<String>,
}

fn key_params(blk: &Block) -> String {
    let mut parts = Vec::new();
    let mut show = |label: &str, key: &str| {
        if let Some(v) = blk.param(key) {
            parts.push(format!("{}={}", label, v));
        }
    };
    match blk.block_type.as_str() {
        "Gain" => show("Gain", "Gain"),
        "Sum" | "Product" => show("Inputs", "Inputs"),
        "Saturate" => {
            show("Upper", "UpperLimit");
            show("Lower", "LowerLimit");
        }
        "Constant" => show("Value", "Value"),
        "RelationalOperator" | "Logic" => show("Op", "Operator"),
        "Switch" => {
            show("Criteria", "Criteria");
            show("Threshold", "Threshold");
        }
        "UnitDelay" | "DiscreteIntegrator" => show("IC", "InitialCondition"),
        "TransferFcn" => {
            show("Num", "Numerator");
            show("Den", "Denominator");
        }
        _ => {}
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", parts.join(", "))
    }
}

fn endpoint_name(sys: &System, spec: &str) -> String {
    match Endpoint::parse(spec) {
        Ok(ep) => match sys.find_block_by_sid(&ep.block_sid) {
            Some(blk) => format!("{}:{}", blk.name, ep.port_index),
            None => format!("{}:{}", ep.block_sid, ep.port_index),
        },
        Err(_) => "?".to_string(),
    }
}

fn dump_system(model: &Model, sys: &System, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = if sys.name.is_empty() { &sys.id } else { &sys.name };
    println!("{}System: {} ({})", indent, name, sys.id);

    let mut by_type: BTreeMap<&str, Vec<&Block>> = BTreeMap::new();
    for blk in &sys.blocks {
        by_type.entry(&blk.block_type).or_default().push(blk);
    }

    println!("{}  Blocks ({}):", indent, sys.blocks.len());
    for (ty, blocks) in &by_type {
        println!("{}    {} x{}", indent, ty, blocks.len());
        for blk in blocks {
            println!("{}      - {}{}", indent, blk.name, key_params(blk));
        }
    }

    println!("{}  Connections ({}):", indent, sys.connections.len());
    for conn in &sys.connections {
        let src = endpoint_name(sys, &conn.source);
        if conn.destination.is_empty() && conn.branches.is_empty() {
            println!("{}    {} -> ?", indent, src);
        } else if !conn.destination.is_empty() {
            let dst = endpoint_name(sys, &conn.destination);
            if conn.name.is_empty() {
                println!("{}    {} -> {}", indent, src, dst);
            } else {
                println!("{}    {} -> {} [{}]", indent, src, dst, conn.name);
            }
        } else {
            println!("{}    {} ->", indent, src);
        }
        for br in &conn.branches {
            println!("{}      -> {}", indent, endpoint_name(sys, &br.destination));
        }
    }

    for blk in sys.subsystems() {
        if let Some(subsys) = blk
            .subsystem_ref
            .as_deref()
            .and_then(|r| model.get_system(r))
        {
            let mut named = subsys.clone();
            named.name = blk.name.clone();
            dump_system(model, &named, depth + 1);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let doc = MdlDocument::load(&cli.input)?;
    let model = &doc.model;
    let root = model.root_system().context("no root system")?;

    let mut all_types: BTreeSet<&str> = BTreeSet::new();
    for sys in model.systems.values() {
        for blk in &sys.blocks {
            all_types.insert(&blk.block_type);
        }
    }

    println!("=== All Block Types in Model ===");
    for t in &all_types {
        println!("  {}", t);
    }
    println!();

    println!("=== Top-level Subsystems ===");
    for blk in root.subsystems() {
        if let Some(filter) = &cli.filter {
            if !blk.name.contains(filter.as_str()) {
                continue;
            }
        }
        if let Some(subsys) = blk
            .subsystem_ref
            .as_deref()
            .and_then(|r| model.get_system(r))
        {
            let mut named = subsys.clone();
            named.name = blk.name.clone();
            dump_system(model, &named, 0);
            println!();
        }
    }

    Ok(())
}
