use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;

use oclink::lift::Lifter;
use oclink::model::{Block, Model, System};
use oclink::ocparse::{self, SectionKind};
use oclink::{generator, metadata};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert OC files back to Simulink MDL format",
    long_about = "Reads *.oc files and an optional *.oc.metadata sidecar from the input \
                  directory. With the sidecar the original MDL is reproduced verbatim; \
                  without it a fresh container is synthesized from the lifted block graphs."
)]
struct Cli {
    /// Directory containing .oc files
    #[arg(value_name = "INPUT_DIR")]
    input_dir: Utf8PathBuf,

    /// Output MDL file path (default: <dir-name>.mdl)
    #[arg(short, long, value_name = "FILE")]
    output: Option<Utf8PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !cli.input_dir.is_dir() {
        bail!("{} is not a directory", cli.input_dir);
    }

    let dir_name = cli
        .input_dir
        .file_name()
        .context("input directory has no name")?;
    let model_name = dir_name.strip_suffix("-oc").unwrap_or(dir_name).to_string();
    let output = cli
        .output
        .unwrap_or_else(|| Utf8PathBuf::from(format!("{}.mdl", model_name)));

    println!("Input directory: {}", cli.input_dir);
    println!("Model name: {}", model_name);

    let mut oc_paths: Vec<Utf8PathBuf> = Vec::new();
    let mut metadata_path: Option<Utf8PathBuf> = None;
    for entry in cli
        .input_dir
        .read_dir_utf8()
        .with_context(|| format!("Failed to read {}", cli.input_dir))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension() == Some("oc") {
            oc_paths.push(path.to_path_buf());
        } else if path.as_str().ends_with(".oc.metadata") {
            metadata_path = Some(path.to_path_buf());
        }
    }
    oc_paths.sort();

    if oc_paths.is_empty() {
        bail!("no .oc files found in {}", cli.input_dir);
    }
    println!("Found {} .oc file(s)", oc_paths.len());

    let mut oc_files = Vec::new();
    let mut parse_ok = true;
    for path in &oc_paths {
        println!("  Parsing: {}", path.file_name().unwrap_or_default());
        let source = std::fs::read_to_string(path.as_std_path())
            .with_context(|| format!("Could not read {}", path))?;
        let outcome = ocparse::parse_str(&source);
        if !outcome.success() {
            eprintln!("  Syntax errors in {}:", path);
            for err in &outcome.errors {
                eprintln!("    {}", err);
            }
            parse_ok = false;
            continue;
        }
        oc_files.push(outcome.file);
    }
    if !parse_ok {
        bail!("aborting due to parse errors");
    }

    let meta = metadata_path.as_deref().and_then(|p: &Utf8Path| {
        println!("Found metadata: {}", p.file_name().unwrap_or_default());
        match metadata::read_file(p) {
            Ok(m) => Some(m),
            Err(e) => {
                eprintln!("Warning: could not parse metadata file, using defaults ({})", e);
                None
            }
        }
    });

    let content = if let Some(meta) = meta {
        println!("Reconstructing MDL from metadata (verbatim mode)...");
        generator::write_with_metadata(&meta)
    } else {
        println!("No metadata found, synthesizing MDL from lifted block graphs...");
        let model = lift_model(&oc_files);
        generator::write_from_model(&model)
    };

    std::fs::write(output.as_std_path(), &content)
        .with_context(|| format!("Could not write {}", output))?;
    println!("Written: {} ({} bytes)", output, content.len());

    Ok(())
}

/// Build a full IR model out of the parsed OC files: one child system per
/// element (lifted from its update body) under a root holding the
/// element blocks.
fn lift_model(oc_files: &[ocparse::OcFile]) -> Model {
    let mut model = Model {
        library_type: "BlockLibrary".to_string(),
        ..Model::default()
    };

    let mut root = System {
        id: "system_root".to_string(),
        zoom_factor: 100,
        ..System::default()
    };

    let mut sys_counter = 0u32;
    let mut root_sid = 0u32;
    let mut x = 100;
    let mut y = 100;

    for file in oc_files {
        for ns in &file.namespaces {
            for elem in &ns.elements {
                let mut lifter = Lifter::new(&ns.components);
                let lifted = lifter.lift_element(elem, &mut sys_counter);
                for diag in lifter.diagnostics() {
                    eprintln!("  [oc_to_mdl] {}: {}", elem.name, diag);
                }

                root_sid += 1;
                let blk = Block {
                    sid: root_sid.to_string(),
                    block_type: "SubSystem".to_string(),
                    name: elem.name.clone(),
                    position: vec![x, y, x + 120, y + 80],
                    zorder: root_sid as i32,
                    port_in: elem.section_vars(SectionKind::Input).len() as u32,
                    port_out: elem.section_vars(SectionKind::Output).len() as u32,
                    subsystem_ref: Some(lifted.system.id.clone()),
                    ..Block::default()
                };
                root.blocks.push(blk);

                y += 120;
                if y > 800 {
                    y = 100;
                    x += 200;
                }

                model
                    .systems
                    .insert(lifted.system.id.clone(), lifted.system);
                for (id, sys) in lifted.children {
                    model.systems.insert(id, sys);
                }
            }
        }
    }

    root.sid_highwatermark = root_sid as i32;
    model.systems.insert("system_root".to_string(), root);
    model
}
