use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use oclink::codegen::Generator;
use oclink::parser::MdlDocument;
use oclink::{metadata, ocwrite};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert a Simulink MDL file to OC format plus a metadata sidecar",
    long_about = None
)]
struct Cli {
    /// Input MDL file
    #[arg(value_name = "INPUT_MDL")]
    input: Utf8PathBuf,
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else if c == ' ' {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}

fn library_name_of(stem: &str) -> String {
    let lower = stem.to_ascii_lowercase();
    lower.strip_suffix("_lib").unwrap_or(&lower).to_string()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stem = cli
        .input
        .file_stem()
        .context("input file has no name stem")?
        .to_string();
    let oc_dir = Utf8PathBuf::from(format!("{}-oc", stem));

    println!("Loading MDL file: {}", cli.input);
    let doc = MdlDocument::load(&cli.input)?;
    let model = &doc.model;

    println!("Model UUID: {}", model.uuid);
    println!("Library Type: {}", model.library_type);
    println!("Systems: {}", model.systems.len());

    std::fs::create_dir_all(oc_dir.as_std_path())
        .with_context(|| format!("Failed to create {}", oc_dir))?;

    let root = model.root_system().context("no root system found")?;
    let library_name = library_name_of(&stem);

    let mut exported = 0;
    println!("\nExporting...");

    for blk in root.subsystems() {
        let Some(sys_ref) = blk.subsystem_ref.as_deref() else {
            continue;
        };
        let Some(subsys) = model.get_system(sys_ref) else {
            eprintln!("  Warning: could not find system {}", sys_ref);
            continue;
        };

        let mut named = subsys.clone();
        named.name = blk.name.clone();

        let mut generator = Generator::new(model);
        let parts = generator
            .generate_parts(&named)
            .with_context(|| format!("Failed to generate code for {}", blk.name))?;
        for diag in generator.diagnostics() {
            eprintln!("  [mdl_to_oc] {}: {}", blk.name, diag);
        }

        let content = ocwrite::write_oc_file(&parts, &library_name);
        let path = oc_dir.join(format!("{}.oc", sanitize_filename(&blk.name)));
        std::fs::write(path.as_std_path(), content)
            .with_context(|| format!("Could not write {}", path))?;

        println!("  {}", blk.name);
        exported += 1;
    }

    println!("\nExported {} OC file(s) to {}/", exported, oc_dir);

    let meta = metadata::build_metadata(model, &doc.opc);
    let meta_path = oc_dir.join(format!("{}.oc.metadata", stem));
    metadata::write_file(&meta_path, &meta)?;
    println!("Exported metadata to {}", meta_path);

    Ok(())
}
