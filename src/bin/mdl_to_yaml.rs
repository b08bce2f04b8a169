use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use oclink::parser::MdlDocument;
use oclink::yamlgen;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Export per-element YAML schemas from a Simulink MDL file",
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

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stem = cli
        .input
        .file_stem()
        .context("input file has no name stem")?
        .to_string();
    let yaml_dir = Utf8PathBuf::from(format!("{}-yaml", stem));

    println!("Loading MDL file: {}", cli.input);
    let doc = MdlDocument::load(&cli.input)?;
    let model = &doc.model;
    let root = model.root_system().context("no root system found")?;

    std::fs::create_dir_all(yaml_dir.as_std_path())
        .with_context(|| format!("Failed to create {}", yaml_dir))?;

    let lower = stem.to_ascii_lowercase();
    let library_name = lower.strip_suffix("_lib").unwrap_or(&lower).to_string();

    let mut exported = 0;
    for blk in root.subsystems() {
        let Some(subsys) = blk
            .subsystem_ref
            .as_deref()
            .and_then(|r| model.get_system(r))
        else {
            continue;
        };
        let mut named = subsys.clone();
        named.name = blk.name.clone();

        let schema = yamlgen::convert(model, &named, &library_name);
        let content = yamlgen::write_schema(&schema);

        let path = yaml_dir.join(format!("{}_schema.yaml", sanitize_filename(&blk.name)));
        std::fs::write(path.as_std_path(), content)
            .with_context(|| format!("Could not write {}", path))?;
        println!("  {}", blk.name);
        exported += 1;
    }

    println!("\nExported {} YAML schema(s) to {}/", exported, yaml_dir);
    Ok(())
}
