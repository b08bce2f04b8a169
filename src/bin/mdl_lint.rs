use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use clap::Parser;

use oclink::model::{Block, Model};
use oclink::parser::MdlDocument;

mod color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const DIM: &str = "\x1b[2m";
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Validate MDL models against structural rules",
    after_help = "Library rules:\n\
                  \x20 LIB-001  Element names should represent their type\n\
                  \x20 LIB-002  Elements should not link to other elements\n\
                  \x20 LIB-003  Elements should be masked with configuration parameters\n\
                  \x20 LIB-004  Internal subsystems should be helpers, not elements\n\n\
                  App rules:\n\
                  \x20 APP-001  App should link elements from libraries\n\
                  \x20 APP-002  Library links should be enforced (not disabled/broken)\n\
                  \x20 APP-003  App should only contain elements and connections\n\
                  \x20 APP-004  App should have connections between elements"
)]
struct Cli {
    /// MDL model files to lint
    #[arg(value_name = "MODEL", required = true)]
    models: Vec<Utf8PathBuf>,
}

struct LintResult {
    passed: bool,
    rule: &'static str,
    message: String,
    context: String,
}

#[derive(Default)]
struct LintReport {
    model_name: String,
    model_type: String,
    results: Vec<LintResult>,
    passed: usize,
    failed: usize,
}

impl LintReport {
    fn add_pass(&mut self, rule: &'static str, message: impl Into<String>, context: impl Into<String>) {
        self.results.push(LintResult {
            passed: true,
            rule,
            message: message.into(),
            context: context.into(),
        });
        self.passed += 1;
    }

    fn add_fail(&mut self, rule: &'static str, message: impl Into<String>, context: impl Into<String>) {
        self.results.push(LintResult {
            passed: false,
            rule,
            message: message.into(),
            context: context.into(),
        });
        self.failed += 1;
    }

    fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Reference blocks carry a `SourceBlock` parameter `library/block`.
fn source_library(blk: &Block) -> Option<&str> {
    let src = blk.param("SourceBlock")?;
    src.split_once('/').map(|(lib, _)| lib)
}

fn detect_model_type(model: &Model) -> &'static str {
    if model.library_type == "BlockLibrary" {
        "library"
    } else {
        "app"
    }
}

// Library rules

fn check_library_naming(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        return;
    };
    for blk in root.subsystems() {
        if blk.name.len() > 2 {
            report.add_pass("LIB-001", "Element has descriptive name", blk.name.clone());
        } else {
            report.add_fail("LIB-001", "Element has non-descriptive name", blk.name.clone());
        }
    }
}

fn check_library_no_external_links(model: &Model, report: &mut LintReport) {
    let allowed: BTreeSet<&str> =
        BTreeSet::from(["simulink", "simulink_extras", "simscape", "stateflow"]);

    for (id, sys) in &model.systems {
        if id == "system_root" {
            continue;
        }
        let name = if sys.name.is_empty() { id } else { &sys.name };

        let external = sys.blocks.iter().find_map(|blk| {
            source_library(blk)
                .filter(|lib| *lib != model.name && !allowed.contains(lib))
                .map(str::to_string)
        });

        match external {
            None => report.add_pass("LIB-002", "No external element links", name.clone()),
            Some(lib) => report.add_fail(
                "LIB-002",
                format!("Links to external library: {}", lib),
                name.clone(),
            ),
        }
    }
}

fn check_library_masked(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        return;
    };
    for blk in root.subsystems() {
        if blk.mask_parameters.is_empty() {
            report.add_fail(
                "LIB-003",
                "Element is not masked (no configuration parameters)",
                blk.name.clone(),
            );
        } else {
            report.add_pass(
                "LIB-003",
                format!("Element is masked ({} params)", blk.mask_parameters.len()),
                blk.name.clone(),
            );
        }
    }
}

fn check_library_helper_subsystems(model: &Model, report: &mut LintReport) {
    for (id, sys) in &model.systems {
        if id == "system_root" {
            continue;
        }
        let name = if sys.name.is_empty() { id } else { &sys.name };

        let mut helper_count = 0;
        let mut element_like: Option<&str> = None;
        for blk in sys.subsystems() {
            helper_count += 1;
            // Many mask parameters suggest a full element, not a helper.
            if blk.mask_parameters.len() > 3 {
                element_like = Some(&blk.name);
            }
        }

        match element_like {
            Some(problem) => report.add_fail(
                "LIB-004",
                format!("Contains element-like subsystem: {}", problem),
                name.clone(),
            ),
            None if helper_count > 0 => report.add_pass(
                "LIB-004",
                format!("Has {} helper subsystem(s)", helper_count),
                name.clone(),
            ),
            None => report.add_pass("LIB-004", "No subsystems (flat structure)", name.clone()),
        }
    }
}

// App rules

fn check_app_library_links(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        report.add_fail("APP-001", "No root system found", "");
        return;
    };

    let libraries: BTreeSet<&str> = root
        .blocks
        .iter()
        .filter_map(source_library)
        .collect();

    if libraries.is_empty() {
        report.add_fail(
            "APP-001",
            "No library links found - app should use element libraries",
            "",
        );
    } else {
        let libs: Vec<&str> = libraries.into_iter().collect();
        report.add_pass(
            "APP-001",
            format!("Uses element libraries: {}", libs.join(", ")),
            "",
        );
    }
}

fn check_app_links_enforced(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        return;
    };
    for blk in &root.blocks {
        let Some(lib) = source_library(blk) else {
            continue;
        };
        let broken = matches!(blk.param("LinkStatus"), Some("inactive") | Some("none"));
        let context = format!("{} -> {}", blk.name, lib);
        if broken {
            report.add_fail("APP-002", "Link is broken/disabled", context);
        } else {
            report.add_pass("APP-002", "Link is active", context);
        }
    }
}

fn check_app_no_loose_logic(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        return;
    };
    let allowed: BTreeSet<&str> = BTreeSet::from([
        "Inport",
        "Outport",
        "SubSystem",
        "From",
        "Goto",
        "Terminator",
        "Ground",
        "Reference",
    ]);

    let mut found_loose = false;
    for blk in &root.blocks {
        if source_library(blk).is_some() || allowed.contains(blk.block_type.as_str()) {
            continue;
        }
        report.add_fail(
            "APP-003",
            format!("Loose logic block found: {}", blk.block_type),
            blk.name.clone(),
        );
        found_loose = true;
    }
    if !found_loose {
        report.add_pass("APP-003", "No loose logic blocks at top level", "");
    }
}

fn check_app_connections(model: &Model, report: &mut LintReport) {
    let Some(root) = model.root_system() else {
        return;
    };
    let count = root.connections.len();
    if count > 0 {
        report.add_pass("APP-004", format!("Has {} connection(s)", count), "");
    } else {
        report.add_fail("APP-004", "No connections found between elements", "");
    }
}

// Report

fn print_report(report: &LintReport) {
    let rule = "══════════════════════════════════════════════════════════════";
    println!();
    println!("{}{}{}{}", color::BOLD, color::CYAN, rule, color::RESET);
    println!(
        "{}{}  MDL Lint Report: {}{}",
        color::BOLD,
        color::CYAN,
        report.model_name,
        color::RESET
    );
    println!("{}{}{}{}", color::BOLD, color::CYAN, rule, color::RESET);
    println!();
    println!("  {}Model Type:{} {}", color::DIM, color::RESET, report.model_type);
    println!();

    for result in &report.results {
        if result.passed {
            print!("  {}✓{} ", color::GREEN, color::RESET);
        } else {
            print!("  {}✗{} ", color::RED, color::RESET);
        }
        print!("{}[{}]{} ", color::DIM, result.rule, color::RESET);
        print!("{}", result.message);
        if !result.context.is_empty() {
            print!(" {}({}){}", color::DIM, result.context, color::RESET);
        }
        println!();
    }

    println!();
    println!(
        "{}──────────────────────────────────────────────────────────────{}",
        color::DIM,
        color::RESET
    );
    if report.all_passed() {
        println!(
            "  {}{}✓ All {} tests passed{}",
            color::BOLD,
            color::GREEN,
            report.passed,
            color::RESET
        );
    } else {
        println!(
            "  {}Passed:{} {}{}{}  {}Failed:{} {}{}{}",
            color::DIM,
            color::RESET,
            color::GREEN,
            report.passed,
            color::RESET,
            color::DIM,
            color::RESET,
            color::RED,
            report.failed,
            color::RESET
        );
    }
    println!();
}

fn lint_model(path: &Utf8PathBuf) -> LintReport {
    let mut report = LintReport {
        model_name: path.file_name().unwrap_or(path.as_str()).to_string(),
        ..LintReport::default()
    };

    let doc = match MdlDocument::load(path) {
        Ok(doc) => doc,
        Err(err) => {
            report.add_fail("LOAD", format!("Failed to load model file: {}", err), path.clone());
            return report;
        }
    };

    let model = &doc.model;
    report.model_type = detect_model_type(model).to_string();

    if report.model_type == "library" {
        check_library_naming(model, &mut report);
        check_library_no_external_links(model, &mut report);
        check_library_masked(model, &mut report);
        check_library_helper_subsystems(model, &mut report);
    } else {
        check_app_library_links(model, &mut report);
        check_app_links_enforced(model, &mut report);
        check_app_no_loose_logic(model, &mut report);
        check_app_connections(model, &mut report);
    }

    report
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let mut total_passed = 0;
    let mut total_failed = 0;

    for path in &cli.models {
        let report = lint_model(path);
        print_report(&report);
        total_passed += report.passed;
        total_failed += report.failed;
    }

    if cli.models.len() > 1 {
        let rule = "══════════════════════════════════════════════════════════════";
        println!("{}{}{}{}", color::BOLD, color::BLUE, rule, color::RESET);
        println!(
            "{}{}  Summary: {} passed, {} failed{}",
            color::BOLD,
            color::BLUE,
            total_passed,
            total_failed,
            color::RESET
        );
        println!("{}{}{}{}", color::BOLD, color::BLUE, rule, color::RESET);
    }

    if total_failed > 0 {
        std::process::ExitCode::FAILURE
    } else {
        std::process::ExitCode::SUCCESS
    }
}
