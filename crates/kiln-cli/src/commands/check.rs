//! Check command implementation.
//!
//! Validates configuration without building.

use crate::cli::{BuildArgs, CheckArgs};
use crate::config::KilnConfig;
use crate::error::{Result, ResultExt};
use crate::ui;
use kiln_build::normalize_options;

/// Execute the check command.
///
/// With `--schema`, prints the JSON schema of `kiln.config.json` to stdout
/// and does nothing else. Otherwise loads the configuration the way
/// `kiln build` would, validates it and reports the resolved paths.
pub async fn execute(args: CheckArgs) -> Result<()> {
    if args.schema {
        let schema =
            KilnConfig::json_schema().context("Failed to generate the config schema")?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let build_args = BuildArgs {
        config: args.config,
        ..BuildArgs::default()
    };
    let loaded = KilnConfig::load(&build_args, &cwd)?;

    match &loaded.config_path {
        Some(path) => ui::info(&format!("Using {}", path.display())),
        None => ui::warning("No kiln.config.json found, using defaults"),
    }

    let config = &loaded.config;
    config.validate()?;
    for warning in config.warnings() {
        ui::warning(&warning);
    }

    let normalized = normalize_options(
        &loaded.workspace_root,
        &config.build_target(),
        config.application_options(false),
    )?;

    ui::info(&format!("Project: {}", normalized.project_name));
    ui::info(&format!("Browser entry: {}", normalized.browser.display()));
    ui::info(&format!("Source root: {}", normalized.source_root.display()));
    ui::info(&format!("Output path: {}", normalized.output_path.display()));

    if !normalized.browser.is_file() {
        ui::warning("Browser entry point does not exist");
    }
    if !normalized.source_root.is_dir() {
        ui::warning("Source root does not exist");
    }

    ui::success("Configuration is valid");
    Ok(())
}
