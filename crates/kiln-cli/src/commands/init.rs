//! Init command implementation.

use crate::cli::InitArgs;
use crate::config::{CONFIG_FILE_NAME, KilnConfig};
use crate::error::{ConfigError, Result, ResultExt};
use crate::ui;

/// Write an example `kiln.config.json` into `args.dir`.
///
/// # Errors
///
/// [`ConfigError::AlreadyExists`] when the file exists and `--force` was
/// not given.
pub async fn execute(args: InitArgs) -> Result<()> {
    let path = args.dir.join(CONFIG_FILE_NAME);
    if path.exists() && !args.force {
        return Err(ConfigError::AlreadyExists(path).into());
    }

    let mut contents =
        KilnConfig::example_config().context("Failed to render the example config")?;
    contents.push('\n');

    tokio::fs::create_dir_all(&args.dir)
        .await
        .with_path(&args.dir)
        .with_hint("Check that the target directory can be created")?;
    tokio::fs::write(&path, contents)
        .await
        .with_path(&path)
        .with_hint("Check that the target directory is writable")?;

    ui::success(&format!("Created {}", path.display()));
    ui::info("Adjust 'browser' and 'server', then run `kiln build`");
    Ok(())
}
