//! Build command implementation.
//!
//! `kiln build` loads the configuration, hands it to the application
//! builder with a [`PassthroughBundler`] and reports every outcome the
//! session yields. In watch mode the session runs until Ctrl+C.

use crate::bundler::PassthroughBundler;
use crate::cli::BuildArgs;
use crate::config::{KilnConfig, LoadedConfig};
use crate::error::{BuildError, Result, ResultExt};
use crate::ui;
use kiln_build::{
    BuildSession, BuilderContext, CacheOptions, InfrastructureSettings, build_application,
};
use tokio_util::sync::CancellationToken;

/// Version of the bundler the builder drives. The passthrough bundler ships
/// with the CLI, so it is the CLI's own version.
const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Execute the build command.
///
/// # Build Process
///
/// 1. Load and validate configuration (CLI > Env > File > Defaults)
/// 2. Install the Ctrl+C handler
/// 3. Start the build session
/// 4. Report each outcome until the session ends
///
/// # Errors
///
/// Configuration problems, orchestrator errors, a failed single-shot
/// build, or a session that ended without any result.
pub async fn execute(args: BuildArgs, verbose: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let loaded = KilnConfig::load(&args, &cwd)?;
    loaded.config.validate()?;
    for warning in loaded.config.warnings() {
        ui::warning(&warning);
    }

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let context = builder_context(&loaded, cancel.clone());
    let settings = InfrastructureSettings {
        write: !args.no_write,
    };

    let session = build_application(
        loaded.config.application_options(verbose),
        &context,
        settings,
        PassthroughBundler::new,
    )
    .await;

    let result = report(session, loaded.config.watch, verbose, &cancel).await;
    // Stops the interrupt handler.
    cancel.cancel();
    result
}

fn builder_context(loaded: &LoadedConfig, cancel: CancellationToken) -> BuilderContext {
    let config = &loaded.config;
    BuilderContext::new(&loaded.workspace_root)
        .target(config.build_target())
        .framework_version(FRAMEWORK_VERSION)
        .supported_versions(format!("^{}", FRAMEWORK_VERSION))
        .cancellation(cancel)
        .cache(CacheOptions::for_workspace(&loaded.workspace_root).enabled(config.cache))
        .watch_policy(config.watch_policy())
}

/// Cancel `token` on Ctrl+C. The task ends when the token is cancelled.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    tracing::info!("Interrupted, stopping...");
                    token.cancel();
                }
                Err(e) => tracing::warn!("Cannot listen for Ctrl+C: {}", e),
            },
            _ = token.cancelled() => {}
        }
    });
}

async fn report(
    mut session: BuildSession<PassthroughBundler>,
    watch: bool,
    verbose: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut outcomes = 0usize;
    let mut failed_with = None;

    while let Some(item) = session.next().await {
        let outcome = item?;
        outcomes += 1;
        ui::print_build_summary(&outcome, verbose);
        failed_with = (!outcome.success).then(|| outcome.errors().count());
    }

    if let Some(error) = session.take_setup_error() {
        return Err(error.into());
    }

    if outcomes == 0 {
        // Ctrl+C before the first build finished is not a failure.
        return if cancel.is_cancelled() {
            Ok(())
        } else {
            Err(BuildError::NoResult.into())
        };
    }

    match failed_with {
        Some(errors) if !watch => Err(BuildError::Failed { errors }.into()),
        _ => Ok(()),
    }
}
