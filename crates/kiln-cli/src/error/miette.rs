//! Miette diagnostic conversion for CLI errors.

use crate::error::CliError;
use miette::Report;

/// Convert a [`CliError`] into a report for the terminal.
///
/// Orchestrator errors keep their diagnostic code and help text; everything
/// else already carries its hint in the message.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Kiln(e) => Report::new(e),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    #[test]
    fn test_kiln_errors_keep_their_code() {
        let report = cli_error_to_miette(CliError::Kiln(kiln_build::Error::MissingTarget(
            "application".to_string(),
        )));
        let code = report.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("MISSING_TARGET"));
    }

    #[test]
    fn test_other_errors_render_their_message() {
        let report = cli_error_to_miette(BuildError::Failed { errors: 1 }.into());
        assert!(report.to_string().contains("Build failed with 1 error(s)"));
    }
}
