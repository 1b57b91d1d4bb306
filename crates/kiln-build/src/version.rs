//! Host framework compatibility check.

use semver::{Version, VersionReq};

use crate::{Error, Result};

/// Framework versions this builder supports.
pub const SUPPORTED_FRAMEWORK_VERSIONS: &str = ">=17.0.0, <19.0.0";

/// Check that `found` satisfies the `supported` requirement.
///
/// Pre-release versions are matched against their release: `18.1.0-rc.1`
/// is treated as `18.1.0`. A leading `v` is accepted.
///
/// # Errors
///
/// [`Error::IncompatibleVersion`] when `found` is absent, unparsable, or
/// outside `supported`. [`Error::InvalidConfig`] when `supported` itself is
/// not a valid requirement.
pub fn assert_compatible_version(found: Option<&str>, supported: &str) -> Result<()> {
    let required = VersionReq::parse(supported).map_err(|e| {
        Error::InvalidConfig(format!("Invalid version requirement '{}': {}", supported, e))
    })?;

    let incompatible = |found: &str| Error::IncompatibleVersion {
        found: found.to_string(),
        required: supported.to_string(),
    };

    let Some(raw) = found else {
        return Err(incompatible("none"));
    };
    let mut version =
        Version::parse(raw.trim().trim_start_matches('v')).map_err(|_| incompatible(raw))?;
    version.pre = semver::Prerelease::EMPTY;
    version.build = semver::BuildMetadata::EMPTY;

    if required.matches(&version) {
        Ok(())
    } else {
        Err(incompatible(raw))
    }
}
