//! Probe for whether the platform location service is installed and usable.

use crate::error::ServiceError;
use tracing::error;

/// Result of a service presence check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AvailabilityCode {
    Success,
    ServiceMissing,
    VersionUpdateRequired,
    ServiceDisabled,
    /// Any other platform-specific code.
    Other(i32),
}

impl AvailabilityCode {
    /// Whether the user can fix this by installing, updating or enabling
    /// the service.
    pub fn is_user_resolvable(self) -> bool {
        matches!(
            self,
            AvailabilityCode::ServiceMissing
                | AvailabilityCode::VersionUpdateRequired
                | AvailabilityCode::ServiceDisabled
        )
    }
}

/// Platform hook for checking service presence.
pub trait ServiceProbe {
    fn check(&self) -> Result<AvailabilityCode, ServiceError>;

    /// Ask the user to resolve `code`, e.g. by showing an install/update prompt.
    fn prompt_resolution(&self, code: AvailabilityCode);
}

/// Whether the location service is available.
///
/// With `allow_prompt`, a user-resolvable problem is handed to
/// [`ServiceProbe::prompt_resolution`] before returning `false`. A failing
/// probe counts as unavailable.
pub fn is_service_available(probe: &dyn ServiceProbe, allow_prompt: bool) -> bool {
    match probe.check() {
        Ok(AvailabilityCode::Success) => true,
        Ok(code) => {
            if allow_prompt && code.is_user_resolvable() {
                probe.prompt_resolution(code);
            }
            false
        }
        Err(e) => {
            error!(error = %e, "Location service availability check failed");
            false
        }
    }
}
