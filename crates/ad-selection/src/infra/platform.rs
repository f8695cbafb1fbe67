use crate::domain::auction::AdTechIdentifier;

/// Facts the host platform knows about the calling app and about ad techs.
/// All checks are synchronous so request gating finishes before any work is
/// scheduled.
#[cfg_attr(test, mockall::automock)]
pub trait Platform: Send + Sync {
    /// Whether the process calling the API owns `package`.
    fn caller_owns_package(&self, package: &str) -> bool;

    fn is_foreground(&self, package: &str) -> bool;

    /// Whether the user revoked consent to ad selection for `package`.
    fn is_consent_revoked(&self, package: &str) -> bool;

    fn is_developer_mode_enabled(&self, package: &str) -> bool;

    fn is_enrolled(&self, ad_tech: &AdTechIdentifier) -> bool;

    fn has_attribution_permission(&self, package: &str) -> bool;

    fn is_attribution_consent_revoked(&self, package: &str) -> bool;
}
