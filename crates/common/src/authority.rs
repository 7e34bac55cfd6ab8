use async_trait::async_trait;

/// OS facility granting app-level access (the device-level grant is brokered
/// by the `DeviceBackend`).
#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    /// Version the platform thresholds in `PermissionConfig` are compared to.
    fn platform_version(&self) -> u32;
    async fn has_app_permission(&self, name: &str) -> bool;
    /// Asynchronous; the outcome is observable after the next focus return.
    async fn request_app_permission(&self, name: &str);
    async fn should_show_rationale(&self, name: &str) -> bool;
}

/// Authority for platforms without an app-level permission model.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrestrictedAuthority;

#[async_trait]
impl PermissionAuthority for UnrestrictedAuthority {
    fn platform_version(&self) -> u32 {
        0
    }

    async fn has_app_permission(&self, _name: &str) -> bool {
        true
    }

    async fn request_app_permission(&self, _name: &str) {}

    async fn should_show_rationale(&self, _name: &str) -> bool {
        false
    }
}
