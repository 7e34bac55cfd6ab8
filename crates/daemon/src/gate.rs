use std::time::Duration;

use tokio::time::Instant;
use uvcd_common::types::DeviceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    App,
    Device(DeviceId),
}

#[derive(Debug, Clone)]
pub struct PendingPermission {
    pub kind: PendingKind,
    pub deadline: Instant,
}

/// Holds the single outstanding permission request and its deadline.
///
/// A request is resolved by an inbound event or expires at its deadline,
/// whichever comes first. A second request cannot be armed while one is
/// outstanding.
#[derive(Debug)]
pub struct PermissionGate {
    timeout: Duration,
    pending: Option<PendingPermission>,
}

impl PermissionGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn kind(&self) -> Option<&PendingKind> {
        self.pending.as_ref().map(|p| &p.kind)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn is_pending_for(&self, device: &DeviceId) -> bool {
        matches!(self.kind(), Some(PendingKind::Device(d)) if d == device)
    }

    /// Returns the deadline, or the kind already outstanding.
    pub fn arm(&mut self, kind: PendingKind, now: Instant) -> Result<Instant, PendingKind> {
        if let Some(existing) = &self.pending {
            return Err(existing.kind.clone());
        }
        let deadline = now + self.timeout;
        self.pending = Some(PendingPermission { kind, deadline });
        Ok(deadline)
    }

    pub fn resolve(&mut self) -> Option<PendingKind> {
        self.pending.take().map(|p| p.kind)
    }

    pub fn expire(&mut self, now: Instant) -> Option<PendingKind> {
        match &self.pending {
            Some(p) if now >= p.deadline => self.resolve(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    #[test]
    fn arm_refuses_overlap() {
        let now = Instant::now();
        let mut gate = PermissionGate::new(Duration::from_millis(500));
        let deadline = gate.arm(PendingKind::Device(cam("camA")), now).unwrap();
        assert_eq!(deadline, now + Duration::from_millis(500));
        assert_eq!(
            gate.arm(PendingKind::Device(cam("camB")), now),
            Err(PendingKind::Device(cam("camA")))
        );
        assert!(gate.is_pending_for(&cam("camA")));
        assert!(!gate.is_pending_for(&cam("camB")));
    }

    #[test]
    fn expire_only_after_deadline() {
        let now = Instant::now();
        let mut gate = PermissionGate::new(Duration::from_millis(500));
        gate.arm(PendingKind::App, now).unwrap();
        assert!(gate.expire(now + Duration::from_millis(499)).is_none());
        assert!(gate.is_pending());
        assert_eq!(gate.expire(now + Duration::from_millis(500)), Some(PendingKind::App));
        assert!(!gate.is_pending());
        assert!(gate.expire(now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn resolve_clears_and_allows_rearm() {
        let now = Instant::now();
        let mut gate = PermissionGate::new(Duration::from_millis(10));
        gate.arm(PendingKind::Device(cam("camA")), now).unwrap();
        assert_eq!(gate.resolve(), Some(PendingKind::Device(cam("camA"))));
        assert_eq!(gate.resolve(), None);
        assert!(gate.arm(PendingKind::Device(cam("camB")), now).is_ok());
    }
}
