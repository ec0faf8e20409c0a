/// Capability flags consulted by the WASI host-call dispatcher (§3, §6).
///
/// Denying a capability fails the corresponding WASI call with a typed
/// "capability denied" errno without the call ever reaching the operating
/// system; it is not a trap. The default is fully closed, matching a
/// "deny by default" embedding posture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub allow_read: bool,
    pub allow_write: bool,
    pub allow_env: bool,
    pub allow_path: bool,
    pub allow_fd: bool,
}

impl Capabilities {
    /// No capabilities granted.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Every capability granted (`--allow-all`).
    #[must_use]
    pub fn all() -> Self {
        Self {
            allow_read: true,
            allow_write: true,
            allow_env: true,
            allow_path: true,
            allow_fd: true,
        }
    }
}
