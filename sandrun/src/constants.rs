//! Fixed values used throughout the supervisor.

/// The fixed "nobody/nobody" id used as the unprivileged principal inside
/// a freshly created user namespace.
pub const NOBODY_ID: u32 = 65534;

/// First FD position in the child's FD table. 0/1/2 are stdio.
pub const FIRST_DONATED_FD: i32 = 3;

/// Bound on the readiness poll (C5) and on `Destroy`'s wait-for-stopped
/// backoff: both use a 5s window.
pub const READY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Constant-interval retry spacing for readiness polling and stop polling.
pub const RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
