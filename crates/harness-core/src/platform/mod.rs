//! Low-level, OS-facing helpers: uid/gid resolution, permission fix-up, and
//! the host resource snapshot written into each instance's `system.log`.

pub mod owner;
pub mod snapshot;
