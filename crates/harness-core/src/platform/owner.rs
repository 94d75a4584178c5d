//! Resolve a username to a uid/gid pair and re-own/re-mode a directory tree.
//!
//! The harness runs as root specifically so that it can reclaim ownership of
//! files created as root inside bind-mounted containers (§9 "Permission
//! fix-up" in the design notes). This module is the one place that touches
//! raw uid/gid numbers.

use std::path::Path;

use crate::error::{HarnessError, Result};

/// A resolved (uid, gid) pair for the configured file owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// Resolve `username` via the system password database, mirroring the
    /// original's `pwd.getpwnam(name).pw_uid`.
    #[cfg(unix)]
    pub fn resolve(username: &str) -> Result<Self> {
        use std::ffi::CString;

        let c_name = CString::new(username)
            .map_err(|_| HarnessError::Config("username contains a NUL byte".into()))?;

        // SAFETY: getpwnam returns either a valid pointer into a
        // thread-local/static buffer or null; we copy the two fields we need
        // out before any other libc call could invalidate it.
        let passwd = unsafe { libc::getpwnam(c_name.as_ptr()) };
        if passwd.is_null() {
            return Err(HarnessError::Config(format!(
                "no such user: {username}"
            )));
        }
        let (uid, gid) = unsafe { ((*passwd).pw_uid, (*passwd).pw_gid) };
        Ok(Owner { uid, gid })
    }

    #[cfg(not(unix))]
    pub fn resolve(_username: &str) -> Result<Self> {
        Err(HarnessError::Config(
            "user resolution is only supported on unix targets".into(),
        ))
    }
}

/// Directory mode applied during permission normalization.
pub const DIR_MODE: u32 = 0o755;
/// File mode applied during permission normalization.
pub const FILE_MODE: u32 = 0o644;

/// Recursively re-own and re-mode every entry under `root` to `owner`,
/// directories at [`DIR_MODE`] and files at [`FILE_MODE`].
///
/// This is the invariant from spec §3/§8.3: after an instance finishes,
/// every entry in its result subtree belongs to the configured owner with
/// normalized permissions, regardless of how containers left it.
#[cfg(unix)]
pub fn reown_tree(root: &Path, owner: Owner) -> Result<()> {
    if !root.exists() {
        return Ok(());
    }
    reown_entry(root, owner)?;
    if root.is_dir() {
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            reown_tree(&entry.path(), owner)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn reown_entry(path: &Path, owner: Owner) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| HarnessError::Artifact(format!("path contains a NUL byte: {path:?}")))?;

    // SAFETY: c_path is a valid, NUL-terminated byte string for the
    // lifetime of this call.
    let rc = unsafe { libc::chown(c_path.as_ptr(), owner.uid, owner.gid) };
    if rc != 0 {
        return Err(HarnessError::Artifact(format!(
            "chown {path:?} failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let mode = if path.is_dir() { DIR_MODE } else { FILE_MODE };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn reown_tree(_root: &Path, _owner: Owner) -> Result<()> {
    Err(HarnessError::Config(
        "permission fix-up is only supported on unix targets".into(),
    ))
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn resolve_root_user() {
        let owner = Owner::resolve("root").expect("root always exists");
        assert_eq!(owner.uid, 0);
        assert_eq!(owner.gid, 0);
    }

    #[test]
    fn resolve_unknown_user_errors() {
        let result = Owner::resolve("definitely-not-a-real-user-xyz123");
        assert!(result.is_err());
    }

    #[test]
    fn reown_tree_normalizes_modes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        let file = nested.join("f.txt");
        std::fs::write(&file, b"x").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600)).unwrap();

        let owner = Owner {
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        };
        reown_tree(dir.path(), owner).expect("reown should succeed for own uid/gid");

        use std::os::unix::fs::PermissionsExt;
        let file_mode = std::fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, FILE_MODE);
        let dir_mode = std::fs::metadata(&nested).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, DIR_MODE);
    }
}
