//! Scoped acquisition of a uniquely-named temporary directory with
//! guaranteed, idempotent cleanup (spec §3 "Workdir", §4.B).

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::Result;

type CleanupHook = Box<dyn FnOnce(&Workdir) + Send>;

/// A scoped handle to `<work_root>/<stem>--<rand>`.
///
/// Released exactly once via [`Workdir::cleanup`]: runs an optional hook
/// with the handle itself as argument, then recursively removes the
/// directory, then marks the handle released. A released handle is a
/// no-op on further cleanup — including the implicit cleanup on [`Drop`].
pub struct Workdir {
    path: Option<PathBuf>,
    cleanup_hook: Option<CleanupHook>,
}

impl Workdir {
    /// Create `<work_root>/<stem>--<rand>` and return a handle to it.
    pub fn new(work_root: &Path, stem: &str) -> Result<Self> {
        std::fs::create_dir_all(work_root)?;
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let path = work_root.join(format!("{stem}--{suffix}"));
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path: Some(path),
            cleanup_hook: None,
        })
    }

    /// Attach a pre-cleanup hook, invoked once with `&self` when the handle
    /// is released, before the directory is removed.
    pub fn set_cleanup_hook<F>(&mut self, hook: F)
    where
        F: FnOnce(&Workdir) + Send + 'static,
    {
        self.cleanup_hook = Some(Box::new(hook));
    }

    /// The handle's directory path, or `None` if already released.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True if this handle has not yet been cleaned up.
    pub fn is_live(&self) -> bool {
        self.path.is_some()
    }

    /// Run the cleanup hook (if any), then recursively remove the
    /// directory, then mark the handle released. Idempotent: a second call
    /// is a no-op.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.path.is_none() {
            return Ok(());
        }
        if let Some(hook) = self.cleanup_hook.take() {
            hook(self);
        }
        if let Some(path) = self.path.take() {
            // Best-effort: the hook may already have moved the directory
            // away (e.g. the Instance Runner's log-workdir hook relocates
            // it into the result tree), so a missing path here is normal.
            let _ = std::fs::remove_dir_all(&path);
        }
        Ok(())
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn new_creates_directory_with_random_suffix() {
        let root = tempfile::tempdir().unwrap();
        let wd = Workdir::new(root.path(), "mystem").unwrap();
        let path = wd.path().unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("mystem--"));
    }

    #[test]
    fn cleanup_removes_directory_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut wd = Workdir::new(root.path(), "stem").unwrap();
        let path = wd.path().unwrap().to_path_buf();
        assert!(path.exists());

        wd.cleanup().unwrap();
        assert!(!path.exists());
        assert!(!wd.is_live());

        // second cleanup is a no-op, not an error
        wd.cleanup().unwrap();
    }

    #[test]
    fn hook_runs_exactly_once_before_removal() {
        let root = tempfile::tempdir().unwrap();
        let mut wd = Workdir::new(root.path(), "stem").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        wd.set_cleanup_hook(move |handle| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            assert!(handle.path().unwrap().exists());
        });

        wd.cleanup().unwrap();
        wd.cleanup().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_without_explicit_cleanup_still_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let wd = Workdir::new(root.path(), "stem").unwrap();
            wd.path().unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn hook_that_moves_the_directory_away_is_tolerated() {
        let root = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let dest = dest_root.path().join("_harness");
        let mut wd = Workdir::new(root.path(), "stem").unwrap();
        let dest_clone = dest.clone();
        wd.set_cleanup_hook(move |handle| {
            let src = handle.path().unwrap();
            std::fs::rename(src, &dest_clone).unwrap();
        });

        wd.cleanup().unwrap();
        assert!(dest.exists());
    }
}
