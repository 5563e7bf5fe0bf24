//! Process-wide view service
//!
//! For hosts that cannot thread a [`ViewService`] through their code. The
//! first successful call builds the service; later calls append their view
//! paths to it and ignore the cache path. The instance lives until the
//! process exits.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;

use crate::error::Result;
use crate::service::ViewService;

static INSTANCE: OnceCell<Mutex<ViewService>> = OnceCell::new();

/// Accessor for the shared [`ViewService`]
pub struct GlobalViewService;

impl GlobalViewService {
    /// Get the shared service, creating it on first use
    ///
    /// The first call fails with a configuration error when `view_paths` is
    /// empty, and the instance stays uninitialized. The returned guard holds
    /// the service lock, so drop it before calling again from the same thread.
    pub fn get_instance<I, P>(
        view_paths: I,
        cache_path: Option<&Path>,
    ) -> Result<MutexGuard<'static, ViewService>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = view_paths.into_iter().map(Into::into).collect();

        let mut created = false;
        let instance = INSTANCE.get_or_try_init(|| {
            created = true;
            ViewService::new(paths.iter().cloned(), cache_path, None).map(Mutex::new)
        })?;

        let mut service = instance.lock().unwrap_or_else(PoisonError::into_inner);
        if created {
            tracing::debug!("Created global view service");
        } else {
            for path in paths {
                service.add_view_path(path, false);
            }
        }

        Ok(service)
    }

    pub fn is_initialized() -> bool {
        INSTANCE.get().is_some()
    }
}
