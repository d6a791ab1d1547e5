//! Silencing of native solver output
//!
//! CBC writes its banner and branch-and-bound progress straight to the process
//! stdout, which interleaves with the CLI output and with `cargo test` captures.
//! The `gag` crate redirects a stream, but only one `Gag` per stream may exist at a
//! time, so concurrent solves (tests run in parallel) share a single instance
//! through a weak-reference registry. The redirection lasts as long as any
//! [`GagHandle`] is alive.

use gag::Gag;
use std::sync::{Arc, Mutex, Weak};

/// Shared guard keeping a stream redirected while it is alive
pub struct GagHandle {
    _gag: Arc<Gag>,
}

impl GagHandle {
    /// Redirect stdout, joining an active redirection if there is one
    pub fn stdout() -> Result<Self, std::io::Error> {
        STDOUT_REGISTRY.acquire()
    }
}

struct GagRegistry {
    active: Mutex<Weak<Gag>>,
    open: fn() -> Result<Gag, std::io::Error>,
}

impl GagRegistry {
    const fn new(open: fn() -> Result<Gag, std::io::Error>) -> Self {
        Self {
            active: Mutex::new(Weak::new()),
            open,
        }
    }

    fn acquire(&self) -> Result<GagHandle, std::io::Error> {
        // the mutex only guards the weak pointer, a poisoned lock is still usable
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(gag) = active.upgrade() {
            return Ok(GagHandle { _gag: gag });
        }

        let gag = Arc::new((self.open)()?);
        *active = Arc::downgrade(&gag);
        Ok(GagHandle { _gag: gag })
    }
}

static STDOUT_REGISTRY: GagRegistry = GagRegistry::new(Gag::stdout);
