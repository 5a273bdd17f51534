//! Time-bounded cache of module policies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::validation::is_safe_name;

use super::document::ModulePolicy;

struct CachedPolicy {
    policy: Arc<ModulePolicy>,
    loaded_at: Instant,
}

/// Loads `module.xml` documents and keeps them for a fixed time.
///
/// Entries are replaced wholesale on refresh, so a reader holding an
/// `Arc<ModulePolicy>` keeps a consistent view for as long as it needs.
pub struct PolicyStore {
    module_root: PathBuf,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedPolicy>>,
}

impl PolicyStore {
    pub fn new(module_root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            module_root: module_root.into(),
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Directory a module's policy lives in.
    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.module_root.join(format!("{}.module", module))
    }

    /// Fetch the policy for `module`, loading it if absent or stale.
    ///
    /// Returns `None` for invalid names, missing documents and documents that
    /// fail validation.
    pub fn get(&self, module: &str) -> Option<Arc<ModulePolicy>> {
        if !is_safe_name(module) {
            debug!(module = %module, "Rejecting invalid module name");
            return None;
        }

        {
            let cache = match self.cache.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(entry) = cache.get(module) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Some(Arc::clone(&entry.policy));
                }
            }
        }

        // Loaded without holding the lock; concurrent refreshes of the same
        // module are harmless, the last writer wins.
        let policy = Arc::new(self.load(module)?);

        let mut cache = match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.insert(
            module.to_string(),
            CachedPolicy {
                policy: Arc::clone(&policy),
                loaded_at: Instant::now(),
            },
        );
        Some(policy)
    }

    /// Drop every cached policy so the next lookup rereads the disk.
    pub fn invalidate(&self) {
        let mut cache = match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let dropped = cache.len();
        cache.clear();
        debug!(dropped = dropped, "Policy cache invalidated");
    }

    /// Number of cached entries, fresh or stale.
    pub fn len(&self) -> usize {
        match self.cache.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&self, module: &str) -> Option<ModulePolicy> {
        let path = self.module_dir(module).join("module.xml");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(module = %module, path = %path.display(), "No policy document");
                return None;
            }
            Err(e) => {
                warn!(module = %module, path = %path.display(), error = %e, "Failed to read policy document");
                return None;
            }
        };

        match ModulePolicy::parse(module, &content) {
            Ok(policy) => {
                debug!(
                    module = %module,
                    fileops = policy.fileops.len(),
                    scripts = policy.scripts.len(),
                    "Policy loaded"
                );
                Some(policy)
            }
            Err(e) => {
                warn!(module = %module, path = %path.display(), error = %e, "Rejecting invalid policy document");
                None
            }
        }
    }
}
