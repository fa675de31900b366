use super::{decorator_chain, decorator_matches, FrameworkPlugin};
use crate::symbols::Symbol;
use lazy_static::lazy_static;
use std::collections::HashSet;

const PATTERNS: [&str; 3] = ["*.task", "shared_task", "*.on_after_configure.connect"];

lazy_static! {
    /// Signals whose `.connect` handlers the broker invokes. The
    /// authoritative list is implementation-chosen; this covers the
    /// commonly connected ones.
    static ref SIGNALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("task_prerun");
        s.insert("task_postrun");
        s.insert("task_success");
        s.insert("task_failure");
        s.insert("task_retry");
        s.insert("task_received");
        s.insert("task_revoked");
        s.insert("worker_init");
        s.insert("worker_ready");
        s.insert("worker_shutdown");
        s.insert("celeryd_init");
        s.insert("beat_init");
        s.insert("setup_logging");
        s.insert("after_setup_logger");
        s.insert("after_setup_task_logger");
        s
    };
}

/// Recognizes Celery tasks and signal handlers.
pub struct CeleryPlugin;

impl FrameworkPlugin for CeleryPlugin {
    fn name(&self) -> &'static str {
        "celery"
    }

    fn match_symbol(&self, symbol: &Symbol) -> Option<String> {
        for pattern in PATTERNS {
            if symbol
                .decorators
                .iter()
                .any(|decorator| decorator_matches(pattern, decorator))
            {
                return Some(format!("celery:{}", pattern));
            }
        }
        // @task_success.connect and friends.
        for decorator in &symbol.decorators {
            let chain = decorator_chain(decorator);
            let segments: Vec<&str> = chain.split('.').collect();
            if segments.len() >= 2 && segments[segments.len() - 1] == "connect" {
                let signal = segments[segments.len() - 2];
                if SIGNALS.contains(signal) {
                    return Some(format!("celery:{}.connect", signal));
                }
            }
        }
        None
    }

    fn decorator_patterns(&self) -> &'static [&'static str] {
        &PATTERNS
    }
}
