//! Fault injection for resilience testing.
//!
//! The conformance suite arms a fault via `POST /_test/inject-error`; while
//! armed, matching stream requests short-circuit with the injected status
//! before reaching the store. `DELETE /_test/inject-error` disarms. A
//! `remaining` budget makes the fault one-shot or n-shot; without it the
//! fault persists until disarmed.

use parking_lot::Mutex;
use serde::Deserialize;

/// Fault description accepted from the test runner.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultSpec {
    /// HTTP status to return for intercepted requests.
    pub status: u16,
    /// Only intercept requests whose path starts with this prefix.
    #[serde(default)]
    pub path: Option<String>,
    /// Number of requests to intercept before auto-disarming.
    #[serde(default)]
    pub remaining: Option<u32>,
    /// Response body for intercepted requests.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug)]
struct FaultState {
    spec: FaultSpec,
    remaining: Option<u32>,
}

/// Shared fault-injection state.
#[derive(Debug, Default)]
pub struct FaultInjector {
    active: Mutex<Option<FaultState>>,
}

impl FaultInjector {
    /// Arm a fault, replacing any previous one.
    pub fn arm(&self, spec: FaultSpec) {
        let remaining = spec.remaining;
        *self.active.lock() = Some(FaultState { spec, remaining });
    }

    /// Disarm the active fault, if any.
    pub fn disarm(&self) {
        *self.active.lock() = None;
    }

    /// Decide whether to intercept a request for `path`.
    ///
    /// Returns the status and body to serve, decrementing the remaining
    /// budget. Test-control paths are never intercepted.
    pub fn intercept(&self, path: &str) -> Option<(u16, String)> {
        if path.starts_with("/_test/") {
            return None;
        }

        let mut active = self.active.lock();
        let state = active.as_mut()?;

        if let Some(prefix) = state.spec.path.as_deref() {
            if !path.starts_with(prefix) {
                return None;
            }
        }

        if state.remaining == Some(0) {
            *active = None;
            return None;
        }

        let response = (
            state.spec.status,
            state
                .spec
                .message
                .clone()
                .unwrap_or_else(|| "injected error".to_string()),
        );

        if let Some(remaining) = state.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                *active = None;
            }
        }

        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_by_default() {
        let injector = FaultInjector::default();
        assert!(injector.intercept("/stream/a").is_none());
    }

    #[test]
    fn test_arm_and_disarm() {
        let injector = FaultInjector::default();
        injector.arm(FaultSpec {
            status: 503,
            path: None,
            remaining: None,
            message: None,
        });

        assert_eq!(
            injector.intercept("/stream/a"),
            Some((503, "injected error".to_string()))
        );
        // Persists until disarmed.
        assert!(injector.intercept("/stream/b").is_some());

        injector.disarm();
        assert!(injector.intercept("/stream/a").is_none());
    }

    #[test]
    fn test_path_prefix_filter() {
        let injector = FaultInjector::default();
        injector.arm(FaultSpec {
            status: 500,
            path: Some("/stream/a".to_string()),
            remaining: None,
            message: None,
        });

        assert!(injector.intercept("/stream/a/sub").is_some());
        assert!(injector.intercept("/stream/b").is_none());
    }

    #[test]
    fn test_remaining_budget_auto_disarms() {
        let injector = FaultInjector::default();
        injector.arm(FaultSpec {
            status: 500,
            path: None,
            remaining: Some(2),
            message: Some("boom".to_string()),
        });

        assert_eq!(injector.intercept("/a"), Some((500, "boom".to_string())));
        assert_eq!(injector.intercept("/a"), Some((500, "boom".to_string())));
        assert!(injector.intercept("/a").is_none());
    }

    #[test]
    fn test_zero_budget_never_fires() {
        let injector = FaultInjector::default();
        injector.arm(FaultSpec {
            status: 500,
            path: None,
            remaining: Some(0),
            message: None,
        });

        assert!(injector.intercept("/a").is_none());
        assert!(injector.intercept("/a").is_none());
    }

    #[test]
    fn test_control_paths_never_intercepted() {
        let injector = FaultInjector::default();
        injector.arm(FaultSpec {
            status: 500,
            path: None,
            remaining: None,
            message: None,
        });

        assert!(injector.intercept("/_test/inject-error").is_none());
    }
}
