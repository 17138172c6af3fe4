//! Permission-dependent readiness.
//!
//! `StartupGate` never prompts from `evaluate`. `request_if_needed` prompts at
//! most once at a time; concurrent callers wait for the in-flight prompt and
//! then see its outcome instead of prompting again.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::report::{ErrorEvent, ErrorKind, ErrorReporter, LogReporter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
}

/// Platform camera-permission capability.
pub trait PermissionsGateway: Send + Sync {
    fn authorization_status(&self) -> Result<AuthorizationStatus>;

    /// Prompt the user. Returns whether access was granted.
    fn request_camera_access(&self) -> Result<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartupState {
    Idle,
    CheckingPermissions,
    RequestingPermissions,
    Ready,
    Blocked,
    Failed(String),
}

impl StartupState {
    pub fn is_ready(&self) -> bool {
        matches!(self, StartupState::Ready)
    }
}

pub struct StartupGate {
    permissions: Arc<dyn PermissionsGateway>,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<StartupState>,
    request: Mutex<()>,
}

impl StartupGate {
    pub fn new(permissions: Arc<dyn PermissionsGateway>) -> Self {
        Self {
            permissions,
            reporter: Arc::new(LogReporter),
            state: Mutex::new(StartupState::Idle),
            request: Mutex::new(()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> StartupState {
        self.lock_state().clone()
    }

    /// Check permission status without prompting.
    pub fn evaluate(&self) -> StartupState {
        let next = match self.status() {
            Ok(AuthorizationStatus::Authorized) => StartupState::Ready,
            Ok(AuthorizationStatus::NotDetermined) => StartupState::CheckingPermissions,
            Ok(AuthorizationStatus::Denied | AuthorizationStatus::Restricted) => {
                StartupState::Blocked
            }
            Err(failed) => failed,
        };
        self.set_state(next)
    }

    /// Resolve to `Ready` or `Blocked`, prompting the user if status is undetermined.
    pub fn request_if_needed(&self) -> StartupState {
        let _request = match self.request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match self.status() {
            Ok(AuthorizationStatus::Authorized) => self.set_state(StartupState::Ready),
            Ok(AuthorizationStatus::Denied | AuthorizationStatus::Restricted) => {
                self.set_state(StartupState::Blocked)
            }
            Ok(AuthorizationStatus::NotDetermined) => {
                self.set_state(StartupState::RequestingPermissions);
                match self.permissions.request_camera_access() {
                    Ok(true) => self.set_state(StartupState::Ready),
                    Ok(false) => self.set_state(StartupState::Blocked),
                    Err(err) => self.fail(format!("camera access request failed: {:#}", err)),
                }
            }
            Err(failed) => failed,
        }
    }

    fn status(&self) -> std::result::Result<AuthorizationStatus, StartupState> {
        self.permissions
            .authorization_status()
            .map_err(|err| self.fail(format!("permission status unavailable: {:#}", err)))
    }

    fn fail(&self, reason: String) -> StartupState {
        self.reporter
            .report(ErrorEvent::new(ErrorKind::Permissions, None, reason.clone()));
        self.set_state(StartupState::Failed(reason))
    }

    fn set_state(&self, next: StartupState) -> StartupState {
        let mut state = self.lock_state();
        if *state != next {
            log::debug!("startup: {:?} -> {:?}", *state, next);
        }
        *state = next.clone();
        next
    }

    fn lock_state(&self) -> MutexGuard<'_, StartupState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Fixed permission answers, for headless runs and tests.
#[derive(Debug)]
pub struct StaticPermissions {
    status: Mutex<AuthorizationStatus>,
    grant_on_request: bool,
}

impl StaticPermissions {
    pub fn new(status: AuthorizationStatus, grant_on_request: bool) -> Self {
        Self {
            status: Mutex::new(status),
            grant_on_request,
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized, true)
    }
}

impl PermissionsGateway for StaticPermissions {
    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        Ok(*self
            .status
            .lock()
            .map_err(|_| anyhow::anyhow!("permission status lock poisoned"))?)
    }

    fn request_camera_access(&self) -> Result<bool> {
        let mut status = self
            .status
            .lock()
            .map_err(|_| anyhow::anyhow!("permission status lock poisoned"))?;
        *status = if self.grant_on_request {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        };
        Ok(self.grant_on_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_maps_status_without_prompting() {
        let cases = [
            (AuthorizationStatus::Authorized, StartupState::Ready),
            (AuthorizationStatus::NotDetermined, StartupState::CheckingPermissions),
            (AuthorizationStatus::Denied, StartupState::Blocked),
            (AuthorizationStatus::Restricted, StartupState::Blocked),
        ];
        for (status, expected) in cases {
            let permissions = Arc::new(StaticPermissions::new(status, true));
            let gate = StartupGate::new(permissions.clone());
            assert_eq!(gate.evaluate(), expected);
            assert_eq!(permissions.authorization_status().unwrap(), status);
        }
    }

    #[test]
    fn request_maps_prompt_outcome() {
        let granted = StartupGate::new(Arc::new(StaticPermissions::new(
            AuthorizationStatus::NotDetermined,
            true,
        )));
        assert_eq!(granted.request_if_needed(), StartupState::Ready);

        let refused = StartupGate::new(Arc::new(StaticPermissions::new(
            AuthorizationStatus::NotDetermined,
            false,
        )));
        assert_eq!(refused.request_if_needed(), StartupState::Blocked);
        assert_eq!(refused.state(), StartupState::Blocked);
    }
}
