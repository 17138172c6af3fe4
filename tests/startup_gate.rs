use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use chroma_session::{
    AuthorizationStatus, ChannelReporter, ErrorKind, PermissionsGateway, StartupGate,
    StartupState,
};

/// Undetermined until the first prompt; counts prompts.
struct PromptingPermissions {
    status: Mutex<AuthorizationStatus>,
    prompts: AtomicUsize,
}

impl PromptingPermissions {
    fn new() -> Self {
        Self {
            status: Mutex::new(AuthorizationStatus::NotDetermined),
            prompts: AtomicUsize::new(0),
        }
    }
}

impl PermissionsGateway for PromptingPermissions {
    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        Ok(*self.status.lock().unwrap())
    }

    fn request_camera_access(&self) -> Result<bool> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        // Simulates the user taking a moment to answer.
        thread::sleep(Duration::from_millis(50));
        *self.status.lock().unwrap() = AuthorizationStatus::Authorized;
        Ok(true)
    }
}

struct BrokenPermissions;

impl PermissionsGateway for BrokenPermissions {
    fn authorization_status(&self) -> Result<AuthorizationStatus> {
        Err(anyhow!("permission service unreachable"))
    }

    fn request_camera_access(&self) -> Result<bool> {
        Err(anyhow!("permission service unreachable"))
    }
}

#[test]
fn concurrent_requests_prompt_once() {
    let permissions = Arc::new(PromptingPermissions::new());
    let gate = Arc::new(StartupGate::new(permissions.clone()));
    let barrier = Arc::new(Barrier::new(4));

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let gate = gate.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                gate.request_if_needed()
            })
        })
        .collect();
    for caller in callers {
        assert_eq!(caller.join().unwrap(), StartupState::Ready);
    }

    assert_eq!(permissions.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(gate.state(), StartupState::Ready);
}

#[test]
fn evaluate_never_prompts() {
    let permissions = Arc::new(PromptingPermissions::new());
    let gate = StartupGate::new(permissions.clone());
    assert_eq!(gate.state(), StartupState::Idle);
    assert_eq!(gate.evaluate(), StartupState::CheckingPermissions);
    assert_eq!(permissions.prompts.load(Ordering::SeqCst), 0);
}

#[test]
fn gateway_errors_become_failed_and_are_reported() {
    let (reporter, errors) = ChannelReporter::bounded(8);
    let gate = StartupGate::new(Arc::new(BrokenPermissions)).with_reporter(Arc::new(reporter));

    match gate.evaluate() {
        StartupState::Failed(reason) => assert!(reason.contains("unreachable")),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(matches!(gate.request_if_needed(), StartupState::Failed(_)));

    let kinds: Vec<ErrorKind> = errors.try_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::Permissions, ErrorKind::Permissions]);
}
