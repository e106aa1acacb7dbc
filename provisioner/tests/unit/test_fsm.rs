//! FSM unit tests

use provisioner::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentPhase, DeploymentState};
use provisioner::errors::DeployError;

fn advanced_to_host() -> DeploymentFsm {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Staged).unwrap();
    fsm.process(DeploymentEvent::PlatformDetected).unwrap();
    fsm.process(DeploymentEvent::DatabaseProvisioned).unwrap();
    fsm.process(DeploymentEvent::HostProvisioned).unwrap();
    fsm
}

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), &DeploymentState::Pending);
    assert!(fsm.error().is_none());
    assert!(fsm.failed_phase().is_none());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = advanced_to_host();
    assert_eq!(fsm.state(), &DeploymentState::HostProvisioned);

    fsm.process(DeploymentEvent::ConnectionConfigured).unwrap();
    fsm.process(DeploymentEvent::Registered).unwrap();
    fsm.process(DeploymentEvent::Ready).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Ready);
}

#[test]
fn test_fsm_phases_cannot_be_skipped() {
    let mut fsm = DeploymentFsm::new();

    let result = fsm.process(DeploymentEvent::Ready);
    assert!(matches!(result, Err(DeployError::InvalidTransition(_))));
    assert_eq!(fsm.state(), &DeploymentState::Pending);

    fsm.process(DeploymentEvent::Staged).unwrap();
    assert!(fsm.process(DeploymentEvent::HostProvisioned).is_err());
    assert_eq!(fsm.state(), &DeploymentState::Staged);
}

#[test]
fn test_fsm_fail_only_in_running_phase() {
    let mut fsm = advanced_to_host();

    // Host already completed
    let stale = fsm.process(DeploymentEvent::Fail(DeploymentPhase::Host, "late".to_string()));
    assert!(stale.is_err());
    assert_eq!(fsm.state(), &DeploymentState::HostProvisioned);

    fsm.process(DeploymentEvent::Fail(DeploymentPhase::Configure, "no partition".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Failed);
    assert_eq!(fsm.failed_phase(), Some(DeploymentPhase::Configure));
    assert_eq!(fsm.error(), Some("no partition"));
}

#[test]
fn test_fsm_terminal_states_reject_events() {
    let mut failed = DeploymentFsm::new();
    failed
        .process(DeploymentEvent::Fail(DeploymentPhase::Stage, "missing".to_string()))
        .unwrap();
    assert!(failed.state().is_terminal());
    assert!(failed.process(DeploymentEvent::Staged).is_err());
    assert!(failed
        .process(DeploymentEvent::Fail(DeploymentPhase::Stage, "again".to_string()))
        .is_err());
    assert_eq!(failed.error(), Some("missing"));

    let mut ready = advanced_to_host();
    ready.process(DeploymentEvent::ConnectionConfigured).unwrap();
    ready.process(DeploymentEvent::Registered).unwrap();
    ready.process(DeploymentEvent::Ready).unwrap();
    assert!(ready
        .process(DeploymentEvent::Fail(DeploymentPhase::Probe, "late".to_string()))
        .is_err());
    assert_eq!(ready.state(), &DeploymentState::Ready);
}

#[test]
fn test_phase_names() {
    let names: Vec<String> = [
        DeploymentPhase::Stage,
        DeploymentPhase::Detect,
        DeploymentPhase::Database,
        DeploymentPhase::Host,
        DeploymentPhase::Configure,
        DeploymentPhase::Register,
        DeploymentPhase::Probe,
    ]
    .iter()
    .map(|p| p.to_string())
    .collect();
    assert_eq!(names, ["stage", "detect", "database", "host", "configure", "register", "probe"]);
}
