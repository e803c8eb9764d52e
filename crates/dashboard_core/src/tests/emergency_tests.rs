use super::*;

use anyhow::anyhow;

fn pending_flow(draft: &str) -> EmergencyDraftFlow {
    let mut flow = EmergencyDraftFlow::new();
    let ticket = flow.begin_draft().expect("idle flow accepts sos");
    flow.draft_ready(ticket, Ok(draft.to_string()))
        .expect("draft applies");
    flow
}

#[test]
fn draft_moves_to_pending_confirmation() {
    let flow = pending_flow("EMERGENCY ALERT: test");
    assert_eq!(
        flow.state(),
        &EmergencyState::PendingConfirmation {
            draft: "EMERGENCY ALERT: test".into()
        }
    );
}

#[test]
fn cancel_from_pending_returns_to_idle_without_alert() {
    let mut flow = pending_flow("draft");
    assert!(flow.cancel());
    assert_eq!(flow.state(), &EmergencyState::Idle);
    assert!(matches!(
        flow.confirm(),
        Err(EmergencyError::InvalidTransition { action: "confirm", state: "idle" })
    ));
}

#[test]
fn confirm_succeeds_exactly_once() {
    let mut flow = pending_flow("draft");
    let (_, alert) = flow.confirm().expect("first confirm");
    assert_eq!(alert, "draft");
    assert_eq!(
        flow.state(),
        &EmergencyState::Confirmed {
            alert: "draft".into()
        }
    );
    assert!(matches!(
        flow.confirm(),
        Err(EmergencyError::InvalidTransition { .. })
    ));
    assert!(!flow.cancel());
}

#[test]
fn second_sos_while_drafting_is_rejected() {
    let mut flow = EmergencyDraftFlow::new();
    flow.begin_draft().expect("first sos");
    assert!(matches!(
        flow.begin_draft(),
        Err(EmergencyError::InvalidTransition { state: "drafting", .. })
    ));
}

#[test]
fn failed_draft_returns_to_idle() {
    let mut flow = EmergencyDraftFlow::new();
    let ticket = flow.begin_draft().expect("sos");
    assert!(matches!(
        flow.draft_ready(ticket, Err(anyhow!("network down"))),
        Err(EmergencyError::Draft(message)) if message.contains("network down")
    ));
    assert_eq!(flow.state(), &EmergencyState::Idle);
}

#[test]
fn draft_after_cancel_is_discarded() {
    let mut flow = EmergencyDraftFlow::new();
    let stale = flow.begin_draft().expect("sos");
    assert!(flow.cancel());
    let current = flow.begin_draft().expect("second sos");

    assert!(matches!(
        flow.draft_ready(stale, Ok("old".into())),
        Err(EmergencyError::Stale)
    ));
    assert_eq!(flow.state(), &EmergencyState::Drafting { ticket: current });
}

#[test]
fn dispatch_failure_puts_alert_back_for_confirmation() {
    let mut flow = pending_flow("draft");
    let (ticket, _) = flow.confirm().expect("confirm");
    assert!(flow.dispatch_failed(ticket));
    assert_eq!(
        flow.state(),
        &EmergencyState::PendingConfirmation {
            draft: "draft".into()
        }
    );
    assert!(!flow.dispatch_failed(ticket));
}

#[test]
fn failure_of_dismissed_alert_leaves_later_alert_confirmed() {
    let mut flow = pending_flow("first");
    let (first, _) = flow.confirm().expect("confirm first");
    flow.dismiss().expect("dismiss while first is in flight");

    let draft = flow.begin_draft().expect("second sos");
    flow.draft_ready(draft, Ok("second".into()))
        .expect("second draft");
    let (second, _) = flow.confirm().expect("confirm second");
    assert_ne!(first, second);
    flow.dispatch_delivered(second);

    assert!(!flow.dispatch_failed(first));
    assert_eq!(
        flow.state(),
        &EmergencyState::Confirmed {
            alert: "second".into()
        }
    );
}

#[test]
fn delivered_alert_ignores_late_failure_report() {
    let mut flow = pending_flow("draft");
    let (ticket, _) = flow.confirm().expect("confirm");
    flow.dispatch_delivered(ticket);
    assert!(!flow.dispatch_failed(ticket));
    assert!(matches!(flow.state(), EmergencyState::Confirmed { .. }));
}

#[test]
fn dismiss_only_from_confirmed() {
    let mut flow = EmergencyDraftFlow::new();
    assert!(flow.dismiss().is_err());
    assert!(!flow.cancel());

    let mut flow = pending_flow("draft");
    flow.confirm().expect("confirm");
    flow.dismiss().expect("dismiss confirmed alert");
    assert_eq!(flow.state(), &EmergencyState::Idle);
    flow.begin_draft().expect("new sos after dismiss");
}
