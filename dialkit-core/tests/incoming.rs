mod common;

use common::{TestRig, settle};
use dialkit_audio::Cue;
use dialkit_core::{CallStatus, NotificationKind};
use dialkit_signaling::mock::SessionOp;
use dialkit_signaling::{Direction, Session as _, SessionEvent};
use pretty_assertions::assert_eq;
use test_log::test;

#[test(tokio::test)]
async fn incoming_session_rings() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;

    let session = rig.push_incoming("sip:caller@example.com").await;

    let snapshot = rig.snapshot();
    let incoming = snapshot.incoming_call.expect("No pending incoming call");
    assert_eq!(incoming.session_id, session.id());
    assert_eq!(incoming.remote_identity.uri, "sip:caller@example.com");
    assert!(snapshot.active_call.is_none());
    assert!(rig.audio.is_playing(Cue::Ringing));
}

#[test(tokio::test)]
async fn reject_clears_pending_without_creating_a_call() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.push_incoming("sip:caller@example.com").await;

    rig.manager.reject_incoming().await;
    settle().await;

    let snapshot = rig.snapshot();
    assert!(snapshot.incoming_call.is_none());
    assert!(snapshot.active_call.is_none());
    assert!(!rig.audio.is_playing(Cue::Ringing));
    assert!(session.ops().contains(&SessionOp::Terminate));
}

#[test(tokio::test)]
async fn answer_promotes_before_issuing_answer() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.push_incoming("sip:caller@example.com").await;

    rig.manager.answer_incoming().await;
    settle().await;

    let snapshot = rig.snapshot();
    assert!(snapshot.incoming_call.is_none());
    let call = snapshot.active_call.expect("Promotion did not happen");
    assert_eq!(call.direction, Direction::Incoming);
    assert_eq!(call.status, CallStatus::Progress);
    assert!(!rig.audio.is_playing(Cue::Ringing));
    assert!(session.ops().contains(&SessionOp::Answer));

    session.emit(SessionEvent::Accepted);
    settle().await;
    let call = rig.snapshot().active_call.unwrap();
    assert_eq!(call.status, CallStatus::Answered);
    assert_eq!(rig.audio.play_count(Cue::Answered), 1);
}

#[test(tokio::test)]
async fn failed_answer_keeps_the_promoted_call() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.push_incoming("sip:caller@example.com").await;
    rig.drain_notifications();

    session.fail_next_answer();
    rig.manager.answer_incoming().await;
    settle().await;

    // No rollback: the signaling layer may already be responding. The user
    // recovers by hanging up.
    let call = rig.snapshot().active_call.expect("Promoted call was lost");
    assert_eq!(call.status, CallStatus::Progress);
    rig.expect_notification(|n| n.kind == NotificationKind::Error)
        .await;

    rig.manager.hang_up().await;
    settle().await;
    assert!(rig.snapshot().active_call.is_none());
}

#[test(tokio::test)]
async fn answer_without_pending_is_a_noop() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let before = rig.snapshot();

    rig.manager.answer_incoming().await;
    settle().await;

    assert_eq!(rig.snapshot(), before);
}

#[test(tokio::test)]
async fn second_incoming_session_is_rejected_immediately() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let first = rig.push_incoming("sip:first@example.com").await;
    let second = rig.push_incoming("sip:second@example.com").await;

    assert!(second.is_ended(), "Second session was not terminated");

    // The first pending call is untouched.
    let snapshot = rig.snapshot();
    let incoming = snapshot.incoming_call.expect("First pending call lost");
    assert_eq!(incoming.remote_identity.uri, "sip:first@example.com");
    assert!(!first.is_ended());
    assert!(rig.audio.is_playing(Cue::Ringing));
}

#[test(tokio::test)]
async fn incoming_during_active_call_is_rejected() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    rig.establish_call("sip:100@example.com").await;

    let intruder = rig.push_incoming("sip:intruder@example.com").await;

    assert!(intruder.is_ended());
    let snapshot = rig.snapshot();
    assert!(snapshot.incoming_call.is_none());
    assert_eq!(
        snapshot.active_call.unwrap().remote_identity.uri,
        "sip:100@example.com"
    );
    assert!(!rig.audio.is_playing(Cue::Ringing));
}

#[test(tokio::test)]
async fn pending_session_ending_clears_the_slot() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.push_incoming("sip:caller@example.com").await;
    rig.drain_notifications();

    session.emit(SessionEvent::Ended {
        cause: "cancelled".to_string(),
    });
    settle().await;

    let snapshot = rig.snapshot();
    assert!(snapshot.incoming_call.is_none());
    assert!(snapshot.active_call.is_none());
    assert!(!rig.audio.is_playing(Cue::Ringing));
    rig.expect_notification(|n| n.kind == NotificationKind::Warning)
        .await;
}

#[test(tokio::test)]
async fn incoming_teardown_stops_every_cue() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.push_incoming("sip:caller@example.com").await;
    rig.manager.answer_incoming().await;
    session.emit(SessionEvent::Accepted);
    settle().await;

    session.emit(SessionEvent::Failed {
        cause: "ice failure".to_string(),
    });
    settle().await;

    assert!(rig.snapshot().active_call.is_none());
    for cue in Cue::ALL {
        assert!(!rig.audio.is_playing(cue), "{cue:?} still playing");
    }
    // The rejected cue is reserved for failed outgoing calls.
    assert_eq!(rig.audio.play_count(Cue::Rejected), 0);
}
