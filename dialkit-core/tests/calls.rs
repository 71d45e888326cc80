mod common;

use common::{TestRig, settle};
use dialkit_audio::Cue;
use dialkit_core::{CallStatus, NotificationKind};
use dialkit_signaling::mock::SessionOp;
use dialkit_signaling::{
    CandidateKind, Direction, IceCandidate, MediaStream, Originator, Session, SessionEvent,
};
use pretty_assertions::assert_eq;
use test_log::test;

#[test(tokio::test)]
async fn outgoing_call_rings_back() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;

    rig.place_call("sip:100@example.com").await;

    let snapshot = rig.snapshot();
    let call = snapshot.active_call.expect("No active call");
    assert_eq!(call.direction, Direction::Outgoing);
    assert_eq!(call.status, CallStatus::Progress);
    assert_eq!(call.remote_identity.uri, "sip:100@example.com");
    assert!(call.start_time.is_none());
    assert!(rig.audio.is_playing(Cue::Ringback));
    assert_eq!(rig.agent.calls(), vec!["sip:100@example.com".to_string()]);
}

#[test(tokio::test)]
async fn accepted_transitions_to_answered() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;

    session.emit(SessionEvent::Accepted);
    settle().await;

    let call = rig.snapshot().active_call.expect("No active call");
    assert_eq!(call.status, CallStatus::Answered);
    assert!(call.start_time.is_some());
    assert!(!rig.audio.is_playing(Cue::Ringback));
    assert_eq!(rig.audio.play_count(Cue::Answered), 1);
    assert!(!rig.audio.is_looping(Cue::Answered));

    session.emit(SessionEvent::Confirmed);
    settle().await;
    assert_eq!(
        rig.snapshot().active_call.unwrap().status,
        CallStatus::Confirmed
    );
}

#[test(tokio::test)]
async fn second_call_attempt_is_refused() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    rig.place_call("sip:100@example.com").await;
    rig.drain_notifications();

    let second = rig.manager.call("sip:200@example.com").await;

    assert!(second.is_none());
    assert_eq!(rig.agent.calls().len(), 1);
    let call = rig.snapshot().active_call.expect("First call was lost");
    assert_eq!(call.remote_identity.uri, "sip:100@example.com");
    rig.expect_notification(|n| n.kind == NotificationKind::Warning)
        .await;
}

#[test(tokio::test)]
async fn call_without_agent_is_refused() {
    let mut rig = TestRig::new().await;

    let call_id = rig.manager.call("sip:100@example.com").await;

    assert!(call_id.is_none());
    assert!(rig.agent.sessions().is_empty());
    assert!(rig.snapshot().active_call.is_none());
    rig.expect_notification(|n| n.kind == NotificationKind::Warning)
        .await;
}

#[test(tokio::test)]
async fn hang_up_without_call_is_a_noop() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let before = rig.snapshot();

    rig.manager.hang_up().await;
    settle().await;

    assert_eq!(rig.snapshot(), before);
}

#[test(tokio::test)]
async fn hang_up_terminates_and_tears_down() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.establish_call("sip:100@example.com").await;
    rig.drain_notifications();

    rig.manager.hang_up().await;
    settle().await;

    assert!(session.is_ended());
    assert!(rig.snapshot().active_call.is_none());
    for cue in Cue::ALL {
        assert!(!rig.audio.is_playing(cue), "{cue:?} still playing");
    }
    rig.expect_notification(|n| n.kind == NotificationKind::Info)
        .await;
}

#[test(tokio::test)]
async fn hang_up_on_terminated_session_does_not_double_terminate() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.establish_call("sip:100@example.com").await;

    session.emit(SessionEvent::Ended {
        cause: "remote bye".to_string(),
    });
    settle().await;
    assert!(rig.snapshot().active_call.is_none());

    // The session is already terminal; hang_up must not call terminate again.
    rig.manager.hang_up().await;
    let terminates = session
        .ops()
        .iter()
        .filter(|op| **op == SessionOp::Terminate)
        .count();
    assert_eq!(terminates, 0, "terminate reached an already-ended session");
}

#[test(tokio::test)]
async fn failed_outgoing_call_plays_rejected_cue() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;
    rig.drain_notifications();

    session.emit(SessionEvent::Failed {
        cause: "486 Busy Here".to_string(),
    });
    settle().await;

    assert!(rig.snapshot().active_call.is_none());
    assert!(!rig.audio.is_playing(Cue::Ringback));
    assert_eq!(rig.audio.play_count(Cue::Rejected), 1);
    let notification = rig
        .expect_notification(|n| n.kind == NotificationKind::Error)
        .await;
    assert!(notification.message.contains("486 Busy Here"));
}

#[test(tokio::test)]
async fn hold_tracks_each_side_independently() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.establish_call("sip:100@example.com").await;

    rig.manager.hold().await;
    assert!(
        session
            .ops()
            .contains(&SessionOp::Hold { use_update: false })
    );

    session.emit(SessionEvent::Hold {
        originator: Originator::Local,
    });
    settle().await;
    let call = rig.snapshot().active_call.unwrap();
    assert!(call.local_hold);
    assert!(!call.remote_hold);
    assert!(rig.audio.is_playing(Cue::Moh));

    // The remote side holding and resuming never touches the local flag.
    session.emit(SessionEvent::Hold {
        originator: Originator::Remote,
    });
    session.emit(SessionEvent::Unhold {
        originator: Originator::Remote,
    });
    settle().await;
    let call = rig.snapshot().active_call.unwrap();
    assert!(call.local_hold);
    assert!(!call.remote_hold);
    assert!(rig.audio.is_playing(Cue::Moh), "still held locally");

    session.emit(SessionEvent::Unhold {
        originator: Originator::Local,
    });
    settle().await;
    let call = rig.snapshot().active_call.unwrap();
    assert!(!call.local_hold);
    assert!(!rig.audio.is_playing(Cue::Moh));
}

#[test(tokio::test)]
async fn hold_requires_established_call() {
    let mut rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;
    rig.drain_notifications();

    rig.manager.hold().await;

    assert!(session.ops().is_empty());
    rig.expect_notification(|n| n.kind == NotificationKind::Warning)
        .await;
}

#[test(tokio::test)]
async fn mute_flag_follows_session() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.establish_call("sip:100@example.com").await;

    rig.manager.set_muted(true).await;
    assert!(session.ops().contains(&SessionOp::SetMuted(true)));
    assert!(rig.snapshot().active_call.unwrap().muted);

    rig.manager.set_muted(false).await;
    assert!(!rig.snapshot().active_call.unwrap().muted);
}

#[test(tokio::test)]
async fn dtmf_requires_established_call_and_valid_digit() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;

    // Not established yet.
    rig.manager.send_dtmf('1').await;
    assert!(session.ops().is_empty());

    session.emit(SessionEvent::Accepted);
    settle().await;

    rig.manager.send_dtmf('1').await;
    rig.manager.send_dtmf('#').await;
    rig.manager.send_dtmf('x').await;

    let digits: Vec<char> = session
        .ops()
        .iter()
        .filter_map(|op| match op {
            SessionOp::Dtmf { digit, .. } => Some(*digit),
            _ => None,
        })
        .collect();
    assert_eq!(digits, vec!['1', '#']);
}

#[test(tokio::test)]
async fn srflx_candidates_with_related_fields_are_released() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;

    let releasable = IceCandidate {
        candidate: "candidate:1 1 udp 1686052607 203.0.113.7 50000 typ srflx".to_string(),
        kind: CandidateKind::Srflx,
        related_address: Some("192.168.1.10".to_string()),
        related_port: Some(50000),
    };
    let host = IceCandidate {
        candidate: "candidate:2 1 udp 2122260223 192.168.1.10 50001 typ host".to_string(),
        kind: CandidateKind::Host,
        related_address: None,
        related_port: None,
    };
    let srflx_without_related = IceCandidate {
        candidate: "candidate:3 1 udp 1686052606 203.0.113.7 50002 typ srflx".to_string(),
        kind: CandidateKind::Srflx,
        related_address: None,
        related_port: Some(50002),
    };

    session.emit(SessionEvent::IceCandidate(releasable.clone()));
    session.emit(SessionEvent::IceCandidate(host));
    session.emit(SessionEvent::IceCandidate(srflx_without_related));
    settle().await;

    assert_eq!(session.released_candidates(), vec![releasable]);
}

#[test(tokio::test)]
async fn remote_stream_is_append_only() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.establish_call("sip:100@example.com").await;

    session.emit(SessionEvent::TrackAdded {
        streams: vec![MediaStream::new("remote-1")],
    });
    settle().await;
    assert_eq!(
        rig.snapshot().active_call.unwrap().remote_stream,
        Some(MediaStream::new("remote-1"))
    );

    // A later unrelated track must not displace the established stream.
    session.emit(SessionEvent::TrackAdded {
        streams: vec![MediaStream::new("remote-2")],
    });
    settle().await;
    assert_eq!(
        rig.snapshot().active_call.unwrap().remote_stream,
        Some(MediaStream::new("remote-1"))
    );
}

#[test(tokio::test)]
async fn timer_ticks_once_per_second_after_answer() {
    let rig = TestRig::new().await;
    rig.connect_registered().await;
    let session = rig.place_call("sip:100@example.com").await;

    // Still in progress: no start time, no ticking.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert_eq!(
        rig.snapshot().active_call.unwrap().duration,
        std::time::Duration::ZERO
    );

    session.emit(SessionEvent::Accepted);
    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let call = rig.snapshot().active_call.unwrap();
    assert!(call.duration.as_secs() >= 1, "duration: {:?}", call.duration);
}
