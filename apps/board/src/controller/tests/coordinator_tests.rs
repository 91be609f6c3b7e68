use super::*;
use crate::{
    controller::events::INPUT_CLEARED,
    test_support::{epoch, message_at, test_coordinator, ManualClock, ScriptedGateway},
};
use chrono::Duration as ChronoDuration;
use client_core::ChannelStatus;

fn toast_of(coordinator: &crate::test_support::TestCoordinator) -> (String, Severity) {
    let toast = coordinator.view().toast().expect("toast shown");
    (toast.text.clone(), toast.severity)
}

#[tokio::test]
async fn startup_connects_loads_and_subscribes() {
    let gateway = ScriptedGateway::new();
    gateway.set_messages(vec![
        message_at(2, "second", epoch()),
        message_at(1, "first", epoch() - ChronoDuration::seconds(60)),
    ]);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    assert_eq!(coordinator.state(), ConnectionState::Uninitialized);

    assert_eq!(coordinator.start().await, StartupStep::Ready);
    assert_eq!(coordinator.state(), ConnectionState::Ready);
    assert!(gateway.has_subscriber());
    assert_eq!(coordinator.view().message_count(), 2);
    assert!(coordinator.view().is_connected());
    assert!(!coordinator.view().is_busy());
    assert_eq!(
        toast_of(&coordinator),
        (events::CONNECTED.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn connect_failures_schedule_linear_backoff_then_degrade() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(usize::MAX);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);

    for attempt in 1..=3u32 {
        let step = coordinator.start().await;
        assert_eq!(step, StartupStep::RetryIn(Duration::from_secs(2 * attempt as u64)));
        assert_eq!(coordinator.state(), ConnectionState::Connecting);
        assert_eq!(
            toast_of(&coordinator),
            (events::retrying(attempt, 3), Severity::Warning)
        );
    }

    assert_eq!(coordinator.start().await, StartupStep::Degraded);
    assert_eq!(coordinator.state(), ConnectionState::Degraded);
    assert_eq!(gateway.connect_calls().len(), 4);
    assert_eq!(gateway.fetch_calls(), 0);
    assert!(!coordinator.view().is_connected());
    assert_eq!(
        toast_of(&coordinator),
        (events::CONNECTION_FAILED.to_string(), Severity::Error)
    );
}

#[tokio::test]
async fn recovery_after_transient_failure_resets_retry_budget() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(2);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);

    assert!(matches!(coordinator.start().await, StartupStep::RetryIn(_)));
    assert!(matches!(coordinator.start().await, StartupStep::RetryIn(_)));
    assert_eq!(coordinator.retry_count(), 2);
    assert_eq!(coordinator.start().await, StartupStep::Ready);
    assert_eq!(coordinator.retry_count(), 0);
}

#[tokio::test]
async fn load_failure_shows_empty_state_and_still_becomes_ready() {
    let gateway = ScriptedGateway::new();
    gateway.fail_fetch(Some("HTTP 500: boom"));
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);

    assert_eq!(coordinator.start().await, StartupStep::Ready);
    assert!(coordinator.view().is_empty_state());
    assert!(!coordinator.view().is_busy());
    assert_eq!(gateway.connect_calls().len(), 1);
    assert_eq!(
        toast_of(&coordinator),
        (events::LOAD_FAILED.to_string(), Severity::Error)
    );
}

#[tokio::test]
async fn subscription_failure_is_a_warning_only() {
    let gateway = ScriptedGateway::new();
    gateway.fail_subscribe(Some("join rejected"));
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);

    assert_eq!(coordinator.start().await, StartupStep::Ready);
    assert_eq!(coordinator.state(), ConnectionState::Ready);
    assert_eq!(
        toast_of(&coordinator),
        (events::LIVE_UPDATES_UNAVAILABLE.to_string(), Severity::Warning)
    );

    coordinator
        .handle_gesture(Gesture::Submit("still works".into()))
        .await;
    assert_eq!(gateway.inserted(), vec!["still works".to_string()]);
}

#[tokio::test]
async fn send_inserts_clears_input_and_prepends_record() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;

    coordinator
        .handle_gesture(Gesture::Submit("  hello board  ".into()))
        .await;

    assert_eq!(gateway.inserted(), vec!["hello board".to_string()]);
    let view = coordinator.view();
    assert_eq!(view.read_input(), "");
    assert!(!view.is_sending());
    assert_eq!(view.messages()[0].text, "hello board");
    assert_eq!(
        toast_of(&coordinator),
        (events::SENT.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn invalid_text_never_reaches_gateway() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;

    coordinator.handle_gesture(Gesture::Submit("   ".into())).await;
    assert_eq!(toast_of(&coordinator).1, Severity::Error);

    coordinator
        .handle_gesture(Gesture::Submit("z".repeat(2001)))
        .await;
    assert_eq!(toast_of(&coordinator).1, Severity::Error);

    assert!(gateway.inserted().is_empty());
}

#[tokio::test]
async fn insert_failures_keep_input_and_toast_by_kind() {
    let cases = [
        (
            "network request failed: connection refused",
            InsertFailureKind::Network,
        ),
        ("HTTP 429: rate limit exceeded", InsertFailureKind::RateLimited),
        ("HTTP 400: text too long", InsertFailureKind::Generic),
    ];
    for (failure, kind) in cases {
        let gateway = ScriptedGateway::new();
        let (mut coordinator, _pushes) =
            test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
        coordinator.start().await;
        gateway.fail_insert(Some(failure));

        coordinator.handle_gesture(Gesture::Submit("draft".into())).await;

        assert_eq!(coordinator.view().read_input(), "draft");
        assert!(!coordinator.view().is_sending());
        assert!(coordinator.view().is_empty_state());
        assert_eq!(
            toast_of(&coordinator),
            (events::insert_failure_text(kind).to_string(), Severity::Error)
        );
    }
}

#[tokio::test]
async fn intents_are_rejected_until_ready() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(usize::MAX);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;

    coordinator.handle_gesture(Gesture::Submit("early".into())).await;
    assert_eq!(
        toast_of(&coordinator),
        (events::STILL_CONNECTING.to_string(), Severity::Error)
    );
    coordinator.handle_gesture(Gesture::Refresh).await;
    assert_eq!(
        toast_of(&coordinator),
        (events::STILL_CONNECTING.to_string(), Severity::Error)
    );
    assert!(gateway.inserted().is_empty());
    assert_eq!(gateway.fetch_calls(), 0);
}

#[tokio::test]
async fn intents_after_giving_up_point_to_restart() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(usize::MAX);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    for _ in 0..4 {
        coordinator.start().await;
    }
    assert_eq!(coordinator.state(), ConnectionState::Degraded);

    coordinator.handle_gesture(Gesture::Submit("anyone?".into())).await;
    assert_eq!(
        toast_of(&coordinator),
        (events::NOT_CONNECTED.to_string(), Severity::Error)
    );
    coordinator.handle_gesture(Gesture::Refresh).await;
    assert_eq!(
        toast_of(&coordinator),
        (events::NOT_CONNECTED.to_string(), Severity::Error)
    );
    assert!(gateway.inserted().is_empty());
    assert_eq!(gateway.fetch_calls(), 0);
}

#[tokio::test]
async fn refresh_reloads_list() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;
    assert!(coordinator.view().is_empty_state());

    gateway.set_messages(vec![message_at(9, "from elsewhere", epoch())]);
    coordinator.handle_gesture(Gesture::Refresh).await;

    assert_eq!(gateway.fetch_calls(), 2);
    assert_eq!(coordinator.view().message_count(), 1);
    assert!(!coordinator.view().is_busy());
    assert_eq!(
        toast_of(&coordinator),
        (events::REFRESHED.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn failed_refresh_shows_error_and_empty_state() {
    let gateway = ScriptedGateway::new();
    gateway.set_messages(vec![message_at(1, "one", epoch())]);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;
    assert_eq!(coordinator.view().message_count(), 1);

    gateway.fail_fetch(Some("HTTP 503: unavailable"));
    coordinator.handle_gesture(Gesture::Refresh).await;

    assert!(coordinator.view().is_empty_state());
    assert!(!coordinator.view().is_busy());
    assert_eq!(
        toast_of(&coordinator),
        (events::REFRESH_FAILED.to_string(), Severity::Error)
    );
}

#[tokio::test]
async fn fresh_push_is_shown_without_notification() {
    let gateway = ScriptedGateway::new();
    let clock = ManualClock::new(epoch());
    let (mut coordinator, mut pushes) = test_coordinator(&gateway, clock.clone(), 2000);
    coordinator.start().await;

    gateway.push(message_at(5, "mine", epoch() - ChronoDuration::milliseconds(4_999)));
    let pushed = pushes.recv().await.expect("forwarded push");
    coordinator.on_push(pushed).await;

    assert_eq!(coordinator.view().messages()[0].text, "mine");
    assert_eq!(
        toast_of(&coordinator),
        (events::CONNECTED.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn older_push_raises_notification() {
    let gateway = ScriptedGateway::new();
    let clock = ManualClock::new(epoch());
    let (mut coordinator, mut pushes) = test_coordinator(&gateway, clock.clone(), 2000);
    coordinator.start().await;

    gateway.push(message_at(6, "someone else", epoch()));
    clock.advance(ChronoDuration::seconds(5));
    let pushed = pushes.recv().await.expect("forwarded push");
    coordinator.on_push(pushed).await;

    assert_eq!(coordinator.view().messages()[0].text, "someone else");
    assert_eq!(
        toast_of(&coordinator),
        (events::NEW_MESSAGE.to_string(), Severity::Info)
    );
}

#[tokio::test]
async fn own_echo_does_not_duplicate_sent_message() {
    let gateway = ScriptedGateway::new();
    gateway.set_insert_time(epoch());
    let (mut coordinator, mut pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;

    coordinator.handle_gesture(Gesture::Submit("echo".into())).await;
    let sent = coordinator.view().messages()[0].clone();
    gateway.push(sent);
    let pushed = pushes.recv().await.expect("forwarded push");
    coordinator.on_push(pushed).await;

    assert_eq!(coordinator.view().message_count(), 1);
    assert_eq!(
        toast_of(&coordinator),
        (events::SENT.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn clear_gesture_needs_no_connection() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(usize::MAX);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.view_mut().set_input("draft");

    coordinator.handle_gesture(Gesture::ClearInput).await;
    assert_eq!(coordinator.view().read_input(), "");
    assert_eq!(
        toast_of(&coordinator),
        (INPUT_CLEARED.to_string(), Severity::Info)
    );
}

#[tokio::test]
async fn restart_tears_down_and_starts_fresh() {
    let gateway = ScriptedGateway::new();
    gateway.fail_connects(usize::MAX);
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    for _ in 0..4 {
        coordinator.start().await;
    }
    assert_eq!(coordinator.state(), ConnectionState::Degraded);

    gateway.fail_connects(0);
    assert_eq!(coordinator.restart().await, StartupStep::Ready);
    assert_eq!(gateway.teardown_calls(), 1);
    assert_eq!(coordinator.state(), ConnectionState::Ready);
    assert!(gateway.has_subscriber());
}

#[tokio::test]
async fn shutdown_tears_down_gateway() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;

    coordinator.shutdown().await;
    coordinator.shutdown().await;
    assert_eq!(gateway.teardown_calls(), 2);
    assert!(!gateway.has_subscriber());
    assert_eq!(coordinator.state(), ConnectionState::Uninitialized);
}

#[tokio::test]
async fn lost_channel_goes_offline_until_restored() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, mut pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;
    assert_eq!(gateway.fetch_calls(), 1);

    gateway.report_channel(ChannelStatus::Lost("server closed the socket".into()));
    let lost = pushes.recv().await.expect("forwarded loss");
    coordinator.on_push(lost).await;
    assert!(!coordinator.view().is_connected());
    assert_eq!(coordinator.state(), ConnectionState::Ready);
    assert_eq!(
        toast_of(&coordinator),
        (events::LIVE_UPDATES_LOST.to_string(), Severity::Warning)
    );

    // a message posted elsewhere during the gap shows up after the rejoin
    gateway.set_messages(vec![message_at(3, "missed", epoch())]);
    gateway.report_channel(ChannelStatus::Restored);
    let restored = pushes.recv().await.expect("forwarded recovery");
    coordinator.on_push(restored).await;
    assert!(coordinator.view().is_connected());
    assert_eq!(gateway.fetch_calls(), 2);
    assert_eq!(coordinator.view().messages()[0].text, "missed");
    assert!(!coordinator.view().is_busy());
    assert_eq!(
        toast_of(&coordinator),
        (events::LIVE_UPDATES_RESTORED.to_string(), Severity::Success)
    );
}

#[tokio::test]
async fn channel_events_after_shutdown_are_ignored() {
    let gateway = ScriptedGateway::new();
    let (mut coordinator, _pushes) = test_coordinator(&gateway, ManualClock::new(epoch()), 2000);
    coordinator.start().await;
    coordinator.shutdown().await;

    coordinator
        .on_push(PushEvent::ChannelLost("socket ended".into()))
        .await;
    coordinator.on_push(PushEvent::ChannelRestored).await;
    assert!(!coordinator.view().is_connected());
    assert_eq!(gateway.fetch_calls(), 1);
}
