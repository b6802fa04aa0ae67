//! Session controller behaviour against a mock transport
//!
//! Covers the lifecycle guards, prefix namespacing of subscriptions, verbatim
//! publishing and fail-fast bulk registration.


use mqtt_session::registry::HandlerRegistry;
use mqtt_session::testing::{MockConnector, MockFailure};
use mqtt_session::{SessionError, SessionState, SESSION_QOS};
use proptest::prelude::*;
use rumqttc::QoS;
use std::collections::HashSet;
use test_helpers::{mock_session, recording_registry, registry_for};

#[tokio::test]
async fn test_start_subscribes_prefixed_topics() {
    let connector = MockConnector::new();
    let mut session = mock_session("home", registry_for(&["lights", "temp"]), &connector);

    session.start().await.expect("start should succeed");

    let calls = connector.subscribe_calls().await;
    let topics: HashSet<String> = calls.iter().map(|call| call.topic.clone()).collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        topics,
        HashSet::from(["home/lights".to_string(), "home/temp".to_string()])
    );
    assert!(calls.iter().all(|call| call.qos == QoS::ExactlyOnce));
    assert_eq!(session.state(), SessionState::Started);
}

#[tokio::test]
async fn test_empty_prefix_subscribes_bare_topic() {
    let connector = MockConnector::new();
    let mut session = mock_session("", registry_for(&["lights"]), &connector);

    session.start().await.unwrap();

    assert_eq!(
        connector.subscribed_topics().await,
        vec!["lights".to_string()]
    );
}

#[tokio::test]
async fn test_failed_connect_returns_transport_message_and_keeps_handle() {
    let connector = MockConnector::new().with_connect_failure("conn refused");
    let mut session = mock_session("", registry_for(&["lights"]), &connector);

    let error = session.start().await.unwrap_err();

    assert_eq!(error.to_string(), "conn refused");
    assert!(matches!(error, SessionError::Transport(_)));
    assert!(session.has_transport());
    assert_eq!(session.state(), SessionState::ConnectFailed);
    assert!(connector.subscribe_calls().await.is_empty());
}

#[tokio::test]
async fn test_second_start_is_rejected_without_reconnecting() {
    let connector = MockConnector::new();
    let mut session = mock_session("home", registry_for(&["lights"]), &connector);

    session.start().await.unwrap();
    let second = session.start().await;

    assert!(matches!(second, Err(SessionError::AlreadyStarted)));
    assert_eq!(connector.instantiation_count(), 1);
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(connector.subscribe_calls().await.len(), 1);
}

#[tokio::test]
async fn test_start_after_failed_connect_is_rejected() {
    let connector = MockConnector::new().with_connect_failure("conn refused");
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);

    assert!(session.start().await.is_err());
    let second = session.start().await;

    assert!(matches!(second, Err(SessionError::AlreadyStarted)));
    assert_eq!(connector.instantiation_count(), 1);
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test]
async fn test_register_before_start_is_rejected() {
    let connector = MockConnector::new();
    let session = mock_session("home", HandlerRegistry::new(), &connector);

    let result = session.register_handlers(&registry_for(&["lights"])).await;

    assert!(matches!(result, Err(SessionError::ClientNotStarted)));
    assert!(connector.subscribe_calls().await.is_empty());
}

#[tokio::test]
async fn test_send_before_start_is_rejected() {
    let connector = MockConnector::new();
    let session = mock_session("home", HandlerRegistry::new(), &connector);

    let result = session.send("foo/bar", b"x".to_vec()).await;

    assert!(matches!(result, Err(SessionError::ClientNotStarted)));
    assert!(connector.publish_calls().await.is_empty());
}

#[tokio::test]
async fn test_operations_after_failed_connect_report_connection_failure() {
    let connector = MockConnector::new().with_connect_failure("conn refused");
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    let _ = session.start().await;

    let register = session.register_handlers(&registry_for(&["lights"])).await;
    let send = session.send("foo/bar", "x").await;

    assert!(matches!(register, Err(SessionError::ConnectionFailed)));
    assert!(matches!(send, Err(SessionError::ConnectionFailed)));
    assert!(connector.subscribe_calls().await.is_empty());
    assert!(connector.publish_calls().await.is_empty());
}

#[tokio::test]
async fn test_bulk_registration_stops_at_first_failure() {
    let connector =
        MockConnector::new().with_subscribe_failure(2, MockFailure::Error("not authorized".into()));
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();

    let result = session
        .register_handlers(&registry_for(&["a", "b", "c"]))
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "not authorized");

    // One accepted, one failed, one never attempted; the accepted one stays
    let calls = connector.subscribe_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(connector.deliver(&calls[0].topic, b"still here").await, 1);
    assert_eq!(connector.deliver(&calls[1].topic, b"gone").await, 0);
}

#[tokio::test]
async fn test_bulk_registration_stops_at_unacknowledged_subscription() {
    let connector = MockConnector::new().with_subscribe_failure(2, MockFailure::NoAck);
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();

    let error = session
        .register_handlers(&registry_for(&["a", "b", "c"]))
        .await
        .unwrap_err();

    let calls = connector.subscribe_calls().await;
    assert_eq!(calls.len(), 2);
    assert!(calls[1].topic.starts_with("home/"));
    assert!(matches!(
        error,
        SessionError::SubscriptionWaitFailed { ref topic } if *topic == calls[1].topic
    ));
    assert_eq!(connector.deliver(&calls[0].topic, b"still here").await, 1);
    assert_eq!(session.state(), SessionState::Started);
}

#[tokio::test]
async fn test_unacknowledged_subscription_names_effective_topic() {
    let connector = MockConnector::new().with_subscribe_failure(1, MockFailure::NoAck);
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();

    let error = session
        .register_handlers(&registry_for(&["lights"]))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        SessionError::SubscriptionWaitFailed { ref topic } if topic == "home/lights"
    ));
    assert_eq!(
        error.to_string(),
        "failed to wait on subscription for topic home/lights"
    );
}

#[tokio::test]
async fn test_send_publishes_verbatim_topic() {
    let connector = MockConnector::new();
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();

    session.send("foo/bar", b"payload".to_vec()).await.unwrap();

    let calls = connector.publish_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].topic, "foo/bar");
    assert_eq!(calls[0].qos, SESSION_QOS);
    assert!(!calls[0].retain);
    assert_eq!(calls[0].payload, b"payload".to_vec());
}

#[tokio::test]
async fn test_send_returns_transport_error() {
    let connector = MockConnector::new().with_publish_failure("broker gone");
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();

    let error = session.send("foo/bar", "x").await.unwrap_err();
    assert_eq!(error.to_string(), "broker gone");
}

#[tokio::test]
async fn test_handler_receives_messages_on_prefixed_topic() {
    let connector = MockConnector::new();
    let (registry, received) = recording_registry("lights");
    let mut session = mock_session("home", registry, &connector);
    session.start().await.unwrap();

    assert_eq!(connector.deliver("home/lights", b"on").await, 1);
    assert_eq!(connector.deliver("lights", b"off").await, 0);

    let received = received.lock().unwrap();
    assert_eq!(
        *received,
        vec![("home/lights".to_string(), b"on".to_vec())]
    );
}

#[tokio::test]
async fn test_register_after_start_uses_same_prefix() {
    let connector = MockConnector::new();
    let mut session = mock_session("home", HandlerRegistry::new(), &connector);
    session.start().await.unwrap();
    assert!(connector.subscribe_calls().await.is_empty());

    session
        .register_handlers(&registry_for(&["garage/door"]))
        .await
        .unwrap();

    assert_eq!(
        connector.subscribed_topics().await,
        vec!["home/garage/door".to_string()]
    );
}

fn topic_segment() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

proptest! {
    #[test]
    fn prop_subscription_follows_prefix_rule(
        prefix in prop::option::of(topic_segment()),
        topic in topic_segment(),
    ) {
        let prefix = prefix.unwrap_or_default();
        let connector = MockConnector::new();
        let mut session = mock_session(&prefix, registry_for(&[topic.as_str()]), &connector);

        let topics = tokio_test::block_on(async {
            session.start().await.unwrap();
            connector.subscribed_topics().await
        });

        let expected = if prefix.is_empty() {
            topic.clone()
        } else {
            format!("{prefix}/{topic}")
        };
        prop_assert_eq!(topics, vec![expected]);
    }

    #[test]
    fn prop_every_topic_subscribed_exactly_once(
        topics in prop::collection::hash_set(topic_segment(), 0..12),
    ) {
        let logical: Vec<&str> = topics.iter().map(String::as_str).collect();
        let connector = MockConnector::new();
        let mut session = mock_session("p", registry_for(&logical), &connector);

        let subscribed = tokio_test::block_on(async {
            session.start().await.unwrap();
            connector.subscribed_topics().await
        });

        prop_assert_eq!(subscribed.len(), topics.len());
        let unique: HashSet<String> = subscribed.into_iter().collect();
        let expected: HashSet<String> = topics.iter().map(|t| format!("p/{t}")).collect();
        prop_assert_eq!(unique, expected);
    }

    #[test]
    fn prop_send_ignores_prefix(prefix in topic_segment(), topic in "[a-z]{1,5}/[a-z]{1,5}") {
        let connector = MockConnector::new();
        let mut session = mock_session(&prefix, HandlerRegistry::new(), &connector);

        let calls = tokio_test::block_on(async {
            session.start().await.unwrap();
            session.send(&topic, "x").await.unwrap();
            connector.publish_calls().await
        });

        prop_assert_eq!(&calls[0].topic, &topic);
    }
}
