//! Command exchange against a loopback receiver

mod common;

use std::time::Duration;

use common::{Behavior, MockReceiver};
use iscp_adapter::{AdapterConfig, Clock, CommandDispatcher, ConnectionManager, DispatchError};
use iscp_codec::Command;
use iscp_state::{ConnectivityStatus, DeviceDescriptor, ReceiverSettings};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

fn dispatcher() -> CommandDispatcher {
    CommandDispatcher::new(AdapterConfig::fast(), CancellationToken::new(), Clock::new())
}

async fn refused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_query_returns_decoded_payloads() {
    let mock = MockReceiver::start(Behavior::Normal).await;
    let settings = ReceiverSettings::from_descriptor(&mock.descriptor());
    let mut link = ConnectionManager::new(&settings);

    let payloads = dispatcher()
        .send(
            &mut link,
            &settings,
            &Command::power_query(),
            Some(Duration::from_millis(500)),
        )
        .await
        .expect("query should succeed");

    assert_eq!(payloads.len(), 1);
    assert_eq!(&payloads[0][..], b"!1PWR01\r\n");
    assert_eq!(link.status(), ConnectivityStatus::Connected);
    assert_eq!(mock.received().await, vec!["PWRQSTN".to_string()]);
}

#[tokio::test]
async fn test_write_without_response_returns_empty() {
    let mock = MockReceiver::start(Behavior::Normal).await;
    let settings = ReceiverSettings::from_descriptor(&mock.descriptor());
    let mut link = ConnectionManager::new(&settings);

    let payloads = dispatcher()
        .send(&mut link, &settings, &Command::mute(true), None)
        .await
        .expect("write should succeed");

    assert!(payloads.is_empty());
    assert!(mock.wait_for_command("AMT01", Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_silent_receiver_yields_no_payloads() {
    let mock = MockReceiver::start(Behavior::Silent).await;
    let settings = ReceiverSettings::from_descriptor(&mock.descriptor());
    let mut link = ConnectionManager::new(&settings);

    let payloads = dispatcher()
        .send(
            &mut link,
            &settings,
            &Command::volume_query(),
            Some(Duration::from_millis(100)),
        )
        .await
        .expect("silence is not an error");
    assert!(payloads.is_empty());
}

#[tokio::test]
async fn test_refused_connect_keeps_connectivity_and_gates_retries() {
    let port = refused_port().await;
    let settings =
        ReceiverSettings::from_descriptor(&DeviceDescriptor::new("127.0.0.1").with_port(port));
    let mut link = ConnectionManager::new(&settings);
    let dispatcher = dispatcher();

    let first = dispatcher
        .send(&mut link, &settings, &Command::power_query(), None)
        .await;
    assert!(matches!(first, Err(DispatchError::ConnectFailed { .. })));
    assert_eq!(link.status(), ConnectivityStatus::Disconnected);
    assert!(link.last_connect_error().is_some());

    let second = dispatcher
        .send(&mut link, &settings, &Command::power_query(), None)
        .await;
    assert!(matches!(second, Err(DispatchError::BackoffActive)));
    assert_eq!(link.status(), ConnectivityStatus::Disconnected);
}

#[tokio::test]
async fn test_cancelled_dispatcher_refuses_to_send() {
    let mock = MockReceiver::start(Behavior::Normal).await;
    let settings = ReceiverSettings::from_descriptor(&mock.descriptor());
    let mut link = ConnectionManager::new(&settings);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let dispatcher = CommandDispatcher::new(AdapterConfig::fast(), cancel, Clock::new());

    let result = dispatcher
        .send(&mut link, &settings, &Command::power_query(), None)
        .await;
    assert!(matches!(result, Err(DispatchError::Cancelled)));
    assert!(mock.received().await.is_empty());
}

#[rstest]
#[case(true, ConnectivityStatus::Connected)]
#[case(false, ConnectivityStatus::Disconnected)]
#[tokio::test]
async fn test_accepted_connection_as_contact(
    #[case] counts_as_seen: bool,
    #[case] expected: ConnectivityStatus,
) {
    let mock = MockReceiver::start(Behavior::Silent).await;
    let settings = ReceiverSettings::from_descriptor(&mock.descriptor());
    let mut link = ConnectionManager::new(&settings);
    let config = AdapterConfig::fast().with_connect_counts_as_seen(counts_as_seen);
    let dispatcher = CommandDispatcher::new(config, CancellationToken::new(), Clock::new());

    let payloads = dispatcher
        .send(
            &mut link,
            &settings,
            &Command::power_query(),
            Some(Duration::from_millis(100)),
        )
        .await
        .expect("silence is not an error");

    assert!(payloads.is_empty());
    assert_eq!(link.status(), expected);
}
