//! REST client and poller tests against a mock base station

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use unolink_engine::{spawn_registry, DeviceRegistry, EngineEvent, TaskCommand};
use unolink_protocol::RadioAddress;
use unolink_rest::{
    run_list_poller, run_mapping_poller, PollerConfig, PollerExit, RestClient, RestError,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_polls() -> PollerConfig {
    PollerConfig {
        poll_interval_ms: 20,
    }
}

#[tokio::test]
async fn test_list_devices() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"result":"ok","infos":[{"code":"302010","batt":"55%","fmw":"1.4"}]}"#,
        ))
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(server.uri())?;
    let response = client.list_devices().await?;

    assert_eq!(response.result, "ok");
    assert_eq!(response.infos[0].code, "302010");
    assert_eq!(response.infos[0].battery_percent(), Some(55));
    Ok(())
}

#[tokio::test]
async fn test_device_commands_join_addresses() -> Result<()> {
    let server = MockServer::start().await;
    for endpoint in ["/activate", "/deactivate", "/shutdown"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("devices", "302010 010203"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = RestClient::with_base_url(server.uri())?;
    let devices = [
        RadioAddress::new([0x30, 0x20, 0x10]),
        RadioAddress::new([0x01, 0x02, 0x03]),
    ];
    client.activate(&devices).await?;
    client.deactivate(&devices).await?;
    client.shutdown(&devices).await?;
    Ok(())
}

#[tokio::test]
async fn test_start_telemetry_repeats_vo2max() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/startTelemetry"))
        .and(query_param("devices", "302010 010203"))
        .and(query_param("VO2Max", "18.18 18.18"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(server.uri())?;
    client
        .start_telemetry(
            &[
                RadioAddress::new([0x30, 0x20, 0x10]),
                RadioAddress::new([0x01, 0x02, 0x03]),
            ],
            18.18,
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_toggle_telemetry_picks_endpoint() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exitTelemetry"))
        .and(query_param("devices", "302010"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/startTelemetry"))
        .and(query_param("devices", "302010"))
        .and(query_param("VO2Max", "21.5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(server.uri())?.with_vo2_max(21.5);
    let device = RadioAddress::new([0x30, 0x20, 0x10]);
    client.toggle_telemetry(device, true).await?;
    client.toggle_telemetry(device, false).await?;
    Ok(())
}

#[tokio::test]
async fn test_global_telemetry_commands() -> Result<()> {
    let server = MockServer::start().await;
    for endpoint in ["/stopTelemetry", "/telemetryParty"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = RestClient::with_base_url(server.uri())?;
    client.stop_telemetry().await?;
    client.telemetry_party().await?;
    Ok(())
}

#[tokio::test]
async fn test_empty_device_list_is_rejected_without_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(server.uri())?;
    assert!(matches!(client.activate(&[]).await, Err(RestError::NoDevices)));
    assert!(matches!(
        client.start_telemetry(&[], 18.18).await,
        Err(RestError::NoDevices)
    ));
    Ok(())
}

#[tokio::test]
async fn test_error_status_and_bad_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listDevices"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getTelemetryMapping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = RestClient::with_base_url(server.uri())?;

    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, RestError::Status { status: 503, .. }));
    assert!(!err.is_transport());

    let err = client.telemetry_mapping().await.unwrap_err();
    assert!(matches!(err, RestError::Decode { .. }));
    assert!(!err.is_transport());
    Ok(())
}

#[tokio::test]
async fn test_pollers_merge_into_registry() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"result":"ok","infos":[{"code":"302010","batt":"42%","fmw":"1.0"}]}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getTelemetryMapping"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"result":"ok","mapping":{"302010":7}}"#),
        )
        .mount(&server)
        .await;

    let (event_tx, _event_rx) = mpsc::channel(16);
    let (registry, _actor) = spawn_registry(DeviceRegistry::new(), event_tx.clone(), 64);
    let client = RestClient::with_base_url(server.uri())?;

    let (list_cmd, list_rx) = mpsc::channel(1);
    let (mapping_cmd, mapping_rx) = mpsc::channel(1);
    let list = tokio::spawn(run_list_poller(
        client.clone(),
        registry.clone(),
        fast_polls(),
        event_tx.clone(),
        list_rx,
    ));
    let mapping = tokio::spawn(run_mapping_poller(
        client,
        registry.clone(),
        fast_polls(),
        event_tx,
        mapping_rx,
    ));

    let addr = RadioAddress::new([0x30, 0x20, 0x10]);
    let record = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(record) = registry.device(addr).await.unwrap() {
                if record.live_on {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    assert_eq!(record.battery, 42);
    assert_eq!(record.slot, 7);

    list_cmd.send(TaskCommand::Shutdown).await?;
    mapping_cmd.send(TaskCommand::Shutdown).await?;
    assert!(matches!(list.await?, PollerExit::Shutdown));
    assert!(matches!(mapping.await?, PollerExit::Shutdown));
    Ok(())
}

#[tokio::test]
async fn test_poller_keeps_going_after_bad_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (registry, _actor) = spawn_registry(DeviceRegistry::new(), event_tx.clone(), 16);
    let (cmd_tx, cmd_rx) = mpsc::channel(1);

    let poller = tokio::spawn(run_list_poller(
        RestClient::with_base_url(server.uri())?,
        registry,
        fast_polls(),
        event_tx,
        cmd_rx,
    ));

    // Two failed polls, and the task is still running
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await?
            .expect("event channel open");
        assert!(matches!(event, EngineEvent::Error { .. }));
    }
    assert!(!poller.is_finished());

    cmd_tx.send(TaskCommand::Shutdown).await?;
    assert!(matches!(poller.await?, PollerExit::Shutdown));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_abandons_slow_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listDevices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"result":"ok","infos":[]}"#)
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let (event_tx, _event_rx) = mpsc::channel(16);
    let (registry, _actor) = spawn_registry(DeviceRegistry::new(), event_tx.clone(), 16);
    let (cmd_tx, cmd_rx) = mpsc::channel(1);

    let poller = tokio::spawn(run_list_poller(
        RestClient::with_base_url(server.uri())?,
        registry,
        fast_polls(),
        event_tx,
        cmd_rx,
    ));

    // Let the first request reach the server and stall there
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!poller.is_finished());

    cmd_tx.send(TaskCommand::Shutdown).await?;
    let exit = tokio::time::timeout(Duration::from_secs(1), poller).await??;
    assert!(matches!(exit, PollerExit::Shutdown));
    Ok(())
}

#[tokio::test]
async fn test_poller_stops_on_unreachable_station() -> Result<()> {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (registry, _actor) = spawn_registry(DeviceRegistry::new(), event_tx.clone(), 16);
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);

    let exit = run_mapping_poller(
        RestClient::new("127.0.0.1", port)?,
        registry,
        fast_polls(),
        event_tx,
        cmd_rx,
    )
    .await;

    assert!(matches!(exit, PollerExit::Failed(ref e) if e.is_transport()));
    let event = event_rx.recv().await.expect("event channel open");
    assert!(event.is_terminal());
    assert!(matches!(event, EngineEvent::PollerFailed { ref poller, .. } if poller == "mapping"));
    Ok(())
}
