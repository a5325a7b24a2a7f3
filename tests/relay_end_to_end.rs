//! Full pipeline tests against a local collector and a local bus socket

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use databus_relay::{
    BusSource, DataBus, FeedSource, HttpSender, ModuleInfo, PayloadMapper, Relay, RelayConfig,
    UdpBus, UdpBusConfig,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Collector {
    received: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    offline: Arc<AtomicBool>,
}

impl Collector {
    fn bodies(&self) -> Vec<Value> {
        self.received.lock().unwrap().iter().map(|(_, body)| body.clone()).collect()
    }

    async fn wait_for<F>(&self, mut done: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if done(&self.bodies()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("collector never saw the expected payloads");
    }
}

async fn start_collector() -> (String, Collector) {
    let collector = Collector::default();
    let state = collector.clone();
    let app = Router::new().route(
        "/api/v1/telemetry/ingest",
        post(move |headers: HeaderMap, axum::Json(body): axum::Json<Value>| {
            let state = state.clone();
            async move {
                if state.offline.load(Ordering::SeqCst) {
                    return StatusCode::SERVICE_UNAVAILABLE;
                }
                state.received.lock().unwrap().push((headers, body));
                StatusCode::OK
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api/v1/telemetry/ingest"), collector)
}

fn config(drone_id: &str, api_url: &str) -> RelayConfig {
    RelayConfig {
        drone_id: drone_id.to_string(),
        api_url: api_url.to_string(),
        api_key: "integration-key".to_string(),
        send_hz: 20.0,
        offline_backoff: Duration::from_millis(25),
        ..RelayConfig::default()
    }
}

fn sender(config: &RelayConfig) -> HttpSender {
    HttpSender::new(&config.api_url, &config.api_key, config.http_timeout).unwrap()
}

#[tokio::test]
async fn bus_datagrams_reach_the_collector() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, collector) = start_collector().await;
    let config = config("WX-DRN-001", &url);

    let comm = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut bus = UdpBus::new(UdpBusConfig {
        comm_addr: comm.local_addr().unwrap().to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        max_packet_size: config.max_packet_size,
        receive_timeout: Duration::from_millis(100),
    });
    bus.connect().await.unwrap();
    let bus_addr = bus.local_addr().unwrap();

    let source = BusSource::new(
        bus,
        PayloadMapper::new(&config.drone_id),
        ModuleInfo::telemetry_receiver("WX_TELEMETRY_SENDER"),
        config.message_filter.clone(),
    );
    let cancel = CancellationToken::new();
    let relay = tokio::spawn({
        let config = config.clone();
        let cancel = cancel.clone();
        async move { Relay::drive(source, sender(&config), &config, cancel).await }
    });

    // Registration arrives before any traffic
    let mut buf = vec![0u8; 8192];
    let (len, _) =
        tokio::time::timeout(Duration::from_secs(5), comm.recv_from(&mut buf)).await.unwrap().unwrap();
    let hello: Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(hello["module"]["module_name"], "WX_TELEMETRY_SENDER");

    let injector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let messages = [
        br#"{"mt":1002,"ms":{"lat":5.6037,"lon":-0.187,"alt":120.5}}"#.to_vec(),
        br#"0|{"message_type":1003,"cmd":"{\"voltage\":22.2,\"battery_remaining\":76}"}"#.to_vec(),
        br#"not json at all"#.to_vec(),
        br#"{"mt":1036,"ms":{"groundspeed":12.3,"yaw":45,"armed":true,"mode":"AUTO"}}"#.to_vec(),
    ];
    for message in &messages {
        injector.send_to(message, bus_addr).await.unwrap();
    }

    collector
        .wait_for(|bodies| bodies.iter().any(|b| b.get("state").is_some() && b.get("battery").is_some()))
        .await;
    cancel.cancel();
    let stats = relay.await.unwrap().unwrap();
    assert!(stats.sent >= 1);

    let received = collector.received.lock().unwrap();
    let (headers, _) = &received[0];
    assert_eq!(headers.get("x-api-key").unwrap(), "integration-key");

    let last = &received.last().unwrap().1;
    assert_eq!(last["drone_id"], "WX-DRN-001");
    assert_eq!(last["position"], json!({"lat": 5.6037, "lon": -0.187, "alt_m": 120.5}));
    assert_eq!(last["battery"]["voltage_v"], 22.2);
    assert_eq!(last["velocity"]["groundspeed_mps"], 12.3);
    assert_eq!(last["attitude"]["yaw_deg"], 45.0);
    assert_eq!(last["state"], json!({"armed": true, "mode": "AUTO"}));
    assert!(last["ts"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn concurrent_relays_stay_isolated() {
    let (url, collector) = start_collector().await;
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for (drone_id, lat) in [("WX-DRN-001", 1.0), ("WX-DRN-002", 2.0)] {
        let config = config(drone_id, &url);
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let source = FeedSource::from_receiver(rx, PayloadMapper::new(drone_id));
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            Relay::drive(source, sender(&config), &config, cancel).await
        }));
        tokio::spawn(async move {
            for _ in 0..5 {
                if tx.send(json!({"position": {"lat": lat, "lon": lat}})).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
    }

    collector
        .wait_for(|bodies| {
            ["WX-DRN-001", "WX-DRN-002"]
                .iter()
                .all(|id| bodies.iter().any(|b| b["drone_id"] == *id))
        })
        .await;
    cancel.cancel();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for body in collector.bodies() {
        let expected = if body["drone_id"] == "WX-DRN-001" { 1.0 } else { 2.0 };
        assert_eq!(body["position"]["lat"], expected);
        assert_eq!(body["position"]["lon"], expected);
    }
}

#[tokio::test]
async fn relay_recovers_after_collector_outage() {
    let (url, collector) = start_collector().await;
    collector.offline.store(true, Ordering::SeqCst);
    let config = config("WX-DRN-003", &url);

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let source = FeedSource::from_receiver(rx, PayloadMapper::new(&config.drone_id));
    let cancel = CancellationToken::new();
    let relay = tokio::spawn({
        let config = config.clone();
        let cancel = cancel.clone();
        async move { Relay::drive(source, sender(&config), &config, cancel).await }
    });

    let feeder = tokio::spawn(async move {
        let mut seq = 0u64;
        while tx.send(json!({"lat": seq as f64, "lon": 0.0})).await.is_ok() {
            seq += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(collector.bodies().is_empty());
    collector.offline.store(false, Ordering::SeqCst);

    collector.wait_for(|bodies| bodies.len() >= 2).await;
    cancel.cancel();
    let stats = relay.await.unwrap().unwrap();
    feeder.abort();

    assert!(stats.failed >= 1);
    assert!(stats.sent >= 2);

    // Each delivery carries fresher data than the one before
    let lats: Vec<f64> =
        collector.bodies().iter().map(|b| b["position"]["lat"].as_f64().unwrap()).collect();
    assert!(lats.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn closed_feed_stops_the_relay() {
    let (url, collector) = start_collector().await;
    let config = config("WX-DRN-004", &url);

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    tx.send(json!({"lat": 7.0, "lon": 8.0})).await.unwrap();
    drop(tx);

    let source = FeedSource::from_receiver(rx, PayloadMapper::new(&config.drone_id));
    let stats =
        Relay::drive(source, sender(&config), &config, CancellationToken::new()).await.unwrap();

    assert_eq!(stats.sent, 1);
    assert_eq!(collector.bodies()[0]["position"]["lat"], 7.0);
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_start() {
    let config = RelayConfig { api_url: "collector.local".to_string(), ..config("d", "") };
    let err = Relay::run(&config, CancellationToken::new()).await.unwrap_err();
    assert!(err.is_fatal());
}
