//! Bus-driven payload source

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::aggregator::TelemetryAggregator;
use crate::bus::{DataBus, ModuleInfo};
use crate::mapper::PayloadMapper;
use crate::normalizer::MessageNormalizer;
use crate::provider::PayloadSource;
use crate::types::OutboundPayload;
use crate::{RelayError, Result};

/// Upper bound on queued messages taken per snapshot
const MAX_DRAIN: usize = 1024;

/// Pulls bus messages, folds them into the aggregate and yields snapshots.
///
/// After the first message that updates the state, every message already
/// queued on the bus is folded in too, so each payload reflects the newest
/// data rather than the oldest backlog.
pub struct BusSource<B: DataBus> {
    bus: B,
    aggregator: Arc<TelemetryAggregator>,
    mapper: PayloadMapper,
    module: ModuleInfo,
    subscriptions: Vec<i64>,
    initialized: bool,
    skipped: u64,
}

impl<B: DataBus> BusSource<B> {
    /// Create a source over `bus` stamping payloads with `mapper`'s drone id
    pub fn new(bus: B, mapper: PayloadMapper, module: ModuleInfo, subscriptions: Vec<i64>) -> Self {
        Self {
            bus,
            aggregator: Arc::new(TelemetryAggregator::new()),
            mapper,
            module,
            subscriptions,
            initialized: false,
            skipped: 0,
        }
    }

    /// Shared handle to the aggregate
    pub fn aggregator(&self) -> Arc<TelemetryAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Messages skipped as malformed so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    async fn ensure_initialized(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.bus.connect().await?;
        self.bus.subscribe(&self.subscriptions).await?;
        self.bus.register_module(&self.module).await?;
        self.initialized = true;
        info!(
            module = %self.module.module_name,
            subscriptions = ?self.subscriptions,
            "DataBus source ready"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl<B: DataBus> PayloadSource for BusSource<B> {
    async fn next_payload(&mut self) -> Result<Option<OutboundPayload>> {
        self.ensure_initialized().await?;

        loop {
            let message = match self.bus.receive_one().await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e @ (RelayError::Parse { .. } | RelayError::Schema { .. })) => {
                    self.skipped += 1;
                    debug!("Skipping malformed bus message: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("DataBus receive failed: {}", e);
                    return Err(e);
                }
            };

            if self.fold(&message) {
                self.drain_queued().await;
                let snapshot = self.aggregator.snapshot();
                return Ok(Some(self.mapper.from_state(&snapshot)));
            }
        }
    }
}

impl<B: DataBus> BusSource<B> {
    fn fold(&self, message: &Map<String, Value>) -> bool {
        let normalized = MessageNormalizer::normalize(message);
        let updated = self.aggregator.apply(&normalized);
        if updated {
            trace!(code = ?normalized.code(), "State updated");
        }
        updated
    }

    /// Fold everything that queued up while the send loop was paced
    async fn drain_queued(&mut self) {
        let mut folded = 0usize;
        for _ in 0..MAX_DRAIN {
            match self.bus.try_receive().await {
                Ok(Some(message)) => {
                    self.fold(&message);
                    folded += 1;
                }
                Ok(None) => break,
                Err(e @ (RelayError::Parse { .. } | RelayError::Schema { .. })) => {
                    self.skipped += 1;
                    debug!("Skipping malformed bus message: {}", e);
                }
                Err(e) => {
                    // Surfaces again on the next blocking receive
                    debug!("Drain stopped early: {}", e);
                    break;
                }
            }
        }
        if folded > 0 {
            trace!(folded, "Folded queued bus messages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBus {
        inbox: VecDeque<Result<Option<Map<String, Value>>>>,
        queued: VecDeque<Result<Map<String, Value>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedBus {
        fn with(messages: Vec<Result<Option<Map<String, Value>>>>) -> Self {
            Self { inbox: messages.into(), ..Default::default() }
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[async_trait::async_trait]
    impl DataBus for ScriptedBus {
        async fn connect(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("connect".into());
            Ok(())
        }

        async fn register_module(&mut self, module: &ModuleInfo) -> Result<()> {
            self.calls.lock().unwrap().push(format!("register:{}", module.module_name));
            Ok(())
        }

        async fn subscribe(&mut self, codes: &[i64]) -> Result<()> {
            self.calls.lock().unwrap().push(format!("subscribe:{codes:?}"));
            Ok(())
        }

        async fn receive_one(&mut self) -> Result<Option<Map<String, Value>>> {
            match self.inbox.pop_front() {
                Some(item) => item,
                None => Err(RelayError::transport_failed("script exhausted")),
            }
        }

        async fn try_receive(&mut self) -> Result<Option<Map<String, Value>>> {
            self.queued.pop_front().transpose()
        }
    }

    fn source(bus: ScriptedBus) -> BusSource<ScriptedBus> {
        BusSource::new(
            bus,
            PayloadMapper::new("WX-DRN-001"),
            ModuleInfo::telemetry_receiver("WX_TELEMETRY_SENDER"),
            vec![1002, 1003, 1036],
        )
    }

    #[tokio::test]
    async fn initializes_bus_once_in_order() {
        let bus = ScriptedBus::with(vec![
            Ok(Some(object(json!({"mt": 1002, "ms": {"lat": 1.0, "lon": 2.0}})))),
            Ok(Some(object(json!({"mt": 1003, "ms": {"voltage": 22.2}})))),
        ]);
        let calls = bus.calls.clone();
        let mut source = source(bus);

        source.next_payload().await.unwrap().unwrap();
        source.next_payload().await.unwrap().unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["connect", "subscribe:[1002, 1003, 1036]", "register:WX_TELEMETRY_SENDER"]
        );
    }

    #[tokio::test]
    async fn payloads_accumulate_sections() {
        let bus = ScriptedBus::with(vec![
            Ok(Some(object(json!({"message_type": 1002, "cmd": {"lat": 1.2, "lon": 3.4, "alt": 5.6}})))),
            Ok(Some(object(json!({"message_type": 1003, "cmd": {"voltage": 22.2, "battery_remaining": 66}})))),
            Ok(Some(object(json!({"message_type": 1036, "cmd": {"groundspeed": 12.3, "yaw": 45, "armed": true, "mode": "AUTO"}})))),
        ]);
        let mut source = source(bus);

        let first = source.next_payload().await.unwrap().unwrap();
        let second = source.next_payload().await.unwrap().unwrap();
        let third = source.next_payload().await.unwrap().unwrap();

        assert_eq!(first.position.lat, 1.2);
        assert!(first.battery.is_none());
        assert_eq!(second.battery.unwrap().remaining_pct, Some(66.0));
        assert_eq!(second.position.lat, 1.2);
        assert_eq!(third.flight_state.unwrap().mode.as_deref(), Some("AUTO"));
        assert_eq!(third.drone_id, "WX-DRN-001");
    }

    #[tokio::test]
    async fn malformed_and_ignored_messages_are_skipped() {
        let bus = ScriptedBus::with(vec![
            Err(RelayError::parse_error("datagram decoding", "bad")),
            Err(RelayError::schema_error("datagram decoding", "array")),
            Ok(None),
            Ok(Some(object(json!({"mt": 6502, "ms": {}})))),
            Ok(Some(object(json!({"mt": "x"})))),
            Ok(Some(object(json!({"mt": "1002", "ms": {"latitude": 5.6037, "longitude": -0.187}})))),
        ]);
        let mut source = source(bus);

        let payload = source.next_payload().await.unwrap().unwrap();
        assert_eq!(payload.position.lat, 5.6037);
        assert_eq!(source.skipped(), 2);
    }

    #[tokio::test]
    async fn transport_failures_propagate() {
        let mut source = source(ScriptedBus::with(vec![]));
        assert!(matches!(source.next_payload().await, Err(RelayError::Transport { .. })));
    }

    #[tokio::test]
    async fn queued_messages_fold_into_one_snapshot() {
        let mut bus = ScriptedBus::with(vec![Ok(Some(object(
            json!({"mt": 1002, "ms": {"lat": 1.0, "lon": 1.0}}),
        )))]);
        bus.queued = VecDeque::from(vec![
            Ok(object(json!({"mt": 1003, "ms": {"voltage": 22.2}}))),
            Err(RelayError::parse_error("datagram decoding", "bad")),
            Ok(object(json!({"mt": 1002, "ms": {"lat": 3.0, "lon": 4.0}}))),
        ]);
        let mut source = source(bus);

        let payload = source.next_payload().await.unwrap().unwrap();
        assert_eq!(payload.position.lat, 3.0);
        assert_eq!(payload.position.lon, 4.0);
        assert_eq!(payload.battery.unwrap().voltage_v, Some(22.2));
        assert_eq!(source.skipped(), 1);
    }

    #[tokio::test]
    async fn backlog_on_a_udp_bus_yields_the_newest_fix() {
        use crate::bus::{UdpBus, UdpBusConfig};
        use std::time::Duration;
        use tokio::net::UdpSocket;

        let comm = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut bus = UdpBus::new(UdpBusConfig {
            comm_addr: comm.local_addr().unwrap().to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            max_packet_size: 8192,
            receive_timeout: Duration::from_millis(200),
        });
        bus.connect().await.unwrap();
        let target = bus.local_addr().unwrap();

        let injector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for lat in 1..=10 {
            let datagram = format!(r#"{{"mt":1002,"ms":{{"lat":{lat},"lon":0}}}}"#);
            injector.send_to(datagram.as_bytes(), target).await.unwrap();
        }

        let mut source = BusSource::new(
            bus,
            PayloadMapper::new("WX-DRN-001"),
            ModuleInfo::telemetry_receiver("WX_TELEMETRY_SENDER"),
            vec![1002],
        );
        let payload = source.next_payload().await.unwrap().unwrap();
        assert_eq!(payload.position.lat, 10.0);
    }
}
