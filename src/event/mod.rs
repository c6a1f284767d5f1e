use std::sync::{Arc, Mutex};

use crate::config::IeeeAddr;

/// Domain events carried by the in-process bus.
///
/// Dispatch is synchronous and by value; publishers must not hold any
/// component lock when posting, and subscribers that need to do async or
/// blocking work forward the event onto their own channel instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GatewayEvent {
    DeviceAnnounce {
        short_addr: u16,
        ieee_addr: IeeeAddr,
    },
    DeviceDeleteRequest {
        short_addr: u16,
        ieee_addr: IeeeAddr,
    },
    DeviceListChanged,
    LqiStateChanged,
}

impl GatewayEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            GatewayEvent::DeviceAnnounce { .. } => "device_announce",
            GatewayEvent::DeviceDeleteRequest { .. } => "device_delete_request",
            GatewayEvent::DeviceListChanged => "device_list_changed",
            GatewayEvent::LqiStateChanged => "lqi_state_changed",
        }
    }
}

type Subscriber = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Minimal in-process pub/sub with a fixed topic set.
///
/// The subscriber list lock is released before any callback runs, so a
/// subscriber may post follow-up events or register further subscribers
/// without deadlocking the bus.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(EventBus {
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .expect("lock subscribers")
            .push(Arc::new(handler));
    }

    pub fn post(&self, event: GatewayEvent) {
        let handlers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .expect("lock subscribers")
            .clone();
        log::debug!("event: {}", event.topic());
        for handler in handlers {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            bus.subscribe(move |event| {
                if matches!(event, GatewayEvent::DeviceListChanged) {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        bus.post(GatewayEvent::DeviceListChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn subscriber_may_post_followup_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let chained = bus.clone();
        bus.subscribe(move |event| {
            if let GatewayEvent::DeviceAnnounce { .. } = event {
                chained.post(GatewayEvent::DeviceListChanged);
            }
        });
        let log = seen.clone();
        bus.subscribe(move |event| {
            log.lock().unwrap().push(event.topic());
        });

        bus.post(GatewayEvent::DeviceAnnounce {
            short_addr: 0x1234,
            ieee_addr: [1; 8],
        });

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &["device_list_changed", "device_announce"]
        );
    }

    #[test]
    fn events_carry_payload_by_value() {
        let bus = EventBus::new();
        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        bus.subscribe(move |event| {
            if let GatewayEvent::DeviceDeleteRequest {
                short_addr,
                ieee_addr,
            } = event
            {
                *slot.lock().unwrap() = Some((*short_addr, *ieee_addr));
            }
        });
        bus.post(GatewayEvent::DeviceDeleteRequest {
            short_addr: 0x2001,
            ieee_addr: [7; 8],
        });
        assert_eq!(*captured.lock().unwrap(), Some((0x2001, [7; 8])));
    }
}
