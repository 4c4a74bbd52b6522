use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use metrics::{counter, gauge};

/// A `key=value` label attached to a metric.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag(String, String);

impl Tag {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: ToString,
        V: ToString,
    {
        Tag(key.to_string(), value.to_string())
    }
}

enum Handle {
    Counter {
        value: Arc<AtomicU64>,
        /// value at the previous flush
        reported: AtomicU64,
    },
    Gauge(Arc<AtomicI64>),
}

struct Registered {
    name: String,
    labels: Vec<(String, String)>,
    handle: Handle,
}

lazy_static! {
    static ref REGISTRY: RwLock<Vec<Registered>> = RwLock::new(Vec::new());
}

fn register(name: String, tags: Vec<Tag>, handle: Handle) {
    let labels = tags.into_iter().map(|Tag(k, v)| (k, v)).collect();
    REGISTRY.write().unwrap().push(Registered {
        name,
        labels,
        handle,
    });
}

/// Monotonic process-local counter.
#[derive(Clone, Default, Debug)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn fetch_add(&self, v: u64) -> u64 {
        self.value.fetch_add(v, Ordering::Relaxed)
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Default, Debug)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn store(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub fn register_counter<K: ToString>(name: K, tags: Vec<Tag>) -> Counter {
    let counter = Counter::default();
    let handle = Handle::Counter {
        value: counter.value.clone(),
        reported: AtomicU64::new(0),
    };
    register(name.to_string(), tags, handle);
    counter
}

pub fn register_gauge<K: ToString>(name: K, tags: Vec<Tag>) -> Gauge {
    let gauge = Gauge::default();
    register(name.to_string(), tags, Handle::Gauge(gauge.value.clone()));
    gauge
}

/// Report every registered handle to the installed `metrics` recorder and
/// return how many were reported. Counters report the increment since the
/// previous flush; a no-op without a recorder.
pub fn flush() -> usize {
    let registry = REGISTRY.read().unwrap();
    for metric in registry.iter() {
        let name = metric.name.clone();
        match &metric.handle {
            Handle::Counter { value, reported } => {
                let value = value.load(Ordering::Relaxed);
                let previous = reported.swap(value, Ordering::Relaxed);
                counter!(name, value.saturating_sub(previous), &metric.labels);
            }
            Handle::Gauge(value) => {
                let value = value.load(Ordering::Relaxed) as f64;
                gauge!(name, value, &metric.labels);
            }
        }
    }
    registry.len()
}
