//! Detects a dead peer and keeps a live one from timing the connection out
//! (spec.md §5.2 "InactivityMonitor", §5.5 "Keepalive").
//!
//! Grounded on
//! `activemq-cpp/src/main/activemq/transport/inactivity/InactivityMonitor.cpp`:
//! a read timer that fires the listener's `on_exception` if nothing arrives
//! within `maxInactivityDuration`, and a write timer that sends a
//! `KeepAliveInfo` if nothing was written in the same window, so idle
//! connections still look alive to the broker's own inactivity check.

use crate::command::control::KeepAliveInfo;
use crate::command::Command;
use crate::error::{OpenWireError, OpenWireResult};
use crate::transport::envelope::CommandEnvelope;
use crate::transport::filter::{Transport, TransportListener};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub struct InactivityMonitor<T: Transport> {
    self_ref: Weak<Self>,
    inner: Arc<T>,
    max_inactivity_duration: Duration,
    started_at: Instant,
    last_read_millis: AtomicI64,
    last_write_millis: AtomicI64,
    command_id_seed: AtomicUsize,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> InactivityMonitor<T> {
    pub fn new(inner: Arc<T>, max_inactivity_duration: Duration) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            inner,
            max_inactivity_duration,
            started_at: Instant::now(),
            last_read_millis: AtomicI64::new(0),
            last_write_millis: AtomicI64::new(0),
            command_id_seed: AtomicUsize::new(1),
            task: StdMutex::new(None),
        })
    }

    fn elapsed_millis(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    fn mark_read(&self) {
        self.last_read_millis.store(self.elapsed_millis(), Ordering::SeqCst);
    }

    fn mark_write(&self) {
        self.last_write_millis.store(self.elapsed_millis(), Ordering::SeqCst);
    }

    fn spawn_watchdog(&self, listener: Arc<dyn TransportListener>) {
        let Some(monitor) = self.self_ref.upgrade() else { return };
        let half_window = monitor.max_inactivity_duration / 2;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(half_window.max(Duration::from_millis(100))).await;
                let now = monitor.elapsed_millis();
                let since_read = now - monitor.last_read_millis.load(Ordering::SeqCst);
                let since_write = now - monitor.last_write_millis.load(Ordering::SeqCst);
                if since_read as u128 > monitor.max_inactivity_duration.as_millis() {
                    listener
                        .on_exception(OpenWireError::Timeout(monitor.max_inactivity_duration))
                        .await;
                    break;
                }
                if since_write as u128 > monitor.max_inactivity_duration.as_millis() {
                    let id = monitor.command_id_seed.fetch_add(1, Ordering::SeqCst) as i32;
                    let envelope = CommandEnvelope::oneway(
                        id,
                        Command::KeepAliveInfo(KeepAliveInfo {
                            response_required: false,
                        }),
                    );
                    if monitor.inner.oneway(envelope).await.is_err() {
                        break;
                    }
                    monitor.mark_write();
                }
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }
}

struct WatchdogListener<T: Transport> {
    monitor: Weak<InactivityMonitor<T>>,
    outer: Arc<dyn TransportListener>,
}

#[async_trait]
impl<T: Transport + 'static> TransportListener for WatchdogListener<T> {
    async fn on_command(&self, command: Command) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.mark_read();
        }
        self.outer.on_command(command).await;
    }

    async fn on_exception(&self, error: OpenWireError) {
        self.outer.on_exception(error).await;
    }
}

#[async_trait]
impl<T: Transport + 'static> Transport for InactivityMonitor<T> {
    async fn oneway(&self, envelope: CommandEnvelope) -> OpenWireResult<()> {
        self.mark_write();
        self.inner.oneway(envelope).await
    }

    async fn request(&self, envelope: CommandEnvelope) -> OpenWireResult<Command> {
        self.mark_write();
        self.inner.request(envelope).await
    }

    async fn start(&self) -> OpenWireResult<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> OpenWireResult<()> {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        self.inner.stop().await
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        self.spawn_watchdog(listener.clone());
        self.inner.set_listener(Arc::new(WatchdogListener {
            monitor: self.self_ref.clone(),
            outer: listener,
        }));
    }
}
