//! Host-side MLED/1 controller engine.
//!
//! One [`Engine`] owns the multicast socket, the node registry and the ack
//! table. `start` spawns the receive loop and the periodic tasks on the
//! current tokio runtime; `stop` signals them and joins every task before
//! the socket is released.

mod acks;
mod apply;
mod config;
mod dispatch;
mod error;
mod events;
mod socket;
mod stats;

pub use acks::AckTable;
pub use apply::{ApplyRequest, ApplyResult, FIRE_GAP, FIRE_LEAD_MS, FIRE_REPEAT, Targets};
pub use config::{DEFAULT_OFFLINE_THRESHOLD, EngineConfig, Settings, normalize_bind_ip};
pub use error::EngineError;
pub use events::EngineEvent;
pub use socket::Interface;
pub use stats::NetworkStats;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::node::{NodeDto, NodeRegistry, format_node_id};
use crate::proto::{CONTROLLER_SENDER_ID, Header, MessageType, TargetMode};
use crate::time::ShowClock;
use socket::Transport;
use stats::StatsCounters;

pub const RECV_BUFFER_SIZE: usize = 4096;
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);
pub const OFFLINE_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PeriodicTask {
    Ping,
    Beacon,
    OfflineSweep(Duration),
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Engine {
    config: RwLock<EngineConfig>,
    epoch_id: u32,
    last_msg_id: AtomicU32,
    clock: ShowClock,
    state: RwLock<EngineState>,
    nodes: RwLock<NodeRegistry>,
    acks: Mutex<AckTable>,
    listeners: RwLock<Vec<Listener>>,
    transport: RwLock<Option<Transport>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    stats: StatsCounters,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: RwLock::new(config.normalized()),
            epoch_id: rand::random(),
            last_msg_id: AtomicU32::new(0),
            clock: ShowClock::new(),
            state: RwLock::new(EngineState::Stopped),
            nodes: RwLock::new(NodeRegistry::new()),
            acks: Mutex::new(AckTable::new()),
            listeners: RwLock::new(Vec::new()),
            transport: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            stats: StatsCounters::default(),
        }
    }

    /// Registers a listener. Listeners run on the engine's tasks and must
    /// not block.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        write(&self.listeners).push(Arc::new(listener));
    }

    pub fn epoch_id(&self) -> u32 {
        self.epoch_id
    }

    pub fn show_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    pub fn state(&self) -> EngineState {
        *read(&self.state)
    }

    pub fn config(&self) -> EngineConfig {
        read(&self.config).clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        read(&self.transport).as_ref().map(|t| t.local_addr)
    }

    pub fn interface(&self) -> Option<Interface> {
        read(&self.transport).as_ref().map(|t| t.interface.clone())
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.snapshot()
    }

    pub fn pending_acks(&self) -> usize {
        lock(&self.acks).len()
    }

    /// Nodes with derived status, ordered by id.
    pub fn nodes_snapshot(&self) -> Vec<NodeDto> {
        let config = self.config();
        read(&self.nodes).snapshot(
            Instant::now(),
            config.weak_rssi_dbm,
            config.offline_threshold,
        )
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.start_locked(&mut lifecycle)
    }

    /// Cancels all tasks and waits for them to exit before closing the socket.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
    }

    /// Stops, swaps the configuration and starts again without letting any
    /// other lifecycle call interleave.
    pub async fn restart(self: &Arc<Self>, config: EngineConfig) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.stop_locked(&mut lifecycle).await;
        *write(&self.config) = config.normalized();
        log::info!("engine restarting with new configuration");
        self.start_locked(&mut lifecycle)
    }

    fn start_locked(self: &Arc<Self>, lifecycle: &mut Lifecycle) -> Result<(), EngineError> {
        if lifecycle.shutdown.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        self.set_state(EngineState::Starting);
        let config = self.config();
        let transport = match socket::open(&config) {
            Ok(transport) => transport,
            Err(e) => {
                self.set_state(EngineState::Stopped);
                return Err(e);
            }
        };

        log::info!(
            "engine started on {} via {} ({}), group {}, epoch {:08X}",
            transport.local_addr,
            transport.interface.name,
            transport.interface.addr,
            transport.group,
            self.epoch_id
        );

        let socket = Arc::clone(&transport.socket);
        *write(&self.transport) = Some(transport);
        lock(&self.acks).clear();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        lifecycle.tasks.push(tokio::spawn(
            Arc::clone(self).recv_loop(socket, shutdown_rx.clone()),
        ));

        let mut periodic = vec![(
            PeriodicTask::OfflineSweep(config.offline_threshold),
            OFFLINE_SWEEP_INTERVAL,
        )];
        if !config.discovery_interval.is_zero() {
            periodic.push((PeriodicTask::Ping, config.discovery_interval));
        }
        if !config.beacon_interval.is_zero() {
            periodic.push((PeriodicTask::Beacon, config.beacon_interval));
        }
        for (task, period) in periodic {
            lifecycle.tasks.push(tokio::spawn(Arc::clone(self).run_periodic(
                task,
                period,
                shutdown_rx.clone(),
            )));
        }

        lifecycle.shutdown = Some(shutdown_tx);
        self.set_state(EngineState::Running);
        Ok(())
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        let Some(shutdown) = lifecycle.shutdown.take() else {
            return;
        };

        let _ = shutdown.send(true);
        for task in lifecycle.tasks.drain(..) {
            if let Err(e) = task.await {
                log::warn!("engine task ended abnormally: {}", e);
            }
        }

        write(&self.transport).take();
        self.set_state(EngineState::Stopped);
        log::info!("engine stopped");
    }

    fn set_state(&self, state: EngineState) {
        *write(&self.state) = state;
    }

    pub async fn send_ping(&self) -> Result<(), EngineError> {
        let header = self.header(MessageType::Ping, TargetMode::All, 0);
        self.send_multicast(&header.to_bytes()).await
    }

    pub async fn send_beacon(&self) -> Result<(), EngineError> {
        let mut header = self.header(MessageType::Beacon, TargetMode::All, 0);
        header.execute_at_ms = self.show_ms();
        self.send_multicast(&header.to_bytes()).await
    }

    fn next_msg_id(&self) -> u32 {
        self.last_msg_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    fn header(&self, msg_type: MessageType, mode: TargetMode, target: u32) -> Header {
        let mut header = Header::new(msg_type);
        header.epoch_id = self.epoch_id;
        header.msg_id = self.next_msg_id();
        header.sender_id = CONTROLLER_SENDER_ID;
        header.target = target;
        header.set_target_mode(mode);
        header
    }

    /// Socket and group address of the running transport. The guard is
    /// released before any send is awaited.
    fn sender(&self) -> Result<(Arc<UdpSocket>, SocketAddr), EngineError> {
        let transport = read(&self.transport);
        let transport = transport.as_ref().ok_or(EngineError::NotRunning)?;
        Ok((Arc::clone(&transport.socket), transport.group))
    }

    async fn send_multicast(&self, packet: &[u8]) -> Result<(), EngineError> {
        let (socket, group) = self.sender()?;
        self.send_via(&socket, packet, group).await
    }

    async fn send_via(
        &self,
        socket: &UdpSocket,
        packet: &[u8],
        dest: SocketAddr,
    ) -> Result<(), EngineError> {
        match socket.send_to(packet, dest).await {
            Ok(sent) => {
                self.stats.record_sent(sent);
                Ok(())
            }
            Err(e) => {
                self.stats.record_send_error();
                Err(e.into())
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        let listeners: Vec<Listener> = read(&self.listeners).clone();
        for listener in &listeners {
            listener(&event);
        }
    }

    fn report_error(&self, message: String) {
        log::warn!("{}", message);
        self.emit(EngineEvent::Error { message });
    }

    async fn recv_loop(self: Arc<Self>, socket: Arc<UdpSocket>, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                result = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buffer)) => result,
            };

            match received {
                Err(_) => continue,
                Ok(Ok((len, from))) => {
                    if let Some(reply) = self.handle_datagram(&buffer[..len], from) {
                        if let Err(e) = self.send_via(&socket, &reply, from).await {
                            self.report_error(format!("time response to {} failed: {}", from, e));
                        }
                    }
                }
                Ok(Err(e)) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.report_error(format!("receive failed: {}", e));
                }
            }
        }

        log::debug!("receive loop exited");
    }

    async fn run_periodic(
        self: Arc<Self>,
        task: PeriodicTask,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            match task {
                PeriodicTask::Ping => {
                    if let Err(e) = self.send_ping().await {
                        self.report_error(format!("discovery ping failed: {}", e));
                    }
                }
                PeriodicTask::Beacon => {
                    if let Err(e) = self.send_beacon().await {
                        self.report_error(format!("beacon failed: {}", e));
                    }
                }
                PeriodicTask::OfflineSweep(threshold) => self.sweep_offline(threshold),
            }
        }

        log::debug!("{:?} task exited", task);
    }

    fn sweep_offline(&self, threshold: Duration) {
        let flagged = write(&self.nodes).sweep_offline(Instant::now(), threshold);
        for node_id in flagged {
            let node_id = format_node_id(node_id);
            log::info!("node {} went offline", node_id);
            self.emit(EngineEvent::NodeOffline { node_id });
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
