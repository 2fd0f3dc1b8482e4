use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::{Config, SourceKind};
use crate::engine::monitor::Monitor;
use crate::engine::source::{FrameSlot, LandmarkSource, SimulatedSource, SlotSource};

#[derive(Clone)]
pub struct AppState {
    monitor: Arc<Monitor>,
    frame_slot: Arc<FrameSlot>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        let monitor = Monitor::new(config.monitor_config(), config.engine_settings());
        Self {
            monitor: Arc::new(monitor),
            frame_slot: Arc::new(FrameSlot::new()),
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn frame_slot(&self) -> &Arc<FrameSlot> {
        &self.frame_slot
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 为新会话构造关键点来源
    pub fn landmark_source(&self, kind: SourceKind) -> Box<dyn LandmarkSource> {
        match kind {
            SourceKind::Queue => {
                self.frame_slot.clear();
                Box::new(SlotSource::new(
                    self.frame_slot.clone(),
                    self.config.frame_max_age(),
                ))
            }
            SourceKind::Simulated => Box::new(SimulatedSource::new(self.config.engine.sim_seed)),
        }
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
