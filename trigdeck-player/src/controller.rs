//! Poll loop controller
//!
//! Owns every piece of mutable runtime state (engine pool, trigger inputs,
//! dispatcher, transport, mixer, indicator) and advances it in a fixed order
//! once per tick:
//!
//! 1. trigger inputs (debounce, acquire/release, play/pause/stop)
//! 2. engine pool (ramp completion, end of stream)
//! 3. command dispatcher (at most one request)
//! 4. activity indicator
//!
//! Only the pin layer's edge handlers run outside this loop, and they touch
//! nothing but their input's edge latch.

use crate::error::Result;
use crate::hal::{
    AudioSource, OutputMixer, PacketTransport, PinBus, SharedClock, StatusIndicator, TickSource,
};
use crate::playback::{EnginePool, PlaybackStatus, PoolError};
use crate::protocol::CommandDispatcher;
use crate::trigger::{InputStatus, TriggerInput};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use trigdeck_common::Ticks;

/// Point-in-time view of the controller for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub tick: Ticks,
    pub busy_engines: usize,
    pub channels: Vec<PlaybackStatus>,
    pub inputs: Vec<InputStatus>,
}

pub struct Controller<S, T, M> {
    pool: EnginePool<S>,
    inputs: Vec<TriggerInput>,
    dispatcher: CommandDispatcher,
    transport: T,
    mixer: M,
    indicator: Option<Box<dyn StatusIndicator>>,
    clock: SharedClock,
}

impl<S, T, M> Controller<S, T, M>
where
    S: AudioSource,
    T: PacketTransport,
    M: OutputMixer,
{
    /// Assemble a controller around an initialized pool
    pub fn new(
        pool: EnginePool<S>,
        inputs: Vec<TriggerInput>,
        transport: T,
        mixer: M,
        clock: SharedClock,
    ) -> Result<Self> {
        if pool.policy().is_none() {
            return Err(PoolError::Uninitialized.into());
        }

        Ok(Self {
            pool,
            inputs,
            dispatcher: CommandDispatcher::new(),
            transport,
            mixer,
            indicator: None,
            clock,
        })
    }

    pub fn with_indicator(mut self, indicator: Box<dyn StatusIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: CommandDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Attach every input's edge handler
    pub fn enable_inputs(&mut self, pins: &dyn PinBus) {
        let now = self.clock.now();
        for input in &mut self.inputs {
            input.enable(pins, now);
        }
        info!("{} trigger inputs enabled", self.inputs.len());
    }

    /// Run one pass of the poll loop
    pub fn poll_once(&mut self) {
        let now = self.clock.now();

        for input in &mut self.inputs {
            input.poll(&mut self.pool, now);
        }

        self.pool.poll();

        self.dispatcher
            .poll(&mut self.transport, &mut self.pool, &mut self.mixer);

        if let Some(indicator) = self.indicator.as_mut() {
            indicator.set_active(self.pool.any_playing());
        }
    }

    /// Poll every `period` until `shutdown` completes
    pub async fn run(&mut self, period: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Poll loop running every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Poll loop stopping");
                    break;
                }
                _ = ticker.tick() => self.poll_once(),
            }
        }
    }

    /// Detach inputs and silence every engine
    pub fn shutdown(&mut self, pins: &dyn PinBus) {
        for input in &mut self.inputs {
            input.disable(pins, &mut self.pool);
        }
        self.pool.stop_all(false);
        self.pool.release_all();

        if let Some(indicator) = self.indicator.as_mut() {
            indicator.set_active(false);
        }
        info!("Controller shut down");
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            tick: self.clock.now(),
            busy_engines: self.pool.busy_count(),
            channels: self.pool.statuses(),
            inputs: self.inputs.iter().map(TriggerInput::status).collect(),
        }
    }

    pub fn pool(&self) -> &EnginePool<S> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut EnginePool<S> {
        &mut self.pool
    }

    pub fn inputs(&self) -> &[TriggerInput] {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut [TriggerInput] {
        &mut self.inputs
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
