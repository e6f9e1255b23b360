//! Simulated controller rig
//!
//! Pins idle high and inputs built with [`input`] are active-low, so
//! `press` drives a pin low and `release` lets it return high.

use std::sync::Arc;
use trigdeck_common::config::{DeassertPolicy, Polarity, PoolMode, TriggerMode};
use trigdeck_common::protocol::{Command, Packet, PlayMode};
use trigdeck_common::Ticks;
use trigdeck_player::hal::sim::{
    ManualClock, QueueTransport, Reply, SimAudioSource, SimCatalog, SimMixer, SimPins, SimTiming,
};
use trigdeck_player::playback::{EnginePool, EngineState};
use trigdeck_player::trigger::{InputSettings, TriggerInput};
use trigdeck_player::Controller;

pub type RigController = Controller<SimAudioSource, QueueTransport, SimMixer>;

/// Edge/level input on `pin` playing `"<pin>.wav"` once, active-low, no debounce
pub fn input(pin: u8, trigger: TriggerMode, deassert: DeassertPolicy) -> InputSettings {
    InputSettings {
        pin,
        file: format!("{}.wav", pin),
        polarity: Polarity::ActiveLow,
        trigger,
        deassert,
        mode: PlayMode::Normal,
        volume: 1.0,
        debounce: 0,
    }
}

pub struct RigBuilder {
    channels: usize,
    mode: PoolMode,
    timing: SimTiming,
    catalog: SimCatalog,
    inputs: Vec<InputSettings>,
}

impl RigBuilder {
    pub fn shared(channels: usize) -> Self {
        Self::new(channels, PoolMode::Shared)
    }

    pub fn indexed(channels: usize) -> Self {
        Self::new(channels, PoolMode::Indexed)
    }

    fn new(channels: usize, mode: PoolMode) -> Self {
        Self {
            channels,
            mode,
            timing: SimTiming {
                ramp_ticks: 2,
                clip_ticks: 0,
            },
            catalog: SimCatalog::Any,
            inputs: Vec::new(),
        }
    }

    pub fn timing(mut self, ramp_ticks: Ticks, clip_ticks: Ticks) -> Self {
        self.timing = SimTiming {
            ramp_ticks,
            clip_ticks,
        };
        self
    }

    pub fn catalog(mut self, catalog: SimCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn input(mut self, settings: InputSettings) -> Self {
        self.inputs.push(settings);
        self
    }

    pub fn build(self) -> TestRig {
        let clock = Arc::new(ManualClock::new());
        let catalog = Arc::new(self.catalog);
        let timing = self.timing;

        let mut pool = EnginePool::with_factory(self.channels, |_| {
            SimAudioSource::new(clock.clone(), catalog.clone(), timing)
        });
        pool.initialize(self.mode).expect("pool initializes");

        let inputs = self.inputs.into_iter().map(TriggerInput::new).collect();
        let mut controller = Controller::new(
            pool,
            inputs,
            QueueTransport::new(),
            SimMixer::default(),
            clock.clone(),
        )
        .expect("controller builds");

        let pins = SimPins::new(clock.clone());
        controller.enable_inputs(&pins);

        TestRig {
            clock,
            pins,
            controller,
        }
    }
}

pub struct TestRig {
    pub clock: Arc<ManualClock>,
    pub pins: SimPins,
    pub controller: RigController,
}

impl TestRig {
    /// Advance one tick and run one poll pass
    pub fn tick(&mut self) {
        self.clock.advance(1);
        self.controller.poll_once();
    }

    pub fn ticks(&mut self, count: usize) {
        for _ in 0..count {
            self.tick();
        }
    }

    pub fn press(&mut self, pin: u8) {
        self.pins.set_level(pin, false);
    }

    pub fn release(&mut self, pin: u8) {
        self.pins.set_level(pin, true);
    }

    /// Press and release, one tick each
    pub fn pulse(&mut self, pin: u8) {
        self.press(pin);
        self.tick();
        self.release(pin);
        self.tick();
    }

    /// Send one request and return its single reply
    pub fn request(&mut self, command: Command, payload: &[u8]) -> Reply {
        let packet = Packet::new(command.id(), payload.to_vec()).expect("payload fits");
        self.controller.transport_mut().submit(packet);
        self.tick();

        let mut replies = self.controller.transport_mut().take_replies();
        assert_eq!(replies.len(), 1, "expected one reply to {:?}", command);
        replies.remove(0)
    }

    /// Expect a successful reply and return its payload
    pub fn ok(&mut self, command: Command, payload: &[u8]) -> Vec<u8> {
        match self.request(command, payload) {
            Reply::Packet(packet) => {
                assert_eq!(packet.cmd(), command.id());
                packet.payload().to_vec()
            }
            Reply::Error(code) => panic!("{:?} failed with {}", command, code),
        }
    }

    /// Internal state of the engine bound to input `index`, if any
    pub fn input_state(&self, index: usize) -> Option<EngineState> {
        let input = &self.controller.inputs()[index];
        input
            .engine()
            .map(|handle| self.controller.pool().engine(handle).state())
    }

    /// Number of successful opens on the engine bound to input `index`
    pub fn input_opens(&self, index: usize) -> usize {
        let handle = self.controller.inputs()[index]
            .engine()
            .expect("input has an engine");
        self.controller.pool().engine(handle).source().opens()
    }
}
