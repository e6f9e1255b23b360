//! Engine pool
//!
//! Fixed arena of playback engines, allocated once and reused. Callers hold
//! an [`EngineHandle`] (the arena index) instead of a reference, so a handle
//! can outlive a release without dangling.
//!
//! Two addressing policies, fixed at initialization:
//! - **Shared**: `acquire`/`release` hand out the first free engine; many
//!   trigger inputs share fewer engines.
//! - **Indexed**: `get(index)` maps a protocol channel 1:1 onto an engine;
//!   `acquire`/`release` are unavailable.
//!
//! The pool is owned by the poll loop and passed around by `&mut`, which
//! serializes acquire/release/get without locks.

use super::engine::PlaybackEngine;
use super::state::PlaybackStatus;
use crate::hal::{AudioSource, SourceStatus};
use thiserror::Error;
use tracing::{debug, info};
use trigdeck_common::config::PoolMode;

/// Index of an engine inside its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(usize);

impl EngineHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Engine acquisition failures (never fatal)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("engine pool not initialized")]
    Uninitialized,

    #[error("engine pool already initialized with {current:?} policy")]
    AlreadyInitialized { current: PoolMode },

    #[error("operation requires {required:?} policy, pool uses {actual:?}")]
    PolicyMismatch { required: PoolMode, actual: PoolMode },

    #[error("no engine available")]
    Exhausted,

    #[error("engine index {index} out of range (capacity {capacity})")]
    OutOfRange { index: usize, capacity: usize },
}

pub struct EnginePool<S> {
    engines: Vec<PlaybackEngine<S>>,
    policy: Option<PoolMode>,
}

impl<S: AudioSource> EnginePool<S> {
    /// Build a pool with one engine per source
    pub fn new(sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            engines: sources.into_iter().map(PlaybackEngine::new).collect(),
            policy: None,
        }
    }

    /// Build a pool of `capacity` engines from a source factory
    pub fn with_factory(capacity: usize, factory: impl FnMut(usize) -> S) -> Self {
        Self::new((0..capacity).map(factory))
    }

    /// Fix the addressing policy; may only be called once
    pub fn initialize(&mut self, policy: PoolMode) -> Result<(), PoolError> {
        match self.policy {
            Some(current) if current != policy => Err(PoolError::AlreadyInitialized { current }),
            Some(_) => Ok(()),
            None => {
                self.policy = Some(policy);
                info!(
                    "Engine pool initialized: {} engines, {:?} policy",
                    self.engines.len(),
                    policy
                );
                Ok(())
            }
        }
    }

    pub fn policy(&self) -> Option<PoolMode> {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.engines.len()
    }

    fn require(&self, required: PoolMode) -> Result<(), PoolError> {
        match self.policy {
            None => Err(PoolError::Uninitialized),
            Some(actual) if actual != required => {
                Err(PoolError::PolicyMismatch { required, actual })
            }
            Some(_) => Ok(()),
        }
    }

    /// Reserve the first free engine (shared policy)
    pub fn acquire(&mut self) -> Result<EngineHandle, PoolError> {
        self.require(PoolMode::Shared)?;

        let index = self
            .engines
            .iter()
            .position(|engine| !engine.busy)
            .ok_or(PoolError::Exhausted)?;

        self.engines[index].busy = true;
        debug!("Acquired engine#{}", index);
        Ok(EngineHandle(index))
    }

    /// Stop an engine and return it to the pool (shared policy; no-op otherwise)
    pub fn release(&mut self, handle: EngineHandle) {
        if self.require(PoolMode::Shared).is_err() {
            return;
        }

        if let Some(engine) = self.engines.get_mut(handle.0) {
            engine.stop(false);
            engine.busy = false;
            debug!("Released {}", handle);
        }
    }

    /// Address an engine directly by index (indexed policy)
    pub fn get(&mut self, index: usize) -> Result<EngineHandle, PoolError> {
        self.require(PoolMode::Indexed)?;

        let capacity = self.engines.len();
        let engine = self
            .engines
            .get_mut(index)
            .ok_or(PoolError::OutOfRange { index, capacity })?;

        engine.busy = true;
        Ok(EngineHandle(index))
    }

    /// Engine behind a handle issued by this pool
    ///
    /// # Panics
    ///
    /// Panics if `handle` was issued by a larger pool.
    pub fn engine(&self, handle: EngineHandle) -> &PlaybackEngine<S> {
        &self.engines[handle.0]
    }

    /// Mutable engine behind a handle issued by this pool
    ///
    /// # Panics
    ///
    /// Panics if `handle` was issued by a larger pool.
    pub fn engine_mut(&mut self, handle: EngineHandle) -> &mut PlaybackEngine<S> {
        &mut self.engines[handle.0]
    }

    fn busy_mut(&mut self) -> impl Iterator<Item = &mut PlaybackEngine<S>> {
        self.engines.iter_mut().filter(|engine| engine.busy)
    }

    /// Advance every reserved engine's state machine
    pub fn poll(&mut self) {
        if self.policy.is_none() {
            return;
        }
        self.busy_mut().for_each(PlaybackEngine::poll);
    }

    pub fn stop_all(&mut self, ramp: bool) {
        if self.policy.is_none() {
            return;
        }
        self.busy_mut().for_each(|engine| engine.stop(ramp));
    }

    pub fn pause_all(&mut self, ramp: bool) {
        if self.policy.is_none() {
            return;
        }
        self.busy_mut().for_each(|engine| engine.pause(ramp));
    }

    pub fn resume_all(&mut self) {
        if self.policy.is_none() {
            return;
        }
        self.busy_mut().for_each(PlaybackEngine::resume);
    }

    /// Release every engine (shared policy; no-op otherwise)
    pub fn release_all(&mut self) {
        if self.require(PoolMode::Shared).is_err() {
            return;
        }
        for index in 0..self.engines.len() {
            self.release(EngineHandle(index));
        }
    }

    /// True if any source is playing or paused
    pub fn any_playing(&self) -> bool {
        self.engines.iter().any(|engine| {
            matches!(
                engine.source().status(),
                SourceStatus::Playing | SourceStatus::Paused
            )
        })
    }

    /// Number of reserved engines
    pub fn busy_count(&self) -> usize {
        self.engines.iter().filter(|engine| engine.busy).count()
    }

    /// External status of every engine in index order, without reserving any
    pub fn statuses(&self) -> Vec<PlaybackStatus> {
        self.engines.iter().map(PlaybackEngine::status).collect()
    }
}
