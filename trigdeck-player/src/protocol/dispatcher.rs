//! Command dispatcher
//!
//! Decodes request packets, validates payload length and channel number,
//! invokes pool operations and writes the response payload over the request
//! payload. Channels are 1-based on the wire and resolve to engines through
//! the pool's indexed policy.
//!
//! Validation always completes before the pool is touched: a rejected
//! request never changes engine state.

use crate::hal::{AudioSource, OutputMixer, PacketTransport, SourceError};
use crate::playback::{EngineHandle, EnginePool, PlaybackStatus, PoolError};
use thiserror::Error;
use tracing::{debug, info, warn};
use trigdeck_common::protocol::{
    decode_channel_volume, decode_output_volume, encode_channel_volume, encode_output_volume,
    Command, ErrorCode, Packet, PlayMode, MAX_PATH_LEN,
};

// ============================================================================
// Errors
// ============================================================================

/// Reasons a request is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("invalid channel {0}")]
    InvalidChannel(u8),

    #[error("invalid payload length {len} for {command:?}")]
    InvalidLength { command: Command, len: usize },

    #[error("invalid mode value {0}")]
    InvalidMode(u8),

    #[error("invalid file path length {0}")]
    InvalidFileLength(usize),

    #[error("playback start failed: {0}")]
    Playback(#[from] SourceError),

    #[error("engine pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("{0} volume rejected by mixer")]
    MixerRejected(&'static str),
}

impl DispatchError {
    /// Error code reported to the host; unknown commands get no response
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DispatchError::UnknownCommand(_) => None,
            DispatchError::InvalidChannel(_) => Some(ErrorCode::InvalidChannel),
            DispatchError::InvalidLength { .. } => Some(ErrorCode::InvalidLength),
            DispatchError::InvalidMode(_) => Some(ErrorCode::InvalidMode),
            DispatchError::InvalidFileLength(_) => Some(ErrorCode::InvalidFileLength),
            DispatchError::Playback(_) => Some(ErrorCode::Playing),
            DispatchError::Pool(_) | DispatchError::MixerRejected(_) => Some(ErrorCode::Internal),
        }
    }
}

type DispatchResult = Result<(), DispatchError>;

// ============================================================================
// Dispatcher
// ============================================================================

/// Stateless command dispatcher
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    version: [u8; 3],
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    /// Dispatcher reporting this crate's version
    pub fn new() -> Self {
        let part = |s: &str| s.parse::<u8>().unwrap_or(0);
        Self::with_version(
            part(env!("CARGO_PKG_VERSION_MAJOR")),
            part(env!("CARGO_PKG_VERSION_MINOR")),
            part(env!("CARGO_PKG_VERSION_PATCH")),
        )
    }

    pub fn with_version(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            version: [major, minor, patch],
        }
    }

    /// Handle at most one pending request
    ///
    /// Returns true when a packet was pulled from the transport.
    pub fn poll<S, T, M>(&self, transport: &mut T, pool: &mut EnginePool<S>, mixer: &mut M) -> bool
    where
        S: AudioSource,
        T: PacketTransport + ?Sized,
        M: OutputMixer + ?Sized,
    {
        let Some(mut packet) = transport.pull_packet() else {
            return false;
        };

        match self.handle(&mut packet, pool, mixer) {
            Ok(()) => transport.push_packet(&packet),
            Err(e) => match e.code() {
                Some(code) => {
                    warn!("Command 0x{:02x} rejected: {}", packet.cmd(), e);
                    transport.send_error_code(code);
                }
                None => warn!("Ignoring {}", e),
            },
        }

        true
    }

    /// Execute one request, leaving the response in `packet`
    pub fn handle<S, M>(
        &self,
        packet: &mut Packet,
        pool: &mut EnginePool<S>,
        mixer: &mut M,
    ) -> DispatchResult
    where
        S: AudioSource,
        M: OutputMixer + ?Sized,
    {
        let command = Command::try_from(packet.cmd())
            .map_err(|_| DispatchError::UnknownCommand(packet.cmd()))?;
        debug!("Command {:?} ({} byte payload)", command, packet.len());

        match command {
            Command::Hello => {
                packet.truncate(0);
                Ok(())
            }
            Command::Version => {
                packet.set_payload(&self.version);
                Ok(())
            }
            Command::PlayFile => on_play_file(packet, pool),
            Command::PlayChannel => on_play_channel(packet, pool),
            Command::Stop => on_stop(packet, pool),
            Command::StopAll => {
                pool.stop_all(true);
                packet.truncate(0);
                Ok(())
            }
            Command::Pause => on_pause(packet, pool),
            Command::PauseAll => {
                pool.pause_all(true);
                packet.truncate(0);
                Ok(())
            }
            Command::Resume => on_resume(packet, pool),
            Command::ResumeAll => {
                pool.resume_all();
                packet.truncate(0);
                Ok(())
            }
            Command::ChannelStatus => on_channel_status(packet, pool),
            Command::ChannelsStatus => on_channels_status(packet, pool),
            Command::GetChannelVolume => on_get_channel_volume(packet, pool),
            Command::SetChannelVolume => on_set_channel_volume(packet, pool),
            Command::GetSpeakersVolume => {
                expect_len(packet, command, 0)?;
                packet.set_payload(&encode_output_volume(mixer.speakers_volume()));
                Ok(())
            }
            Command::SetSpeakersVolume => {
                let db = output_volume(packet, command)?;
                if !mixer.set_speakers_volume(db) {
                    return Err(DispatchError::MixerRejected("speakers"));
                }
                info!("Speakers volume {:.1} dB", db);
                packet.truncate(0);
                Ok(())
            }
            Command::GetHeadphoneVolume => {
                expect_len(packet, command, 0)?;
                packet.set_payload(&encode_output_volume(mixer.headphone_volume()));
                Ok(())
            }
            Command::SetHeadphoneVolume => {
                let db = output_volume(packet, command)?;
                if !mixer.set_headphone_volume(db) {
                    return Err(DispatchError::MixerRejected("headphone"));
                }
                info!("Headphone volume {:.1} dB", db);
                packet.truncate(0);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn expect_len(packet: &Packet, command: Command, len: usize) -> DispatchResult {
    if packet.len() != len {
        return Err(DispatchError::InvalidLength {
            command,
            len: packet.len(),
        });
    }
    Ok(())
}

fn expect_min_len(packet: &Packet, command: Command, min: usize) -> DispatchResult {
    if packet.len() < min {
        return Err(DispatchError::InvalidLength {
            command,
            len: packet.len(),
        });
    }
    Ok(())
}

/// Resolve the 1-based channel in the first payload byte to an engine
fn verify<S: AudioSource>(
    packet: &Packet,
    command: Command,
    pool: &mut EnginePool<S>,
) -> Result<EngineHandle, DispatchError> {
    let Some(&channel) = packet.payload().first() else {
        return Err(DispatchError::InvalidLength { command, len: 0 });
    };

    if channel == 0 || usize::from(channel) > pool.capacity() {
        return Err(DispatchError::InvalidChannel(channel));
    }

    Ok(pool.get(usize::from(channel) - 1)?)
}

fn play_mode(value: u8) -> Result<PlayMode, DispatchError> {
    PlayMode::from_wire(value).ok_or(DispatchError::InvalidMode(value))
}

fn output_volume(packet: &Packet, command: Command) -> Result<f32, DispatchError> {
    expect_len(packet, command, 2)?;
    let payload = packet.payload();
    Ok(decode_output_volume([payload[0], payload[1]]))
}

// ============================================================================
// Channel commands
// ============================================================================

fn on_play_file<S: AudioSource>(packet: &mut Packet, pool: &mut EnginePool<S>) -> DispatchResult {
    expect_min_len(packet, Command::PlayFile, 3)?;

    // Path bytes may carry a NUL terminator from C hosts
    let raw_path = &packet.payload()[2..];
    let path_len = raw_path
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    if path_len == 0 || path_len > MAX_PATH_LEN {
        return Err(DispatchError::InvalidFileLength(path_len));
    }
    let path = String::from_utf8_lossy(&raw_path[..path_len]).into_owned();

    let mode = play_mode(packet.payload()[1])?;
    let handle = verify(packet, Command::PlayFile, pool)?;

    pool.engine_mut(handle).play(&path, mode)?;
    info!("Channel {} playing {} ({:?})", handle.index() + 1, path, mode);

    packet.truncate(1);
    Ok(())
}

fn on_play_channel<S: AudioSource>(
    packet: &mut Packet,
    pool: &mut EnginePool<S>,
) -> DispatchResult {
    expect_min_len(packet, Command::PlayChannel, 2)?;

    let mode = play_mode(packet.payload()[1])?;
    let handle = verify(packet, Command::PlayChannel, pool)?;

    let path = format!("{}.wav", packet.payload()[0]);
    pool.engine_mut(handle).play(&path, mode)?;
    info!("Channel {} playing {} ({:?})", handle.index() + 1, path, mode);

    packet.truncate(1);
    Ok(())
}

fn on_stop<S: AudioSource>(packet: &mut Packet, pool: &mut EnginePool<S>) -> DispatchResult {
    expect_len(packet, Command::Stop, 1)?;
    let handle = verify(packet, Command::Stop, pool)?;

    pool.engine_mut(handle).stop(true);
    Ok(())
}

fn on_pause<S: AudioSource>(packet: &mut Packet, pool: &mut EnginePool<S>) -> DispatchResult {
    expect_len(packet, Command::Pause, 1)?;
    let handle = verify(packet, Command::Pause, pool)?;

    let engine = pool.engine_mut(handle);
    let paused = if engine.status() == PlaybackStatus::Stopped {
        0
    } else {
        engine.pause(true);
        1
    };

    packet.set_payload(&[paused]);
    Ok(())
}

fn on_resume<S: AudioSource>(packet: &mut Packet, pool: &mut EnginePool<S>) -> DispatchResult {
    expect_len(packet, Command::Resume, 1)?;
    let handle = verify(packet, Command::Resume, pool)?;

    let engine = pool.engine_mut(handle);
    let resumed = if engine.status() == PlaybackStatus::Paused {
        engine.resume();
        1
    } else {
        0
    };

    packet.set_payload(&[resumed]);
    Ok(())
}

fn on_channel_status<S: AudioSource>(
    packet: &mut Packet,
    pool: &mut EnginePool<S>,
) -> DispatchResult {
    expect_len(packet, Command::ChannelStatus, 1)?;
    let handle = verify(packet, Command::ChannelStatus, pool)?;

    let status = pool.engine(handle).status();
    packet.set_payload(&[status.wire()]);
    Ok(())
}

fn on_channels_status<S: AudioSource>(
    packet: &mut Packet,
    pool: &mut EnginePool<S>,
) -> DispatchResult {
    let statuses: Vec<u8> = (0..pool.capacity())
        .map(|index| match pool.get(index) {
            Ok(handle) => pool.engine(handle).status().wire(),
            Err(_) => PlaybackStatus::Stopped.wire(),
        })
        .collect();

    packet.set_payload(&statuses);
    Ok(())
}

fn on_get_channel_volume<S: AudioSource>(
    packet: &mut Packet,
    pool: &mut EnginePool<S>,
) -> DispatchResult {
    expect_len(packet, Command::GetChannelVolume, 1)?;
    let handle = verify(packet, Command::GetChannelVolume, pool)?;

    let volume = pool.engine(handle).volume();
    packet.set_payload(&encode_channel_volume(volume));
    Ok(())
}

fn on_set_channel_volume<S: AudioSource>(
    packet: &mut Packet,
    pool: &mut EnginePool<S>,
) -> DispatchResult {
    expect_len(packet, Command::SetChannelVolume, 3)?;
    let handle = verify(packet, Command::SetChannelVolume, pool)?;

    let payload = packet.payload();
    let volume = decode_channel_volume([payload[1], payload[2]]);
    pool.engine_mut(handle).set_volume(volume);
    debug!("Channel {} volume {:.2}", handle.index() + 1, volume);

    packet.truncate(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{
        ManualClock, QueueTransport, Reply, SimAudioSource, SimCatalog, SimMixer, SimTiming,
    };
    use crate::playback::EngineState;
    use std::sync::Arc;
    use trigdeck_common::config::PoolMode;

    struct Rig {
        clock: Arc<ManualClock>,
        pool: EnginePool<SimAudioSource>,
        mixer: SimMixer,
        dispatcher: CommandDispatcher,
    }

    impl Rig {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new());
            let catalog = Arc::new(SimCatalog::Any);
            let mut pool = EnginePool::with_factory(4, |_| {
                SimAudioSource::new(
                    clock.clone(),
                    catalog.clone(),
                    SimTiming { ramp_ticks: 2, clip_ticks: 0 },
                )
            });
            pool.initialize(PoolMode::Indexed).unwrap();
            Self {
                clock,
                pool,
                mixer: SimMixer::default(),
                dispatcher: CommandDispatcher::with_version(1, 2, 3),
            }
        }

        fn send(&mut self, command: Command, payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
            let mut packet = Packet::new(command.id(), payload.to_vec()).unwrap();
            self.dispatcher
                .handle(&mut packet, &mut self.pool, &mut self.mixer)?;
            assert_eq!(packet.cmd(), command.id());
            Ok(packet.payload().to_vec())
        }

        fn tick(&mut self, ticks: u64) {
            for _ in 0..ticks {
                self.clock.advance(1);
                self.pool.poll();
            }
        }

        fn handle(&mut self, channel: usize) -> EngineHandle {
            self.pool.get(channel - 1).unwrap()
        }

        fn state(&mut self, channel: usize) -> EngineState {
            let handle = self.handle(channel);
            self.pool.engine(handle).state()
        }
    }

    #[test]
    fn test_hello_and_version() {
        let mut rig = Rig::new();
        assert_eq!(rig.send(Command::Hello, &[9, 9]), Ok(vec![]));
        assert_eq!(rig.send(Command::Version, &[]), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_default_version_matches_crate() {
        let dispatcher = CommandDispatcher::new();
        let expected: u8 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap();
        assert_eq!(dispatcher.version[0], expected);
    }

    #[test]
    fn test_play_file_too_short_is_invalid_length() {
        let mut rig = Rig::new();
        let err = rig.send(Command::PlayFile, &[1]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidLength));
        assert_eq!(rig.pool.busy_count(), 0);
    }

    #[test]
    fn test_play_file_validation() {
        let mut rig = Rig::new();

        let err = rig.send(Command::PlayFile, &[1, 0, 0, 0]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidFileLength));

        let err = rig.send(Command::PlayFile, &[1, 2, b'a']).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidMode));

        let err = rig.send(Command::PlayFile, &[0, 0, b'a']).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidChannel));

        let err = rig.send(Command::PlayFile, &[5, 0, b'a']).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidChannel));

        assert_eq!(rig.pool.busy_count(), 0);
    }

    #[test]
    fn test_play_file_starts_channel() {
        let mut rig = Rig::new();
        let mut payload = vec![2, 1];
        payload.extend_from_slice(b"intro.wav\0");

        assert_eq!(rig.send(Command::PlayFile, &payload), Ok(vec![2]));
        assert_eq!(rig.state(2), EngineState::Playing);
        let handle = rig.handle(2);
        let source = rig.pool.engine(handle).source();
        assert_eq!(source.path(), Some("intro.wav"));
    }

    #[test]
    fn test_play_failure_reports_playing_error() {
        let mut rig = Rig::new();
        let mut payload = vec![1, 0];
        payload.extend_from_slice(b"notes.txt");

        let err = rig.send(Command::PlayFile, &payload).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Playing));
        assert_eq!(rig.state(1), EngineState::Stopped);
    }

    #[test]
    fn test_play_channel_uses_numbered_file() {
        let mut rig = Rig::new();
        assert_eq!(rig.send(Command::PlayChannel, &[3, 1]), Ok(vec![3]));
        let handle = rig.handle(3);
        let source = rig.pool.engine(handle).source();
        assert_eq!(source.path(), Some("3.wav"));

        let err = rig.send(Command::PlayChannel, &[3]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidLength));
    }

    #[test]
    fn test_channel_zero_is_invalid() {
        let mut rig = Rig::new();
        for command in [Command::Stop, Command::Pause, Command::Resume, Command::ChannelStatus] {
            let err = rig.send(command, &[0]).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::InvalidChannel), "{:?}", command);
        }
        assert_eq!(rig.pool.busy_count(), 0);
    }

    #[test]
    fn test_stop_ramps_down() {
        let mut rig = Rig::new();
        rig.send(Command::PlayChannel, &[1, 0]).unwrap();

        assert_eq!(rig.send(Command::Stop, &[1]), Ok(vec![1]));
        assert_eq!(rig.state(1), EngineState::Stopping);
        assert_eq!(rig.send(Command::ChannelStatus, &[1]), Ok(vec![0]));

        rig.tick(3);
        assert_eq!(rig.state(1), EngineState::Stopped);

        let err = rig.send(Command::Stop, &[1, 2]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidLength));
    }

    #[test]
    fn test_pause_and_resume_responses() {
        let mut rig = Rig::new();
        assert_eq!(rig.send(Command::Pause, &[1]), Ok(vec![0]));
        assert_eq!(rig.send(Command::Resume, &[1]), Ok(vec![0]));

        rig.send(Command::PlayChannel, &[1, 1]).unwrap();
        assert_eq!(rig.send(Command::Pause, &[1]), Ok(vec![1]));
        assert_eq!(rig.send(Command::ChannelStatus, &[1]), Ok(vec![2]));

        rig.tick(3);
        assert_eq!(rig.state(1), EngineState::Paused);
        assert_eq!(rig.send(Command::Resume, &[1]), Ok(vec![1]));
        assert_eq!(rig.state(1), EngineState::Playing);
    }

    #[test]
    fn test_channels_status_reports_every_channel() {
        let mut rig = Rig::new();
        rig.send(Command::PlayChannel, &[2, 0]).unwrap();
        rig.send(Command::PlayChannel, &[4, 1]).unwrap();
        rig.send(Command::Pause, &[4]).unwrap();

        assert_eq!(rig.send(Command::ChannelsStatus, &[]), Ok(vec![0, 1, 0, 2]));
    }

    #[test]
    fn test_all_commands_touch_busy_channels() {
        let mut rig = Rig::new();
        rig.send(Command::PlayChannel, &[1, 1]).unwrap();
        rig.send(Command::PlayChannel, &[2, 1]).unwrap();

        assert_eq!(rig.send(Command::PauseAll, &[]), Ok(vec![]));
        rig.tick(3);
        assert_eq!(rig.state(1), EngineState::Paused);
        assert_eq!(rig.state(2), EngineState::Paused);

        assert_eq!(rig.send(Command::ResumeAll, &[]), Ok(vec![]));
        assert_eq!(rig.state(1), EngineState::Playing);

        assert_eq!(rig.send(Command::StopAll, &[7]), Ok(vec![]));
        rig.tick(3);
        assert_eq!(rig.state(1), EngineState::Stopped);
        assert_eq!(rig.state(2), EngineState::Stopped);
    }

    #[test]
    fn test_channel_volume_is_clamped() {
        let mut rig = Rig::new();
        let raw = 999u16.to_le_bytes();

        assert_eq!(rig.send(Command::SetChannelVolume, &[1, raw[0], raw[1]]), Ok(vec![]));
        let handle = rig.handle(1);
        assert_eq!(rig.pool.engine(handle).volume(), 5.0);
        assert_eq!(
            rig.send(Command::GetChannelVolume, &[1]),
            Ok(500u16.to_le_bytes().to_vec())
        );

        let err = rig.send(Command::SetChannelVolume, &[1, raw[0]]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidLength));
    }

    #[test]
    fn test_output_volumes() {
        let mut rig = Rig::new();
        let raw = (-125i16).to_le_bytes();

        assert_eq!(rig.send(Command::SetSpeakersVolume, &raw), Ok(vec![]));
        assert_eq!(rig.send(Command::GetSpeakersVolume, &[]), Ok(raw.to_vec()));

        let raw = 60i16.to_le_bytes();
        assert_eq!(rig.send(Command::SetHeadphoneVolume, &raw), Ok(vec![]));
        assert_eq!(rig.send(Command::GetHeadphoneVolume, &[]), Ok(raw.to_vec()));

        let err = rig.send(Command::GetSpeakersVolume, &[0]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidLength));
    }

    #[test]
    fn test_mixer_rejection_is_internal_error() {
        let mut rig = Rig::new();
        let raw = 500i16.to_le_bytes();
        let err = rig.send(Command::SetHeadphoneVolume, &raw).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Internal));
    }

    #[test]
    fn test_unknown_command_has_no_response() {
        let mut rig = Rig::new();
        let mut transport = QueueTransport::new();
        transport.submit(Packet::empty(0x7f));

        assert!(rig
            .dispatcher
            .poll(&mut transport, &mut rig.pool, &mut rig.mixer));
        assert!(transport.take_replies().is_empty());
        assert!(!rig.dispatcher.poll(&mut transport, &mut rig.pool, &mut rig.mixer));
    }

    #[test]
    fn test_poll_pushes_response_or_error() {
        let mut rig = Rig::new();
        let mut transport = QueueTransport::new();
        transport.submit(Packet::new(Command::ChannelStatus.id(), vec![1]).unwrap());
        transport.submit(Packet::new(Command::ChannelStatus.id(), vec![9]).unwrap());

        rig.dispatcher
            .poll(&mut transport, &mut rig.pool, &mut rig.mixer);
        rig.dispatcher
            .poll(&mut transport, &mut rig.pool, &mut rig.mixer);

        assert_eq!(
            transport.take_replies(),
            vec![
                Reply::Packet(Packet::new(Command::ChannelStatus.id(), vec![0]).unwrap()),
                Reply::Error(ErrorCode::InvalidChannel),
            ]
        );
    }

    #[test]
    fn test_shared_pool_rejects_channel_commands() {
        let clock = Arc::new(ManualClock::new());
        let mut pool = EnginePool::with_factory(2, |_| {
            SimAudioSource::new(clock.clone(), Arc::new(SimCatalog::Any), SimTiming::default())
        });
        pool.initialize(PoolMode::Shared).unwrap();
        let mut packet = Packet::new(Command::ChannelStatus.id(), vec![1]).unwrap();

        let err = CommandDispatcher::new()
            .handle(&mut packet, &mut pool, &mut SimMixer::default())
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Internal));
    }
}
