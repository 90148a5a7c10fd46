//! Message kinds, wire layouts, and the frame decoder.
//!
//! Every frame starts with a one-byte type code, followed by a big-endian
//! payload. Most kinds have a fixed payload size. Pulse lists and pulse blocks
//! carry a short prefix from which the remaining length is computed.
//!
//! Sample-bearing kinds begin with a _tick_: the two least significant bytes of
//! the device's millisecond clock. Full timestamps only arrive in [`Header`]
//! and [`Timestamp`] messages (and pulse blocks, which carry their own).

use serde::Serialize;
use thiserror::Error;
use zerocopy::{
    FromBytes,
    byteorder::big_endian::{F32, I16, I32, I64, U16, U64},
};

use super::check::{MAX_CHANNELS, sample_width};

/// A kind of message, identified on the wire by its type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MessageKind {
    Header,
    Heartbeat,
    Timestamp,
    AfeSettings,
    PpgRaw,
    PpgRawAll,
    AccRaw,
    GyroRaw,
    ImuRaw,
    Temperature,
    HeartRate,
    BatteryDiagnostics,
    PulseRawList,
    PulseBlockEcg,
    PulseBlockPpg,
}

/// How the length of a frame is determined.
#[derive(Debug, Clone, Copy)]
pub enum Layout {
    /// The payload always has this many bytes.
    Fixed(usize),
    /// The payload starts with `prefix` bytes, from which `body` computes the
    /// number of bytes that follow.
    Prefixed {
        prefix: usize,
        body: fn(&[u8]) -> usize,
    },
}

impl MessageKind {
    pub const ALL: [MessageKind; 15] = [
        MessageKind::Header,
        MessageKind::Heartbeat,
        MessageKind::Timestamp,
        MessageKind::AfeSettings,
        MessageKind::PpgRaw,
        MessageKind::PpgRawAll,
        MessageKind::AccRaw,
        MessageKind::GyroRaw,
        MessageKind::ImuRaw,
        MessageKind::Temperature,
        MessageKind::HeartRate,
        MessageKind::BatteryDiagnostics,
        MessageKind::PulseRawList,
        MessageKind::PulseBlockEcg,
        MessageKind::PulseBlockPpg,
    ];

    /// The type code introducing frames of this kind.
    pub const fn code(self) -> u8 {
        match self {
            MessageKind::Header => 0x01,
            MessageKind::Heartbeat => 0x02,
            MessageKind::Timestamp => 0x71,
            MessageKind::AfeSettings => 0xA1,
            MessageKind::PpgRaw => 0xA2,
            MessageKind::PpgRawAll => 0xA3,
            MessageKind::AccRaw => 0xA4,
            MessageKind::GyroRaw => 0xA5,
            MessageKind::ImuRaw => 0xA6,
            MessageKind::Temperature => 0xA7,
            MessageKind::HeartRate => 0xA8,
            MessageKind::BatteryDiagnostics => 0xA9,
            MessageKind::PulseRawList => 0xAA,
            MessageKind::PulseBlockEcg => 0xAB,
            MessageKind::PulseBlockPpg => 0xAC,
        }
    }

    /// Look up the kind introduced by a type code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// The payload layout of this kind.
    pub fn layout(self) -> Layout {
        match self {
            MessageKind::Header => Layout::Fixed(size_of::<HeaderWire>()),
            MessageKind::Heartbeat => Layout::Fixed(size_of::<HeartbeatWire>()),
            MessageKind::Timestamp => Layout::Fixed(size_of::<TimestampWire>()),
            MessageKind::AfeSettings => Layout::Fixed(size_of::<AfeSettingsWire>()),
            MessageKind::PpgRaw => Layout::Fixed(size_of::<PpgRawWire>()),
            MessageKind::PpgRawAll => Layout::Fixed(size_of::<PpgRawAllWire>()),
            MessageKind::AccRaw | MessageKind::GyroRaw => Layout::Fixed(size_of::<AxesWire>()),
            MessageKind::ImuRaw => Layout::Fixed(size_of::<ImuRawWire>()),
            MessageKind::Temperature => Layout::Fixed(size_of::<TemperatureWire>()),
            MessageKind::HeartRate => Layout::Fixed(size_of::<HeartRateWire>()),
            MessageKind::BatteryDiagnostics => Layout::Fixed(size_of::<BatteryWire>()),
            MessageKind::PulseRawList => Layout::Prefixed {
                prefix: size_of::<PulseListPrefix>(),
                body: pulse_list_body,
            },
            MessageKind::PulseBlockEcg | MessageKind::PulseBlockPpg => Layout::Prefixed {
                prefix: size_of::<PulseBlockPrefix>(),
                body: pulse_block_body,
            },
        }
    }
}

/// Body size of a pulse list. Invalid prefixes claim no body, so the decoder
/// rejects them without the window growing past [`MAX_FRAME`](super::frame::MAX_FRAME).
fn pulse_list_body(prefix: &[u8]) -> usize {
    let Ok(p) = PulseListPrefix::read_from_bytes(prefix) else {
        return 0;
    };
    if p.ecgs > MAX_CHANNELS || p.ppgs > MAX_CHANNELS {
        return 0;
    }

    match sample_width(p.format) {
        Some(width) => (p.ecgs as usize + p.ppgs as usize) * width,
        None => 0,
    }
}

fn pulse_block_body(prefix: &[u8]) -> usize {
    match PulseBlockPrefix::read_from_bytes(prefix) {
        Ok(p) => p.count as usize * size_of::<I32>(),
        Err(_) => 0,
    }
}

/// A decoded message, with the position it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Absolute byte offset of the type code in the input.
    pub offset: u64,
    /// Number of bytes the frame occupied, type code included.
    pub len: usize,
    pub payload: Payload,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// The kind-specific content of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Header(Header),
    Heartbeat(Heartbeat),
    Timestamp(Timestamp),
    AfeSettings(AfeSettings),
    PpgRaw(PpgRaw),
    PpgRawAll(PpgRawAll),
    AccRaw(Axes),
    GyroRaw(Axes),
    ImuRaw(ImuRaw),
    Temperature(Temperature),
    HeartRate(HeartRate),
    BatteryDiagnostics(BatteryDiagnostics),
    PulseRawList(PulseRawList),
    PulseBlockEcg(PulseBlock),
    PulseBlockPpg(PulseBlock),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Header(_) => MessageKind::Header,
            Payload::Heartbeat(_) => MessageKind::Heartbeat,
            Payload::Timestamp(_) => MessageKind::Timestamp,
            Payload::AfeSettings(_) => MessageKind::AfeSettings,
            Payload::PpgRaw(_) => MessageKind::PpgRaw,
            Payload::PpgRawAll(_) => MessageKind::PpgRawAll,
            Payload::AccRaw(_) => MessageKind::AccRaw,
            Payload::GyroRaw(_) => MessageKind::GyroRaw,
            Payload::ImuRaw(_) => MessageKind::ImuRaw,
            Payload::Temperature(_) => MessageKind::Temperature,
            Payload::HeartRate(_) => MessageKind::HeartRate,
            Payload::BatteryDiagnostics(_) => MessageKind::BatteryDiagnostics,
            Payload::PulseRawList(_) => MessageKind::PulseRawList,
            Payload::PulseBlockEcg(_) => MessageKind::PulseBlockEcg,
            Payload::PulseBlockPpg(_) => MessageKind::PulseBlockPpg,
        }
    }

    /// The monotonic sequence counter carried by this message, if any.
    pub fn sequence(&self) -> Option<u16> {
        match self {
            Payload::Heartbeat(h) => Some(h.sequence),
            _ => None,
        }
    }
}

/// Device metadata, written when logging starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub serial: i64,
    pub firmware: [u8; 3],
    /// Full device time, in milliseconds since the epoch.
    pub current_time: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub sequence: u16,
}

/// A full device time, in milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    pub current_time: u64,
}

/// Analog front-end configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AfeSettings {
    pub tick: u16,
    pub rf_gain: u8,
    pub cf_value: u8,
    pub ecg_gain: u8,
    pub ioffdac_range: u8,
    pub led1: i32,
    pub led4: i32,
    pub off_dac: i32,
    pub relative_gain: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpgRaw {
    pub tick: u16,
    pub ecg: i32,
    pub ppg: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpgRawAll {
    pub tick: u16,
    pub ecg: i32,
    pub ppg: i32,
    pub ppg_red: i32,
    pub ppg_ir: i32,
}

/// A three-axis sample, from an accelerometer or gyroscope.
#[derive(Debug, Clone, PartialEq)]
pub struct Axes {
    pub tick: u16,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuRaw {
    pub tick: u16,
    pub acc: [i16; 3],
    pub gyro: [i16; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Temperature {
    pub tick: u16,
    pub temperature: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRate {
    pub tick: u16,
    pub rate: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryDiagnostics {
    pub tick: u16,
    /// Millivolts.
    pub voltage: u16,
    /// Milliamperes.
    pub current: i16,
    /// Tenths of a degree Celsius.
    pub temperature: i16,
    pub remaining_capacity: u16,
    pub full_capacity: u16,
    pub remaining_energy: u16,
    pub full_energy: u16,
}

/// One sample per ECG and PPG channel, taken at the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseRawList {
    pub tick: u16,
    pub ecgs: Vec<i32>,
    pub ppgs: Vec<i32>,
}

/// Consecutive samples from a single channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseBlock {
    /// Full device time of the first sample, in milliseconds.
    pub time: u64,
    pub channel: u8,
    pub samples: Vec<i32>,
}

/// A failure to decode the frame at an offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to decode at offset {offset} ({inspected} bytes inspected): {reason}")]
pub struct DecodeError {
    /// Absolute byte offset where the failed frame started.
    pub offset: u64,
    pub reason: DecodeReason,
    /// Number of bytes looked at before giving up.
    pub inspected: usize,
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum DecodeReason {
    /// The type code matches no known message kind.
    #[error("Unknown message type ({0:#04x}).")]
    UnknownType(u8),
    /// The payload violates a structural constraint of its kind.
    #[error("Invalid {kind:?} payload: {detail}.")]
    InvalidPayload {
        kind: MessageKind,
        detail: &'static str,
    },
    /// The input ended inside a frame.
    #[error("Input ended inside a frame.")]
    Truncated,
    /// The window handed to the decoder does not fit the kind's layout.
    #[error("Window of {found} bytes does not fit the {kind:?} layout.")]
    LengthMismatch { kind: MessageKind, found: usize },
}

/// Decode a window proposed by the frame scanner.
///
/// `offset` is the absolute position of the window, recorded on the message or
/// error. This function never panics on malformed input.
pub fn decode(window: &[u8], offset: u64) -> Result<Message, DecodeError> {
    let fail = |reason| DecodeError {
        offset,
        reason,
        inspected: window.len(),
    };

    let Some((&code, r)) = window.split_first() else {
        return Err(fail(DecodeReason::Truncated));
    };

    let kind = MessageKind::from_code(code).ok_or_else(|| fail(DecodeReason::UnknownType(code)))?;
    let payload = decode_payload(kind, r).map_err(fail)?;

    Ok(Message {
        offset,
        len: window.len(),
        payload,
    })
}

fn decode_payload(kind: MessageKind, r: &[u8]) -> Result<Payload, DecodeReason> {
    let mismatch = || DecodeReason::LengthMismatch {
        kind,
        found: r.len() + 1,
    };

    fn read<W: FromBytes>(
        r: &[u8],
        mismatch: impl Fn() -> DecodeReason,
    ) -> Result<W, DecodeReason> {
        W::read_from_bytes(r).map_err(|_| mismatch())
    }

    let payload = match kind {
        MessageKind::Header => {
            let w: HeaderWire = read(r, mismatch)?;
            Payload::Header(Header {
                serial: w.serial.get(),
                firmware: w.firmware,
                current_time: w.current_time.get(),
            })
        }
        MessageKind::Heartbeat => {
            let w: HeartbeatWire = read(r, mismatch)?;
            Payload::Heartbeat(Heartbeat {
                sequence: w.sequence.get(),
            })
        }
        MessageKind::Timestamp => {
            let w: TimestampWire = read(r, mismatch)?;
            Payload::Timestamp(Timestamp {
                current_time: w.current_time.get(),
            })
        }
        MessageKind::AfeSettings => {
            let w: AfeSettingsWire = read(r, mismatch)?;
            Payload::AfeSettings(AfeSettings {
                tick: w.tick.get(),
                rf_gain: w.rf_gain,
                cf_value: w.cf_value,
                ecg_gain: w.ecg_gain,
                ioffdac_range: w.ioffdac_range,
                led1: w.led1.get(),
                led4: w.led4.get(),
                off_dac: w.off_dac.get(),
                relative_gain: w.relative_gain.get(),
            })
        }
        MessageKind::PpgRaw => {
            let w: PpgRawWire = read(r, mismatch)?;
            Payload::PpgRaw(PpgRaw {
                tick: w.tick.get(),
                ecg: w.ecg.get(),
                ppg: w.ppg.get(),
            })
        }
        MessageKind::PpgRawAll => {
            let w: PpgRawAllWire = read(r, mismatch)?;
            Payload::PpgRawAll(PpgRawAll {
                tick: w.tick.get(),
                ecg: w.ecg.get(),
                ppg: w.ppg.get(),
                ppg_red: w.ppg_red.get(),
                ppg_ir: w.ppg_ir.get(),
            })
        }
        MessageKind::AccRaw | MessageKind::GyroRaw => {
            let w: AxesWire = read(r, mismatch)?;
            let axes = Axes {
                tick: w.tick.get(),
                x: w.x.get(),
                y: w.y.get(),
                z: w.z.get(),
            };
            if kind == MessageKind::AccRaw {
                Payload::AccRaw(axes)
            } else {
                Payload::GyroRaw(axes)
            }
        }
        MessageKind::ImuRaw => {
            let w: ImuRawWire = read(r, mismatch)?;
            Payload::ImuRaw(ImuRaw {
                tick: w.tick.get(),
                acc: w.acc.map(|v| v.get()),
                gyro: w.gyro.map(|v| v.get()),
            })
        }
        MessageKind::Temperature => {
            let w: TemperatureWire = read(r, mismatch)?;
            Payload::Temperature(Temperature {
                tick: w.tick.get(),
                temperature: w.temperature.get(),
            })
        }
        MessageKind::HeartRate => {
            let w: HeartRateWire = read(r, mismatch)?;
            Payload::HeartRate(HeartRate {
                tick: w.tick.get(),
                rate: w.rate.get(),
            })
        }
        MessageKind::BatteryDiagnostics => {
            let w: BatteryWire = read(r, mismatch)?;
            Payload::BatteryDiagnostics(BatteryDiagnostics {
                tick: w.tick.get(),
                voltage: w.voltage.get(),
                current: w.current.get(),
                temperature: w.temperature.get(),
                remaining_capacity: w.remaining_capacity.get(),
                full_capacity: w.full_capacity.get(),
                remaining_energy: w.remaining_energy.get(),
                full_energy: w.full_energy.get(),
            })
        }
        MessageKind::PulseRawList => Payload::PulseRawList(decode_pulse_list(r, mismatch)?),
        MessageKind::PulseBlockEcg => {
            Payload::PulseBlockEcg(decode_pulse_block(kind, r, mismatch)?)
        }
        MessageKind::PulseBlockPpg => {
            Payload::PulseBlockPpg(decode_pulse_block(kind, r, mismatch)?)
        }
    };

    Ok(payload)
}

fn decode_pulse_list(
    r: &[u8],
    mismatch: impl Fn() -> DecodeReason,
) -> Result<PulseRawList, DecodeReason> {
    let invalid = |detail| DecodeReason::InvalidPayload {
        kind: MessageKind::PulseRawList,
        detail,
    };

    let (prefix, body) = PulseListPrefix::read_from_prefix(r).map_err(|_| mismatch())?;

    let width = sample_width(prefix.format).ok_or_else(|| invalid("reserved sample width"))?;
    if prefix.ecgs > MAX_CHANNELS || prefix.ppgs > MAX_CHANNELS {
        Err(invalid("too many channels"))?;
    }

    let (ecgs, ppgs) = (prefix.ecgs as usize, prefix.ppgs as usize);
    if body.len() != (ecgs + ppgs) * width {
        Err(mismatch())?;
    }

    let mut samples = body.chunks_exact(width).map(read_sample);
    let ecgs = samples.by_ref().take(ecgs).collect();
    let ppgs = samples.collect();

    Ok(PulseRawList {
        tick: prefix.tick.get(),
        ecgs,
        ppgs,
    })
}

fn decode_pulse_block(
    kind: MessageKind,
    r: &[u8],
    mismatch: impl Fn() -> DecodeReason,
) -> Result<PulseBlock, DecodeReason> {
    let invalid = |detail| DecodeReason::InvalidPayload { kind, detail };

    let (prefix, body) = PulseBlockPrefix::read_from_prefix(r).map_err(|_| mismatch())?;

    if prefix.channel >= MAX_CHANNELS {
        Err(invalid("channel out of range"))?;
    }
    if prefix.count == 0 {
        Err(invalid("empty block"))?;
    }
    if body.len() != prefix.count as usize * size_of::<I32>() {
        Err(mismatch())?;
    }

    let samples = body.chunks_exact(size_of::<I32>()).map(read_sample).collect();

    Ok(PulseBlock {
        time: prefix.time.get(),
        channel: prefix.channel,
        samples,
    })
}

/// Read a big-endian, sign-extended sample of two to four bytes.
fn read_sample(c: &[u8]) -> i32 {
    let unsigned = c.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
    let shift = 32 - 8 * c.len() as u32;
    ((unsigned << shift) as i32) >> shift
}

#[repr(C)]
#[derive(FromBytes)]
struct HeaderWire {
    serial: I64,
    firmware: [u8; 3],
    current_time: U64,
}

#[repr(C)]
#[derive(FromBytes)]
struct HeartbeatWire {
    sequence: U16,
}

#[repr(C)]
#[derive(FromBytes)]
struct TimestampWire {
    current_time: U64,
}

#[repr(C)]
#[derive(FromBytes)]
struct AfeSettingsWire {
    tick: U16,
    rf_gain: u8,
    cf_value: u8,
    ecg_gain: u8,
    ioffdac_range: u8,
    led1: I32,
    led4: I32,
    off_dac: I32,
    relative_gain: F32,
}

#[repr(C)]
#[derive(FromBytes)]
struct PpgRawWire {
    tick: U16,
    ecg: I32,
    ppg: I32,
}

#[repr(C)]
#[derive(FromBytes)]
struct PpgRawAllWire {
    tick: U16,
    ecg: I32,
    ppg: I32,
    ppg_red: I32,
    ppg_ir: I32,
}

#[repr(C)]
#[derive(FromBytes)]
struct AxesWire {
    tick: U16,
    x: I16,
    y: I16,
    z: I16,
}

#[repr(C)]
#[derive(FromBytes)]
struct ImuRawWire {
    tick: U16,
    acc: [I16; 3],
    gyro: [I16; 3],
}

#[repr(C)]
#[derive(FromBytes)]
struct TemperatureWire {
    tick: U16,
    temperature: I16,
}

#[repr(C)]
#[derive(FromBytes)]
struct HeartRateWire {
    tick: U16,
    rate: U16,
}

#[repr(C)]
#[derive(FromBytes)]
struct BatteryWire {
    tick: U16,
    voltage: U16,
    current: I16,
    temperature: I16,
    remaining_capacity: U16,
    full_capacity: U16,
    remaining_energy: U16,
    full_energy: U16,
}

#[repr(C)]
#[derive(FromBytes)]
struct PulseListPrefix {
    tick: U16,
    format: u8,
    ecgs: u8,
    ppgs: u8,
}

#[repr(C)]
#[derive(FromBytes)]
struct PulseBlockPrefix {
    time: U64,
    channel: u8,
    count: u8,
}
