#![allow(dead_code)]

use sprocket::{
    avec::{self, ParseOptions, Report},
    sans::{message::Message, parser::Mode},
};

/// A plausible device time, with low 16 bits of zero.
pub const T0: u64 = 1_600_000_000_000 & !0xFFFF;

pub fn header(serial: i64, firmware: [u8; 3], time: u64) -> Vec<u8> {
    let mut f = vec![0x01];
    f.extend(serial.to_be_bytes());
    f.extend(firmware);
    f.extend(time.to_be_bytes());
    f
}

pub fn heartbeat(sequence: u16) -> Vec<u8> {
    let mut f = vec![0x02];
    f.extend(sequence.to_be_bytes());
    f
}

pub fn timestamp(time: u64) -> Vec<u8> {
    let mut f = vec![0x71];
    f.extend(time.to_be_bytes());
    f
}

pub fn afe(tick: u16, off_dac: i32, relative_gain: f32) -> Vec<u8> {
    let mut f = vec![0xA1];
    f.extend(tick.to_be_bytes());
    f.extend([1, 2, 3, 4]);
    f.extend(100i32.to_be_bytes());
    f.extend(200i32.to_be_bytes());
    f.extend(off_dac.to_be_bytes());
    f.extend(relative_gain.to_be_bytes());
    f
}

pub fn ppg_raw(tick: u16, ecg: i32, ppg: i32) -> Vec<u8> {
    let mut f = vec![0xA2];
    f.extend(tick.to_be_bytes());
    f.extend(ecg.to_be_bytes());
    f.extend(ppg.to_be_bytes());
    f
}

pub fn ppg_raw_all(tick: u16, ecg: i32, ppg: i32, red: i32, ir: i32) -> Vec<u8> {
    let mut f = vec![0xA3];
    f.extend(tick.to_be_bytes());
    for v in [ecg, ppg, red, ir] {
        f.extend(v.to_be_bytes());
    }
    f
}

fn axes(code: u8, tick: u16, [x, y, z]: [i16; 3]) -> Vec<u8> {
    let mut f = vec![code];
    f.extend(tick.to_be_bytes());
    for v in [x, y, z] {
        f.extend(v.to_be_bytes());
    }
    f
}

pub fn acc(tick: u16, xyz: [i16; 3]) -> Vec<u8> {
    axes(0xA4, tick, xyz)
}

pub fn gyro(tick: u16, xyz: [i16; 3]) -> Vec<u8> {
    axes(0xA5, tick, xyz)
}

pub fn imu(tick: u16, acc: [i16; 3], gyro: [i16; 3]) -> Vec<u8> {
    let mut f = vec![0xA6];
    f.extend(tick.to_be_bytes());
    for v in acc.into_iter().chain(gyro) {
        f.extend(v.to_be_bytes());
    }
    f
}

pub fn temperature(tick: u16, temperature: i16) -> Vec<u8> {
    let mut f = vec![0xA7];
    f.extend(tick.to_be_bytes());
    f.extend(temperature.to_be_bytes());
    f
}

pub fn heart_rate(tick: u16, rate: u16) -> Vec<u8> {
    let mut f = vec![0xA8];
    f.extend(tick.to_be_bytes());
    f.extend(rate.to_be_bytes());
    f
}

pub fn battery(tick: u16, voltage: u16, current: i16) -> Vec<u8> {
    let mut f = vec![0xA9];
    f.extend(tick.to_be_bytes());
    f.extend(voltage.to_be_bytes());
    f.extend(current.to_be_bytes());
    for v in [250i16, 1000, 1200, 3700, 4400] {
        f.extend(v.to_be_bytes());
    }
    f
}

/// A pulse list with samples of `width` bytes (2, 3 or 4).
pub fn pulse_list(tick: u16, width: usize, ecgs: &[i32], ppgs: &[i32]) -> Vec<u8> {
    let format = match width {
        4 => 0,
        3 => 1,
        2 => 2,
        _ => panic!("unsupported width"),
    };

    let mut f = vec![0xAA];
    f.extend(tick.to_be_bytes());
    f.extend([format, ecgs.len() as u8, ppgs.len() as u8]);
    for v in ecgs.iter().chain(ppgs) {
        f.extend(&v.to_be_bytes()[4 - width..]);
    }
    f
}

fn pulse_block(code: u8, time: u64, channel: u8, samples: &[i32]) -> Vec<u8> {
    let mut f = vec![code];
    f.extend(time.to_be_bytes());
    f.extend([channel, samples.len() as u8]);
    for v in samples {
        f.extend(v.to_be_bytes());
    }
    f
}

pub fn ecg_block(time: u64, channel: u8, samples: &[i32]) -> Vec<u8> {
    pulse_block(0xAB, time, channel, samples)
}

pub fn ppg_block(time: u64, channel: u8, samples: &[i32]) -> Vec<u8> {
    pulse_block(0xAC, time, channel, samples)
}

pub fn concat(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

/// Insert `bytes` into an input at `at`.
pub fn corrupt(mut input: Vec<u8>, at: usize, bytes: &[u8]) -> Vec<u8> {
    let tail = input.split_off(at);
    input.extend_from_slice(bytes);
    input.extend(tail);
    input
}

/// Parse an in-memory input, collecting messages.
pub fn parse(input: &[u8], mode: Mode) -> (Vec<Message>, Report) {
    let mut messages = Vec::new();
    let options = ParseOptions::default().mode(mode);
    let report = avec::parse_slice(input, &mut messages, &options);
    (messages, report)
}

/// A varied session, starting with a header.
pub fn session() -> Vec<u8> {
    concat(&[
        header(0x0123_4567_89AB_CDEF, [4, 0, 1], T0 + 1000),
        heartbeat(1),
        afe(1000, 1000, 0.5),
        ppg_raw(1001, 10, 2000),
        acc(1002, [1, -2, 3]),
        pulse_list(1003, 3, &[-5, 6], &[7]),
        ecg_block(T0 + 1004, 0, &[1, 2, 3, 4]),
        heartbeat(2),
        ppg_block(T0 + 1004, 0, &[10, 20, 30, 40]),
        imu(1005, [4, 5, 6], [7, 8, 9]),
        temperature(1006, 312),
        heart_rate(1007, 61),
        battery(1008, 3900, -120),
        timestamp(T0 + 1009),
        ppg_raw_all(1010, 11, 2100, 3, 4),
        gyro(1011, [-1, -2, -3]),
        heartbeat(3),
    ])
}
