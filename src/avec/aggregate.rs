//! Grouping of decoded messages into timestamped record streams.

use std::{borrow::Cow, collections::BTreeMap};

use tracing::{debug, warn};

use crate::{
    export::{Row, Table, Value},
    sans::{
        check::MIN_TIMESTAMP,
        message::{Message, Payload},
        stats::{ParseStatistics, RecordStatistics, StreamCount, TimingStatistics},
    },
};

use self::{
    blocks::{BlockMerger, Signal},
    clock::Clock,
};

mod blocks;
mod clock;

/// Firmware from which PPG values are reported offset and inverted.
const PPG_ADJUST_FIRMWARE: [u8; 3] = [4, 0, 1];

/// When a record was sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Time {
    /// Milliseconds since the Unix epoch.
    Resolved(u64),
    /// No time reference was available to resolve the tick against.
    Unresolved { tick: u16 },
}

impl Time {
    pub fn resolved(&self) -> Option<u64> {
        match self {
            Time::Resolved(t) => Some(*t),
            Time::Unresolved { .. } => None,
        }
    }
}

impl From<Time> for Value {
    fn from(time: Time) -> Self {
        time.resolved().map_or(Value::Missing, Value::Time)
    }
}

/// A row of a stream, with its origin and time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<R> {
    /// Offset of the message the row came from.
    pub offset: u64,
    pub time: Time,
    pub row: R,
}

/// An ordered sequence of records of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStream<R> {
    pub name: &'static str,
    pub records: Vec<Record<R>>,
    /// Nominal sampling rate, when the stream has one.
    pub sample_frequency_hz: Option<f64>,
}

impl<R> RecordStream<R> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Vec::new(),
            sample_frequency_hz: None,
        }
    }

    fn push(&mut self, offset: u64, time: Time, row: R) {
        self.records.push(Record { offset, time, row });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record<R>> {
        self.records.iter()
    }

    /// Order by time (unresolved records first, in arrival order) and drop
    /// records repeating a resolved time.
    fn settle(&mut self) -> (&'static str, StreamCount) {
        self.records.sort_by_key(|r| r.time.resolved());

        let aggregated = self.records.len() as u64;
        self.records
            .dedup_by(|b, a| a.time.resolved().is_some() && a.time == b.time);

        let count = StreamCount {
            aggregated,
            exported: self.records.len() as u64,
        };
        (self.name, count)
    }
}

impl<R: Row> RecordStream<R> {
    /// Lay the stream out as a table, led by `timestamp` and `resolved`.
    pub fn table(&self) -> Table {
        let mut columns = vec![Cow::Borrowed("timestamp"), Cow::Borrowed("resolved")];
        if let Some(first) = self.records.first() {
            columns.extend(first.row.columns());
        }

        let rows = self
            .records
            .iter()
            .map(|r| {
                let mut values = vec![
                    Value::from(r.time),
                    Value::Bool(r.time.resolved().is_some()),
                ];
                values.extend(r.row.values());
                values
            })
            .collect();

        Table {
            name: self.name,
            columns,
            rows,
            sample_frequency_hz: self.sample_frequency_hz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct SensorRow {
    pub ecg: i32,
    pub ppg: i32,
}

/// Simultaneous samples of every pulse channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysioRow {
    pub ecg: Vec<Option<i32>>,
    pub ppg: Vec<Option<i32>>,
}

impl Row for PhysioRow {
    fn columns(&self) -> Vec<Cow<'static, str>> {
        let ecg = (0..self.ecg.len()).map(|i| Cow::Owned(format!("ecg_{i}")));
        let ppg = (0..self.ppg.len()).map(|i| Cow::Owned(format!("ppg_{i}")));
        ecg.chain(ppg).collect()
    }

    fn values(&self) -> Vec<Value> {
        self.ecg.iter().chain(&self.ppg).map(|v| Value::from(*v)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct AccRow {
    #[column("acc_x")]
    pub x: i16,
    #[column("acc_y")]
    pub y: i16,
    #[column("acc_z")]
    pub z: i16,
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct GyroRow {
    #[column("gyro_x")]
    pub x: i16,
    #[column("gyro_y")]
    pub y: i16,
    #[column("gyro_z")]
    pub z: i16,
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct TemperatureRow {
    pub temperature: i16,
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct HeartRateRow {
    #[column("heart_rate")]
    pub rate: u16,
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct AfeRow {
    pub rf_gain: u8,
    pub cf_value: u8,
    pub ecg_gain: u8,
    pub ioffdac_range: u8,
    pub led1: i32,
    pub led4: i32,
    pub off_dac: i32,
    pub relative_gain: f32,
}

#[derive(Debug, Clone, PartialEq, Row)]
pub struct BatteryRow {
    pub voltage: u16,
    pub current: i16,
    pub temperature: i16,
    pub remaining_capacity: u16,
    pub full_capacity: u16,
    pub remaining_energy: u16,
    pub full_energy: u16,
}

/// Device metadata, taken from the first header of a session.
#[derive(Debug, Clone, PartialEq, Row)]
pub struct DeviceInfo {
    /// Serial number, as 16 hexadecimal digits.
    pub serial: String,
    /// Firmware version, as `major.minor.patch`.
    pub firmware: String,
    pub start_time: Time,
}

/// The record streams of one parse session, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub device: Option<DeviceInfo>,
    pub sensor: RecordStream<SensorRow>,
    pub physio: RecordStream<PhysioRow>,
    pub acc: RecordStream<AccRow>,
    pub gyro: RecordStream<GyroRow>,
    pub temp: RecordStream<TemperatureRow>,
    pub hr: RecordStream<HeartRateRow>,
    pub afe: RecordStream<AfeRow>,
    pub battdiag: RecordStream<BatteryRow>,
}

impl Recording {
    fn new() -> Self {
        Self {
            device: None,
            sensor: RecordStream::new("sensor"),
            physio: RecordStream::new("physio"),
            acc: RecordStream::new("acc"),
            gyro: RecordStream::new("gyro"),
            temp: RecordStream::new("temp"),
            hr: RecordStream::new("hr"),
            afe: RecordStream::new("afe"),
            battdiag: RecordStream::new("battdiag"),
        }
    }

    /// Number of records across every stream.
    pub fn record_count(&self) -> usize {
        self.sensor.len()
            + self.physio.len()
            + self.acc.len()
            + self.gyro.len()
            + self.temp.len()
            + self.hr.len()
            + self.afe.len()
            + self.battdiag.len()
    }

    /// Every stream laid out as a table, empty streams included.
    pub fn tables(&self) -> Vec<Table> {
        vec![
            self.sensor.table(),
            self.physio.table(),
            self.acc.table(),
            self.gyro.table(),
            self.temp.table(),
            self.hr.table(),
            self.afe.table(),
            self.battdiag.table(),
        ]
    }

    /// The device information as a single-row table.
    pub fn device_table(&self) -> Option<Table> {
        self.device.as_ref().map(|d| Table {
            name: "device",
            columns: d.columns(),
            rows: vec![d.values()],
            sample_frequency_hz: None,
        })
    }

    /// Times of every record, with the offset of its message.
    fn times_mut(&mut self) -> impl Iterator<Item = (u64, &mut Time)> {
        fn times<R>(s: &mut RecordStream<R>) -> impl Iterator<Item = (u64, &mut Time)> {
            s.records.iter_mut().map(|r| (r.offset, &mut r.time))
        }

        times(&mut self.sensor)
            .chain(times(&mut self.physio))
            .chain(times(&mut self.acc))
            .chain(times(&mut self.gyro))
            .chain(times(&mut self.temp))
            .chain(times(&mut self.hr))
            .chain(times(&mut self.afe))
            .chain(times(&mut self.battdiag))
    }
}

/// Route decoded messages into record streams, resolving device ticks to full
/// timestamps.
///
/// Messages received before any time reference are kept with an unresolved
/// time, and resolved backwards from the first reference once it arrives.
#[derive(Debug, Clone)]
pub struct Aggregator {
    recording: Recording,
    clock: Clock,
    blocks: BlockMerger,
    samplerate: f64,
    firmware: Option<[u8; 3]>,
    /// Correction applied to PPG values, from the latest front-end settings.
    off_dac_correction: i32,
    /// Records currently awaiting a time reference.
    unresolved: usize,
    ingested: u64,
    timing: TimingStatistics,
}

impl Aggregator {
    /// Create an aggregator for a device sampling pulse blocks at `samplerate`
    /// hertz.
    pub fn new(samplerate: f64) -> Self {
        Self {
            recording: Recording::new(),
            clock: Clock::default(),
            blocks: BlockMerger::new(samplerate),
            samplerate,
            firmware: None,
            off_dac_correction: 0,
            unresolved: 0,
            ingested: 0,
            timing: TimingStatistics::default(),
        }
    }

    /// Number of messages ingested so far.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    pub fn ingest(&mut self, message: Message) {
        self.ingested += 1;
        let offset = message.offset;

        match message.payload {
            Payload::Header(h) => {
                if self.recording.device.is_none() {
                    let [major, minor, patch] = h.firmware;
                    self.recording.device = Some(DeviceInfo {
                        serial: format!("{:016x}", h.serial),
                        firmware: format!("{major}.{minor}.{patch}"),
                        start_time: Time::Resolved(h.current_time),
                    });
                    self.firmware = Some(h.firmware);
                }
                self.reference(offset, h.current_time);
            }
            Payload::Heartbeat(_) => {}
            Payload::Timestamp(t) => self.reference(offset, t.current_time),
            Payload::AfeSettings(a) => {
                self.off_dac_correction = (-(a.off_dac as f64) * a.relative_gain as f64) as i32;

                let time = self.tick(a.tick);
                let row = AfeRow {
                    rf_gain: a.rf_gain,
                    cf_value: a.cf_value,
                    ecg_gain: a.ecg_gain,
                    ioffdac_range: a.ioffdac_range,
                    led1: a.led1,
                    led4: a.led4,
                    off_dac: a.off_dac,
                    relative_gain: a.relative_gain,
                };
                self.recording.afe.push(offset, time, row);
            }
            Payload::PpgRaw(p) => {
                let time = self.tick(p.tick);
                let row = SensorRow {
                    ecg: p.ecg,
                    ppg: self.adjust_ppg(p.ppg),
                };
                self.recording.sensor.push(offset, time, row);
            }
            Payload::PpgRawAll(p) => {
                let time = self.tick(p.tick);
                let row = SensorRow {
                    ecg: p.ecg,
                    ppg: self.adjust_ppg(p.ppg),
                };
                self.recording.sensor.push(offset, time, row);
            }
            Payload::AccRaw(a) => {
                let time = self.tick(a.tick);
                let row = AccRow {
                    x: a.x,
                    y: a.y,
                    z: a.z,
                };
                self.recording.acc.push(offset, time, row);
            }
            Payload::GyroRaw(g) => {
                let time = self.tick(g.tick);
                let row = GyroRow {
                    x: g.x,
                    y: g.y,
                    z: g.z,
                };
                self.recording.gyro.push(offset, time, row);
            }
            Payload::ImuRaw(i) => {
                let time = self.tick(i.tick);
                let [x, y, z] = i.acc;
                self.recording.acc.push(offset, time, AccRow { x, y, z });

                // Both halves share one tick, but count as two records.
                if matches!(time, Time::Unresolved { .. }) {
                    self.unresolved += 1;
                }
                let [x, y, z] = i.gyro;
                self.recording.gyro.push(offset, time, GyroRow { x, y, z });
            }
            Payload::Temperature(t) => {
                let time = self.tick(t.tick);
                let row = TemperatureRow {
                    temperature: t.temperature,
                };
                self.recording.temp.push(offset, time, row);
            }
            Payload::HeartRate(h) => {
                let time = self.tick(h.tick);
                let row = HeartRateRow { rate: h.rate };
                self.recording.hr.push(offset, time, row);
            }
            Payload::BatteryDiagnostics(b) => {
                let time = self.tick(b.tick);
                let row = BatteryRow {
                    voltage: b.voltage,
                    current: b.current,
                    temperature: b.temperature,
                    remaining_capacity: b.remaining_capacity,
                    full_capacity: b.full_capacity,
                    remaining_energy: b.remaining_energy,
                    full_energy: b.full_energy,
                };
                self.recording.battdiag.push(offset, time, row);
            }
            Payload::PulseRawList(l) => {
                let time = self.tick(l.tick);
                let row = PhysioRow {
                    ecg: l.ecgs.into_iter().map(Some).collect(),
                    ppg: l.ppgs.into_iter().map(|v| Some(v.saturating_neg())).collect(),
                };
                self.recording.physio.push(offset, time, row);
            }
            Payload::PulseBlockEcg(b) => {
                self.blocks.ingest(Signal::Ecg, offset, b, &mut self.timing);
            }
            Payload::PulseBlockPpg(b) => {
                self.blocks.ingest(Signal::Ppg, offset, b, &mut self.timing);
            }
        }
    }

    /// Complete the recording, filling in the timing section of `stats`.
    ///
    /// Streams are ordered by time and stripped of repeated timestamps.
    pub fn finish(mut self, stats: &mut ParseStatistics) -> Recording {
        let has_blocks = !self.blocks.is_empty();
        let merged = self.blocks.finish();

        let physio = &mut self.recording.physio;
        physio.records.extend(merged);
        if has_blocks {
            physio.sample_frequency_hz = Some(self.samplerate);
        }

        // Rows from lists and blocks may cover different channels.
        let ecgs = physio.iter().map(|r| r.row.ecg.len()).max().unwrap_or(0);
        let ppgs = physio.iter().map(|r| r.row.ppg.len()).max().unwrap_or(0);
        for record in &mut physio.records {
            record.row.ecg.resize(ecgs, None);
            record.row.ppg.resize(ppgs, None);
        }

        let timing = &mut self.timing;
        for (_, time) in self.recording.times_mut() {
            match time.resolved() {
                Some(t) if t < MIN_TIMESTAMP => timing.too_old += 1,
                Some(_) => {}
                None => timing.unresolved += 1,
            }
        }

        let recording = &mut self.recording;
        let streams = BTreeMap::from([
            recording.sensor.settle(),
            recording.physio.settle(),
            recording.acc.settle(),
            recording.gyro.settle(),
            recording.temp.settle(),
            recording.hr.settle(),
            recording.afe.settle(),
            recording.battdiag.settle(),
        ]);
        let records = RecordStatistics {
            messages: self.ingested,
            streams,
        };
        timing.duplicate_timestamps = records.aggregated() - records.exported();

        if timing.unresolved > 0 {
            warn!(records = timing.unresolved, "no time reference for some records");
        }

        stats.timing = self.timing;
        stats.records = records;
        self.recording
    }

    fn tick(&mut self, tick: u16) -> Time {
        match self.clock.advance(tick) {
            Some(advance) => {
                if advance.jumped {
                    self.timing.forward_jumps += 1;
                }
                Time::Resolved(advance.time)
            }
            None => {
                self.unresolved += 1;
                Time::Unresolved { tick }
            }
        }
    }

    fn reference(&mut self, offset: u64, time: u64) {
        if !self.clock.latch(time) {
            debug!(offset, time, "rejected time reference");
            self.timing.rejected_references += 1;
            return;
        }

        if self.unresolved == 0 {
            return;
        }

        let mut pending: Vec<_> = self
            .recording
            .times_mut()
            .filter(|(_, t)| t.resolved().is_none())
            .collect();
        pending.sort_by_key(|(offset, _)| std::cmp::Reverse(*offset));

        let mut later = time;
        for (_, t) in pending {
            let Time::Unresolved { tick } = *t else {
                continue;
            };

            if let Some(resolved) = clock::resolve_backwards(later, tick) {
                *t = Time::Resolved(resolved);
                later = resolved;
                self.timing.resolved_retroactively += 1;
            }
        }

        debug!(
            offset,
            records = self.timing.resolved_retroactively,
            "resolved earlier records"
        );
        self.unresolved = 0;
    }

    fn adjust_ppg(&self, ppg: i32) -> i32 {
        match self.firmware {
            Some(f) if f >= PPG_ADJUST_FIRMWARE => {
                ppg.saturating_add(self.off_dac_correction).saturating_neg()
            }
            _ => ppg,
        }
    }
}
