mod common;

use std::io::Cursor;

use common::*;
use either::Either::{Left, Right};
use pretty_assertions::assert_eq;
use sprocket::{
    avec::{self, Cancel, ParseOptions, Status},
    sans::{
        StreamParser,
        frame::{self, NeedMoreData},
        message::{self, DecodeReason, MessageKind, Payload},
        parser::{Event, Mode},
        resync::{self, Resync},
        stats::Anomaly,
    },
};

/// Bytes containing no known type code.
const GARBAGE: [u8; 5] = [0xFF, 0xEE, 0x00, 0x13, 0x37];

#[test]
fn lenient_and_strict_agree_on_valid_input() {
    let input = session();

    let (lenient, lenient_report) = parse(&input, Mode::Lenient);
    let (strict, strict_report) = parse(&input, Mode::Strict);

    assert_eq!(lenient, strict);
    assert_eq!(lenient_report, strict_report);
    assert_eq!(lenient_report.status, Status::Completed);
    assert!(lenient_report.statistics.errors.is_empty());
    assert_eq!(lenient_report.statistics.bytes_consumed, input.len() as u64);
    assert_eq!(lenient.len(), 17);
}

#[test]
fn single_corrupt_span_recovers() {
    let a = ppg_raw(1, 10, 20);
    let input = concat(&[
        a.clone(),
        GARBAGE.to_vec(),
        acc(2, [1, 2, 3]),
        ppg_raw(3, 11, 21),
    ]);

    let (messages, report) = parse(&input, Mode::Lenient);
    let stats = &report.statistics;

    assert_eq!(messages.len(), 3);
    assert_eq!(report.status, Status::Completed);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].offset, a.len() as u64);
    assert_eq!(stats.errors[0].reason, DecodeReason::UnknownType(0xFF));
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.skipped_bytes, GARBAGE.len() as u64);
    assert_eq!(stats.unrecovered_bytes, 0);
    assert_eq!(messages[1].offset, (a.len() + GARBAGE.len()) as u64);
}

#[test]
fn strict_mode_aborts_at_failure_offset() {
    let a = ppg_raw(1, 10, 20);
    let input = concat(&[
        a.clone(),
        GARBAGE.to_vec(),
        acc(2, [1, 2, 3]),
        ppg_raw(3, 11, 21),
    ]);

    let (messages, report) = parse(&input, Mode::Strict);

    assert_eq!(messages.len(), 1);
    assert_eq!(report.statistics.errors.len(), 1);
    assert!(report.is_aborted());

    let Status::Aborted(error) = report.status else {
        panic!("expected abort");
    };
    assert_eq!(error.offset, a.len() as u64);
    assert_eq!(error.reason, DecodeReason::UnknownType(0xFF));
}

#[test]
fn parsing_is_idempotent() {
    let input = corrupt(session(), 40, &GARBAGE);

    let first = parse(&input, Mode::Lenient);
    let second = parse(&input, Mode::Lenient);
    assert_eq!(first, second);

    let options = ParseOptions::default();
    let first = avec::read_recording(Cursor::new(&input), &options).unwrap();
    let second = avec::read_recording(Cursor::new(&input), &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn sequence_gap_is_detected() {
    let input = concat(&[heartbeat(1), heartbeat(2), heartbeat(4), heartbeat(5)]);

    let (_, report) = parse(&input, Mode::Lenient);
    let sequence = &report.statistics.sequence;

    assert_eq!(sequence.gaps, 1);
    assert_eq!(sequence.duplicates, 0);
    assert_eq!(sequence.anomalies.len(), 1);

    let anomaly = sequence.anomalies[0];
    assert_eq!(anomaly.kind, MessageKind::Heartbeat);
    assert_eq!(anomaly.offset, 6);
    assert_eq!((anomaly.expected, anomaly.actual), (3, 4));
    assert_eq!(anomaly.anomaly, Anomaly::Gap { missing: 1 });
}

#[test]
fn sequence_duplicates_do_not_move_expectation_back() {
    let input = concat(&[
        heartbeat(1),
        heartbeat(2),
        heartbeat(2),
        heartbeat(1),
        heartbeat(3),
    ]);

    let (_, report) = parse(&input, Mode::Lenient);
    let sequence = &report.statistics.sequence;

    assert_eq!(sequence.gaps, 0);
    assert_eq!(sequence.duplicates, 2);
    assert!(sequence.anomalies.iter().all(|a| a.anomaly == Anomaly::Duplicate));
}

#[test]
fn sequence_wraps() {
    let input = concat(&[
        heartbeat(u16::MAX - 1),
        heartbeat(u16::MAX),
        heartbeat(0),
        heartbeat(1),
    ]);

    let (_, report) = parse(&input, Mode::Lenient);
    assert!(report.statistics.sequence.anomalies.is_empty());
}

#[test]
fn trailing_garbage_is_one_error() {
    let a = ppg_raw(1, 10, 20);
    let b = acc(2, [1, 2, 3]);
    let valid = concat(&[a.clone(), b.clone(), a.clone()]);
    let input = concat(&[valid.clone(), GARBAGE.to_vec()]);

    let (messages, report) = parse(&input, Mode::Lenient);
    let stats = &report.statistics;

    assert_eq!(messages.len(), 3);
    assert_eq!(stats.count(MessageKind::PpgRaw), 2);
    assert_eq!(stats.count(MessageKind::AccRaw), 1);
    assert_eq!(stats.message_count(), 3);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].offset, valid.len() as u64);
    assert_eq!(stats.unrecovered_bytes, GARBAGE.len() as u64);
    assert_eq!(stats.resyncs, 0);

    let (recording, _) =
        avec::read_recording(Cursor::new(&input), &ParseOptions::default()).unwrap();
    assert_eq!(recording.record_count(), 3);
    assert_eq!(recording.sensor.len(), 2);
    assert_eq!(recording.acc.len(), 1);

    // Corruption between the first and second frames.
    let input = concat(&[a.clone(), GARBAGE.to_vec(), b, a]);
    let (messages, report) = parse(&input, Mode::Strict);

    assert_eq!(messages.len(), 1);
    assert!(report.is_aborted());
}

#[test]
fn reader_chunking_matches_slice() {
    let mut input = corrupt(session(), 25, &GARBAGE);
    input.extend([0xA4, 0x00]);

    let (expected, expected_report) = parse(&input, Mode::Lenient);

    for chunk_size in [1, 2, 7, 64, 16 * 1024] {
        let options = ParseOptions::default().chunk_size(chunk_size);
        let mut messages = Vec::new();
        let report = avec::parse_reader(&mut Cursor::new(&input), &mut messages, &options).unwrap();

        assert_eq!(messages, expected, "chunk size {chunk_size}");
        assert_eq!(report, expected_report, "chunk size {chunk_size}");
    }
}

#[test]
fn truncated_frame_at_end_of_input() {
    let a = ppg_raw(1, 10, 20);
    let b = acc(0x10, [0x11, 0x12, 0x13]);
    let input = concat(&[a.clone(), b[..5].to_vec()]);

    let (messages, report) = parse(&input, Mode::Lenient);
    let stats = &report.statistics;

    assert_eq!(messages.len(), 1);
    assert_eq!(report.status, Status::Completed);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].offset, a.len() as u64);
    assert_eq!(stats.errors[0].reason, DecodeReason::Truncated);
    assert_eq!(stats.unrecovered_bytes, 5);

    let (messages, report) = parse(&input, Mode::Strict);
    assert_eq!(messages.len(), 1);

    let Status::Aborted(error) = report.status else {
        panic!("expected abort");
    };
    assert_eq!(error.reason, DecodeReason::Truncated);
    assert_eq!(error.offset, a.len() as u64);
    assert_eq!(error.inspected, 5);
}

#[test]
fn cancelled_session_stops_after_current_message() {
    let cancel = Cancel::new();
    cancel.cancel();

    let options = ParseOptions::default().cancel(cancel.clone());
    let mut messages = Vec::new();
    let report = avec::parse_slice(&session(), &mut messages, &options);

    assert!(cancel.is_cancelled());
    assert_eq!(messages.len(), 1);
    assert_eq!(report.status, Status::Cancelled);
}

#[test]
fn parser_reports_need_for_more_data() {
    let a = ppg_raw(1, 10, 20);
    let mut parser = StreamParser::new(Mode::Lenient);

    parser.feed(&a[..4]);
    assert_eq!(parser.next(false), Event::NeedMoreData);

    parser.feed(&a[4..]);
    let Event::Message(message) = parser.next(false) else {
        panic!("expected message");
    };
    assert_eq!(message.offset, 0);
    assert_eq!(message.len, a.len());
    assert_eq!(parser.offset(), a.len() as u64);

    assert_eq!(parser.next(false), Event::NeedMoreData);
    assert_eq!(parser.next(true), Event::Done);
    assert_eq!(parser.next(true), Event::Done);
}

#[test]
fn aborted_parser_stays_aborted() {
    let mut parser = StreamParser::new(Mode::Strict);
    parser.feed(&GARBAGE);

    let Event::Aborted(first) = parser.next(true) else {
        panic!("expected abort");
    };
    assert_eq!(parser.next(true), Event::Aborted(first));
    assert_eq!(parser.stats().errors.len(), 1);
}

#[test]
fn scan_proposes_windows() {
    assert_eq!(frame::scan(&[]), Right(NeedMoreData { needed: 3 }));
    assert_eq!(frame::scan(&[0x02, 0x00]), Right(NeedMoreData { needed: 3 }));
    assert_eq!(frame::scan(&[0xFF, 0x00, 0x00]), Left(&[0xFF][..]));
    assert_eq!(frame::scan(&[0xFF]), Left(&[0xFF][..]));

    let block = ecg_block(T0, 1, &[1, 2, 3]);
    assert_eq!(frame::scan(&block[..5]), Right(NeedMoreData { needed: 11 }));
    assert_eq!(frame::scan(&block[..11]), Right(NeedMoreData { needed: 23 }));
    assert_eq!(frame::scan(&block), Left(&block[..]));

    let list = pulse_list(7, 2, &[1, 2], &[3]);
    let mut input = list.clone();
    input.extend(heartbeat(1));
    assert_eq!(frame::scan(&input), Left(&list[..]));
}

#[test]
fn scan_never_exceeds_largest_frame() {
    let mut input = vec![0xAA, 0x00, 0x00, 0x00, 0xFF, 0xFF];
    input.resize(4096, 0);

    let Left(window) = frame::scan(&input) else {
        panic!("expected window");
    };
    assert_eq!(window.len(), 6);

    let error = message::decode(window, 0).unwrap_err();
    assert!(matches!(
        error.reason,
        DecodeReason::InvalidPayload { kind: MessageKind::PulseRawList, .. }
    ));

    for format in 0..4 {
        for count in [0, 8, 9, 255] {
            input[3] = format;
            input[4] = count;
            input[5] = count;

            if let Left(window) = frame::scan(&input) {
                assert!(
                    window.len() <= frame::MAX_FRAME,
                    "format {format} count {count}"
                );
            }
        }
    }

    let block = ecg_block(T0, 0, &[0; 255]);
    assert_eq!(block.len(), frame::MAX_FRAME);
    assert_eq!(frame::scan(&block), Left(&block[..]));
}

#[test]
fn short_unknown_tail_is_unknown_type() {
    let a = ppg_raw(1, 10, 20);
    let input = concat(&[a.clone(), vec![0xFF, 0xEE]]);

    let (messages, report) = parse(&input, Mode::Lenient);
    let stats = &report.statistics;

    assert_eq!(messages.len(), 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].offset, a.len() as u64);
    assert_eq!(stats.errors[0].reason, DecodeReason::UnknownType(0xFF));
    assert_eq!(stats.unrecovered_bytes, 2);

    let (_, report) = parse(&input, Mode::Strict);
    let Status::Aborted(error) = report.status else {
        panic!("expected abort");
    };
    assert_eq!(error.reason, DecodeReason::UnknownType(0xFF));
    assert_eq!(error.inspected, 1);
}

#[test]
fn decode_sign_extends_pulse_samples() {
    let list = pulse_list(7, 3, &[-5, 0x7F_FFFF], &[-0x80_0000]);
    let message = message::decode(&list, 100).unwrap();

    assert_eq!(message.offset, 100);
    assert_eq!(message.len, list.len());

    let Payload::PulseRawList(payload) = message.payload else {
        panic!("expected pulse list");
    };
    assert_eq!(payload.tick, 7);
    assert_eq!(payload.ecgs, vec![-5, 0x7F_FFFF]);
    assert_eq!(payload.ppgs, vec![-0x80_0000]);
}

#[test]
fn decode_rejects_invalid_payloads() {
    let mut list = pulse_list(7, 2, &[1], &[]);
    list[3] = 3;
    let error = message::decode(&list, 0).unwrap_err();
    assert!(matches!(
        error.reason,
        DecodeReason::InvalidPayload { kind: MessageKind::PulseRawList, .. }
    ));

    let block = ecg_block(T0, 8, &[1]);
    let error = message::decode(&block, 0).unwrap_err();
    assert!(matches!(
        error.reason,
        DecodeReason::InvalidPayload { kind: MessageKind::PulseBlockEcg, .. }
    ));

    let block = ppg_block(T0, 0, &[]);
    let error = message::decode(&block, 0).unwrap_err();
    assert!(matches!(
        error.reason,
        DecodeReason::InvalidPayload { kind: MessageKind::PulseBlockPpg, .. }
    ));

    let frame = heartbeat(1);
    let error = message::decode(&frame[..2], 9).unwrap_err();
    assert_eq!(error.offset, 9);
    assert_eq!(error.inspected, 2);
    assert_eq!(
        error.reason,
        DecodeReason::LengthMismatch {
            kind: MessageKind::Heartbeat,
            found: 2
        }
    );
}

#[test]
fn resync_requires_confirming_byte() {
    // A temperature frame, followed by a byte that starts no frame.
    let input = [0x00, 0xA7, 0x00, 0x00, 0x00, 0x00, 0x55];
    assert_eq!(resync::search(&input, 0, true), Resync::NotFound);

    // The same frame, followed by a heartbeat.
    let input = [0x00, 0xA7, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x07];
    assert_eq!(resync::search(&input, 0, true), Resync::Found(1));

    // A frame ending the input is accepted only once the input has ended.
    let input = [0x00, 0xA7, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(resync::search(&input, 0, false), Resync::Pending(1));
    assert_eq!(resync::search(&input, 0, true), Resync::Found(1));

    let input = [0x00, 0x13, 0x37];
    assert_eq!(resync::search(&input, 0, false), Resync::Pending(3));
    assert_eq!(resync::search(&input, 0, true), Resync::NotFound);
}
