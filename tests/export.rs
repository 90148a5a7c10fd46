mod common;

use std::{fs, io::Cursor};

use common::*;
use pretty_assertions::assert_eq;
use sprocket::{
    avec::{self, ParseOptions, Recording},
    export::{ExportError, Format, Value},
    sans::stats::ParseStatistics,
};

fn recording(input: &[u8]) -> (Recording, ParseStatistics) {
    let (recording, report) =
        avec::read_recording(Cursor::new(input), &ParseOptions::default()).unwrap();
    (recording, report.statistics)
}

#[test]
fn csv_writes_one_file_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (recording, stats) = recording(&session());

    let exporter = Format::Csv.exporter(dir.path(), "session");
    let written = exporter.export(&recording, &stats, false).unwrap();

    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "session_sensor.csv",
            "session_physio.csv",
            "session_acc.csv",
            "session_gyro.csv",
            "session_temp.csv",
            "session_hr.csv",
            "session_afe.csv",
            "session_battdiag.csv",
            "session_device.csv",
        ]
    );

    let sensor = fs::read_to_string(dir.path().join("session_sensor.csv")).unwrap();
    assert_eq!(
        sensor,
        "timestamp,resolved,ecg,ppg\n\
         2020-09-13T12:26:08.233Z,true,10,-1500\n\
         2020-09-13T12:26:08.242Z,true,11,-1600\n"
    );

    let device = fs::read_to_string(dir.path().join("session_device.csv")).unwrap();
    assert_eq!(
        device,
        "serial,firmware,start_time\n\
         0123456789abcdef,4.0.1,2020-09-13T12:26:08.232Z\n"
    );

    let physio = fs::read_to_string(dir.path().join("session_physio.csv")).unwrap();
    let mut lines = physio.lines();
    assert_eq!(lines.next(), Some("timestamp,resolved,ecg_0,ecg_1,ppg_0"));
    assert_eq!(lines.next(), Some("2020-09-13T12:26:08.235Z,true,-5,6,-7"));
    assert_eq!(lines.next(), Some("2020-09-13T12:26:08.236Z,true,1,,-10"));
}

#[test]
fn empty_streams_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let (recording, stats) = recording(&concat(&[acc(5, [1, 2, 3])]));

    let written = Format::Csv
        .exporter(dir.path(), "partial")
        .export(&recording, &stats, false)
        .unwrap();

    assert_eq!(written, vec![dir.path().join("partial_acc.csv")]);

    let acc = fs::read_to_string(&written[0]).unwrap();
    assert_eq!(acc, "timestamp,resolved,acc_x,acc_y,acc_z\n,false,1,2,3\n");
}

#[test]
fn existing_outputs_require_force() {
    let dir = tempfile::tempdir().unwrap();
    let (recording, stats) = recording(&session());

    for format in [Format::Csv, Format::Columnar] {
        let exporter = format.exporter(dir.path(), "session");
        exporter.export(&recording, &stats, false).unwrap();

        let err = exporter.export(&recording, &stats, false).unwrap_err();
        assert!(matches!(err, ExportError::Exists(_)), "{format:?}");

        exporter.export(&recording, &stats, true).unwrap();
    }
}

#[test]
fn columnar_document_holds_streams_and_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let (recording, stats) = recording(&session());

    let written = Format::Columnar
        .exporter(dir.path(), "session")
        .export(&recording, &stats, false)
        .unwrap();
    assert_eq!(written, vec![dir.path().join("session.json")]);

    let text = fs::read_to_string(&written[0]).unwrap();
    let document: serde_json::Value = serde_json::from_str(&text).unwrap();

    let streams = document["streams"].as_array().unwrap();
    let names: Vec<_> = streams.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec!["sensor", "physio", "acc", "gyro", "temp", "hr", "afe", "battdiag"]
    );

    let physio = &streams[1];
    assert_eq!(physio["sample_frequency_hz"], 1000.0);
    assert_eq!(physio["length"], 5);
    assert_eq!(physio["columns"][0]["name"], "timestamp");
    assert_eq!(physio["columns"][0]["values"][0], T0 + 1003);
    assert_eq!(physio["columns"][1]["values"][0], true);
    assert_eq!(physio["columns"][3]["name"], "ecg_1");
    assert_eq!(physio["columns"][3]["values"][1], serde_json::Value::Null);

    let device = document["device"].as_array().unwrap();
    assert_eq!(device[0]["name"], "serial");
    assert_eq!(device[0]["values"][0], "0123456789abcdef");

    assert_eq!(document["statistics"]["kinds"]["Heartbeat"]["count"], 3);
    assert_eq!(document["statistics"]["errors"].as_array().unwrap().len(), 0);
}

#[test]
fn values_display_for_text_output() {
    assert_eq!(Value::Missing.to_string(), "");
    assert_eq!(Value::Bool(true).to_string(), "true");
    assert_eq!(Value::from(-3i16).to_string(), "-3");
    assert_eq!(Value::from(0.5f32).to_string(), "0.5");
    assert_eq!(Value::from(None::<i32>).to_string(), "");
    assert_eq!(Value::Time(0).to_string(), "1970-01-01T00:00:00.000Z");
}
