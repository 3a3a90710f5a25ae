//! Integration tests for the database handle over the pipe protocol.
//!
//! The engine side is scripted: replies are queued up front in an
//! in-memory reader and every command the client writes is captured, so
//! these tests run without an `rrdtool` binary.

use rrdkit::definition::DataSourceKind;
use rrdkit::error::{DefinitionError, EngineError, InfoError};
use rrdkit::{ConsolidationFn, Database, RrdError, Session, TimeSpec, UpdateTime};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

/// Captures everything the client writes to the engine.
#[derive(Clone, Default)]
struct Transcript(Arc<Mutex<Vec<u8>>>);

impl Transcript {
    fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

const OK: &str = "OK u:0.00 s:0.00 r:0.00\n";

const INFO: &str = "filename = \"net.rrd\"
rrd_version = \"0003\"
step = 60
last_update = 1700000000
header_size = 2872
ds[in].index = 0
ds[in].type = \"COUNTER\"
ds[in].minimal_heartbeat = 120
ds[in].min = 0.0000000000e+00
ds[in].max = NaN
ds[in].last_ds = \"U\"
ds[in].value = NaN
ds[in].unknown_sec = 0
ds[out].index = 1
ds[out].type = \"COUNTER\"
ds[out].minimal_heartbeat = 120
ds[out].min = 0.0000000000e+00
ds[out].max = 1.2500000000e+08
ds[total].index = 2
ds[total].type = \"COMPUTE\"
ds[total].cdef = \"in,out,+\"
rra[0].cf = \"AVERAGE\"
rra[0].rows = 1440
rra[0].cur_row = 12
rra[0].pdp_per_row = 1
rra[0].xff = 5.0000000000e-01
rra[0].cdp_prep[0].value = NaN
rra[0].cdp_prep[0].unknown_datapoints = 0
rra[1].cf = \"MAX\"
rra[1].rows = 720
rra[1].pdp_per_row = 60
rra[1].xff = 5.0000000000e-01
";

/// Opens `net.rrd` over a scripted engine whose first reply is `INFO`,
/// followed by `replies`.
fn open(replies: &str) -> (Database, Transcript) {
    let transcript = Transcript::default();
    let script = format!("{INFO}{OK}{replies}");
    let session = Session::from_streams(transcript.clone(), Cursor::new(script));
    let db = Database::with_session(session, "net.rrd").unwrap();
    (db, transcript)
}

#[test]
fn test_open_learns_layout() {
    let (db, transcript) = open("");

    assert_eq!(transcript.lines(), ["info net.rrd"]);
    assert_eq!(db.step(), Some(60));
    assert_eq!(db.info().last_update(), Some(1_700_000_000));

    let names: Vec<_> = db.data_sources().iter().map(|ds| ds.name.as_str()).collect();
    assert_eq!(names, ["in", "out", "total"]);
    assert_eq!(db.data_source("in").unwrap().kind(), DataSourceKind::Counter);
    assert!(db.data_source("total").unwrap().is_computed());
    assert_eq!(
        db.data_source("out").unwrap().to_string(),
        "DS:out:COUNTER:120:0:125000000"
    );
    assert_eq!(db.data_source("in").unwrap().to_string(), "DS:in:COUNTER:120:0:U");

    let archives: Vec<_> = db.archives().iter().map(ToString::to_string).collect();
    assert_eq!(archives, ["RRA:AVERAGE:0.5:1:1440", "RRA:MAX:0.5:60:720"]);
}

#[test]
fn test_update_and_query_sequence() {
    let replies = format!(
        "{OK}{OK}1700000120\n{OK}1699913600\n{OK}\
         \x20                         in         out\n\
         \n\
         1700000060: 1.0000000000e+02 -nan\n\
         1700000120: 1.5000000000e+02 2.0000000000e+01\n\
         {OK}"
    );
    let (mut db, transcript) = open(&replies);

    db.update(&[("in", 100.0), ("out", f64::NAN)]).unwrap();
    db.update_at(UpdateTime::At(1_700_000_120), &[("out", 20.0)])
        .unwrap();
    assert_eq!(db.last().unwrap(), 1_700_000_120);
    assert_eq!(db.first(1).unwrap(), 1_699_913_600);

    let start = TimeSpec::from("now-1h");
    let data = db
        .fetch(ConsolidationFn::Average, Some(&start), None, Some(60))
        .unwrap();
    assert_eq!(data.names, ["in", "out"]);
    assert_eq!(data.rows.len(), 2);
    assert_eq!(data.rows[0].values, [Some(100.0), None]);
    assert_eq!(
        data.column("out").unwrap(),
        [(1_700_000_060, None), (1_700_000_120, Some(20.0))]
    );

    assert_eq!(
        transcript.lines(),
        [
            "info net.rrd",
            "update net.rrd --template in:out N:100:U",
            "update net.rrd --template out 1700000120:20",
            "last net.rrd",
            "first net.rrd --rraindex 1",
            "fetch net.rrd AVERAGE --resolution 60 --start now-1h",
        ]
    );
    assert_eq!(db.session_mut().commands_sent(), 6);
    db.close().unwrap();
}

#[test]
fn test_rejected_updates_never_reach_engine() {
    let (mut db, transcript) = open("");

    let empty: [(&str, f64); 0] = [];
    let err = db.update(&empty).unwrap_err();
    assert!(matches!(err, RrdError::Definition(DefinitionError::EmptyUpdate)));

    let err = db.update_one("bogus", 1.0).unwrap_err();
    assert!(matches!(
        err,
        RrdError::Definition(DefinitionError::UnknownDataSource { name }) if name == "bogus"
    ));

    let err = db.update(&[("in", 1.0), ("total", 2.0)]).unwrap_err();
    assert!(matches!(
        err,
        RrdError::Definition(DefinitionError::ComputedUpdate { name }) if name == "total"
    ));

    assert_eq!(transcript.lines(), ["info net.rrd"]);
}

#[test]
fn test_engine_errors_surface() {
    let replies = format!(
        "ERROR: illegal attempt to update using time 1 when last update time is 1700000000 (minimum one second step)\n\
         not-a-number\n{OK}"
    );
    let (mut db, _) = open(&replies);

    let err = db
        .update_at(UpdateTime::At(1), &[("in", 1.0)])
        .unwrap_err();
    match err {
        RrdError::Engine(EngineError::Command { command, message }) => {
            assert_eq!(command, "update");
            assert!(message.starts_with("illegal attempt to update"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The session stays usable after an engine-side error.
    let err = db.last().unwrap_err();
    assert!(matches!(
        err,
        RrdError::Engine(EngineError::UnexpectedReply { .. })
    ));
}

#[test]
fn test_open_missing_file() {
    let transcript = Transcript::default();
    let script = "ERROR: opening 'gone.rrd': No such file or directory\n";
    let session = Session::from_streams(transcript.clone(), Cursor::new(script));

    let err = Database::with_session(session, "gone.rrd").unwrap_err();
    assert!(matches!(err, RrdError::Engine(EngineError::Command { .. })));
}

#[test]
fn test_open_rejects_unknown_kind() {
    let transcript = Transcript::default();
    let script = format!("step = 60\nds[x].type = \"DCOUNTER\"\nds[x].minimal_heartbeat = 120\n{OK}");
    let session = Session::from_streams(transcript, Cursor::new(script));

    let err = Database::with_session(session, "x.rrd").unwrap_err();
    assert!(matches!(err, RrdError::Info(InfoError::UnknownKind(kind)) if kind == "DCOUNTER"));
}

#[test]
fn test_graph_def_from_database() {
    let (db, _) = open("");

    let def = db.def("inbound", "in", ConsolidationFn::Average).unwrap();
    assert_eq!(def.to_string(), "DEF:inbound=net.rrd:in:AVERAGE");

    let err = db.def("x", "nope", ConsolidationFn::Max).unwrap_err();
    assert!(matches!(
        err,
        RrdError::Definition(DefinitionError::UnknownDataSource { .. })
    ));
}
