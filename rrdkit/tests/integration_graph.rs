//! Integration tests for graph definitions: loading from JSON files and
//! producing `rrdtool graph` arguments.

use rrdkit::error::GraphError;
use rrdkit::graph::{Area, ColorTag, ImageFormat, Line};
use rrdkit::{Color, ConsolidationFn, Def, Graph, RenderOptions, RrdError, TimeSpec};
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

const DISK_GRAPH: &str = r##"{
    "title": "Disk: /var",
    "vertical_label": "GB",
    "defs": [
        {"vname": "used", "path": "/var/lib/rrd/disk.rrd", "ds_name": "gb_used", "cf": "average"},
        {"vname": "free", "path": "/var/lib/rrd/disk.rrd", "ds_name": "gb_free", "cf": "average"}
    ],
    "cdefs": [
        {"vname": "total", "rpn": "used,free,+"}
    ],
    "vdefs": [
        {"vname": "peak", "rpn": "used,MAXIMUM"}
    ],
    "elements": [
        {"type": "area", "value": "used", "color": "#CC000080", "legend": "Used"},
        {"type": "area", "value": "free", "color": "00CC00", "legend": "Free", "stack": true},
        {"type": "line", "value": "total", "width": 1, "color": "#000000"},
        {"type": "gprint", "vname": "peak", "format": "Peak: %6.2lf GB"},
        {"type": "comment", "text": "generated nightly"}
    ]
}"##;

#[test]
fn test_graph_file_to_arguments() {
    let temp_dir = tempdir().unwrap();
    let file = temp_dir.path().join("disk.json");
    fs::write(&file, DISK_GRAPH).unwrap();

    let graph = Graph::from_file(&file).unwrap();

    let mut colors = BTreeMap::new();
    colors.insert(ColorTag::Font, Color::from_rgb(0x333333));
    let options = RenderOptions {
        format: ImageFormat::Png,
        width: Some(800),
        height: Some(200),
        start: Some(TimeSpec::from("end-7d")),
        end: Some(TimeSpec::from(1_700_000_000_u64)),
        upper_limit: Some(500.0),
        colors,
        ..RenderOptions::default()
    };

    assert_eq!(
        graph.graph_args("disk.png", &options).unwrap(),
        vec![
            "disk.png",
            "--imgformat",
            "PNG",
            "--title",
            "Disk: /var",
            "--vertical-label",
            "GB",
            "--width",
            "800",
            "--height",
            "200",
            "--start",
            "end-7d",
            "--end",
            "1700000000",
            "--upper-limit",
            "500",
            "--color",
            "FONT#333333",
            "DEF:used=/var/lib/rrd/disk.rrd:gb_used:AVERAGE",
            "DEF:free=/var/lib/rrd/disk.rrd:gb_free:AVERAGE",
            "CDEF:total=used,free,+",
            "VDEF:peak=used,MAXIMUM",
            "AREA:used#CC000080:Used",
            "AREA:free#00CC00:Free:STACK",
            "LINE1:total#000000:total",
            "GPRINT:peak:Peak\\: %6.2lf GB",
            "COMMENT:generated nightly",
        ]
    );
}

#[test]
fn test_graph_file_errors() {
    let temp_dir = tempdir().unwrap();

    let err = Graph::from_file(temp_dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, RrdError::Graph(GraphError::Load { .. })));

    let extra_keys = temp_dir.path().join("extra_keys.json");
    fs::write(
        &extra_keys,
        r#"{"elements": [{"type": "comment", "text": "x"}],
            "defs": [], "vdefs": [], "cdefs": [],
            "title": null, "vertical_label": null,
            "extra": 1}"#,
    )
    .unwrap();
    // Unknown keys are ignored; the graph itself is fine.
    assert!(Graph::from_file(&extra_keys).is_ok());

    let undefined = temp_dir.path().join("undefined.json");
    fs::write(
        &undefined,
        r#"{"elements": [{"type": "line", "value": "ghost"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        Graph::from_file(&undefined),
        Err(RrdError::Graph(GraphError::UndefinedVariable { .. }))
    ));
}

#[test]
fn test_graph_serializes_back_to_json() {
    let graph = Graph::builder()
        .title("Load")
        .def(Def::new("l", "load.rrd", "load", ConsolidationFn::Max).step(300))
        .area(Area::new("l").color(Color::from_rgba(0x0000_ff40)))
        .line(Line::new("l").width(2.0).legend("load"))
        .build()
        .unwrap();

    let temp_dir = tempdir().unwrap();
    let file = temp_dir.path().join("load.json");
    fs::write(&file, serde_json::to_string(&graph).unwrap()).unwrap();

    let loaded = Graph::from_file(&file).unwrap();
    assert_eq!(loaded, graph);
    assert_eq!(
        loaded.graph_args("-", &RenderOptions::default()).unwrap()[3..],
        [
            "--title",
            "Load",
            "DEF:l=load.rrd:load:MAX:step=300",
            "AREA:l#0000FF40:l",
            "LINE2:l:load",
        ]
    );
}
