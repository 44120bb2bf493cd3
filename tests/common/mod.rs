// Shared fixtures for the integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use easyeda2kicad_rs::api::CadSource;
use easyeda2kicad_rs::error::{Error, Result};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CUBE_OBJ: &str = "\
newmtl body
Kd 0.2 0.2 0.2
d 0
endmtl
v 0 0 0
v 5.08 0 0
v 5.08 2.54 0
v 0 2.54 1.27
usemtl body
f 1//1 2//1 3//1
f 1//1 3//1 4//1
";

/// A two pin part: symbol with a body rectangle, footprint origin at
/// (50, 50) with its first pad at (100, 100), and a 3D model reference.
pub fn ne555_cad_data() -> Value {
    json!({
        "lcsc": { "number": "C7593", "url": "https://lcsc.com/datasheet/C7593.pdf" },
        "SMT": true,
        "dataStr": {
            "head": { "x": "400", "y": "300", "c_para": {
                "name": "NE555", "pre": "U?", "package": "SOIC-8",
                "Manufacturer": "TI", "JLCPCB Part Class": "Basic Part"
            }},
            "shape": [
                "R~390~290~~~20~20~#880000~1~0~none~gge4~0",
                "P~show~0~1~380~300~180~gge2~0^^380~300^^M 380 300 h 10~#880000^^1~393~304~0~GND~start~~~#0000FF^^1~388~299~0~1~end~~~#0000FF^^0~390~300^^0~M 393 297 L 396 300 L 393 303",
                "P~show~0~2~420~300~0~gge3~0^^420~300^^M 420 300 h -10~#880000^^1~407~304~0~VCC~end~~~#0000FF^^1~412~299~0~2~start~~~#0000FF^^0~410~300^^0~M 407 297 L 404 300 L 407 303"
            ]
        },
        "packageDetail": {
            "title": "SOIC-8",
            "dataStr": {
                "head": { "x": 50, "y": 50 },
                "shape": [
                    "PAD~RECT~100~100~4~2~1~~1~0~~0~gge5~0~~Y~0",
                    "PAD~RECT~120~100~4~2~1~~2~0~~0~gge6~0~~Y~0",
                    "TRACK~1~3~~95 95 125 95~gge7~0",
                    "SVGNODE~{\"gId\":\"g1\",\"attrs\":{\"uuid\":\"model-uuid\",\"title\":\"SOIC-8.step\",\"c_origin\":\"110,100\",\"z\":\"0\",\"c_rotation\":\"0,0,0\"}}"
                ]
            }
        }
    })
}

/// A second part without a 3D model.
pub fn resistor_cad_data() -> Value {
    json!({
        "lcsc": { "number": "C17414" },
        "SMT": true,
        "dataStr": {
            "head": { "x": 0, "y": 0, "c_para": { "name": "0805W8F1001T5E", "pre": "R?", "package": "R0805" }},
            "shape": [
                "R~-10~-4~~~20~8~#880000~1~0~none~gge1~0"
            ]
        },
        "packageDetail": {
            "title": "R0805",
            "dataStr": {
                "head": { "x": 0, "y": 0 },
                "shape": [
                    "PAD~RECT~-4~0~4~5~1~~1~0~~0~gge2~0~~Y~0",
                    "PAD~RECT~4~0~4~5~1~~2~0~~0~gge3~0~~Y~0"
                ]
            }
        }
    })
}

/// Serves canned payloads and counts how often it was asked for CAD data.
#[derive(Default)]
pub struct MemorySource {
    pub parts: HashMap<String, Value>,
    pub obj: Option<String>,
    pub step: Option<Bytes>,
    pub cad_requests: AtomicUsize,
}

impl MemorySource {
    pub fn with_parts() -> Self {
        let mut parts = HashMap::new();
        parts.insert("C7593".to_string(), ne555_cad_data());
        parts.insert("C17414".to_string(), resistor_cad_data());
        parts.insert("C1".to_string(), Value::Null);
        MemorySource {
            parts,
            obj: Some(CUBE_OBJ.to_string()),
            step: Some(Bytes::from_static(b"ISO-10303-21;\nEND-ISO-10303-21;\n")),
            cad_requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.cad_requests.load(Ordering::SeqCst)
    }
}

impl CadSource for MemorySource {
    async fn get_cad_data_of_component(&self, lcsc_id: &str) -> Result<Value> {
        self.cad_requests.fetch_add(1, Ordering::SeqCst);
        self.parts.get(lcsc_id).cloned().ok_or_else(|| Error::FetchFailure {
            lcsc_id: lcsc_id.to_string(),
            reason: "HTTP 404".to_string(),
        })
    }

    async fn get_raw_3d_model_obj(&self, uuid: &str) -> Result<String> {
        self.obj
            .clone()
            .ok_or_else(|| Error::MissingData(format!("No raw 3D model (OBJ) found for uuid: {}", uuid)))
    }

    async fn get_step_3d_model(&self, uuid: &str) -> Result<Bytes> {
        self.step
            .clone()
            .ok_or_else(|| Error::MissingData(format!("No STEP 3D model found for uuid: {}", uuid)))
    }
}
