//! Messages exchanged between the coordinator and elevation workers.
//!
//! In-process workers pass these values over a channel as they are.
//! Out-of-process workers exchange them as one JSON document per line:
//!
//! ```text
//! -> {"command":"buildElevationMap","iterations":250,"width":512,"height":256}
//! <- {"type":"status"}
//! <- {"type":"result","data":[[...row 0...],[...row 1...]]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fault::FaultParams;

/// Work a coordinator can ask of a worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum WorkerCommand {
    /// Build a private elevation delta from `iterations` faults.
    #[serde(rename_all = "camelCase")]
    BuildElevationMap {
        iterations: usize,
        width: usize,
        height: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
        #[serde(default)]
        fault: FaultParams,
    },
}

impl WorkerCommand {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// What a worker sends back. Always `Status` first, then one `Result`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerReply {
    Status,
    /// Delta grid, one inner array per row.
    Result { data: Vec<Vec<f32>> },
}

impl WorkerReply {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
