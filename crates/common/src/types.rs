//! Column type vocabulary shared by every operator payload that declares
//! output columns.
//!
//! Discriminants are wire values and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive column data type.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ::prost::Enumeration,
)]
#[repr(i32)]
pub enum DataType {
    Unknown = 0,
    Boolean = 1,
    Int64 = 2,
    Uint128 = 3,
    Float64 = 4,
    String = 5,
    Time64Ns = 6,
}

impl DataType {
    /// Canonical upper-case name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Unknown => "DATA_TYPE_UNKNOWN",
            DataType::Boolean => "BOOLEAN",
            DataType::Int64 => "INT64",
            DataType::Uint128 => "UINT128",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
            DataType::Time64Ns => "TIME64NS",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic meaning attached to a column on top of its data type.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ::prost::Enumeration,
)]
#[repr(i32)]
pub enum SemanticType {
    StUnspecified = 0,
    StNone = 1,
    StTimeNs = 2,
    StAgentUid = 100,
    StAsid = 101,
    StUpid = 200,
    StServiceName = 300,
    StPodName = 400,
    StPodPhase = 401,
    StPodStatus = 402,
    StNodeName = 500,
    StContainerName = 600,
    StContainerState = 601,
    StContainerStatus = 602,
    StNamespaceName = 700,
    StBytes = 800,
    StPercent = 900,
    StDurationNs = 901,
    StThroughputPerNs = 902,
    StThroughputBytesPerNs = 903,
    StQuantiles = 1000,
    StDurationNsQuantiles = 1001,
    StIpAddress = 1100,
    StPort = 1200,
    StHttpReqMethod = 1300,
    StHttpRespStatus = 1400,
    StHttpRespMessage = 1500,
    StScriptReference = 3000,
}
