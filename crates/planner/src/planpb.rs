//! Wire format of the distributed execution plan.
//!
//! Messages are declared with `prost` derives so the plan can be encoded for
//! the execution runtime without a protoc build step. Tags are part of the
//! wire contract and must not change.

use std::collections::BTreeMap;

use pql_common::{DataType, SemanticType};

use crate::ir::LiteralValue;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Uuid {
    #[prost(uint64, tag = "1")]
    pub high_bits: u64,
    #[prost(uint64, tag = "2")]
    pub low_bits: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanOptions {
    #[prost(bool, tag = "1")]
    pub explain: bool,
    #[prost(bool, tag = "2")]
    pub analyze: bool,
    #[prost(int64, tag = "3")]
    pub max_output_rows_per_table: i64,
}

impl From<&pql_common::PlanOptions> for PlanOptions {
    fn from(value: &pql_common::PlanOptions) -> Self {
        Self {
            explain: value.explain,
            analyze: value.analyze,
            max_output_rows_per_table: value.max_output_rows_per_table,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Plan {
    /// Fragment-level dependencies.
    #[prost(message, optional, tag = "1")]
    pub dag: Option<Dag>,
    #[prost(message, repeated, tag = "2")]
    pub nodes: Vec<PlanFragment>,
    #[prost(message, optional, tag = "3")]
    pub plan_options: Option<PlanOptions>,
    #[prost(message, repeated, tag = "4")]
    pub incoming_agent_ids: Vec<Uuid>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dag {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<DagNode>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DagNode {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, repeated, tag = "2")]
    pub sorted_parents: Vec<u64>,
    #[prost(uint64, repeated, tag = "3")]
    pub sorted_children: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanFragment {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub dag: Option<Dag>,
    #[prost(message, repeated, tag = "3")]
    pub nodes: Vec<PlanNode>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanNode {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub op: Option<Operator>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperatorType {
    Unknown = 0,
    MemorySource = 1000,
    GrpcSource = 1100,
    UdtfSource = 1200,
    EmptySource = 1300,
    Map = 2000,
    Aggregate = 2100,
    Filter = 2200,
    Limit = 2300,
    Union = 2400,
    Join = 2500,
    MemorySink = 9000,
    GrpcSink = 9100,
    OTelExportSink = 9200,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operator {
    #[prost(enumeration = "OperatorType", tag = "1")]
    pub op_type: i32,
    #[prost(oneof = "operator::Op", tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14")]
    pub op: Option<operator::Op>,
}

pub mod operator {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Op {
        #[prost(message, tag = "2")]
        MemSourceOp(super::MemorySourceOperator),
        #[prost(message, tag = "3")]
        MapOp(super::MapOperator),
        #[prost(message, tag = "4")]
        AggOp(super::AggregateOperator),
        #[prost(message, tag = "5")]
        MemSinkOp(super::MemorySinkOperator),
        #[prost(message, tag = "6")]
        FilterOp(super::FilterOperator),
        #[prost(message, tag = "7")]
        LimitOp(super::LimitOperator),
        #[prost(message, tag = "8")]
        UnionOp(super::UnionOperator),
        #[prost(message, tag = "9")]
        GrpcSourceOp(super::GrpcSourceOperator),
        #[prost(message, tag = "10")]
        GrpcSinkOp(super::GrpcSinkOperator),
        #[prost(message, tag = "11")]
        JoinOp(super::JoinOperator),
        #[prost(message, tag = "12")]
        UdtfSourceOp(super::UdtfSourceOperator),
        #[prost(message, tag = "13")]
        EmptySourceOp(super::EmptySourceOperator),
        #[prost(message, tag = "14")]
        OtelSinkOp(super::OTelExportSinkOperator),
    }
}

impl Operator {
    pub fn new(op_type: OperatorType, op: operator::Op) -> Self {
        Self {
            op_type: op_type.into(),
            op: Some(op),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemorySourceOperator {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, repeated, tag = "2")]
    pub column_idxs: Vec<i64>,
    #[prost(enumeration = "DataType", repeated, tag = "3")]
    pub column_types: Vec<i32>,
    #[prost(string, repeated, tag = "4")]
    pub column_names: Vec<String>,
    #[prost(int64, optional, tag = "5")]
    pub start_time: Option<i64>,
    #[prost(int64, optional, tag = "6")]
    pub stop_time: Option<i64>,
    #[prost(bool, tag = "7")]
    pub streaming: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemorySinkOperator {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "DataType", repeated, tag = "2")]
    pub column_types: Vec<i32>,
    #[prost(string, repeated, tag = "3")]
    pub column_names: Vec<String>,
    #[prost(enumeration = "SemanticType", repeated, tag = "4")]
    pub column_semantic_types: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcSourceOperator {
    #[prost(enumeration = "DataType", repeated, tag = "1")]
    pub column_types: Vec<i32>,
    #[prost(string, repeated, tag = "2")]
    pub column_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GrpcSinkOperator {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(oneof = "grpc_sink_operator::Destination", tags = "2, 3")]
    pub destination: Option<grpc_sink_operator::Destination>,
}

pub mod grpc_sink_operator {
    /// Final result table written by a GRPCSink.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OutputTable {
        #[prost(string, tag = "1")]
        pub table_name: String,
        #[prost(enumeration = "super::DataType", repeated, tag = "2")]
        pub column_types: Vec<i32>,
        #[prost(string, repeated, tag = "3")]
        pub column_names: Vec<String>,
        #[prost(enumeration = "super::SemanticType", repeated, tag = "4")]
        pub column_semantic_types: Vec<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Destination {
        /// Channel id of the GRPCSource on the receiving side.
        #[prost(uint64, tag = "2")]
        GrpcSourceId(u64),
        #[prost(message, tag = "3")]
        OutputTable(OutputTable),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UInt128 {
    #[prost(uint64, tag = "1")]
    pub low: u64,
    #[prost(uint64, tag = "2")]
    pub high: u64,
}

impl From<u128> for UInt128 {
    fn from(value: u128) -> Self {
        Self {
            low: value as u64,
            high: (value >> 64) as u64,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScalarValue {
    #[prost(enumeration = "DataType", tag = "1")]
    pub data_type: i32,
    /// Absent for a null of `data_type`.
    #[prost(oneof = "scalar_value::Value", tags = "2, 3, 4, 5, 6, 7")]
    pub value: Option<scalar_value::Value>,
}

pub mod scalar_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        Int64Value(i64),
        #[prost(double, tag = "4")]
        Float64Value(f64),
        #[prost(string, tag = "5")]
        StringValue(String),
        #[prost(int64, tag = "6")]
        Time64NsValue(i64),
        #[prost(message, tag = "7")]
        Uint128Value(super::UInt128),
    }
}

impl ScalarValue {
    /// Wire value of a literal.
    ///
    /// A declared type overrides the literal's own tag; when the two differ the
    /// result is a null of the declared type.
    pub fn from_literal(literal: &LiteralValue, declared: Option<DataType>) -> Self {
        use scalar_value::Value;
        let data_type = declared.unwrap_or_else(|| literal.data_type());
        let value = if data_type == literal.data_type() {
            Some(match literal {
                LiteralValue::Boolean(v) => Value::BoolValue(*v),
                LiteralValue::Int64(v) => Value::Int64Value(*v),
                LiteralValue::Float64(v) => Value::Float64Value(*v),
                LiteralValue::String(v) => Value::StringValue(v.clone()),
                LiteralValue::Time64Ns(v) => Value::Time64NsValue(*v),
                LiteralValue::Uint128(v) => Value::Uint128Value((*v).into()),
            })
        } else {
            None
        };
        Self {
            data_type: data_type.into(),
            value,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Column of a parent operator, resolved to an offset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    /// Id of the parent operator the column is read from.
    #[prost(uint64, tag = "1")]
    pub node: u64,
    #[prost(uint64, tag = "2")]
    pub index: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScalarExpression {
    #[prost(oneof = "scalar_expression::Value", tags = "1, 2, 3")]
    pub value: Option<scalar_expression::Value>,
}

pub mod scalar_expression {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        Constant(super::ScalarValue),
        #[prost(message, tag = "2")]
        Column(super::Column),
        #[prost(message, tag = "3")]
        Func(super::ScalarFunc),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScalarFunc {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<ScalarExpression>,
    #[prost(message, repeated, tag = "3")]
    pub init_args: Vec<ScalarValue>,
    #[prost(enumeration = "DataType", repeated, tag = "4")]
    pub args_data_types: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregateExpression {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<aggregate_expression::Arg>,
    #[prost(message, repeated, tag = "3")]
    pub init_args: Vec<ScalarValue>,
    #[prost(enumeration = "DataType", repeated, tag = "4")]
    pub args_data_types: Vec<i32>,
}

pub mod aggregate_expression {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Arg {
        #[prost(oneof = "arg::Value", tags = "1, 2")]
        pub value: Option<arg::Value>,
    }

    pub mod arg {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Value {
            #[prost(message, tag = "1")]
            Constant(super::super::ScalarValue),
            #[prost(message, tag = "2")]
            Column(super::super::Column),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapOperator {
    #[prost(message, repeated, tag = "1")]
    pub expressions: Vec<ScalarExpression>,
    #[prost(string, repeated, tag = "2")]
    pub column_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterOperator {
    #[prost(message, optional, tag = "1")]
    pub expression: Option<ScalarExpression>,
    /// Columns passed through.
    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<Column>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LimitOperator {
    #[prost(int64, tag = "1")]
    pub limit: i64,
    #[prost(message, repeated, tag = "2")]
    pub columns: Vec<Column>,
    /// Sources that may stop producing once the limit is reached.
    #[prost(uint64, repeated, tag = "3")]
    pub abortable_srcs: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregateOperator {
    #[prost(bool, tag = "1")]
    pub windowed: bool,
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<AggregateExpression>,
    #[prost(message, repeated, tag = "3")]
    pub groups: Vec<Column>,
    #[prost(string, repeated, tag = "4")]
    pub group_names: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub value_names: Vec<String>,
    #[prost(bool, tag = "6")]
    pub partial_agg: bool,
    #[prost(bool, tag = "7")]
    pub finalize_results: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnionOperator {
    #[prost(string, repeated, tag = "1")]
    pub column_names: Vec<String>,
    /// One mapping per parent, in parent order.
    #[prost(message, repeated, tag = "2")]
    pub column_mappings: Vec<union_operator::ColumnMapping>,
}

pub mod union_operator {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ColumnMapping {
        /// For each output column, its offset in this parent.
        #[prost(uint64, repeated, tag = "1")]
        pub column_indexes: Vec<u64>,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum JoinType {
    Inner = 0,
    LeftOuter = 1,
    FullOuter = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JoinOperator {
    #[prost(enumeration = "JoinType", tag = "1")]
    pub join_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub equality_conditions: Vec<join_operator::EqualityCondition>,
    #[prost(message, repeated, tag = "3")]
    pub output_columns: Vec<join_operator::ParentColumn>,
    #[prost(string, repeated, tag = "4")]
    pub column_names: Vec<String>,
    #[prost(uint64, tag = "5")]
    pub rows_per_batch: u64,
}

pub mod join_operator {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EqualityCondition {
        #[prost(uint64, tag = "1")]
        pub left_column_index: u64,
        #[prost(uint64, tag = "2")]
        pub right_column_index: u64,
    }

    /// Provenance of one output column: parent 0 (left) or 1 (right).
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ParentColumn {
        #[prost(uint64, tag = "1")]
        pub parent_index: u64,
        #[prost(uint64, tag = "2")]
        pub column_index: u64,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UdtfSourceOperator {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub arg_values: Vec<ScalarValue>,
}

/// Source producing no rows, with the schema of the source it replaces.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EmptySourceOperator {
    #[prost(string, repeated, tag = "1")]
    pub column_names: Vec<String>,
    #[prost(enumeration = "DataType", repeated, tag = "2")]
    pub column_types: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelEndpointConfig {
    #[prost(string, tag = "1")]
    pub url: String,
    #[prost(btree_map = "string, string", tag = "2")]
    pub attributes: BTreeMap<String, String>,
}

/// Resource or span/metric attribute read from a column.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelAttribute {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value_column: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OTelSpanKind {
    Unspecified = 0,
    Internal = 1,
    Server = 2,
    Client = 3,
    Producer = 4,
    Consumer = 5,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelSpan {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub attributes: Vec<OTelAttribute>,
    #[prost(string, tag = "3")]
    pub trace_id_column: String,
    #[prost(string, tag = "4")]
    pub span_id_column: String,
    #[prost(string, tag = "5")]
    pub parent_span_id_column: String,
    #[prost(string, tag = "6")]
    pub start_time_unix_nano_column: String,
    #[prost(string, tag = "7")]
    pub end_time_unix_nano_column: String,
    #[prost(enumeration = "OTelSpanKind", tag = "8")]
    pub kind: i32,
    #[prost(string, tag = "9")]
    pub status_column: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelMetricGauge {
    #[prost(string, tag = "1")]
    pub value_column: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelMetricSummary {
    #[prost(string, tag = "1")]
    pub count_column: String,
    #[prost(string, tag = "2")]
    pub sum_column: String,
    #[prost(message, repeated, tag = "3")]
    pub quantile_values: Vec<otel_metric_summary::ValueAtQuantile>,
}

pub mod otel_metric_summary {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ValueAtQuantile {
        #[prost(double, tag = "1")]
        pub quantile: f64,
        #[prost(string, tag = "2")]
        pub value_column: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelMetric {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(message, repeated, tag = "3")]
    pub attributes: Vec<OTelAttribute>,
    #[prost(string, tag = "4")]
    pub time_unix_nano_column: String,
    #[prost(string, tag = "5")]
    pub start_time_unix_nano_column: String,
    #[prost(oneof = "otel_metric::Data", tags = "100, 101")]
    pub data: Option<otel_metric::Data>,
}

pub mod otel_metric {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "100")]
        Gauge(super::OTelMetricGauge),
        #[prost(message, tag = "101")]
        Summary(super::OTelMetricSummary),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OTelExportSinkOperator {
    #[prost(message, optional, tag = "1")]
    pub endpoint_config: Option<OTelEndpointConfig>,
    #[prost(message, repeated, tag = "2")]
    pub spans: Vec<OTelSpan>,
    #[prost(message, repeated, tag = "3")]
    pub metrics: Vec<OTelMetric>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn mismatched_declared_type_yields_typed_null() {
        let v = ScalarValue::from_literal(&LiteralValue::String("x".into()), Some(DataType::Int64));
        assert_eq!(v.data_type, i32::from(DataType::Int64));
        assert!(v.is_null());

        let v = ScalarValue::from_literal(&LiteralValue::Int64(7), Some(DataType::Int64));
        assert_eq!(v.value, Some(scalar_value::Value::Int64Value(7)));
    }

    #[test]
    fn uint128_splits_into_halves() {
        let v = UInt128::from((3u128 << 64) | 9);
        assert_eq!((v.high, v.low), (3, 9));
    }

    #[test]
    fn grpc_sink_destination_survives_encoding() {
        let sink = GrpcSinkOperator {
            address: "agent-1:50051".to_string(),
            destination: Some(grpc_sink_operator::Destination::GrpcSourceId(7)),
        };
        let bytes = sink.encode_to_vec();
        let decoded = GrpcSinkOperator::decode(bytes.as_slice()).expect("decode");
        assert_eq!(decoded, sink);
    }
}
