use pql_common::{ChannelId, DataType, NodeId};

use crate::ir::relation::Relation;
use crate::planpb;

/// Operator node: parent operators plus a kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorIr {
    pub parents: Vec<NodeId>,
    pub op: Operator,
}

impl OperatorIr {
    pub fn new(parents: Vec<NodeId>, op: Operator) -> Self {
        Self { parents, op }
    }
}

/// Closed set of operator kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    MemorySource(MemorySourceOp),
    Map(MapOp),
    BlockingAgg(BlockingAggOp),
    GroupBy(GroupByOp),
    Filter(FilterOp),
    Limit(LimitOp),
    Union,
    Join(JoinOp),
    Drop(DropOp),
    Range(RangeOp),
    UdtfSource(UdtfSourceOp),
    MemorySink(MemorySinkOp),
    GrpcSource(GrpcSourceOp),
    GrpcSink(GrpcSinkOp),
    OTelExportSink(OTelExportSinkOp),
}

/// Allowed parent count for an operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "exactly {k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

impl Operator {
    pub fn parent_arity(&self) -> Arity {
        match self {
            Operator::MemorySource(_) | Operator::UdtfSource(_) | Operator::GrpcSource(_) => {
                Arity::Exactly(0)
            }
            Operator::Join(_) => Arity::Exactly(2),
            Operator::Union => Arity::AtLeast(1),
            _ => Arity::Exactly(1),
        }
    }

    /// Expression nodes referenced by this payload.
    pub fn expression_refs(&self) -> Vec<NodeId> {
        match self {
            Operator::Map(map) => map.col_exprs.iter().map(|c| c.expr).collect(),
            Operator::BlockingAgg(agg) => agg
                .groups
                .iter()
                .copied()
                .chain(agg.aggregate_exprs.iter().map(|c| c.expr))
                .collect(),
            Operator::GroupBy(group_by) => group_by.groups.clone(),
            Operator::Filter(filter) => vec![filter.predicate],
            Operator::Join(join) => join
                .left_on
                .iter()
                .chain(join.right_on.iter())
                .copied()
                .collect(),
            Operator::Range(range) => vec![range.start, range.stop],
            Operator::UdtfSource(udtf) => udtf.args.iter().map(|a| a.value).collect(),
            Operator::OTelExportSink(sink) => {
                let mut refs: Vec<NodeId> = sink.expected_columns.iter().map(|c| c.node).collect();
                refs.sort();
                refs.dedup();
                refs
            }
            _ => vec![],
        }
    }

    pub fn is_sink(&self) -> bool {
        matches!(
            self,
            Operator::MemorySink(_) | Operator::GrpcSink(_) | Operator::OTelExportSink(_)
        )
    }

    pub fn is_source(&self) -> bool {
        matches!(self.parent_arity(), Arity::Exactly(0))
    }

    /// Operators that need their whole input before producing output.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Operator::BlockingAgg(_) | Operator::Join(_) | Operator::Union | Operator::MemorySink(_)
        )
    }
}

/// Named output expression of a Map or aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpression {
    pub name: String,
    pub expr: NodeId,
}

impl ColumnExpression {
    pub fn new(name: impl Into<String>, expr: NodeId) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemorySourceOp {
    pub table: String,
    pub select: Option<Vec<String>>,
    pub start_time: Option<i64>,
    pub stop_time: Option<i64>,
    pub streaming: bool,
    /// Offsets of the selected columns in the table relation. Set by the analyzer.
    pub column_idxs: Vec<usize>,
}

impl MemorySourceOp {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn has_empty_window(&self) -> bool {
        matches!((self.start_time, self.stop_time), (Some(start), Some(stop)) if start >= stop)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapOp {
    pub col_exprs: Vec<ColumnExpression>,
    pub keep_input_columns: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockingAggOp {
    /// Column expressions, parent index 0.
    pub groups: Vec<NodeId>,
    pub aggregate_exprs: Vec<ColumnExpression>,
    pub partial_agg: bool,
    pub finalize_results: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupByOp {
    pub groups: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    pub predicate: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitOp {
    pub limit: i64,
    pub abortable_srcs: Vec<NodeId>,
}

/// Join type as recorded on the IR.
///
/// `RightOuter` only lives until the analyzer rewrites it into `LeftOuter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinType {
    /// Map the script-level `how` value.
    pub fn from_how(how: &str) -> Option<Self> {
        match how {
            "inner" => Some(JoinType::Inner),
            "left" => Some(JoinType::LeftOuter),
            "right" => Some(JoinType::RightOuter),
            "outer" => Some(JoinType::FullOuter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::LeftOuter => "LEFT_OUTER",
            JoinType::RightOuter => "RIGHT_OUTER",
            JoinType::FullOuter => "FULL_OUTER",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOp {
    pub join_type: JoinType,
    /// Column expressions at parent index 0.
    pub left_on: Vec<NodeId>,
    /// Column expressions at parent index 1.
    pub right_on: Vec<NodeId>,
    pub suffixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropOp {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeOp {
    pub start: NodeId,
    pub stop: NodeId,
}

/// Argument bound to a UDTF call, with the type the UDTF declares for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UdtfArgValue {
    pub name: String,
    pub value: NodeId,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UdtfSourceOp {
    pub name: String,
    pub args: Vec<UdtfArgValue>,
    pub relation: Relation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySinkOp {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcSourceOp {
    pub channel: ChannelId,
}

/// Where a GRPCSink sends its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrpcSinkDestination {
    /// Another fragment's GRPCSource with the same channel id.
    Channel(ChannelId),
    /// A named result table.
    Table(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcSinkOp {
    pub destination: GrpcSinkDestination,
    pub address: String,
}

/// Column an export sink requires on its input, with the role it plays.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedColumn {
    /// Argument node the column name came from.
    pub node: NodeId,
    pub role: String,
    pub column_name: String,
    pub accepted_types: Vec<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OTelExportSinkOp {
    pub payload: planpb::OTelExportSinkOperator,
    pub expected_columns: Vec<ExpectedColumn>,
}
