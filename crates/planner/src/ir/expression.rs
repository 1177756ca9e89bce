use pql_common::{DataType, NodeId};
use serde::{Deserialize, Serialize};

/// Expression node payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Column(ColumnRef),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(i64),
    Uint128(u128),
    Func(FuncExpr),
    List(Vec<NodeId>),
    Tuple(Vec<NodeId>),
}

impl Expression {
    /// Expression nodes this expression owns, in argument order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Expression::Func(func) => func
                .init_args
                .iter()
                .chain(func.args.iter())
                .copied()
                .collect(),
            Expression::List(items) | Expression::Tuple(items) => items.clone(),
            _ => vec![],
        }
    }

    /// Literal value carried by this node, if it is a literal.
    pub fn literal(&self) -> Option<LiteralValue> {
        match self {
            Expression::String(s) => Some(LiteralValue::String(s.clone())),
            Expression::Int(v) => Some(LiteralValue::Int64(*v)),
            Expression::Float(v) => Some(LiteralValue::Float64(*v)),
            Expression::Bool(v) => Some(LiteralValue::Boolean(*v)),
            Expression::Time(v) => Some(LiteralValue::Time64Ns(*v)),
            Expression::Uint128(v) => Some(LiteralValue::Uint128(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expression::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expression::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Expression::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expression::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncExpr> {
        match self {
            Expression::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Children of a list or tuple.
    pub fn as_collection(&self) -> Option<&[NodeId]> {
        match self {
            Expression::List(items) | Expression::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

/// Reference to a column of one of the enclosing operator's parents.
///
/// Stays name-scoped until lowering resolves it to a column offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub name: String,
    pub parent_op_idx: usize,
}

/// Function call expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncExpr {
    pub op: FuncOp,
    /// Constructor arguments (must be literals).
    pub init_args: Vec<NodeId>,
    /// Evaluation arguments.
    pub args: Vec<NodeId>,
    /// Filled in by the analyzer.
    pub arg_types: Vec<DataType>,
    /// Filled in by the analyzer.
    pub return_type: Option<DataType>,
}

impl FuncExpr {
    pub fn new(op: FuncOp, args: Vec<NodeId>) -> Self {
        Self {
            op,
            init_args: vec![],
            args,
            arg_types: vec![],
            return_type: None,
        }
    }
}

/// Operator a function expression evaluates.
///
/// Script operators map onto fixed registry names; named calls keep the name
/// they were called with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Named(String),
}

impl FuncOp {
    /// Name the function registry knows this operator by.
    pub fn registry_name(&self) -> &str {
        match self {
            FuncOp::Add => "add",
            FuncOp::Sub => "subtract",
            FuncOp::Mult => "multiply",
            FuncOp::Div => "divide",
            FuncOp::Mod => "modulo",
            FuncOp::Eq => "equal",
            FuncOp::NotEq => "notEqual",
            FuncOp::Lt => "lessThan",
            FuncOp::LtEq => "lessThanEqual",
            FuncOp::Gt => "greaterThan",
            FuncOp::GtEq => "greaterThanEqual",
            FuncOp::And => "logicalAnd",
            FuncOp::Or => "logicalOr",
            FuncOp::Not => "logicalNot",
            FuncOp::Named(name) => name,
        }
    }

    /// Script-level spelling, used by explain output.
    pub fn symbol(&self) -> &str {
        match self {
            FuncOp::Add => "+",
            FuncOp::Sub => "-",
            FuncOp::Mult => "*",
            FuncOp::Div => "/",
            FuncOp::Mod => "%",
            FuncOp::Eq => "==",
            FuncOp::NotEq => "!=",
            FuncOp::Lt => "<",
            FuncOp::LtEq => "<=",
            FuncOp::Gt => ">",
            FuncOp::GtEq => ">=",
            FuncOp::And => "and",
            FuncOp::Or => "or",
            FuncOp::Not => "not",
            FuncOp::Named(name) => name,
        }
    }
}

/// Tagged literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Time64Ns(i64),
    Uint128(u128),
}

impl LiteralValue {
    pub fn data_type(&self) -> DataType {
        match self {
            LiteralValue::Boolean(_) => DataType::Boolean,
            LiteralValue::Int64(_) => DataType::Int64,
            LiteralValue::Float64(_) => DataType::Float64,
            LiteralValue::String(_) => DataType::String,
            LiteralValue::Time64Ns(_) => DataType::Time64Ns,
            LiteralValue::Uint128(_) => DataType::Uint128,
        }
    }
}
