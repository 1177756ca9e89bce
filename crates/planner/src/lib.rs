//! Query compiler core: IR graph, script objects and operation handlers,
//! analysis, and lowering of single operators to wire messages.
//!
//! A compile owns one [`CompilerState`]. Handlers reached through
//! [`objects::QlObject`] grow its [`ir::IrGraph`]; the [`Analyzer`] then
//! resolves the finished graph and [`OperatorSerializer`] lowers each
//! operator. Fragmenting into a full plan lives in `pql-distributed`.

pub mod analyzer;
pub mod explain;
pub mod ir;
pub mod objects;
pub mod physical_planner;
pub mod planpb;
pub mod registry;
pub mod state;

pub use analyzer::{channel_edges, Analyzer};
pub use explain::explain_graph;
pub use ir::{IrGraph, Relation, RelationMap};
pub use objects::{CallArgs, Dataframe, QlObject};
pub use physical_planner::OperatorSerializer;
pub use registry::{FunctionRegistry, SchemaProvider, StaticRegistry, UdtfDefinition};
pub use state::CompilerState;
