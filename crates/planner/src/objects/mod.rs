//! Values produced while evaluating a script.
//!
//! Each value kind implements [`ObjectBehavior`]: a fixed method table looked
//! up by name, optional attributes, and optional call/subscript operators.
//! Node-backed values only hold ids into the compile's [`IrGraph`].
//!
//! [`IrGraph`]: crate::ir::IrGraph

pub mod dataframe;
pub mod dict;
pub mod func;
pub mod module;
pub mod otel;

use std::collections::BTreeSet;
use std::fmt;

use pql_common::{NodeId, PqlError, Result, SourceLocation};

use crate::ir::pattern::{self, Pattern};
use crate::ir::{IrGraph, NodeType};
use crate::state::CompilerState;

pub use dataframe::Dataframe;
pub use dict::DictObject;
pub use func::{
    Binding, CallArgs, DataframeHandler, DefaultValue, FreeHandler, FuncObject, ParsedArgs,
    Signature,
};
pub use module::{ModuleKind, ModuleObject};
pub use otel::{EndpointConfig, Exporter, OTelMetricData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Dataframe,
    Expression,
    Dict,
    Function,
    None,
    Exporter,
    EndpointConfig,
    OTelMetricData,
    Module,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Dataframe => "DataFrame",
            ObjectType::Expression => "Expression",
            ObjectType::Dict => "Dict",
            ObjectType::Function => "Function",
            ObjectType::None => "None",
            ObjectType::Exporter => "Exporter",
            ObjectType::EndpointConfig => "Endpoint",
            ObjectType::OTelMetricData => "OTelMetricData",
            ObjectType::Module => "Module",
        })
    }
}

/// Capabilities of a value kind.
pub trait ObjectBehavior {
    fn object_type(&self) -> ObjectType;

    /// Method bound to this receiver.
    fn get_method(&self, _name: &str) -> Option<FuncObject> {
        None
    }

    /// Non-method attribute. May create nodes.
    fn get_attribute(
        &self,
        _state: &mut CompilerState,
        _location: SourceLocation,
        _name: &str,
    ) -> Result<Option<QlObject>> {
        Ok(None)
    }

    fn call_method(&self) -> Option<FuncObject> {
        None
    }

    fn subscript_method(&self) -> Option<FuncObject> {
        None
    }
}

/// Expression node wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprObject {
    pub node: NodeId,
}

impl ObjectBehavior for ExprObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Expression
    }
}

#[derive(Debug, Clone, Copy)]
struct NoneObject;

impl ObjectBehavior for NoneObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::None
    }
}

#[derive(Debug, Clone)]
pub enum QlObject {
    Dataframe(Dataframe),
    Expr(ExprObject),
    Dict(DictObject),
    Func(FuncObject),
    None,
    Exporter(Exporter),
    EndpointConfig(EndpointConfig),
    OTelMetricData(OTelMetricData),
    Module(ModuleObject),
}

impl QlObject {
    pub fn expr(node: NodeId) -> Self {
        QlObject::Expr(ExprObject { node })
    }

    pub fn dataframe(op: NodeId) -> Self {
        QlObject::Dataframe(Dataframe::new(op))
    }

    fn behavior(&self) -> &dyn ObjectBehavior {
        match self {
            QlObject::Dataframe(v) => v,
            QlObject::Expr(v) => v,
            QlObject::Dict(v) => v,
            QlObject::Func(v) => v,
            QlObject::None => &NoneObject,
            QlObject::Exporter(v) => v,
            QlObject::EndpointConfig(v) => v,
            QlObject::OTelMetricData(v) => v,
            QlObject::Module(v) => v,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.behavior().object_type()
    }

    /// IR node behind a dataframe or expression.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            QlObject::Dataframe(df) => Some(df.op()),
            QlObject::Expr(e) => Some(e.node),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, QlObject::None)
    }

    /// Kind name reported in diagnostics: the node type for node-backed
    /// values, the object type otherwise.
    pub fn type_name(&self, graph: &IrGraph) -> String {
        match self.node() {
            Some(id) => pattern::type_string(graph, id),
            None => self.object_type().to_string(),
        }
    }

    pub fn get_method(&self, name: &str) -> Option<FuncObject> {
        self.behavior().get_method(name)
    }

    /// Attribute lookup: methods first, then attributes.
    pub fn get_attribute(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        name: &str,
    ) -> Result<QlObject> {
        if let Some(method) = self.get_method(name) {
            return Ok(QlObject::Func(method));
        }
        if let Some(attr) = self.behavior().get_attribute(state, location, name)? {
            return Ok(attr);
        }
        Err(PqlError::argument(
            location,
            format!("'{}' object has no attribute '{}'", self.object_type(), name),
        ))
    }

    pub fn call(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        args: CallArgs,
    ) -> Result<QlObject> {
        let func = self.behavior().call_method().ok_or_else(|| {
            PqlError::argument(
                location,
                format!("'{}' object is not callable", self.object_type()),
            )
        })?;
        func.call(state, location, args)
    }

    pub fn subscript(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        key: QlObject,
    ) -> Result<QlObject> {
        let func = self.behavior().subscript_method().ok_or_else(|| {
            PqlError::argument(
                location,
                format!("'{}' object is not subscriptable", self.object_type()),
            )
        })?;
        func.call(state, location, CallArgs::new().arg(key))
    }
}

/// Node behind `obj` if it matches `pattern`, else a wrong-kind error.
pub(crate) fn expect_node(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
    arg_name: &str,
    pattern: &Pattern,
) -> Result<NodeId> {
    match obj.node() {
        Some(id) => pattern::expect(graph, id, arg_name, pattern),
        None => Err(PqlError::argument(
            location,
            format!(
                "'{arg_name}' must be {}, got {}",
                pattern.describe(),
                obj.object_type()
            ),
        )),
    }
}

/// Node behind `obj` if it has exactly `node_type`.
///
/// Error: `Expected arg '{name}' as type '{type}', received '{actual}'`.
pub(crate) fn arg_as(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
    arg_name: &str,
    node_type: NodeType,
) -> Result<NodeId> {
    if let Some(id) = obj.node() {
        if graph.node_type(id)? == node_type {
            return Ok(id);
        }
    }
    let location = match obj.node() {
        Some(id) => graph.location(id)?,
        None => location,
    };
    Err(PqlError::argument(
        location,
        format!(
            "Expected arg '{arg_name}' as type '{node_type}', received '{}'",
            obj.type_name(graph)
        ),
    ))
}

/// Delete argument nodes whose values were copied into an operator.
///
/// Nodes still referenced elsewhere, or already gone, are left alone.
pub(crate) fn delete_consumed(
    graph: &mut IrGraph,
    nodes: impl IntoIterator<Item = NodeId>,
) -> Result<()> {
    let unique: BTreeSet<NodeId> = nodes.into_iter().collect();
    for id in unique {
        if graph.contains(id) && graph.referrers(id).is_empty() {
            graph.delete_node_and_children(id)?;
        }
    }
    Ok(())
}
