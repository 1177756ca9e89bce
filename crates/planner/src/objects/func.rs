use std::fmt;
use std::sync::Arc;

use pql_common::{PqlError, Result, SourceLocation};

use crate::ir::LiteralValue;
use crate::objects::dataframe::Dataframe;
use crate::objects::dict::DictObject;
use crate::objects::{module, ObjectBehavior, ObjectType, QlObject};
use crate::registry::UdtfDefinition;
use crate::state::CompilerState;

/// Default materialized into a fresh node when an argument is omitted.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(LiteralValue),
    StrTuple(Vec<String>),
    EmptyDict,
    None,
}

impl DefaultValue {
    pub fn int(value: i64) -> Self {
        DefaultValue::Literal(LiteralValue::Int64(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        DefaultValue::Literal(LiteralValue::String(value.into()))
    }

    fn materialize(&self, state: &mut CompilerState, location: SourceLocation) -> Result<QlObject> {
        let graph = &mut state.graph;
        let node = match self {
            DefaultValue::Literal(LiteralValue::Boolean(v)) => graph.create_bool(location, *v)?,
            DefaultValue::Literal(LiteralValue::Int64(v)) => graph.create_int(location, *v)?,
            DefaultValue::Literal(LiteralValue::Float64(v)) => graph.create_float(location, *v)?,
            DefaultValue::Literal(LiteralValue::String(v)) => graph.create_string(location, v.clone())?,
            DefaultValue::Literal(LiteralValue::Time64Ns(v)) => graph.create_time(location, *v)?,
            DefaultValue::Literal(LiteralValue::Uint128(v)) => graph.create_uint128(location, *v)?,
            DefaultValue::StrTuple(values) => {
                let items = values
                    .iter()
                    .map(|v| graph.create_string(location, v.clone()))
                    .collect::<Result<Vec<_>>>()?;
                graph.create_tuple(location, items)?
            }
            DefaultValue::EmptyDict => return Ok(QlObject::Dict(DictObject::default())),
            DefaultValue::None => return Ok(QlObject::None),
        };
        Ok(QlObject::expr(node))
    }
}

/// Parameters a function object accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub arg_names: Vec<String>,
    pub defaults: Vec<(String, DefaultValue)>,
    /// Extra positional arguments are collected instead of rejected.
    pub variadic_args: bool,
    /// Unknown keyword arguments are collected instead of rejected.
    pub variadic_kwargs: bool,
}

impl Signature {
    pub fn new(arg_names: &[&str]) -> Self {
        Self {
            arg_names: arg_names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_default(mut self, name: &str, value: DefaultValue) -> Self {
        self.defaults.push((name.to_string(), value));
        self
    }

    pub fn with_variadic_args(mut self) -> Self {
        self.variadic_args = true;
        self
    }

    pub fn with_variadic_kwargs(mut self) -> Self {
        self.variadic_kwargs = true;
        self
    }

    pub fn default_for(&self, name: &str) -> Option<&DefaultValue> {
        self.defaults.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

pub type DataframeHandler =
    fn(&mut CompilerState, &Dataframe, SourceLocation, &ParsedArgs) -> Result<QlObject>;
pub type FreeHandler = fn(&mut CompilerState, SourceLocation, &ParsedArgs) -> Result<QlObject>;

/// What a function object runs once its arguments are bound.
#[derive(Clone)]
pub enum Binding {
    /// Method bound to a dataframe receiver.
    Dataframe {
        receiver: Dataframe,
        handler: DataframeHandler,
    },
    Free(FreeHandler),
    /// Registry scalar function; builds a Func expression.
    ScalarFunction(String),
    /// Registry table function; builds a UDTFSource.
    TableFunction(Arc<UdtfDefinition>),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Dataframe { receiver, .. } => {
                f.debug_struct("Dataframe").field("receiver", receiver).finish()
            }
            Binding::Free(_) => f.write_str("Free"),
            Binding::ScalarFunction(name) => f.debug_tuple("ScalarFunction").field(name).finish(),
            Binding::TableFunction(udtf) => f.debug_tuple("TableFunction").field(&udtf.name).finish(),
        }
    }
}

/// Arguments of one call, as written.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<QlObject>,
    pub kwargs: Vec<(String, QlObject)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: QlObject) -> Self {
        self.positional.push(value);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: QlObject) -> Self {
        self.kwargs.push((name.into(), value));
        self
    }
}

/// Arguments bound to a signature with defaults applied.
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    args: Vec<(String, QlObject)>,
    kwargs: Vec<(String, QlObject)>,
    varargs: Vec<QlObject>,
}

impl ParsedArgs {
    pub fn get(&self, name: &str) -> Result<&QlObject> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| PqlError::Graph(format!("argument '{name}' was not bound")))
    }

    /// Named arguments in signature order.
    pub fn args(&self) -> &[(String, QlObject)] {
        &self.args
    }

    /// Variadic keyword arguments in call order.
    pub fn kwargs(&self) -> &[(String, QlObject)] {
        &self.kwargs
    }

    /// Variadic positional arguments in call order.
    pub fn varargs(&self) -> &[QlObject] {
        &self.varargs
    }
}

/// Callable value: a name, a signature and what to run.
#[derive(Debug, Clone)]
pub struct FuncObject {
    name: String,
    signature: Arc<Signature>,
    binding: Binding,
}

impl FuncObject {
    pub fn new(name: impl Into<String>, signature: Arc<Signature>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            signature,
            binding,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        args: CallArgs,
    ) -> Result<QlObject> {
        let parsed = self.bind(state, location, args)?;
        match &self.binding {
            Binding::Dataframe { receiver, handler } => handler(state, receiver, location, &parsed),
            Binding::Free(handler) => handler(state, location, &parsed),
            Binding::ScalarFunction(name) => {
                module::call_scalar_function(state, location, name, &parsed)
            }
            Binding::TableFunction(udtf) => {
                module::call_table_function(state, location, udtf, &parsed)
            }
        }
    }

    fn bind(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        args: CallArgs,
    ) -> Result<ParsedArgs> {
        let sig = &self.signature;
        let given = args.positional.len();
        let mut slots: Vec<(String, Option<QlObject>)> =
            sig.arg_names.iter().map(|n| (n.clone(), None)).collect();
        let mut varargs = Vec::new();

        for (idx, value) in args.positional.into_iter().enumerate() {
            if let Some(slot) = slots.get_mut(idx) {
                slot.1 = Some(value);
            } else if sig.variadic_args {
                varargs.push(value);
            } else {
                return Err(PqlError::argument(
                    location,
                    format!(
                        "{}() takes {} positional arguments but {} were given",
                        self.name,
                        sig.arg_names.len(),
                        given
                    ),
                ));
            }
        }

        let mut kwargs = Vec::new();
        for (name, value) in args.kwargs {
            match slots.iter_mut().find(|(n, _)| *n == name) {
                Some((_, slot)) if slot.is_some() => {
                    return Err(PqlError::argument(
                        location,
                        format!("{}() got multiple values for argument '{}'", self.name, name),
                    ));
                }
                Some((_, slot)) => *slot = Some(value),
                None if sig.variadic_kwargs => kwargs.push((name, value)),
                None => {
                    return Err(PqlError::argument(
                        location,
                        format!(
                            "{}() got an unexpected keyword argument '{}'",
                            self.name, name
                        ),
                    ));
                }
            }
        }

        let mut bound = Vec::with_capacity(slots.len());
        for (name, slot) in slots {
            let value = match slot {
                Some(value) => value,
                None => match sig.default_for(&name) {
                    Some(default) => default.materialize(state, location)?,
                    None => {
                        return Err(PqlError::argument(
                            location,
                            format!(
                                "{}() missing 1 required argument: '{}'",
                                self.name, name
                            ),
                        ));
                    }
                },
            };
            bound.push((name, value));
        }

        Ok(ParsedArgs {
            args: bound,
            kwargs,
            varargs,
        })
    }
}

impl ObjectBehavior for FuncObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Function
    }

    fn call_method(&self) -> Option<FuncObject> {
        Some(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use pql_common::CompilerConfig;

    fn echo(_: &mut CompilerState, _: SourceLocation, args: &ParsedArgs) -> Result<QlObject> {
        Ok(args.get("b")?.clone())
    }

    fn func() -> FuncObject {
        let sig = Signature::new(&["a", "b"]).with_default("b", DefaultValue::int(5));
        FuncObject::new("f", Arc::new(sig), Binding::Free(echo))
    }

    fn state() -> CompilerState {
        CompilerState::with_static_registry(StaticRegistry::new(), CompilerConfig::default())
    }

    #[test]
    fn missing_optional_argument_materializes_default() {
        let mut state = state();
        let at = SourceLocation::new(1, 1);
        let out = func()
            .call(&mut state, at, CallArgs::new().arg(QlObject::None))
            .expect("call");
        let node = out.node().expect("default is a node");
        assert_eq!(state.graph.expression(node).expect("expr").as_int(), Some(5));
    }

    #[test]
    fn binding_errors_name_the_function() {
        let mut state = state();
        let at = SourceLocation::new(1, 1);
        let f = func();

        let err = f
            .call(&mut state, at, CallArgs::new().kwarg("b", QlObject::None))
            .expect_err("missing a");
        assert_eq!(err.message(), "f() missing 1 required argument: 'a'");

        let err = f
            .call(
                &mut state,
                at,
                CallArgs::new().arg(QlObject::None).kwarg("a", QlObject::None),
            )
            .expect_err("duplicate");
        assert_eq!(err.message(), "f() got multiple values for argument 'a'");

        let err = f
            .call(
                &mut state,
                at,
                CallArgs::new().arg(QlObject::None).kwarg("c", QlObject::None),
            )
            .expect_err("unknown kwarg");
        assert_eq!(err.message(), "f() got an unexpected keyword argument 'c'");

        let err = f
            .call(
                &mut state,
                at,
                CallArgs::new()
                    .arg(QlObject::None)
                    .arg(QlObject::None)
                    .arg(QlObject::None),
            )
            .expect_err("too many");
        assert_eq!(err.message(), "f() takes 2 positional arguments but 3 were given");
    }
}
