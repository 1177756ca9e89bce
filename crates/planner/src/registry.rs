use std::collections::BTreeMap;

use pql_common::DataType;

use crate::ir::{LiteralValue, Relation};

/// Table schemas visible to a compile.
/// The embedding service provides this from its table store.
pub trait SchemaProvider: Send + Sync {
    /// Relation of a table, or `None` when the table does not exist.
    fn table_relation(&self, table: &str) -> Option<Relation>;
}

/// Function lookup used while evaluating scripts and resolving types.
pub trait FunctionRegistry: Send + Sync {
    /// Return type of a scalar function for the given argument types.
    fn udf_return_type(&self, name: &str, arg_types: &[DataType]) -> Option<DataType>;
    /// Return type of an aggregate function for the given argument types.
    fn uda_return_type(&self, name: &str, arg_types: &[DataType]) -> Option<DataType>;
    fn is_udf(&self, name: &str) -> bool;
    fn is_uda(&self, name: &str) -> bool;
    fn udtf(&self, name: &str) -> Option<UdtfDefinition>;
}

/// Declared argument of a table function.
#[derive(Debug, Clone, PartialEq)]
pub struct UdtfArg {
    pub name: String,
    pub data_type: DataType,
    pub default: Option<LiteralValue>,
}

/// Table function: named, typed arguments and a fixed output relation.
#[derive(Debug, Clone, PartialEq)]
pub struct UdtfDefinition {
    pub name: String,
    pub args: Vec<UdtfArg>,
    pub relation: Relation,
}

impl UdtfDefinition {
    pub fn new(name: impl Into<String>, relation: Relation) -> Self {
        Self {
            name: name.into(),
            args: vec![],
            relation,
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.args.push(UdtfArg {
            name: name.into(),
            data_type,
            default: None,
        });
        self
    }

    pub fn with_default_arg(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default: LiteralValue,
    ) -> Self {
        self.args.push(UdtfArg {
            name: name.into(),
            data_type,
            default: Some(default),
        });
        self
    }
}

type Overloads = BTreeMap<String, Vec<(Vec<DataType>, DataType)>>;

/// In-memory registry backing both lookups, built up front.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    tables: BTreeMap<String, Relation>,
    udfs: Overloads,
    udas: Overloads,
    udtfs: BTreeMap<String, UdtfDefinition>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.tables.insert(name.into(), relation);
        self
    }

    pub fn with_udf(mut self, name: impl Into<String>, args: &[DataType], ret: DataType) -> Self {
        self.udfs
            .entry(name.into())
            .or_default()
            .push((args.to_vec(), ret));
        self
    }

    pub fn with_uda(mut self, name: impl Into<String>, args: &[DataType], ret: DataType) -> Self {
        self.udas
            .entry(name.into())
            .or_default()
            .push((args.to_vec(), ret));
        self
    }

    pub fn with_udtf(mut self, udtf: UdtfDefinition) -> Self {
        self.udtfs.insert(udtf.name.clone(), udtf);
        self
    }

    /// Register the functions script operators lower to
    /// (arithmetic, comparison and boolean logic).
    pub fn with_builtin_operators(mut self) -> Self {
        use DataType::*;
        let numeric = [
            ([Int64, Int64], Int64),
            ([Float64, Float64], Float64),
            ([Int64, Float64], Float64),
            ([Float64, Int64], Float64),
        ];
        for name in ["add", "subtract", "multiply", "divide", "modulo"] {
            for (args, ret) in numeric {
                self = self.with_udf(name, &args, ret);
            }
        }
        self = self
            .with_udf("add", &[String, String], String)
            .with_udf("add", &[Time64Ns, Int64], Time64Ns)
            .with_udf("subtract", &[Time64Ns, Int64], Time64Ns)
            .with_udf("subtract", &[Time64Ns, Time64Ns], Int64);

        let comparable = [Boolean, Int64, Float64, String, Time64Ns, Uint128];
        for name in [
            "equal",
            "notEqual",
            "lessThan",
            "lessThanEqual",
            "greaterThan",
            "greaterThanEqual",
        ] {
            for t in comparable {
                self = self.with_udf(name, &[t, t], Boolean);
            }
            self = self
                .with_udf(name, &[Int64, Float64], Boolean)
                .with_udf(name, &[Float64, Int64], Boolean);
        }
        self.with_udf("logicalAnd", &[Boolean, Boolean], Boolean)
            .with_udf("logicalOr", &[Boolean, Boolean], Boolean)
            .with_udf("logicalNot", &[Boolean], Boolean)
    }
}

fn resolve(overloads: &Overloads, name: &str, arg_types: &[DataType]) -> Option<DataType> {
    overloads
        .get(name)?
        .iter()
        .find(|(args, _)| args.as_slice() == arg_types)
        .map(|(_, ret)| *ret)
}

impl SchemaProvider for StaticRegistry {
    fn table_relation(&self, table: &str) -> Option<Relation> {
        self.tables.get(table).cloned()
    }
}

impl FunctionRegistry for StaticRegistry {
    fn udf_return_type(&self, name: &str, arg_types: &[DataType]) -> Option<DataType> {
        resolve(&self.udfs, name, arg_types)
    }

    fn uda_return_type(&self, name: &str, arg_types: &[DataType]) -> Option<DataType> {
        resolve(&self.udas, name, arg_types)
    }

    fn is_udf(&self, name: &str) -> bool {
        self.udfs.contains_key(name)
    }

    fn is_uda(&self, name: &str) -> bool {
        self.udas.contains_key(name)
    }

    fn udtf(&self, name: &str) -> Option<UdtfDefinition> {
        self.udtfs.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloads_resolve_by_exact_argument_types() {
        let reg = StaticRegistry::new()
            .with_builtin_operators()
            .with_uda("mean", &[DataType::Int64], DataType::Float64);
        assert_eq!(
            reg.udf_return_type("add", &[DataType::Int64, DataType::Float64]),
            Some(DataType::Float64)
        );
        assert_eq!(
            reg.udf_return_type("equal", &[DataType::String, DataType::String]),
            Some(DataType::Boolean)
        );
        assert_eq!(reg.udf_return_type("add", &[DataType::Boolean]), None);
        assert!(reg.is_uda("mean"));
        assert!(!reg.is_udf("mean"));
    }
}
