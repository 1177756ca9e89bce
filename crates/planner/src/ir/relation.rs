use std::collections::BTreeMap;

use pql_common::{DataType, NodeId, PqlError, Result, SemanticType};
use serde::{Deserialize, Serialize};

/// One output column of an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationColumn {
    pub name: String,
    pub data_type: DataType,
    pub semantic_type: SemanticType,
}

/// Ordered output schema of an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    columns: Vec<RelationColumn>,
}

impl Relation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut relation = Self::new();
        for (name, data_type) in columns {
            relation.add_column(name, data_type, SemanticType::StNone);
        }
        relation
    }

    /// Builder form of [`Relation::add_column`] with no semantic type.
    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.add_column(name, data_type, SemanticType::StNone);
        self
    }

    pub fn with_semantic_column(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        semantic_type: SemanticType,
    ) -> Self {
        self.add_column(name, data_type, semantic_type);
        self
    }

    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        semantic_type: SemanticType,
    ) {
        self.columns.push(RelationColumn {
            name: name.into(),
            data_type,
            semantic_type,
        });
    }

    pub fn push(&mut self, column: RelationColumn) {
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[RelationColumn] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&RelationColumn> {
        self.columns.get(idx)
    }

    /// Offset of the first column with this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&RelationColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn semantic_types(&self) -> Vec<SemanticType> {
        self.columns.iter().map(|c| c.semantic_type).collect()
    }

    /// Project the named columns in the given order.
    ///
    /// Returns the projected relation and the source offsets, or the first
    /// missing name.
    pub fn select(&self, names: &[String]) -> std::result::Result<(Relation, Vec<usize>), String> {
        let mut out = Relation::new();
        let mut idxs = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.column_index(name).ok_or_else(|| name.clone())?;
            out.push(self.columns[idx].clone());
            idxs.push(idx);
        }
        Ok((out, idxs))
    }
}

/// Output relation of every operator, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationMap {
    relations: BTreeMap<NodeId, Relation>,
}

impl RelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, relation: Relation) {
        self.relations.insert(id, relation);
    }

    pub fn get(&self, id: NodeId) -> Result<&Relation> {
        self.relations
            .get(&id)
            .ok_or_else(|| PqlError::Lowering(format!("no relation resolved for operator {id}")))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.relations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Relation)> {
        self.relations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_keeps_requested_order() {
        let rel = Relation::new()
            .with_column("a", DataType::Int64)
            .with_column("b", DataType::String)
            .with_column("c", DataType::Float64);
        let (out, idxs) = rel
            .select(&["c".to_string(), "a".to_string()])
            .expect("select");
        assert_eq!(out.names(), vec!["c", "a"]);
        assert_eq!(idxs, vec![2, 0]);
        assert_eq!(rel.select(&["zz".to_string()]), Err("zz".to_string()));
    }
}
