//! Structural predicates over IR nodes.
//!
//! Handlers classify argument nodes with a [`Pattern`] before reading their
//! payload. A failed match becomes a located "wrong argument kind" error that
//! names the argument, the expected shape and the actual node type.

use pql_common::{NodeId, PqlError, Result};

use crate::ir::{Expression, IrGraph, NodeType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Operator,
    Expression,
    Column,
    String,
    Int,
    Float,
    Bool,
    Func,
    List,
    Tuple,
    /// List or tuple.
    Collection,
    /// Any literal value.
    Literal,
    /// List whose every element matches.
    ListOf(Box<Pattern>),
    /// List or tuple whose every element matches.
    CollectionWithChildren(Box<Pattern>),
}

pub fn list_of(pattern: Pattern) -> Pattern {
    Pattern::ListOf(Box::new(pattern))
}

pub fn collection_with_children(pattern: Pattern) -> Pattern {
    Pattern::CollectionWithChildren(Box::new(pattern))
}

impl Pattern {
    pub fn matches(&self, graph: &IrGraph, id: NodeId) -> bool {
        let Ok(node) = graph.get(id) else {
            return false;
        };
        let node_type = node.node_type();
        match self {
            Pattern::Any => true,
            Pattern::Operator => node.is_operator(),
            Pattern::Expression => node.is_expression(),
            Pattern::Column => node_type == NodeType::Column,
            Pattern::String => node_type == NodeType::String,
            Pattern::Int => node_type == NodeType::Int,
            Pattern::Float => node_type == NodeType::Float,
            Pattern::Bool => node_type == NodeType::Bool,
            Pattern::Func => node_type == NodeType::Func,
            Pattern::List => node_type == NodeType::List,
            Pattern::Tuple => node_type == NodeType::Tuple,
            Pattern::Collection => matches!(node_type, NodeType::List | NodeType::Tuple),
            Pattern::Literal => node.as_expression().is_some_and(|e| e.literal().is_some()),
            Pattern::ListOf(inner) => match node.as_expression() {
                Some(Expression::List(items)) => items.iter().all(|&c| inner.matches(graph, c)),
                _ => false,
            },
            Pattern::CollectionWithChildren(inner) => match node.as_expression() {
                Some(Expression::List(items)) | Some(Expression::Tuple(items)) => {
                    items.iter().all(|&c| inner.matches(graph, c))
                }
                _ => false,
            },
        }
    }

    /// Expected-shape phrase used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Pattern::Any => "anything".to_string(),
            Pattern::Operator => "an operator".to_string(),
            Pattern::Expression => "an expression".to_string(),
            Pattern::Column => "a column".to_string(),
            Pattern::String => "a string".to_string(),
            Pattern::Int => "an int".to_string(),
            Pattern::Float => "a float".to_string(),
            Pattern::Bool => "a bool".to_string(),
            Pattern::Func => "a function".to_string(),
            Pattern::List => "a list".to_string(),
            Pattern::Tuple => "a tuple".to_string(),
            Pattern::Collection => "a list or tuple".to_string(),
            Pattern::Literal => "a literal".to_string(),
            Pattern::ListOf(inner) => format!("a list of {}", inner.plural()),
            Pattern::CollectionWithChildren(inner) => {
                format!("a list or tuple of {}", inner.plural())
            }
        }
    }

    fn plural(&self) -> String {
        match self {
            Pattern::Any => "anything".to_string(),
            Pattern::Operator => "operators".to_string(),
            Pattern::Expression => "expressions".to_string(),
            Pattern::Column => "columns".to_string(),
            Pattern::String => "strings".to_string(),
            Pattern::Int => "ints".to_string(),
            Pattern::Float => "floats".to_string(),
            Pattern::Bool => "bools".to_string(),
            Pattern::Func => "functions".to_string(),
            Pattern::List => "lists".to_string(),
            Pattern::Tuple => "tuples".to_string(),
            Pattern::Collection => "lists or tuples".to_string(),
            Pattern::Literal => "literals".to_string(),
            nested => nested.describe(),
        }
    }
}

/// Actual type name of a node for diagnostics.
pub fn type_string(graph: &IrGraph, id: NodeId) -> String {
    graph
        .node_type(id)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| format!("<missing node {id}>"))
}

/// `'{arg}' must be {expected}, got {actual}` at the node's location.
pub fn wrong_kind(graph: &IrGraph, id: NodeId, arg_name: &str, expected: &str) -> PqlError {
    match graph.get(id) {
        Ok(node) => PqlError::argument(
            node.location(),
            format!("'{arg_name}' must be {expected}, got {}", node.node_type()),
        ),
        Err(err) => err,
    }
}

/// Return `id` if it matches `pattern`, otherwise a wrong-kind error.
pub fn expect(graph: &IrGraph, id: NodeId, arg_name: &str, pattern: &Pattern) -> Result<NodeId> {
    if pattern.matches(graph, id) {
        Ok(id)
    } else {
        Err(wrong_kind(graph, id, arg_name, &pattern.describe()))
    }
}

/// String payload of a node already known to match [`Pattern::String`].
pub fn string_value(graph: &IrGraph, id: NodeId) -> Result<String> {
    graph
        .expression(id)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PqlError::Graph(format!("node {id} is not a String")))
}

/// Strings held by a list or tuple node.
pub fn strings_from_collection(graph: &IrGraph, id: NodeId) -> Result<Vec<String>> {
    let items = graph
        .expression(id)?
        .as_collection()
        .ok_or_else(|| PqlError::Graph(format!("node {id} is not a list or tuple")))?;
    items
        .iter()
        .map(|&item| {
            if Pattern::String.matches(graph, item) {
                string_value(graph, item)
            } else {
                Err(PqlError::argument(
                    graph.location(item)?,
                    format!(
                        "The elements of the list must be Strings, not {}",
                        type_string(graph, item)
                    ),
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pql_common::SourceLocation;

    #[test]
    fn list_of_checks_every_child() {
        let mut graph = IrGraph::new();
        let at = SourceLocation::new(2, 4);
        let a = graph.create_string(at, "a").expect("a");
        let one = graph.create_int(at, 1).expect("1");
        let strings = graph.create_list(at, vec![a]).expect("list");
        let mixed = graph.create_list(at, vec![a, one]).expect("list");
        let tuple = graph.create_tuple(at, vec![a]).expect("tuple");

        let p = list_of(Pattern::String);
        assert!(p.matches(&graph, strings));
        assert!(!p.matches(&graph, mixed));
        assert!(!p.matches(&graph, tuple));
        assert!(collection_with_children(Pattern::String).matches(&graph, tuple));
        assert_eq!(p.describe(), "a list of strings");
    }

    #[test]
    fn wrong_kind_names_argument_expected_and_actual() {
        let mut graph = IrGraph::new();
        let s = graph.create_string(SourceLocation::new(3, 7), "x").expect("s");
        let err = expect(&graph, s, "right", &Pattern::Operator).expect_err("not an operator");
        assert_eq!(err.to_string(), "3:7: 'right' must be an operator, got String");
    }

    #[test]
    fn strings_from_collection_rejects_non_strings() {
        let mut graph = IrGraph::new();
        let at = SourceLocation::new(1, 1);
        let one = graph.create_int(at, 1).expect("1");
        let list = graph.create_list(at, vec![one]).expect("list");
        let err = strings_from_collection(&graph, list).expect_err("int element");
        assert!(err.message().contains("must be Strings, not Int"));
    }
}
