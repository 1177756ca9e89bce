use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PqlError, Result};

/// Plan-level options copied once onto the lowered plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    pub explain: bool,
    pub analyze: bool,
    pub max_output_rows_per_table: i64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            explain: false,
            analyze: false,
            max_output_rows_per_table: 10_000,
        }
    }
}

/// What lowering does with operators that cannot reach any sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnusedOperatorPolicy {
    /// Delete them from the graph and keep going.
    #[default]
    Prune,
    /// Fail the compile.
    Reject,
}

/// OTel collector endpoint used when a script does not name one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointDefaults {
    pub url: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Compiler configuration shared by the planner and the plan lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub plan_options: PlanOptions,
    pub unused_operator_policy: UnusedOperatorPolicy,
    /// Batch size recorded on every join payload.
    pub join_rows_per_batch: i64,
    /// Address recorded on GRPCSink operators.
    pub grpc_address: String,
    /// Insert GRPC bridges in front of blocking operators before lowering.
    pub split_at_blocking_operators: bool,
    pub default_otel_endpoint: Option<EndpointDefaults>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            plan_options: PlanOptions::default(),
            unused_operator_policy: UnusedOperatorPolicy::default(),
            join_rows_per_batch: 1024,
            grpc_address: String::new(),
            split_at_blocking_operators: false,
            default_otel_endpoint: None,
        }
    }
}

impl CompilerConfig {
    /// Reject configurations lowering cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.plan_options.max_output_rows_per_table < 0 {
            return Err(PqlError::InvalidConfig(format!(
                "max_output_rows_per_table must be non-negative, got {}",
                self.plan_options.max_output_rows_per_table
            )));
        }
        if self.join_rows_per_batch <= 0 {
            return Err(PqlError::InvalidConfig(format!(
                "join_rows_per_batch must be positive, got {}",
                self.join_rows_per_batch
            )));
        }
        if let Some(endpoint) = &self.default_otel_endpoint {
            if endpoint.url.is_empty() {
                return Err(PqlError::InvalidConfig(
                    "default_otel_endpoint.url must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
