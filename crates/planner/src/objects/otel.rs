//! OpenTelemetry export builders.
//!
//! Builders map named arguments onto the export payload and record every
//! column they name as an [`ExpectedColumn`], checked against the sink's
//! input relation once relations are resolved.

use std::collections::BTreeMap;

use pql_common::{DataType, EndpointDefaults, NodeId, PqlError, Result, SourceLocation};

use crate::ir::pattern;
use crate::ir::{ExpectedColumn, IrGraph, NodeType, OTelExportSinkOp, Operator};
use crate::objects::func::ParsedArgs;
use crate::objects::{arg_as, delete_consumed, ObjectBehavior, ObjectType, QlObject};
use crate::planpb::{self, otel_metric, otel_metric_summary, OTelSpanKind};
use crate::state::CompilerState;

/// Collector endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    pub attributes: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn to_proto(&self) -> planpb::OTelEndpointConfig {
        planpb::OTelEndpointConfig {
            url: self.url.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

impl From<&EndpointDefaults> for EndpointConfig {
    fn from(value: &EndpointDefaults) -> Self {
        Self {
            url: value.url.clone(),
            attributes: value.attributes.clone(),
        }
    }
}

impl ObjectBehavior for EndpointConfig {
    fn object_type(&self) -> ObjectType {
        ObjectType::EndpointConfig
    }
}

/// Gauge or summary data of a metric, before it is wrapped by `Metric`.
#[derive(Debug, Clone, PartialEq)]
pub struct OTelMetricData {
    pub data: otel_metric::Data,
    pub time_column: String,
    pub start_time_column: String,
    pub expected_columns: Vec<ExpectedColumn>,
}

impl ObjectBehavior for OTelMetricData {
    fn object_type(&self) -> ObjectType {
        ObjectType::OTelMetricData
    }
}

/// Finished export spec, turned into an OTelExportSink by `px.export`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exporter {
    pub payload: planpb::OTelExportSinkOperator,
    pub expected_columns: Vec<ExpectedColumn>,
}

impl Exporter {
    pub fn create_sink(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        parent: NodeId,
    ) -> Result<NodeId> {
        state.graph.create_operator(
            location,
            vec![parent],
            Operator::OTelExportSink(OTelExportSinkOp {
                payload: self.payload.clone(),
                expected_columns: self.expected_columns.clone(),
            }),
        )
    }
}

impl ObjectBehavior for Exporter {
    fn object_type(&self) -> ObjectType {
        ObjectType::Exporter
    }
}

/// Reads builder arguments, tracking expected columns and consumed literals.
struct ArgReader<'a> {
    graph: &'a IrGraph,
    location: SourceLocation,
    args: &'a ParsedArgs,
    expected: Vec<ExpectedColumn>,
    consumed: Vec<NodeId>,
}

impl<'a> ArgReader<'a> {
    fn new(graph: &'a IrGraph, location: SourceLocation, args: &'a ParsedArgs) -> Self {
        Self {
            graph,
            location,
            args,
            expected: vec![],
            consumed: vec![],
        }
    }

    fn string_node(&self, arg: &str) -> Result<(NodeId, String)> {
        let node = arg_as(self.graph, self.location, self.args.get(arg)?, arg, NodeType::String)?;
        Ok((node, pattern::string_value(self.graph, node)?))
    }

    /// Literal string copied into the payload.
    fn string(&mut self, arg: &str) -> Result<String> {
        let (node, value) = self.string_node(arg)?;
        self.consumed.push(node);
        Ok(value)
    }

    /// String naming an input column.
    fn column(&mut self, arg: &str, accepted: &[DataType]) -> Result<String> {
        let (node, name) = self.string_node(arg)?;
        self.expect(node, arg, &name, accepted);
        Ok(name)
    }

    /// Like [`ArgReader::column`], but the empty string leaves the field unset.
    fn optional_column(&mut self, arg: &str, accepted: &[DataType]) -> Result<String> {
        let (node, name) = self.string_node(arg)?;
        if name.is_empty() {
            self.consumed.push(node);
        } else {
            self.expect(node, arg, &name, accepted);
        }
        Ok(name)
    }

    fn int(&mut self, arg: &str) -> Result<(NodeId, i64)> {
        let node = arg_as(self.graph, self.location, self.args.get(arg)?, arg, NodeType::Int)?;
        self.consumed.push(node);
        Ok((node, self.graph.expression(node)?.as_int().unwrap_or_default()))
    }

    fn dict(&self, arg: &str) -> Result<&'a crate::objects::DictObject> {
        match self.args.get(arg)? {
            QlObject::Dict(dict) => Ok(dict),
            other => Err(PqlError::argument(
                self.location,
                format!(
                    "Expected {arg} to be a dictionary, received {}",
                    other.type_name(self.graph)
                ),
            )),
        }
    }

    /// Attribute name to column map.
    fn attributes(&mut self, arg: &str) -> Result<Vec<planpb::OTelAttribute>> {
        let dict = self.dict(arg)?;
        let mut out = Vec::with_capacity(dict.len());
        for (key, value) in dict.pairs() {
            let key_node = arg_as(self.graph, self.location, key, "attribute", NodeType::String)?;
            let name = pattern::string_value(self.graph, key_node)?;
            let value_node =
                arg_as(self.graph, self.location, value, "attribute", NodeType::String)?;
            let column = pattern::string_value(self.graph, value_node)?;
            self.consumed.push(key_node);
            self.expect(value_node, "attribute", &column, &[DataType::String]);
            out.push(planpb::OTelAttribute {
                name,
                value_column: column,
            });
        }
        Ok(out)
    }

    fn expect(&mut self, node: NodeId, role: &str, column: &str, accepted: &[DataType]) {
        self.expected.push(ExpectedColumn {
            node,
            role: role.to_string(),
            column_name: column.to_string(),
            accepted_types: accepted.to_vec(),
        });
    }
}

fn endpoint_arg(
    state: &CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<planpb::OTelEndpointConfig> {
    match args.get("endpoint")? {
        QlObject::EndpointConfig(endpoint) => Ok(endpoint.to_proto()),
        QlObject::None => state
            .config()
            .default_otel_endpoint
            .as_ref()
            .map(|defaults| EndpointConfig::from(defaults).to_proto())
            .ok_or_else(|| {
                PqlError::semantic(
                    location,
                    "no default config found for endpoint, please specify one",
                )
            }),
        other => Err(PqlError::argument(
            location,
            format!(
                "expected Endpoint type for 'endpoint' arg, received {}",
                other.type_name(&state.graph)
            ),
        )),
    }
}

/// `px.otel.Endpoint(url, attributes={})`.
pub(crate) fn endpoint(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let mut reader = ArgReader::new(&state.graph, location, args);
    let url = reader.string("url")?;
    let dict = reader.dict("attributes")?;
    let mut attributes = BTreeMap::new();
    for (key, value) in dict.pairs() {
        let key_node = arg_as(reader.graph, location, key, "attribute", NodeType::String)?;
        let value_node = arg_as(reader.graph, location, value, "attribute", NodeType::String)?;
        attributes.insert(
            pattern::string_value(reader.graph, key_node)?,
            pattern::string_value(reader.graph, value_node)?,
        );
        reader.consumed.extend([key_node, value_node]);
    }
    let consumed = reader.consumed;
    delete_consumed(&mut state.graph, consumed)?;
    Ok(QlObject::EndpointConfig(EndpointConfig { url, attributes }))
}

/// `px.otel.trace.Span(...)`.
pub(crate) fn span(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let endpoint_config = endpoint_arg(state, location, args)?;
    let mut reader = ArgReader::new(&state.graph, location, args);
    let name = reader.string("name")?;
    let start_time_unix_nano_column =
        reader.column("start_time_unix_nano", &[DataType::Time64Ns])?;
    let end_time_unix_nano_column = reader.column("end_time_unix_nano", &[DataType::Time64Ns])?;
    let span_id_column = reader.optional_column("span_id", &[DataType::String])?;
    let parent_span_id_column = reader.optional_column("parent_span_id", &[DataType::String])?;
    let trace_id_column = reader.optional_column("trace_id", &[DataType::String])?;
    let status_column = reader.optional_column("status", &[DataType::Int64])?;
    let (kind_node, kind_value) = reader.int("kind")?;
    let kind = i32::try_from(kind_value)
        .ok()
        .and_then(|k| OTelSpanKind::try_from(k).ok())
        .ok_or_else(|| {
            PqlError::semantic(
                reader.graph.location(kind_node).unwrap_or(location),
                format!("Kind value '{kind_value}' is not a valid option"),
            )
        })?;
    let attributes = reader.attributes("attributes")?;

    let span = planpb::OTelSpan {
        name,
        attributes,
        trace_id_column,
        span_id_column,
        parent_span_id_column,
        start_time_unix_nano_column,
        end_time_unix_nano_column,
        kind: kind.into(),
        status_column,
    };
    let ArgReader {
        expected, consumed, ..
    } = reader;
    delete_consumed(&mut state.graph, consumed)?;
    Ok(QlObject::Exporter(Exporter {
        payload: planpb::OTelExportSinkOperator {
            endpoint_config: Some(endpoint_config),
            spans: vec![span],
            metrics: vec![],
        },
        expected_columns: expected,
    }))
}

/// `px.otel.metric.Metric(name, description, data, ...)`.
pub(crate) fn metric(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let endpoint_config = endpoint_arg(state, location, args)?;
    let data = match args.get("data")? {
        QlObject::OTelMetricData(data) => data.clone(),
        other => {
            return Err(PqlError::argument(
                location,
                format!(
                    "Expected 'data' to be a Gauge or Summary, received {}",
                    other.type_name(&state.graph)
                ),
            ));
        }
    };
    let mut reader = ArgReader::new(&state.graph, location, args);
    let name = reader.string("name")?;
    let description = reader.string("description")?;
    let attributes = reader.attributes("attributes")?;
    let ArgReader {
        mut expected,
        consumed,
        ..
    } = reader;
    expected.extend(data.expected_columns);

    let metric = planpb::OTelMetric {
        name,
        description,
        attributes,
        time_unix_nano_column: data.time_column,
        start_time_unix_nano_column: data.start_time_column,
        data: Some(data.data),
    };
    delete_consumed(&mut state.graph, consumed)?;
    Ok(QlObject::Exporter(Exporter {
        payload: planpb::OTelExportSinkOperator {
            endpoint_config: Some(endpoint_config),
            spans: vec![],
            metrics: vec![metric],
        },
        expected_columns: expected,
    }))
}

/// `px.otel.metric.Gauge(start_time_unix_nano, time_unix_nano, value)`.
pub(crate) fn gauge(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let mut reader = ArgReader::new(&state.graph, location, args);
    let start_time_column = reader.column("start_time_unix_nano", &[DataType::Time64Ns])?;
    let time_column = reader.column("time_unix_nano", &[DataType::Time64Ns])?;
    let value_column = reader.column("value", &[DataType::Int64, DataType::Float64])?;
    let ArgReader {
        expected, consumed, ..
    } = reader;
    delete_consumed(&mut state.graph, consumed)?;
    Ok(QlObject::OTelMetricData(OTelMetricData {
        data: otel_metric::Data::Gauge(planpb::OTelMetricGauge { value_column }),
        time_column,
        start_time_column,
        expected_columns: expected,
    }))
}

/// `px.otel.metric.Summary(start_time_unix_nano, time_unix_nano, count, sum, quantile_values)`.
pub(crate) fn summary(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let mut reader = ArgReader::new(&state.graph, location, args);
    let start_time_column = reader.column("start_time_unix_nano", &[DataType::Time64Ns])?;
    let time_column = reader.column("time_unix_nano", &[DataType::Time64Ns])?;
    let count_column = reader.column("count", &[DataType::Float64])?;
    let sum_column = reader.column("sum", &[DataType::Float64])?;

    let quantiles = reader.dict("quantile_values")?;
    let mut quantile_values = Vec::with_capacity(quantiles.len());
    for (key, value) in quantiles.pairs() {
        let key_node = arg_as(reader.graph, location, key, "quantile", NodeType::Float)?;
        let quantile = reader
            .graph
            .expression(key_node)?
            .as_float()
            .unwrap_or_default();
        let value_node = arg_as(reader.graph, location, value, "quantile value", NodeType::String)?;
        let column = pattern::string_value(reader.graph, value_node)?;
        reader.consumed.push(key_node);
        reader.expect(value_node, &format!("{quantile}"), &column, &[DataType::Float64]);
        quantile_values.push(otel_metric_summary::ValueAtQuantile {
            quantile,
            value_column: column,
        });
    }

    let ArgReader {
        expected, consumed, ..
    } = reader;
    delete_consumed(&mut state.graph, consumed)?;
    Ok(QlObject::OTelMetricData(OTelMetricData {
        data: otel_metric::Data::Summary(planpb::OTelMetricSummary {
            count_column,
            sum_column,
            quantile_values,
        }),
        time_column,
        start_time_column,
        expected_columns: expected,
    }))
}
