mod support;

use pql_common::{CompilerConfig, EndpointDefaults, NodeId, PqlError};
use pql_planner::ir::Operator;
use pql_planner::objects::{CallArgs, DictObject, QlObject};
use pql_planner::planpb::{operator::Op, otel_metric, OTelSpanKind};
use pql_planner::{Analyzer, CompilerState, OperatorSerializer};

use support::*;

const SERVICE: &[(&str, &str)] = &[("service.name", "service")];

fn endpoint(state: &mut CompilerState, url: &str) -> QlObject {
    let otel = attr_path(state, &px(), &["otel"]);
    let url = string(state, url);
    call(state, &otel, "Endpoint", CallArgs::new().kwarg("url", url)).expect("endpoint")
}

fn span_args(state: &mut CompilerState, start: &str, attributes: &[(&str, &str)]) -> CallArgs {
    let name = string(state, "http.request");
    let start = string(state, start);
    let end = string(state, "time_");
    let attributes = dict(state, attributes);
    CallArgs::new()
        .kwarg("name", name)
        .kwarg("start_time_unix_nano", start)
        .kwarg("end_time_unix_nano", end)
        .kwarg("attributes", attributes)
}

fn span(state: &mut CompilerState, args: CallArgs) -> pql_common::Result<QlObject> {
    let trace = attr_path(state, &px(), &["otel", "trace"]);
    call(state, &trace, "Span", args)
}

fn export(state: &mut CompilerState, df: &QlObject, spec: QlObject) -> NodeId {
    call(
        state,
        &px(),
        "export",
        CallArgs::new().arg(df.clone()).arg(spec),
    )
    .expect("export");
    state
        .graph
        .operator_ids()
        .into_iter()
        .find(|&id| {
            matches!(
                state.graph.operator(id).map(|o| &o.op),
                Ok(Operator::OTelExportSink(_))
            )
        })
        .expect("export sink")
}

#[test]
fn span_export_records_its_columns() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let endpoint = endpoint(&mut state, "otel-collector:4317");
    let args = span_args(&mut state, "time_", SERVICE).kwarg("endpoint", endpoint);
    let spec = span(&mut state, args).expect("span");
    let sink = export(&mut state, &df, spec);

    let Operator::OTelExportSink(op) = &state.graph.operator(sink).expect("sink").op else {
        panic!("export sink expected");
    };
    let roles: Vec<&str> = op.expected_columns.iter().map(|c| c.role.as_str()).collect();
    assert_eq!(
        roles,
        vec!["start_time_unix_nano", "end_time_unix_nano", "attribute"]
    );
    let span = &op.payload.spans[0];
    assert_eq!(span.name, "http.request");
    assert_eq!(span.kind, i32::from(OTelSpanKind::Server));
    assert!(span.trace_id_column.is_empty());
    assert_eq!(span.attributes[0].name, "service.name");
    assert_eq!(span.attributes[0].value_column, "service");

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    let lowered = OperatorSerializer::new(&state.graph, &relations, state.config())
        .serialize(sink)
        .expect("serialize");
    let Some(Op::OtelSinkOp(payload)) = lowered.op else {
        panic!("export payload expected");
    };
    assert_eq!(
        payload.endpoint_config.map(|e| e.url),
        Some("otel-collector:4317".to_string())
    );
}

#[test]
fn column_types_are_checked_once_relations_resolve() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let endpoint = endpoint(&mut state, "otel-collector:4317");
    let args = span_args(&mut state, "latency_ns", SERVICE).kwarg("endpoint", endpoint);
    let spec = span(&mut state, args).expect("span");
    export(&mut state, &df, spec);

    let err = Analyzer::new().analyze(&mut state).expect_err("wrong type");
    assert!(matches!(err, PqlError::Semantic { .. }));
    assert_eq!(
        err.message(),
        "Expected 'start_time_unix_nano' column 'latency_ns' to be one of [TIME64NS], received INT64"
    );
}

#[test]
fn missing_columns_name_their_role() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let endpoint = endpoint(&mut state, "otel-collector:4317");
    let args = span_args(&mut state, "time_", &[("peer", "remote_addr")]).kwarg("endpoint", endpoint);
    let spec = span(&mut state, args).expect("span");
    export(&mut state, &df, spec);

    let err = Analyzer::new().analyze(&mut state).expect_err("no remote_addr column");
    assert_eq!(
        err.message(),
        "Column 'remote_addr' not found in parent dataframe for 'attribute'"
    );
}

#[test]
fn span_kind_must_be_known() {
    let mut state = state();
    let endpoint = endpoint(&mut state, "otel-collector:4317");
    let kind = int(&mut state, 9);
    let args = span_args(&mut state, "time_", SERVICE)
        .kwarg("endpoint", endpoint)
        .kwarg("kind", kind);
    let err = span(&mut state, args).expect_err("kind 9");
    assert_eq!(err.message(), "Kind value '9' is not a valid option");
}

#[test]
fn endpoint_falls_back_to_configured_default() {
    let mut state = state();
    let args = span_args(&mut state, "time_", SERVICE);
    let err = span(&mut state, args).expect_err("no default");
    assert_eq!(
        err.message(),
        "no default config found for endpoint, please specify one"
    );

    let mut state = state_with(CompilerConfig {
        default_otel_endpoint: Some(EndpointDefaults {
            url: "collector.default:4317".into(),
            attributes: [("token".to_string(), "abc".to_string())].into(),
        }),
        ..CompilerConfig::default()
    });
    let args = span_args(&mut state, "time_", SERVICE);
    let Ok(QlObject::Exporter(exporter)) = span(&mut state, args) else {
        panic!("exporter expected");
    };
    let config = exporter.payload.endpoint_config.expect("endpoint");
    assert_eq!(config.url, "collector.default:4317");
    assert_eq!(config.attributes.get("token").map(String::as_str), Some("abc"));
}

#[test]
fn gauge_metric_checks_value_column() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let metric_module = attr_path(&mut state, &px(), &["otel", "metric"]);

    let start = string(&mut state, "time_");
    let time = string(&mut state, "time_");
    let value = string(&mut state, "latency_ns");
    let gauge = call(
        &mut state,
        &metric_module,
        "Gauge",
        CallArgs::new().arg(start).arg(time).arg(value),
    )
    .expect("gauge");

    let endpoint = endpoint(&mut state, "otel-collector:4317");
    let name = string(&mut state, "http.latency");
    let description = string(&mut state, "request latency");
    let metric = call(
        &mut state,
        &metric_module,
        "Metric",
        CallArgs::new()
            .kwarg("name", name)
            .kwarg("description", description)
            .kwarg("data", gauge)
            .kwarg("endpoint", endpoint),
    )
    .expect("metric");
    let sink = export(&mut state, &df, metric);

    let Operator::OTelExportSink(op) = &state.graph.operator(sink).expect("sink").op else {
        panic!("export sink expected");
    };
    assert_eq!(op.expected_columns.len(), 3);
    let metric = &op.payload.metrics[0];
    assert_eq!(metric.time_unix_nano_column, "time_");
    assert_eq!(metric.start_time_unix_nano_column, "time_");
    assert!(matches!(
        &metric.data,
        Some(otel_metric::Data::Gauge(g)) if g.value_column == "latency_ns"
    ));
    Analyzer::new().analyze(&mut state).expect("analyze");
}

fn summary(state: &mut CompilerState, count: &str, sum: &str) -> pql_common::Result<QlObject> {
    let metric_module = attr_path(state, &px(), &["otel", "metric"]);
    let p50 = float(state, 0.5);
    let p99 = float(state, 0.99);
    let c50 = string(state, "p50");
    let c99 = string(state, "p99");
    let quantiles = QlObject::Dict(DictObject::new(vec![p50, p99], vec![c50, c99]));

    let start = string(state, "time_");
    let time = string(state, "time_");
    let count = string(state, count);
    let sum = string(state, sum);
    call(
        state,
        &metric_module,
        "Summary",
        CallArgs::new()
            .arg(start)
            .arg(time)
            .arg(count)
            .arg(sum)
            .kwarg("quantile_values", quantiles),
    )
}

fn export_metric(state: &mut CompilerState, df: &QlObject, data: QlObject) -> NodeId {
    let metric_module = attr_path(state, &px(), &["otel", "metric"]);
    let endpoint = endpoint(state, "otel-collector:4317");
    let name = string(state, "http.latency");
    let description = string(state, "request latency");
    let metric = call(
        state,
        &metric_module,
        "Metric",
        CallArgs::new()
            .kwarg("name", name)
            .kwarg("description", description)
            .kwarg("data", data)
            .kwarg("endpoint", endpoint),
    )
    .expect("metric");
    export(state, df, metric)
}

#[test]
fn summary_quantiles_are_float_keyed() {
    let mut state = state();
    let Ok(QlObject::OTelMetricData(data)) = summary(&mut state, "n", "total") else {
        panic!("summary data expected");
    };

    let otel_metric::Data::Summary(summary) = &data.data else {
        panic!("summary expected");
    };
    let quantiles: Vec<(f64, &str)> = summary
        .quantile_values
        .iter()
        .map(|q| (q.quantile, q.value_column.as_str()))
        .collect();
    assert_eq!(quantiles, vec![(0.5, "p50"), (0.99, "p99")]);
    // start, time, count, sum, two quantiles
    assert_eq!(data.expected_columns.len(), 6);
    assert_eq!(data.start_time_column, "time_");
}

#[test]
fn summary_takes_float_count_and_sum_columns() {
    let mut state = state();
    let df = table(&mut state, "latency_quantiles");
    let data = summary(&mut state, "n", "total").expect("summary");
    export_metric(&mut state, &df, data);

    Analyzer::new().analyze(&mut state).expect("float count and sum");
}

#[test]
fn summary_rejects_integer_count_column() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let data = summary(&mut state, "latency_ns", "latency_ns").expect("summary");
    export_metric(&mut state, &df, data);

    let err = Analyzer::new().analyze(&mut state).expect_err("int64 count");
    assert!(matches!(err, PqlError::Semantic { .. }));
    assert_eq!(
        err.message(),
        "Expected 'count' column 'latency_ns' to be one of [FLOAT64], received INT64"
    );
}

#[test]
fn metric_start_time_is_a_required_column() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let metric_module = attr_path(&mut state, &px(), &["otel", "metric"]);
    let start = string(&mut state, "");
    let time = string(&mut state, "time_");
    let value = string(&mut state, "latency_ns");
    let gauge = call(
        &mut state,
        &metric_module,
        "Gauge",
        CallArgs::new().arg(start).arg(time).arg(value),
    )
    .expect("gauge");
    export_metric(&mut state, &df, gauge);

    let err = Analyzer::new().analyze(&mut state).expect_err("empty start column");
    assert_eq!(
        err.message(),
        "Column '' not found in parent dataframe for 'start_time_unix_nano'"
    );
}
