//! Quanta command-line server
//!
//! Reads one JSON request per stdin line and writes one JSON response per
//! stdout line. Logs go to stderr, filtered by `QUANTA_LOG`.
//!
//! Methods:
//! - evaluate: Evaluate a formula, with optional reference values
//! - filter: Normalize a unit expression to its SI and user forms
//! - convert: Convert a value between two unit expressions
//! - scale: Move a value to the neighbouring unit that reads best
//! - quantities: List registered quantities and their visible units
//! - functions: List formula functions
//! - parameters: Run one calculation pass over persisted parameters

use quanta_core::{EngineConfig, PassToken, QuantaError};
use quanta_formula::{FormulaEvaluator, MapResolver};
use quanta_params::{Parameter, ParameterStore};
use quanta_units::{convert, filter_expression, set_diagnostics, QuantityRegistry, QuantityValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<JsonValue>,
    method: String,
    #[serde(default)]
    params: JsonValue,
}

#[derive(Debug, Serialize)]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    severity: String,
    message: String,
}

impl From<QuantaError> for ErrorBody {
    fn from(e: QuantaError) -> Self {
        ErrorBody {
            code: e.code().to_string(),
            severity: format!("{:?}", e.severity()).to_lowercase(),
            message: e.to_string(),
        }
    }
}

/// Malformed request, outside the engine's error taxonomy
fn bad_request(message: impl Into<String>) -> ErrorBody {
    ErrorBody {
        code: "BAD_REQUEST".to_string(),
        severity: "error".to_string(),
        message: message.into(),
    }
}

/// Reference value given inline with an evaluate request
#[derive(Debug, Deserialize)]
struct ReferenceValue {
    value: f64,
    #[serde(default)]
    unit: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("QUANTA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_evaluator(config: &EngineConfig) -> Result<FormulaEvaluator, QuantaError> {
    set_diagnostics(config.diagnostics);
    let registry = QuantityRegistry::from_config(config)?;
    Ok(FormulaEvaluator::new(Arc::new(registry)))
}

fn main() -> ExitCode {
    init_logging();

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let evaluator = match build_evaluator(&config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "could not build the unit registry");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = SERVER_VERSION,
        quantities = evaluator.registry().len(),
        jit = config.jit_registration,
        "quanta ready, waiting for requests"
    );

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin.lock());

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                tracing::info!("end of input");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<Request>(line) {
                    Ok(request) => {
                        tracing::debug!(method = %request.method, "processing");
                        handle_request(&evaluator, &request)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable request");
                        Response {
                            id: None,
                            result: None,
                            error: Some(bad_request(format!("invalid request: {}", e))),
                        }
                    }
                };

                let text = match serde_json::to_string(&response) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "could not serialize response");
                        continue;
                    }
                };
                let mut stdout = io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{}", text).and_then(|_| stdout.flush()) {
                    tracing::error!(error = %e, "could not write response");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "could not read input");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

fn handle_request(evaluator: &FormulaEvaluator, request: &Request) -> Response {
    let params = &request.params;
    let result = match request.method.as_str() {
        "evaluate" => method_evaluate(evaluator, params),
        "filter" => method_filter(evaluator.registry(), params),
        "convert" => method_convert(evaluator.registry(), params),
        "scale" => method_scale(evaluator.registry(), params),
        "quantities" => method_quantities(evaluator.registry()),
        "functions" => Ok(json!({ "functions": evaluator.functions().list() })),
        "parameters" => method_parameters(evaluator, params),
        other => Err(bad_request(format!("unknown method: {}", other))),
    };

    match result {
        Ok(r) => Response {
            id: request.id.clone(),
            result: Some(r),
            error: None,
        },
        Err(e) => Response {
            id: request.id.clone(),
            result: None,
            error: Some(e),
        },
    }
}

fn str_param<'a>(params: &'a JsonValue, name: &str) -> Result<&'a str, ErrorBody> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad_request(format!("missing string parameter '{}'", name)))
}

fn f64_param(params: &JsonValue, name: &str) -> Result<f64, ErrorBody> {
    params
        .get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| bad_request(format!("missing numeric parameter '{}'", name)))
}

fn method_evaluate(evaluator: &FormulaEvaluator, params: &JsonValue) -> Result<JsonValue, ErrorBody> {
    let formula = str_param(params, "formula")?;
    let registry = evaluator.registry();

    let mut resolver = MapResolver::new();
    if let Some(references) = params.get("references") {
        let references: std::collections::HashMap<String, ReferenceValue> =
            serde_json::from_value(references.clone())
                .map_err(|e| bad_request(format!("invalid references: {}", e)))?;
        for (name, reference) in references {
            let value = QuantityValue::from_unit(reference.value, &reference.unit, registry)?;
            resolver.insert(name, value);
        }
    }

    let result = evaluator.evaluate(formula, &mut resolver, PassToken::NONE)?;
    let (shown, unit) = result.value_in_tag(registry)?;
    Ok(json!({
        "si": result.quantity.magnitude,
        "dimension": result.quantity.dimension,
        "value": shown,
        "unit": unit,
    }))
}

fn method_filter(registry: &QuantityRegistry, params: &JsonValue) -> Result<JsonValue, ErrorBody> {
    let expression = str_param(params, "expression")?;
    let filtered = filter_expression(registry, expression)?;
    serde_json::to_value(filtered).map_err(|e| bad_request(e.to_string()))
}

fn method_convert(registry: &QuantityRegistry, params: &JsonValue) -> Result<JsonValue, ErrorBody> {
    let value = f64_param(params, "value")?;
    let from = str_param(params, "from")?;
    let to = str_param(params, "to")?;
    let converted = convert(registry, value, from, to)?;
    Ok(json!({ "value": converted, "unit": to }))
}

fn method_scale(registry: &QuantityRegistry, params: &JsonValue) -> Result<JsonValue, ErrorBody> {
    let value = f64_param(params, "value")?;
    let unit = str_param(params, "unit")?;
    let (scaled, unit) = registry.auto_scale(value, unit)?;
    Ok(json!({ "value": scaled, "unit": unit }))
}

fn method_quantities(registry: &QuantityRegistry) -> Result<JsonValue, ErrorBody> {
    let quantities: Vec<JsonValue> = registry
        .quantities()
        .iter()
        .map(|q| {
            json!({
                "name": q.name,
                "symbol": q.symbol,
                "dimension": q.dimension,
                "derived": q.is_derived(),
                "preferred": q.preferred_unit().expression,
                "units": q.visible_units().map(|u| u.expression.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(json!({ "quantities": quantities }))
}

/// Persisted parameter lines in, one pass, values per id out
fn method_parameters(evaluator: &FormulaEvaluator, params: &JsonValue) -> Result<JsonValue, ErrorBody> {
    let lines = params
        .get("lines")
        .and_then(|v| v.as_array())
        .ok_or_else(|| bad_request("missing array parameter 'lines'"))?;

    let mut store = ParameterStore::new(
        FormulaEvaluator::new(Arc::clone(evaluator.registry()))
            .with_functions(evaluator.functions().clone()),
    );
    for line in lines {
        let line = line
            .as_str()
            .ok_or_else(|| bad_request("parameter lines must be strings"))?;
        store.register(Parameter::from_persisted(line)?)?;
    }

    let (_, failures) = store.run_pass();
    let values: Vec<JsonValue> = store
        .ids()
        .filter_map(|id| store.get(id))
        .filter(|p| !failures.iter().any(|(id, _)| id == p.id()))
        .map(|p| {
            json!({
                "id": p.id(),
                "value": p.value_in_default_unit(store.registry()).ok(),
                "unit": p.unit(),
                "si": p.to_quantity_value().ok().map(|q| q.magnitude),
            })
        })
        .collect();
    let errors: Vec<JsonValue> = failures
        .into_iter()
        .map(|(id, e)| json!({ "id": id, "error": ErrorBody::from(e) }))
        .collect();

    Ok(json!({ "values": values, "errors": errors }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> FormulaEvaluator {
        build_evaluator(&EngineConfig::default()).unwrap()
    }

    fn call(method: &str, params: JsonValue) -> Response {
        let request = Request {
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        };
        handle_request(&evaluator(), &request)
    }

    #[test]
    fn test_evaluate() {
        let response = call("evaluate", json!({ "formula": "1{kg} + 1000{g}" }));
        let result = response.result.unwrap();
        assert!((result["value"].as_f64().unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(result["unit"], "kg");
        assert_eq!(response.id, Some(json!(1)));
    }

    #[test]
    fn test_evaluate_with_references() {
        let params = json!({
            "formula": "[distance] / [time]",
            "references": {
                "distance": { "value": 3.0, "unit": "km" },
                "time": { "value": 2.0, "unit": "s" }
            }
        });
        let result = call("evaluate", params).result.unwrap();
        assert!((result["si"].as_f64().unwrap() - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_error_is_reported() {
        let response = call("evaluate", json!({ "formula": "1{kg} + 1{s}" }));
        let error = response.error.unwrap();
        assert_eq!(error.code, "INCOMPATIBLE_DIMENSION");
        assert_eq!(error.severity, "error");
    }

    #[test]
    fn test_bad_requests() {
        assert_eq!(call("evaluate", json!({})).error.unwrap().code, "BAD_REQUEST");
        assert_eq!(call("nope", json!({})).error.unwrap().code, "BAD_REQUEST");
    }

    #[test]
    fn test_convert_and_filter() {
        let result = call("convert", json!({ "value": 1.0, "from": "km", "to": "m" })).result.unwrap();
        assert!((result["value"].as_f64().unwrap() - 1000.0).abs() < 1e-9);

        let result = call("filter", json!({ "expression": "g/hr" })).result.unwrap();
        assert_eq!(result["user_expression"], "g/hr");
    }

    #[test]
    fn test_parameters_pass() {
        let params = json!({ "lines": ["2;kg;;;0;;base", "[base]*3;g;;;0;;triple", "[loop];;;;0;;loop"] });
        let result = call("parameters", params).result.unwrap();
        let values = result["values"].as_array().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["id"], "triple");
        assert!((values[1]["value"].as_f64().unwrap() - 6000.0).abs() < 1e-9);
        assert_eq!(result["errors"][0]["id"], "loop");
        assert_eq!(result["errors"][0]["error"]["code"], "CIRCULAR_REF");
    }
}
