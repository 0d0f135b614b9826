//! Agent-facing `search_providers` tool.
//!
//! Wraps [`SearchEngine`] behind the single function-call boundary an
//! external conversational agent uses: typed or JSON arguments in,
//! [`ProviderSummary`] list out. [`SearchTool::serve_lines`] exposes the same
//! call as a line-delimited JSON protocol:
//!
//! ```text
//! -> {"id": 1, "arguments": {"city": "Austin", "specialty": "cardio"}}
//! <- {"id": 1, "ok": true, "results": [...]}
//! -> {"id": 2, "arguments": {"limit": 0}}
//! <- {"id": 2, "ok": false, "error": {"code": "E4001", "message": "...", "hint": null}}
//! -> {"id": 3, "describe": true}
//! <- {"id": 3, "ok": true, "tool": {"name": "search_providers", ...}}
//! ```

use crate::engine::SearchEngine;
use carefind_core::model::{DEFAULT_LIMIT, ProviderSummary, SearchQuery};
use carefind_core::{CarefindError, Result};
use serde_json::{Map, Value, json};
use std::io::{BufRead, Write};
use tracing::{info, warn};

pub const TOOL_NAME: &str = "search_providers";

const TOOL_DESCRIPTION: &str = "Search the healthcare provider directory. Every parameter is optional; \
     supplied filters are combined with AND and results are ranked by semantic similarity.";

const TEXT_PARAMS: [(&str, &str); 6] = [
    ("city", "Exact city name, e.g. \"Austin\""),
    ("state", "Two-letter state code, e.g. \"TX\""),
    ("specialty", "Case-insensitive substring of the specialty, e.g. \"cardio\""),
    ("name_contains", "Case-insensitive substring of the provider's name"),
    ("insurance", "Insurance plan the provider must accept"),
    ("language", "Language the provider must speak"),
];

/// The `search_providers` tool.
pub struct SearchTool {
    engine: SearchEngine,
    default_limit: usize,
}

impl SearchTool {
    #[must_use]
    pub const fn new(engine: SearchEngine) -> Self {
        Self {
            engine,
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Limit applied when JSON arguments omit `limit`.
    #[must_use]
    pub const fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    /// Log the invocation, run the search unchanged, drop distances.
    ///
    /// # Errors
    ///
    /// Propagates every [`SearchEngine::search`] error.
    pub fn search_providers(&self, query: &SearchQuery) -> Result<Vec<ProviderSummary>> {
        info!(
            tool = TOOL_NAME,
            params = %serde_json::to_string(query).unwrap_or_default(),
            "tool invoked"
        );
        let matches = self.engine.search(query)?;
        Ok(matches.into_iter().map(|m| m.provider).collect())
    }

    /// Parse JSON arguments, then search.
    ///
    /// # Errors
    ///
    /// [`CarefindError::InvalidQuery`] for malformed arguments, otherwise as
    /// [`Self::search_providers`].
    pub fn call(&self, arguments: &Value) -> Result<Vec<ProviderSummary>> {
        let query = parse_arguments(arguments, self.default_limit)?;
        self.search_providers(&query)
    }

    /// Serve line-delimited JSON requests until `reader` is exhausted.
    ///
    /// Each non-blank input line gets exactly one response line. Tool errors
    /// are reported in-band; only I/O failures end the loop early.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a request or writing a response fails.
    pub fn serve_lines<R: BufRead, W: Write>(&self, reader: R, mut writer: W) -> std::io::Result<usize> {
        let mut handled = 0;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            serde_json::to_writer(&mut writer, &response)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            handled += 1;
        }
        Ok(handled)
    }

    fn handle_line(&self, line: &str) -> Value {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!("rejecting unparseable tool request: {err}");
                let error = CarefindError::invalid_query("request", format!("invalid JSON: {err}"));
                return failure(&Value::Null, &error);
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let Some(obj) = request.as_object() else {
            let error = CarefindError::invalid_query("request", "expected a JSON object");
            return failure(&id, &error);
        };

        if obj.get("describe").and_then(Value::as_bool) == Some(true) {
            return json!({ "id": id, "ok": true, "tool": descriptor() });
        }
        if let Some(name) = obj
            .get("tool")
            .and_then(Value::as_str)
            .filter(|name| *name != TOOL_NAME)
        {
            let error = CarefindError::invalid_query("tool", format!("unknown tool '{name}'"));
            return failure(&id, &error);
        }

        let arguments = obj.get("arguments").unwrap_or(&Value::Null);
        match self.call(arguments) {
            Ok(results) => json!({ "id": id, "ok": true, "results": results }),
            Err(error) => failure(&id, &error),
        }
    }
}

/// JSON body describing an error, shared by the tool bridge and the CLI.
#[must_use]
pub fn error_body(error: &CarefindError) -> Value {
    let code = error.code();
    json!({
        "code": code.code(),
        "kind": code.message(),
        "message": error.to_string(),
        "hint": code.hint(),
    })
}

fn failure(id: &Value, error: &CarefindError) -> Value {
    json!({ "id": id, "ok": false, "error": error_body(error) })
}

/// Tool descriptor for agent registration: name, description and a JSON
/// Schema of the parameters.
#[must_use]
pub fn descriptor() -> Value {
    let mut properties = Map::new();
    for (name, description) in TEXT_PARAMS {
        properties.insert(
            name.to_owned(),
            json!({ "type": "string", "description": description }),
        );
    }
    properties.insert(
        "accepting_new_patients".to_owned(),
        json!({ "type": "boolean", "description": "Only providers with this acceptance status" }),
    );
    properties.insert(
        "min_rating".to_owned(),
        json!({ "type": "number", "description": "Minimum rating, inclusive; unrated providers are excluded" }),
    );
    properties.insert(
        "limit".to_owned(),
        json!({
            "type": "integer",
            "minimum": 1,
            "maximum": carefind_core::model::MAX_LIMIT,
            "default": DEFAULT_LIMIT,
            "description": "Maximum number of providers to return"
        }),
    );

    json!({
        "name": TOOL_NAME,
        "description": TOOL_DESCRIPTION,
        "input_schema": {
            "type": "object",
            "properties": properties,
            "additionalProperties": false
        }
    })
}

/// Convert JSON tool arguments into a [`SearchQuery`].
///
/// `null` (or a missing argument object) means "no filters". `null` values
/// are ignored, unknown parameters are rejected, and a missing `limit`
/// becomes `default_limit`.
///
/// # Errors
///
/// Returns [`CarefindError::InvalidQuery`] naming the offending parameter.
pub fn parse_arguments(arguments: &Value, default_limit: usize) -> Result<SearchQuery> {
    let mut query = SearchQuery {
        limit: default_limit,
        ..SearchQuery::default()
    };

    let obj = match arguments {
        Value::Null => return Ok(query),
        Value::Object(obj) => obj,
        _ => {
            return Err(CarefindError::invalid_query(
                "arguments",
                "expected a JSON object",
            ));
        }
    };

    for (key, value) in obj {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "city" => query.city = Some(text_arg("city", value)?),
            "state" => query.state = Some(text_arg("state", value)?),
            "specialty" => query.specialty = Some(text_arg("specialty", value)?),
            "name_contains" => query.name_contains = Some(text_arg("name_contains", value)?),
            "insurance" => query.insurance = Some(text_arg("insurance", value)?),
            "language" => query.language = Some(text_arg("language", value)?),
            "accepting_new_patients" => {
                query.accepting_new_patients = Some(value.as_bool().ok_or_else(|| {
                    CarefindError::invalid_query("accepting_new_patients", "must be a boolean")
                })?);
            }
            "min_rating" => {
                query.min_rating = Some(value.as_f64().ok_or_else(|| {
                    CarefindError::invalid_query("min_rating", "must be a number")
                })?);
            }
            "limit" => {
                query.limit = value
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        CarefindError::invalid_query("limit", "must be a non-negative integer")
                    })?;
            }
            other => {
                return Err(CarefindError::invalid_query(
                    "arguments",
                    format!("unknown parameter '{other}'"),
                ));
            }
        }
    }

    Ok(query)
}

fn text_arg(field: &'static str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| CarefindError::invalid_query(field, "must be a string"))
}
