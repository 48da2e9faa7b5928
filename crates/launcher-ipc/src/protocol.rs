//! Command parsing, opcode resolution, and response encoding.

use crate::ParseError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Wire error codes carried in `errorCode`.
pub mod error_codes {
    pub const GENERAL: i32 = 7000;
    pub const UNSUPPORTED_OPERATION: i32 = 7001;
    pub const CRYPTO_FAILURE: i32 = 7003;
    pub const FRAME_TOO_LARGE: i32 = 7010;
    pub const FRAME_READ_FAILED: i32 = 7011;
    pub const PARSE_ERROR: i32 = 7020;
    pub const MISSING_FIELD: i32 = 7021;
    pub const INVALID_TRANSITION: i32 = 7030;
    pub const ENGINE_FAILURE: i32 = 7040;
    pub const STORE_FAILURE: i32 = 7050;
}

/// Resolved operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Load,
    Unload,
    Move,
    Unknown,
}

impl OpCode {
    /// Exact, case-sensitive lookup. Every input maps to some variant.
    pub fn resolve(raw: &str) -> Self {
        match raw {
            "load" => OpCode::Load,
            "unload" => OpCode::Unload,
            "move" => OpCode::Move,
            _ => OpCode::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Load => "load",
            OpCode::Unload => "unload",
            OpCode::Move => "move",
            OpCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub opcode: OpCode,
    /// The `op` string as received, if it was a string.
    pub raw_op: Option<String>,
    pub class_name: Option<String>,
    pub applet_name: Option<String>,
    pub archive_url: Option<String>,
    pub base_url: Option<String>,
    pub codebase: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub pos_x: f64,
    pub pos_y: f64,
    pub cookies: Vec<(String, String)>,
    pub parameters: Vec<(String, String)>,
}

impl Command {
    pub fn require_class_name(&self) -> Result<&str, ParseError> {
        self.class_name
            .as_deref()
            .ok_or(ParseError::MissingField("className"))
    }

    /// `width=<w>;height=<h>;posx=<x>;posy=<y>`, preceded by any
    /// caller-supplied `name=value` parameters.
    pub fn synthesized_params(&self) -> String {
        let geometry = format!(
            "width={};height={};posx={:.4};posy={:.4}",
            self.width.as_deref().unwrap_or_default(),
            self.height.as_deref().unwrap_or_default(),
            self.pos_x,
            self.pos_y
        );
        if self.parameters.is_empty() {
            return geometry;
        }
        let mut parts: Vec<String> = self
            .parameters
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        parts.push(geometry);
        parts.join(";")
    }

    /// Positional Execution Engine parameters for LOAD:
    /// `[op, baseUrl, codebase, archiveUrl, appletName, params, className]`.
    pub fn launch_parameters(&self) -> Result<Vec<String>, ParseError> {
        let class_name = self.require_class_name()?.to_string();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Ok(vec![
            self.opcode.as_str().to_string(),
            text(&self.base_url),
            text(&self.codebase),
            text(&self.archive_url),
            text(&self.applet_name),
            self.synthesized_params(),
            class_name,
        ])
    }
}

/// Decode a raw JSON command.
///
/// Absent or mistyped optional fields are "not provided"; malformed
/// positions fall back to `0.0`.
pub fn parse(raw: &[u8]) -> Result<Command, ParseError> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ParseError::NotAnObject);
    };

    let raw_op = string_field(&obj, "op");
    let opcode = raw_op
        .as_deref()
        .map(OpCode::resolve)
        .unwrap_or(OpCode::Unknown);

    Ok(Command {
        opcode,
        raw_op,
        class_name: string_field(&obj, "className"),
        applet_name: string_field(&obj, "appletName"),
        archive_url: string_field(&obj, "archiveUrl"),
        base_url: string_field(&obj, "baseUrl"),
        codebase: string_field(&obj, "codebase"),
        width: dimension_field(&obj, "width"),
        height: dimension_field(&obj, "height"),
        pos_x: position_field(&obj, "posx"),
        pos_y: position_field(&obj, "posy"),
        cookies: pairs_field(&obj, "cookies"),
        parameters: pairs_field(&obj, "parameters"),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Width and height arrive either as text or as bare numbers.
fn dimension_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn position_field(obj: &Map<String, Value>, key: &str) -> f64 {
    let parsed = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// `[{"name": "value"}, ...]` into ordered pairs. Duplicates are kept.
fn pairs_field(obj: &Map<String, Value>, key: &str) -> Vec<(String, String)> {
    let Some(Value::Array(entries)) = obj.get(key) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(map) if map.len() == 1 => map.iter().next().map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            }),
            _ => None,
        })
        .collect()
}

/// Outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        message: String,
    },
    Error {
        error: String,
        #[serde(rename = "errorCode")]
        error_code: i32,
    },
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Response::Success {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>, error_code: i32) -> Self {
        Response::Error {
            error: message.into(),
            error_code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_value(v: Value) -> Command {
        parse(v.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn resolve_known_ops() {
        assert_eq!(OpCode::resolve("load"), OpCode::Load);
        assert_eq!(OpCode::resolve("unload"), OpCode::Unload);
        assert_eq!(OpCode::resolve("move"), OpCode::Move);
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        for raw in ["LOAD", "Load", " load", "load ", "", "unknown", "loads", "m\u{f6}ve"] {
            assert_eq!(OpCode::resolve(raw), OpCode::Unknown, "{raw:?}");
        }
    }

    #[test]
    fn full_load_command() {
        let cmd = parse_value(json!({
            "op": "load",
            "className": "demo.Clock",
            "appletName": "clock",
            "archiveUrl": "clock.jar",
            "baseUrl": "https://example.test/",
            "codebase": "applets/",
            "width": "320",
            "height": 200,
            "posx": 10.5,
            "posy": "20.25",
            "cookies": [{"JSESSIONID": "abc"}],
            "parameters": [{"color": "red"}, {"speed": "2"}]
        }));

        assert_eq!(cmd.opcode, OpCode::Load);
        assert_eq!(cmd.class_name.as_deref(), Some("demo.Clock"));
        assert_eq!(cmd.width.as_deref(), Some("320"));
        assert_eq!(cmd.height.as_deref(), Some("200"));
        assert_eq!(cmd.pos_x, 10.5);
        assert_eq!(cmd.pos_y, 20.25);
        assert_eq!(cmd.cookies, vec![("JSESSIONID".into(), "abc".into())]);

        assert_eq!(
            cmd.launch_parameters().unwrap(),
            vec![
                "load",
                "https://example.test/",
                "applets/",
                "clock.jar",
                "clock",
                "color=red;speed=2;width=320;height=200;posx=10.5000;posy=20.2500",
                "demo.Clock",
            ]
        );
    }

    #[test]
    fn malformed_positions_default_to_zero() {
        let cmd = parse_value(json!({
            "op": "move", "posx": "left", "posy": {"x": 1}
        }));
        assert_eq!(cmd.pos_x, 0.0);
        assert_eq!(cmd.pos_y, 0.0);

        let cmd = parse_value(json!({"op": "move", "posx": "NaN", "posy": "inf"}));
        assert_eq!(cmd.pos_x, 0.0);
        assert_eq!(cmd.pos_y, 0.0);
    }

    #[test]
    fn mistyped_fields_are_not_provided() {
        let cmd = parse_value(json!({
            "op": "load", "className": 42, "appletName": null, "width": true
        }));
        assert_eq!(cmd.class_name, None);
        assert_eq!(cmd.applet_name, None);
        assert_eq!(cmd.width, None);
        assert_eq!(cmd.require_class_name(), Err(ParseError::MissingField("className")));
    }

    #[test]
    fn missing_or_non_string_op_is_unknown() {
        assert_eq!(parse_value(json!({})).opcode, OpCode::Unknown);
        assert_eq!(parse_value(json!({"op": 1})).opcode, OpCode::Unknown);
        assert_eq!(parse_value(json!({"op": "LOAD"})).raw_op.as_deref(), Some("LOAD"));
    }

    #[test]
    fn parameter_pairs_keep_order_and_duplicates() {
        let cmd = parse_value(json!({
            "op": "load",
            "parameters": [
                {"a": "1"}, {"b": 2}, {"a": "3"}, "skip", {"x": "1", "y": "2"}, {}
            ]
        }));
        assert_eq!(
            cmd.parameters,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn geometry_without_parameters() {
        let cmd = parse_value(json!({"op": "load", "width": "1", "height": "2"}));
        assert_eq!(
            cmd.synthesized_params(),
            "width=1;height=2;posx=0.0000;posy=0.0000"
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(parse(&[0xff, 0xfe]), Err(ParseError::InvalidUtf8));
        assert!(matches!(parse(b"{\"op\":"), Err(ParseError::MalformedJson(_))));
        assert_eq!(parse(b"[1,2]"), Err(ParseError::NotAnObject));
        assert_eq!(parse(b"\"load\""), Err(ParseError::NotAnObject));
    }

    #[test]
    fn response_shapes() {
        let ok: Value = serde_json::from_str(&Response::success("loaded").to_json().unwrap()).unwrap();
        assert_eq!(ok, json!({"status": "success", "message": "loaded"}));

        let err: Value = serde_json::from_str(
            &Response::error("bad", error_codes::INVALID_TRANSITION)
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            err,
            json!({"status": "error", "error": "bad", "errorCode": 7030})
        );
    }
}
