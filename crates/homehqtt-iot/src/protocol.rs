//! # Protocol Module
//!
//! JSON payload shapes exchanged between the HomeHQ gateway and the cloud
//! server, and the classifier that decides which shape a captured body has.
//!
//! Gateway → server bodies decode as [`Request`]; server → gateway bodies
//! decode as [`Response`]. Anything that is not declared as JSON, or that does
//! not fit the expected shape, is reported as a [`SniffError`] so the caller
//! can log it and move on.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Media type every telemetry payload is declared with
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Command name the gateway uses to upload device measurements
pub const POST_MEASUREMENTS: &str = "postMeasurements";

// =============================================================================
// Classifier Errors
// =============================================================================

/// Reasons a captured body did not yield a telemetry payload
#[derive(Error, Debug)]
pub enum SniffError {
    #[error("non-json message (content type: {content_type:?})")]
    NotJson { content_type: String },

    #[error("could not decode json as {direction}: {source}")]
    Decode {
        direction: Direction,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Gateway → Server
// =============================================================================

/// A Request is the json payload sent by the gateway.
///
/// `command` and `gatewayId` are required; `measurements` may be absent for
/// commands that carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub command: String,
    pub gateway_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub measurements: Vec<Measurement>,
}

/// One telemetry update for a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub device_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<MeasuredParameter>,
    /// Gateway clock, milliseconds since the epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasuredParameter {
    pub name: String,
    pub value: String,
}

impl Request {
    pub fn is_post_measurements(&self) -> bool {
        self.command == POST_MEASUREMENTS
    }
}

/// Optional fields may be sent as `null`, which reads as absent
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Server → Gateway
// =============================================================================

/// A Response is the json payload sent back to the gateway by the server.
///
/// `resultCode` is required. `command` is optional; when absent it decodes as
/// an empty command, which still attributes the result to the gateway named by
/// its (empty) device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Command,
    pub result_code: String,
}

/// Command the server piggybacks on a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(rename = "commandId", default)]
    pub id: i64,
    /// Always the gateway identifier for this payload
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<CommandParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParameter {
    #[serde(rename = "parameterName")]
    pub name: String,
    #[serde(rename = "parameterValue")]
    pub value: String,
}

// =============================================================================
// Classification
// =============================================================================

/// Which side of the exchange a captured body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Short tag used as a log prefix
    pub fn tag(self) -> &'static str {
        match self {
            Direction::Request => "Req",
            Direction::Response => "Resp",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => f.write_str("Request"),
            Direction::Response => f.write_str("Response"),
        }
    }
}

/// A decoded telemetry payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

/// Decode `body` as the shape expected for `direction`.
///
/// The content type must start with `application/json`; parameters such as
/// `; charset=utf-8` are allowed.
#[instrument(level = "debug", skip(body), fields(len = body.len()))]
pub fn classify(direction: Direction, content_type: &str, body: &[u8]) -> Result<Payload, SniffError> {
    if !content_type.starts_with(JSON_MEDIA_TYPE) {
        return Err(SniffError::NotJson {
            content_type: content_type.to_string(),
        });
    }

    let decode = |source| SniffError::Decode { direction, source };
    let payload = match direction {
        Direction::Request => Payload::Request(serde_json::from_slice(body).map_err(decode)?),
        Direction::Response => Payload::Response(serde_json::from_slice(body).map_err(decode)?),
    };

    debug!("📦 Classified {} payload", direction);
    Ok(payload)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = r#"{
        "command": "postMeasurements",
        "gatewayId": "gw-1",
        "measurements": [
            {
                "deviceId": "door-7",
                "timestamp": 1700000000000,
                "parameters": [
                    {"name": "doorStatus", "value": "OPEN"},
                    {"name": "batteryLevel", "value": "87"}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_classify_request() {
        let payload = classify(Direction::Request, "application/json; charset=UTF-8", POST.as_bytes()).unwrap();
        let Payload::Request(request) = payload else {
            panic!("expected request payload");
        };

        assert!(request.is_post_measurements());
        assert_eq!(request.gateway_id, "gw-1");
        assert_eq!(request.measurements.len(), 1);

        let measurement = &request.measurements[0];
        assert_eq!(measurement.device_id, "door-7");
        assert_eq!(measurement.timestamp, Some(1_700_000_000_000));
        assert_eq!(
            measurement.parameters[0],
            MeasuredParameter { name: "doorStatus".into(), value: "OPEN".into() }
        );
    }

    #[test]
    fn test_classify_response() {
        let body = br#"{
            "command": {
                "commandId": 42,
                "deviceId": "gw-1",
                "name": "setParameters",
                "parameters": [{"parameterName": "alarm", "parameterValue": "ARMED"}]
            },
            "resultCode": "SUCCESS"
        }"#;

        let Payload::Response(response) = classify(Direction::Response, "application/json", body).unwrap() else {
            panic!("expected response payload");
        };
        assert_eq!(response.result_code, "SUCCESS");
        assert_eq!(response.command.id, 42);
        assert_eq!(response.command.device_id, "gw-1");
        assert_eq!(response.command.parameters[0].value, "ARMED");
    }

    #[test]
    fn test_response_without_command() {
        let Payload::Response(response) =
            classify(Direction::Response, "application/json", br#"{"resultCode":"SUCCESS"}"#).unwrap()
        else {
            panic!("expected response payload");
        };
        assert_eq!(response.command, Command::default());
    }

    #[test]
    fn test_non_json_content_type() {
        let err = classify(Direction::Request, "text/plain", b"hello").unwrap_err();
        assert!(matches!(err, SniffError::NotJson { ref content_type } if content_type == "text/plain"));

        let err = classify(Direction::Response, "", b"{}").unwrap_err();
        assert!(matches!(err, SniffError::NotJson { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = classify(Direction::Request, "application/json", b"{not json").unwrap_err();
        assert!(matches!(err, SniffError::Decode { direction: Direction::Request, .. }));
        assert!(err.to_string().starts_with("could not decode json as Request"));
    }

    #[test]
    fn test_missing_required_field() {
        // gatewayId is required
        let err = classify(Direction::Request, "application/json", br#"{"command":"ping"}"#).unwrap_err();
        assert!(matches!(err, SniffError::Decode { .. }));

        // resultCode is required
        let err = classify(Direction::Response, "application/json", br#"{"command":{}}"#).unwrap_err();
        assert!(matches!(err, SniffError::Decode { .. }));
    }

    #[test]
    fn test_null_optional_fields() {
        let body = br#"{"command":"ping","gatewayId":"gw","measurements":null}"#;
        let Payload::Request(request) = classify(Direction::Request, "application/json", body).unwrap() else {
            panic!("expected request payload");
        };
        assert_eq!(request.command, "ping");
        assert!(request.measurements.is_empty());

        let body = br#"{"command":"postMeasurements","gatewayId":"gw","measurements":[{"deviceId":"d","parameters":null}]}"#;
        let Payload::Request(request) = classify(Direction::Request, "application/json", body).unwrap() else {
            panic!("expected request payload");
        };
        assert!(request.measurements[0].parameters.is_empty());

        let body = br#"{"command":null,"resultCode":"SUCCESS"}"#;
        let Payload::Response(response) = classify(Direction::Response, "application/json", body).unwrap() else {
            panic!("expected response payload");
        };
        assert_eq!(response.command, Command::default());
    }

    #[test]
    fn test_direction_tags() {
        assert_eq!(Direction::Request.tag(), "Req");
        assert_eq!(Direction::Response.tag(), "Resp");
    }
}
