use crate::error::{BulbError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error code the bulb returns for state changes attempted while it is off
pub const DEVICE_OFF_CODE: i64 = -5000;

/// Properties requested by every refresh/poll, in wire order
pub const REFRESH_PROPERTIES: [&str; 7] =
    ["power", "bright", "ct", "rgb", "hue", "sat", "color_mode"];

/// Wire methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetProp,
    SetPower,
    Toggle,
    SetBright,
    SetCtAbx,
    SetHsv,
    SetScene,
}

impl Method {
    /// Whether a "device is off" rejection of this method can be compensated
    /// with a power-on scene command
    pub fn is_compensable(self) -> bool {
        matches!(self, Method::SetCtAbx | Method::SetHsv | Method::SetBright)
    }
}

/// Outgoing request, one per line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: Method,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: Method, params: Vec<Value>) -> Self {
        Self { id, method, params }
    }

    /// Serialize to a wire line, including the terminator
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push_str("\r\n");
        Ok(line)
    }
}

/// Error object carried by an error reply
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A decoded inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Success reply to a request
    Result { id: u64, result: Vec<Value> },
    /// Error reply; some firmware sends these with a null id
    Error { id: Option<u64>, error: ErrorBody },
    /// Unsolicited property push
    Notification { params: Map<String, Value> },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

impl Inbound {
    /// Parse one line received from the bulb
    pub fn decode(line: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(line.trim())?;

        if let Some(error) = raw.error {
            return Ok(Inbound::Error { id: raw.id, error });
        }

        if let Some(result) = raw.result {
            let id = raw
                .id
                .ok_or_else(|| BulbError::Protocol("result without id".to_string()))?;
            return Ok(Inbound::Result { id, result });
        }

        match (raw.method.as_deref(), raw.params) {
            (Some("props"), Some(Value::Object(params))) => Ok(Inbound::Notification { params }),
            (Some(method), _) => Err(BulbError::Protocol(format!(
                "unexpected notification: {}",
                method
            ))),
            (None, _) => Err(BulbError::Protocol(
                "message has neither result, error nor method".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_encoding() {
        let request = Request::new(7, Method::SetCtAbx, vec![json!(4000), json!("smooth"), json!(500)]);
        let line = request.encode().unwrap();

        assert!(line.ends_with("\r\n"));
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({"id": 7, "method": "set_ct_abx", "params": [4000, "smooth", 500]})
        );
    }

    #[test]
    fn test_toggle_has_empty_params() {
        let line = Request::new(1, Method::Toggle, vec![]).encode().unwrap();
        assert_eq!(line, "{\"id\":1,\"method\":\"toggle\",\"params\":[]}\r\n");
    }

    #[test]
    fn test_decode_result() {
        let inbound = Inbound::decode(r#"{"id":3,"result":["ok"]}"#).unwrap();
        assert_eq!(inbound, Inbound::Result { id: 3, result: vec![json!("ok")] });
    }

    #[test]
    fn test_decode_error_with_null_id() {
        let inbound =
            Inbound::decode(r#"{"id":null,"error":{"code":-1,"message":"unsupported method"}}"#)
                .unwrap();
        match inbound {
            Inbound::Error { id, error } => {
                assert_eq!(id, None);
                assert_eq!(error.code, -1);
                assert_eq!(error.message, "unsupported method");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_device_off_error() {
        let inbound =
            Inbound::decode(r#"{"id":12,"error":{"code":-5000,"message":"general error"}}"#).unwrap();
        match inbound {
            Inbound::Error { id, error } => {
                assert_eq!(id, Some(12));
                assert_eq!(error.code, DEVICE_OFF_CODE);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_notification() {
        let inbound = Inbound::decode(r#"{"method":"props","params":{"power":"on","bright":"10"}}"#)
            .unwrap();
        match inbound {
            Inbound::Notification { params } => {
                assert_eq!(params.get("power"), Some(&json!("on")));
                assert_eq!(params.get("bright"), Some(&json!("10")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(Inbound::decode("not json"), Err(BulbError::Json(_))));
        assert!(matches!(
            Inbound::decode(r#"{"result":["ok"]}"#),
            Err(BulbError::Protocol(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"method":"props"}"#),
            Err(BulbError::Protocol(_))
        ));
        assert!(matches!(Inbound::decode("{}"), Err(BulbError::Protocol(_))));
    }

    #[test]
    fn test_compensable_methods() {
        assert!(Method::SetCtAbx.is_compensable());
        assert!(Method::SetHsv.is_compensable());
        assert!(Method::SetBright.is_compensable());
        assert!(!Method::SetPower.is_compensable());
        assert!(!Method::SetScene.is_compensable());
        assert!(!Method::GetProp.is_compensable());
    }
}
