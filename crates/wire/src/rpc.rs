// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 request/response types for the UDS control surface
//! (spec §3, §6).

use otus_core::error::jsonrpc_code;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: JsonValue, id: impl Into<String>) -> Self {
        Self { jsonrpc: "2.0".to_string(), method: method.into(), params, id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(jsonrpc_code::METHOD_NOT_FOUND, format!("unknown method {method:?}"))
    }

    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::new(jsonrpc_code::INVALID_PARAMS, reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(jsonrpc_code::INTERNAL_ERROR, reason.into())
    }
}

/// Exactly one of `result`/`error` is populated (spec §6); enforced by
/// construction through [`RpcResponse::ok`]/[`RpcResponse::err`] rather
/// than left to callers to get right by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: impl Into<String>, result: JsonValue) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), result: Some(result), error: None }
    }

    pub fn err(id: impl Into<String>, error: RpcError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), result: None, error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_omits_error_field() {
        let response = RpcResponse::ok("1", serde_json::json!({"accepted": true}));
        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("error").is_none());
        assert_eq!(body["result"]["accepted"], true);
    }

    #[test]
    fn err_response_omits_result_field() {
        let response = RpcResponse::err("1", RpcError::method_not_found("bogus"));
        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("result").is_none());
        assert_eq!(body["error"]["code"], jsonrpc_code::METHOD_NOT_FOUND);
    }

    #[test]
    fn request_roundtrips_through_json() {
        let request = RpcRequest::new("task_status", serde_json::json!({"id": "t1"}), "req-1");
        let raw = serde_json::to_string(&request).unwrap();
        let back: RpcRequest = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, request);
    }
}
