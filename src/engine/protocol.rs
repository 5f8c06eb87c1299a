//! Messages exchanged with the compute unit
//!
//! Every request and response travels in one tagged envelope. Requests that
//! expect an answer carry an id, and the answer carries the same id back.

use serde::{Deserialize, Serialize};

/// Identifier correlating a request with its response.
pub type RequestId = u64;

/// Options understood by the compiler, all defaulting to off/absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub skip_kerning: bool,
    pub skip_features: bool,
    pub skip_metrics: bool,
    pub skip_outlines: bool,
    pub dont_use_production_names: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset_glyphs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Start-up handshake; answered with `Ready` or an id-less `Error`.
    Init,
    StoreFont {
        id: RequestId,
        json: String,
    },
    /// Compile `json`, or the cached font when absent.
    Compile {
        id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        json: Option<String>,
        options: CompileOptions,
    },
    Interpolate {
        id: RequestId,
        glyph_name: String,
        /// Designspace location as a JSON object of tag to value
        location_json: String,
    },
    ClearCache {
        id: RequestId,
    },
    Shutdown,
}

impl WorkerRequest {
    pub fn id(&self) -> Option<RequestId> {
        match self {
            WorkerRequest::StoreFont { id, .. }
            | WorkerRequest::Compile { id, .. }
            | WorkerRequest::Interpolate { id, .. }
            | WorkerRequest::ClearCache { id } => Some(*id),
            WorkerRequest::Init | WorkerRequest::Shutdown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::Init => "init",
            WorkerRequest::StoreFont { .. } => "store_font",
            WorkerRequest::Compile { .. } => "compile",
            WorkerRequest::Interpolate { .. } => "interpolate",
            WorkerRequest::ClearCache { .. } => "clear_cache",
            WorkerRequest::Shutdown => "shutdown",
        }
    }
}

/// Classification of compute unit failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Start-up failed or a capability is missing
    Initialization,
    /// A request needed the cached font and none is stored
    NoCachedFont,
    /// A payload could not be parsed
    Protocol,
    Compilation,
    Interpolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    Ready {
        version: String,
    },
    Stored {
        id: RequestId,
    },
    Compiled {
        id: RequestId,
        bytes: Vec<u8>,
        duration_ms: u64,
    },
    Interpolated {
        id: RequestId,
        result_json: String,
    },
    Cleared {
        id: RequestId,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<RequestId>,
        kind: EngineErrorKind,
        message: String,
    },
}

impl WorkerResponse {
    pub fn id(&self) -> Option<RequestId> {
        match self {
            WorkerResponse::Ready { .. } => None,
            WorkerResponse::Stored { id }
            | WorkerResponse::Compiled { id, .. }
            | WorkerResponse::Interpolated { id, .. }
            | WorkerResponse::Cleared { id } => Some(*id),
            WorkerResponse::Error { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_tagged() {
        let request = WorkerRequest::Interpolate {
            id: 7,
            glyph_name: "A".to_string(),
            location_json: r#"{"wght":30.0}"#.to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "interpolate");
        assert_eq!(json["id"], 7);
        assert_eq!(request.id(), Some(7));
        assert_eq!(WorkerRequest::Init.id(), None);
    }

    #[test]
    fn test_options_default_when_fields_absent() {
        let options: CompileOptions = serde_json::from_str(r#"{"skip_kerning":true}"#).unwrap();
        assert!(options.skip_kerning);
        assert!(!options.skip_features);
        assert_eq!(options.subset_glyphs, None);
    }

    #[test]
    fn test_error_response_without_id() {
        let response: WorkerResponse = serde_json::from_str(
            r#"{"type":"error","kind":"initialization","message":"fontc not found"}"#,
        )
        .unwrap();
        assert_eq!(response.id(), None);
        assert!(matches!(
            response,
            WorkerResponse::Error {
                kind: EngineErrorKind::Initialization,
                ..
            }
        ));
    }
}
