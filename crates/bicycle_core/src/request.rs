//! Versioned request/response contract.
//!
//! Hosts that marshal calls across a process or language boundary send a
//! [`RequestEnvelope`] and get a [`ResponseEnvelope`] back. Both are plain
//! serde types; the JSON form of a put looks like
//!
//! ```json
//! {"version": 1, "request": {"op": "put", "model": "Example",
//!                            "record": {"id": 1, "email": "a@x.com"}}}
//! ```

use crate::engine::Engine;
use crate::error::{CoreError, ErrorKind};
use crate::query::IndexQuery;
use bicycle_codec::Record;
use serde::{Deserialize, Serialize};

/// Version of the request/response contract.
pub const PROTOCOL_VERSION: u32 = 1;

const fn current_version() -> u32 {
    PROTOCOL_VERSION
}

/// One engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// [`Engine::get_by_index`].
    GetByIndex {
        /// Model name.
        model: String,
        /// Query; all records when absent.
        #[serde(default)]
        query: IndexQuery,
    },
    /// [`Engine::delete_by_index`].
    DeleteByIndex {
        /// Model name.
        model: String,
        /// Query; all records when absent.
        #[serde(default)]
        query: IndexQuery,
    },
    /// [`Engine::put`].
    Put {
        /// Model name.
        model: String,
        /// Record to write.
        record: Record,
    },
    /// [`Engine::batch_put`].
    BatchPut {
        /// Model name.
        model: String,
        /// Records to write atomically.
        records: Vec<Record>,
    },
}

impl Request {
    /// Wire name of the operation.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::GetByIndex { .. } => "get_by_index",
            Self::DeleteByIndex { .. } => "delete_by_index",
            Self::Put { .. } => "put",
            Self::BatchPut { .. } => "batch_put",
        }
    }
}

/// Outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Records found by a query.
    Records {
        /// Matching records in index order.
        records: Vec<Record>,
    },
    /// Records removed by a delete.
    Deleted {
        /// Number of records deleted.
        count: usize,
    },
    /// A put or batch put succeeded.
    Ok,
    /// The operation failed and changed nothing.
    Error {
        /// Machine-readable kind.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl Response {
    /// Builds an error response.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind, if this is an error.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<CoreError> for Response {
    fn from(err: CoreError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}

/// A request tagged with the contract version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Contract version; the current one when absent.
    #[serde(default = "current_version")]
    pub version: u32,
    /// The request.
    pub request: Request,
}

impl RequestEnvelope {
    /// Wraps `request` with the current version.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request,
        }
    }
}

/// A response tagged with the contract version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Contract version.
    pub version: u32,
    /// The response.
    pub response: Response,
}

impl Engine {
    /// Runs one request. Failures become [`Response::Error`].
    pub fn dispatch(&self, request: Request) -> Response {
        let op = request.op();
        let result = match request {
            Request::GetByIndex { model, query } => self
                .get_by_index(&model, &query)
                .map(|records| Response::Records { records }),
            Request::DeleteByIndex { model, query } => self
                .delete_by_index(&model, &query)
                .map(|count| Response::Deleted { count }),
            Request::Put { model, record } => self.put(&model, record).map(|()| Response::Ok),
            Request::BatchPut { model, records } => {
                self.batch_put(&model, records).map(|()| Response::Ok)
            }
        };
        result.unwrap_or_else(|err| {
            tracing::debug!(op, kind = %err.kind(), error = %err, "request failed");
            err.into()
        })
    }

    /// Checks the contract version and runs the request.
    pub fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let response = if envelope.version == PROTOCOL_VERSION {
            self.dispatch(envelope.request)
        } else {
            Response::error(
                ErrorKind::Protocol,
                format!(
                    "unsupported protocol version {}, expected {PROTOCOL_VERSION}",
                    envelope.version
                ),
            )
        };
        ResponseEnvelope {
            version: PROTOCOL_VERSION,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, IndexDef, ModelDef};

    fn engine() -> Engine {
        let engine = Engine::open_in_memory().unwrap();
        engine
            .register(
                ModelDef::new("Example")
                    .field("id", FieldType::Integer)
                    .field("email", FieldType::Text)
                    .primary_key(["id"])
                    .index(IndexDef::new("by_email", ["email"]).unique()),
            )
            .unwrap();
        engine
    }

    fn run(engine: &Engine, json: &str) -> serde_json::Value {
        let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
        serde_json::to_value(engine.handle(envelope)).unwrap()
    }

    #[test]
    fn json_round_trip_through_the_engine() {
        let engine = engine();

        let reply = run(
            &engine,
            r#"{"version": 1, "request": {"op": "put", "model": "Example",
                "record": {"id": 1, "email": "a@x.com"}}}"#,
        );
        assert_eq!(reply["response"]["status"], "ok");

        let reply = run(
            &engine,
            r#"{"request": {"op": "put", "model": "Example",
                "record": {"id": 2, "email": "a@x.com"}}}"#,
        );
        assert_eq!(reply["response"]["status"], "error");
        assert_eq!(reply["response"]["kind"], "conflict");

        let reply = run(
            &engine,
            r#"{"request": {"op": "get_by_index", "model": "Example",
                "query": {"constraints": [{"field": "id", "op": "eq", "value": 1}]}}}"#,
        );
        assert_eq!(
            reply["response"],
            serde_json::json!({"status": "records", "records": [{"email": "a@x.com", "id": 1}]})
        );

        let reply = run(
            &engine,
            r#"{"request": {"op": "delete_by_index", "model": "Example",
                "query": {"constraints": [{"field": "email", "op": "eq", "value": "a@x.com"}]}}}"#,
        );
        assert_eq!(reply["response"], serde_json::json!({"status": "deleted", "count": 1}));
        assert_eq!(reply["version"], PROTOCOL_VERSION);
    }

    #[test]
    fn batch_put_and_full_scan() {
        let engine = engine();
        let response = engine.dispatch(Request::BatchPut {
            model: "Example".into(),
            records: vec![
                Record::new().with("id", 2).with("email", "b"),
                Record::new().with("id", 1).with("email", "a"),
            ],
        });
        assert_eq!(response, Response::Ok);

        let response = engine.dispatch(Request::GetByIndex {
            model: "Example".into(),
            query: IndexQuery::default(),
        });
        let Response::Records { records } = response else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&1.into()));
    }

    #[test]
    fn errors_carry_kind_tags() {
        let engine = engine();
        let response = engine.dispatch(Request::GetByIndex {
            model: "Ghost".into(),
            query: IndexQuery::default(),
        });
        assert_eq!(response.error_kind(), Some(ErrorKind::Schema));

        engine.close().unwrap();
        let response = engine.dispatch(Request::Put {
            model: "Example".into(),
            record: Record::new().with("id", 1).with("email", "a"),
        });
        assert_eq!(response.error_kind(), Some(ErrorKind::StorageClosed));
    }

    #[test]
    fn unknown_version_is_refused() {
        let engine = engine();
        let reply = engine.handle(RequestEnvelope {
            version: 99,
            request: Request::Put {
                model: "Example".into(),
                record: Record::new().with("id", 1).with("email", "a"),
            },
        });
        assert_eq!(reply.response.error_kind(), Some(ErrorKind::Protocol));
        assert_eq!(engine.count("Example").unwrap(), 0);
    }
}
