//! Message protocol.
//!
//! Outgoing requests are validated JSON objects handed to the connection.
//! Inbound frames are decoded into [`Instruction`]s; `callback` instructions
//! are routed to handlers registered by name, everything else is returned to
//! the session for application.

use crate::connection::{ConnectionHandle, TransportError};
use applib_core::{Instruction, ProtocolError, Request, envelope_object};
use serde_json::Value;
use std::collections::HashMap;

/// Handler invoked with the `data` of a matching callback instruction.
pub type CallbackHandler = Box<dyn FnMut(&Value) + Send>;

/// Callback name to handler.
///
/// Names are expected to form a small, reused set (one per query kind, e.g.
/// `show_posrep`). Registering an existing name replaces its handler; entries
/// never expire.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, CallbackHandler>,
}

impl CallbackRegistry {
    /// Returns true if an earlier handler was replaced.
    pub fn register(&mut self, name: impl Into<String>, handler: CallbackHandler) -> bool {
        self.handlers.insert(name.into(), handler).is_some()
    }

    /// Run the handler for `name`. Returns false if none is registered.
    pub fn invoke(&mut self, name: &str, data: &Value) -> bool {
        match self.handlers.get_mut(name) {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    /// Drop the handler for `name`. Returns false if none was registered.
    pub fn remove(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered callback names.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CallbackRegistry")
            .field("names", &names)
            .finish()
    }
}

/// Request encoding and inbound routing on top of a connection.
#[derive(Debug)]
pub struct MessageProtocol {
    connection: ConnectionHandle,
    callbacks: CallbackRegistry,
}

impl MessageProtocol {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            callbacks: CallbackRegistry::default(),
        }
    }

    /// Send an arbitrary envelope. Anything but a JSON object is rejected
    /// before touching the connection.
    pub fn send_request(&self, envelope: &Value) -> Result<(), RequestError> {
        let map = envelope_object(envelope)?;
        let text = serde_json::to_string(map).map_err(|e| RequestError::Encode(e.to_string()))?;
        tracing::debug!("Sending request: {}", text);
        self.connection.send(text)?;
        Ok(())
    }

    /// Send a typed request.
    pub fn send(&self, request: &Request) -> Result<(), RequestError> {
        self.send_request(&request.to_value())
    }

    /// Issue a `db-query-constant` whose reply goes to `callback`.
    pub fn query_constant(&self, query: &str, callback: &str) -> Result<(), RequestError> {
        self.send(&Request::query_constant(query, callback))
    }

    /// Register `handler` under `callback`, then issue the query.
    pub fn request_with_callback(
        &mut self,
        query: &str,
        callback: &str,
        handler: CallbackHandler,
    ) -> Result<(), RequestError> {
        self.callbacks.register(callback, handler);
        self.query_constant(query, callback)
    }

    pub fn register_callback(&mut self, name: impl Into<String>, handler: CallbackHandler) -> bool {
        self.callbacks.register(name, handler)
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.callbacks
    }

    /// Decode one inbound frame.
    ///
    /// Undecodable frames are logged and dropped. Callback instructions are
    /// consumed here; any other instruction is returned to the caller.
    pub fn on_message(&mut self, raw: &str) -> Option<Instruction> {
        match Instruction::decode(raw) {
            Ok(instruction) => self.dispatch(instruction),
            Err(e) => {
                tracing::warn!("Dropping inbound message: {}", e);
                None
            }
        }
    }

    /// Route a decoded instruction through the callback table.
    pub fn dispatch(&mut self, instruction: Instruction) -> Option<Instruction> {
        match instruction {
            Instruction::Callback { callback, data } => {
                if !self.callbacks.invoke(&callback, &data) {
                    tracing::debug!("No handler registered for callback {}", callback);
                }
                None
            }
            other => Some(other),
        }
    }
}

/// Why a request was not sent.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Invalid(#[from] ProtocolError),
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionEvent, ConnectionManager};
    use crate::testing::MockConnector;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recorder() -> (CallbackHandler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: CallbackHandler = Box::new(move |data: &Value| {
            sink.lock().unwrap().push(data.clone());
        });
        (handler, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn non_mapping_is_rejected_without_send() {
        let (connector, mut peers) = MockConnector::new();
        let (handle, mut events) = ConnectionManager::spawn(connector);
        let protocol = MessageProtocol::new(handle);

        for bad in [json!([1, 2, 3]), json!("select 1"), json!(42), json!(true), Value::Null] {
            let err = protocol.send_request(&bad).unwrap_err();
            assert!(matches!(err, RequestError::Invalid(ProtocolError::NotAMapping(_))));
        }

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened));
        let nothing = tokio::time::timeout(Duration::from_secs(1), peer.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn query_constant_reaches_peer() {
        let (connector, mut peers) = MockConnector::new();
        let (handle, _events) = ConnectionManager::spawn(connector);
        let protocol = MessageProtocol::new(handle);

        protocol
            .query_constant("select * from pos_reps;", "show_posrep")
            .unwrap();
        let mut peer = peers.recv().await.unwrap();
        let sent: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(
            sent,
            json!({
                "type": "db-query-constant",
                "query": "select * from pos_reps;",
                "callback": "show_posrep",
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_are_invoked_and_kept() {
        let (connector, _peers) = MockConnector::new();
        let (handle, _events) = ConnectionManager::spawn(connector);
        let mut protocol = MessageProtocol::new(handle);
        let (handler, seen) = recorder();

        protocol
            .request_with_callback("select 1;", "show_posrep", handler)
            .unwrap();
        assert!(protocol.on_message(r#"show_posrep([{"id":"a"}]);"#).is_none());
        assert!(
            protocol
                .on_message(r#"{"type":"callback","callback":"show_posrep","data":[]}"#)
                .is_none()
        );

        assert_eq!(*seen.lock().unwrap(), vec![json!([{"id": "a"}]), json!([])]);
        assert!(protocol.callbacks().contains("show_posrep"));
    }

    #[test]
    fn registering_same_name_replaces() {
        let mut registry = CallbackRegistry::default();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();

        assert!(!registry.register("show_posrep", first));
        assert!(registry.register("show_posrep", second));
        assert_eq!(registry.len(), 1);

        assert!(registry.invoke("show_posrep", &json!(1)));
        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);
        assert!(!registry.invoke("unknown", &json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_swallowed() {
        let (connector, _peers) = MockConnector::new();
        let (handle, _events) = ConnectionManager::spawn(connector);
        let mut protocol = MessageProtocol::new(handle);

        assert!(protocol.on_message("{not json").is_none());
        assert!(protocol.on_message("alert(document.cookie)").is_none());
        let next = protocol.on_message(r#"{"type":"navigate","side":"left","url":"/sms"}"#);
        assert!(matches!(next, Some(Instruction::Navigate { .. })));
    }
}
