//! Scripted response sequences
//!
//! A `Script` is a fixed sequence of responses handed out one per call,
//! with a call counter. Tests build a fetch closure around one to walk a
//! poll through exactly the observations they want: pending bodies, a
//! transient error, then the ready body.
//!
//! Once the sequence is exhausted the last response repeats, so a poll
//! that keeps going after the interesting part sees a stable world.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted response: an observation or a fetch error.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Status code and JSON body
    Body(u16, Value),
    /// Transient fetch error with a message
    Transient(String),
    /// Authentication failure with a status code
    Auth(u16),
}

impl Scripted {
    pub fn body(code: u16, body: Value) -> Self {
        Scripted::Body(code, body)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Scripted::Transient(message.into())
    }

    pub fn auth(code: u16) -> Self {
        Scripted::Auth(code)
    }
}

/// A queue of scripted responses with a call counter.
///
/// Thread-safe so a test can hold on to the script while a fetch closure
/// owns a clone of the `Arc` wrapping it.
pub struct Script {
    responses: Mutex<Vec<Scripted>>,
    cursor: AtomicUsize,
}

impl Script {
    pub fn new(responses: Vec<Scripted>) -> Self {
        assert!(!responses.is_empty(), "script needs at least one response");
        Self {
            responses: Mutex::new(responses),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Take the next response, repeating the last one once exhausted.
    pub fn next(&self) -> Scripted {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses[i.min(responses.len() - 1)].clone()
    }

    /// How many times `next` has been called.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hands_out_responses_in_order() {
        let script = Script::new(vec![
            Scripted::body(200, json!({"n": 1})),
            Scripted::transient("connection reset"),
            Scripted::body(200, json!({"n": 2})),
        ]);

        assert!(matches!(script.next(), Scripted::Body(200, _)));
        assert!(matches!(script.next(), Scripted::Transient(_)));
        assert!(matches!(script.next(), Scripted::Body(200, _)));
        assert_eq!(script.calls(), 3);
    }

    #[test]
    fn repeats_last_response_when_exhausted() {
        let script = Script::new(vec![Scripted::body(200, json!({"ready": true}))]);
        for _ in 0..3 {
            match script.next() {
                Scripted::Body(200, body) => assert_eq!(body["ready"], true),
                other => panic!("unexpected response: {other:?}"),
            }
        }
        assert_eq!(script.calls(), 3);
    }

    #[test]
    #[should_panic(expected = "at least one response")]
    fn empty_script_is_rejected() {
        Script::new(Vec::new());
    }
}
