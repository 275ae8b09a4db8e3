//! JSON value helpers
//!
//! Rancher and Harvester payloads are loosely structured; checks and
//! clients treat them as opaque `serde_json::Value`s. The one operation
//! both sides need is a recursive merge for layering caller overrides onto
//! default payloads (setting updates, cluster spec overrides).

use serde_json::Value;

/// Recursively merge `src` into `dest`.
///
/// Objects merge key by key; any other pairing replaces the destination
/// with a clone of the source.
pub fn merge(dest: &mut Value, src: &Value) {
    match (dest, src) {
        (Value::Object(dest), Value::Object(src)) => {
            for (key, value) in src {
                merge(dest.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (dest, src) => *dest = src.clone(),
    }
}
