use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{HttpError, HttpSource};

/// Fixed responses keyed by path, for running adapters without a device.
///
/// Clones share the same responses.
#[derive(Debug, Clone, Default)]
pub struct CannedResponses {
    text: Arc<Mutex<HashMap<String, String>>>,
    json: Arc<Mutex<HashMap<String, Value>>>,
}

impl CannedResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&self, path: &str, body: impl Into<String>) {
        if let Ok(mut text) = self.text.lock() {
            text.insert(normalize(path), body.into());
        }
    }

    pub fn set_json(&self, path: &str, body: Value) {
        if let Ok(mut json) = self.json.lock() {
            json.insert(normalize(path), body);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut text) = self.text.lock() {
            text.clear();
        }
        if let Ok(mut json) = self.json.lock() {
            json.clear();
        }
    }
}

#[async_trait]
impl HttpSource for CannedResponses {
    async fn get_text(&self, path: &str) -> Result<String, HttpError> {
        let key = normalize(path);
        self.text
            .lock()
            .ok()
            .and_then(|text| text.get(&key).cloned())
            .ok_or(HttpError::NotFound(key))
    }

    async fn post_json(&self, path: &str, _body: &Value) -> Result<Value, HttpError> {
        let key = normalize(path);
        self.json
            .lock()
            .ok()
            .and_then(|json| json.get(&key).cloned())
            .ok_or(HttpError::NotFound(key))
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}
