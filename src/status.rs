/// store health and request counting
///
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

pub type JsonString = String;

pub const OK: &str = "ok";
pub const DOWN: &str = "down";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreState {
    #[default]
    Idle,
    Broken,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub store_id: String,
    pub status: String,
    pub state: StoreState,
    pub uptime: String,
    pub uptime_seconds: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

impl StoreStatus {
    pub fn new(
        store_id: String,
        status: String,
        state: StoreState,
        uptime: String,
        uptime_seconds: u64,
        tally: &RequestTally,
    ) -> StoreStatus {
        StoreStatus {
            store_id,
            status,
            state,
            uptime,
            uptime_seconds,
            successful_requests: tally.successful(),
            failed_requests: tally.failed(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OK
    }

    /// the status as json; a serialization failure is reported as json too
    pub fn to_json(&self) -> JsonString {
        match serde_json::to_string(self) {
            Ok(js) => js,
            Err(e) => {
                format!(r#"{}"status":"json parse error: {:?}"{}"#, "{", e, "}\n")
            }
        }
    }
}

/// counts store operations that completed with and without error
#[derive(Debug, Default)]
pub struct RequestTally {
    successful: AtomicU64,
    failed: AtomicU64,
}

impl RequestTally {
    pub fn record<T>(&self, result: &Result<T>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successful(&self) -> u64 {
        self.successful.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn tally() {
        let tally = RequestTally::default();
        tally.record(&Ok(()));
        tally.record(&Ok(3));
        tally.record::<()>(&Err(StoreError::VoterNotFound(1)));
        tally.record_failure();

        assert_eq!(tally.successful(), 2);
        assert_eq!(tally.failed(), 2);
    }

    #[test]
    fn to_json() {
        let tally = RequestTally::default();
        tally.record_success();
        let status = StoreStatus::new(
            "abc".to_string(),
            OK.to_string(),
            StoreState::Idle,
            "0 days, 00:00:01".to_string(),
            1,
            &tally,
        );

        assert!(status.is_ok());
        let js = status.to_json();
        assert!(js.contains(r#""storeId":"abc""#));
        assert!(js.contains(r#""state":"Idle""#));
        assert!(js.contains(r#""successfulRequests":1"#));
        assert!(js.contains(r#""failedRequests":0"#));

        let back: StoreStatus = serde_json::from_str(&js).unwrap();
        assert_eq!(back, status);
    }
}
