//! Per-attempt correlation record and its context slot.
//!
//! The record lives in the attempt's [`Extensions`] behind an [`Arc`], so
//! any extensions cloned from the original (for example by middleware that
//! rebuilds the request) still point at the same counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use http::Extensions;

/// Counters for a single RPC attempt.
///
/// Client side this covers one attempt; server side it covers the whole
/// call as seen by the server.
#[derive(Debug)]
pub struct RpcInfo {
    full_method_name: String,
    sent_messages: AtomicU64,
    sent_bytes: AtomicU64,
    received_messages: AtomicU64,
    received_bytes: AtomicU64,
    completed: AtomicBool,
}

impl RpcInfo {
    pub fn new(full_method_name: impl Into<String>) -> Self {
        Self {
            full_method_name: full_method_name.into(),
            sent_messages: AtomicU64::new(0),
            sent_bytes: AtomicU64::new(0),
            received_messages: AtomicU64::new(0),
            received_bytes: AtomicU64::new(0),
            completed: AtomicBool::new(false),
        }
    }

    pub fn full_method_name(&self) -> &str {
        &self.full_method_name
    }

    pub fn sent_messages(&self) -> u64 {
        self.sent_messages.load(Ordering::Relaxed)
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes.load(Ordering::Relaxed)
    }

    pub fn received_messages(&self) -> u64 {
        self.received_messages.load(Ordering::Relaxed)
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn record_sent(&self, bytes: Option<u64>) {
        self.sent_messages.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = bytes {
            self.sent_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_received(&self, bytes: Option<u64>) {
        self.received_messages.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = bytes {
            self.received_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Mark the attempt as completed. Returns `false` if it already was.
    pub(crate) fn complete(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

// Newtype so the slot can't collide with an `Arc<RpcInfo>` inserted by
// unrelated code.
#[derive(Clone)]
struct RpcInfoSlot(Arc<RpcInfo>);

/// Attach a record to the attempt's context, replacing any previous one.
pub fn set_rpc_info(extensions: &mut Extensions, info: Arc<RpcInfo>) {
    extensions.insert(RpcInfoSlot(info));
}

/// The record attached to this context, if any.
pub fn rpc_info(extensions: &Extensions) -> Option<&Arc<RpcInfo>> {
    extensions.get::<RpcInfoSlot>().map(|slot| &slot.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_record_is_returned() {
        let mut ext = Extensions::new();
        let info = Arc::new(RpcInfo::new("method"));
        set_rpc_info(&mut ext, info.clone());

        let found = rpc_info(&ext).expect("record attached");
        assert!(Arc::ptr_eq(found, &info));
    }

    #[test]
    fn missing_record_is_none() {
        assert!(rpc_info(&Extensions::new()).is_none());
    }

    #[test]
    fn cloned_context_shares_counters() {
        let mut ext = Extensions::new();
        set_rpc_info(&mut ext, Arc::new(RpcInfo::new("/svc/Call")));
        let derived = ext.clone();

        rpc_info(&derived).unwrap().record_received(Some(7));
        let original = rpc_info(&ext).unwrap();
        assert_eq!(original.received_messages(), 1);
        assert_eq!(original.received_bytes(), 7);
    }

    #[test]
    fn message_counted_without_bytes() {
        let info = RpcInfo::new("/svc/Call");
        info.record_sent(None);
        info.record_sent(Some(3));
        assert_eq!(info.sent_messages(), 2);
        assert_eq!(info.sent_bytes(), 3);
    }

    #[test]
    fn completes_once() {
        let info = RpcInfo::new("/svc/Call");
        assert!(info.complete());
        assert!(!info.complete());
        assert!(info.is_completed());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let info = Arc::new(RpcInfo::new("/svc/Stream"));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let info = info.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        info.record_sent(Some(2));
                        info.record_received(Some(1));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(info.sent_messages(), 8000);
        assert_eq!(info.sent_bytes(), 16000);
        assert_eq!(info.received_messages(), 8000);
        assert_eq!(info.received_bytes(), 8000);
    }
}
