//! Depth-1 conflating buffer
//!
//! A slot holds at most one value. Putting a value replaces whatever has not
//! been taken yet, so the reader always gets the newest value and never a
//! backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Single-value latest-wins buffer shared between writer tasks and one reader
#[derive(Debug)]
pub struct ConflatedSlot<T> {
    value: Mutex<Option<T>>,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> ConflatedSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Store a value, returning the unconsumed value it displaced
    pub fn put(&self, value: T) -> Option<T> {
        let displaced = self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value);
        self.notify.notify_one();
        displaced
    }

    /// Take the current value without waiting
    pub fn try_take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for a value and take it.
    ///
    /// Returns `None` once the slot is closed and empty. A value stored
    /// before closing is still handed out.
    pub async fn take(&self) -> Option<T> {
        loop {
            if let Some(value) = self.try_take() {
                return Some(value);
            }
            if self.is_closed() {
                return None;
            }
            // notify_one leaves a permit when nobody is waiting, so a put
            // between the check above and this await is not lost
            self.notify.notified().await;
        }
    }

    /// Whether a value is waiting
    pub fn is_empty(&self) -> bool {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Mark the slot closed and wake the reader
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Default for ConflatedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_put_replaces_unconsumed_value() {
        let slot = ConflatedSlot::new();

        assert_eq!(slot.put(1), None);
        assert_eq!(slot.put(2), Some(1));
        assert_eq!(slot.put(3), Some(2));

        assert_eq!(slot.try_take(), Some(3));
        assert_eq!(slot.try_take(), None);
        assert!(slot.is_empty());
    }

    #[tokio::test]
    async fn test_take_waits_for_put() {
        let slot = Arc::new(ConflatedSlot::new());

        let writer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.put("frame");
        });

        let value = tokio::time::timeout(Duration::from_secs(1), slot.take())
            .await
            .unwrap();
        assert_eq!(value, Some("frame"));
    }

    #[tokio::test]
    async fn test_take_returns_latest_of_burst() {
        let slot = ConflatedSlot::new();
        for i in 0..100 {
            slot.put(i);
        }

        assert_eq!(slot.take().await, Some(99));
        assert!(slot.is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let slot = ConflatedSlot::new();
        slot.put(5);
        slot.close();

        assert_eq!(slot.take().await, Some(5));
        assert_eq!(slot.take().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_reader() {
        let slot = Arc::new(ConflatedSlot::<u32>::new());

        let closer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let value = tokio::time::timeout(Duration::from_secs(1), slot.take())
            .await
            .unwrap();
        assert_eq!(value, None);
    }
}
