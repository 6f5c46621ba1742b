//! Scripted in-memory cache used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tiercache_core::{Cache, CacheContext, CacheError, CacheResult};

/// A cache whose failures are injected by the test.
pub struct MockCache {
    name: String,
    entries: Mutex<HashMap<String, String>>,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    ping_calls: AtomicUsize,
    get_failures: AtomicUsize,
    set_failures: AtomicUsize,
    get_error: Mutex<Option<fn(&str) -> CacheError>>,
    ping_error: Mutex<Option<String>>,
    get_delay: Mutex<Option<Duration>>,
    reject_overwrite: AtomicBool,
}

impl MockCache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(HashMap::new()),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            get_failures: AtomicUsize::new(0),
            set_failures: AtomicUsize::new(0),
            get_error: Mutex::new(None),
            ping_error: Mutex::new(None),
            get_delay: Mutex::new(None),
            reject_overwrite: AtomicBool::new(false),
        }
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// The next `count` gets fail with a backend error.
    pub fn failing_gets(self, count: usize) -> Self {
        self.get_failures.store(count, Ordering::SeqCst);
        self
    }

    /// The next `count` sets fail with a backend error.
    pub fn failing_sets(self, count: usize) -> Self {
        self.set_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Sets of a present key fail with `AlreadyExists`.
    pub fn rejecting_overwrite(self) -> Self {
        self.reject_overwrite.store(true, Ordering::SeqCst);
        self
    }

    /// Every get returns the error built by `make`.
    pub fn with_get_error(self, make: fn(&str) -> CacheError) -> Self {
        *self.get_error.lock().unwrap() = Some(make);
        self
    }

    pub fn with_get_delay(self, delay: Duration) -> Self {
        *self.get_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing_ping(self, message: &str) -> Self {
        *self.ping_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else if n == usize::MAX {
                    Some(n)
                } else {
                    Some(n - 1)
                }
            })
            .is_ok()
    }
}

#[async_trait]
impl Cache<String> for MockCache {
    async fn get(&self, _ctx: &CacheContext, key: &str) -> CacheResult<String> {
        let call = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let make_error = *self.get_error.lock().unwrap();
        if let Some(make_error) = make_error {
            return Err(make_error(key));
        }
        if Self::take_failure(&self.get_failures) {
            return Err(CacheError::backend(
                &self.name,
                format!("injected get failure {call}"),
            ));
        }

        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(CacheError::Miss)
    }

    async fn set(&self, _ctx: &CacheContext, key: &str, value: &String) -> CacheResult<()> {
        let call = self.set_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if Self::take_failure(&self.set_failures) {
            return Err(CacheError::backend(
                &self.name,
                format!("injected set failure {call}"),
            ));
        }

        let mut entries = self.entries.lock().unwrap();
        if self.reject_overwrite.load(Ordering::SeqCst) && entries.contains_key(key) {
            return Err(CacheError::already_exists(key));
        }
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        match self.ping_error.lock().unwrap().clone() {
            Some(message) => Err(CacheError::backend(&self.name, message)),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
