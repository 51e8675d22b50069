use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use common::access::AccessInfo;

use crate::cluster::{DriverError, ManagedDriver};
use crate::service_config::Config;

/// A managed datastore that does nothing but remember what it was asked
#[derive(Debug)]
pub struct MockDriver {
    name: String,
    initialized: bool,
    init_error: Option<(usize, String)>,
    failing_tests: AtomicUsize,

    init_checks: AtomicUsize,
    test_calls: AtomicUsize,
    lifecycle: Mutex<Vec<&'static str>>,
}

impl MockDriver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initialized: false,
            init_error: None,
            failing_tests: AtomicUsize::new(0),
            init_checks: AtomicUsize::new(0),
            test_calls: AtomicUsize::new(0),
            lifecycle: Mutex::new(Vec::new()),
        }
    }

    pub fn initialized(mut self, initialized: bool) -> Self {
        self.initialized = initialized;
        self
    }

    /// Fail every initialization check
    pub fn init_error(self, message: &str) -> Self {
        self.init_error_after(0, message)
    }

    /// Answer the first `ok_checks` initialization checks normally, then fail
    pub fn init_error_after(mut self, ok_checks: usize, message: &str) -> Self {
        self.init_error = Some((ok_checks, message.to_string()));
        self
    }

    /// Fail the next `count` probes; `usize::MAX` never recovers
    pub fn failing_tests(self, count: usize) -> Self {
        self.failing_tests.store(count, Ordering::SeqCst);
        self
    }

    pub fn init_checks(&self) -> usize {
        self.init_checks.load(Ordering::SeqCst)
    }

    pub fn test_calls(&self) -> usize {
        self.test_calls.load(Ordering::SeqCst)
    }

    /// `start`, `reset` and `register` calls, in order
    pub fn lifecycle_calls(&self) -> Vec<&'static str> {
        self.lifecycle
            .lock()
            .expect("mock driver lock poisoned")
            .clone()
    }

    fn record(&self, call: &'static str) {
        self.lifecycle
            .lock()
            .expect("mock driver lock poisoned")
            .push(call);
    }
}

#[async_trait]
impl ManagedDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_initialized(&self, _config: &Config) -> Result<bool, DriverError> {
        let check = self.init_checks.fetch_add(1, Ordering::SeqCst);
        match &self.init_error {
            Some((ok_checks, message)) if check >= *ok_checks => {
                Err(anyhow::anyhow!("{}", message).into())
            }
            _ => Ok(self.initialized),
        }
    }

    async fn test(&self, _info: Option<&AccessInfo>) -> Result<(), DriverError> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_tests.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != usize::MAX {
            self.failing_tests.store(remaining - 1, Ordering::SeqCst);
        }
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn start(&self, _info: Option<&AccessInfo>) -> Result<(), DriverError> {
        self.record("start");
        Ok(())
    }

    async fn reset(&self, _info: Option<&AccessInfo>) -> Result<(), DriverError> {
        self.record("reset");
        Ok(())
    }

    async fn register(
        &self,
        _config: &Config,
        listener: TcpListener,
        router: Router,
    ) -> Result<(TcpListener, Router), DriverError> {
        self.record("register");
        Ok((listener, router))
    }
}
