//! Resilience patterns for skycast-runtime.
//!
//! This module provides:
//! - Circuit breaker per upstream
//! - Retry with exponential backoff

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitFailure, CircuitOpenError,
    CircuitState,
};
pub use retry::{RetryConfig, RetryEvent, RetryObserver, RetryPolicy, Transient};
