//! Engine metrics.
//!
//! Lifecycle counters and transfer volume, exposed through the global
//! metriken registry.

use metriken::{metric, Counter, Gauge};

// ── Request lifecycle ────────────────────────────────────────────

#[metric(
    name = "reqline/requests/submitted",
    description = "Total requests submitted"
)]
pub static REQUESTS_SUBMITTED: Counter = Counter::new();

#[metric(
    name = "reqline/requests/completed",
    description = "Requests finished with an HTTP response"
)]
pub static REQUESTS_COMPLETED: Counter = Counter::new();

#[metric(
    name = "reqline/requests/failed",
    description = "Requests finished with a transport or setup error"
)]
pub static REQUESTS_FAILED: Counter = Counter::new();

#[metric(
    name = "reqline/requests/timeout",
    description = "Requests finished by a timeout"
)]
pub static REQUESTS_TIMEOUT: Counter = Counter::new();

#[metric(
    name = "reqline/requests/cancelled",
    description = "Requests cancelled before completion"
)]
pub static REQUESTS_CANCELLED: Counter = Counter::new();

#[metric(
    name = "reqline/requests/active",
    description = "Transfers currently registered with the engine"
)]
pub static REQUESTS_ACTIVE: Gauge = Gauge::new();

// ── Transfer volume ──────────────────────────────────────────────

#[metric(
    name = "reqline/bytes/uploaded",
    description = "Request body bytes handed to the transport"
)]
pub static BYTES_UPLOADED: Counter = Counter::new();

#[metric(
    name = "reqline/bytes/downloaded",
    description = "Response body bytes received from the transport"
)]
pub static BYTES_DOWNLOADED: Counter = Counter::new();
