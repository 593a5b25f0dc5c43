// HTTP surface (exchange + mint endpoints)
pub mod api;

// Bearer header parsing
pub mod auth;

// Process configuration
pub mod config;

// Encrypted refresh-token storage
pub mod credentials;

// Error taxonomy
pub mod error;

// Caller identity verification
pub mod identity;

// In-process counters
pub mod metrics;

// Token exchange and mint flows
pub mod oauth;
