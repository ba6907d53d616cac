// Scan handling
pub mod debounce;
pub mod line_reconciler;
pub mod scan_engine;
pub mod scan_resolver;

// Route and zone guidance
pub mod route_engine;
pub mod scheduler;
pub mod zone_ranker;

// Document lifecycle and reporting
pub mod discrepancy;
pub mod document_lifecycle;

// Injected clock, metrics and feature flags
pub mod collaborators;

// Service factory for dependency injection
pub mod factory;
