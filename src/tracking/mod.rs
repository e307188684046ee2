/**
 * ============================================================================
 * TRACKING MODULE
 * ============================================================================
 *
 * PURPOSE: Background location tracking with templated HTTP transmission
 *
 * ARCHITECTURE:
 * - types: Samples, methods and lifecycle state
 * - error: Command and transport error types
 * - logger: Debug-gated, category-tagged logging
 * - config: Transmission config parsing and the live config store
 * - template: Placeholder substitution and body resolution
 * - throttle: Minimum-interval transmission gate
 * - client: HTTP request construction and sending
 * - queue: Background transmission worker
 * - fanout: Per-sample delivery to listener, one-shots and worker
 * - source: Location provider seam and replay source
 * - state: Persisted "tracking requested" flag
 * - manager: State machine and command surface
 * - bridge: Host method-call routing
 *
 * ============================================================================
 */

pub mod types;
pub mod error;
pub mod logger;
pub mod config;
pub mod template;
pub mod throttle;
pub mod client;
pub mod queue;
pub mod fanout;
pub mod source;
pub mod state;
pub mod manager;
pub mod bridge;
