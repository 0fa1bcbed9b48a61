//! Mockserve
//!
//! A declarative HTTP mock server. A JSON spec file describes endpoints;
//! the server answers with templated responses, picks variants based on
//! request content and simulates latency and failures for resilience testing.
//!
//! # Features
//!
//! - **Request Matching**: Select variants by query, body, header and cookie values
//! - **Dynamic Templates**: Interpolate `{{params.x}}`, `{{query.x}}` and `{{body.a.b}}`
//! - **Fake Data**: `__faker` directives backed by a seedable generator
//! - **Repetition**: `__repeat` directives expand into arrays of fixed or random length
//! - **Latency Simulation**: Fixed `delayMs` or per-request `delay` ranges
//! - **Failure Injection**: Error rate, status and body at global, endpoint or variant level
//! - **Hot Reload**: The spec file is watched and the server swapped on change
//! - **Request History**: Inspect and clear recent requests via `/__history`
//!
//! # Example Spec
//!
//! ```json
//! {
//!   "version": 1,
//!   "settings": { "delayMs": 50, "fakerSeed": 42 },
//!   "endpoints": [
//!     {
//!       "method": "GET",
//!       "path": "/users/:id",
//!       "response": {
//!         "id": "{{params.id}}",
//!         "name": { "__faker": "person.fullName" }
//!       },
//!       "variants": [
//!         {
//!           "name": "missing",
//!           "match": { "query": { "missing": "true" } },
//!           "status": 404,
//!           "response": { "error": "User not found" }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

pub mod behavior;
pub mod config;
pub mod faker;
pub mod handler;
pub mod history;
pub mod matcher;
pub mod reload;
pub mod server;
pub mod template;
pub mod validation;
pub mod watcher;

pub use config::{load_spec, parse_spec, MockSpec, SpecError};
pub use handler::{MockHandler, MockResponse};
pub use history::HistoryRecorder;
pub use matcher::MockRequest;
pub use reload::{ReloadOrchestrator, SpecLauncher};
pub use server::{build_router, ServerHandle};
pub use template::{render, RenderContext, RenderError, TemplateValue};
pub use watcher::SpecWatcher;
