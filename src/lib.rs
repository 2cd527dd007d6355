//! Mockery Mock Engine
//!
//! Serves synthetic responses for mocked HTTP APIs. Each request is
//! resolved to an endpoint, one of the endpoint's candidate responses is
//! selected, and the response body is rendered through a small expression
//! language.
//!
//! # Features
//!
//! - **URI Templates**: Literal segments, `{name}` variables and trailing
//!   wildcards, with the most specific template winning
//! - **Response Strategies**: Sequence, random, request body match, and
//!   status code echo
//! - **Expressions**: Random values, dates, fake data, and values extracted
//!   from the request via JSONPath, XPath or regex
//! - **Latency Simulation**: Add fixed or random delays
//! - **Hot Reload**: Swap definitions atomically from any definition source
//!
//! # Example Configuration
//!
//! ```yaml
//! projects:
//!   - id: petstore
//!     applications:
//!       - id: v1
//!         endpoints:
//!           - id: get-pet
//!             method: GET
//!             uri: /pets/{id}
//!             strategy: sequence
//!             responses:
//!               - id: found
//!                 status: 200
//!                 expressions: true
//!                 body: |
//!                   {
//!                     "id": "{{PATH_PARAMETER(parameter='id')}}",
//!                     "name": "{{name().firstName()}}"
//!                   }
//!               - id: gone
//!                 status: 410
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod request;
pub mod selector;
pub mod server;
pub mod source;
pub mod template;

pub use config::MockServerConfig;
pub use error::{ConfigError, ExpressionError};
pub use request::MockRequest;
pub use server::{DispatchOutcome, MockResponse, MockServer};
pub use source::{DefinitionSource, FileDefinitionSource};
