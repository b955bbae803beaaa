//! Declarative wiring of message handlers to broker subscriptions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod context;
mod error;
mod registry;
mod subscription;

pub use context::FromContext;
pub use error::Error;
pub use registry::{HandlerRegistry, RegistrationReport, SkippedHandler};
