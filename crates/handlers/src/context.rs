use std::error::Error;

/// Builds a handler from the application's shared dependencies.
///
/// `C` is whatever the application uses to hold its repositories, clients and
/// configuration. Construction happens once per registration, when the
/// registry subscribes.
pub trait FromContext<C>: Sized {
    /// The error returned when the handler cannot be built.
    type Error: Error + Send + Sync + 'static;

    /// Builds the handler.
    fn from_context(context: &C) -> Result<Self, Self::Error>;
}
