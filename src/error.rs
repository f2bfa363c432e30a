/// Errors a caller of [`crate::Client`] can cause by misusing the public API.
///
/// Nothing else in this crate returns an error to the embedder: wire and
/// collaborator failures are absorbed internally (see module docs on
/// `crate::client`) and surfaced only through notifications.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ClientError {
    #[error("client is already started")]
    AlreadyStarted,
}

pub type Result<T> = core::result::Result<T, ClientError>;
