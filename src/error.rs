use thiserror::Error;

/// Errors raised by query construction and by live streams.
///
/// Configuration errors are returned synchronously, before anything is
/// subscribed. Protocol violations and upstream failures travel on the stream
/// as its terminal notification; the accumulated state of that subscription is
/// discarded and the consumer has to subscribe again to retry.
///
/// `Error` is `Clone` because a single failure may end several streams at
/// once (every listener of a failed path, or every observer of a
/// [`Subject`](crate::Subject)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// More than one ordering was requested for the same query.
    #[error("multiple orderings specified")]
    MultipleOrderings,

    /// An infinite list needs exactly one of order-by-key or order-by-child.
    #[error("unexpected order (or no order) specified")]
    UnsupportedOrder,

    /// Pages must hold at least one element.
    #[error("invalid page size {0}: pages must hold at least one element")]
    InvalidPageSize(usize),

    /// The store invoked a listener without the snapshot it is contracted to
    /// deliver.
    #[error("received null snapshot")]
    NullSnapshot,

    /// The store reported a failure for a listener.
    #[error("store error: {0}")]
    Upstream(String),
}

impl Error {
    /// Returns `true` for errors raised while building a query or options.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MultipleOrderings | Error::UnsupportedOrder | Error::InvalidPageSize(_)
        )
    }

    /// Returns `true` when the store broke the notification contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::NullSnapshot)
    }

    /// Returns `true` for failures reported by the store itself.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
