use std::fmt::Display;

use thiserror::Error;

/// Errors raised while decoding or encoding a querystring.
///
/// Every error aborts the whole operation: there is no partial result.
/// Limit and depth errors are only raised when the corresponding
/// `throw_on_limit_exceeded` / `strict_depth` option is enabled, otherwise
/// the codec degrades gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// `parameter_limit` was configured as zero.
    #[error("parameter limit must be a positive integer")]
    ParameterLimitNotPositive,

    /// More than `limit` parameters were found in the input.
    #[error("parameter limit exceeded: only {limit} parameter{} allowed", plural(.limit))]
    ParameterLimitExceeded { limit: usize },

    /// A list would have grown beyond `limit` elements.
    #[error("list limit exceeded: only {limit} element{} allowed in a list", plural(.limit))]
    ListLimitExceeded { limit: usize },

    /// A key nests deeper than `max_depth` and `strict_depth` is set.
    #[error("input depth exceeded depth option of {max_depth} and strict depth is enabled")]
    DepthExceeded { max_depth: usize },

    /// The value graph refers back to a container that is still being encoded.
    #[error("cyclic object value")]
    CyclicObject,

    /// Raised by the serde bridge (`to_value` / `from_value`).
    #[error("{0}")]
    Custom(String),
}

fn plural(n: &usize) -> &'static str {
    if *n == 1 { "" } else { "s" }
}

impl Error {
    pub(crate) fn custom<T: Display>(msg: T) -> Self {
        Error::Custom(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Custom(msg.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Error::Custom(msg.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
