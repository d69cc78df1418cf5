/// Transport level outcome of a backup operation.
///
/// The archive engine only reports domain errors; a transport adapter picks one of
/// these and the matching status code at the boundary.
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    /// The operation succeeded.
    Success,

    /// The input was rejected for safety reasons and must not be retried as is.
    Rejected,

    /// The caller sent something that was not a valid archive or request.
    BadData,

    /// The thing being operated on does not exist.
    NotFound,

    /// The caller is not allowed to touch the resource.
    Forbidden,

    /// The server is running or already has an operation in progress.
    Conflict,

    /// The caller sent something that exceeded the size limit.
    TooLarge,

    /// The operation was aborted because it exceeded its resource budget.
    ResourceExhausted,

    /// The service encountered an unexpected error.
    Error,
}

impl Response {
    /// The HTTP status code for the response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success => 200,
            Self::Rejected | Self::BadData => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::TooLarge => 413,
            Self::ResourceExhausted => 507,
            Self::Error => 500,
        }
    }

    /// If a client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::ResourceExhausted | Self::Error)
    }
}
