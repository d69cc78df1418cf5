use core::fmt::Display;

use tracing::error;

#[track_caller]
fn fail(message: &str, cause: Option<&dyn Display>) -> ! {
    match cause {
        Some(cause) => {
            error!("{message}: {cause}");
            panic!("{message}: {cause}");
        }
        None => {
            error!("{message}");
            panic!("{message}");
        }
    }
}

/// Unwrapping for binaries, where a failed setup step has nowhere left to propagate to.
///
/// The failure is written to the log before panicking so it also ends up in the log
/// file, not only on stderr.
pub trait Failure<T> {
    /// Log the failure and panic.
    fn or_log_and_panic(self, message: &str) -> T;
}

impl<T, E: Display> Failure<T> for Result<T, E> {
    #[track_caller]
    fn or_log_and_panic(self, message: &str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fail(message, Some(&error)),
        }
    }
}

impl<T> Failure<T> for Option<T> {
    #[track_caller]
    fn or_log_and_panic(self, message: &str) -> T {
        match self {
            Some(value) => value,
            None => fail(message, None),
        }
    }
}
