//! Error-sticky status accumulation across a sequence of operations.
//!
//! ```
//! # use riofpga::status::Status;
//! # use riofpga::transport::Error;
//! let mut status = Status::new();
//! let first: Option<u16> = status.merge(Ok(3));
//! status.merge::<()>(Err(Error::Timeout));
//! status.merge::<()>(Err(Error::InvalidSession));
//! status.merge(Ok(()));
//! assert_eq!(first, Some(3));
//! assert_eq!(status.error(), Some(&Error::Timeout));
//! ```

use crate::transport::{
    codes,
    Error,
    TransportResult,
};

/// The outcome of a sequence of operations. Once an error is merged in, it stays: the first error
/// wins and later outcomes, good or bad, are dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Status {
    error: Option<Error>,
}

impl Status {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `result` into this status, handing back the value on success
    pub fn merge<T>(&mut self, result: TransportResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
                None
            }
        }
    }

    /// Fold a whole other status into this one, as if its operations had come after ours
    pub fn merge_status(&mut self, other: Status) {
        if let Some(e) = other.error {
            self.merge::<()>(Err(e));
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The first error merged in, if any
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The vendor-style status code, 0 on success
    #[must_use]
    pub fn code(&self) -> i32 {
        self.error.as_ref().map_or(codes::SUCCESS, Error::code)
    }

    /// # Errors
    /// Returns the first error merged in
    pub fn into_result(self) -> TransportResult<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl From<Error> for Status {
    fn from(e: Error) -> Self {
        Self { error: Some(e) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses() -> Vec<Status> {
        vec![
            Status::new(),
            Error::Timeout.into(),
            Error::Device { code: -61_046 }.into(),
            Error::InvalidSession.into(),
        ]
    }

    #[test]
    fn test_success_stays_success() {
        let mut status = Status::new();
        assert_eq!(status.merge(Ok(1u8)), Some(1));
        assert_eq!(status.merge(Ok(())), Some(()));
        assert!(status.is_ok());
        assert_eq!(status.code(), 0);
        assert_eq!(status.into_result(), Ok(()));
    }

    #[test]
    fn test_first_error_sticks() {
        let mut status = Status::new();
        assert_eq!(status.merge::<u8>(Err(Error::Device { code: -1 })), None);
        status.merge(Ok(()));
        status.merge::<()>(Err(Error::Timeout));
        assert_eq!(status.code(), -1);
        assert_eq!(status.into_result(), Err(Error::Device { code: -1 }));
    }

    #[test]
    fn test_merge_is_associative() {
        for a in statuses() {
            for b in statuses() {
                for c in statuses() {
                    let mut left = a.clone();
                    left.merge_status(b.clone());
                    left.merge_status(c.clone());

                    let mut bc = b.clone();
                    bc.merge_status(c.clone());
                    let mut right = a.clone();
                    right.merge_status(bc);

                    assert_eq!(left, right);
                }
            }
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(Status::from(Error::Timeout).code(), codes::FIFO_TIMEOUT);
        assert_eq!(
            Status::from(Error::InvalidSession).code(),
            codes::INVALID_SESSION
        );
        assert_eq!(
            Status::from(Error::BufferTooSmall {
                requested: 2,
                capacity: 1
            })
            .code(),
            codes::INVALID_PARAMETER
        );
    }
}
