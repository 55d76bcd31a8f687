//! Application error type.
//!
//! Every fallible operation in the crate returns `AppError`, which carries the
//! process exit code alongside a human-readable message:
//!
//! | code | meaning |
//! |------|---------|
//! | 2 | bad input or configuration (unreadable event file, invalid flags) |
//! | 3 | no usable data |
//! | 4 | computation failure (worker failure, fit failure, oversized pool) |
//!
//! Events that fail selection are *not* errors; they are reported as skips.

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Input/configuration problem (exit code 2).
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Nothing left to work with after reading/filtering (exit code 3).
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Numerical or parallel computation failure (exit code 4).
    pub fn compute(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_set_exit_codes() {
        assert_eq!(AppError::input("x").exit_code(), 2);
        assert_eq!(AppError::no_data("x").exit_code(), 3);
        assert_eq!(AppError::compute("x").exit_code(), 4);
        assert_eq!(AppError::compute("boom").to_string(), "boom");
    }
}
