use {
    crate::{
        decode::ParseError, linker::LinkError, machine::InstantiationError, trap::Trap,
        validate::ValidationError,
    },
    thiserror::Error,
};

/// Any error this crate can produce, for embedders that want a single error type.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),
    #[error("trap: {0}")]
    Trap(#[from] Trap),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_phase_errors() {
        let error = Error::from(Trap::IntegerDivideByZero);
        assert_eq!(error.to_string(), "trap: integer divide by zero");
        assert!(matches!(Error::from(ParseError::InvalidTag), Error::Parse(_)));
    }
}
