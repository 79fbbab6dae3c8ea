/// QP adapter errors.
#[derive(Debug, Clone, PartialEq)]
pub enum QpError
{
    /// Found an infeasibility certificate.
    Infeasible,
    /// The numerical routine broke down or gave up.
    SolverError(String),
    /// Problem data have inconsistent sizes.
    InvalidProblem(String),
}

impl core::fmt::Display for QpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self {
            QpError::Infeasible         => write!(f, "Infeasible: found an infeasibility certificate"),
            QpError::SolverError(s)     => write!(f, "SolverError: {}", s),
            QpError::InvalidProblem(s)  => write!(f, "InvalidProblem: {}", s),
        }
    }
}

impl std::error::Error for QpError {}

//

/// SPICE errors.
///
/// Every variant aborts the run; there is no partial result.
#[derive(Debug, Clone, PartialEq)]
pub enum SpiceError
{
    /// Bad parameter values, or too few endmembers left to continue.
    InvalidConfiguration(String),
    /// Malformed or undersized observations, or mismatched initial endmembers.
    InvalidInput(String),
    /// The abundance QP of an observation could not be solved.
    QpFailure {
        /// Column index of the offending observation.
        index: usize,
        /// Error reported by the QP backend.
        cause: QpError,
    },
    /// The endmember update system is not invertible.
    SingularMatrix,
}

impl core::fmt::Display for SpiceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self {
            SpiceError::InvalidConfiguration(s) => write!(f, "InvalidConfiguration: {}", s),
            SpiceError::InvalidInput(s)         => write!(f, "InvalidInput: {}", s),
            SpiceError::QpFailure {index, cause} => write!(f, "QPFailure: observation {}: {}", index, cause),
            SpiceError::SingularMatrix          => write!(f, "SingularMatrix: endmember update is not invertible"),
        }
    }
}

impl std::error::Error for SpiceError
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)>
    {
        match &self {
            SpiceError::QpFailure {cause, ..} => Some(cause),
            _ => None,
        }
    }
}

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SpiceError>;

//

#[test]
fn test_error_display()
{
    let e = SpiceError::QpFailure {index: 3, cause: QpError::Infeasible};
    assert_eq!(format!("{}", e), "QPFailure: observation 3: Infeasible: found an infeasibility certificate");

    use std::error::Error;
    assert!(e.source().is_some());
    assert!(SpiceError::SingularMatrix.source().is_none());
}
