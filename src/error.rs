use thiserror::Error;

/// Every failure mode the engine can surface, propagated with
/// `thiserror` the same way the teacher's `error.rs` wraps IO/serde
/// errors and adds domain-specific variants on top.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse release-times CSV: {0}")]
    Csv(#[from] csv::Error),

    /// An RA-PST or schedule document violates one of its structural
    /// invariants at build time.
    #[error("invalid RA-PST: {0}")]
    InvalidRAPST(String),

    /// The heuristic selected a branch that fails validity at allocation
    /// time. Recoverable locally: the branch is skipped.
    #[error("invalid branch: {0}")]
    InvalidBranch(String),

    /// The CP engine reported the model has no feasible solution.
    #[error("constraint model is infeasible")]
    Infeasible,

    /// The CP engine's time limit expired with no incumbent solution.
    #[error("solver timed out with no incumbent solution")]
    SolverTimeoutNoIncumbent,

    /// A warm-start document's job count does not match the number of
    /// non-fixed interval variables created for the model.
    #[error("warm-start size mismatch: expected {expected} starting assignments, got {got}")]
    StartingPointMismatch { expected: usize, got: usize },

    /// The driver's queue mixes more than one strategy tag.
    #[error("queue mixes strategies; all pending items must share one strategy")]
    MixedStrategyUnsupported,

    /// `replace` is not implemented for allocation.
    #[error("unsupported change type: {0}")]
    UnsupportedChangeType(String),

    /// The CLI's `<strategy>` argument did not name one of the five
    /// allocation strategies.
    #[error("unknown allocation strategy: {0}")]
    UnknownStrategy(String),

    #[error("failed to persist schedule document: {0}")]
    SchedulePersistenceError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
