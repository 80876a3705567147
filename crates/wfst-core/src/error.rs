// Error type shared by storage mutators and algorithm checks.

use crate::arc::StateId;

/// Recoverable failures of automaton construction and algorithms.
///
/// Mutating storage operations return these directly. Lazy and eager
/// algorithms log them and record [`FstProperties::ERROR`] on their result
/// instead of failing the call.
///
/// [`FstProperties::ERROR`]: crate::properties::FstProperties::ERROR
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FstError {
    #[error("mapper produced non-epsilon labels on the final arc of state {state}")]
    SuperfinalLabels { state: StateId },
    #[error("weight cannot be represented in the target semiring: {0}")]
    UnrepresentableWeight(String),
    #[error("operand is not an acceptor")]
    NotAcceptor,
    #[error("incompatible {side} symbol tables")]
    IncompatibleSymbols { side: &'static str },
    #[error("state {0} is out of range")]
    StateOutOfRange(StateId),
    #[error("arc index {index} is out of range for state {state}")]
    ArcOutOfRange { state: StateId, index: usize },
    #[error("symbol {symbol:?} is already bound to label {label}")]
    DuplicateSymbol { symbol: String, label: u32 },
    #[error("unknown compose filter: {0}")]
    UnknownFilter(String),
}
