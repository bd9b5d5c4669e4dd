//! Tag-encoded session state
//!
//! - [`session_state`] - decoding tags and the pure transition function
//! - [`scheduler`] - selection and persistence of matching outcomes

pub mod scheduler;
pub mod session_state;

pub use scheduler::{eligibility, Eligibility, RetryScheduler};
pub use session_state::{transition, MatchOutcome, RetryMarker, SessionState, TagPlan, Transition};
