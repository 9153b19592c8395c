//! Condition evaluation primitives: comparison operators, operand
//! resolution, the boolean expression interpreter, and the time-range
//! predicate. All of them are pure functions of their inputs; anything
//! stateful (gateway calls, the clock) is injected.

pub mod expression;
pub mod operand;
pub mod operators;
pub mod time_range;

pub use expression::evaluate_bool;
pub use operand::{lookup_field, resolve_operand};
pub use operators::{compare, CompareOp};
pub use time_range::{in_time_range, Clock, SystemClock};
