//! Alert rules, evaluators, and notification sinks.

pub mod evaluator;
pub mod rule;
pub mod sinks;

pub use evaluator::{Evaluator, EvaluatorKind};
pub use rule::AlertRule;
pub use sinks::{NotificationSink, SinkFactory, SinkKind};
