pub mod coordinator;

pub use coordinator::{ExecutionCoordinator, ExecutionReport, Subscriber, SubscriberOutcome};
