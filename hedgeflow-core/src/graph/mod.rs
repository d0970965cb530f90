//! Task graph: named stages over a shared record, run concurrently where the
//! dependency structure allows.

pub mod builder;
pub mod error;
pub mod executor;
pub mod record;
pub mod stage;

pub use builder::{GraphBuilder, TaskGraph};
pub use error::{GraphError, StageError};
pub use executor::{ExecutionReport, NodeOutcome, NodeStatus};
pub use record::Record;
pub use stage::{FnStage, Stage};
