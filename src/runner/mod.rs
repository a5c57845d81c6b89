pub mod broker;
pub mod context;
pub mod display;
pub mod executor;
pub mod report;
pub mod result;

pub use broker::{ClaimError, DeviceClaim, SessionBroker};
pub use context::{SessionSet, TestContext, Transcript};
pub use executor::{
    AbortHandle, DebugAction, DebugGate, FailurePolicy, RunConfig, RunObserver, RunSummary,
    StatusCounts, TestRunner,
};
pub use result::{UnitError, UnitErrorKind, UnitResult, UnitStatus};
