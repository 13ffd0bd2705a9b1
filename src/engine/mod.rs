mod context;
mod dispatcher;
mod error;
mod events;
mod registry;

pub use context::ScenarioContext;
pub use dispatcher::{DefaultFault, DispatcherOptions, ScenarioDispatcher, ServeSummary};
pub use error::SimulatorError;
pub use events::DispatchEvent;
pub use registry::ScenarioRegistry;
