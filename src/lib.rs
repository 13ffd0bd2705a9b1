//! 시나리오 기반 요청/응답 시뮬레이터.
//!
//! 채널로 들어온 요청을 등록된 시나리오와 대조하여 처음 일치한 시나리오를 실행하고,
//! 그 결과(응답 또는 폴트)를 같은 채널로 돌려보낸다.

pub mod channel;
pub mod config;
pub mod engine;
pub mod scenario;
pub mod server;

pub use channel::{Channel, Transport};
pub use engine::{ScenarioContext, ScenarioDispatcher, SimulatorError};
pub use scenario::{Scenario, ScenarioOutcome, ScenarioRequest};
