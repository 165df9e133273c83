//! Oracle 层：外部规划 / 视觉服务的客户端抽象、真实实现与节流

pub mod gemini;
pub mod mock;
pub mod throttle;
pub mod traits;

pub use gemini::GeminiClient;
pub use mock::MockOracleClient;
pub use throttle::CallThrottle;
pub use traits::{OracleClient, OracleError};
