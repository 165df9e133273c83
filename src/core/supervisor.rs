//! 会话监管：生命周期、中断管理
//!
//! 持有 CancellationToken，用户 Ctrl+C 时在下一个挂起点取消主控循环。

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：取消令牌
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（用户 Ctrl+C）
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}
