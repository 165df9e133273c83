//! Oracle 客户端抽象
//!
//! 规划与视觉两个外部 oracle 共用同一个客户端 trait：输入文本（可附一张
//! PNG），输出模型原文。核心只依赖这层输入输出契约，把 oracle 当黑盒。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(String),

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("oracle response malformed: {0}")]
    Malformed(String),
}

/// Oracle 客户端：文本补全与图文补全
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    /// 图文补全；默认实现忽略图像，纯文本后端可以不覆盖
    async fn generate_with_image(
        &self,
        prompt: &str,
        png: &[u8],
    ) -> Result<String, OracleError> {
        let _ = png;
        self.generate(prompt).await
    }
}
