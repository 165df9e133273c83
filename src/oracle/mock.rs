//! 脚本化 Mock Oracle（用于测试与无 API Key 的本地运行）
//!
//! 预先压入一串响应，按序弹出；耗尽后返回固定的默认响应。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::oracle::traits::{OracleClient, OracleError};

pub struct MockOracleClient {
    responses: Mutex<VecDeque<String>>,
    default: String,
}

impl MockOracleClient {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default: default.into(),
        }
    }

    /// 压入下一条响应（先入先出）
    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }
}

#[async_trait]
impl OracleClient for MockOracleClient {
    async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.default.clone()))
    }
}
