//! 调用节流
//!
//! 对 oracle 的调用保持最小间隔：记录上次调用时刻，来得太快的调用原地
//! 等待剩余时间。这是协作式延迟而不是队列——锁跨越等待持有，更快的
//! 并发调用者会依次排队。

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct CallThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl CallThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// 阻塞到距上次调用至少过去 min_interval，然后记账
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_calls_are_spaced_by_the_interval() {
        let throttle = CallThrottle::new(Duration::from_millis(120));
        throttle.acquire().await;
        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn first_call_is_not_delayed() {
        let throttle = CallThrottle::new(Duration::from_secs(5));
        let start = Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
