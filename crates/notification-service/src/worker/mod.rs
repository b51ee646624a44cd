//! 后台 Worker
//!
//! 目前只有重试 worker：轮询重试队列，把到期的通知重新送入分发路径。

mod retry_worker;

pub use retry_worker::RetryWorker;
