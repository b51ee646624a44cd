//! 通知分发服务
//!
//! 接收事件提交（HTTP），把事件扇出为 (渠道, 收件人) 粒度的通知，
//! 经渠道适配器发送；失败的通知进入持久化重试队列，由后台 worker
//! 按指数退避重新投递，直至成功或达到尝试上限。

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod worker;
