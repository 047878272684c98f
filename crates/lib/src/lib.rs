//! QingLong bot core library: QingLong API client, DingTalk channel, command router and
//! gateway, used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod qinglong;
pub mod router;
