//! Gateway: HTTP server for the bridge.
//!
//! `GET /` is a health probe. `POST /dingtalk/stream` takes one decoded stream event from the
//! relay that holds the DingTalk stream connection, and answers with its acknowledgement frame.

mod server;

pub use server::{build_app, run_gateway, GatewayState, RELAY_SECRET_HEADER};
