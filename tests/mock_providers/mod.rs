//! Mock vendor servers for integration tests
//!
//! Simulates the IAT WebSocket endpoint with scripted behavior:
//! - Records the signed handshake URI
//! - Records every frame status and the decoded audio
//! - Replies with scripted messages once the last frame arrives
//! - Can reject the handshake or drop the connection

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::*;
