// qs-test-utils: Shared test utilities for the queue client suite.
//
// Provides a mock queue HTTP server for integration testing of the engine.

pub mod mock_queue_server;

pub use mock_queue_server::{
    MockQueueServer, MockResponse, status_failure, status_waiting, status_with_notification,
};
