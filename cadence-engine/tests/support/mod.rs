//! Shared fixtures for engine integration tests
#![allow(dead_code)] // Not every test binary uses every helper

pub mod harness;
pub mod mock_transport;
pub mod recording_store;

pub use harness::Harness;
pub use mock_transport::MockTransport;
pub use recording_store::RecordingCampaignStore;
