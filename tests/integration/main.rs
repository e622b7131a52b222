//! Integration tests: the tracker driven end to end against an in-memory
//! platform and real file storage.

mod mock_platform;
mod tracker_flow;
