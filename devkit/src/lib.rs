/*!
# Hostkeeper DevKit - test doubles for the monitoring engine

- Scripted service / container / network / resource backends
- A notification sink that records what the operator would receive
- A harness wiring both into a real `Monitor` with a temporary state file
*/

pub mod backend_stub;
pub mod sink_stub;
pub mod test_utils;

pub use backend_stub::{StubAction, StubBackends};
pub use sink_stub::{RecordingSink, SentMessage};
pub use test_utils::TestHarness;
