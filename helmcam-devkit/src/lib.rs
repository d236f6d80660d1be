/*!
# HelmCam DevKit

Test support for the dashboard:
- event bus stub feeding the real topic parser
- in-process fake of the receiver REST API
- a harness that drives the reconciler one batch at a time
*/

pub mod bus_stub;
pub mod receiver_stub;
pub mod test_utils;

pub use bus_stub::{MockBus, ReceiverMessageBuilder};
pub use receiver_stub::MockReceiver;
pub use test_utils::TestHarness;
