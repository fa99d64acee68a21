//! Header construction delegated to the uplink.
//!
//! A stub builds link-layer headers with the uplink's header builder: the
//! frame is rebound to the uplink for the duration of the call, so the
//! builder sees its own device, and handed back to the stub afterwards.

use crate::endpoint::Endpoint;
use crate::frame::Frame;
use crate::host::{HeaderError, HeaderOps, LinkHeader};
use crate::uplink::Uplink;

/// Run `op` with the uplink's header builder while `frame` belongs to the uplink.
///
/// Without a builder on the uplink, returns `unsupported` and leaves the
/// frame untouched.
fn delegate<R>(
    uplink: &Uplink,
    frame: &mut Frame,
    unsupported: R,
    op: impl FnOnce(&dyn HeaderOps, &mut Frame) -> R,
) -> R {
    let Some(ops) = uplink.header_ops() else {
        return unsupported;
    };
    let mut frame = frame.rebind(uplink.id());
    op(ops, &mut *frame)
}

impl HeaderOps for Endpoint {
    fn create(&self, frame: &mut Frame, header: &LinkHeader) -> Result<usize, HeaderError> {
        delegate(self.uplink(), frame, Ok(0), |ops, frame| ops.create(frame, header))
    }

    fn rebuild(&self, frame: &mut Frame) -> Result<(), HeaderError> {
        delegate(self.uplink(), frame, Ok(()), |ops, frame| ops.rebuild(frame))
    }
}
