// Frame-availability relay: serializes producer threads onto a single native sink.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{FrameId, FrameSink};

#[derive(Default)]
pub struct FrameRelay {
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the sink, replacing any previous one.
    pub fn set_sink(&self, sink: Arc<dyn FrameSink>) {
        *self.sink.lock() = Some(sink);
    }

    pub fn clear_sink(&self) {
        *self.sink.lock() = None;
    }

    /// Callable from any thread. The lock is held while the sink runs, so
    /// the sink never sees two calls at once.
    pub fn on_frame_available(&self, frame: FrameId) {
        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink) => sink.on_frame_available(frame),
            None => trace!("frame {:?} available with no sink installed", frame),
        }
    }
}
