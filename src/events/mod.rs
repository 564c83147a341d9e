mod event;
mod sink;

pub use event::{
    Event, PayloadCascadeLevel, PayloadContentUpdated, PayloadLayoutSettled, PayloadNodeCreated,
    PayloadNodeMove, PayloadNodeRemoved, PayloadPan, PayloadReplyFinished, PayloadZoom,
};
pub use sink::EventSink;
