use crossbeam::channel::Sender;

use super::Event;

/// Receiver of engine events.
pub trait EventSink: Send {
    fn publish(&self, event: Event);
}

impl EventSink for Sender<Event> {
    fn publish(&self, event: Event) {
        // a dropped receiver just means nobody is listening
        let _ = self.send(event);
    }
}

impl<F> EventSink for F
where
    F: Fn(Event) + Send,
{
    fn publish(&self, event: Event) {
        self(event);
    }
}
