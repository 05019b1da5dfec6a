//! Destinations for read events.

use miditape_core::{MidiEvent, TimeValue};

pub trait EventSink<T: TimeValue> {
    fn write(&mut self, event: MidiEvent<T>);
}

impl<T: TimeValue> EventSink<T> for Vec<MidiEvent<T>> {
    #[inline]
    fn write(&mut self, event: MidiEvent<T>) {
        self.push(event);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<T: TimeValue, F: FnMut(MidiEvent<T>)> EventSink<T> for FnSink<F> {
    #[inline]
    fn write(&mut self, event: MidiEvent<T>) {
        (self.0)(event)
    }
}
