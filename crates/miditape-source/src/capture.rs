//! Lock-free hand-off of captured MIDI from the realtime thread.

use miditape_core::{AtomicCounter, MidiEvent, Samples};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::Arc;

/// A short (at most three byte) message with its capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedEvent {
    pub time: Samples,
    len: u8,
    data: [u8; 3],
}

impl CapturedEvent {
    /// `None` for empty or longer payloads; those go through the locked
    /// append path instead.
    pub fn new(time: Samples, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }
        let mut data = [0u8; 3];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            time,
            len: bytes.len() as u8,
            data,
        })
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl TryFrom<&MidiEvent<Samples>> for CapturedEvent {
    type Error = ();

    fn try_from(event: &MidiEvent<Samples>) -> Result<Self, ()> {
        CapturedEvent::new(event.time, event.bytes()).ok_or(())
    }
}

/// Realtime side. Never blocks; full buffers count a drop.
pub struct CaptureProducer {
    producer: HeapProd<CapturedEvent>,
    dropped: Arc<AtomicCounter>,
}

impl CaptureProducer {
    #[inline]
    pub fn push(&mut self, event: CapturedEvent) -> bool {
        let ok = self.producer.try_push(event).is_ok();
        if !ok {
            self.dropped.increment();
        }
        ok
    }

    #[inline]
    pub fn push_event(&mut self, event: &MidiEvent<Samples>) -> bool {
        match CapturedEvent::try_from(event) {
            Ok(captured) => self.push(captured),
            Err(()) => {
                self.dropped.increment();
                false
            }
        }
    }

    /// Events lost because the buffer was full or too long to capture.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

/// Drained by [`MidiSource::write_unlocked`](crate::MidiSource::write_unlocked).
pub struct CaptureConsumer {
    consumer: HeapCons<CapturedEvent>,
    dropped: Arc<AtomicCounter>,
}

impl CaptureConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<CapturedEvent> {
        self.consumer.try_pop()
    }

    /// Pop the oldest event if it is earlier than `end`.
    #[inline]
    pub fn pop_before(&mut self, end: Samples) -> Option<CapturedEvent> {
        match self.consumer.try_peek() {
            Some(event) if event.time < end => self.consumer.try_pop(),
            _ => None,
        }
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

pub fn capture_channel(capacity: usize) -> (CaptureProducer, CaptureConsumer) {
    let rb = HeapRb::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicCounter::default());
    (
        CaptureProducer {
            producer,
            dropped: Arc::clone(&dropped),
        },
        CaptureConsumer { consumer, dropped },
    )
}
