//! Read-time event filters.

/// Decides whether a message read from a source reaches the sink.
pub trait EventFilter: Send + Sync {
    fn accept(&self, bytes: &[u8]) -> bool;
}

/// Bit per MIDI channel; messages without a channel always pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u16);

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask(0xFFFF);
    pub const NONE: ChannelMask = ChannelMask(0);

    #[inline]
    pub fn only(channel: u8) -> Self {
        Self(1 << (channel & 0x0F))
    }

    #[inline]
    pub fn with(self, channel: u8) -> Self {
        Self(self.0 | 1 << (channel & 0x0F))
    }

    #[inline]
    pub fn without(self, channel: u8) -> Self {
        Self(self.0 & !(1 << (channel & 0x0F)))
    }

    #[inline]
    pub fn contains(&self, channel: u8) -> bool {
        self.0 & (1 << (channel & 0x0F)) != 0
    }

    #[inline]
    pub fn bits(&self) -> u16 {
        self.0
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl EventFilter for ChannelMask {
    fn accept(&self, bytes: &[u8]) -> bool {
        match bytes.first() {
            Some(&status) if (0x80..0xF0).contains(&status) => self.contains(status & 0x0F),
            _ => true,
        }
    }
}

impl<F: Fn(&[u8]) -> bool + Send + Sync> EventFilter for F {
    fn accept(&self, bytes: &[u8]) -> bool {
        self(bytes)
    }
}
