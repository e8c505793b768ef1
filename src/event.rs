//! # Event Records
//!
//! Lifecycle events flow from the decoder worker and the render callback
//! into the event ring buffer as tagged records with a fixed layout per
//! tag (never as a type-erased trait object — the render callback must be
//! able to encode one without allocating).

/// Largest encoded record size across all tags; callers stack-allocate a
/// buffer of this size rather than pushing to a `Vec`.
pub const MAX_ENCODED_LEN: usize = 20;

/// Minimum number of bytes needed to read a record's tag.
pub const TAG_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Tag {
    DecodingStarted = 0,
    DecodingComplete = 1,
    DecodingCanceled = 2,
    RenderingStarted = 3,
    RenderingComplete = 4,
    EndOfAudio = 5,
    Error = 6,
}

impl Tag {
    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Tag::DecodingStarted,
            1 => Tag::DecodingComplete,
            2 => Tag::DecodingCanceled,
            3 => Tag::RenderingStarted,
            4 => Tag::RenderingComplete,
            5 => Tag::EndOfAudio,
            6 => Tag::Error,
            _ => return None,
        })
    }
}

/// A lifecycle event posted to the event ring.
///
/// `seq` values correlate to [`crate::decoder_state::DecoderState::sequence_number`];
/// `host_time_ticks` values are monotonic host-clock ticks suitable for
/// scheduling against the same clock the render callback's
/// [`crate::event::HostTimestamp`] uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    DecodingStarted { seq: u64 },
    DecodingComplete { seq: u64 },
    DecodingCanceled { seq: u64, partially_rendered: bool },
    RenderingStarted { seq: u64, host_time_ticks: u64 },
    RenderingComplete { seq: u64, host_time_ticks: u64 },
    EndOfAudio { host_time_ticks: u64 },
    /// References an entry in the error side table
    /// ([`crate::error_table::ErrorTable`]) rather than carrying the
    /// error payload inline, since `EngineError` is not `Copy` and the
    /// event ring must stay allocation-free.
    Error { handle: u64 },
}

impl Event {
    /// Encodes this event into `out`, returning the number of bytes
    /// written. Never allocates.
    pub fn encode(&self, out: &mut [u8; MAX_ENCODED_LEN]) -> usize {
        match *self {
            Event::DecodingStarted { seq } => {
                write_tag(out, Tag::DecodingStarted);
                write_u64(out, 4, seq);
                12
            }
            Event::DecodingComplete { seq } => {
                write_tag(out, Tag::DecodingComplete);
                write_u64(out, 4, seq);
                12
            }
            Event::DecodingCanceled {
                seq,
                partially_rendered,
            } => {
                write_tag(out, Tag::DecodingCanceled);
                write_u64(out, 4, seq);
                out[12] = partially_rendered as u8;
                13
            }
            Event::RenderingStarted {
                seq,
                host_time_ticks,
            } => {
                write_tag(out, Tag::RenderingStarted);
                write_u64(out, 4, seq);
                write_u64(out, 12, host_time_ticks);
                20
            }
            Event::RenderingComplete {
                seq,
                host_time_ticks,
            } => {
                write_tag(out, Tag::RenderingComplete);
                write_u64(out, 4, seq);
                write_u64(out, 12, host_time_ticks);
                20
            }
            Event::EndOfAudio { host_time_ticks } => {
                write_tag(out, Tag::EndOfAudio);
                write_u64(out, 4, host_time_ticks);
                12
            }
            Event::Error { handle } => {
                write_tag(out, Tag::Error);
                write_u64(out, 4, handle);
                12
            }
        }
    }

    /// Decodes one record from the front of `bytes`, returning the event
    /// and the number of bytes consumed. Returns `None` if `bytes` does
    /// not yet contain a complete record (the caller should wait for more
    /// data; this only happens transiently while draining a wrapped
    /// record, never because a record was written partially).
    pub fn decode(bytes: &[u8]) -> Option<(Event, usize)> {
        if bytes.len() < TAG_LEN {
            return None;
        }
        let tag = Tag::from_u32(read_u32(bytes, 0))?;
        Some(match tag {
            Tag::DecodingStarted => {
                if bytes.len() < 12 {
                    return None;
                }
                (
                    Event::DecodingStarted {
                        seq: read_u64(bytes, 4),
                    },
                    12,
                )
            }
            Tag::DecodingComplete => {
                if bytes.len() < 12 {
                    return None;
                }
                (
                    Event::DecodingComplete {
                        seq: read_u64(bytes, 4),
                    },
                    12,
                )
            }
            Tag::DecodingCanceled => {
                if bytes.len() < 13 {
                    return None;
                }
                (
                    Event::DecodingCanceled {
                        seq: read_u64(bytes, 4),
                        partially_rendered: bytes[12] != 0,
                    },
                    13,
                )
            }
            Tag::RenderingStarted => {
                if bytes.len() < 20 {
                    return None;
                }
                (
                    Event::RenderingStarted {
                        seq: read_u64(bytes, 4),
                        host_time_ticks: read_u64(bytes, 12),
                    },
                    20,
                )
            }
            Tag::RenderingComplete => {
                if bytes.len() < 20 {
                    return None;
                }
                (
                    Event::RenderingComplete {
                        seq: read_u64(bytes, 4),
                        host_time_ticks: read_u64(bytes, 12),
                    },
                    20,
                )
            }
            Tag::EndOfAudio => {
                if bytes.len() < 12 {
                    return None;
                }
                (
                    Event::EndOfAudio {
                        host_time_ticks: read_u64(bytes, 4),
                    },
                    12,
                )
            }
            Tag::Error => {
                if bytes.len() < 12 {
                    return None;
                }
                (
                    Event::Error {
                        handle: read_u64(bytes, 4),
                    },
                    12,
                )
            }
        })
    }
}

fn write_tag(out: &mut [u8; MAX_ENCODED_LEN], tag: Tag) {
    out[0..4].copy_from_slice(&(tag as u32).to_le_bytes());
}

fn write_u64(out: &mut [u8; MAX_ENCODED_LEN], offset: usize, value: u64) {
    out[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Monotonic host-clock timestamp supplied to the render callback, on the
/// same clock as every event's `host_time_ticks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTimestamp {
    /// Monotonic host-clock ticks.
    pub host_time_ticks: u64,
    /// Sample time corresponding to this callback invocation, on the
    /// rendering format's timeline.
    pub sample_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(event: Event) {
        let mut buf = [0u8; MAX_ENCODED_LEN];
        let written = event.encode(&mut buf);
        let (decoded, consumed) = Event::decode(&buf[..written]).expect("decodes");
        assert_eq!(consumed, written);
        assert_eq!(decoded, event);
    }

    #[test]
    fn every_variant_round_trips() {
        round_trip(Event::DecodingStarted { seq: 7 });
        round_trip(Event::DecodingComplete { seq: 7 });
        round_trip(Event::DecodingCanceled {
            seq: 7,
            partially_rendered: true,
        });
        round_trip(Event::DecodingCanceled {
            seq: 7,
            partially_rendered: false,
        });
        round_trip(Event::RenderingStarted {
            seq: 1,
            host_time_ticks: 123456,
        });
        round_trip(Event::RenderingComplete {
            seq: 1,
            host_time_ticks: 999,
        });
        round_trip(Event::EndOfAudio {
            host_time_ticks: 42,
        });
        round_trip(Event::Error { handle: 3 });
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let event = Event::RenderingStarted {
            seq: 1,
            host_time_ticks: 2,
        };
        let mut buf = [0u8; MAX_ENCODED_LEN];
        let written = event.encode(&mut buf);
        assert!(Event::decode(&buf[..written - 1]).is_none());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let bytes = 0xFFFF_FFFFu32.to_le_bytes();
        assert!(Event::decode(&bytes).is_none());
    }
}
