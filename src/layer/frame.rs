//! gRPC length-prefixed message framing.
//!
//! Each message on the wire is a 1-byte compressed flag, a 4-byte
//! big-endian length and the payload. Frames may be split across body
//! chunks at any byte.

pub(crate) const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum FrameError {
    #[error("invalid compressed flag {0:#04x}")]
    InvalidFlag(u8),

    #[error("body ended inside a frame ({missing} bytes missing)")]
    Truncated { missing: usize },
}

#[derive(Debug)]
enum State {
    Header { buf: [u8; HEADER_LEN], filled: usize },
    Payload { length: usize, remaining: usize },
    Failed,
}

impl State {
    fn header() -> Self {
        State::Header {
            buf: [0; HEADER_LEN],
            filled: 0,
        }
    }
}

/// Incremental frame decoder that only tracks message boundaries.
#[derive(Debug)]
pub(crate) struct FrameDecoder {
    state: State,
}

impl FrameDecoder {
    pub(crate) fn new() -> Self {
        Self {
            state: State::header(),
        }
    }

    /// Feed a chunk, calling `on_message` with the payload length of every
    /// message completed by it.
    ///
    /// After an error the decoder ignores all further input.
    pub(crate) fn decode(
        &mut self,
        mut data: &[u8],
        mut on_message: impl FnMut(usize),
    ) -> Result<(), FrameError> {
        while !data.is_empty() {
            match &mut self.state {
                State::Failed => return Ok(()),
                State::Header { buf, filled } => {
                    let take = (HEADER_LEN - *filled).min(data.len());
                    buf[*filled..*filled + take].copy_from_slice(&data[..take]);
                    *filled += take;
                    data = &data[take..];

                    if *filled == HEADER_LEN {
                        let flag = buf[0];
                        let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
                        if flag > 1 {
                            self.state = State::Failed;
                            return Err(FrameError::InvalidFlag(flag));
                        }
                        if length == 0 {
                            on_message(0);
                            self.state = State::header();
                        } else {
                            self.state = State::Payload {
                                length,
                                remaining: length,
                            };
                        }
                    }
                }
                State::Payload { length, remaining } => {
                    let take = (*remaining).min(data.len());
                    *remaining -= take;
                    data = &data[take..];

                    if *remaining == 0 {
                        let length = *length;
                        on_message(length);
                        self.state = State::header();
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that the body did not end mid-frame.
    pub(crate) fn finish(&self) -> Result<(), FrameError> {
        match &self.state {
            State::Header { filled: 0, .. } | State::Failed => Ok(()),
            State::Header { filled, .. } => Err(FrameError::Truncated {
                missing: HEADER_LEN - filled,
            }),
            State::Payload { remaining, .. } => Err(FrameError::Truncated {
                missing: *remaining,
            }),
        }
    }
}

/// Encode one uncompressed message.
#[cfg(test)]
pub(crate) fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(0);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
