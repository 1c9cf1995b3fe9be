//! Splitting an audio stream into protocol frames.
//!
//! Every session sends exactly one FIRST frame and exactly one LAST frame,
//! with any number of CONTINUATION frames in between. The sequencer reads one
//! chunk ahead so that the final chunk of audio itself carries the LAST
//! marker; only when the whole stream fits in the FIRST frame is LAST sent
//! with an empty payload.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Position marker of a frame within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePosition {
    First,
    Continuation,
    Last,
}

impl FramePosition {
    /// Value of `data.status` on the wire.
    #[inline]
    pub fn status(&self) -> u8 {
        match self {
            Self::First => 0,
            Self::Continuation => 1,
            Self::Last => 2,
        }
    }
}

/// One chunk of audio tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub position: FramePosition,
    pub payload: Bytes,
}

/// Reads fixed-size frames from an audio source.
pub struct FrameSequencer<R> {
    reader: R,
    frame_size: usize,
    /// Position of the next frame; `None` once LAST has been produced.
    next_position: Option<FramePosition>,
    /// Chunk read ahead of the frame that is about to be emitted.
    pending: Option<Bytes>,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> FrameSequencer<R> {
    pub fn new(reader: R, frame_size: usize) -> Self {
        Self {
            reader,
            frame_size: frame_size.max(1),
            next_position: Some(FramePosition::First),
            pending: None,
            exhausted: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next_position.is_none()
    }

    /// Produce the next frame, or `None` after LAST.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<AudioFrame>> {
        let Some(position) = self.next_position else {
            return Ok(None);
        };

        let current = match self.pending.take() {
            Some(chunk) => chunk,
            None => self.read_chunk().await?,
        };

        let frame = match position {
            FramePosition::First => {
                let next = self.read_chunk().await?;
                // Stream already exhausted: go straight to LAST.
                self.next_position = Some(if next.is_empty() {
                    FramePosition::Last
                } else {
                    FramePosition::Continuation
                });
                self.pending = Some(next);
                AudioFrame {
                    position: FramePosition::First,
                    payload: current,
                }
            }
            FramePosition::Continuation => {
                let next = self.read_chunk().await?;
                if next.is_empty() {
                    self.next_position = None;
                    AudioFrame {
                        position: FramePosition::Last,
                        payload: current,
                    }
                } else {
                    self.pending = Some(next);
                    AudioFrame {
                        position: FramePosition::Continuation,
                        payload: current,
                    }
                }
            }
            FramePosition::Last => {
                self.next_position = None;
                AudioFrame {
                    position: FramePosition::Last,
                    payload: current,
                }
            }
        };

        Ok(Some(frame))
    }

    /// Read up to `frame_size` bytes, retrying short reads until the frame is
    /// full or the source reaches end of stream.
    async fn read_chunk(&mut self) -> std::io::Result<Bytes> {
        if self.exhausted {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::zeroed(self.frame_size);
        let mut filled = 0;
        while filled < self.frame_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }
}
