use crate::models::audio_models::{AudioSource, NativeFormat};
use crate::models::error::CaptureError;

/// One packet of native audio lent out by a [`PacketStream`].
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// Interleaved native samples, `frames * format.block_align()` bytes.
    pub data: &'a [u8],
    pub frames: usize,
    /// The OS marked this packet as silence; `data` must be ignored.
    pub silent: bool,
}

/// Something that can open a loopback stream.
///
/// Implemented by:
/// - `WasapiLoopbackSource` (Windows)
/// - [`SyntheticSource`](crate::capture::synthetic::SyntheticSource) (tests, demos)
pub trait FrameSource: Send + Sync + 'static {
    /// Open and start a stream on the calling thread.
    ///
    /// The engine calls this on its capture thread, so any per-thread
    /// platform initialization belongs here and is undone when the returned
    /// stream is dropped.
    fn open(&self) -> Result<Box<dyn PacketStream>, CaptureError>;

    /// Information about the device backing this source.
    fn device_info(&self) -> AudioSource;
}

/// An open, started stream. Dropping it stops the stream and releases every
/// handle it holds.
pub trait PacketStream {
    /// The format negotiated when the stream was opened.
    fn format(&self) -> NativeFormat;

    /// Frames in the next packet, or 0 if none is ready yet.
    fn next_packet_size(&mut self) -> Result<u32, CaptureError>;

    /// Lend the next packet to `consume`, then release it back to the OS.
    fn read_packet(&mut self, consume: &mut dyn FnMut(Packet<'_>)) -> Result<(), CaptureError>;
}
