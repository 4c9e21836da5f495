//! Observer interfaces for codec output.
//!
//! Every codec front-end holds at most one listener. Callbacks arrive on the
//! instance's worker thread, in submission order. Payloads are borrowed for
//! the duration of the call; a listener clones what it wants to keep
//! (`Bytes` and image planes are reference counted, so this is cheap).
//!
//! Once `set_listener` or `clear_listener` returns, the previous listener
//! receives no further calls: delivery holds the slot's lock, so
//! replacement waits for an in-flight callback to finish. A listener may
//! replace or clear itself from inside a callback.

use std::cell::RefCell;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::ReentrantMutex;
use tokio::sync::mpsc;

use crate::av::{ImageBuffer, Packet};
use crate::error::AvError;

/// Receives [`VideoEncoder`](crate::codec::VideoEncoder) output.
pub trait VideoEncoderListener: Send + Sync {
    /// SPS and PPS NAL units (no start codes), sent before the first frame
    /// that depends on them.
    fn on_parameter_sets(&self, sps: &[u8], pps: &[u8]);

    /// One access unit in Annex-B form.
    fn on_encoded_frame(&self, packet: &Packet);

    /// A per-frame or fatal error. Logs by default.
    fn on_error(&self, error: AvError) {
        log::error!("video encoder: {}", error);
    }
}

/// Receives [`VideoDecoder`](crate::codec::VideoDecoder) output.
pub trait VideoDecoderListener: Send + Sync {
    /// One decoded picture, in presentation order.
    fn on_decoded_image(&self, image: &ImageBuffer);

    /// A per-picture or fatal error. Logs by default.
    fn on_error(&self, error: AvError) {
        log::error!("video decoder: {}", error);
    }
}

/// Receives [`AudioEncoder`](crate::codec::AudioEncoder) output.
pub trait AudioEncoderListener: Send + Sync {
    /// One access unit, raw or ADTS framed.
    fn on_encoded_packet(&self, packet: &Packet);

    /// A per-buffer or fatal error. Logs by default.
    fn on_error(&self, error: AvError) {
        log::error!("audio encoder: {}", error);
    }
}

/// Receives [`AudioDecoder`](crate::codec::AudioDecoder) output.
pub trait AudioDecoderListener: Send + Sync {
    /// Interleaved little-endian PCM decoded from one input buffer.
    fn on_decoded_pcm(&self, pcm: &[u8]);

    /// A per-buffer error. Logs by default.
    fn on_error(&self, error: AvError) {
        log::error!("audio decoder: {}", error);
    }
}

/// Single-listener registration slot.
pub(crate) struct ListenerSlot<L: ?Sized> {
    inner: ReentrantMutex<RefCell<Option<Arc<L>>>>,
}

impl<L: ?Sized> ListenerSlot<L> {
    pub(crate) fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(None)),
        }
    }

    pub(crate) fn set(&self, listener: Arc<L>) {
        let guard = self.inner.lock();
        guard.replace(Some(listener));
    }

    pub(crate) fn clear(&self) {
        let guard = self.inner.lock();
        guard.replace(None);
    }

    pub(crate) fn is_set(&self) -> bool {
        self.inner.lock().borrow().is_some()
    }

    /// Runs `f` against the registered listener. Returns false when none is set.
    pub(crate) fn with<F>(&self, f: F) -> bool
    where
        F: FnOnce(&L),
    {
        let guard = self.inner.lock();
        let listener = guard.borrow().clone();
        match listener {
            Some(listener) => {
                f(&listener);
                true
            }
            None => false,
        }
    }

    /// Hands `error` to the listener, or logs it when nobody is listening.
    pub(crate) fn report<F>(&self, role: &str, error: AvError, deliver: F)
    where
        F: FnOnce(&L, AvError),
    {
        let guard = self.inner.lock();
        let listener = guard.borrow().clone();
        match listener {
            Some(listener) => deliver(&listener, error),
            None => log::error!("{} (no listener): {}", role, error),
        }
    }
}

/// Owned form of the [`VideoEncoderListener`] callbacks.
#[derive(Debug)]
pub enum VideoEncoderEvent {
    /// See [`VideoEncoderListener::on_parameter_sets`]
    ParameterSets {
        /// SPS NAL unit
        sps: Bytes,
        /// PPS NAL unit
        pps: Bytes,
    },
    /// See [`VideoEncoderListener::on_encoded_frame`]
    EncodedFrame(Packet),
    /// See [`VideoEncoderListener::on_error`]
    Error(AvError),
}

/// Owned form of the [`VideoDecoderListener`] callbacks.
#[derive(Debug)]
pub enum VideoDecoderEvent {
    /// See [`VideoDecoderListener::on_decoded_image`]
    DecodedImage(ImageBuffer),
    /// See [`VideoDecoderListener::on_error`]
    Error(AvError),
}

/// Owned form of the [`AudioEncoderListener`] callbacks.
#[derive(Debug)]
pub enum AudioEncoderEvent {
    /// See [`AudioEncoderListener::on_encoded_packet`]
    EncodedPacket(Packet),
    /// See [`AudioEncoderListener::on_error`]
    Error(AvError),
}

/// Owned form of the [`AudioDecoderListener`] callbacks.
#[derive(Debug)]
pub enum AudioDecoderEvent {
    /// See [`AudioDecoderListener::on_decoded_pcm`]
    DecodedPcm(Bytes),
    /// See [`AudioDecoderListener::on_error`]
    Error(AvError),
}

/// Listener that forwards every callback as an owned event into a channel.
pub struct ChannelListener<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> ChannelListener<E> {
    fn forward(&self, event: E) {
        if self.tx.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }
}

fn channel<E>() -> (Arc<ChannelListener<E>>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener { tx }), rx)
}

/// A video encoder listener and the receiver its events arrive on.
pub fn video_encoder_channel() -> (
    Arc<ChannelListener<VideoEncoderEvent>>,
    mpsc::UnboundedReceiver<VideoEncoderEvent>,
) {
    channel()
}

/// A video decoder listener and the receiver its events arrive on.
pub fn video_decoder_channel() -> (
    Arc<ChannelListener<VideoDecoderEvent>>,
    mpsc::UnboundedReceiver<VideoDecoderEvent>,
) {
    channel()
}

/// An audio encoder listener and the receiver its events arrive on.
pub fn audio_encoder_channel() -> (
    Arc<ChannelListener<AudioEncoderEvent>>,
    mpsc::UnboundedReceiver<AudioEncoderEvent>,
) {
    channel()
}

/// An audio decoder listener and the receiver its events arrive on.
pub fn audio_decoder_channel() -> (
    Arc<ChannelListener<AudioDecoderEvent>>,
    mpsc::UnboundedReceiver<AudioDecoderEvent>,
) {
    channel()
}

impl VideoEncoderListener for ChannelListener<VideoEncoderEvent> {
    fn on_parameter_sets(&self, sps: &[u8], pps: &[u8]) {
        self.forward(VideoEncoderEvent::ParameterSets {
            sps: Bytes::copy_from_slice(sps),
            pps: Bytes::copy_from_slice(pps),
        });
    }

    fn on_encoded_frame(&self, packet: &Packet) {
        self.forward(VideoEncoderEvent::EncodedFrame(packet.clone()));
    }

    fn on_error(&self, error: AvError) {
        self.forward(VideoEncoderEvent::Error(error));
    }
}

impl VideoDecoderListener for ChannelListener<VideoDecoderEvent> {
    fn on_decoded_image(&self, image: &ImageBuffer) {
        self.forward(VideoDecoderEvent::DecodedImage(image.clone()));
    }

    fn on_error(&self, error: AvError) {
        self.forward(VideoDecoderEvent::Error(error));
    }
}

impl AudioEncoderListener for ChannelListener<AudioEncoderEvent> {
    fn on_encoded_packet(&self, packet: &Packet) {
        self.forward(AudioEncoderEvent::EncodedPacket(packet.clone()));
    }

    fn on_error(&self, error: AvError) {
        self.forward(AudioEncoderEvent::Error(error));
    }
}

impl AudioDecoderListener for ChannelListener<AudioDecoderEvent> {
    fn on_decoded_pcm(&self, pcm: &[u8]) {
        self.forward(AudioDecoderEvent::DecodedPcm(Bytes::copy_from_slice(pcm)));
    }

    fn on_error(&self, error: AvError) {
        self.forward(AudioDecoderEvent::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::MediaType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Counter {
        packets: Mutex<usize>,
    }

    impl AudioEncoderListener for Counter {
        fn on_encoded_packet(&self, _packet: &Packet) {
            *self.packets.lock() += 1;
        }
    }

    #[test]
    fn test_slot_replaces_and_clears() {
        let slot: ListenerSlot<dyn AudioEncoderListener> = ListenerSlot::new();
        let packet = Packet::new(MediaType::Audio, vec![1u8]);
        assert!(!slot.with(|l| l.on_encoded_packet(&packet)));

        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        slot.set(first.clone());
        slot.with(|l| l.on_encoded_packet(&packet));
        slot.set(second.clone());
        slot.with(|l| l.on_encoded_packet(&packet));
        slot.clear();
        assert!(!slot.is_set());
        slot.with(|l| l.on_encoded_packet(&packet));

        assert_eq!(*first.packets.lock(), 1);
        assert_eq!(*second.packets.lock(), 1);
    }

    #[test]
    fn test_listener_can_clear_itself() {
        struct SelfClearing {
            slot: Arc<ListenerSlot<dyn AudioDecoderListener>>,
        }
        impl AudioDecoderListener for SelfClearing {
            fn on_decoded_pcm(&self, _pcm: &[u8]) {
                self.slot.clear();
            }
        }

        let slot: Arc<ListenerSlot<dyn AudioDecoderListener>> = Arc::new(ListenerSlot::new());
        slot.set(Arc::new(SelfClearing { slot: slot.clone() }));
        assert!(slot.with(|l| l.on_decoded_pcm(&[0, 0])));
        assert!(!slot.is_set());
    }

    #[test]
    fn test_channel_adapter_forwards_events() {
        let (listener, mut rx) = video_encoder_channel();
        listener.on_parameter_sets(&[0x67], &[0x68]);
        listener.on_error(AvError::Submission("late".into()));

        match rx.try_recv().unwrap() {
            VideoEncoderEvent::ParameterSets { sps, pps } => {
                assert_eq!(&sps[..], &[0x67]);
                assert_eq!(&pps[..], &[0x68]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), VideoEncoderEvent::Error(_)));
    }
}
