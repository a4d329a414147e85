//! Display sinks receive owned RGB copies of previewed frames

use flume::{Receiver, Sender, TrySendError};
use image::RgbImage;
use tracing::trace;

/// Receiver of preview images.
///
/// `deliver` is called from the capture thread and must not block on
/// rendering; the sink owns the image from then on.
pub trait DisplaySink: Send + Sync {
    fn deliver(&self, image: RgbImage);
}

/// Sink that hands images to a renderer over a bounded flume channel.
///
/// Images are dropped when the renderer falls behind or has gone away.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<RgbImage>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self { tx }
    }

    /// A sink paired with the receiving end of a channel of `depth` images
    pub fn bounded(depth: usize) -> (Self, Receiver<RgbImage>) {
        let (tx, rx) = flume::bounded(depth.max(1));
        (Self::new(tx), rx)
    }
}

impl DisplaySink for ChannelSink {
    fn deliver(&self, image: RgbImage) {
        match self.tx.try_send(image) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!("Display behind, preview frame dropped");
                metrics::counter!("frames_dropped_display").increment(1);
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Display gone, preview frame dropped");
                metrics::counter!("frames_dropped_display").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sink, rx) = ChannelSink::bounded(1);
        sink.deliver(RgbImage::new(1, 1));
        sink.deliver(RgbImage::new(2, 2));

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap().dimensions(), (1, 1));
    }

    #[test]
    fn test_disconnected_receiver_is_ignored() {
        let (sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        sink.deliver(RgbImage::new(1, 1));
    }
}
