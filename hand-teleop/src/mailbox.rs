//! Single-slot mailboxes holding the latest detection of one camera.
//!
//! Publishing overwrites the slot; nothing is queued. The controller reads a
//! snapshot of the slot once per tick without waiting.
use std::sync::Arc;

use tokio::sync::watch;

use hand_mvg::HandDetection;

#[derive(Debug, Default)]
struct Slot {
    /// Number of publishes so far.
    seq: u64,
    detection: Option<Arc<HandDetection>>,
}

/// Create a connected publisher and mailbox. The slot starts empty.
pub fn detection_mailbox() -> (DetectionPublisher, DetectionMailbox) {
    let (tx, rx) = watch::channel(Slot::default());
    (DetectionPublisher { tx }, DetectionMailbox { rx, seen_seq: 0 })
}

/// Writing half, owned by a detection producer.
#[derive(Debug)]
pub struct DetectionPublisher {
    tx: watch::Sender<Slot>,
}

impl DetectionPublisher {
    /// Replace the slot contents. `None` means the camera saw no hand.
    pub fn publish(&self, detection: Option<HandDetection>) {
        self.tx.send_modify(|slot| {
            slot.seq += 1;
            slot.detection = detection.map(Arc::new);
        });
    }
}

/// One read of a mailbox.
#[derive(Debug, Clone)]
pub struct MailboxRead {
    pub detection: Option<Arc<HandDetection>>,
    /// Something was published since the previous read.
    pub updated: bool,
}

/// Reading half, owned by the controller.
#[derive(Debug)]
pub struct DetectionMailbox {
    rx: watch::Receiver<Slot>,
    seen_seq: u64,
}

impl DetectionMailbox {
    /// Return the latest detection without blocking.
    ///
    /// The slot is not cleared: the same detection is returned again until a
    /// new one is published, also after the publisher has gone away.
    pub fn poll(&mut self) -> MailboxRead {
        let slot = self.rx.borrow_and_update();
        let updated = slot.seq != self.seen_seq;
        self.seen_seq = slot.seq;
        MailboxRead {
            detection: slot.detection.clone(),
            updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hand_mvg::NUM_HAND_LANDMARKS;

    fn detection(x: f64) -> HandDetection {
        HandDetection::from_normalized(vec![[x, 0.5]; NUM_HAND_LANDMARKS], None).unwrap()
    }

    #[test]
    fn test_latest_value_wins() {
        let (publisher, mut mailbox) = detection_mailbox();
        let first = mailbox.poll();
        assert!(first.detection.is_none());
        assert!(!first.updated);

        publisher.publish(Some(detection(0.1)));
        publisher.publish(Some(detection(0.2)));
        publisher.publish(Some(detection(0.3)));
        let read = mailbox.poll();
        assert!(read.updated);
        assert_eq!(read.detection.as_deref(), Some(&detection(0.3)));

        let again = mailbox.poll();
        assert!(!again.updated);
        assert_eq!(again.detection.as_deref(), Some(&detection(0.3)));
    }

    #[test]
    fn test_no_detection_marker_overwrites() {
        let (publisher, mut mailbox) = detection_mailbox();
        publisher.publish(Some(detection(0.4)));
        publisher.publish(None);
        let read = mailbox.poll();
        assert!(read.updated);
        assert!(read.detection.is_none());
    }

    #[test]
    fn test_value_kept_after_publisher_dropped() {
        let (publisher, mut mailbox) = detection_mailbox();
        publisher.publish(Some(detection(0.7)));
        drop(publisher);
        let read = mailbox.poll();
        assert!(read.updated);
        assert_eq!(read.detection.as_deref(), Some(&detection(0.7)));
        assert!(!mailbox.poll().updated);
    }
}
