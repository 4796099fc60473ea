//! Recorded detection streams.
//!
//! A detection file holds one JSON object per line, one line per frame:
//!
//! ```text
//! {"landmarks": [[0.51, 0.62], [0.49, 0.55], ...], "handedness": "Right"}
//! {"landmarks": null}
//! ```
//!
//! Landmark coordinates are normalized to the frame size.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

use hand_mvg::{HandDetection, Handedness};

use crate::{mailbox::DetectionPublisher, Result};

/// One line of a detection file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionRecord {
    pub landmarks: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handedness: Option<Handedness>,
}

impl DetectionRecord {
    /// `Ok(None)` for a frame without a hand.
    pub fn into_detection(self) -> Result<Option<HandDetection>> {
        match self.landmarks {
            None => Ok(None),
            Some(landmarks) => Ok(Some(HandDetection::from_normalized(
                landmarks,
                self.handedness,
            )?)),
        }
    }
}

impl From<&HandDetection> for DetectionRecord {
    fn from(det: &HandDetection) -> Self {
        Self {
            landmarks: Some(
                hand_mvg::HandLandmark::ALL
                    .iter()
                    .map(|lm| det.normalized(*lm))
                    .collect(),
            ),
            handedness: det.handedness(),
        }
    }
}

/// Parse one line. Malformed lines become "no detection" and are logged.
pub fn parse_detection_line(line: &str) -> Option<HandDetection> {
    let parsed = serde_json::from_str::<DetectionRecord>(line)
        .map_err(crate::Error::from)
        .and_then(DetectionRecord::into_detection);
    match parsed {
        Ok(det) => det,
        Err(e) => {
            warn!("ignoring malformed detection record: {e}");
            None
        }
    }
}

/// Publish the records of a detection file, one every `frame_period`.
///
/// Returns the number of records published. Empty lines are skipped.
pub async fn replay_detections<P: AsRef<Path>>(
    path: P,
    publisher: DetectionPublisher,
    frame_period: Duration,
) -> Result<usize> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut interval = tokio::time::interval(frame_period);
    let mut count = 0;
    info!("replaying detections from \"{}\"", path.display());
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        interval.tick().await;
        publisher.publish(parse_detection_line(&line));
        count += 1;
    }
    debug!("{count} detections replayed from \"{}\"", path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hand_mvg::NUM_HAND_LANDMARKS;

    #[test]
    fn test_parse_records() {
        assert!(parse_detection_line(r#"{"landmarks": null}"#).is_none());

        let rec = DetectionRecord {
            landmarks: Some(vec![[0.25, 0.75]; NUM_HAND_LANDMARKS]),
            handedness: Some(Handedness::Left),
        };
        let line = serde_json::to_string(&rec).unwrap();
        let det = parse_detection_line(&line).unwrap();
        assert_eq!(det.handedness(), Some(Handedness::Left));
        assert_eq!(DetectionRecord::from(&det), rec);
    }

    #[test_log::test]
    fn test_malformed_records_are_no_detection() {
        assert!(parse_detection_line("not json").is_none());
        assert!(parse_detection_line(r#"{"landmarks": [[0.1, 0.2]]}"#).is_none());
        assert!(parse_detection_line(r#"{"landmarks": null, "score": 1}"#).is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_replay_publishes_last_record() -> eyre::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("cam.jsonl");
        let rec = DetectionRecord {
            landmarks: Some(vec![[0.5, 0.5]; NUM_HAND_LANDMARKS]),
            handedness: None,
        };
        let contents = format!(
            "{}\n\n{{\"landmarks\": null}}\n{}\n",
            serde_json::to_string(&rec)?,
            serde_json::to_string(&rec)?
        );
        std::fs::write(&path, contents)?;

        let (publisher, mut mailbox) = crate::mailbox::detection_mailbox();
        let n = replay_detections(&path, publisher, Duration::from_millis(1)).await?;
        assert_eq!(n, 3);
        let read = mailbox.poll();
        assert!(read.updated);
        assert!(read.detection.is_some());
        Ok(())
    }
}
