use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Receives joint angle commands. Calls are fire-and-forget.
pub trait JointCommandSink {
    /// Called before the joint targets of tick `tick` are set.
    fn begin_tick(&mut self, _tick: u64) {}
    fn set_joint_target(&mut self, joint_id: usize, angle_radians: f64);
    /// Called after the last joint target of a tick.
    fn end_tick(&mut self) {}
}

impl<S: JointCommandSink + ?Sized> JointCommandSink for Box<S> {
    fn begin_tick(&mut self, tick: u64) {
        (**self).begin_tick(tick)
    }
    fn set_joint_target(&mut self, joint_id: usize, angle_radians: f64) {
        (**self).set_joint_target(joint_id, angle_radians)
    }
    fn end_tick(&mut self) {
        (**self).end_tick()
    }
}

/// Logs every joint target.
#[derive(Debug, Default)]
pub struct TracingSink {
    tick: u64,
}

impl JointCommandSink for TracingSink {
    fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
    }
    fn set_joint_target(&mut self, joint_id: usize, angle_radians: f64) {
        info!(
            "tick {}: joint {joint_id} -> {:.1}°",
            self.tick,
            angle_radians.to_degrees()
        );
    }
}

/// One line written by [JsonLinesSink].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointTargetRecord {
    pub tick: u64,
    pub joint: usize,
    /// Radians.
    pub angle: f64,
}

/// Writes each joint target as a JSON line. Write errors are logged and
/// otherwise ignored.
pub struct JsonLinesSink<W: Write> {
    wtr: W,
    tick: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(wtr: W) -> Self {
        Self { wtr, tick: 0 }
    }

    pub fn into_inner(self) -> W {
        self.wtr
    }

    fn write_record(&mut self, record: &JointTargetRecord) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.wtr, record)?;
        self.wtr.write_all(b"\n")
    }
}

impl<W: Write> JointCommandSink for JsonLinesSink<W> {
    fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
    }
    fn set_joint_target(&mut self, joint_id: usize, angle_radians: f64) {
        let record = JointTargetRecord {
            tick: self.tick,
            joint: joint_id,
            angle: angle_radians,
        };
        if let Err(e) = self.write_record(&record) {
            warn!("could not write joint target: {e}");
        }
    }
    fn end_tick(&mut self) {
        if let Err(e) = self.wtr.flush() {
            warn!("could not flush joint targets: {e}");
        }
    }
}
