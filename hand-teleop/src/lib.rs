//! Teleoperation of a six joint arm from two cameras watching a hand.
//!
//! Each camera's landmark detections arrive in a single-slot
//! [mailbox](crate::mailbox). Once per tick the [`Controller`] reads both
//! mailboxes, triangulates the hand with [`hand_mvg`], solves the arm with
//! [`arm_ik`] and sends the joint angles to a [`JointCommandSink`].
#![deny(rust_2018_idioms)]

pub mod config;
pub mod controller;
pub mod detection;
pub mod mailbox;
pub mod pseudo_cal;
pub mod sink;

pub use crate::config::{parse_config_file, TeleopConfig};
pub use crate::controller::{run_control_loop, Controller, ControllerParams, TickError, TickOutcome};
pub use crate::mailbox::{detection_mailbox, DetectionMailbox, DetectionPublisher, MailboxRead};
pub use crate::sink::{JointCommandSink, JsonLinesSink, TracingSink};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Mvg {
        #[from]
        source: hand_mvg::MvgError,
    },
    #[error("{source}")]
    Ik {
        #[from]
        source: arm_ik::IkError,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("lookup error on variable: {source}")]
    ShellExpandLookupVarError {
        #[from]
        source: shellexpand::LookupError<std::env::VarError>,
    },
    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("TOML serialization error: {source}")]
    TomlSerError {
        #[from]
        source: toml::ser::Error,
    },
    #[error("JSON error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
