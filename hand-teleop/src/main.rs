use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use tracing::info;

use hand_mvg::{CalibrationStore, HandPoseEstimator};
use teleop_logger::LogTargets;
use hand_teleop::{
    controller::{run_control_loop, Controller, ControllerParams},
    detection::replay_detections,
    mailbox::detection_mailbox,
    parse_config_file,
    pseudo_cal::PseudoCalibrationData,
    JointCommandSink, JsonLinesSink, TeleopConfig, TracingSink,
};

/// Drive a robot arm from stereo hand landmark detections.
#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the control loop.
    Run {
        /// Configuration file in TOML format.
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Show the configuration, including defaults, in TOML format.
    ShowConfig {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Write a synthetic stereo calibration.
    PseudoCal {
        /// Output directory.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 1000.0)]
        focal_length: f64,
        #[arg(long, default_value_t = 320.0)]
        cx: f64,
        #[arg(long, default_value_t = 240.0)]
        cy: f64,
        /// Distance between the two camera centers.
        #[arg(long, default_value_t = 10.0)]
        baseline: f64,
    },
}

fn open_sink(cfg: &TeleopConfig) -> Result<Box<dyn JointCommandSink>> {
    Ok(match &cfg.control.joint_targets_output {
        None => Box::new(TracingSink::default()),
        Some(path) if path.as_os_str() == "-" => Box::new(JsonLinesSink::new(std::io::stdout())),
        Some(path) => {
            let f = std::fs::File::create(path)
                .with_context(|| format!("creating joint target output {}", path.display()))?;
            Box::new(JsonLinesSink::new(std::io::BufWriter::new(f)))
        }
    })
}

async fn run(config: PathBuf) -> Result<()> {
    let cfg = parse_config_file(&config)
        .with_context(|| format!("While parsing configuration file {}", config.display()))?;
    let _guard = teleop_logger::install(&LogTargets::with_file(cfg.control.log_file.as_ref()))?;
    tracing::debug!("{:?}", cfg);

    let store = CalibrationStore::<f64>::load_dir(&cfg.calibration.dir, &cfg.calibration.file_names())
        .with_context(|| {
            format!(
                "loading calibration from {}",
                cfg.calibration.dir.display()
            )
        })?;
    let solver = cfg.arm.ik_solver()?;

    let (pub0, mailbox0) = detection_mailbox();
    let (pub1, mailbox1) = detection_mailbox();
    let replay_period = cfg.replay_period();
    let producers = vec![
        tokio::spawn(replay_detections(
            cfg.cameras.camera_0_detections.clone(),
            pub0,
            replay_period,
        )),
        tokio::spawn(replay_detections(
            cfg.cameras.camera_1_detections.clone(),
            pub1,
            replay_period,
        )),
    ];

    let controller = Controller::new(
        HandPoseEstimator::new(store),
        solver,
        ControllerParams::from_config(&cfg),
        mailbox0,
        mailbox1,
        open_sink(&cfg)?,
    );

    info!(
        "running at {} Hz in {:?} mode",
        cfg.control.tick_hz, cfg.arm.mode
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    run_control_loop(controller, cfg.tick_period(), producers, shutdown).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::ShowConfig { config } => {
            let cfg = parse_config_file(&config).with_context(|| {
                format!("While parsing configuration file {}", config.display())
            })?;
            println!("{}", cfg.to_toml_string()?);
            Ok(())
        }
        Command::PseudoCal {
            out_dir,
            focal_length,
            cx,
            cy,
            baseline,
        } => {
            let _guard = teleop_logger::install(&LogTargets::console())?;
            let pc = PseudoCalibrationData {
                focal_length,
                cx,
                cy,
                baseline,
            };
            let names = Default::default();
            pc.write_npy(&out_dir, &names)?;
            info!("wrote pseudo calibration to {}", out_dir.display());
            Ok(())
        }
    }
}
