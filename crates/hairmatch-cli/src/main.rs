use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hairmatch_core::catalog::{catalog, face_shape_info, recommend};
use hairmatch_core::{FaceShape, HaircutCatalogEntry, RandomClassifier, Recommendations};
use hairmatch_hw::{CaptureDevice, CaptureError, V4l2Camera};
use hairmatch_session::{
    Config, EntitlementStore, FileEntitlements, Notice, SessionController, SessionError,
    SessionState, UpgradeFlow,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Captures attempted before giving up on a camera that never delivers a frame.
const CAPTURE_ATTEMPTS: usize = 4;

type Controller = SessionController<V4l2Camera, RandomClassifier>;

#[derive(Parser)]
#[command(name = "hairmatch", about = "Face-shape analysis and haircut recommendations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a photo file
    Analyze {
        /// Image file (PNG, JPEG, ...)
        path: PathBuf,
    },
    /// Take a still with the webcam and analyze it
    Capture,
    /// Show entitlement and camera status
    Status,
    /// Open the premium checkout, or record a confirmed payment
    Upgrade {
        /// Payment went through; activate premium
        #[arg(long)]
        confirm: bool,
    },
    /// List haircuts, optionally only those suiting a face shape
    Catalog {
        /// oval, round, square, heart, oblong or diamond
        #[arg(short, long)]
        shape: Option<FaceShape>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    tracing::debug!(
        camera = %config.camera_device,
        entitlements = %config.entitlements_path.display(),
        "configuration loaded"
    );
    let store: Arc<dyn EntitlementStore> =
        Arc::new(FileEntitlements::open(config.entitlements_path.clone()));

    match cli.command {
        Commands::Analyze { path } => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
            let mut controller = new_controller(&config, store.clone());
            let progress = show_progress(&controller);
            let _interrupt = interrupt_on_ctrl_c(&controller);

            let outcome = controller.upload(bytes).await;
            progress.abort();
            finish(outcome, &controller, store.as_ref(), &config)
        }
        Commands::Capture => {
            let mut controller = new_controller(&config, store.clone());
            let progress = show_progress(&controller);
            let _interrupt = interrupt_on_ctrl_c(&controller);

            let outcome = capture(&mut controller, &config).await;
            progress.abort();
            finish(outcome, &controller, store.as_ref(), &config)
        }
        Commands::Status => {
            let camera = V4l2Camera::new(config.camera_device.clone());
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "entitlements": {
                    "path": config.entitlements_path.display().to_string(),
                    "usedFreeTrial": store.has_used_free_trial(),
                    "isPremium": store.is_premium(),
                    "canStartAnalysis": store.can_start_analysis(),
                },
                "camera": {
                    "device": camera.device_path(),
                    "permission": camera.query_permission(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Upgrade { confirm } => {
            if store.is_premium() {
                println!("Premium is already active.");
                return Ok(());
            }
            let flow = UpgradeFlow::new(config.checkout_url.clone(), store.clone());
            println!("Complete checkout at:\n  {}", flow.begin());
            if confirm {
                flow.confirm(true);
                println!("Premium activated. Unlimited analyses and all haircuts unlocked.");
            } else {
                println!("Run `hairmatch upgrade --confirm` once the payment is confirmed.");
            }
            Ok(())
        }
        Commands::Catalog { shape, json } => {
            let entries: Vec<&HaircutCatalogEntry> = match shape {
                Some(shape) => recommend(shape),
                None => catalog().iter().collect(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    print_entry(entry);
                }
            }
            Ok(())
        }
    }
}

fn new_controller(config: &Config, store: Arc<dyn EntitlementStore>) -> Controller {
    SessionController::new(
        store,
        V4l2Camera::new(config.camera_device.clone()),
        RandomClassifier::new(),
        config.controller_settings(),
    )
}

/// Start the camera, let it warm up, then grab a still.
async fn capture(controller: &mut Controller, config: &Config) -> Result<SessionState, SessionError> {
    let state = controller.start_camera().await?;
    if state != SessionState::LivePreview {
        return Ok(state);
    }

    let warmup = Duration::from_millis(config.warmup_ms);
    let mut attempts = 0;
    loop {
        // Ctrl-C while the camera warms up cancels before anything is captured.
        if controller.hold_preview(warmup).await? != SessionState::LivePreview {
            return Ok(controller.state());
        }
        attempts += 1;
        match controller.capture().await {
            Err(SessionError::Capture(CaptureError::FrameNotReady)) if attempts < CAPTURE_ATTEMPTS => {
                eprintln!("{}", Notice::FrameNotReady.message());
            }
            Err(SessionError::Capture(CaptureError::FrameNotReady)) => {
                return controller.cancel();
            }
            other => return other,
        }
    }
}

/// Print state changes and analysis progress on stderr.
fn show_progress(controller: &Controller) -> JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let mut last = None;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.state == SessionState::Analyzing {
                eprint!("\ranalyzing... {:>3.0}%", snapshot.progress);
            } else if last != Some(snapshot.state) {
                tracing::debug!(session = %snapshot.session_id, state = %snapshot.state, "state changed");
                if last == Some(SessionState::Analyzing) {
                    eprintln!();
                }
                eprintln!("{}", snapshot.state);
            }
            last = Some(snapshot.state);
        }
    })
}

/// First Ctrl-C cancels the pending permission request, preview hold or analysis.
fn interrupt_on_ctrl_c(controller: &Controller) -> JoinHandle<()> {
    let handle = controller.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt requested");
            handle.interrupt();
        }
    })
}

fn finish(
    outcome: Result<SessionState, SessionError>,
    controller: &Controller,
    store: &dyn EntitlementStore,
    config: &Config,
) -> Result<()> {
    let snapshot = controller.snapshot();
    match outcome {
        Err(SessionError::EntitlementDenied) => {
            let notice = snapshot.notice.unwrap_or(Notice::TrialExpired);
            eprintln!("{}", notice.message());
            eprintln!("Upgrade at {}", config.checkout_url);
            bail!(SessionError::EntitlementDenied);
        }
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }

    match snapshot.state {
        SessionState::Results => {
            let Some(analysis) = snapshot.result else {
                bail!("analysis finished without a result");
            };
            print_results(analysis.face_shape, analysis.confidence, store.is_premium(), config);
            Ok(())
        }
        SessionState::Error | SessionState::PermissionDenied => {
            let message = snapshot
                .error
                .map(|failure| failure.message())
                .unwrap_or_else(|| "unknown error".to_string());
            bail!(message)
        }
        state => {
            println!("Stopped ({state}).");
            Ok(())
        }
    }
}

fn print_results(shape: FaceShape, confidence: u8, is_premium: bool, config: &Config) {
    let info = face_shape_info(shape);
    println!("Face shape: {} ({confidence}% confidence)", info.name);
    println!("{}", info.description);
    println!("Tip: {}", info.tips);

    let recommendations = Recommendations::for_shape(shape, is_premium);
    println!("\nRecommended haircuts:");
    for entry in &recommendations.free {
        print_entry(entry);
    }
    if recommendations.premium.is_empty() {
        return;
    }
    if recommendations.premium_locked {
        println!(
            "\n{} more premium haircuts available. Upgrade at {}",
            recommendations.premium.len(),
            config.checkout_url
        );
    } else {
        println!("\nPremium haircuts:");
        for entry in &recommendations.premium {
            print_entry(entry);
        }
    }
}

fn print_entry(entry: &HaircutCatalogEntry) {
    let mut tags = vec![format!("{:?}", entry.difficulty).to_lowercase()];
    if entry.trending {
        tags.push("trending".to_string());
    }
    if entry.premium {
        tags.push("premium".to_string());
    }
    println!("  {} [{}]", entry.name, tags.join(", "));
    println!("    {}", entry.description);
}
