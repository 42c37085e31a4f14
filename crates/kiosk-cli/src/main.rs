use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use kiosk_core::clock::SystemClock;
use kiosk_core::gesture::SecretTapGesture;
use kiosk_core::paths::{data_dir, preferences_path};
use kiosk_core::screensaver::{Brightness, ScreensaverController};
use kiosk_core::secure_storage::{KeyringSecretStore, MemorySecretStore, SecretStore};
use kiosk_core::settings::MotionSensitivity;
use kiosk_core::storage::{load_settings, save_settings, JsonFileStore, KeyValueStore};
use kiosk_core::verify::format_remaining;
use kiosk_core::{PinVerifier, VerificationResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "kioskctl", author, version, about = "Kiosk PIN and screensaver control", long_about = None)]
struct Cli {
    /// Directory holding preferences.json (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep the PIN credential in process memory instead of the OS keyring
    #[arg(long, global = true)]
    memory_secrets: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the settings PIN
    Pin {
        #[command(subcommand)]
        action: PinAction,
    },
    /// Inspect or change persisted kiosk settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run the screensaver against stdin events
    Screensaver,
}

#[derive(Subcommand, Debug)]
enum PinAction {
    /// Set a new PIN (4-6 digits)
    Set,
    /// Check a PIN against the stored credential
    Verify,
    /// Show lockout state and remaining attempts
    Status,
    /// Remove the PIN; the default PIN applies afterwards
    Clear,
    /// Hash a leftover plaintext PIN from an older install
    Migrate,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print settings as JSON
    Show,
    /// Update screensaver settings
    Screensaver {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        inactivity: Option<bool>,
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        motion: Option<bool>,
        #[arg(long, value_enum)]
        sensitivity: Option<Sensitivity>,
        /// Brightness while the screensaver is shown, 0.0-1.0
        #[arg(long)]
        dim: Option<f32>,
        /// Normal brightness, 0.0-1.0
        #[arg(long)]
        normal: Option<f32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Sensitivity {
    Low,
    Medium,
    High,
}

impl From<Sensitivity> for MotionSensitivity {
    fn from(value: Sensitivity) -> Self {
        match value {
            Sensitivity::Low => MotionSensitivity::Low,
            Sensitivity::Medium => MotionSensitivity::Medium,
            Sensitivity::High => MotionSensitivity::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let data = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => data_dir()?,
    };
    std::fs::create_dir_all(&data)?;
    let kv = Arc::new(JsonFileStore::open(preferences_path(&data))?);
    let secrets: Arc<dyn SecretStore> = if cli.memory_secrets {
        warn!("using in-memory secret store; the PIN will not persist");
        Arc::new(MemorySecretStore::new())
    } else {
        Arc::new(KeyringSecretStore::new())
    };

    match cli.command {
        Commands::Pin { action } => {
            let verifier = PinVerifier::new(secrets, kv, Arc::new(SystemClock));
            pin_command(&verifier, action)
        }
        Commands::Settings { action } => settings_command(&*kv, action),
        Commands::Screensaver => screensaver_command(&*kv).await,
    }
}

fn pin_command(verifier: &PinVerifier, action: PinAction) -> Result<()> {
    match action {
        PinAction::Set => {
            let pin = prompt_pin_twice("New PIN: ")?;
            verifier.save_pin(&pin)?;
            println!("PIN saved");
        }
        PinAction::Verify => {
            let pin = prompt_pin("PIN: ")?;
            let result = verifier.verify(&pin)?;
            match result {
                VerificationResult::Success { .. } => println!("{}", result.message()),
                _ => return Err(anyhow!(result.message())),
            }
        }
        PinAction::Status => {
            let status = verifier.lockout_status();
            println!("PIN configured: {}", verifier.has_pin());
            match status.time_remaining {
                Some(remaining) if status.is_locked_out => {
                    println!("Locked out, retry in {}", format_remaining(remaining))
                }
                _ => println!("Attempts remaining: {}", status.attempts_remaining),
            }
        }
        PinAction::Clear => {
            verifier.clear_pin()?;
            println!("PIN cleared");
        }
        PinAction::Migrate => {
            if verifier.migrate_legacy_pin()? {
                println!("Legacy PIN migrated");
            } else {
                println!("Nothing to migrate");
            }
        }
    }
    Ok(())
}

fn settings_command(kv: &dyn KeyValueStore, action: SettingsAction) -> Result<()> {
    let mut settings = load_settings(kv)?;
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Screensaver {
            enabled,
            inactivity,
            delay_ms,
            motion,
            sensitivity,
            dim,
            normal,
        } => {
            let ss = &mut settings.screensaver;
            if let Some(v) = enabled {
                ss.enabled = v;
            }
            if let Some(v) = inactivity {
                ss.inactivity_enabled = v;
            }
            if let Some(v) = delay_ms {
                ss.inactivity_delay_ms = v;
            }
            if let Some(v) = motion {
                ss.motion_enabled = v;
            }
            if let Some(v) = sensitivity {
                ss.motion_sensitivity = v.into();
            }
            if let Some(v) = dim {
                ss.screensaver_brightness = v;
            }
            if let Some(v) = normal {
                ss.default_brightness = v;
            }
            save_settings(kv, &settings)?;
            info!("screensaver settings updated");
            println!("{}", serde_json::to_string_pretty(&settings.screensaver)?);
        }
    }
    Ok(())
}

struct LoggedBrightness;

impl Brightness for LoggedBrightness {
    fn set_level(&self, level: f32) -> kiosk_core::Result<()> {
        info!(brightness = level, "brightness changed");
        println!("brightness -> {:.0}%", level * 100.0);
        Ok(())
    }
}

/// Each stdin line is an input: empty = tap, `m` = motion, `t` = secret-corner
/// tap, `q` = quit.
async fn screensaver_command(kv: &dyn KeyValueStore) -> Result<()> {
    let settings = load_settings(kv)?;
    if !settings.screensaver.enabled {
        warn!("screensaver disabled in settings; enable with `settings screensaver --enabled true`");
    }
    let controller =
        ScreensaverController::new(settings.screensaver_config(), Arc::new(LoggedBrightness));
    controller.set_enabled(settings.screensaver.enabled);
    controller.on_focus_gained();

    let mut gesture = SecretTapGesture::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "q" => break,
                    "m" => controller.on_motion_detected(),
                    "t" => {
                        controller.on_user_interaction();
                        if gesture.tap(Utc::now()) {
                            println!("secret gesture recognised, run `kioskctl pin verify`");
                            break;
                        }
                    }
                    _ => controller.on_user_interaction(),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    controller.on_focus_lost();
    Ok(())
}

fn prompt_pin(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pin) = std::env::var("KIOSK_PIN") {
        if !pin.is_empty() {
            return Ok(Zeroizing::new(pin));
        }
    }
    let pin = rpassword::prompt_password(prompt).map_err(|e| anyhow!("PIN prompt: {e}"))?;
    Ok(Zeroizing::new(pin))
}

fn prompt_pin_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pin) = std::env::var("KIOSK_PIN") {
        if !pin.is_empty() {
            return Ok(Zeroizing::new(pin));
        }
    }
    let first = prompt_pin(prompt)?;
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm PIN: ").map_err(|e| anyhow!("PIN prompt: {e}"))?,
    );
    if first != second {
        return Err(anyhow!("PINs do not match"));
    }
    Ok(first)
}
