//! Portable core of the kiosk device: PIN authentication with lockout and
//! credential migration, plus the inactivity screensaver and its inputs.

pub mod attempts;
pub mod clock;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod gesture;
pub mod motion;
pub mod paths;
pub mod screensaver;
pub mod secure_storage;
pub mod settings;
pub mod storage;
pub mod verify;

pub use error::{KioskError, Result};
pub use verify::{PinVerifier, VerificationResult};
