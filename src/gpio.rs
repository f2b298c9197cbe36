//! Concentrator reset and power sequencing over GPIO.
//!
//! The SX1302 HAT needs its reset line pulsed before the HAL is started, with
//! settling time between each transition or the chip does not come up.

use log::{debug, info};
use std::fmt;
use std::process::Command;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Settling time after every pin change.
pub const SETTLE_TIME: Duration = Duration::from_millis(100);

/// Default BCM pin wired to the concentrator reset line.
pub const DEFAULT_RESET_PIN: u8 = 23;

/// GPIO errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioError {
    /// The pin command could not be run or exited with an error.
    Command { pin: u8, detail: String },
    /// The blocking task running a pin command panicked or was aborted.
    Task(String),
    /// Shutdown requested during the sequence.
    Cancelled,
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::Command { pin, detail } => write!(f, "GPIO {}: {}", pin, detail),
            GpioError::Task(detail) => write!(f, "GPIO task failed: {}", detail),
            GpioError::Cancelled => write!(f, "GPIO sequence cancelled"),
        }
    }
}

impl std::error::Error for GpioError {}

/// A digital output pin.
pub trait OutputPin: Send {
    /// Configure the pin as an output.
    fn set_output(&mut self) -> Result<(), GpioError>;
    fn set_high(&mut self) -> Result<(), GpioError>;
    fn set_low(&mut self) -> Result<(), GpioError>;
}

/// Raspberry Pi pin driven through the `pinctrl` (Bookworm) or `raspi-gpio` tool.
#[derive(Debug, Clone)]
pub struct PinctrlPin {
    pin: u8,
    program: &'static str,
}

impl PinctrlPin {
    /// `bookworm` selects `pinctrl`; older releases ship `raspi-gpio`.
    pub fn new(pin: u8, bookworm: bool) -> Self {
        Self {
            pin,
            program: if bookworm { "pinctrl" } else { "raspi-gpio" },
        }
    }

    fn set(&self, arg: &str) -> Result<(), GpioError> {
        debug!("{} set {} {}", self.program, self.pin, arg);
        let output = Command::new(self.program)
            .args(["set", &self.pin.to_string(), arg])
            .output()
            .map_err(|e| GpioError::Command {
                pin: self.pin,
                detail: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(GpioError::Command {
                pin: self.pin,
                detail: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl OutputPin for PinctrlPin {
    fn set_output(&mut self) -> Result<(), GpioError> {
        self.set("op")
    }

    fn set_high(&mut self) -> Result<(), GpioError> {
        self.set("dh")
    }

    fn set_low(&mut self) -> Result<(), GpioError> {
        self.set("dl")
    }
}

async fn settle(cancel: &CancellationToken) -> Result<(), GpioError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GpioError::Cancelled),
        _ = tokio::time::sleep(SETTLE_TIME) => Ok(()),
    }
}

/// Run one pin operation on the blocking pool and hand the pin back.
async fn apply<P>(pin: P, op: fn(&mut P) -> Result<(), GpioError>) -> Result<P, GpioError>
where
    P: OutputPin + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut pin = pin;
        op(&mut pin).map(|()| pin)
    })
    .await
    .map_err(|e| GpioError::Task(e.to_string()))?
}

/// Configure the pins, power the concentrator and pulse its reset line.
///
/// Pin commands block, so each one runs on the blocking pool.
pub async fn reset_concentrator<P>(
    reset: P,
    power: Option<P>,
    cancel: &CancellationToken,
) -> Result<(), GpioError>
where
    P: OutputPin + 'static,
{
    let reset = apply(reset, P::set_output).await?;
    settle(cancel).await?;

    if let Some(power) = power {
        let power = apply(power, P::set_output).await?;
        settle(cancel).await?;
        apply(power, P::set_high).await?;
        settle(cancel).await?;
    }

    let reset = apply(reset, P::set_high).await?;
    settle(cancel).await?;
    apply(reset, P::set_low).await?;
    settle(cancel).await?;

    info!("Concentrator reset complete");
    Ok(())
}
