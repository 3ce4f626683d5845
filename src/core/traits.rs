//! The boundary to the physical device.
//!
//! The protocol core never touches hardware directly; it drives an analog
//! input and an actuator through [`DeviceIo`]. Both calls are invoked
//! synchronously from the event-processing path and must return quickly.

/// Which half of the device pair this instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Reads the analog input and publishes it.
    Controller,
    /// Drives the actuator from the partner's published value.
    Receiver,
}

impl Role {
    /// Default device name used to build the publish topic.
    pub fn device_name(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Receiver => "receiver",
        }
    }

    /// The opposite role (the partner on the other side of the relay).
    pub fn partner(self) -> Self {
        match self {
            Self::Controller => Self::Receiver,
            Self::Receiver => Self::Controller,
        }
    }
}

/// Hardware collaborator interface.
///
/// Implementations must be non-blocking: both methods are called from the
/// connection loop on every iteration, and a slow call stalls the link.
///
/// The same trait serves both roles. A controller returns the analog input
/// from `read_local_value` and typically ignores `apply_remote_value`
/// (or shows it on a display); a receiver applies incoming values to the
/// actuator and returns the currently applied value from `read_local_value`,
/// which makes its change-triggered publish double as a confirmation.
///
/// # Example
///
/// ```rust
/// use tether_protocol::core::DeviceIo;
///
/// struct Servo {
///     angle: f64,
/// }
///
/// impl DeviceIo for Servo {
///     fn read_local_value(&mut self) -> f64 {
///         self.angle
///     }
///
///     fn apply_remote_value(&mut self, value: f64) {
///         self.angle = value;
///     }
/// }
/// ```
pub trait DeviceIo {
    /// Current local value (e.g. a potentiometer angle in degrees).
    fn read_local_value(&mut self) -> f64;

    /// Drive the actuator to `value`.
    ///
    /// The value is already clamped to the configured range; on shutdown the
    /// supervisor calls this once more with the center of the range so the
    /// actuator is left in a safe position.
    fn apply_remote_value(&mut self, value: f64);
}
