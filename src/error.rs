//! Unified error types for the handset.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A screen failed during configure or run.
    Screen(ScreenError),

    /// A navigation request could not be queued.
    Nav(NavError),

    /// Shared store or persistence backend failure.
    Store(StoreError),

    /// Display, audio or modem hardware failure.
    Device(DeviceError),
}

/// Faults raised by a screen activation. Any of these ends the activation
/// and sends the navigator through crash recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScreenError {
    /// `run` was reached without a successful `configure`.
    NotConfigured,
    /// The navigation payload was not the variant the screen expects.
    UnexpectedPayload,
    /// Rendering failed.
    Display,
    /// Tone playback failed.
    Audio,
    /// The modem rejected a command.
    Modem,
    /// Reading or writing shared state failed.
    Store,
    /// Screen-specific failure.
    Fault(&'static str),
}

/// Reasons a navigation request was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NavError {
    /// Navigation is masked; push/pop style requests are rejected.
    Masked,
    /// The navigator has shut down or quit.
    Closed,
    /// The request queue is full.
    QueueFull,
    /// No room left in the screen registry.
    RegistryFull,
}

/// Shared store and persistence failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Key longer than the store allows.
    KeyTooLong,
    /// No room for another key.
    Full,
    /// Text value longer than the store allows.
    TextTooLong,
    /// Stored bytes could not be decoded.
    Encoding,
    /// The persistence backend failed.
    Backend,
}

/// Hardware collaborator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// Bus transaction (I²C, UART, flash) failed.
    Bus,
    /// Command longer than the peripheral's line buffer.
    Overflow,
}

// Convenience conversions

impl From<ScreenError> for Error {
    fn from(e: ScreenError) -> Self {
        Error::Screen(e)
    }
}

impl From<NavError> for Error {
    fn from(e: NavError) -> Self {
        Error::Nav(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::Device(e)
    }
}

impl From<StoreError> for ScreenError {
    fn from(_: StoreError) -> Self {
        ScreenError::Store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bring_up(store: Result<(), StoreError>, nav: Result<(), NavError>) -> Result<(), Error> {
        store?;
        nav?;
        Ok(())
    }

    #[test]
    fn first_failure_is_reported_with_its_source() {
        assert_eq!(bring_up(Ok(()), Ok(())), Ok(()));
        assert_eq!(
            bring_up(Err(StoreError::Backend), Err(NavError::Closed)),
            Err(Error::Store(StoreError::Backend))
        );
        assert_eq!(
            bring_up(Ok(()), Err(NavError::QueueFull)),
            Err(Error::Nav(NavError::QueueFull))
        );
    }

    #[test]
    fn store_failures_inside_a_screen_become_screen_errors() {
        let err: ScreenError = StoreError::Full.into();
        assert_eq!(err, ScreenError::Store);
    }
}
