//! Signal numbers forwarded to the daemon

use std::convert::TryFrom;
use std::str::FromStr;

use nix::sys::signal::Signal as NixSignal;

/// POSIX signal as accepted by the daemon's signal RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal(NixSignal);

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
}

impl TryFrom<&str> for Signal {
    type Error = SignalError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if let Ok(num) = s.parse::<i32>() {
            return Signal::try_from(num);
        }

        let upper = s.to_ascii_uppercase();
        let name = match upper.as_str() {
            "IOT" | "SIGIOT" => "SIGABRT",
            other if other.starts_with("SIG") => other,
            other => return Signal::try_from(format!("SIG{other}").as_str()),
        };

        NixSignal::from_str(name)
            .map(Signal)
            .map_err(|_| SignalError::InvalidSignal(s.to_owned()))
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        NixSignal::try_from(value)
            .map(Signal)
            .map_err(|_| SignalError::InvalidSignal(value.to_string()))
    }
}

impl From<NixSignal> for Signal {
    fn from(s: NixSignal) -> Self {
        Signal(s)
    }
}

impl Signal {
    /// Signal number on the wire.
    pub fn as_raw(&self) -> u32 {
        self.0 as i32 as u32
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal::*;

    use super::*;

    #[test]
    fn test_conversion_from_string() {
        let cases = [
            (SIGHUP, vec!["1", "HUP", "SIGHUP", "hup"]),
            (SIGABRT, vec!["6", "ABRT", "IOT", "SIGIOT"]),
            (SIGKILL, vec!["9", "KILL", "SIGKILL", "sigkill"]),
            (SIGTERM, vec!["15", "TERM", "SIGTERM"]),
            (SIGWINCH, vec!["28", "WINCH"]),
        ];
        for (signal, strings) in cases {
            for s in strings {
                assert_eq!(Signal(signal), Signal::try_from(s).unwrap(), "{s}");
            }
        }
    }

    #[test]
    fn test_conversion_should_be_failed() {
        assert!(Signal::try_from("invalid").is_err());
        assert!(Signal::try_from("SIGNOPE").is_err());
        assert!(Signal::try_from(0).is_err());
        assert!(Signal::try_from(-3).is_err());
    }

    #[test]
    fn test_as_raw() {
        assert_eq!(Signal::from(SIGKILL).as_raw(), 9);
        assert_eq!(Signal::try_from(15).unwrap().as_raw(), 15);
    }
}
