//! Radio activation status and its collapse into activity events

use std::fmt;

use serde::{Deserialize, Serialize};

/// Activation state of one radio plane (Tx or Rx)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cv2xStatusType {
    /// The plane is off
    Inactive,
    /// The plane is fully operational
    Active,
    /// The plane is temporarily unable to operate (e.g. loss of timing)
    Suspended,
    /// The backend did not report a state
    #[default]
    Unknown,
}

impl Cv2xStatusType {
    /// Parse the word used in status injection strings
    ///
    /// Anything other than `inactive`, `active` or `suspended` is `Unknown`.
    pub fn from_word(word: &str) -> Self {
        match word {
            "inactive" => Cv2xStatusType::Inactive,
            "active" => Cv2xStatusType::Active,
            "suspended" => Cv2xStatusType::Suspended,
            _ => Cv2xStatusType::Unknown,
        }
    }

    /// Whether the plane is in the ACTIVE/SUSPENDED superstate
    pub fn is_operational(&self) -> bool {
        matches!(self, Cv2xStatusType::Active | Cv2xStatusType::Suspended)
    }

    /// Whether a cause code accompanies this state
    pub fn carries_cause(&self) -> bool {
        matches!(self, Cv2xStatusType::Inactive | Cv2xStatusType::Suspended)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cv2xStatusType::Inactive => "INACTIVE",
            Cv2xStatusType::Active => "ACTIVE",
            Cv2xStatusType::Suspended => "SUSPENDED",
            Cv2xStatusType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Cv2xStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reason a plane is inactive or suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cv2xCause {
    Timing,
    Config,
    UeMode,
    Geopolygon,
    Thermal,
    ThermalEcall,
    GeopolygonSwitch,
    Sensor,
    Lpm,
    Disabled,
    NoGnssFix,
    NoCbr,
    #[default]
    Unknown,
}

impl Cv2xCause {
    /// Map a numeric cause code, rejecting values outside the known range
    pub fn from_code(code: u32) -> Option<Self> {
        let cause = match code {
            0 => Cv2xCause::Timing,
            1 => Cv2xCause::Config,
            2 => Cv2xCause::UeMode,
            3 => Cv2xCause::Geopolygon,
            4 => Cv2xCause::Thermal,
            5 => Cv2xCause::ThermalEcall,
            6 => Cv2xCause::GeopolygonSwitch,
            7 => Cv2xCause::Sensor,
            8 => Cv2xCause::Lpm,
            9 => Cv2xCause::Disabled,
            10 => Cv2xCause::NoGnssFix,
            11 => Cv2xCause::NoCbr,
            12 => Cv2xCause::Unknown,
            _ => return None,
        };
        Some(cause)
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Composite Tx/Rx status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cv2xStatus {
    pub rx_status: Cv2xStatusType,
    pub tx_status: Cv2xStatusType,
    pub rx_cause: Cv2xCause,
    pub tx_cause: Cv2xCause,
    /// Channel busy ratio, percent
    pub cbr_value: Option<u8>,
}

impl Cv2xStatus {
    pub fn new(rx_status: Cv2xStatusType, tx_status: Cv2xStatusType) -> Self {
        Self {
            rx_status,
            tx_status,
            ..Default::default()
        }
    }

    /// Whether either plane is UNKNOWN
    pub fn has_unknown(&self) -> bool {
        self.rx_status == Cv2xStatusType::Unknown || self.tx_status == Cv2xStatusType::Unknown
    }

    /// Activity event this status collapses to
    pub fn event(&self) -> V2xEvent {
        collapse(self.rx_status, self.tx_status)
    }
}

/// Per-pool status entry of the extended status
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolStatus {
    pub pool_id: u8,
    pub status: Cv2xStatus,
}

/// Extended status: overall status plus per-pool detail and time uncertainty
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cv2xStatusEx {
    pub status: Cv2xStatus,
    pub pool_status: Vec<PoolStatus>,
    /// Time uncertainty in milliseconds
    pub time_uncertainty: Option<f32>,
}

impl From<Cv2xStatus> for Cv2xStatusEx {
    fn from(status: Cv2xStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Externally visible radio activity event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum V2xEvent {
    #[default]
    Inactive,
    Active,
    TxSuspended,
    RxSuspended,
    TxRxSuspended,
}

impl V2xEvent {
    pub fn name(&self) -> &'static str {
        match self {
            V2xEvent::Inactive => "INACTIVE",
            V2xEvent::Active => "ACTIVE",
            V2xEvent::TxSuspended => "TX_SUSPENDED",
            V2xEvent::RxSuspended => "RX_SUSPENDED",
            V2xEvent::TxRxSuspended => "TXRX_SUSPENDED",
        }
    }
}

impl fmt::Display for V2xEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Collapse a (rx, tx) pair into one activity event
///
/// Rules are evaluated in order and the first match wins. Combinations that
/// match no rule (any UNKNOWN) fall back to `Inactive`.
pub fn collapse(rx: Cv2xStatusType, tx: Cv2xStatusType) -> V2xEvent {
    use Cv2xStatusType::*;

    match (rx, tx) {
        (Active, Active) => V2xEvent::Active,
        (Active, Suspended) => V2xEvent::TxSuspended,
        (Suspended, Active) => V2xEvent::RxSuspended,
        (Suspended, Suspended) => V2xEvent::TxRxSuspended,
        (Inactive, _) | (_, Inactive) => V2xEvent::Inactive,
        _ => V2xEvent::Inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Cv2xStatusType::*;

    #[test]
    fn test_collapse_table() {
        let all = [Unknown, Inactive, Active, Suspended];
        for rx in all {
            for tx in all {
                let expected = match (rx, tx) {
                    (Active, Active) => V2xEvent::Active,
                    (Active, Suspended) => V2xEvent::TxSuspended,
                    (Suspended, Active) => V2xEvent::RxSuspended,
                    (Suspended, Suspended) => V2xEvent::TxRxSuspended,
                    _ => V2xEvent::Inactive,
                };
                assert_eq!(collapse(rx, tx), expected, "rx={} tx={}", rx, tx);
            }
        }
    }

    #[test]
    fn test_inactive_dominates_suspended() {
        assert_eq!(collapse(Inactive, Suspended), V2xEvent::Inactive);
        assert_eq!(collapse(Active, Inactive), V2xEvent::Inactive);
    }

    #[test]
    fn test_from_word() {
        assert_eq!(Cv2xStatusType::from_word("active"), Active);
        assert_eq!(Cv2xStatusType::from_word("suspended"), Suspended);
        assert_eq!(Cv2xStatusType::from_word("inactive"), Inactive);
        assert_eq!(Cv2xStatusType::from_word("ACTIVE"), Unknown);
        assert_eq!(Cv2xStatusType::from_word(""), Unknown);
    }

    #[test]
    fn test_cause_codes() {
        assert_eq!(Cv2xCause::from_code(2), Some(Cv2xCause::UeMode));
        assert_eq!(Cv2xCause::from_code(12), Some(Cv2xCause::Unknown));
        assert_eq!(Cv2xCause::from_code(13), None);
        assert_eq!(Cv2xCause::Disabled.code(), 9);
    }

    #[test]
    fn test_has_unknown() {
        assert!(Cv2xStatus::new(Unknown, Active).has_unknown());
        assert!(Cv2xStatus::new(Active, Unknown).has_unknown());
        assert!(!Cv2xStatus::new(Active, Suspended).has_unknown());
    }
}
