//! Injected simulation events
//!
//! Events arrive as single text lines, a keyword followed by
//! space-separated arguments:
//!
//! | Line | Effect |
//! |---|---|
//! | `cv2x_status <rx> <tx> [rxCause] [txCause]` | new radio status |
//! | `slss_rx_info <slssId> <inCoverage> <pattern> <rsrp> <selected>` | SLSS reference UE |
//! | `src_l2_id` | random new source L2 id |
//! | `sps_schedule <spsId> <utcTime> <periodicity>` | SPS scheduling change |
//! | `mac_clone_attack <detected>` | MAC address clone attack |
//! | `capabilities <minFreq> <maxFreq> [<minFreq> <maxFreq>]` | Tx pool change |
//! | `tx_report <port>` | one Tx status report |
//!
//! Status words other than `inactive`, `active` and `suspended` read as
//! UNKNOWN. A cause is expected only for a plane that is inactive or
//! suspended, rx cause first.

use std::str::FromStr;

use v2x_core::{
    Cv2xCause, Cv2xStatus, Cv2xStatusType, SlssSyncPattern, SpsSchedulingInfo, SyncRefUeInfo,
    TxPoolIdInfo,
};

use crate::error::SimError;

/// One injected event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Cv2xStatus(Cv2xStatus),
    SlssRxInfo(SyncRefUeInfo),
    SrcL2Id,
    SpsSchedule(SpsSchedulingInfo),
    MacCloneAttack(bool),
    Capabilities(Vec<TxPoolIdInfo>),
    TxReport(u16),
}

const EVENT_NAMES: [&str; 7] = [
    "cv2x_status",
    "slss_rx_info",
    "src_l2_id",
    "sps_schedule",
    "mac_clone_attack",
    "capabilities",
    "tx_report",
];

struct Args<'a> {
    event: &'static str,
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next_str(&mut self, what: &str) -> Result<&'a str, SimError> {
        self.tokens
            .next()
            .ok_or_else(|| SimError::malformed(self.event, format!("missing {}", what)))
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T, SimError> {
        let token = self.next_str(what)?;
        token
            .parse()
            .map_err(|_| SimError::malformed(self.event, format!("invalid {} '{}'", what, token)))
    }

    fn next_flag(&mut self, what: &str) -> Result<bool, SimError> {
        Ok(self.next::<i64>(what)? != 0)
    }

    fn has_more(&mut self) -> bool {
        self.tokens.clone().next().is_some()
    }
}

impl SimEvent {
    /// Event keyword as used on the injection line
    pub fn name(&self) -> &'static str {
        match self {
            SimEvent::Cv2xStatus(_) => "cv2x_status",
            SimEvent::SlssRxInfo(_) => "slss_rx_info",
            SimEvent::SrcL2Id => "src_l2_id",
            SimEvent::SpsSchedule(_) => "sps_schedule",
            SimEvent::MacCloneAttack(_) => "mac_clone_attack",
            SimEvent::Capabilities(_) => "capabilities",
            SimEvent::TxReport(_) => "tx_report",
        }
    }

    /// Parse one injection line
    pub fn parse(line: &str) -> Result<Self, SimError> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens
            .next()
            .ok_or_else(|| SimError::UnknownEvent(String::new()))?;

        let event = EVENT_NAMES
            .iter()
            .copied()
            .find(|name| *name == keyword)
            .ok_or_else(|| SimError::UnknownEvent(keyword.to_string()))?;
        let mut args = Args { event, tokens };

        match event {
            "cv2x_status" => parse_status(&mut args).map(SimEvent::Cv2xStatus),
            "slss_rx_info" => {
                let slss_id = args.next("slss id")?;
                let in_coverage = args.next_flag("in coverage")?;
                let code = args.next("pattern")?;
                let pattern = SlssSyncPattern::from_code(code).ok_or_else(|| {
                    SimError::malformed("slss_rx_info", format!("invalid pattern {}", code))
                })?;
                let rsrp = args.next("rsrp")?;
                let selected = args.next_flag("selected")?;
                Ok(SimEvent::SlssRxInfo(SyncRefUeInfo {
                    slss_id,
                    in_coverage,
                    pattern,
                    rsrp,
                    selected,
                }))
            }
            "src_l2_id" => Ok(SimEvent::SrcL2Id),
            "sps_schedule" => Ok(SimEvent::SpsSchedule(SpsSchedulingInfo {
                sps_id: args.next("sps id")?,
                utc_time: args.next("utc time")?,
                periodicity: args.next("periodicity")?,
            })),
            "mac_clone_attack" => Ok(SimEvent::MacCloneAttack(args.next_flag("detected")?)),
            "capabilities" => {
                let mut pools = vec![parse_pool(&mut args, 0)?];
                if args.has_more() {
                    pools.push(parse_pool(&mut args, 1)?);
                }
                Ok(SimEvent::Capabilities(pools))
            }
            _ => Ok(SimEvent::TxReport(args.next("port")?)),
        }
    }
}

fn parse_plane(args: &mut Args<'_>, what: &str) -> Result<Cv2xStatusType, SimError> {
    Ok(Cv2xStatusType::from_word(args.next_str(what)?))
}

fn parse_cause(args: &mut Args<'_>, what: &str) -> Result<Cv2xCause, SimError> {
    let code = args.next(what)?;
    Cv2xCause::from_code(code)
        .ok_or_else(|| SimError::malformed("cv2x_status", format!("invalid {} {}", what, code)))
}

fn parse_status(args: &mut Args<'_>) -> Result<Cv2xStatus, SimError> {
    let mut status = Cv2xStatus::new(parse_plane(args, "rx status")?, parse_plane(args, "tx status")?);
    if status.rx_status.carries_cause() {
        status.rx_cause = parse_cause(args, "rx cause")?;
    }
    if status.tx_status.carries_cause() {
        status.tx_cause = parse_cause(args, "tx cause")?;
    }
    Ok(status)
}

fn parse_pool(args: &mut Args<'_>, pool_id: u8) -> Result<TxPoolIdInfo, SimError> {
    let min_freq: u32 = args.next("min frequency")?;
    let max_freq: u32 = args.next("max frequency")?;
    let valid = |f: u32| f > 0 && f < 0xFFFF;
    if !valid(min_freq) || !valid(max_freq) {
        return Err(SimError::malformed(
            "capabilities",
            format!("frequency out of range {}..{}", min_freq, max_freq),
        ));
    }
    Ok(TxPoolIdInfo {
        pool_id,
        min_freq: min_freq as u16,
        max_freq: max_freq as u16,
    })
}
