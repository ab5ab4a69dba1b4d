//! Conversions between legacy and backend types

use tracing::{debug, error, warn};
use v2x_core::{
    Cv2xStatusEx, Cv2xStatusType, EventFlowInfo, Periodicity, Priority, RadioCapabilities,
    SlssRxInfo, SpsFlowInfo, SpsSchedulingInfo,
};

use crate::error::Errno;
use crate::types::{
    IfaceCapabilities, PlaneStatus, PoolPlaneStatus, RadioStatusEx, SpsMacDetails,
    TxBandwidthReservation, TxFlowInfo, TxSpsFlowInfo,
};

/// Offset between a priority level and its IPv6 traffic class
pub const TRAFFIC_CLASS_OFFSET: u16 = 1;
pub const MAX_POOL_IDS_LIST_LEN: usize = 20;
pub const MAX_TX_POOL_NUM: usize = 8;
pub const MAX_RX_POOL_NUM: usize = 8;
pub const MAX_SLSS_SYNC_REF_UE_NUM: usize = 3;

/// IPv6 traffic class used for packets of the given priority
pub fn convert_priority_to_traffic_class(priority: Priority) -> u16 {
    u16::from(priority.index()) + TRAFFIC_CLASS_OFFSET
}

/// Priority carried by an IPv6 traffic class
///
/// Classes outside the priority range map to `Priority2`.
pub fn convert_traffic_class_to_priority(traffic_class: u16) -> Priority {
    traffic_class
        .checked_sub(TRAFFIC_CLASS_OFFSET)
        .and_then(|level| u8::try_from(level).ok())
        .and_then(Priority::from_index)
        .unwrap_or_else(|| {
            warn!("Invalid traffic_class ({}) encountered", traffic_class);
            Priority::Priority2
        })
}

/// Snap a legacy interval down to a periodicity bucket
///
/// Intervals of 10 ms or less select the 10 ms bucket, anything above 100 ms
/// clamps to 100 ms.
pub fn snap_periodicity(period_interval_ms: u32) -> Periodicity {
    match period_interval_ms {
        0..=10 => Periodicity::Ms10,
        11..=20 => Periodicity::Ms20,
        21..=50 => Periodicity::Ms50,
        _ => Periodicity::Ms100,
    }
}

/// Backend SPS parameters for a legacy reservation
///
/// The exact interval must be one the radio reports in its capabilities.
pub fn convert_reservation(
    res: &TxBandwidthReservation,
    caps: &RadioCapabilities,
) -> Result<SpsFlowInfo, Errno> {
    let periodicity_ms = u64::from(res.period_interval_ms);
    if !caps.supports_periodicity_ms(periodicity_ms) {
        error!("Requested periodicity not supported");
        return Err(Errno::Inval);
    }

    Ok(SpsFlowInfo {
        priority: res.priority,
        periodicity: snap_periodicity(res.period_interval_ms),
        periodicity_ms,
        nbytes_reserved: res.tx_reservation_size_bytes,
        ..SpsFlowInfo::default()
    })
}

/// Backend SPS parameters for a reservation with flow overrides
pub fn convert_sps_flow_info(
    info: &TxSpsFlowInfo,
    caps: &RadioCapabilities,
) -> Result<SpsFlowInfo, Errno> {
    let mut sps = convert_reservation(&info.reservation, caps).inspect_err(|_| {
        error!("{}", caps.periodicities_to_string());
    })?;

    let flow = &info.flow_info;
    sps.auto_retrans_enabled = flow.retransmit_policy.as_override();
    sps.peak_tx_power = flow.default_tx_power;
    sps.mcs_index = flow.mcs_index;
    sps.tx_pool_id = flow.tx_pool_id;
    Ok(sps)
}

pub fn convert_event_flow_info(flow: &TxFlowInfo) -> EventFlowInfo {
    EventFlowInfo {
        auto_retrans_enabled: flow.retransmit_policy.as_override(),
        peak_tx_power: flow.default_tx_power,
        mcs_index: flow.mcs_index,
        tx_pool_id: flow.tx_pool_id,
        is_unicast: flow.is_unicast.unwrap_or(false),
    }
}

fn highest_bit(bits: u8) -> u16 {
    match bits {
        0 => 0,
        _ => 7 - bits.leading_zeros() as u16,
    }
}

fn lowest_bit(bits: u8) -> u16 {
    match bits {
        0 => 0,
        _ => bits.trailing_zeros() as u16,
    }
}

/// Legacy view of the radio capabilities
pub fn convert_capabilities(caps: &RadioCapabilities) -> IfaceCapabilities {
    let mut min_periodicity: u16 = 100;
    let mut max_periodicity: u16 = 1000;
    for p in caps
        .periodicities
        .iter()
        .filter_map(|&p| u16::try_from(p).ok())
    {
        min_periodicity = min_periodicity.min(p);
        max_periodicity = max_periodicity.max(p);
    }

    IfaceCapabilities {
        link_ip_mtu_bytes: caps.link_ip_mtu_bytes,
        link_non_ip_mtu_bytes: caps.link_non_ip_mtu_bytes,
        max_supported_concurrency: caps.max_supported_concurrency,
        non_ip_tx_payload_offset_bytes: caps.non_ip_tx_payload_offset_bytes,
        non_ip_rx_payload_offset_bytes: caps.non_ip_rx_payload_offset_bytes,
        int_min_periodicity_multiplier_ms: min_periodicity,
        int_maximum_periodicity_ms: max_periodicity,
        // 10 ms is never offered on the legacy surface
        supports_10ms_periodicity: false,
        supports_20ms_periodicity: caps.supports_periodicity(Periodicity::Ms20),
        supports_50ms_periodicity: caps.supports_periodicity(Periodicity::Ms50),
        supports_100ms_periodicity: caps.supports_periodicity(Periodicity::Ms100),
        max_quantity_of_auto_retrans: caps.max_num_auto_retransmissions,
        size_of_layer2_mac_address: caps.layer2_mac_address_size,
        v2x_number_of_priority_levels: Priority::LEVELS,
        highest_priority_value: highest_bit(caps.priorities_supported),
        lowest_priority_value: lowest_bit(caps.priorities_supported),
        max_qty_sps_flows: caps.max_num_sps_flows,
        max_qty_non_sps_flows: caps.max_num_non_sps_flows,
        max_tx_pwr: caps.max_tx_power,
        min_tx_pwr: caps.min_tx_power,
        tx_pool_ids_supported: caps
            .tx_pool_ids_supported
            .iter()
            .take(MAX_POOL_IDS_LIST_LEN)
            .copied()
            .collect(),
    }
}

/// Legacy extended status
///
/// A pool whose plane status is UNKNOWN does not exist on that plane and is
/// left out.
pub fn convert_ext_radio_status(status: &Cv2xStatusEx) -> RadioStatusEx {
    let s = &status.status;
    let tx_pools: Vec<_> = status
        .pool_status
        .iter()
        .filter(|p| p.status.tx_status != Cv2xStatusType::Unknown)
        .take(MAX_TX_POOL_NUM)
        .map(|p| PoolPlaneStatus {
            pool_id: p.pool_id,
            status: PlaneStatus {
                status: p.status.tx_status,
                cause: p.status.tx_cause,
            },
        })
        .collect();
    let rx_pools: Vec<_> = status
        .pool_status
        .iter()
        .filter(|p| p.status.rx_status != Cv2xStatusType::Unknown)
        .take(MAX_RX_POOL_NUM)
        .map(|p| PoolPlaneStatus {
            pool_id: p.pool_id,
            status: PlaneStatus {
                status: p.status.rx_status,
                cause: p.status.rx_cause,
            },
        })
        .collect();

    debug!(
        "Overall Tx status={} cause={:?}, Rx status={} cause={:?}, Tx pools={}, Rx pools={}",
        s.tx_status,
        s.tx_cause,
        s.rx_status,
        s.rx_cause,
        tx_pools.len(),
        rx_pools.len()
    );

    RadioStatusEx {
        tx_status: PlaneStatus {
            status: s.tx_status,
            cause: s.tx_cause,
        },
        rx_status: PlaneStatus {
            status: s.rx_status,
            cause: s.rx_cause,
        },
        tx_pools,
        rx_pools,
    }
}

pub fn convert_slss_rx_info(info: &SlssRxInfo) -> SlssRxInfo {
    SlssRxInfo {
        ue_info: info
            .ue_info
            .iter()
            .take(MAX_SLSS_SYNC_REF_UE_NUM)
            .copied()
            .collect(),
    }
}

pub fn convert_sps_scheduling_info(info: &SpsSchedulingInfo) -> SpsMacDetails {
    SpsMacDetails {
        periodicity_in_use_ns: u64::from(info.periodicity) * 1_000_000,
        utc_time_ns: info.utc_time,
    }
}
