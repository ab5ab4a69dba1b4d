//! Measurements, filters, listeners and injection

use std::net::Ipv6Addr;
use std::sync::Arc;

use tracing::{debug, error, info};
use v2x_core::{
    coordinator, Cv2xListener, Ipv6AddrInfo, L2FilterInfo, Radio, RadioManager, SlssRxInfo,
    TrustedUeInfo, TrustedUeInfoList, UnicastRoutingInfo,
};

use crate::context::{LegacyRadio, SlssAdapter, TxReportAdapter};
use crate::convert::{convert_ext_radio_status, convert_slss_rx_info};
use crate::error::{Errno, V2xError};
use crate::types::{
    ChanMeasParams, ExtStatusListener, RadioHandle, RadioStatusEx, SlssRxListener,
    TxReportListener,
};

pub const MAX_FILTER_IDS_LIST_LEN: usize = 50;
pub const MAX_MALICIOUS_IDS_LIST_LEN: usize = 50;
pub const MAX_TRUSTED_IDS_LIST_LEN: usize = 50;

fn capped<T: Copy>(what: &str, list: &[T], max: usize) -> Vec<T> {
    if list.len() > max {
        error!(
            "{} list length ({}) exceeds maximum allowed ({}), ignoring the rest",
            what,
            list.len(),
            max
        );
    }
    list.iter().take(max).copied().collect()
}

impl LegacyRadio {
    fn manager_or(&self, op: &str, err: V2xError) -> Result<Arc<dyn RadioManager>, V2xError> {
        self.inner.manager().ok_or_else(|| {
            error!("{}: Failed to acquire Cv2xRadioManager", op);
            err
        })
    }

    fn radio_or_not_ready(&self, op: &str) -> Result<Arc<dyn Radio>, V2xError> {
        self.inner.radio().ok_or_else(|| {
            error!("{}: called when C-V2X radio is invalid", op);
            V2xError::RadioNotReady
        })
    }

    /// Start forwarding channel measurements with every status update
    ///
    /// Requires installed callbacks to deliver them to.
    pub fn start_measurements(
        &self,
        handle: RadioHandle,
        params: &ChanMeasParams,
    ) -> Result<(), V2xError> {
        if !handle.is_valid() {
            error!("start_measurements: invalid handle {}", handle.0);
            return Err(V2xError::Fail);
        }
        if self.inner.calls().is_none() {
            error!("start_measurements: no measurement listener installed");
            return Err(V2xError::Fail);
        }
        info!(
            "start_measurements: interval {} us, threshold {} deci-dBm",
            params.channel_measurement_interval_us, params.rs_threshold_decidbm
        );
        self.inner.aggregator.set_periodic_measurements(true);
        Ok(())
    }

    pub fn stop_measurements(&self, handle: RadioHandle) -> Result<(), V2xError> {
        if !handle.is_valid() {
            error!("stop_measurements: invalid handle {}", handle.0);
            return Err(V2xError::Fail);
        }
        self.inner.aggregator.set_periodic_measurements(false);
        Ok(())
    }

    /// Ask the radio for a new source L2 address
    pub fn trigger_l2_update(&self, _handle: RadioHandle) -> Result<(), Errno> {
        let radio = self.radio_or_inval("trigger_l2_update")?;
        coordinator::call("update_src_l2_info", |reply| radio.update_src_l2_info(reply)).map_err(
            |e| {
                error!("Error in update_src_l2_info: {}", e);
                Errno::Perm
            },
        )
    }

    /// Replace the malicious and trusted peer lists
    ///
    /// Each list is capped at 50 entries; an empty list is sent as not
    /// valid.
    pub fn update_trusted_ue_list(
        &self,
        malicious_ids: &[u32],
        trusted_ues: &[TrustedUeInfo],
    ) -> Result<(), Errno> {
        let radio = self.radio_or_inval("update_trusted_ue_list")?;

        let list = TrustedUeInfoList {
            malicious_ids_valid: !malicious_ids.is_empty(),
            malicious_ids: capped("malicious", malicious_ids, MAX_MALICIOUS_IDS_LIST_LEN),
            trusted_ues_valid: !trusted_ues.is_empty(),
            trusted_ues: capped("trusted", trusted_ues, MAX_TRUSTED_IDS_LIST_LEN),
        };

        coordinator::call("update_trusted_ue_list", |reply| {
            radio.update_trusted_ue_list(&list, reply)
        })
        .map_err(|e| {
            error!("Error in update_trusted_ue_list: {}", e);
            Errno::Perm
        })
    }

    pub fn set_peak_tx_power(&self, dbm: i8) -> Result<(), V2xError> {
        let manager = self.manager_or("set_peak_tx_power", V2xError::Fail)?;
        coordinator::call("set_peak_tx_power", |reply| {
            manager.set_peak_tx_power(dbm, reply)
        })
        .map_err(|e| {
            error!("Failed to set_peak_tx_power: {}", e);
            V2xError::Fail
        })?;
        debug!("set_peak_tx_power({}) succeeded", dbm);
        Ok(())
    }

    pub fn set_l2_filters(&self, filters: &[L2FilterInfo]) -> Result<(), V2xError> {
        let manager = self.manager_or("set_l2_filters", V2xError::Fail)?;
        if filters.is_empty() {
            error!("set_l2_filters: empty filter list");
            return Err(V2xError::Fail);
        }
        let filters = capped("L2 filter", filters, MAX_FILTER_IDS_LIST_LEN);

        coordinator::call("set_l2_filters", |reply| {
            manager.set_l2_filters(&filters, reply)
        })
        .map_err(|e| {
            error!("Failed to set_l2_filters: {}", e);
            V2xError::Fail
        })
    }

    pub fn remove_l2_filters(&self, l2_ids: &[u32]) -> Result<(), V2xError> {
        let manager = self.manager_or("remove_l2_filters", V2xError::Fail)?;
        if l2_ids.is_empty() {
            error!("remove_l2_filters: empty id list");
            return Err(V2xError::Fail);
        }
        let l2_ids = capped("L2 id", l2_ids, MAX_FILTER_IDS_LIST_LEN);

        coordinator::call("remove_l2_filters", |reply| {
            manager.remove_l2_filters(&l2_ids, reply)
        })
        .map_err(|e| {
            error!("Failed to remove_l2_filters: {}", e);
            V2xError::Fail
        })
    }

    /// Receive a report for every transmission on `port`
    pub fn register_tx_status_report_listener(
        &self,
        port: u16,
        listener: Arc<dyn TxReportListener>,
    ) -> Result<(), V2xError> {
        let radio = self.radio_or_not_ready("register_tx_status_report_listener")?;
        let adapter = Arc::new(TxReportAdapter { listener });

        coordinator::call("register_tx_status_report_listener", |reply| {
            radio.register_tx_status_report_listener(port, adapter, reply)
        })
        .map_err(|e| {
            error!("register listener with port {} failed: {}", port, e);
            V2xError::Fail
        })?;
        debug!("register listener with port {} succeeded", port);
        Ok(())
    }

    pub fn deregister_tx_status_report_listener(&self, port: u16) -> Result<(), V2xError> {
        let radio = self.radio_or_not_ready("deregister_tx_status_report_listener")?;
        coordinator::call("deregister_tx_status_report_listener", |reply| {
            radio.deregister_tx_status_report_listener(port, reply)
        })
        .map_err(|e| {
            error!("deregister listener with port {} failed: {}", port, e);
            V2xError::Fail
        })
    }

    pub fn set_global_ipaddr(&self, prefix_len: u8, addr: Ipv6Addr) -> Result<(), V2xError> {
        let radio = self.radio_or_not_ready("set_global_ipaddr")?;
        let info = Ipv6AddrInfo { prefix_len, addr };
        coordinator::call("set_global_ip_info", |reply| {
            radio.set_global_ip_info(info, reply)
        })
        .map_err(|e| {
            error!("Failed to set_global_ipaddr: {}", e);
            V2xError::Fail
        })
    }

    pub fn set_ip_routing_info(&self, dest_mac_addr: [u8; 6]) -> Result<(), V2xError> {
        let radio = self.radio_or_not_ready("set_ip_routing_info")?;
        let info = UnicastRoutingInfo { dest_mac_addr };
        coordinator::call("set_global_ip_unicast_routing_info", |reply| {
            radio.set_global_ip_unicast_routing_info(info, reply)
        })
        .map_err(|e| {
            error!("Failed to set_ip_routing_info: {}", e);
            V2xError::Fail
        })
    }

    /// Query the extended status from the backend
    pub fn get_ext_radio_status(&self) -> Result<RadioStatusEx, V2xError> {
        let manager = self.manager_or("get_ext_radio_status", V2xError::Fail)?;
        let status = coordinator::call("request_cv2x_status", |reply| {
            manager.request_cv2x_status(reply)
        })
        .map_err(|e| {
            error!("get_ext_radio_status: Get V2X Status failed: {}", e);
            V2xError::Fail
        })?;
        info!("get_ext_radio_status: Get V2X Status succeeded");
        Ok(convert_ext_radio_status(&status))
    }

    /// Install the extended status listener, or remove it with `None`
    ///
    /// A newly installed listener is notified with the next valid status
    /// even when the event does not change.
    pub fn register_ext_radio_status_listener(
        &self,
        listener: Option<Arc<dyn ExtStatusListener>>,
    ) -> Result<(), V2xError> {
        self.manager_or("register_ext_radio_status_listener", V2xError::Fail)?;

        let install = listener.is_some();
        *self
            .inner
            .ext_listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = listener;

        if install {
            self.inner.aggregator.arm_ext_initial();
            debug!("register_ext_radio_status_listener: registered");
        } else {
            self.inner.aggregator.disarm_ext_initial();
            debug!("register_ext_radio_status_listener: deregistered");
        }
        Ok(())
    }

    pub fn get_slss_rx_info(&self) -> Result<SlssRxInfo, V2xError> {
        let manager = self.manager_or("get_slss_rx_info", V2xError::Fail)?;
        let info = coordinator::call("get_slss_rx_info", |reply| manager.get_slss_rx_info(reply))
            .map_err(|e| {
                error!("get_slss_rx_info failed: {}", e);
                V2xError::Fail
            })?;
        Ok(convert_slss_rx_info(&info))
    }

    pub fn register_slss_rx_listener(
        &self,
        listener: Arc<dyn SlssRxListener>,
    ) -> Result<(), V2xError> {
        let manager = self.manager_or("register_slss_rx_listener", V2xError::Fail)?;
        let adapter: Arc<dyn Cv2xListener> = Arc::new(SlssAdapter {
            listener: Arc::clone(&listener),
        });

        let mut listeners = self
            .inner
            .slss_listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        manager
            .register_listener(Arc::clone(&adapter))
            .map_err(|e| {
                error!("register_slss_rx_listener failed: {}", e);
                V2xError::Fail
            })?;
        listeners.push((listener, adapter));
        debug!("register_slss_rx_listener succeeded");
        Ok(())
    }

    /// Remove a listener installed with `register_slss_rx_listener`
    pub fn deregister_slss_rx_listener(
        &self,
        listener: &Arc<dyn SlssRxListener>,
    ) -> Result<(), V2xError> {
        let manager = self.manager_or("deregister_slss_rx_listener", V2xError::Fail)?;

        let mut listeners = self
            .inner
            .slss_listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(pos) = listeners
            .iter()
            .position(|(l, _)| v2x_core::listener::same(l, listener))
        else {
            error!("deregister_slss_rx_listener: listener does not exist");
            return Err(V2xError::Fail);
        };

        manager
            .deregister_listener(&listeners[pos].1)
            .map_err(|e| {
                error!("deregister_slss_rx_listener failed: {}", e);
                V2xError::Fail
            })?;
        listeners.remove(pos);
        debug!("deregister_slss_rx_listener succeeded");
        Ok(())
    }

    /// Inject coarse UTC time, milliseconds since the epoch
    pub fn inject_coarse_utc_time(&self, utc_ms: u64) -> Result<(), V2xError> {
        let manager = self.manager_or("inject_coarse_utc_time", V2xError::RadioNotReady)?;
        coordinator::call("inject_coarse_utc_time", |reply| {
            manager.inject_coarse_utc_time(utc_ms, reply)
        })
        .map_err(|e| {
            error!("Failed to set coarse utc: {}", e);
            V2xError::Fail
        })
    }

    pub fn inject_vehicle_speed(&self, speed_kmph: u32) -> Result<(), V2xError> {
        let radio = self.radio_or_not_ready("inject_vehicle_speed")?;
        coordinator::call("inject_vehicle_speed", |reply| {
            radio.inject_vehicle_speed(speed_kmph, reply)
        })
        .map_err(|e| {
            error!("Failed to inject speed: {}", e);
            V2xError::Fail
        })
    }
}
