//! Which update strategy applies to a container.

use crate::selector::LabelSelector;
use crate::types::ContainerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Stop, remove, create, start.  Briefly unavailable.
    Recreate,
    /// Create beside the old container, wait for health, then switch.
    Rolling,
}

/// Two containers cannot hold the same host ports or the host network
/// stack at once, so only containers without either may overlap with
/// their replacement.  Opting in is still required through the label.
pub fn rolling_eligible(
    host_network: bool,
    publish_all_ports: bool,
    has_port_bindings: bool,
    label_match: bool,
) -> bool {
    !host_network && !publish_all_ports && !has_port_bindings && label_match
}

/// A container without host config data is treated as conflict-free.
pub fn select_strategy(record: &ContainerRecord, rolling_label: &LabelSelector) -> Strategy {
    let eligible = rolling_eligible(
        record.host_network(),
        record.publishes_all_ports(),
        record.has_port_bindings(),
        rolling_label.matches(record.labels()),
    );
    if eligible {
        Strategy::Rolling
    } else {
        Strategy::Recreate
    }
}
