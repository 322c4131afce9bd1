use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{Driver, IfError, Iface};
use crate::pkt::Pkt;

/// Wired driver that feeds every transmitted frame back to its own receive path
#[derive(Debug, Default, Clone, Copy)]
pub struct Loopback;

impl<'a, M: RawMutex + Sync + 'a> Driver<'a, M> for Loopback {
    fn send(&self, iface: &'a Iface<'a, M, Self>, pkt: Pkt<'a>) -> Result<(), IfError> {
        iface.update_stats(|stats| stats.tx_packets += 1);
        iface.schedule_receive(Some(pkt));
        Ok(())
    }
}
