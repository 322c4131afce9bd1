//! Network interfaces
//!
//! An [`Iface`] binds a transport driver to the shared stack resources: the packet pool, an RX
//! and a TX ring, and the bottom-half scheduler. The driver is owned by value and reaches its
//! interface through the `iface` argument of every [`Driver`] call.
//!
//! Receive path:
//! * the driver completes a frame in interrupt context and calls [`Iface::schedule_receive`]
//! * the packet lands on the RX ring and, for interrupt-driven interfaces, a [`Task::Input`]
//!   is queued
//! * the main loop runs the task, [`Netif::input`] hands every queued packet to the
//!   installed [`Layer2`] handler
//!
//! Polled interfaces skip the task. The main loop calls [`Netif::recv`] and [`Netif::input`]
//! itself.
//!
//! Transmit path: [`Netif::output`] lets the layer-2 handler build the header, then calls
//! [`Netif::send`]. Drivers must neither block nor allocate in `send`. A transmitted packet is
//! handed back with [`Iface::schedule_tx_pkt_free`], so the release runs in the main loop.

mod loopback;

pub use loopback::Loopback;

use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::core::{HwAddr, IfFlag, IfFlags, IfType, Ip4Config};
use crate::pkt::{DynamicPool, Pkt};
use crate::ring::DynamicRing;
use crate::scheduler::{DynamicScheduler, Task};
use crate::timer::{TimerHandler, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IfError {
    /// Interface is not up and running
    Down,
    /// No layer-2 handler is installed
    NoLayer2,
    /// Transmit queue is full, the packet was dropped
    TxRingFull,
    /// Layer-2 handler refused the destination
    InvalidDestination,
}

/// Interface traffic counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IfStats {
    pub rx_packets: u32,
    pub rx_errors: u32,
    pub rx_dropped: u32,
    pub tx_packets: u32,
    pub tx_errors: u32,
    pub tx_dropped: u32,
}

/// Static interface parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IfConfig {
    pub kind: IfType,
    pub hw_addr: HwAddr,
    pub ip4: Option<Ip4Config>,
    /// Received packets schedule their own processing
    pub interrupt_driven: bool,
}

impl Default for IfConfig {
    fn default() -> Self {
        Self {
            kind: IfType::Ethernet,
            hw_addr: HwAddr::ethernet([0; 6]),
            ip4: None,
            interrupt_driven: true,
        }
    }
}

/// Type-agnostic interface access
///
/// Used by the scheduler and by layer-2 handlers.
pub trait Netif<'a> {
    fn kind(&self) -> IfType;
    fn hw_addr(&self) -> HwAddr;
    fn ip4(&self) -> Option<Ip4Config>;
    fn flags(&self) -> IfFlags;
    fn stats(&self) -> IfStats;
    /// Packet from the interface pool
    fn alloc(&self) -> Option<Pkt<'a>>;
    /// Driver-level transmission of a complete frame
    fn send(&'a self, pkt: Pkt<'a>) -> Result<(), IfError>;
    /// Layer-2 transmission of a payload
    fn output(&'a self, pkt: Pkt<'a>, proto: u8, dst: &[u8]) -> Result<(), IfError>;
    /// Driver pull hook for polled interfaces
    fn recv(&'a self);
    /// Processes received packets. Main loop only.
    fn input(&'a self);
}

/// Link-layer protocol handler
pub trait Layer2<'a> {
    /// Prepends the link header and sends the packet through `iface`
    fn output(
        &self,
        iface: &'a dyn Netif<'a>,
        pkt: Pkt<'a>,
        proto: u8,
        dst: &[u8],
    ) -> Result<(), IfError>;

    /// Consumes a received packet
    fn input(&self, iface: &'a dyn Netif<'a>, pkt: Pkt<'a>);
}

/// Transport driver
pub trait Driver<'a, M: RawMutex>: Sized {
    /// Queues or transmits a frame. Must not block.
    fn send(&self, iface: &'a Iface<'a, M, Self>, pkt: Pkt<'a>) -> Result<(), IfError>;

    fn recv(&self, _iface: &'a Iface<'a, M, Self>) {}

    fn on_timer(&self, _iface: &'a Iface<'a, M, Self>, _timer: TimerId) {}
}

pub struct Iface<'a, M: RawMutex, D> {
    config: IfConfig,
    flags: Mutex<M, Cell<IfFlags>>,
    stats: Mutex<M, Cell<IfStats>>,
    pool: &'a (dyn DynamicPool<'a> + Sync),
    rx: &'a (dyn DynamicRing<Pkt<'a>> + Sync),
    tx: &'a (dyn DynamicRing<Pkt<'a>> + Sync),
    scheduler: &'a (dyn DynamicScheduler<'a> + Sync),
    layer2: Option<&'a (dyn Layer2<'a> + Sync)>,
    driver: D,
}

impl<'a, M: RawMutex, D> Iface<'a, M, D> {
    /// Binds the interface to its resources. The interface starts up and running.
    ///
    /// No hardware is touched. Drivers that need timers are started separately.
    pub fn new(
        config: IfConfig,
        pool: &'a (dyn DynamicPool<'a> + Sync),
        rx: &'a (dyn DynamicRing<Pkt<'a>> + Sync),
        tx: &'a (dyn DynamicRing<Pkt<'a>> + Sync),
        scheduler: &'a (dyn DynamicScheduler<'a> + Sync),
        driver: D,
    ) -> Self {
        Self {
            config,
            flags: Mutex::new(Cell::new(IfFlags::UP | IfFlags::RUNNING)),
            stats: Mutex::new(Cell::new(IfStats::default())),
            pool,
            rx,
            tx,
            scheduler,
            layer2: None,
            driver,
        }
    }

    pub fn with_layer2(mut self, layer2: &'a (dyn Layer2<'a> + Sync)) -> Self {
        self.layer2 = Some(layer2);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &IfConfig {
        &self.config
    }

    pub fn flags(&self) -> IfFlags {
        self.flags.lock(Cell::get)
    }

    pub fn set_flag(&self, flag: IfFlag) {
        self.flags.lock(|flags| {
            let mut value = flags.get();
            value.insert(flag);
            flags.set(value);
        })
    }

    pub fn clear_flag(&self, flag: IfFlag) {
        self.flags.lock(|flags| {
            let mut value = flags.get();
            value.remove(flag);
            flags.set(value);
        })
    }

    pub fn stats(&self) -> IfStats {
        self.stats.lock(Cell::get)
    }

    pub fn update_stats(&self, f: impl FnOnce(&mut IfStats)) {
        self.stats.lock(|stats| {
            let mut value = stats.get();
            f(&mut value);
            stats.set(value);
        })
    }

    pub fn alloc(&self) -> Option<Pkt<'a>> {
        Pkt::alloc(self.pool)
    }

    pub fn pool(&self) -> &'a (dyn DynamicPool<'a> + Sync) {
        self.pool
    }

    pub fn rx_ring(&self) -> &'a (dyn DynamicRing<Pkt<'a>> + Sync) {
        self.rx
    }

    pub fn tx_ring(&self) -> &'a (dyn DynamicRing<Pkt<'a>> + Sync) {
        self.tx
    }

    /// Defers the release of a transmitted packet to the main loop
    pub fn schedule_tx_pkt_free(&self, pkt: Pkt<'a>) {
        self.scheduler.schedule_task(Task::FreePkt(pkt));
    }
}

impl<'a, M, D> Iface<'a, M, D>
where
    M: RawMutex + Sync + 'a,
    D: Driver<'a, M> + Sync + 'a,
{
    /// Hands a received packet over to the main loop. Safe to call from interrupt handlers.
    ///
    /// `None` reports a failed reception.
    pub fn schedule_receive(&'a self, pkt: Option<Pkt<'a>>) {
        let Some(pkt) = pkt else {
            self.update_stats(|stats| stats.rx_errors += 1);
            return;
        };

        if let Err(pkt) = self.rx.push(pkt) {
            trace!("RX ring full, {} bytes dropped", pkt.len());
            self.update_stats(|stats| stats.rx_dropped += 1);
            return;
        }
        self.update_stats(|stats| stats.rx_packets += 1);

        if self.config.interrupt_driven {
            self.scheduler.schedule_task(Task::Input(self));
        }
    }
}

impl<'a, M, D> Netif<'a> for Iface<'a, M, D>
where
    M: RawMutex + Sync + 'a,
    D: Driver<'a, M> + Sync + 'a,
{
    fn kind(&self) -> IfType {
        self.config.kind
    }

    fn hw_addr(&self) -> HwAddr {
        self.config.hw_addr
    }

    fn ip4(&self) -> Option<Ip4Config> {
        self.config.ip4
    }

    fn flags(&self) -> IfFlags {
        Iface::flags(self)
    }

    fn stats(&self) -> IfStats {
        Iface::stats(self)
    }

    fn alloc(&self) -> Option<Pkt<'a>> {
        Iface::alloc(self)
    }

    fn send(&'a self, pkt: Pkt<'a>) -> Result<(), IfError> {
        if !self.flags().contains(IfFlag::Up) {
            self.update_stats(|stats| stats.tx_dropped += 1);
            return Err(IfError::Down);
        }
        self.driver.send(self, pkt)
    }

    fn output(&'a self, pkt: Pkt<'a>, proto: u8, dst: &[u8]) -> Result<(), IfError> {
        let Some(layer2) = self.layer2 else {
            self.update_stats(|stats| stats.tx_errors += 1);
            return Err(IfError::NoLayer2);
        };
        layer2.output(self, pkt, proto, dst)
    }

    fn recv(&'a self) {
        self.driver.recv(self)
    }

    fn input(&'a self) {
        let deliver = self.flags().is_operational();
        while let Some(pkt) = self.rx.pop() {
            match self.layer2 {
                Some(layer2) if deliver => layer2.input(self, pkt),
                _ => {
                    self.update_stats(|stats| stats.rx_dropped += 1);
                    drop(pkt);
                }
            }
        }
    }
}

impl<'a, M, D> TimerHandler<'a> for Iface<'a, M, D>
where
    M: RawMutex + Sync + 'a,
    D: Driver<'a, M> + Sync + 'a,
{
    fn on_timer(&'a self, timer: TimerId) {
        self.driver.on_timer(self, timer)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::boxed::Box;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    use crate::pkt::PktPool;
    use crate::ring::Ring;
    use crate::scheduler::Scheduler;

    type M = CriticalSectionRawMutex;

    fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    /// Driver that records transmitted frames
    struct Capture {
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl Driver<'static, M> for Capture {
        fn send(
            &self,
            iface: &'static Iface<'static, M, Self>,
            pkt: Pkt<'static>,
        ) -> Result<(), IfError> {
            self.sent.lock().unwrap().push(pkt.data().to_vec());
            iface.update_stats(|stats| stats.tx_packets += 1);
            iface.schedule_tx_pkt_free(pkt);
            Ok(())
        }
    }

    /// One-byte header: protocol
    struct ProtoHeader {
        received: StdMutex<Vec<(u8, Vec<u8>)>>,
    }

    impl Layer2<'static> for ProtoHeader {
        fn output(
            &self,
            iface: &'static dyn Netif<'static>,
            mut pkt: Pkt<'static>,
            proto: u8,
            _dst: &[u8],
        ) -> Result<(), IfError> {
            let payload: Vec<u8> = pkt.data().to_vec();
            pkt.buf_mut().reset();
            pkt.buf_mut().addc(proto).unwrap();
            pkt.buf_mut().add(&payload).unwrap();
            iface.send(pkt)
        }

        fn input(&self, _iface: &'static dyn Netif<'static>, mut pkt: Pkt<'static>) {
            let proto = pkt.buf_mut().getc().unwrap();
            self.received
                .lock()
                .unwrap()
                .push((proto, pkt.data().to_vec()));
        }
    }

    struct Setup {
        iface: &'static Iface<'static, M, Capture>,
        pool: &'static PktPool<'static, M, 4>,
        scheduler: &'static Scheduler<'static, M, 8>,
        layer2: &'static ProtoHeader,
    }

    fn setup(interrupt_driven: bool, rx_capacity_one: bool) -> Setup {
        let pool = leak(PktPool::<M, 4>::new(std::vec![0u8; 128].leak(), 32));
        let scheduler = leak(Scheduler::<M, 8>::new());
        let rx: &'static (dyn DynamicRing<Pkt<'static>> + Sync) = if rx_capacity_one {
            leak(Ring::<M, Pkt<'static>, 1>::new())
        } else {
            leak(Ring::<M, Pkt<'static>, 4>::new())
        };
        let tx = leak(Ring::<M, Pkt<'static>, 4>::new());
        let layer2 = leak(ProtoHeader {
            received: StdMutex::new(Vec::new()),
        });
        let config = IfConfig {
            interrupt_driven,
            ..Default::default()
        };
        let capture = Capture {
            sent: StdMutex::new(Vec::new()),
        };
        let iface = Iface::new(config, pool, rx, tx, scheduler, capture).with_layer2(layer2);
        let iface = leak(iface);
        Setup {
            iface,
            pool,
            scheduler,
            layer2,
        }
    }

    fn make_pkt(setup: &Setup, data: &[u8]) -> Pkt<'static> {
        let mut pkt = setup.iface.alloc().unwrap();
        pkt.buf_mut().add(data).unwrap();
        pkt
    }

    #[test]
    fn test_new_iface_is_operational() {
        let setup = setup(true, false);
        assert!(setup.iface.flags().is_operational());
        assert_eq!(setup.iface.stats(), IfStats::default());
        assert_eq!(Netif::kind(setup.iface), IfType::Ethernet);
    }

    #[test]
    fn test_interrupt_driven_receive() {
        let setup = setup(true, false);
        let pkt = make_pkt(&setup, &[17, 1, 2, 3]);
        setup.iface.schedule_receive(Some(pkt));
        assert_eq!(setup.iface.stats().rx_packets, 1);
        assert!(setup.layer2.received.lock().unwrap().is_empty());

        assert_eq!(setup.scheduler.run_tasks(), 1);
        assert_eq!(
            *setup.layer2.received.lock().unwrap(),
            [(17, std::vec![1, 2, 3])]
        );
        assert_eq!(setup.pool.free_count(), 4);
    }

    #[test]
    fn test_polled_receive() {
        let setup = setup(false, false);
        setup.iface.schedule_receive(Some(make_pkt(&setup, &[6, 0])));
        assert_eq!(setup.scheduler.pending(), 0);

        setup.iface.input();
        assert_eq!(setup.layer2.received.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_receive_errors_and_drops() {
        let setup = setup(false, true);
        setup.iface.schedule_receive(None);
        setup.iface.schedule_receive(Some(make_pkt(&setup, &[1])));
        setup.iface.schedule_receive(Some(make_pkt(&setup, &[2])));

        let stats = setup.iface.stats();
        assert_eq!(stats.rx_errors, 1);
        assert_eq!(stats.rx_packets, 1);
        assert_eq!(stats.rx_dropped, 1);
        assert_eq!(setup.pool.free_count(), 3);
    }

    #[test]
    fn test_input_drops_when_down() {
        let setup = setup(true, false);
        setup.iface.clear_flag(IfFlag::Running);
        setup.iface.schedule_receive(Some(make_pkt(&setup, &[1])));
        setup.scheduler.run_tasks();

        assert!(setup.layer2.received.lock().unwrap().is_empty());
        assert_eq!(setup.iface.stats().rx_dropped, 1);
        assert_eq!(setup.pool.free_count(), 4);
    }

    #[test]
    fn test_output_through_layer2() {
        let setup = setup(true, false);
        let pkt = make_pkt(&setup, &[0xaa, 0xbb]);
        setup.iface.output(pkt, 3, &[]).unwrap();

        assert_eq!(
            *setup.iface.driver().sent.lock().unwrap(),
            [std::vec![3, 0xaa, 0xbb]]
        );
        assert_eq!(setup.iface.stats().tx_packets, 1);
        assert_eq!(setup.pool.free_count(), 3);
        setup.scheduler.run_tasks();
        assert_eq!(setup.pool.free_count(), 4);
    }

    #[test]
    fn test_send_when_down() {
        let setup = setup(true, false);
        setup.iface.clear_flag(IfFlag::Up);
        let pkt = make_pkt(&setup, &[1]);
        assert_eq!(setup.iface.send(pkt), Err(IfError::Down));
        assert_eq!(setup.iface.stats().tx_dropped, 1);
        assert_eq!(setup.pool.free_count(), 4);
    }
}
