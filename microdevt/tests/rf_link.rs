use core::convert::Infallible;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use microdevt::core::{HwAddr, IfType};
use microdevt::iface::{IfConfig, IfError, Iface, Layer2, Netif};
use microdevt::pkt::{Pkt, PktPool};
use microdevt::rf::{self, Rf, RfConfig};
use microdevt::rf_io::DigitalInput;
use microdevt::ring::Ring;
use microdevt::scheduler::Scheduler;
use microdevt::time::{Duration, Instant};
use microdevt::timer::Timers;
use std::boxed::Box;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::vec::Vec;

type M = CriticalSectionRawMutex;
type RfIface = Iface<'static, M, Rf<'static, M, DigitalInput<WireIn>, WireOut>>;

const SAMPLING_US: u64 = 150;
const DATA: [u8; 5] = [0x69, 0x70, 0x00, 0xe7, 0x81];
const REFERENCE: [u8; 22] = [
    0x69, 0x70, 0x00, 0x10, 0xC8, 0xA0, 0x4B, 0xF7, 0x17, 0x7F, 0xE7, 0x81, 0x92, 0xE4, 0x0E, 0xA3,
    0x83, 0xE7, 0x29, 0x74, 0x34, 0x03,
];

struct WireIn(&'static AtomicBool);

impl ErrorType for WireIn {
    type Error = Infallible;
}

impl InputPin for WireIn {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.load(Ordering::SeqCst))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.load(Ordering::SeqCst))
    }
}

struct WireOut(&'static AtomicBool);

impl ErrorType for WireOut {
    type Error = Infallible;
}

impl OutputPin for WireOut {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Capture {
    frames: StdMutex<Vec<Vec<u8>>>,
}

impl Layer2<'static> for Capture {
    fn output(
        &self,
        iface: &'static dyn Netif<'static>,
        pkt: Pkt<'static>,
        _proto: u8,
        _dst: &[u8],
    ) -> Result<(), IfError> {
        iface.send(pkt)
    }

    fn input(&self, _iface: &'static dyn Netif<'static>, pkt: Pkt<'static>) {
        self.frames.lock().unwrap().push(pkt.data().to_vec());
    }
}

struct Station {
    iface: &'static RfIface,
    pool: &'static PktPool<'static, M, 4>,
    capture: &'static Capture,
}

struct Link {
    sender: Station,
    receiver: Station,
    timers: &'static Timers<'static, M, 4>,
    scheduler: &'static Scheduler<'static, M, 16>,
    now: Instant,
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn make_station(
    config: RfConfig,
    station: u8,
    line_in: &'static AtomicBool,
    line_out: &'static AtomicBool,
    scheduler: &'static Scheduler<'static, M, 16>,
) -> Station {
    let pool = leak(PktPool::<M, 4>::new(vec![0u8; 4 * 128].leak(), 128));
    let rx = leak(Ring::<M, Pkt<'static>, 4>::new());
    let tx = leak(Ring::<M, Pkt<'static>, 1>::new());
    let capture = leak(Capture {
        frames: StdMutex::new(Vec::new()),
    });
    let if_config = IfConfig {
        kind: IfType::Rf,
        hw_addr: HwAddr::rf(station),
        ..Default::default()
    };
    let rf = Rf::new(config, DigitalInput::new(WireIn(line_in)), WireOut(line_out));
    let iface = leak(Iface::new(if_config, pool, rx, tx, scheduler, rf).with_layer2(capture));
    Station {
        iface,
        pool,
        capture,
    }
}

fn make_link(burst: u8) -> Link {
    let config = RfConfig::new(SAMPLING_US, burst);
    make_link_with(config, config)
}

/// Stations with their own clocks
fn make_link_with(sender_config: RfConfig, receiver_config: RfConfig) -> Link {
    let air = leak(AtomicBool::new(false));
    let quiet = leak(AtomicBool::new(false));
    let unused = leak(AtomicBool::new(false));
    let scheduler = leak(Scheduler::new());
    let timers = leak(Timers::new());

    let sender = make_station(sender_config, 1, quiet, air, scheduler);
    let receiver = make_station(receiver_config, 2, air, unused, scheduler);
    rf::init(sender.iface, timers).unwrap();
    rf::init(receiver.iface, timers).unwrap();

    Link {
        sender,
        receiver,
        timers,
        scheduler,
        now: Instant::from_ticks(0),
    }
}

impl Link {
    fn tick(&mut self) {
        self.now += Duration::from_micros(SAMPLING_US);
        self.timers.run(self.now);
        self.scheduler.run_tasks();
    }

    /// Runs until the sender is quiet and the line settled
    fn run_until_sent(&mut self) {
        let mut ticks = 0;
        while self.sender.iface.driver().is_sending() {
            self.tick();
            ticks += 1;
            assert!(ticks < 20_000, "transmission does not end");
        }
        for _ in 0..100 {
            self.tick();
        }
    }

    /// Same as [`Link::run_until_sent`] with a 1 us time step
    fn run_fine_until_sent(&mut self) {
        let step = Duration::from_micros(1);
        let mut elapsed = Duration::from_ticks(0);
        loop {
            self.now += step;
            elapsed += step;
            self.timers.run(self.now);
            self.scheduler.run_tasks();
            if !self.sender.iface.driver().is_sending() {
                break;
            }
            assert!(elapsed < Duration::from_secs(3), "transmission does not end");
        }
        for _ in 0..20_000 {
            self.now += step;
            self.timers.run(self.now);
            self.scheduler.run_tasks();
        }
    }

    fn send(&self, data: &[u8]) -> Result<(), IfError> {
        let mut pkt = self.sender.iface.alloc().unwrap();
        pkt.buf_mut().add(data).unwrap();
        self.sender.iface.send(pkt)
    }
}

#[test]
fn test_burst_copies_arrive() {
    for burst in [0, 1, 3] {
        let mut link = make_link(burst);
        link.send(&DATA).unwrap();
        link.run_until_sent();

        let frames = link.receiver.capture.frames.lock().unwrap();
        assert_eq!(frames.len(), usize::from(burst) + 1, "burst {burst}");
        assert!(frames.iter().all(|frame| frame == &DATA));

        let stats = link.receiver.iface.stats();
        assert_eq!(stats.rx_packets, u32::from(burst) + 1);
        assert_eq!(stats.rx_errors, 0);
        assert_eq!(link.sender.iface.stats().tx_packets, 1);
    }
}

#[test]
fn test_pool_restored_after_transmission() {
    let mut link = make_link(2);
    let free = link.sender.pool.free_count();

    link.send(&DATA).unwrap();
    assert_eq!(link.sender.pool.free_count(), free - 1);
    link.run_until_sent();

    assert_eq!(link.sender.pool.free_count(), free);
    assert_eq!(link.receiver.pool.free_count(), link.receiver.pool.capacity());
    assert_eq!(link.scheduler.dropped(), 0);
}

#[test]
fn test_send_and_sample_timers_exclusive() {
    let mut link = make_link(1);
    let (rcv, snd) = link.sender.iface.driver().timer_ids().unwrap();
    assert!(link.timers.is_pending(rcv));
    assert!(!link.timers.is_pending(snd));

    link.send(&DATA).unwrap();
    while link.sender.iface.driver().is_sending() {
        assert!(!link.timers.is_pending(rcv));
        assert!(link.timers.is_pending(snd));
        link.tick();
    }

    assert!(link.timers.is_pending(rcv));
    assert!(!link.timers.is_pending(snd));
}

#[test]
fn test_queued_packets_follow() {
    let mut link = make_link(0);
    link.send(&DATA).unwrap();
    link.send(&DATA[..2]).unwrap();
    assert_eq!(link.send(&DATA[..1]), Err(IfError::TxRingFull));
    assert_eq!(link.sender.iface.stats().tx_dropped, 1);

    link.run_until_sent();

    let frames = link.receiver.capture.frames.lock().unwrap();
    assert_eq!(*frames, [DATA.to_vec(), DATA[..2].to_vec()]);
    assert_eq!(link.sender.iface.stats().tx_packets, 2);
    assert_eq!(link.sender.pool.free_count(), 4);
}

#[test]
fn test_shutdown_stops_modem() {
    let mut link = make_link(0);
    link.send(&DATA).unwrap();
    for _ in 0..50 {
        link.tick();
    }
    assert!(link.sender.iface.driver().is_sending());

    rf::shutdown(link.sender.iface);
    let (rcv, snd) = link.sender.iface.driver().timer_ids().unwrap();
    assert!(!link.timers.is_pending(rcv));
    assert!(!link.timers.is_pending(snd));
    assert!(!link.sender.iface.driver().is_sending());
    assert_eq!(link.sender.pool.free_count(), 4);

    rf::init(link.sender.iface, link.timers).unwrap();
    assert_eq!(link.sender.iface.driver().timer_ids(), Some((rcv, snd)));
    link.send(&DATA).unwrap();
    link.run_until_sent();
    assert!(link.receiver.capture.frames.lock().unwrap().contains(&DATA.to_vec()));
}

#[test]
fn test_self_check() {
    let link = make_link(2);
    assert_eq!(rf::checks(link.sender.iface), Ok(()));
    assert_eq!(link.sender.pool.free_count(), 4);
}

#[test]
fn test_reference_sequence_over_air() {
    for burst in [0, 2] {
        let mut link = make_link(burst);
        link.send(&REFERENCE).unwrap();
        link.run_until_sent();

        let frames = link.receiver.capture.frames.lock().unwrap();
        assert_eq!(frames.len(), usize::from(burst) + 1, "burst {burst}");
        assert!(frames.iter().all(|frame| frame == &REFERENCE));
        assert_eq!(link.receiver.iface.stats().rx_errors, 0);
    }
}

#[test]
fn test_receiver_clock_drift() {
    let sender_config = RfConfig::new(SAMPLING_US, 1);
    for sampling_us in [146, 148, 150, 152, 154] {
        let mut link = make_link_with(sender_config, RfConfig::new(sampling_us, 1));
        link.send(&DATA).unwrap();
        link.run_fine_until_sent();

        let frames = link.receiver.capture.frames.lock().unwrap();
        assert_eq!(*frames, [DATA.to_vec(), DATA.to_vec()], "sampling {sampling_us} us");
        assert_eq!(link.receiver.iface.stats().rx_errors, 0);
    }
}

#[test]
fn test_reinit_while_sending() {
    let mut link = make_link(0);
    let (rcv, snd) = link.sender.iface.driver().timer_ids().unwrap();
    link.send(&DATA).unwrap();
    for _ in 0..10 {
        link.tick();
    }

    rf::init(link.sender.iface, link.timers).unwrap();
    assert!(link.sender.iface.driver().is_sending());
    assert!(!link.timers.is_pending(rcv));
    assert!(link.timers.is_pending(snd));

    link.run_until_sent();
    assert!(link.timers.is_pending(rcv));
    assert!(!link.timers.is_pending(snd));
    assert_eq!(*link.receiver.capture.frames.lock().unwrap(), [DATA.to_vec()]);
}
