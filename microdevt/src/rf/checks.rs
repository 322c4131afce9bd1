use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use microdevt_driver::rf_io::RfInput;

use super::{Rf, RfError, Sender, Step};
use crate::byte::Byte;
use crate::iface::Iface;
use crate::pkt::Pkt;

const SEQUENCES: [&[u8]; 2] = [
    &[
        0x69, 0x70, 0x00, 0x10, 0xC8, 0xA0, 0x4B, 0xF7, 0x17, 0x7F, 0xE7, 0x81, 0x92, 0xE4, 0x0E,
        0xA3, 0x83, 0xE7, 0x29, 0x74, 0x34, 0x03,
    ],
    &[
        0x69, 0x70, 0x00, 0x10, 0xC8, 0xA0, 0x4B, 0xF7, 0x17, 0x7F, 0xE7, 0x81, 0x92, 0xE4, 0x0E,
        0xA3, 0x00,
    ],
];

/// Encoder self-test
///
/// Runs an independent sender over two reference sequences and decodes every emitted data bit.
/// The decoded stream must hold each sequence `burst + 1` times. The line is not touched.
pub fn checks<'a, M, I, O>(iface: &'a Iface<'a, M, Rf<'a, M, I, O>>) -> Result<(), RfError>
where
    M: RawMutex,
    I: RfInput,
    O: OutputPin,
{
    debug!("starting RF checks");
    let burst = iface.driver().config().burst;
    for data in SEQUENCES {
        check_sequence(iface, data, burst)?;
    }
    debug!("RF checks passed");
    Ok(())
}

fn check_sequence<'a, M: RawMutex, D>(
    iface: &'a Iface<'a, M, D>,
    data: &[u8],
    burst: u8,
) -> Result<(), RfError> {
    let mut pkt = iface.alloc().ok_or(RfError::NoBuffer)?;
    pkt.buf_mut().add(data).map_err(|_| RfError::Overflow)?;
    let mut recv = iface.alloc().ok_or(RfError::NoBuffer)?;

    let mut sender = Sender::new();
    sender.load(pkt, burst);
    let mut byte = Byte::new();
    loop {
        match sender.step() {
            Step::Busy => {}
            Step::Bit(bit) => {
                if let Some(c) = byte.add_bit(bit) {
                    recv.buf_mut().addc(c).map_err(|_| RfError::Overflow)?;
                }
            }
            Step::Done => break,
        }
    }
    drop(sender.finish());

    verify(&recv, data, burst)
}

fn verify(recv: &Pkt<'_>, data: &[u8], burst: u8) -> Result<(), RfError> {
    let expected = data.len() * (usize::from(burst) + 1);
    if recv.len() != expected {
        debug!("RF checks: received {} bytes, expected {}", recv.len(), expected);
        return Err(RfError::Length {
            expected,
            received: recv.len(),
        });
    }
    if recv.data().chunks(data.len()).any(|chunk| chunk != data) {
        debug!("RF checks: data mismatch");
        return Err(RfError::Mismatch);
    }
    Ok(())
}
