//! Network interface core data types
//!
//! This crate provides basic data type definitions used by other microdevt crates.
//! Stack users should not depend on this crate directly. Use `microdevt::core` reexport instead.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Interface state flag
///
/// The numeric encoding is the bit position inside [`IfFlags`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IfFlag {
    /// Administratively enabled
    Up = 0,
    /// Driver is attached and able to move packets
    Running = 1,
    /// Accept frames addressed to other stations
    Promisc = 2,
    /// No address resolution on this link
    NoArp = 3,
}

impl IfFlag {
    pub const MAX: IfFlag = IfFlag::NoArp;

    pub const fn try_from_u8(code: u8) -> Option<IfFlag> {
        match code {
            0 => Some(IfFlag::Up),
            1 => Some(IfFlag::Running),
            2 => Some(IfFlag::Promisc),
            3 => Some(IfFlag::NoArp),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<IfFlag> for u8 {
    fn from(value: IfFlag) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for IfFlag {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// A set of interface flags
///
/// Bits above [`IfFlag::MAX`] are reserved and never set by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IfFlags(u8);

impl IfFlags {
    pub const NONE: Self = Self(0);
    pub const UP: Self = Self::new_eq(IfFlag::Up);
    pub const RUNNING: Self = Self::new_eq(IfFlag::Running);
    pub const PROMISC: Self = Self::new_eq(IfFlag::Promisc);
    pub const NOARP: Self = Self::new_eq(IfFlag::NoArp);

    const VALID_BITS: u8 = u8::MAX >> (u8::BITS as u8 - 1 - IfFlag::MAX.into_u8());

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::VALID_BITS)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn new_eq(flag: IfFlag) -> Self {
        Self(1u8 << flag.into_u8())
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(&self, flag: IfFlag) -> bool {
        (self.0 >> flag.into_u8()) & 0x1 != 0
    }

    pub const fn contains_all(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn insert(&mut self, flag: IfFlag) {
        self.0 |= Self::new_eq(flag).0
    }

    pub const fn remove(&mut self, flag: IfFlag) {
        self.0 &= !Self::new_eq(flag).0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::NONE.0
    }

    /// Interface is both up and running
    pub const fn is_operational(&self) -> bool {
        self.contains_all(Self::UP.union(Self::RUNNING))
    }
}

impl Default for IfFlags {
    fn default() -> Self {
        IfFlags::NONE
    }
}

impl core::ops::BitAnd<IfFlags> for IfFlags {
    type Output = Self;
    fn bitand(self, rhs: IfFlags) -> Self::Output {
        IfFlags(self.0 & rhs.0)
    }
}

impl core::ops::BitOr<IfFlags> for IfFlags {
    type Output = Self;
    fn bitor(self, rhs: IfFlags) -> Self::Output {
        IfFlags(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign<IfFlags> for IfFlags {
    fn bitor_assign(&mut self, rhs: IfFlags) {
        self.0 |= rhs.0;
    }
}

impl From<IfFlag> for IfFlags {
    fn from(value: IfFlag) -> Self {
        Self::new_eq(value)
    }
}

/// Link type of an interface
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IfType {
    /// Wired, Ethernet-like link (tun/tap, ENC28J60, loop-back)
    Ethernet = 0,
    /// On/off-keyed sub-GHz radio link
    Rf = 1,
}

impl IfType {
    pub const fn try_from_u8(code: u8) -> Option<IfType> {
        match code {
            0 => Some(IfType::Ethernet),
            1 => Some(IfType::Rf),
            _ => None,
        }
    }

    /// Hardware address length used on this link type
    pub const fn hw_addr_len(self) -> usize {
        match self {
            IfType::Ethernet => HwAddr::ETHERNET_LEN,
            IfType::Rf => HwAddr::RF_LEN,
        }
    }
}

impl From<IfType> for u8 {
    fn from(value: IfType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for IfType {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Link-layer address
///
/// Ethernet-like links use 6 bytes, the RF link a single station byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HwAddr {
    bytes: [u8; HwAddr::MAX_LEN],
    len: u8,
}

impl HwAddr {
    pub const MAX_LEN: usize = 6;
    pub const ETHERNET_LEN: usize = 6;
    pub const RF_LEN: usize = 1;

    /// RF broadcast station
    pub const RF_BROADCAST: HwAddr = HwAddr::rf(u8::MAX);

    pub const fn ethernet(bytes: [u8; 6]) -> Self {
        Self {
            bytes,
            len: Self::ETHERNET_LEN as u8,
        }
    }

    pub const fn rf(station: u8) -> Self {
        Self {
            bytes: [station, 0, 0, 0, 0, 0],
            len: Self::RF_LEN as u8,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN {
            return None;
        }
        let mut addr = Self {
            bytes: [0; Self::MAX_LEN],
            len: bytes.len() as u8,
        };
        addr.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(addr)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl TryFrom<&[u8]> for HwAddr {
    type Error = InvalidValue;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(value).ok_or(InvalidValue)
    }
}

/// IPv4 address and network mask, network byte order
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ip4Config {
    pub addr: [u8; 4],
    pub mask: [u8; 4],
}

impl Ip4Config {
    pub const fn new(addr: [u8; 4], mask: [u8; 4]) -> Self {
        Self { addr, mask }
    }

    /// `other` is on the same network as this address
    pub fn is_local(&self, other: [u8; 4]) -> bool {
        self.addr
            .iter()
            .zip(other.iter())
            .zip(self.mask.iter())
            .all(|((a, b), m)| a & m == b & m)
    }
}
