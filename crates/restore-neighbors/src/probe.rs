//! Reachability probes.
//!
//! Each restored entry gets one probe so the kernel moves it out of STALE
//! quickly: an ARP request unicast to the recorded MAC for IPv4, a neighbor
//! solicitation to the solicited-node multicast group for IPv6.
//!
//! ```text
//! ARP   | eth dst=target mac | 0x0806 | who-has target tell source        |
//! NS    | eth dst=33:33:ffxx | 0x86dd | IPv6 hop=255 | ICMPv6 135 + SLLAO |
//! ```

use byteorder::{BigEndian, ByteOrder};
use sonic_warmrestart_common::MacAddress;
use std::ffi::CString;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::{RestoreError, Result};

pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_OP_REQUEST: u16 = 1;
const IPPROTO_ICMPV6: u8 = 58;
const ICMPV6_NEIGHBOR_SOLICIT: u8 = 135;
const ND_OPT_SOURCE_LINKADDR: u8 = 1;
const ND_HOP_LIMIT: u8 = 255;

/// Minimum Ethernet frame size without FCS.
const ETH_MIN_FRAME_LEN: usize = 60;

/// Source side of a probe, taken from the egress interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSource {
    pub mac: MacAddress,
    pub ip: IpAddr,
}

/// Builds one probe frame for a target.
pub trait ProbeBuilder: Send + Sync {
    fn build(&self, source: &ProbeSource, target_ip: IpAddr, target_mac: MacAddress) -> Result<Vec<u8>>;
}

/// Link-level frames for Ethernet interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthernetProbeBuilder;

impl ProbeBuilder for EthernetProbeBuilder {
    fn build(&self, source: &ProbeSource, target_ip: IpAddr, target_mac: MacAddress) -> Result<Vec<u8>> {
        match (source.ip, target_ip) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => Ok(arp_request(source.mac, src, dst, target_mac)),
            (IpAddr::V6(src), IpAddr::V6(dst)) => Ok(neighbor_solicitation(source.mac, src, dst)),
            (src, dst) => Err(RestoreError::Probe(format!(
                "source {} and target {} are different families",
                src, dst
            ))),
        }
    }
}

const ETH_HEADER_LEN: usize = 14;
const ARP_PAYLOAD_LEN: usize = 28;
const IPV6_HEADER_LEN: usize = 40;
/// NS header, target address and one SLLAO option.
const NS_MESSAGE_LEN: usize = 32;

fn ethernet_header(frame: &mut [u8], dst: MacAddress, src: MacAddress, ethertype: u16) {
    frame[0..6].copy_from_slice(dst.as_bytes());
    frame[6..12].copy_from_slice(src.as_bytes());
    BigEndian::write_u16(&mut frame[12..14], ethertype);
}

/// ARP who-has `target_ip`, addressed directly to `target_mac`.
pub fn arp_request(src_mac: MacAddress, src_ip: Ipv4Addr, target_ip: Ipv4Addr, target_mac: MacAddress) -> Vec<u8> {
    let mut frame = vec![0u8; ETH_MIN_FRAME_LEN];
    ethernet_header(&mut frame, target_mac, src_mac, ETHERTYPE_ARP);

    let arp = &mut frame[ETH_HEADER_LEN..ETH_HEADER_LEN + ARP_PAYLOAD_LEN];
    BigEndian::write_u16(&mut arp[0..2], ARP_HTYPE_ETHERNET);
    BigEndian::write_u16(&mut arp[2..4], ETHERTYPE_IPV4);
    arp[4] = 6;
    arp[5] = 4;
    BigEndian::write_u16(&mut arp[6..8], ARP_OP_REQUEST);
    arp[8..14].copy_from_slice(src_mac.as_bytes());
    arp[14..18].copy_from_slice(&src_ip.octets());
    // Target hardware address stays zero.
    arp[24..28].copy_from_slice(&target_ip.octets());
    frame
}

/// Solicited-node multicast group of `target` (ff02::1:ffXX:XXXX).
pub fn solicited_node_multicast(target: &Ipv6Addr) -> Ipv6Addr {
    let o = target.octets();
    Ipv6Addr::new(
        0xff02,
        0,
        0,
        0,
        0,
        1,
        0xff00 | u16::from(o[13]),
        (u16::from(o[14]) << 8) | u16::from(o[15]),
    )
}

/// Neighbor solicitation for `target` with a source link-layer address option.
pub fn neighbor_solicitation(src_mac: MacAddress, src_ip: Ipv6Addr, target: Ipv6Addr) -> Vec<u8> {
    let group = solicited_node_multicast(&target);

    let mut icmp = [0u8; NS_MESSAGE_LEN];
    icmp[0] = ICMPV6_NEIGHBOR_SOLICIT;
    icmp[8..24].copy_from_slice(&target.octets());
    icmp[24] = ND_OPT_SOURCE_LINKADDR;
    icmp[25] = 1;
    icmp[26..32].copy_from_slice(src_mac.as_bytes());
    let checksum = icmpv6_checksum(&src_ip, &group, &icmp);
    BigEndian::write_u16(&mut icmp[2..4], checksum);

    let mut frame = vec![0u8; ETH_HEADER_LEN + IPV6_HEADER_LEN + NS_MESSAGE_LEN];
    ethernet_header(&mut frame, MacAddress::ipv6_multicast(&group), src_mac, ETHERTYPE_IPV6);

    let ip = &mut frame[ETH_HEADER_LEN..ETH_HEADER_LEN + IPV6_HEADER_LEN];
    BigEndian::write_u32(&mut ip[0..4], 6 << 28);
    BigEndian::write_u16(&mut ip[4..6], NS_MESSAGE_LEN as u16);
    ip[6] = IPPROTO_ICMPV6;
    ip[7] = ND_HOP_LIMIT;
    ip[8..24].copy_from_slice(&src_ip.octets());
    ip[24..40].copy_from_slice(&group.octets());

    frame[ETH_HEADER_LEN + IPV6_HEADER_LEN..].copy_from_slice(&icmp);
    frame
}

/// ICMPv6 checksum over the IPv6 pseudo-header and `message`.
pub fn icmpv6_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, message: &[u8]) -> u16 {
    let mut pseudo = vec![0u8; IPV6_HEADER_LEN + message.len()];
    pseudo[0..16].copy_from_slice(&src.octets());
    pseudo[16..32].copy_from_slice(&dst.octets());
    BigEndian::write_u32(&mut pseudo[32..36], message.len() as u32);
    pseudo[39] = IPPROTO_ICMPV6;
    pseudo[IPV6_HEADER_LEN..].copy_from_slice(message);

    let mut sum: u32 = pseudo
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(BigEndian::read_u16(&[*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// An open transmit handle bound to one interface. Closed on drop.
pub trait ProbeSocket: Send {
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// Opens transmit handles.
pub trait ProbeTransmitter: Send + Sync {
    fn open(&self, interface: &str) -> Result<Box<dyn ProbeSocket>>;
}

/// `AF_PACKET` raw socket transmitter. Needs `CAP_NET_RAW`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSocketTransmitter;

impl ProbeTransmitter for RawSocketTransmitter {
    fn open(&self, interface: &str) -> Result<Box<dyn ProbeSocket>> {
        Ok(Box::new(PacketSocket::bind(interface)?))
    }
}

/// Raw link-layer socket bound to an interface.
#[derive(Debug)]
pub struct PacketSocket {
    interface: String,
    fd: OwnedFd,
}

impl PacketSocket {
    pub fn bind(interface: &str) -> Result<Self> {
        let transmit_err = |source: io::Error| RestoreError::Transmit {
            interface: interface.to_string(),
            source,
        };

        let name = CString::new(interface)
            .map_err(|_| transmit_err(io::Error::from(io::ErrorKind::InvalidInput)))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(transmit_err(io::Error::last_os_error()));
        }

        // Send-only socket: protocol 0 receives nothing.
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(transmit_err(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = ifindex as libc::c_int;
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(transmit_err(io::Error::last_os_error()));
        }

        Ok(Self {
            interface: interface.to_string(),
            fd,
        })
    }
}

impl ProbeSocket for PacketSocket {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let sent = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if sent < 0 {
            return Err(RestoreError::Transmit {
                interface: self.interface.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}
