//! IP address and CIDR functions.
//!
//! `cidr('10.0.0.0/8').containsIP(ip('10.1.2.3'))`

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

use super::{arg, str_arg};
use crate::eval::{EvalError, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

/// Errors from parsing an address or prefix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("ParseAddr({input:?}): unable to parse IP")]
    InvalidAddress { input: String },

    #[error("ParseAddr({input:?}): IPv4-mapped IPv6 address is not allowed")]
    MappedAddress { input: String },

    #[error("netip.ParsePrefix({input:?}): no '/'")]
    MissingPrefix { input: String },

    #[error("netip.ParsePrefix({input:?}): bad bits after slash: {bits:?}")]
    InvalidPrefix { input: String, bits: String },
}

/// Parses an IP address, rejecting IPv4-mapped IPv6 forms.
pub fn parse_ip(input: &str) -> Result<IpAddr, AddressParseError> {
    let addr = IpAddr::from_str(input).map_err(|_| AddressParseError::InvalidAddress {
        input: input.to_string(),
    })?;
    if let IpAddr::V6(v6) = addr {
        if v6.to_ipv4_mapped().is_some() {
            return Err(AddressParseError::MappedAddress {
                input: input.to_string(),
            });
        }
    }
    Ok(addr)
}

fn bit_width(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn to_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(*v4)),
        IpAddr::V6(v6) => u128::from(*v6),
    }
}

/// Keeps the top `prefix` bits of a `width`-bit address.
fn mask_bits(bits: u128, prefix: u8, width: u8) -> u128 {
    if prefix == 0 {
        return 0;
    }
    let all = u128::MAX >> (128 - u32::from(width));
    let host = all.checked_shr(u32::from(prefix)).unwrap_or(0);
    bits & all & !host
}

/// An IP network: an address plus a prefix length.
///
/// The address is kept as written; [`Cidr::masked`] zeroes the host bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn parse(input: &str) -> Result<Self, AddressParseError> {
        let (addr, bits) = input
            .split_once('/')
            .ok_or_else(|| AddressParseError::MissingPrefix {
                input: input.to_string(),
            })?;
        let addr = parse_ip(addr)?;
        let invalid = || AddressParseError::InvalidPrefix {
            input: input.to_string(),
            bits: bits.to_string(),
        };
        let leading_zero = bits.len() > 1 && bits.starts_with('0');
        if bits.is_empty() || leading_zero || !bits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let prefix: u8 = bits.parse().map_err(|_| invalid())?;
        if prefix > bit_width(&addr) {
            return Err(invalid());
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// 4 or 6.
    pub fn family(&self) -> i64 {
        if self.is_ipv4() {
            4
        } else {
            6
        }
    }

    fn network_bits(&self, prefix: u8) -> u128 {
        mask_bits(to_bits(&self.addr), prefix, bit_width(&self.addr))
    }

    pub fn contains_ip(&self, ip: &IpAddr) -> bool {
        ip.is_ipv4() == self.is_ipv4()
            && mask_bits(to_bits(ip), self.prefix, bit_width(ip)) == self.network_bits(self.prefix)
    }

    /// True when every address of `other` is in `self`.
    pub fn contains_cidr(&self, other: &Cidr) -> bool {
        other.is_ipv4() == self.is_ipv4()
            && other.prefix >= self.prefix
            && other.network_bits(self.prefix) == self.network_bits(self.prefix)
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        let shortest = self.prefix.min(other.prefix);
        other.is_ipv4() == self.is_ipv4()
            && other.network_bits(shortest) == self.network_bits(shortest)
    }

    pub fn masked(&self) -> Cidr {
        let bits = self.network_bits(self.prefix);
        let addr = match self.addr {
            // Masked IPv4 bits fit in 32 bits.
            IpAddr::V4(_) => IpAddr::from(std::net::Ipv4Addr::from(bits as u32)),
            IpAddr::V6(_) => IpAddr::from(std::net::Ipv6Addr::from(bits)),
        };
        Cidr {
            addr,
            prefix: self.prefix,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

// ============================================================================
// Bindings
// ============================================================================

fn cidr_arg<'a>(args: &'a [Value], i: usize, function: &str) -> Result<&'a Cidr, EvalError> {
    match arg(args, i, function)? {
        Value::Cidr(c) => Ok(c),
        _ => Err(EvalError::no_matching_overload(function)),
    }
}

fn ip_arg(args: &[Value], i: usize, function: &str) -> Result<IpAddr, EvalError> {
    match arg(args, i, function)? {
        Value::Ip(ip) => Ok(*ip),
        _ => Err(EvalError::no_matching_overload(function)),
    }
}

fn string_to_cidr(args: &[Value]) -> Result<Value, EvalError> {
    let input = str_arg(args, 0, "cidr")?;
    Cidr::parse(input).map(Value::Cidr).map_err(|e| {
        EvalError::invalid_argument(format!("CIDR parse error during conversion from string: {}", e))
    })
}

fn string_to_ip(args: &[Value]) -> Result<Value, EvalError> {
    let input = str_arg(args, 0, "ip")?;
    parse_ip(input).map(Value::Ip).map_err(|e| {
        EvalError::invalid_argument(format!("IP parse error during conversion from string: {}", e))
    })
}

fn ip_predicate(name: &'static str, id: &str, test: fn(&IpAddr) -> bool) -> FunctionDecl {
    FunctionDecl::new(name).with_overload(
        OverloadDecl::method(id, vec![CelType::Ip], CelType::Bool)
            .with_impl(move |args| Ok(Value::Bool(test(&ip_arg(args, 0, name)?)))),
    )
}

pub(super) fn functions() -> Vec<FunctionDecl> {
    use CelType::{Bool, Cidr as CidrT, Int, Ip};

    vec![
        FunctionDecl::new("cidr").with_overload(
            OverloadDecl::function("string_to_cidr", vec![CelType::String], CidrT)
                .with_impl(string_to_cidr),
        ),
        FunctionDecl::new("isCIDR").with_overload(
            OverloadDecl::function("is_cidr", vec![CelType::String], Bool)
                .with_impl(|args| Ok(Value::Bool(Cidr::parse(str_arg(args, 0, "isCIDR")?).is_ok()))),
        ),
        FunctionDecl::new("ip")
            .with_overload(
                OverloadDecl::function("string_to_ip", vec![CelType::String], Ip)
                    .with_impl(string_to_ip),
            )
            .with_overload(
                OverloadDecl::method("cidr_ip", vec![CidrT], Ip)
                    .with_impl(|args| Ok(Value::Ip(cidr_arg(args, 0, "ip")?.addr()))),
            ),
        FunctionDecl::new("isIP").with_overload(
            OverloadDecl::function("is_ip", vec![CelType::String], Bool)
                .with_impl(|args| Ok(Value::Bool(parse_ip(str_arg(args, 0, "isIP")?).is_ok()))),
        ),
        FunctionDecl::new("containsIP").with_overload(
            OverloadDecl::method("cidr_contains_ip", vec![CidrT, Ip], Bool).with_impl(|args| {
                let cidr = cidr_arg(args, 0, "containsIP")?;
                Ok(Value::Bool(cidr.contains_ip(&ip_arg(args, 1, "containsIP")?)))
            }),
        ),
        FunctionDecl::new("containsCIDR").with_overload(
            OverloadDecl::method("cidr_contains_cidr", vec![CidrT, CidrT], Bool).with_impl(|args| {
                let cidr = cidr_arg(args, 0, "containsCIDR")?;
                Ok(Value::Bool(cidr.contains_cidr(cidr_arg(args, 1, "containsCIDR")?)))
            }),
        ),
        FunctionDecl::new("overlaps").with_overload(
            OverloadDecl::method("cidr_overlaps_cidr", vec![CidrT, CidrT], Bool).with_impl(|args| {
                let cidr = cidr_arg(args, 0, "overlaps")?;
                Ok(Value::Bool(cidr.overlaps(cidr_arg(args, 1, "overlaps")?)))
            }),
        ),
        FunctionDecl::new("prefixLength").with_overload(
            OverloadDecl::method("cidr_prefix_length", vec![CidrT], Int).with_impl(|args| {
                Ok(Value::Int(i64::from(cidr_arg(args, 0, "prefixLength")?.prefix_len())))
            }),
        ),
        FunctionDecl::new("masked").with_overload(
            OverloadDecl::method("cidr_masked", vec![CidrT], CidrT)
                .with_impl(|args| Ok(Value::Cidr(cidr_arg(args, 0, "masked")?.masked()))),
        ),
        FunctionDecl::new("family").with_overload(
            OverloadDecl::method("ip_family", vec![Ip], Int).with_impl(|args| {
                Ok(Value::Int(if ip_arg(args, 0, "family")?.is_ipv4() { 4 } else { 6 }))
            }),
        ),
        ip_predicate("is4", "ip_is4", IpAddr::is_ipv4),
        ip_predicate("is6", "ip_is6", IpAddr::is_ipv6),
        ip_predicate("isLoopback", "ip_is_loopback", IpAddr::is_loopback),
    ]
}
