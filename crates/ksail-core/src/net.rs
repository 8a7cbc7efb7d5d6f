//! IPv4 CIDR の計算

use crate::error::{CoreError, Result};
use std::net::Ipv4Addr;

/// IPv4 サブネット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn parse(cidr: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidCidr(cidr.to_string());
        let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 30 {
            return Err(invalid());
        }
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn broadcast(&self) -> u32 {
        u32::from(self.network) | (u32::MAX >> self.prefix)
    }

    /// ゲートウェイ（先頭の利用可能アドレス）
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) + 1)
    }

    /// レジストリ用の固定アドレス
    ///
    /// ノードは先頭側から割り当てられるため、末尾側から `index` 番目を使う。
    pub fn registry_address(&self, index: usize) -> Result<Ipv4Addr> {
        let exhausted = || CoreError::AddressExhausted {
            cidr: self.to_string(),
            index,
        };
        let last_usable = self.broadcast() - 1;
        let offset = u32::try_from(index).map_err(|_| exhausted())?;
        let candidate = last_usable.checked_sub(offset).ok_or_else(exhausted)?;
        // ゲートウェイと先頭のノードアドレスは避ける
        if candidate <= u32::from(self.gateway()) + 1 {
            return Err(exhausted());
        }
        Ok(Ipv4Addr::from(candidate))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_network() {
        let cidr = Ipv4Cidr::parse("10.5.0.17/24").unwrap();
        assert_eq!(cidr.to_string(), "10.5.0.0/24");
        assert_eq!(cidr.gateway(), Ipv4Addr::new(10, 5, 0, 1));
    }

    #[test]
    fn test_registry_addresses_from_the_top() {
        let cidr = Ipv4Cidr::parse("10.5.0.0/24").unwrap();
        assert_eq!(cidr.registry_address(0).unwrap(), Ipv4Addr::new(10, 5, 0, 254));
        assert_eq!(cidr.registry_address(3).unwrap(), Ipv4Addr::new(10, 5, 0, 251));
    }

    #[test]
    fn test_small_subnet_exhausts() {
        let cidr = Ipv4Cidr::parse("192.168.1.0/29").unwrap();
        // .1 gateway, .2 node, .3 - .6 registries
        assert_eq!(cidr.registry_address(3).unwrap(), Ipv4Addr::new(192, 168, 1, 3));
        assert!(cidr.registry_address(4).is_err());
    }

    #[test]
    fn test_invalid_cidrs() {
        assert!(Ipv4Cidr::parse("10.5.0.0").is_err());
        assert!(Ipv4Cidr::parse("10.5.0.0/31").is_err());
        assert!(Ipv4Cidr::parse("nope/24").is_err());
    }
}
