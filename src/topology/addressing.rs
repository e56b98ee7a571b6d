//! Fixed addressing plan.
//!
//! Segment `d` is `172.16.d.0/24`; the endpoint on it is `.10`, the router
//! `.1`. Digits are limited to 0..=9 so every generated string has a fixed
//! shape.

use crate::error::{AppError, Result};

pub const CLIENT_DIGIT: u8 = 1;
pub const SERVER_DIGIT: u8 = 2;
pub const PREFIX_LEN: u8 = 24;

fn check_digit(digit: u8) -> Result<u8> {
    if digit <= 9 {
        Ok(digit)
    } else {
        Err(AppError::validation(format!(
            "Address digit must be between 0 and 9, got {}",
            digit
        )))
    }
}

/// Endpoint address in CIDR form, e.g. `172.16.1.10/24`
pub fn host_ip(digit: u8) -> Result<String> {
    let d = check_digit(digit)?;
    Ok(format!("172.16.{}.10/{}", d, PREFIX_LEN))
}

/// Endpoint MAC, e.g. `00:00:00:00:00:01`
pub fn host_mac(digit: u8) -> Result<String> {
    let d = check_digit(digit)?;
    Ok(format!("00:00:00:00:00:0{}", d))
}

/// Router interface address facing segment `digit`, e.g. `172.16.1.1/24`
pub fn router_ip(digit: u8) -> Result<String> {
    let d = check_digit(digit)?;
    Ok(format!("172.16.{}.1/{}", d, PREFIX_LEN))
}

/// Router interface MAC facing segment `digit`, e.g. `00:00:00:00:01:01`
pub fn router_mac(digit: u8) -> Result<String> {
    let d = check_digit(digit)?;
    Ok(format!("00:00:00:00:01:0{}", d))
}

/// Network of segment `digit`, e.g. `172.16.2.0/24`
pub fn subnet(digit: u8) -> Result<String> {
    let d = check_digit(digit)?;
    Ok(format!("172.16.{}.0/{}", d, PREFIX_LEN))
}

/// Address without its prefix length
pub fn bare(cidr: &str) -> &str {
    cidr.split('/').next().unwrap_or(cidr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_addresses() {
        assert_eq!(host_ip(1).unwrap(), "172.16.1.10/24");
        assert_eq!(host_ip(2).unwrap(), "172.16.2.10/24");
        assert_eq!(host_mac(2).unwrap(), "00:00:00:00:00:02");
        assert_eq!(router_ip(1).unwrap(), "172.16.1.1/24");
        assert_eq!(router_mac(2).unwrap(), "00:00:00:00:01:02");
        assert_eq!(subnet(2).unwrap(), "172.16.2.0/24");
        assert_eq!(bare("172.16.1.10/24"), "172.16.1.10");
        assert_eq!(bare("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_generators_are_injective() {
        for generator in [host_ip, host_mac, router_ip, router_mac] {
            let values: HashSet<String> = (0..=9).map(|d| generator(d).unwrap()).collect();
            assert_eq!(values.len(), 10);
        }
    }

    #[test]
    fn test_generated_addresses_parse() {
        for d in 0..=9 {
            assert!(bare(&host_ip(d).unwrap()).parse::<std::net::Ipv4Addr>().is_ok());
            assert_eq!(host_mac(d).unwrap().len(), 17);
            assert_eq!(router_mac(d).unwrap().len(), 17);
        }
    }

    proptest! {
        #[test]
        fn prop_out_of_range_digits_rejected(d in 10u8..=255) {
            prop_assert!(host_ip(d).is_err());
            prop_assert!(host_mac(d).is_err());
            prop_assert!(router_ip(d).is_err());
            prop_assert!(router_mac(d).is_err());
        }
    }
}
