//! Per-zone subnet layout inside the node CIDR
//!
//! For a /16 node range the layout is:
//! - workers: one /19 per zone, starting at the range base
//! - public: one /22 per zone, starting at `.96.0`
//! - internal: one /22 per zone, starting at `.112.0`
//!
//! Other prefix lengths scale the same offsets.

use std::str::FromStr;

use ipnet::Ipv4Net;
use kim_common::{Error, Result};

/// Zones that fit the layout
pub const MAX_ZONES: usize = 3;

const WORKER_PREFIX_DELTA: u8 = 3;
const LB_PREFIX_DELTA: u8 = 6;
const PUBLIC_BLOCK_OFFSET: usize = 24;
const INTERNAL_BLOCK_OFFSET: usize = 28;

/// Subnets assigned to one zone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneSubnets {
    /// Worker node subnet
    pub workers: Ipv4Net,
    /// Public load balancer subnet
    pub public: Ipv4Net,
    /// Internal load balancer subnet
    pub internal: Ipv4Net,
}

/// Parse a node CIDR, normalising host bits away
pub fn parse_cidr(provider: &str, cidr: &str) -> Result<Ipv4Net> {
    Ipv4Net::from_str(cidr)
        .map(|net| net.trunc())
        .map_err(|e| Error::conversion(provider, format!("invalid CIDR {cidr}: {e}")))
}

/// Compute subnets for `zone_count` zones of the given node range
pub fn plan(provider: &str, nodes: &str, zone_count: usize) -> Result<Vec<ZoneSubnets>> {
    if zone_count == 0 {
        return Err(Error::conversion(provider, "at least one zone is required"));
    }
    if zone_count > MAX_ZONES {
        return Err(Error::conversion(
            provider,
            format!("at most {MAX_ZONES} zones are supported, got {zone_count}"),
        ));
    }

    let base = parse_cidr(provider, nodes)?;
    let too_small = || {
        Error::conversion(
            provider,
            format!("node CIDR {base} is too small for the zone layout"),
        )
    };
    let worker_prefix = base
        .prefix_len()
        .checked_add(WORKER_PREFIX_DELTA)
        .filter(|p| *p <= 32)
        .ok_or_else(too_small)?;
    let lb_prefix = base
        .prefix_len()
        .checked_add(LB_PREFIX_DELTA)
        .filter(|p| *p <= 32)
        .ok_or_else(too_small)?;

    let workers: Vec<Ipv4Net> = base
        .subnets(worker_prefix)
        .map_err(|_| too_small())?
        .take(zone_count)
        .collect();
    let lb_blocks: Vec<Ipv4Net> = base.subnets(lb_prefix).map_err(|_| too_small())?.collect();

    (0..zone_count)
        .map(|i| {
            let public = lb_blocks.get(PUBLIC_BLOCK_OFFSET + i).ok_or_else(too_small)?;
            let internal = lb_blocks
                .get(INTERNAL_BLOCK_OFFSET + i)
                .ok_or_else(too_small)?;
            let workers = workers.get(i).ok_or_else(too_small)?;
            Ok(ZoneSubnets {
                workers: *workers,
                public: *public,
                internal: *internal,
            })
        })
        .collect()
}
