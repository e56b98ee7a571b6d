//! Queueing-discipline parameter derivation.
//!
//! Everything here is pure arithmetic and string building so that the
//! derived values can be checked without touching an interface.

use crate::types::QueuePolicy;

/// Assumed average packet size for RED, in bytes
pub const RED_AVPKT: u64 = 1000;

/// Smallest RED hard limit for which the EWMA constant can be computed
pub const RED_MIN_LIMIT: u64 = RED_AVPKT * 3 * 4 * 4;

pub const MTU: u64 = 1500;

/// sch_htb rejects quanta larger than this
pub const HTB_MAX_QUANTUM: u64 = 200_000;

/// Default HTB rate-to-quantum ratio
pub const HTB_R2Q: u64 = 10;

/// Burst allowance of the policer, in milliseconds
pub const POLICER_BURST_MS: u64 = 10;

/// Bandwidth-delay product in bytes.
///
/// The round trip is twice the sum of both one-way segment delays; the rate
/// is the slower segment. Pass `delay2_ms = 0` and `bw2 = bw1` for a single
/// segment.
pub fn calculate_bdp(delay1_ms: u32, delay2_ms: u32, bw1_mbps: u32, bw2_mbps: u32) -> f64 {
    let rtt_ms = 2.0 * (f64::from(delay1_ms) + f64::from(delay2_ms));
    let bw_mbps = f64::from(bw1_mbps.min(bw2_mbps));
    rtt_ms * bw_mbps * 1_000_000.0 / 1000.0 / 8.0
}

/// HTB quantum for a class of rate `bw_mbps`
pub fn htb_quantum(bw_mbps: u32) -> u64 {
    let bytes_per_sec = u64::from(bw_mbps) * 1_000_000 / 8;
    (bytes_per_sec / HTB_R2Q).min(HTB_MAX_QUANTUM)
}

/// Rate of the HTB class. A policer needs the class to be looser than
/// itself, so the ceiling is doubled.
pub fn htb_rate(bw_mbps: u32, policy: QueuePolicy) -> u64 {
    match policy {
        QueuePolicy::Policer => 2 * u64::from(bw_mbps),
        _ => u64::from(bw_mbps),
    }
}

/// Policer bucket size in bytes
pub fn policer_burst(bw_mbps: u32) -> u64 {
    u64::from(bw_mbps) * POLICER_BURST_MS * 1000 / 8
}

/// Derived RED thresholds, all in bytes except `burst` (packets)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedParams {
    pub limit: u64,
    pub qmin: u64,
    pub qmax: u64,
    pub avpkt: u64,
    pub burst: u64,
}

impl RedParams {
    pub fn derive(bdp: f64) -> Self {
        let limit = ((bdp * 4.0) as u64).max(RED_MIN_LIMIT);
        let qmax = limit / 4;
        let qmin = qmax / 3;
        Self {
            limit,
            qmin,
            qmax,
            avpkt: RED_AVPKT,
            burst: 1 + qmin / RED_AVPKT,
        }
    }
}

pub fn bfifo_large_limit(bdp: f64) -> u64 {
    bdp as u64
}

pub fn bfifo_small_limit(bdp: f64) -> u64 {
    MTU.max((0.1 * bdp) as u64)
}

/// Packet limit for delay-targeting AQMs: four BDPs worth of MTU packets
pub fn aqm_packet_limit(bdp: f64) -> u64 {
    (4.0 * bdp / MTU as f64) as u64
}

/// The `tc` command attaching `policy` below the HTB class on `iface`
pub fn queue_command(iface: &str, policy: QueuePolicy, bw_mbps: u32, bdp: f64) -> String {
    let discipline = match policy {
        QueuePolicy::Policer => {
            return format!(
                "tc filter add dev {} parent 3: protocol ip u32 match ip src 0.0.0.0/0 \
                 action police rate {}mbit burst {} conform-exceed drop",
                iface,
                bw_mbps,
                policer_burst(bw_mbps)
            );
        }
        QueuePolicy::Red => {
            let red = RedParams::derive(bdp);
            format!(
                "red limit {} avpkt {} adaptive harddrop bandwidth {}Mbit burst {}",
                red.limit, red.avpkt, bw_mbps, red.burst
            )
        }
        QueuePolicy::BfifoLarge => format!("bfifo limit {}", bfifo_large_limit(bdp)),
        QueuePolicy::BfifoSmall => format!("bfifo limit {}", bfifo_small_limit(bdp)),
        QueuePolicy::Pie => format!("pie limit {}", aqm_packet_limit(bdp)),
        QueuePolicy::Codel => format!("codel limit {}", aqm_packet_limit(bdp)),
        QueuePolicy::FqCodel => "fq_codel".to_string(),
    };
    format!("tc qdisc add dev {} parent 3:10 handle 11: {}", iface, discipline)
}
