#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Pure rail-selection, fee, and ETA decisions. No I/O, no trait objects,
//! no clock reads beyond what the caller passes in — every function here
//! is a deterministic mapping from inputs to a decision, mirroring how the
//! rest of this workspace keeps rule evaluation free of side effects.

use chrono::DateTime;
use chrono::Datelike;
use chrono::FixedOffset;
use chrono::Duration;
use chrono::Timelike;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no available rail for the requested instrument")]
    NoAvailableRail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rail {
    Ach,
    SameDayAch,
    PushToCard,
    Fednow,
    Rtp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSpeed {
    Instant,
    Standard,
}

const INSTANT_PRIORITY: [Rail; 5] = [
    Rail::Rtp,
    Rail::Fednow,
    Rail::PushToCard,
    Rail::SameDayAch,
    Rail::Ach,
];

const STANDARD_PRIORITY: [Rail; 5] = [
    Rail::Ach,
    Rail::SameDayAch,
    Rail::PushToCard,
    Rail::Fednow,
    Rail::Rtp,
];

/// One hop in the failure-fallback chain. `Ach` has no entry and is
/// therefore terminal.
fn next_fallback(rail: Rail) -> Option<Rail> {
    match rail {
        Rail::Rtp => Some(Rail::Fednow),
        Rail::Fednow => Some(Rail::PushToCard),
        Rail::PushToCard => Some(Rail::Ach),
        Rail::SameDayAch => Some(Rail::Ach),
        Rail::Ach => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPlan {
    pub primary: Rail,
    pub fallbacks: Vec<Rail>,
}

impl RoutingPlan {
    /// `[primary, ...fallbacks]`, the order the transfer orchestrator
    /// attempts rails in.
    #[must_use]
    pub fn attempt_order(&self) -> Vec<Rail> {
        let mut order = vec![self.primary];
        order.extend(self.fallbacks.iter().copied());
        order
    }
}

/// Chooses a primary rail from `available` by scan priority, then walks
/// the fallback chain from that rail, keeping only the hops that are
/// themselves available.
pub fn route(available: &[Rail], speed: RoutingSpeed) -> RoutingResult<RoutingPlan> {
    let priority = match speed {
        RoutingSpeed::Instant => &INSTANT_PRIORITY,
        RoutingSpeed::Standard => &STANDARD_PRIORITY,
    };

    let primary = priority
        .iter()
        .copied()
        .find(|rail| available.contains(rail))
        .ok_or(RoutingError::NoAvailableRail)?;

    let mut fallbacks = Vec::new();
    let mut cursor = primary;
    while let Some(next) = next_fallback(cursor) {
        if available.contains(&next) {
            fallbacks.push(next);
        }
        cursor = next;
    }

    Ok(RoutingPlan { primary, fallbacks })
}

/// Flat fee bands by principal. Breakpoints rise in the same six-tier
/// sequence documented for express transfers: 299, 499, 799, 999, 1499,
/// 1999 cents. Amounts below the lowest band's minimum also return 299;
/// amounts above the highest band stay at the top fee.
#[must_use]
pub fn fee(principal_cents: u64) -> u32 {
    match principal_cents {
        0..=50_000 => 299,
        50_001..=200_000 => 499,
        200_001..=500_000 => 799,
        500_001..=1_000_000 => 999,
        1_000_001..=2_500_000 => 1499,
        _ => 1999,
    }
}

/// All-or-nothing express fee waiver: the fee is waived in full when the
/// lender's available prefund balance covers the entire transfer amount,
/// otherwise the full fee still applies. There is no partial waiver.
#[must_use]
pub fn apply_prefund_waiver(
    fee_cents: u32,
    prefund_available_after_cents: i64,
    transfer_amount_cents: u64,
) -> u32 {
    if prefund_available_after_cents >= 0
        && prefund_available_after_cents as u64 >= transfer_amount_cents
    {
        0
    } else {
        fee_cents
    }
}

/// Estimated arrival for a rail given a local "now". `Rtp`/`Fednow` clear
/// immediately; `PushToCard` adds a flat 30 minutes; `SameDayAch` and
/// `Ach` add business hours (Mon-Fri 9:00-17:00) in the caller-supplied
/// offset, rather than wall-clock hours.
#[must_use]
pub fn estimated_arrival(rail: Rail, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    match rail {
        Rail::Rtp | Rail::Fednow => now,
        Rail::PushToCard => now + Duration::minutes(30),
        Rail::SameDayAch => add_business_hours(now, 4),
        Rail::Ach => add_business_hours(now, 24),
    }
}

fn is_business_hour(at: DateTime<FixedOffset>) -> bool {
    let weekday = at.weekday().number_from_monday();
    let hour = at.hour();
    (1..=5).contains(&weekday) && (9..17).contains(&hour)
}

/// Steps forward one hour at a time, counting only hours that land inside
/// the business window. Adequate for the small hour counts (4, 24) this
/// module deals in; not a general business-calendar implementation.
fn add_business_hours(start: DateTime<FixedOffset>, hours: i64) -> DateTime<FixedOffset> {
    let mut cursor = start;
    let mut remaining = hours;
    while remaining > 0 {
        cursor += Duration::hours(1);
        if is_business_hour(cursor) {
            remaining -= 1;
        }
    }
    cursor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn instant_routing_prefers_rtp_when_available() {
        let available = [Rail::Ach, Rail::Fednow, Rail::Rtp];
        let plan = route(&available, RoutingSpeed::Instant).expect("route");
        assert_eq!(plan.primary, Rail::Rtp);
        assert_eq!(plan.fallbacks, vec![Rail::Fednow, Rail::Ach]);
    }

    #[test]
    fn standard_routing_prefers_ach_when_available() {
        let available = [Rail::Ach, Rail::SameDayAch, Rail::Rtp];
        let plan = route(&available, RoutingSpeed::Standard).expect("route");
        assert_eq!(plan.primary, Rail::Ach);
        assert!(plan.fallbacks.is_empty());
    }

    #[test]
    fn fallback_chain_skips_unavailable_hops() {
        // Fednow is unavailable; the chain should still reach PushToCard
        // and then Ach rather than stopping early.
        let available = [Rail::Rtp, Rail::PushToCard, Rail::Ach];
        let plan = route(&available, RoutingSpeed::Instant).expect("route");
        assert_eq!(plan.primary, Rail::Rtp);
        assert_eq!(plan.fallbacks, vec![Rail::PushToCard, Rail::Ach]);
    }

    #[test]
    fn no_available_rail_is_rejected() {
        let available: [Rail; 0] = [];
        assert_eq!(
            route(&available, RoutingSpeed::Instant),
            Err(RoutingError::NoAvailableRail)
        );
    }

    #[test]
    fn fee_bands_rise_with_principal() {
        assert_eq!(fee(10_000), 299);
        assert_eq!(fee(100_000), 499);
        assert_eq!(fee(200_000), 499);
        assert_eq!(fee(250_000), 799);
        assert_eq!(fee(500_000), 799);
        assert_eq!(fee(900_000), 999);
        assert_eq!(fee(1_000_000), 999);
        assert_eq!(fee(1_500_000), 1499);
        assert_eq!(fee(5_000_000), 1999);
        assert_eq!(fee(6_000_000), 1999);
    }

    #[test]
    fn prefund_waiver_is_all_or_nothing() {
        assert_eq!(apply_prefund_waiver(1499, 50_000, 50_000), 0);
        assert_eq!(apply_prefund_waiver(1499, 49_999, 50_000), 1499);
        assert_eq!(apply_prefund_waiver(1499, -10, 50_000), 1499);
    }

    #[test]
    fn instant_rails_arrive_immediately() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        let now = offset
            .with_ymd_and_hms(2026, 7, 27, 10, 0, 0)
            .single()
            .expect("monday ten am");
        assert_eq!(estimated_arrival(Rail::Rtp, now), now);
        assert_eq!(estimated_arrival(Rail::Fednow, now), now);
    }

    #[test]
    fn ach_arrival_skips_weekends_and_off_hours() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        // Friday 16:00 + 24 business hours should land the following
        // Tuesday, skipping the weekend and nightly off-hours entirely.
        let friday_afternoon = offset
            .with_ymd_and_hms(2026, 7, 24, 16, 0, 0)
            .single()
            .expect("friday four pm");
        let arrival = estimated_arrival(Rail::Ach, friday_afternoon);
        assert_eq!(arrival.weekday().number_from_monday(), 2);
        assert!(is_business_hour(arrival));
    }
}
