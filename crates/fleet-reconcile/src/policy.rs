//! Scale-quantity policy.
//!
//! Both directions close only half of the gap per cycle, rounded up. New
//! agents take longer than one poll interval to register, so closing the
//! whole gap would overshoot.

/// Agents to add when `demand > supply`, capped so the group never exceeds
/// `max_agents`. Zero when already at or over the cap.
pub fn scale_up_count(demand: u32, supply: u32, max_agents: u32) -> u32 {
    if supply >= max_agents {
        return 0;
    }
    let raw = demand.saturating_sub(supply).div_ceil(2);
    raw.min(max_agents - supply)
}

/// Agents to remove when `supply > demand`, never more than are idle.
/// Zero when nothing is idle, whatever the gap.
pub fn scale_down_count(demand: u32, supply: u32, idle: u32) -> u32 {
    if idle == 0 {
        return 0;
    }
    let raw = supply.saturating_sub(demand).div_ceil(2);
    raw.min(idle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_up_clamps_to_cap() {
        assert_eq!(scale_up_count(5, 0, 3), 3);
        assert_eq!(scale_up_count(5, 5, 3), 0);
        assert_eq!(scale_up_count(5, 2, 3), 1);
        assert_eq!(scale_up_count(5, 1, 3), 2);
    }

    #[test]
    fn scale_up_closes_half_the_gap() {
        assert_eq!(scale_up_count(1, 0, 10), 1);
        assert_eq!(scale_up_count(4, 0, 10), 2);
        assert_eq!(scale_up_count(7, 2, 10), 3);
    }

    #[test]
    fn scale_up_never_negative() {
        assert_eq!(scale_up_count(0, 2, 10), 0);
        assert_eq!(scale_up_count(3, 3, 10), 0);
        assert_eq!(scale_up_count(3, 0, 0), 0);
    }

    #[test]
    fn scale_down_bounded_by_idle() {
        assert_eq!(scale_down_count(0, 5, 1), 1);
        assert_eq!(scale_down_count(0, 5, 3), 3);
        assert_eq!(scale_down_count(0, 2, 2), 1);
    }

    #[test]
    fn scale_down_nothing_idle() {
        assert_eq!(scale_down_count(0, 10, 0), 0);
    }

    #[test]
    fn scale_down_never_negative() {
        assert_eq!(scale_down_count(4, 2, 2), 0);
    }
}
