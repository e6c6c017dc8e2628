//! Liquidity invalidation rules.
//!
//! One ordered table of `(reason, predicate)` entries, evaluated every
//! bar over the live points of the bar's instrument. The first matching
//! rule fails the point; failure is monotonic and a failed point is
//! never re-examined.

use crate::engine::liquidity::{LiquidityMode, LiquidityPoint, LiquidityStore};
use crate::engine::session::{MicroBook, MicroKind};
use crate::settings::Settings;
use crate::types::{PairPeriod, TriggerKind, TriggerStatus};

type Rule<'a> = (&'static str, Box<dyn Fn(&LiquidityPoint) -> bool + 'a>);

fn rule_table<'a>(micros: &'a MicroBook, settings: &'a Settings) -> Vec<Rule<'a>> {
    let mut rules: Vec<Rule<'a>> = Vec::new();

    // Both age rules apply to every micro-window point, whichever of
    // the two families formed it; daily/weekly points never age out.
    let session_age = settings.int_or("LiquidityMaxAgeSessionMicro", 5) as usize;
    rules.push((
        "session-micro-age",
        Box::new(move |p| {
            matches!(p.mode, LiquidityMode::BySession | LiquidityMode::ByWorktime)
                && micros.count_started_at_or_after(MicroKind::Session, p.window.start.unix)
                    >= session_age
        }),
    ));

    let worktime_age = settings.int_or("LiquidityMaxAgeWorkTimeMicro", 2) as usize;
    rules.push((
        "worktime-micro-age",
        Box::new(move |p| {
            matches!(p.mode, LiquidityMode::BySession | LiquidityMode::ByWorktime)
                && micros.count_started_at_or_after(MicroKind::Worktime, p.window.start.unix)
                    >= worktime_age
        }),
    ));

    let max_used = settings.int_or("LiquidityMaxUsedCount", 2) as usize;
    rules.push(("max-used", Box::new(move |p| p.used_total() >= max_used)));

    let max_stop = settings.int_or("LiquidityMaxStopLossUsedCount", 2) as usize;
    rules.push((
        "max-stoploss-used",
        Box::new(move |p| p.used_with_status(TriggerStatus::Stoploss) >= max_stop),
    ));

    let max_target = settings.int_or("LiquidityMaxTakeProfitUsedCount", 1) as usize;
    rules.push((
        "max-takeprofit-used",
        Box::new(move |p| p.used_with_status(TriggerStatus::Takeprofit) >= max_target),
    ));

    #[rustfmt::skip]
    let per_kind = [
        (TriggerKind::Driven, "DrivenPatten", "driven-max-used", "driven-max-stoploss", "driven-max-takeprofit"),
        (TriggerKind::Mss, "MSS", "mss-max-used", "mss-max-stoploss", "mss-max-takeprofit"),
        (TriggerKind::Cob, "COB", "cob-max-used", "cob-max-stoploss", "cob-max-takeprofit"),
    ];
    for (kind, key, used_reason, stop_reason, target_reason) in per_kind {
        let used = settings.int_or(&format!("LiquidityUsedMax{key}UsedCount"), 2) as usize;
        rules.push((used_reason, Box::new(move |p| p.used_of_kind(kind) >= used)));
        let stop = settings.int_or(&format!("LiquidityUsedMax{key}StopLossCount"), 2) as usize;
        rules.push((
            stop_reason,
            Box::new(move |p| p.used_of_kind_with_status(kind, TriggerStatus::Stoploss) >= stop),
        ));
        let target = settings.int_or(&format!("LiquidityUsedMax{key}TakeProfitCount"), 1) as usize;
        rules.push((
            target_reason,
            Box::new(move |p| {
                p.used_of_kind_with_status(kind, TriggerStatus::Takeprofit) >= target
            }),
        ));
    }

    rules
}

/// Run the table over every live point of the instrument.
pub fn validate(
    liquidity: &mut LiquidityStore,
    micros: &MicroBook,
    settings: &Settings,
    pair: &PairPeriod,
) {
    let rules = rule_table(micros, settings);
    let failing: Vec<(u64, &'static str)> = liquidity
        .ring
        .iter()
        .filter(|p| &p.pair_period == pair && !p.failed)
        .filter_map(|p| {
            rules
                .iter()
                .find(|(_, pred)| pred(p))
                .map(|(reason, _)| (p.id, *reason))
        })
        .collect();
    for (id, reason) in failing {
        liquidity.mark_failed(id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::liquidity::LiquidityUsage;
    use crate::types::{Direction, Stamp, TimeRange};

    fn pp() -> PairPeriod {
        PairPeriod::new("EURUSD", 1)
    }

    fn point(id: u64, mode: LiquidityMode) -> crate::engine::liquidity::LiquidityPoint {
        crate::engine::liquidity::LiquidityPoint {
            id,
            pair_period: pp(),
            direction: Direction::Up,
            mode,
            price: 1.1,
            formed_at: Stamp::from_unix(50),
            window: TimeRange::new(0, 100),
            touches: vec![Stamp::from_unix(50)],
            hunted_at: None,
            hunt_price: None,
            failed: false,
            used: Vec::new(),
        }
    }

    fn usage(kind: TriggerKind, status: TriggerStatus) -> LiquidityUsage {
        LiquidityUsage {
            setup_id: 1,
            kind,
            status,
            time: Stamp::from_unix(0),
        }
    }

    #[test]
    fn test_session_age_rule() {
        let settings = Settings::seeded();
        let mut micros = MicroBook::new(20);
        let mut liquidity = LiquidityStore::new(20);
        liquidity.ring.push(point(1, LiquidityMode::BySession));
        liquidity.ring.push(point(2, LiquidityMode::Daily));

        // Five sessions after the point's window start: the session
        // point ages out, the daily one is untouched by the age rule.
        for i in 0..5 {
            micros.observe(
                MicroKind::Session,
                TimeRange::new(200 + i * 100, 250 + i * 100),
            );
        }
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(1).unwrap().failed);
        assert!(!liquidity.ring.get_by_id(2).unwrap().failed);
    }

    #[test]
    fn test_age_counts_only_micros_after_window_start() {
        let settings = Settings::seeded();
        let mut micros = MicroBook::new(20);
        let mut liquidity = LiquidityStore::new(20);
        liquidity.ring.push(point(1, LiquidityMode::BySession));

        for i in 0..4 {
            micros.observe(
                MicroKind::Session,
                TimeRange::new(200 + i * 100, 250 + i * 100),
            );
        }
        // A micro that started before the window does not count.
        micros.observe(MicroKind::Session, TimeRange::new(-500, -400));
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(!liquidity.ring.get_by_id(1).unwrap().failed);
    }

    #[test]
    fn test_age_rules_cross_micro_families() {
        let settings = Settings::seeded();
        let mut micros = MicroBook::new(20);
        let mut liquidity = LiquidityStore::new(20);
        // A session point ages out on work-time micros too: two of them
        // meet the work-time threshold long before five sessions pass.
        liquidity.ring.push(point(1, LiquidityMode::BySession));
        micros.observe(MicroKind::Worktime, TimeRange::new(200, 250));
        micros.observe(MicroKind::Worktime, TimeRange::new(300, 350));
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(1).unwrap().failed);

        // And a work-time point ages out on session micros alone.
        let mut micros = MicroBook::new(20);
        let mut liquidity = LiquidityStore::new(20);
        liquidity.ring.push(point(2, LiquidityMode::ByWorktime));
        for i in 0..5 {
            micros.observe(
                MicroKind::Session,
                TimeRange::new(400 + i * 100, 450 + i * 100),
            );
        }
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(2).unwrap().failed);
    }

    #[test]
    fn test_total_used_rule() {
        let settings = Settings::seeded();
        let micros = MicroBook::new(10);
        let mut liquidity = LiquidityStore::new(10);
        let mut p = point(1, LiquidityMode::Daily);
        p.used.push(usage(TriggerKind::Mss, TriggerStatus::Triggered));
        p.used.push(usage(TriggerKind::Cob, TriggerStatus::Triggered));
        liquidity.ring.push(p);
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(1).unwrap().failed);
    }

    #[test]
    fn test_takeprofit_rule_is_tighter_than_used() {
        let settings = Settings::seeded();
        let micros = MicroBook::new(10);
        let mut liquidity = LiquidityStore::new(10);
        let mut p = point(1, LiquidityMode::Daily);
        p.used.push(usage(TriggerKind::Mss, TriggerStatus::Takeprofit));
        liquidity.ring.push(p);
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(1).unwrap().failed);
    }

    #[test]
    fn test_per_kind_rule_ignores_other_kinds() {
        let settings = Settings::seeded();
        let micros = MicroBook::new(10);
        let mut liquidity = LiquidityStore::new(10);
        // One MSS stoploss: below the per-kind threshold of 2 and below
        // every general threshold.
        let mut p = point(1, LiquidityMode::Daily);
        p.used.push(usage(TriggerKind::Mss, TriggerStatus::Stoploss));
        liquidity.ring.push(p);
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(!liquidity.ring.get_by_id(1).unwrap().failed);

        // A second MSS stoploss trips mss-max-stoploss (and max-used).
        liquidity
            .ring
            .update_by_id(1, |p| p.used.push(usage(TriggerKind::Mss, TriggerStatus::Stoploss)));
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(liquidity.ring.get_by_id(1).unwrap().failed);
    }

    #[test]
    fn test_other_instrument_untouched() {
        let settings = Settings::seeded();
        let micros = MicroBook::new(10);
        let mut liquidity = LiquidityStore::new(10);
        let mut p = point(1, LiquidityMode::Daily);
        p.pair_period = PairPeriod::new("GBPUSD", 1);
        p.used.push(usage(TriggerKind::Mss, TriggerStatus::Takeprofit));
        liquidity.ring.push(p);
        validate(&mut liquidity, &micros, &settings, &pp());
        assert!(!liquidity.ring.get_by_id(1).unwrap().failed);
    }
}
