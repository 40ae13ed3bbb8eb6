// statbar-core/src/timer.rs
use std::time::{Duration, Instant};

/// Shortest period a timer accepts. A zero period could never be advanced
/// strictly past "now".
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Index of a timer inside its [`TimerSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

/// A named periodic deadline
#[derive(Debug, Clone)]
pub struct Timer {
    name: &'static str,
    period: Duration,
    deadline: Instant,
    armed: bool,
}

impl Timer {
    fn new(name: &'static str, period: Duration, now: Instant) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            name,
            period,
            deadline: now + period,
            armed: true,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether the deadline has been reached at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.armed && self.deadline <= now
    }

    /// Move the deadline forward by whole periods until it lies strictly
    /// after `now`.
    ///
    /// All missed periods are skipped in one step: the new deadline is the
    /// smallest `deadline + k * period` greater than `now`. A deadline that is
    /// already in the future is left alone.
    pub fn advance_past(&mut self, now: Instant) {
        if self.deadline > now {
            return;
        }

        let overdue = now.duration_since(self.deadline).as_nanos();
        let period = self.period.as_nanos();
        let steps = overdue / period + 1;

        self.deadline += mul_duration(self.period, steps);
    }
}

fn mul_duration(period: Duration, steps: u128) -> Duration {
    match u32::try_from(steps) {
        Ok(steps) => period * steps,
        Err(_) => {
            let nanos = period.as_nanos().saturating_mul(steps);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Small fixed collection of timers, kept in declaration order
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: Vec<Timer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Add a timer whose first deadline is one period after `now`
    pub fn add(&mut self, name: &'static str, period: Duration, now: Instant) -> TimerId {
        self.timers.push(Timer::new(name, period, now));
        TimerId(self.timers.len() - 1)
    }

    pub fn get(&self, id: TimerId) -> &Timer {
        &self.timers[id.0]
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_deadline(&self, id: TimerId) -> Option<Instant> {
        let timer = self.get(id);
        timer.armed.then_some(timer.deadline)
    }

    pub fn advance_past(&mut self, id: TimerId, now: Instant) {
        self.timers[id.0].advance_past(now);
    }

    /// Armed timer with the smallest deadline. Ties go to the timer declared
    /// first.
    pub fn earliest(&self) -> Option<TimerId> {
        let mut best: Option<(usize, Instant)> = None;
        for (idx, timer) in self.timers.iter().enumerate() {
            if !timer.armed {
                continue;
            }
            match best {
                Some((_, deadline)) if deadline <= timer.deadline => {}
                _ => best = Some((idx, timer.deadline)),
            }
        }
        best.map(|(idx, _)| TimerId(idx))
    }

    /// Time left until the earliest armed deadline, zero when overdue
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        self.earliest()
            .map(|id| self.get(id).deadline.saturating_duration_since(now))
    }

    /// Armed timers whose deadline is at or before `now`, in declaration order
    pub fn due(&self, now: Instant) -> Vec<TimerId> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.is_due(now))
            .map(|(idx, _)| TimerId(idx))
            .collect()
    }

    /// Change a timer's period. The pending deadline is kept; the new period
    /// applies from the next advance.
    pub fn set_period(&mut self, id: TimerId, period: Duration) {
        self.timers[id.0].period = period.max(MIN_PERIOD);
    }

    /// Arm a timer so it fires at `deadline`
    pub fn arm_at(&mut self, id: TimerId, deadline: Instant) {
        let timer = &mut self.timers[id.0];
        timer.armed = true;
        timer.deadline = deadline;
    }

    pub fn disarm(&mut self, id: TimerId) {
        self.timers[id.0].armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_first_deadline_is_one_period_out() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("clock", secs(1.0), start);

        assert_eq!(set.next_deadline(id), Some(start + secs(1.0)));
    }

    #[test]
    fn test_advance_past_skips_all_missed_periods() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("clock", secs(1.0), start);

        // Overslept by 3.5 periods
        set.advance_past(id, start + secs(4.5));
        assert_eq!(set.next_deadline(id), Some(start + secs(5.0)));
    }

    #[test]
    fn test_advance_past_on_exact_deadline_moves_one_period() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("clock", secs(1.0), start);

        set.advance_past(id, start + secs(1.0));
        assert_eq!(set.next_deadline(id), Some(start + secs(2.0)));
    }

    #[test]
    fn test_advance_past_never_moves_backward() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("battery", secs(5.0), start);

        set.advance_past(id, start + secs(1.0));
        assert_eq!(set.next_deadline(id), Some(start + secs(5.0)));
    }

    #[test]
    fn test_earliest_breaks_ties_by_declaration_order() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let first = set.add("a", secs(2.0), start);
        let _second = set.add("b", secs(2.0), start);
        let third = set.add("c", secs(1.0), start);

        assert_eq!(set.earliest(), Some(third));
        set.disarm(third);
        assert_eq!(set.earliest(), Some(first));
    }

    #[test]
    fn test_disarmed_timers_are_ignored() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("mail", secs(1.0), start);
        set.disarm(id);

        assert_eq!(set.earliest(), None);
        assert_eq!(set.timeout(start), None);
        assert!(set.due(start + secs(10.0)).is_empty());
        assert_eq!(set.next_deadline(id), None);
    }

    #[test]
    fn test_timeout_is_zero_when_overdue() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        set.add("clock", secs(1.0), start);

        assert_eq!(set.timeout(start + secs(3.0)), Some(Duration::ZERO));
        assert_eq!(set.timeout(start + secs(0.25)), Some(secs(0.75)));
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("fast", Duration::ZERO, start);

        assert_eq!(set.get(id).period(), MIN_PERIOD);
        set.advance_past(id, start + secs(1.0));
        assert!(set.get(id).deadline() > start + secs(1.0));
    }

    #[test]
    fn test_set_period_keeps_pending_deadline() {
        let start = Instant::now();
        let mut set = TimerSet::new();
        let id = set.add("clock", secs(1.0), start);

        set.set_period(id, secs(3.0));
        assert_eq!(set.next_deadline(id), Some(start + secs(1.0)));
        set.advance_past(id, start + secs(1.0));
        assert_eq!(set.next_deadline(id), Some(start + secs(4.0)));
    }

    proptest! {
        #[test]
        fn prop_advance_past_lands_on_smallest_grid_point(
            period_ms in 1u64..5_000,
            overdue_ms in 0u64..100_000,
        ) {
            let start = Instant::now();
            let period = Duration::from_millis(period_ms);
            let mut timer = Timer::new("t", period, start);
            let old = timer.deadline();
            let now = old + Duration::from_millis(overdue_ms);

            timer.advance_past(now);
            let new = timer.deadline();

            prop_assert!(new > now);
            prop_assert!(new - period <= now);
            let offset = (new - old).as_nanos();
            prop_assert_eq!(offset % period.as_nanos(), 0);
        }

        #[test]
        fn prop_fire_count_matches_elapsed_periods(
            period_ms in 1u64..2_000,
            step_ms in 1u64..500,
            steps in 1usize..200,
        ) {
            let start = Instant::now();
            let period = Duration::from_millis(period_ms);
            let step = Duration::from_millis(step_ms.min(period_ms));
            let mut set = TimerSet::new();
            let id = set.add("t", period, start);
            let mut fired = 0u128;
            let mut now = start;

            for _ in 0..steps {
                now += step;
                if set.get(id).is_due(now) {
                    fired += 1;
                    set.advance_past(id, now);
                }
            }

            let elapsed = (now - start).as_nanos();
            prop_assert_eq!(fired, elapsed / period.as_nanos());
        }
    }
}
