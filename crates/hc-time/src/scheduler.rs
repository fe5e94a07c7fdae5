use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::{TickMode, TickRate, TickSource};

/// Identifies one tick channel of a [`TickScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A channel expiry returned by [`TickScheduler::pop_due`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    pub channel: ChannelId,
    pub at_ns: u64,
}

#[derive(Debug, Clone, Copy)]
struct Arming {
    mode: TickMode,
    rate: TickRate,
    /// Reload value for the next period.
    limit: u32,
    period_ns: u64,
    /// Limit the pending deadline was computed from.
    period_limit: u32,
    deadline_ns: u64,
}

#[derive(Debug, Default)]
struct Channel {
    /// Bumped on every arm/stop; queue entries carrying an older epoch are dead.
    epoch: u64,
    arming: Option<Arming>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    deadline_ns: u64,
    seq: u64,
    channel: ChannelId,
    epoch: u64,
}

/// Virtual-time scheduler for any number of tick channels.
///
/// Time only moves when the caller says so ([`advance_to`](Self::advance_to) or
/// [`pop_due`](Self::pop_due)), which keeps every run fully deterministic.
#[derive(Debug, Default)]
pub struct TickScheduler {
    now_ns: u64,
    next_seq: u64,
    channels: Vec<Channel>,
    pending: BinaryHeap<Reverse<Pending>>,
}

pub type SharedTickScheduler = Rc<RefCell<TickScheduler>>;

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedTickScheduler {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Current virtual time in nanoseconds since reset.
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    pub fn add_channel(&mut self) -> ChannelId {
        let id = ChannelId(self.channels.len() as u32);
        self.channels.push(Channel::default());
        id
    }

    pub fn arm(&mut self, channel: ChannelId, limit: u32, rate: TickRate, mode: TickMode) {
        let now_ns = self.now_ns;
        let ch = &mut self.channels[channel.index()];
        ch.epoch += 1;

        let (mode, period_ns) = if limit == 0 {
            tracing::warn!(
                channel = channel.index(),
                "tick channel armed with a zero limit; expiring once"
            );
            (TickMode::OneShot, 0)
        } else {
            (mode, rate.ns_for_ticks(u64::from(limit)))
        };

        let deadline_ns = now_ns.saturating_add(period_ns);
        ch.arming = Some(Arming {
            mode,
            rate,
            limit,
            period_ns,
            period_limit: limit,
            deadline_ns,
        });
        let epoch = ch.epoch;
        tracing::trace!(
            channel = channel.index(),
            limit,
            ?mode,
            deadline_ns,
            "tick channel armed"
        );
        self.push(channel, epoch, deadline_ns);
    }

    pub fn stop(&mut self, channel: ChannelId) {
        let ch = &mut self.channels[channel.index()];
        ch.epoch += 1;
        if ch.arming.take().is_some() {
            tracing::trace!(channel = channel.index(), "tick channel stopped");
        }
    }

    /// Changes the reload value of an armed channel.
    ///
    /// The pending deadline is kept; the new limit takes effect from the next period. Does
    /// nothing when the channel is stopped.
    pub fn set_limit(&mut self, channel: ChannelId, limit: u32) {
        let Some(arming) = self.channels[channel.index()].arming.as_mut() else {
            return;
        };
        arming.limit = limit;
        arming.period_ns = arming.rate.ns_for_ticks(u64::from(limit));
        tracing::trace!(channel = channel.index(), limit, "tick channel reload changed");
    }

    pub fn is_armed(&self, channel: ChannelId) -> bool {
        self.channels[channel.index()].arming.is_some()
    }

    /// Ticks left in the current period of `channel`, rounded up; 0 when stopped.
    pub fn remaining(&self, channel: ChannelId) -> u32 {
        let Some(arming) = self.channels[channel.index()].arming else {
            return 0;
        };
        if arming.period_limit == 0 {
            return 0;
        }
        let left_ns = arming.deadline_ns.saturating_sub(self.now_ns);
        let left = arming.rate.ticks_in_ns_ceil(left_ns);
        left.clamp(1, u64::from(arming.period_limit)) as u32
    }

    /// Deadline of the earliest live expiry, if any.
    pub fn next_deadline_ns(&mut self) -> Option<u64> {
        self.discard_stale_head();
        self.pending.peek().map(|Reverse(head)| head.deadline_ns)
    }

    /// Removes and returns the earliest live expiry due at or before `until_ns`.
    ///
    /// Virtual time moves to the expiry's deadline. Periodic channels are re-armed for their
    /// next period; one-shot channels are disarmed.
    pub fn pop_due(&mut self, until_ns: u64) -> Option<TickEvent> {
        self.discard_stale_head();
        let Reverse(head) = *self.pending.peek()?;
        if head.deadline_ns > until_ns {
            return None;
        }
        self.pending.pop();

        self.now_ns = self.now_ns.max(head.deadline_ns);
        let ch = &mut self.channels[head.channel.index()];
        let mut arming = ch.arming?;
        match arming.mode {
            TickMode::Periodic if arming.limit == 0 => {
                tracing::warn!(
                    channel = head.channel.index(),
                    "periodic tick channel reloaded with a zero limit; disarming"
                );
                ch.arming = None;
            }
            TickMode::Periodic => {
                arming.deadline_ns = head.deadline_ns.saturating_add(arming.period_ns);
                arming.period_limit = arming.limit;
                ch.arming = Some(arming);
                self.push(head.channel, head.epoch, arming.deadline_ns);
            }
            TickMode::OneShot => ch.arming = None,
        }

        Some(TickEvent {
            channel: head.channel,
            at_ns: head.deadline_ns,
        })
    }

    /// Moves virtual time forward to `ns`. Time never moves backwards.
    ///
    /// Expiries due before `ns` are not delivered by this call; drain them with
    /// [`pop_due`](Self::pop_due) first.
    pub fn advance_to(&mut self, ns: u64) {
        self.now_ns = self.now_ns.max(ns);
    }

    fn push(&mut self, channel: ChannelId, epoch: u64, deadline_ns: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Reverse(Pending {
            deadline_ns,
            seq,
            channel,
            epoch,
        }));
    }

    fn discard_stale_head(&mut self) {
        while let Some(&Reverse(head)) = self.pending.peek() {
            let ch = &self.channels[head.channel.index()];
            if ch.epoch == head.epoch && ch.arming.is_some() {
                return;
            }
            self.pending.pop();
        }
    }
}

/// The [`TickSource`] view of one [`TickScheduler`] channel.
///
/// Each device owns exactly one of these; it is intentionally not `Clone`.
#[derive(Debug)]
pub struct SchedulerTickSource {
    scheduler: SharedTickScheduler,
    channel: ChannelId,
}

impl SchedulerTickSource {
    /// Allocates a fresh channel on `scheduler`.
    pub fn new(scheduler: &SharedTickScheduler) -> Self {
        let channel = scheduler.borrow_mut().add_channel();
        Self {
            scheduler: Rc::clone(scheduler),
            channel,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl TickSource for SchedulerTickSource {
    fn arm(&mut self, limit: u32, rate: TickRate, mode: TickMode) {
        self.scheduler
            .borrow_mut()
            .arm(self.channel, limit, rate, mode);
    }

    fn stop(&mut self) {
        self.scheduler.borrow_mut().stop(self.channel);
    }

    fn remaining(&self) -> u32 {
        self.scheduler.borrow().remaining(self.channel)
    }

    fn set_limit(&mut self, limit: u32) {
        self.scheduler.borrow_mut().set_limit(self.channel, limit);
    }

    fn is_armed(&self) -> bool {
        self.scheduler.borrow().is_armed(self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: TickRate = TickRate::new(320);
    // One tick at 320 Hz.
    const TICK_NS: u64 = 3_125_000;

    fn drain(sched: &mut TickScheduler, until_ns: u64) -> Vec<TickEvent> {
        let mut events = Vec::new();
        while let Some(ev) = sched.pop_due(until_ns) {
            events.push(ev);
        }
        sched.advance_to(until_ns);
        events
    }

    #[test]
    fn one_shot_fires_once_after_limit_ticks() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 4, RATE, TickMode::OneShot);

        assert!(drain(&mut sched, 4 * TICK_NS - 1).is_empty());
        assert_eq!(
            drain(&mut sched, 4 * TICK_NS),
            vec![TickEvent {
                channel: ch,
                at_ns: 4 * TICK_NS
            }]
        );
        assert!(!sched.is_armed(ch));
        assert!(drain(&mut sched, 100 * TICK_NS).is_empty());
    }

    #[test]
    fn periodic_rearms_from_previous_deadline() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 2, RATE, TickMode::Periodic);

        let at: Vec<u64> = drain(&mut sched, 7 * TICK_NS)
            .iter()
            .map(|ev| ev.at_ns)
            .collect();
        assert_eq!(at, vec![2 * TICK_NS, 4 * TICK_NS, 6 * TICK_NS]);
        assert!(sched.is_armed(ch));
        assert_eq!(sched.next_deadline_ns(), Some(8 * TICK_NS));
    }

    #[test]
    fn stop_cancels_the_pending_expiry() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 3, RATE, TickMode::Periodic);
        drain(&mut sched, TICK_NS);

        sched.stop(ch);
        assert!(drain(&mut sched, 50 * TICK_NS).is_empty());
        assert_eq!(sched.next_deadline_ns(), None);
    }

    #[test]
    fn rearming_discards_the_previous_epoch() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 2, RATE, TickMode::OneShot);
        drain(&mut sched, TICK_NS);

        // The first arming would have expired at 2 ticks; the new one expires at 1 + 5.
        sched.arm(ch, 5, RATE, TickMode::OneShot);
        let events = drain(&mut sched, 10 * TICK_NS);
        assert_eq!(
            events,
            vec![TickEvent {
                channel: ch,
                at_ns: 6 * TICK_NS
            }]
        );
    }

    #[test]
    fn channels_interleave_in_deadline_order() {
        let mut sched = TickScheduler::new();
        let a = sched.add_channel();
        let b = sched.add_channel();
        sched.arm(a, 3, RATE, TickMode::Periodic);
        sched.arm(b, 2, RATE, TickMode::Periodic);

        let order: Vec<ChannelId> = drain(&mut sched, 6 * TICK_NS)
            .iter()
            .map(|ev| ev.channel)
            .collect();
        // b@2, a@3, b@4, a@6 then b@6 (a was queued first for that instant).
        assert_eq!(order, vec![b, a, b, a, b]);
    }

    #[test]
    fn remaining_counts_down_and_rounds_up() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        assert_eq!(sched.remaining(ch), 0);

        sched.arm(ch, 10, RATE, TickMode::OneShot);
        assert_eq!(sched.remaining(ch), 10);

        sched.advance_to(TICK_NS / 2);
        assert_eq!(sched.remaining(ch), 10);

        sched.advance_to(3 * TICK_NS);
        assert_eq!(sched.remaining(ch), 7);

        sched.stop(ch);
        assert_eq!(sched.remaining(ch), 0);
    }

    #[test]
    fn zero_limit_expires_immediately_even_when_periodic() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.advance_to(42);
        sched.arm(ch, 0, RATE, TickMode::Periodic);

        assert_eq!(
            drain(&mut sched, 42),
            vec![TickEvent {
                channel: ch,
                at_ns: 42
            }]
        );
        assert!(!sched.is_armed(ch));
    }

    #[test]
    fn new_limit_applies_from_the_next_period() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 10, RATE, TickMode::Periodic);
        sched.set_limit(ch, 2);
        assert_eq!(sched.remaining(ch), 10);

        let at: Vec<u64> = drain(&mut sched, 20 * TICK_NS)
            .iter()
            .map(|ev| ev.at_ns)
            .collect();
        let expected: Vec<u64> = [10, 12, 14, 16, 18, 20].map(|t| t * TICK_NS).to_vec();
        assert_eq!(at, expected);

        sched.advance_to(21 * TICK_NS);
        assert_eq!(sched.remaining(ch), 1);
    }

    #[test]
    fn zero_reload_disarms_a_periodic_channel() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.arm(ch, 3, RATE, TickMode::Periodic);
        sched.set_limit(ch, 0);

        assert_eq!(drain(&mut sched, 30 * TICK_NS).len(), 1);
        assert!(!sched.is_armed(ch));
    }

    #[test]
    fn set_limit_ignores_stopped_channels() {
        let mut sched = TickScheduler::new();
        let ch = sched.add_channel();
        sched.set_limit(ch, 5);
        assert!(!sched.is_armed(ch));
        assert_eq!(sched.next_deadline_ns(), None);
    }

    #[test]
    fn scheduler_tick_source_drives_its_own_channel() {
        let sched = TickScheduler::new_shared();
        let mut first = SchedulerTickSource::new(&sched);
        let second = SchedulerTickSource::new(&sched);
        assert_ne!(first.channel(), second.channel());

        first.arm(1, RATE, TickMode::OneShot);
        assert!(first.is_armed());
        assert!(!second.is_armed());

        let ev = sched.borrow_mut().pop_due(TICK_NS);
        assert_eq!(ev.map(|ev| ev.channel), Some(first.channel()));
        assert!(!first.is_armed());
    }
}
