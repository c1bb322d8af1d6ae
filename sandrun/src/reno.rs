//! TCP Reno fast-recovery (C7, §4.7): a per-connection state object that
//! mutates a sender's congestion window in response to duplicate and
//! partial acks while a retransmission is outstanding.
//!
//! This is the inner guest networking contract the sandbox exposes to
//! workloads inside it, included here to illustrate that contract rather
//! than as a general-purpose TCP stack; ordering and field names follow
//! the guest kernel's own reno recovery unit (§10.5).

/// Sender congestion-control state, `Open` until fast recovery begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionState {
    Open,
    FastRecovery,
}

/// The fast-recovery-specific fields tracked while `state == FastRecovery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastRecoveryState {
    /// First sequence number covered by this recovery episode.
    pub first: u32,
    /// Cap on how far `snd_cwnd` may inflate during recovery.
    pub max_cwnd: u32,
}

/// One incoming segment's ack-relevant fields, as seen by [`RenoRecovery::on_ack`].
#[derive(Debug, Clone, Copy)]
pub struct AckSegment {
    pub ack: u32,
    /// Length of data carried by the segment; non-zero segments are never
    /// counted toward recovery accounting.
    pub segment_len: u32,
    /// The receiver's advertised window as carried by this segment.
    pub segment_window: u32,
    /// Whether a retransmit was just issued for the segment this ack
    /// corresponds to.
    pub rtx: bool,
}

/// What the caller should do after [`RenoRecovery::on_ack`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The ack was out of range, or carried data / a changed window:
    /// ignored for recovery accounting.
    Ignored,
    /// A duplicate ack for the retransmitted segment: `snd_cwnd` was
    /// inflated (or left at its cap).
    Inflated,
    /// A partial ack: `fr.first` advanced, `dup_ack_count` reset, and the
    /// caller must resend the oldest unacked segment and reset the
    /// retransmit timer.
    PartialAck,
}

/// Per-sender TCP Reno state (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct RenoRecovery {
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_cwnd: u32,
    pub snd_wnd: u32,
    pub dup_ack_count: u32,
    pub state: CongestionState,
    pub fr: FastRecoveryState,
}

impl RenoRecovery {
    pub fn new(snd_una: u32, snd_nxt: u32, snd_cwnd: u32, snd_wnd: u32) -> Self {
        Self {
            snd_una,
            snd_nxt,
            snd_cwnd,
            snd_wnd,
            dup_ack_count: 0,
            state: CongestionState::Open,
            fr: FastRecoveryState {
                first: snd_una,
                max_cwnd: snd_cwnd,
            },
        }
    }

    /// Whether `ack` falls in the inclusive-exclusive range
    /// `[snd_una, snd_nxt + 1]` that §4.7 step 1 treats as "in range".
    /// Sequence numbers wrap, so this compares distances rather than raw
    /// magnitudes — a real connection's sequence space is a ring, not a
    /// bounded integer range.
    fn ack_in_range(&self, ack: u32) -> bool {
        let span = self.snd_nxt.wrapping_add(1).wrapping_sub(self.snd_una);
        let offset = ack.wrapping_sub(self.snd_una);
        offset <= span
    }

    /// Enter fast recovery (§4.7 "on entering recovery"): externally
    /// triggered by the caller (e.g. three duplicate acks observed
    /// upstream of this unit), not by anything `on_ack` itself decides.
    pub fn enter_recovery(&mut self) {
        self.state = CongestionState::FastRecovery;
    }

    /// Process one ack while `state == FastRecovery` (§4.7 steps 1-4).
    /// Only meaningful once [`enter_recovery`](Self::enter_recovery) has
    /// been called; callers in `Open` state should not call this.
    pub fn on_ack(&mut self, seg: AckSegment) -> AckOutcome {
        // Step 1: ignore acks outside [snd_una, snd_nxt+1].
        if !self.ack_in_range(seg.ack) {
            return AckOutcome::Ignored;
        }

        // Step 2: a segment carrying data, or updating the receiver
        // window, is never counted toward recovery accounting.
        if seg.segment_len != 0 || seg.segment_window != self.snd_wnd {
            return AckOutcome::Ignored;
        }

        // Step 3: pure duplicate for the retransmitted segment inflates
        // the window, capped at fr.max_cwnd.
        if !seg.rtx && seg.ack == self.fr.first {
            if self.snd_cwnd < self.fr.max_cwnd {
                self.snd_cwnd += 1;
            }
            return AckOutcome::Inflated;
        }

        // Step 4: partial ack. Advance fr.first, reset the dup count, and
        // tell the caller to resend the oldest unacked segment without
        // inflating the window.
        self.fr.first = seg.ack;
        self.dup_ack_count = 0;
        AckOutcome::PartialAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovering(snd_cwnd: u32, max_cwnd: u32, fr_first: u32) -> RenoRecovery {
        let mut r = RenoRecovery::new(0, 1000, snd_cwnd, 0);
        r.fr = FastRecoveryState {
            first: fr_first,
            max_cwnd,
        };
        r.state = CongestionState::FastRecovery;
        r
    }

    fn dup_ack(ack: u32) -> AckSegment {
        AckSegment {
            ack,
            segment_len: 0,
            segment_window: 0,
            rtx: false,
        }
    }

    #[test]
    fn inflate_on_duplicate_ack_for_retransmitted_segment() {
        let mut r = recovering(10, 20, 100);
        let outcome = r.on_ack(dup_ack(100));
        assert_eq!(outcome, AckOutcome::Inflated);
        assert_eq!(r.snd_cwnd, 11);
    }

    #[test]
    fn inflate_is_capped_at_max_cwnd() {
        let mut r = recovering(20, 20, 100);
        let outcome = r.on_ack(dup_ack(100));
        assert_eq!(outcome, AckOutcome::Inflated);
        assert_eq!(r.snd_cwnd, 20);
    }

    #[test]
    fn partial_ack_advances_first_and_resets_dup_count() {
        let mut r = recovering(10, 20, 100);
        r.dup_ack_count = 3;
        let outcome = r.on_ack(AckSegment {
            ack: 150,
            segment_len: 0,
            segment_window: 0,
            rtx: false,
        });
        assert_eq!(outcome, AckOutcome::PartialAck);
        assert_eq!(r.fr.first, 150);
        assert_eq!(r.dup_ack_count, 0);
        // Window is not inflated on a partial ack.
        assert_eq!(r.snd_cwnd, 10);
    }

    #[test]
    fn out_of_range_ack_is_ignored() {
        let mut r = recovering(10, 20, 100);
        let before = r;
        let below = r.on_ack(dup_ack(0u32.wrapping_sub(1)));
        assert_eq!(below, AckOutcome::Ignored);
        assert_eq!(r.snd_cwnd, before.snd_cwnd);
        assert_eq!(r.fr.first, before.fr.first);

        let above = r.on_ack(dup_ack(1002));
        assert_eq!(above, AckOutcome::Ignored);
        assert_eq!(r.snd_cwnd, before.snd_cwnd);
    }

    #[test]
    fn data_bearing_segment_is_ignored_regardless_of_ack() {
        let mut r = recovering(10, 20, 100);
        let outcome = r.on_ack(AckSegment {
            ack: 100,
            segment_len: 50,
            segment_window: 0,
            rtx: false,
        });
        assert_eq!(outcome, AckOutcome::Ignored);
        assert_eq!(r.snd_cwnd, 10);
    }

    #[test]
    fn rtx_flag_true_is_treated_as_partial_ack_path() {
        // ack == fr.first but rtx is true: this is not a "pure" duplicate,
        // so it falls through to the partial-ack branch per §4.7 step 3's
        // "rtx is false AND ack == fr.first" condition.
        let mut r = recovering(10, 20, 100);
        let outcome = r.on_ack(AckSegment {
            ack: 100,
            segment_len: 0,
            segment_window: 0,
            rtx: true,
        });
        assert_eq!(outcome, AckOutcome::PartialAck);
        assert_eq!(r.snd_cwnd, 10);
    }

    #[test]
    fn changed_receiver_window_is_ignored() {
        let mut r = recovering(10, 20, 100);
        let outcome = r.on_ack(AckSegment {
            ack: 100,
            segment_len: 0,
            segment_window: 5,
            rtx: false,
        });
        assert_eq!(outcome, AckOutcome::Ignored);
        assert_eq!(r.snd_cwnd, 10);
    }
}
