//! Pot-sharing payout schedule.
//!
//! Rank 1 receives a configured majority share of the pot; the remainder is
//! split across ranks 2..=paid_ranks by geometric decay (ratio 1/2),
//! normalized so the whole remainder is paid out. The last paid rank absorbs
//! rounding dust, which makes the schedule conserve the pot exactly. Ranks
//! beyond `paid_ranks` receive nothing.
//!
//! Each rank's payout is deterministic given only (pot, rank, config), so
//! per-player settlement calls need no shared state.

use crate::domain::Amount;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct PayoutSchedule {
    /// Fraction of the pot paid to rank 1 (e.g. 0.70).
    pub majority_share: Amount,
    /// Number of ranks that receive a payout.
    pub paid_ranks: u32,
}

impl PayoutSchedule {
    pub fn new(majority_share: Amount, paid_ranks: u32) -> Self {
        PayoutSchedule {
            majority_share,
            paid_ranks,
        }
    }

    /// Payout for one rank out of a pot.
    ///
    /// Rank numbering starts at 1; rank 0 is treated as out of schedule.
    pub fn payout(&self, pot: Amount, rank: u32) -> Amount {
        if !pot.is_positive() || rank == 0 || rank > self.paid_ranks {
            return Amount::zero();
        }

        // A single paid rank takes the whole pot, majority share or not.
        if self.paid_ranks == 1 {
            return if rank == 1 { pot } else { Amount::zero() };
        }

        let rank1 = (pot * self.majority_share).round_money();
        if rank == 1 {
            return rank1;
        }

        let remainder = pot - rank1;
        if rank < self.paid_ranks {
            (remainder * self.weight_fraction(rank)).round_money()
        } else {
            // Last paid rank: remainder minus what the earlier ranks took.
            let mut allocated = Amount::zero();
            for r in 2..self.paid_ranks {
                allocated = allocated + (remainder * self.weight_fraction(r)).round_money();
            }
            remainder - allocated
        }
    }

    /// Normalized weight for a non-winner rank: 0.5^(rank-2) / sum of weights.
    fn weight_fraction(&self, rank: u32) -> Amount {
        let half = Decimal::new(5, 1);
        let mut weight = Decimal::ONE;
        let mut total = Decimal::ZERO;
        let mut rank_weight = Decimal::ZERO;
        for r in 2..=self.paid_ranks {
            if r == rank {
                rank_weight = weight;
            }
            total += weight;
            weight *= half;
        }
        Amount::new(rank_weight / total)
    }
}
