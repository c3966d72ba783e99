//! Stream lifecycle state machine.
//!
//! Every reachable (membership state, resolved tier) pair maps to exactly
//! one action. Crossing the lowest tier's floor is the only transition that
//! mints or burns a badge; rate changes that stay above it re-rank in place.

use anchor_lang::prelude::*;

use crate::errors::FlowpassError;
use crate::state::{Badge, Config, Subscription};

/// What a stream event does to the member's subscription and badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a subscription at the tier and mint its badge.
    Open { tier_id: u16 },

    /// Rate unchanged or moved within the current tier band.
    Retain,

    /// Rate crossed a tier boundary while staying above the floor; the
    /// subscription moves to the new tier, the badge is untouched.
    Rerank { tier_id: u16 },

    /// Stream stopped or fell below the lowest tier; release and burn.
    Close,

    /// No subscription exists and the rate does not earn one.
    Ignore,
}

/// Decide the action for an account whose stream now resolves to
/// `resolved_tier`. A deleted stream resolves to no tier.
pub fn plan(current_tier: Option<u16>, resolved_tier: Option<u16>) -> Action {
    match (current_tier, resolved_tier) {
        (None, Some(tier_id)) => Action::Open { tier_id },
        (None, None) => Action::Ignore,
        (Some(current), Some(resolved)) if resolved == current => Action::Retain,
        (Some(_), Some(resolved)) => Action::Rerank { tier_id: resolved },
        (Some(_), None) => Action::Close,
    }
}

/// Apply one stream lifecycle event to a member's records.
///
/// `flow_rate` is the rate after the event, `None` for a deleted stream.
/// Returns the action taken so the caller can settle the accounts backing
/// the records. Fails without touching anything if the subscription and
/// badge records disagree.
#[allow(clippy::too_many_arguments)]
pub fn apply_stream_event(
    config: &mut Config,
    subscription: &mut Subscription,
    badge: &mut Badge,
    member: Pubkey,
    flow_rate: Option<i64>,
    now: i64,
    subscription_bump: u8,
    badge_bump: u8,
) -> Result<Action> {
    ensure_ledgers_agree(subscription, badge, member)?;

    let resolved = flow_rate.and_then(|rate| config.resolve_tier(rate));
    let action = plan(subscription.tier(), resolved);

    match action {
        Action::Open { tier_id } => {
            let id = config.take_subscription_id();
            subscription.open(id, member, tier_id, now, subscription_bump)?;
            badge.issue(member, id, now, badge_bump)?;
            msg!("Flowpass: {} subscribed at tier {}, badge {} minted", member, tier_id, id);
        }
        Action::Rerank { tier_id } => {
            let previous = subscription.tier_id;
            subscription.rerank(tier_id)?;
            msg!("Flowpass: {} moved from tier {} to tier {}", member, previous, tier_id);
        }
        Action::Close => {
            let token_id = subscription.release()?;
            badge.revoke(token_id, member)?;
            msg!("Flowpass: {} unsubscribed, badge {} burned", member, token_id);
        }
        Action::Retain | Action::Ignore => {}
    }

    Ok(action)
}

/// A subscription without a badge, a badge without a subscription, or a
/// mismatched pairing means the books are wrong. Refuse to guess.
fn ensure_ledgers_agree(subscription: &Subscription, badge: &Badge, member: Pubkey) -> Result<()> {
    match (subscription.is_active(), badge.is_minted()) {
        (false, false) => Ok(()),
        (true, true) => {
            require!(
                subscription.member == member
                    && badge.owner == member
                    && badge.token_id == subscription.token_id,
                FlowpassError::InvariantViolation
            );
            Ok(())
        }
        _ => Err(FlowpassError::InvariantViolation.into()),
    }
}
