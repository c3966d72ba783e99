use anchor_lang::prelude::*;

use crate::errors::FlowpassError;

/// Upper bound on the tier registry; fixes the config account's footprint.
pub const MAX_TIERS: usize = 16;

/// Stored length limits for the badge collection metadata.
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_SYMBOL_LEN: usize = 10;

pub const CONFIG_SEED: &[u8] = b"config";
pub const SUBSCRIPTION_SEED: &[u8] = b"subscription";
pub const BADGE_SEED: &[u8] = b"badge";

/// A membership rank and the minimum per-second flow rate that earns it.
///
/// Tiers are append-only and strictly increasing in rate, so creation order
/// doubles as rank order.
#[derive(Clone, Copy, InitSpace, AnchorSerialize, AnchorDeserialize)]
pub struct Tier {
    /// Sequential id, first tier is 1. Never reused.
    pub id: u16,

    /// Minimum flow rate (token units per second) for this tier or higher.
    pub min_flow_rate: u64,
}

/// Program config and tier registry.
/// Seeds: [b"config"]
#[account]
#[derive(InitSpace, Default)]
pub struct Config {
    /// May create tiers.
    pub admin: Pubkey,

    /// The streaming-protocol host; the only signer allowed to deliver
    /// stream lifecycle events.
    pub stream_authority: Pubkey,

    /// Streams paying in any other token are rejected.
    pub accepted_token: Pubkey,

    /// Badge collection name.
    #[max_len(MAX_NAME_LEN)]
    pub name: String,

    /// Badge collection symbol.
    #[max_len(MAX_SYMBOL_LEN)]
    pub symbol: String,

    /// Registered tiers, ascending by min_flow_rate.
    #[max_len(MAX_TIERS)]
    pub tiers: Vec<Tier>,

    /// Next subscription id to hand out. Starts at 1 and only grows, so
    /// ids stay unique across open/close cycles.
    pub next_subscription_id: u64,

    /// Bump seed for PDA derivation
    pub bump: u8,
}

impl Config {
    pub fn tier_count(&self) -> u16 {
        self.tiers.len() as u16
    }

    pub fn next_tier_id(&self) -> u16 {
        self.tier_count() + 1
    }

    /// Append a tier with the next sequential id.
    ///
    /// Rates must be positive and strictly above the previous tier's rate;
    /// anything else would leave rank order ambiguous.
    pub fn push_tier(&mut self, min_flow_rate: u64) -> Result<u16> {
        require!(min_flow_rate > 0, FlowpassError::InvalidRate);
        if let Some(last) = self.tiers.last() {
            require!(min_flow_rate > last.min_flow_rate, FlowpassError::InvalidRate);
        }
        require!(self.tiers.len() < MAX_TIERS, FlowpassError::TierRegistryFull);

        let id = self.next_tier_id();
        self.tiers.push(Tier { id, min_flow_rate });
        Ok(id)
    }

    /// The highest tier whose minimum rate the stream meets, if any.
    ///
    /// Non-positive rates never qualify; a deleted stream reports no rate
    /// at all and is handled upstream.
    pub fn resolve_tier(&self, flow_rate: i64) -> Option<u16> {
        if flow_rate <= 0 {
            return None;
        }
        let rate = flow_rate as u64;
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.min_flow_rate <= rate)
            .map(|tier| tier.id)
    }

    /// Minimum flow rate of a tier, for clients pricing a stream.
    pub fn flow_rate_of(&self, tier_id: u16) -> Option<u64> {
        if tier_id == 0 {
            return None;
        }
        self.tiers
            .get(tier_id as usize - 1)
            .map(|tier| tier.min_flow_rate)
    }

    pub fn take_subscription_id(&mut self) -> u64 {
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        id
    }
}

/// A member's active subscription: which tier their stream currently earns
/// and which badge it is paired with. Exists only while the stream pays at
/// or above the lowest tier's rate.
/// Seeds: [b"subscription", member_pubkey]
#[account]
#[derive(InitSpace, Default)]
pub struct Subscription {
    /// Sequential id assigned at open, first subscription is 1. Zero means
    /// the record is blank.
    pub id: u64,

    /// The paying account.
    pub member: Pubkey,

    /// Tier the stream currently qualifies for.
    pub tier_id: u16,

    /// The paired badge; equal to `id`.
    pub token_id: u64,

    /// Unix timestamp when the subscription opened
    pub opened_at: i64,

    /// Bump seed for PDA derivation
    pub bump: u8,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.id != 0
    }

    /// Current tier, none if the record is blank.
    pub fn tier(&self) -> Option<u16> {
        if self.is_active() {
            Some(self.tier_id)
        } else {
            None
        }
    }

    pub fn open(&mut self, id: u64, member: Pubkey, tier_id: u16, now: i64, bump: u8) -> Result<()> {
        require!(!self.is_active(), FlowpassError::AlreadySubscribed);

        self.id = id;
        self.member = member;
        self.tier_id = tier_id;
        self.token_id = id;
        self.opened_at = now;
        self.bump = bump;
        Ok(())
    }

    /// Move an active subscription to another tier. The badge is untouched.
    pub fn rerank(&mut self, new_tier_id: u16) -> Result<()> {
        require!(self.is_active(), FlowpassError::NotSubscribed);

        self.tier_id = new_tier_id;
        Ok(())
    }

    /// Blank the record and return the freed token id for the burn.
    pub fn release(&mut self) -> Result<u64> {
        require!(self.is_active(), FlowpassError::NotSubscribed);

        let token_id = self.token_id;
        *self = Subscription::default();
        Ok(token_id)
    }
}

/// The membership badge record. One per owner, minted at open and burned at
/// close; in-band tier changes never touch it.
/// Seeds: [b"badge", owner_pubkey]
#[account]
#[derive(InitSpace, Default)]
pub struct Badge {
    /// The wallet this badge belongs to.
    pub owner: Pubkey,

    /// Token id, equal to the paired subscription's id. Zero means unminted.
    pub token_id: u64,

    /// Unix timestamp when the badge was minted
    pub issued_at: i64,

    /// Bump seed for PDA derivation
    pub bump: u8,
}

impl Badge {
    pub fn is_minted(&self) -> bool {
        self.token_id != 0
    }

    /// Holder of the given token, none if this record does not back it.
    pub fn owner_of(&self, token_id: u64) -> Option<Pubkey> {
        if self.is_minted() && self.token_id == token_id {
            Some(self.owner)
        } else {
            None
        }
    }

    pub fn issue(&mut self, owner: Pubkey, token_id: u64, now: i64, bump: u8) -> Result<()> {
        // Minting over a live badge can only mean the ledgers disagree.
        require!(!self.is_minted(), FlowpassError::InvariantViolation);

        self.owner = owner;
        self.token_id = token_id;
        self.issued_at = now;
        self.bump = bump;
        Ok(())
    }

    pub fn revoke(&mut self, token_id: u64, owner: Pubkey) -> Result<()> {
        require!(
            self.is_minted() && self.token_id == token_id && self.owner == owner,
            FlowpassError::InvariantViolation
        );

        *self = Badge::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Config {
        Config {
            next_subscription_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn tiers_get_sequential_ids() {
        let mut config = registry();
        assert_eq!(config.next_tier_id(), 1);

        assert_eq!(config.push_tier(10).unwrap(), 1);
        assert_eq!(config.push_tier(100).unwrap(), 2);
        assert_eq!(config.push_tier(1_000).unwrap(), 3);

        assert_eq!(config.tier_count(), 3);
        assert_eq!(config.next_tier_id(), 4);
    }

    #[test]
    fn tier_rates_must_strictly_increase() {
        let mut config = registry();
        config.push_tier(100).unwrap();

        assert_eq!(
            config.push_tier(100).unwrap_err(),
            FlowpassError::InvalidRate.into()
        );
        assert_eq!(
            config.push_tier(99).unwrap_err(),
            FlowpassError::InvalidRate.into()
        );
        assert_eq!(config.tier_count(), 1);
    }

    #[test]
    fn tier_rate_must_be_positive() {
        let mut config = registry();
        assert_eq!(
            config.push_tier(0).unwrap_err(),
            FlowpassError::InvalidRate.into()
        );
        assert_eq!(config.tier_count(), 0);
    }

    #[test]
    fn registry_capacity_is_bounded() {
        let mut config = registry();
        for i in 0..MAX_TIERS {
            config.push_tier((i as u64 + 1) * 10).unwrap();
        }
        assert_eq!(
            config.push_tier(u64::MAX).unwrap_err(),
            FlowpassError::TierRegistryFull.into()
        );
        assert_eq!(config.tier_count(), MAX_TIERS as u16);
    }

    #[test]
    fn resolve_picks_highest_qualifying_tier() {
        let mut config = registry();
        config.push_tier(10).unwrap();
        config.push_tier(100).unwrap();
        config.push_tier(1_000).unwrap();

        assert_eq!(config.resolve_tier(9), None);
        assert_eq!(config.resolve_tier(10), Some(1));
        assert_eq!(config.resolve_tier(99), Some(1));
        assert_eq!(config.resolve_tier(100), Some(2));
        assert_eq!(config.resolve_tier(500), Some(2));
        assert_eq!(config.resolve_tier(1_000), Some(3));
        assert_eq!(config.resolve_tier(i64::MAX), Some(3));
    }

    #[test]
    fn nonpositive_rates_never_qualify() {
        let mut config = registry();
        config.push_tier(10).unwrap();

        assert_eq!(config.resolve_tier(0), None);
        assert_eq!(config.resolve_tier(-10), None);
        assert_eq!(config.resolve_tier(i64::MIN), None);
    }

    #[test]
    fn resolve_on_empty_registry_is_none() {
        let config = registry();
        assert_eq!(config.resolve_tier(i64::MAX), None);
    }

    #[test]
    fn flow_rate_lookup() {
        let mut config = registry();
        config.push_tier(10).unwrap();
        config.push_tier(100).unwrap();

        assert_eq!(config.flow_rate_of(0), None);
        assert_eq!(config.flow_rate_of(1), Some(10));
        assert_eq!(config.flow_rate_of(2), Some(100));
        assert_eq!(config.flow_rate_of(3), None);
    }

    #[test]
    fn subscription_ids_are_monotone() {
        let mut config = registry();
        assert_eq!(config.take_subscription_id(), 1);
        assert_eq!(config.take_subscription_id(), 2);
        assert_eq!(config.take_subscription_id(), 3);
        assert_eq!(config.next_subscription_id, 4);
    }

    #[test]
    fn double_open_is_rejected() {
        let member = Pubkey::new_unique();
        let mut subscription = Subscription::default();
        subscription.open(1, member, 1, 0, 255).unwrap();

        assert_eq!(
            subscription.open(2, member, 1, 0, 255).unwrap_err(),
            FlowpassError::AlreadySubscribed.into()
        );
        assert_eq!(subscription.id, 1);
    }

    #[test]
    fn blank_records_reject_mutation() {
        let mut subscription = Subscription::default();
        assert_eq!(
            subscription.rerank(2).unwrap_err(),
            FlowpassError::NotSubscribed.into()
        );
        assert_eq!(
            subscription.release().unwrap_err(),
            FlowpassError::NotSubscribed.into()
        );
    }

    #[test]
    fn release_frees_the_token_id() {
        let mut subscription = Subscription::default();
        subscription.open(7, Pubkey::new_unique(), 2, 0, 255).unwrap();

        assert_eq!(subscription.release().unwrap(), 7);
        assert!(!subscription.is_active());
        assert_eq!(subscription.tier(), None);
    }

    #[test]
    fn badge_ownership_queries() {
        let owner = Pubkey::new_unique();
        let mut badge = Badge::default();
        assert_eq!(badge.owner_of(1), None);

        badge.issue(owner, 1, 0, 255).unwrap();
        assert_eq!(badge.owner_of(1), Some(owner));
        assert_eq!(badge.owner_of(2), None);

        badge.revoke(1, owner).unwrap();
        assert_eq!(badge.owner_of(1), None);
    }

    #[test]
    fn badge_guards_fire_on_misuse() {
        let owner = Pubkey::new_unique();
        let mut badge = Badge::default();
        badge.issue(owner, 1, 0, 255).unwrap();

        assert_eq!(
            badge.issue(owner, 2, 0, 255).unwrap_err(),
            FlowpassError::InvariantViolation.into()
        );
        assert_eq!(
            badge.revoke(2, owner).unwrap_err(),
            FlowpassError::InvariantViolation.into()
        );
        assert_eq!(
            badge.revoke(1, Pubkey::new_unique()).unwrap_err(),
            FlowpassError::InvariantViolation.into()
        );

        badge.revoke(1, owner).unwrap();
        assert!(!badge.is_minted());
    }
}
