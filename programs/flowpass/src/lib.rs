use anchor_lang::prelude::*;
use anchor_lang::AccountsClose;

pub mod errors;
pub mod state;
pub mod transition;

use errors::FlowpassError;
use state::{
    Badge, Config, Subscription, BADGE_SEED, CONFIG_SEED, MAX_NAME_LEN, MAX_SYMBOL_LEN,
    SUBSCRIPTION_SEED,
};
use transition::{apply_stream_event, Action};

declare_id!("Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS");

#[program]
pub mod flowpass {
    use super::*;

    /// Create the program config.
    ///
    /// The signer becomes the administrator. `stream_authority` is the
    /// streaming-protocol host that will deliver stream lifecycle events;
    /// `accepted_token` is the only payment token streams may pay in.
    pub fn initialize(
        ctx: Context<Initialize>,
        stream_authority: Pubkey,
        accepted_token: Pubkey,
        name: String,
        symbol: String,
    ) -> Result<()> {
        require!(name.len() <= MAX_NAME_LEN, FlowpassError::MetadataTooLong);
        require!(symbol.len() <= MAX_SYMBOL_LEN, FlowpassError::MetadataTooLong);

        let config = &mut ctx.accounts.config;
        config.admin = ctx.accounts.admin.key();
        config.stream_authority = stream_authority;
        config.accepted_token = accepted_token;
        config.name = name;
        config.symbol = symbol;
        config.tiers = Vec::new();
        config.next_subscription_id = 1;
        config.bump = ctx.bumps.config;

        msg!(
            "Flowpass: {} ({}) initialized, host {}",
            config.name,
            config.symbol,
            config.stream_authority
        );
        Ok(())
    }

    /// Register the next membership tier.
    ///
    /// Tiers are append-only; each new tier must require a strictly higher
    /// flow rate than the last so rank order stays well-defined.
    pub fn create_tier(ctx: Context<CreateTier>, min_flow_rate: u64) -> Result<()> {
        let tier_id = ctx.accounts.config.push_tier(min_flow_rate)?;
        msg!("Flowpass: tier {} created, min flow rate {}/s", tier_id, min_flow_rate);
        Ok(())
    }

    /// Stream lifecycle callback: a stream to the program was created.
    ///
    /// Tier eligibility is derived from the observed flow rate alone;
    /// `user_data` is an untrusted hint and never decides anything.
    pub fn on_stream_created(
        ctx: Context<StreamHook>,
        token: Pubkey,
        flow_rate: i64,
        _user_data: Vec<u8>,
    ) -> Result<()> {
        process_stream_event(ctx, token, Some(flow_rate))
    }

    /// Stream lifecycle callback: an existing stream changed its rate.
    pub fn on_stream_updated(
        ctx: Context<StreamHook>,
        token: Pubkey,
        new_flow_rate: i64,
        _user_data: Vec<u8>,
    ) -> Result<()> {
        process_stream_event(ctx, token, Some(new_flow_rate))
    }

    /// Stream lifecycle callback: a stream to the program was deleted.
    pub fn on_stream_deleted(
        ctx: Context<StreamHook>,
        token: Pubkey,
        _user_data: Vec<u8>,
    ) -> Result<()> {
        process_stream_event(ctx, token, None)
    }
}

/// Shared path for all three lifecycle callbacks.
///
/// `flow_rate` is the stream's rate after the event, `None` once deleted.
/// Duplicate delivery is harmless: an event the state has already absorbed
/// plans to `Retain` or `Ignore` and changes nothing.
fn process_stream_event<'info>(
    ctx: Context<'_, '_, '_, 'info, StreamHook<'info>>,
    token: Pubkey,
    flow_rate: Option<i64>,
) -> Result<()> {
    require_keys_eq!(
        token,
        ctx.accounts.config.accepted_token,
        FlowpassError::UnsupportedToken
    );

    let member = ctx.accounts.member.key();
    let now = Clock::get()?.unix_timestamp;

    let action = apply_stream_event(
        &mut ctx.accounts.config,
        &mut ctx.accounts.subscription,
        &mut ctx.accounts.badge,
        member,
        flow_rate,
        now,
        ctx.bumps.subscription,
        ctx.bumps.badge,
    )?;

    // Closed or never-activated records do not outlive the event; their rent
    // goes back to the host that fronted it.
    if matches!(action, Action::Close | Action::Ignore) {
        let rent_collector = ctx.accounts.stream_authority.to_account_info();
        ctx.accounts.subscription.close(rent_collector.clone())?;
        ctx.accounts.badge.close(rent_collector)?;
    }

    Ok(())
}

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(mut)]
    pub admin: Signer<'info>,

    #[account(
        init,
        payer = admin,
        space = 8 + Config::INIT_SPACE,
        seeds = [CONFIG_SEED],
        bump,
    )]
    pub config: Account<'info, Config>,

    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct CreateTier<'info> {
    pub admin: Signer<'info>,

    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ FlowpassError::Unauthorized,
    )]
    pub config: Account<'info, Config>,
}

#[derive(Accounts)]
pub struct StreamHook<'info> {
    #[account(mut)]
    pub stream_authority: Signer<'info>,

    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = stream_authority @ FlowpassError::Unauthorized,
    )]
    pub config: Account<'info, Config>,

    /// CHECK: the stream's sender; only its address is used, as the seed for
    /// the subscription and badge records below.
    pub member: UncheckedAccount<'info>,

    #[account(
        init_if_needed,
        payer = stream_authority,
        space = 8 + Subscription::INIT_SPACE,
        seeds = [SUBSCRIPTION_SEED, member.key().as_ref()],
        bump,
    )]
    pub subscription: Account<'info, Subscription>,

    #[account(
        init_if_needed,
        payer = stream_authority,
        space = 8 + Badge::INIT_SPACE,
        seeds = [BADGE_SEED, member.key().as_ref()],
        bump,
    )]
    pub badge: Account<'info, Badge>,

    pub system_program: Program<'info, System>,
}
