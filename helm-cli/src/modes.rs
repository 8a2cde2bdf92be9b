//! Per-mode execution paths, dispatched once config and the router are
//! wired up in `main`.
//!
//! Grounded on spec.md §6's three `mode` values and the end-to-end
//! scenarios in spec.md §8: each mode drives one configured action to
//! completion and returns — a strategy wanting repeated actions composes
//! the router itself or re-invokes the binary, per SPEC_FULL.md's
//! single-shot CLI framing.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use helm_core::config::{AppConfig, ConfigSide, Mode};
use helm_core::core::types::OrderState;
use helm_core::router::ExecutionRouter;
use helm_core::tracking_limit::TrackingLimitParams;

pub async fn run(config: &AppConfig, router: &ExecutionRouter) -> Result<()> {
    match config.mode {
        Mode::Market => run_market(config, router).await,
        Mode::TrackingLimit => run_tracking_limit(config, router).await,
        Mode::Diagnostic => run_diagnostic(config, router).await,
    }
}

async fn run_market(config: &AppConfig, router: &ExecutionRouter) -> Result<()> {
    let size_i = router
        .to_size_i(&config.symbol, config.qty)
        .await
        .context("scaling configured qty")?;
    let is_ask = matches!(config.side, ConfigSide::Sell);

    let order = router
        .submit_market(&config.symbol, is_ask, size_i, config.reduce_only, None)
        .await
        .context("submitting market order")?;
    info!(coi = order.coi(), state = %order.state(), "market order submitted");

    let timeout = Duration::from_secs_f64(config.timeout_secs);
    match order.wait_final(Some(timeout)).await {
        Some(state) => {
            info!(coi = order.coi(), %state, "market order reached terminal state");
            if state == OrderState::Failed {
                anyhow::bail!("market order {} reached Failed", order.coi());
            }
            Ok(())
        }
        None => anyhow::bail!(
            "market order {} did not reach a terminal state within {:?}",
            order.coi(),
            timeout
        ),
    }
}

async fn run_tracking_limit(config: &AppConfig, router: &ExecutionRouter) -> Result<()> {
    let base_amount_i = router
        .to_size_i(&config.symbol, config.qty)
        .await
        .context("scaling configured qty")?;
    let is_ask = matches!(config.side, ConfigSide::Sell);

    let params = TrackingLimitParams {
        interval_secs: Some(config.interval_secs),
        timeout_secs: Some(config.timeout_secs),
        price_offset_ticks: config.price_offset_ticks,
        max_attempts: None,
        post_only: false,
        reduce_only: config.reduce_only,
        trace_id: None,
    };

    let result = router
        .tracking_limit(&config.symbol, base_amount_i, is_ask, params)
        .await
        .context("running tracking limit")?;
    info!(
        coi = result.order.coi(),
        attempts = result.attempts_count(),
        filled_base_i = result.filled_base_i,
        "tracking limit run completed"
    );
    Ok(())
}

/// Read-only connectivity check: resolves precision, fetches the current
/// top of book, and reports any positions the venue already knows about.
/// Never submits or cancels an order.
async fn run_diagnostic(config: &AppConfig, router: &ExecutionRouter) -> Result<()> {
    let (price_decimals, size_decimals) = router
        .market_data()
        .get_price_size_decimals(&config.symbol)
        .await
        .context("fetching price/size decimals")?;
    let quote = router
        .market_data()
        .get_top_of_book(&config.symbol)
        .await
        .context("fetching top of book")?;
    info!(
        symbol = %config.symbol,
        price_decimals,
        size_decimals,
        bid_i = quote.bid_i,
        ask_i = quote.ask_i,
        "diagnostic snapshot"
    );

    for position in router.positions().all_positions() {
        info!(
            symbol = %position.canonical_symbol,
            base_qty = %position.base_qty,
            notional = %position.notional,
            "diagnostic position"
        );
    }
    Ok(())
}
