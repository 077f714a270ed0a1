//! Message text for trade events, alerts and status reports

use chrono::{DateTime, Utc};

use crate::position::Position;

pub fn buy_message(asset: &str, price: f64, notional: f64, reason: &str, signature: &str) -> String {
    format!(
        "📈 BUY {}\nPrice: {:.8}\nAmount: {:.2} USDC\nReason: {}\nTx: {}",
        asset, price, notional, reason, signature
    )
}

pub fn sell_message(asset: &str, price: f64, reason: &str, pnl: f64, pnl_pct: f64, reconciled: bool) -> String {
    let icon = if pnl >= 0.0 { "🟢" } else { "🔴" };
    format!(
        "📉 SELL {}\nPrice: {:.8}\nReason: {}\nP&L: {} {:+.2} USDC ({:+.2}%){}",
        asset,
        price,
        reason,
        icon,
        pnl,
        pnl_pct,
        if reconciled { "" } else { " (estimated)" }
    )
}

pub fn fatal_alert(action: &str, asset: &str, attempts: u32, error: &str) -> String {
    format!(
        "🚨 {} {} FAILED after {} attempts\nLast error: {}\nManual check required.",
        action, asset, attempts, error
    )
}

/// One line per open position for status reports
pub fn position_line(name: &str, position: &Position, price: Option<f64>, trail_pct: f64) -> String {
    let mut line = format!(
        "#{} {} entry {:.8}, high {:.8}",
        position.id, name, position.entry_price, position.highest_price
    );

    if let Some(price) = price {
        line.push_str(&format!(
            ", now {:.8} ({:+.2}%, {:+.2} USDC, {:.2}% below high)",
            price,
            position.pnl_pct(price),
            position.pnl_value(price),
            position.drawdown_from_high_pct(price)
        ));
    }

    match (position.trailing_stop(trail_pct), position.pnl_pct_at_stop(trail_pct)) {
        (Some(stop), Some(at_stop)) => {
            line.push_str(&format!(", stop {:.8} ({:+.2}% at stop)", stop, at_stop))
        }
        _ => line.push_str(", trailing not armed"),
    }
    line
}

/// Per-cycle market analysis summary
pub fn analysis_summary(
    raw: f64,
    momentum: f64,
    adjusted: f64,
    degraded: bool,
    open: usize,
    max_open: usize,
) -> String {
    format!(
        "📊 Market health {:+.2} (raw {:+.2}, momentum {:+.3}){}\nPositions: {}/{}",
        adjusted,
        raw,
        momentum,
        if degraded { " [degraded]" } else { "" },
        open,
        max_open
    )
}

pub fn heartbeat(
    uptime: &str,
    cycles: u64,
    open: usize,
    health: f64,
    api_success_rate: f64,
    realized_pnl: f64,
) -> String {
    format!(
        "💓 Alive for {} ({} cycles)\nOpen positions: {}\nMarket health: {:+.2}\nAPI success: {:.1}%\nRealized P&L: {:+.2} USDC",
        uptime, cycles, open, health, api_success_rate, realized_pnl
    )
}

pub fn uptime(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - started_at).num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}
