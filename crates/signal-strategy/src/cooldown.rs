//! 종목별 쿨다운 게이트.
//!
//! 마지막 발송 시각으로부터 쿨다운이 지나야 다음 시그널을 허용합니다.
//! 시각은 발송이 성공한 뒤에만 갱신합니다.

use chrono::{DateTime, Utc};
use signal_core::InstrumentContext;
use tracing::debug;

/// `now - last_signal_at > cooldown`이면 true. 한 번도 보낸 적 없으면 true.
pub fn should_signal(ctx: &InstrumentContext, now: DateTime<Utc>) -> bool {
    match ctx.last_signal_at {
        None => true,
        Some(last) => {
            let allowed = now - last > ctx.cooldown();
            if !allowed {
                debug!(
                    instrument = %ctx.key(),
                    remaining_secs = (ctx.cooldown() - (now - last)).num_seconds(),
                    "Instrument in cooldown"
                );
            }
            allowed
        }
    }
}

/// 발송 성공 시각을 기록합니다. 시각은 뒤로 가지 않습니다.
pub fn record_signal(ctx: &mut InstrumentContext, at: DateTime<Utc>) {
    ctx.last_signal_at = Some(match ctx.last_signal_at {
        Some(last) if last > at => last,
        _ => at,
    });
}
