//! Prometheus 메트릭.
//!
//! 이벤트 버스, 발송, 모니터 사이클 지표를 `metrics` 파사드로 내보냅니다.
//! 레코더가 설치되지 않으면 모두 no-op입니다.

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use signal_core::MetricsConfig;
use tracing::info;

use crate::dispatch::DispatchOutcome;
use crate::event_bus::EventKind;

/// 엔드포인트 주소. 꺼져 있으면 `None`.
pub fn listen_addr(config: &MetricsConfig) -> Result<Option<SocketAddr>, AddrParseError> {
    if !config.enabled {
        return Ok(None);
    }
    config.listen_addr.parse().map(Some)
}

/// `/metrics` HTTP 엔드포인트를 띄웁니다. tokio 런타임 안에서 호출해야 합니다.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_event_published(kind: EventKind) {
    counter!("signal_bus_events_published_total", "kind" => kind.to_string()).increment(1);
}

/// 핸들러 한 번의 처리 결과.
pub fn record_handler_invocation(kind: EventKind, handler: &str, latency: Duration, ok: bool) {
    let kind = kind.to_string();
    let handler = handler.to_string();

    counter!(
        "signal_bus_handler_invocations_total",
        "kind" => kind.clone(),
        "handler" => handler.clone()
    )
    .increment(1);
    histogram!(
        "signal_bus_handler_duration_seconds",
        "kind" => kind.clone(),
        "handler" => handler.clone()
    )
    .record(latency.as_secs_f64());

    if !ok {
        counter!("signal_bus_handler_errors_total", "kind" => kind, "handler" => handler)
            .increment(1);
    }
}

pub fn record_dispatch(outcome: &DispatchOutcome) {
    let label = match outcome {
        DispatchOutcome::Sent { .. } => "sent",
        DispatchOutcome::Skipped(_) => "skipped",
        DispatchOutcome::Failed { .. } => "failed",
    };
    counter!("signal_dispatch_total", "outcome" => label).increment(1);
}

/// 모니터 사이클 하나의 결과.
pub fn record_cycle(processed: usize, signals: usize, errors: usize, duration: Duration) {
    counter!("signal_monitor_cycles_total").increment(1);
    counter!("signal_monitor_signals_total").increment(signals as u64);
    counter!("signal_monitor_instrument_errors_total").increment(errors as u64);
    gauge!("signal_monitor_instruments_processed").set(processed as f64);
    histogram!("signal_monitor_cycle_duration_seconds").record(duration.as_secs_f64());
}
