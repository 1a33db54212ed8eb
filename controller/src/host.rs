use std::{path::Path, time::Duration};

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use presence_common::{ActiveWindow, Config, LightCommand, LightEngine, LightState};

use crate::{
    gateway::{GatewayClient, GatewayError},
    prober::{active_device_count, HcitoolProber, RssiProber},
};

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw = tokio::fs::read_to_string(config_path)
        .await
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    let config = Config::from_yaml_str(&raw)
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    let now = now_in_timezone(config.timezone);
    match config.hours.resolve(now) {
        Ok((begin, end)) => info!("effective hours: [{begin}, {end}]"),
        Err(err) => warn!(
            "effective hours [{}, {}] unavailable today: {err}",
            config.hours.begin, config.hours.end
        ),
    }
    if config.devices.is_empty() {
        warn!("no devices configured, presence will never be detected");
    }

    let probers: Vec<HcitoolProber> = config.devices.iter().map(HcitoolProber::new).collect();
    let gateway = GatewayClient::new(&config.gateway).context("failed to build gateway client")?;
    let mut engine = LightEngine::new();

    let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "presence controller started with {} device(s), gateway {}",
        probers.len(),
        config.gateway.url
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, light left {}", engine.state().as_str());
                return Ok(());
            }
            _ = interval.tick() => {}
        }

        let now = now_in_timezone(config.timezone);
        if let Err(err) = run_tick(&mut engine, &probers, &config.hours, &gateway, now).await {
            error!("{err}: {}", err.last);
        }
    }
}

/// One poll: probe, advance the engine and deliver any resulting command.
/// The engine keeps its new state even when delivery fails.
pub(crate) async fn run_tick<P: RssiProber>(
    engine: &mut LightEngine,
    probers: &[P],
    window: &ActiveWindow,
    gateway: &GatewayClient,
    now: DateTime<FixedOffset>,
) -> Result<Option<LightCommand>, GatewayError> {
    let present = active_device_count(probers).await;
    let previous = engine.state();
    let command = engine.tick(present, || in_active_window(window, now));

    match command {
        Some(LightCommand::TurnOn) => info!("device found, turn on the light"),
        Some(LightCommand::TurnOff) => info!("device not found, turn off the light"),
        None if present > 0 && previous == LightState::Off => {
            debug!("device found, but keep the light off")
        }
        None if present == 0 && previous == LightState::On => {
            debug!("current lost count: {}", engine.lost_count())
        }
        None => {}
    }

    if let Some(command) = command {
        gateway.send(command).await?;
    }
    Ok(command)
}

fn in_active_window(window: &ActiveWindow, now: DateTime<FixedOffset>) -> bool {
    match window.contains(now) {
        Ok(active) => {
            debug!("active window check at {}: {active}", now.time());
            active
        }
        Err(err) => {
            warn!("cannot evaluate active window, treating as inactive: {err}");
            false
        }
    }
}

fn now_in_timezone(timezone: Option<Tz>) -> DateTime<FixedOffset> {
    match timezone {
        Some(tz) => {
            let local = Utc::now().with_timezone(&tz);
            local.with_timezone(&local.offset().fix())
        }
        None => {
            let local = Local::now();
            local.with_timezone(&local.offset().fix())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use presence_common::{GatewayConfig, HourSpec};
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::prober::tests::FixedProber;

    const NOBODY: [FixedProber; 2] = [FixedProber(None), FixedProber(Some(-60))];
    const SOMEONE: [FixedProber; 2] = [FixedProber(None), FixedProber(Some(-3))];

    fn evening_window() -> ActiveWindow {
        ActiveWindow {
            begin: HourSpec::Fixed { hour: 17 },
            end: HourSpec::Fixed { hour: 23 },
        }
    }

    fn at_hour(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, hour, 0, 0)
            .unwrap()
    }

    fn gateway(server: &MockServer) -> GatewayClient {
        GatewayClient::new(&GatewayConfig {
            url: server.uri(),
            auth: "secret".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    async fn mount_intent(server: &MockServer, what: &str, calls: u64) {
        Mock::given(method("POST"))
            .and(body_json(json!({"what": what, "auth": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(calls)
            .mount(server)
            .await;
    }

    async fn switch_off(engine: &mut LightEngine, gateway: &GatewayClient) {
        for _ in 0..4 {
            run_tick(engine, &NOBODY, &evening_window(), gateway, at_hour(12))
                .await
                .unwrap();
        }
        assert_eq!(engine.state(), LightState::Off);
    }

    #[tokio::test]
    async fn absence_sends_single_turn_off() {
        let server = MockServer::start().await;
        mount_intent(&server, "turn_off", 1).await;
        let gateway = gateway(&server);
        let mut engine = LightEngine::new();

        let mut sent = Vec::new();
        for _ in 0..8 {
            let command = run_tick(&mut engine, &NOBODY, &evening_window(), &gateway, at_hour(12))
                .await
                .unwrap();
            sent.extend(command);
        }

        assert_eq!(sent, vec![LightCommand::TurnOff]);
    }

    #[tokio::test]
    async fn presence_outside_window_sends_nothing() {
        let server = MockServer::start().await;
        mount_intent(&server, "turn_off", 1).await;
        mount_intent(&server, "turn_on", 0).await;
        let gateway = gateway(&server);
        let mut engine = LightEngine::new();
        switch_off(&mut engine, &gateway).await;

        for hour in [6, 12, 16] {
            let command = run_tick(&mut engine, &SOMEONE, &evening_window(), &gateway, at_hour(hour))
                .await
                .unwrap();
            assert_eq!(command, None);
        }
        assert_eq!(engine.state(), LightState::Off);
    }

    #[tokio::test]
    async fn presence_inside_window_sends_single_turn_on() {
        let server = MockServer::start().await;
        mount_intent(&server, "turn_off", 1).await;
        mount_intent(&server, "turn_on", 1).await;
        let gateway = gateway(&server);
        let mut engine = LightEngine::new();
        switch_off(&mut engine, &gateway).await;

        let mut sent = Vec::new();
        for _ in 0..3 {
            let command = run_tick(&mut engine, &SOMEONE, &evening_window(), &gateway, at_hour(20))
                .await
                .unwrap();
            sent.extend(command);
        }

        assert_eq!(sent, vec![LightCommand::TurnOn]);
        assert_eq!(engine.state(), LightState::On);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_new_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(5)
            .mount(&server)
            .await;
        let gateway = gateway(&server);
        let mut engine = LightEngine::new();

        for _ in 0..3 {
            run_tick(&mut engine, &NOBODY, &evening_window(), &gateway, at_hour(12))
                .await
                .unwrap();
        }
        let err = run_tick(&mut engine, &NOBODY, &evening_window(), &gateway, at_hour(12))
            .await
            .unwrap_err();

        assert_eq!(err.command, LightCommand::TurnOff);
        assert_eq!(engine.state(), LightState::Off);
    }

    #[test]
    fn now_honours_configured_timezone() {
        let now = now_in_timezone(Some(chrono_tz::Asia::Kolkata));
        assert_eq!(now.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }
}
