//! A short, low load run against the simulation endpoint, gated by a check rate threshold so it
//! can act as a CI health gate for the target service.

use anyhow::Context;
use gust_http_client::prelude::{Check, HttpClientConfig, InstrumentedHttpClient};
use gust_runner::prelude::*;
use std::time::Duration;

#[derive(Debug, Default)]
struct ScenarioValues {
    client_config: Option<HttpClientConfig>,
}

impl UserValuesConstraint for ScenarioValues {}

#[derive(Debug, Default)]
struct VuValues {
    client: Option<InstrumentedHttpClient>,
}

impl UserValuesConstraint for VuValues {}

fn setup(ctx: &mut RunnerContext<ScenarioValues>) -> HookResult {
    let config = HttpClientConfig::new(ctx.target()?)?
        .with_connection_reuse(ctx.connection_reuse())
        .with_check(Check::status_is(200))
        .with_check(Check::latency_below(Duration::from_millis(500)));
    ctx.get_mut().client_config = Some(config);

    Ok(())
}

fn vu_setup(ctx: &mut VuContext<ScenarioValues, VuValues>) -> HookResult {
    let config = ctx
        .runner_context()
        .get()
        .client_config
        .clone()
        .context("The HTTP client config was not set up")?;

    let client = InstrumentedHttpClient::new(config, ctx.runner_context().reporter())?
        .with_attr("vu", ctx.vu_id());
    ctx.get_mut().client = Some(client);

    Ok(())
}

fn vu_behaviour(ctx: &mut VuContext<ScenarioValues, VuValues>) -> HookResult {
    let client = ctx
        .get()
        .client
        .clone()
        .context("The HTTP client was not set up")?;
    let iterations = ctx.runner_context().iterations();

    ctx.runner_context().executor().execute_in_place(async move {
        // A failed request has already been recorded against the checks, carry on.
        let _ = client.get_simulate(iterations).await;

        Ok(())
    })?;

    Ok(())
}

fn main() -> GustResult<()> {
    let builder = ScenarioDefinitionBuilder::<ScenarioValues, VuValues>::new(
        env!("CARGO_PKG_NAME"),
        init(),
    )
    .with_default_vus(5)
    .with_default_duration(Duration::from_secs(30))
    .with_default_iterations(1_000)
    .with_default_pace(Duration::from_millis(100))
    .with_default_fail_on_check_rate(0.99)
    .use_setup(setup)
    .use_vu_setup(vu_setup)
    .use_behaviour(vu_behaviour);

    let summary = run(builder)?;
    summary.into_result()?;

    Ok(())
}
