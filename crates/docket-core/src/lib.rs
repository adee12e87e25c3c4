pub mod activity;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod render;
pub mod slot;
pub mod store;
pub mod tools;
pub mod workbook;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting docket CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.docketrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let slot = slot::FileSlot::open(
    &data_dir,
    &cfg.state_key()
  )
  .with_context(|| {
    format!(
      "failed to open state slot at \
       {}",
      data_dir.display()
    )
  })?;

  let today =
    datetime::project_today(Utc::now());
  let mut state =
    store::AppState::restore(
      slot, today
    );

  let mut renderer =
    render::Renderer::new(&cfg);
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &mut state,
    &cfg,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}
