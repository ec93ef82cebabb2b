//! Run orchestration: resolve + cache the tool once, then migrate every
//! database in input order.

use migrate_core::{connlist, mask::mask, Error, Reporter, Result, RunResult};

use crate::config::HarnessConfig;
use crate::constants::RESULTS_OUTPUT;
use crate::registry::RegistryClient;
use crate::runner::MigrationRunner;
use crate::toolcache::{FsCacheStore, ToolCache};

/// Drive one full run.
///
/// Fatal failures (no targets, registry, download/extraction) abort before
/// any migration; a failing target is captured as an outcome and the
/// fail-fast setting decides whether the loop continues. The caller maps
/// `any_failed` onto the process exit status.
pub async fn run(cfg: &HarnessConfig, reporter: &dyn Reporter) -> Result<RunResult> {
    let targets = connlist::parse(&cfg.database_urls)?;
    if targets.is_empty() {
        return Err(Error::NoTargets);
    }

    // Secrets first: nothing may log a connection string before the host
    // redaction facility knows about it.
    for target in &targets {
        reporter.register_secret(target);
    }

    tracing::info!(
        event = "harness.run.start",
        targets = targets.len(),
        fail_fast = cfg.fail_fast,
        "starting migration run"
    );

    let registry = RegistryClient::new(&cfg.registry_url);
    let resolved = registry.resolve(&cfg.tool_package, &cfg.tool_version).await?;
    tracing::info!(
        event = "harness.resolve.done",
        package = %cfg.tool_package,
        selector = %cfg.tool_version,
        version = %resolved.version,
        "resolved tool version"
    );

    let cache = ToolCache::new(
        cfg.tool_package.clone(),
        FsCacheStore::new(&cfg.tool_cache_dir),
    );
    let entry = cache.ensure(&resolved).await?;
    if let Some(dir) = entry.parent() {
        reporter.add_path(dir);
    }

    let runner = MigrationRunner::new(
        cfg.node_bin.clone(),
        entry,
        &cfg.schema,
        cfg.working_directory.clone(),
        &cfg.extra_args,
    );

    match runner.probe_version().await {
        Ok(status) if !status.success() => {
            tracing::warn!(
                event = "harness.probe.nonzero",
                code = status.code().unwrap_or(-1),
                "version probe exited non-zero; continuing"
            );
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(
                event = "harness.probe.failed",
                error = %err,
                "version probe failed; continuing"
            );
        }
    }

    migrate_all(&runner, reporter, &targets, cfg.fail_fast).await
}

/// Migrate each target sequentially, honoring fail-fast, and publish the
/// aggregate result.
pub async fn migrate_all(
    runner: &MigrationRunner,
    reporter: &dyn Reporter,
    targets: &[String],
    fail_fast: bool,
) -> Result<RunResult> {
    let mut outcomes = Vec::with_capacity(targets.len());

    for target in targets {
        reporter.start_group(&format!("Migrate: {}", mask(target)));
        let outcome = runner.apply(target).await;
        reporter.end_group();
        let outcome = outcome?;

        let failed = !outcome.succeeded;
        if failed {
            tracing::error!(
                event = "harness.migrate.failed",
                target = %outcome.masked_target,
                exit_code = outcome.exit_code,
                "migration failed"
            );
        } else {
            tracing::info!(
                event = "harness.migrate.ok",
                target = %outcome.masked_target,
                duration_ms = outcome.duration_ms,
                "migration complete"
            );
        }
        outcomes.push(outcome);

        if failed && fail_fast {
            tracing::warn!(
                event = "harness.migrate.fail_fast",
                "fail-fast enabled; skipping remaining databases"
            );
            break;
        }
    }

    let any_failed = outcomes.iter().any(|o| !o.succeeded);
    let serialized =
        serde_json::to_string(&outcomes).map_err(|e| Error::Other(anyhow::Error::from(e)))?;
    reporter.set_output(RESULTS_OUTPUT, &serialized);

    Ok(RunResult {
        outcomes,
        any_failed,
    })
}
