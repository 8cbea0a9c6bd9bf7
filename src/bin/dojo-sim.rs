use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dojo_sim::persistence::CheckStore;
use dojo_sim::{
    ChannelObserver, Check, MemoryPersistence, Run, RunClient, RunDriver, RunDriverBuilder,
    RunNotification, RunStatus, SimulatorConfig,
};

#[derive(Parser)]
#[command(name = "dojo-sim")]
#[command(author, version, about = "Simulate a productionization run through the Dojo Gate")]
struct Cli {
    /// Repository the run belongs to
    #[arg(long, default_value = "demo-repo")]
    repo: String,

    /// Path to a JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Zero every step delay
    #[arg(long)]
    dev: bool,

    /// Disable an optional check before the run starts (repeatable)
    #[arg(long = "disable-check", value_name = "CHECK_ID")]
    disable_checks: Vec<String>,

    /// Stop at the Dojo Gate instead of approving
    #[arg(long)]
    no_approve: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SimulatorConfig::default(),
    };
    if cli.dev {
        config.timing.delay_scale = 0.0;
        config.timing.resume_delay_ms = 0;
    }

    let gateway = MemoryPersistence::new();
    for id in &cli.disable_checks {
        gateway
            .set_check_enabled(id, false)
            .await
            .with_context(|| format!("cannot disable check {id}"))?;
    }

    let driver = RunDriverBuilder::new()
        .with_config(config)
        .with_persistence(gateway.clone())
        .build()?;
    let client = RunClient::from_gateway(Arc::new(gateway.clone()));

    let run = client.submit(&cli.repo).await?;
    info!("Submitted run {} for {}", run.id, run.repo_id);

    let (observer, mut rx) = ChannelObserver::channel();
    driver.start(&run.id, Arc::new(observer.clone())).await?;

    let mut out = std::io::stdout();
    let approve = !cli.no_approve;
    if let Some(done) = follow_run(&driver, &run.id, &observer, &mut rx, approve, &mut out).await? {
        print_summary(&done, &gateway.list_checks().await?, &mut out)?;
    }

    info!("Driver metrics: {}", serde_json::to_string(&driver.metrics())?);
    driver.shutdown();
    Ok(())
}

/// 跟随一个 Run 的通知直到结束
///
/// 返回完成时的快照。停在 Gate 且不自动审批时返回 `None`。
async fn follow_run(
    driver: &RunDriver,
    run_id: &str,
    observer: &ChannelObserver,
    rx: &mut UnboundedReceiver<RunNotification>,
    approve: bool,
    out: &mut impl Write,
) -> anyhow::Result<Option<Run>> {
    // 终态通知之后还有一条收尾事件 (完成或失败)，写完它再返回
    let mut finished: Option<Run> = None;
    while let Some(notification) = rx.recv().await {
        match notification {
            RunNotification::EventAppended(event) => {
                writeln!(
                    out,
                    "[{}] step {:>2} {:<5} {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.step,
                    event.level,
                    event.message
                )?;
                if let Some(run) = finished.take() {
                    if run.status == RunStatus::Failed {
                        bail!(
                            "run {} failed: {}",
                            run.id,
                            run.failure_reason.unwrap_or_default()
                        );
                    }
                    return Ok(Some(run));
                }
            }
            RunNotification::RunUpdated(update) if update.id == run_id => match update.status {
                RunStatus::AwaitingApproval if !approve => {
                    writeln!(out, "Run {} is waiting at the Dojo Gate.", update.id)?;
                    return Ok(None);
                }
                RunStatus::AwaitingApproval => {
                    driver.resume(run_id, Arc::new(observer.clone())).await?;
                }
                RunStatus::Completed | RunStatus::Failed => finished = Some(update),
                RunStatus::Queued | RunStatus::Running => {}
            },
            RunNotification::RunUpdated(_) => {}
        }
    }
    bail!("notification channel closed before run {run_id} finished")
}

fn print_summary(run: &Run, checks: &[Check], out: &mut impl Write) -> std::io::Result<()> {
    let enabled = checks.iter().filter(|c| c.enabled).count();
    writeln!(out)?;
    writeln!(
        out,
        "Score: {}/100 ({}/{} checks enabled)",
        run.score.unwrap_or(0),
        enabled,
        checks.len()
    )?;
    if let Some(pr) = &run.pr_url {
        writeln!(out, "PR:      {pr}")?;
    }
    if let Some(preview) = &run.preview_url {
        writeln!(out, "Preview: {preview}")?;
    }
    writeln!(out)?;
    writeln!(out, "{}", run.report_markdown.as_deref().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started() -> (RunDriver, ChannelObserver, UnboundedReceiver<RunNotification>, Run) {
        let gateway = MemoryPersistence::new();
        let driver = RunDriverBuilder::new()
            .with_config(SimulatorConfig::new_dev())
            .with_persistence(gateway.clone())
            .build()
            .unwrap();
        let client = RunClient::from_gateway(Arc::new(gateway));
        let run = client.submit("repo-1").await.unwrap();

        let (observer, rx) = ChannelObserver::channel();
        driver
            .start(&run.id, Arc::new(observer.clone()))
            .await
            .unwrap();
        (driver, observer, rx, run)
    }

    #[tokio::test]
    async fn follow_run_prints_completion_event() {
        let (driver, observer, mut rx, run) = started().await;
        let mut out = Vec::new();

        let done = follow_run(&driver, &run.id, &observer, &mut rx, true, &mut out)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 13);
        assert!(
            text.lines()
                .last()
                .is_some_and(|l| l.ends_with("Run completed with score 83/100"))
        );
    }

    #[tokio::test]
    async fn follow_run_stops_at_gate_without_approval() {
        let (driver, observer, mut rx, run) = started().await;
        let mut out = Vec::new();

        let done = follow_run(&driver, &run.id, &observer, &mut rx, false, &mut out)
            .await
            .unwrap();
        assert!(done.is_none());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Waiting for Dojo Gate approval..."));
        assert!(text.ends_with("is waiting at the Dojo Gate.\n"));
    }
}
