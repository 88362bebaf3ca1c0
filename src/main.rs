use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};
use clap::Parser;
use serde_json::json;
use thread_runner::{
    format_error, join_handles,
    props::{dir_stats, parse_count, PropStore},
    vc::{create_vc, GitVersionControl, VersionControl},
    FnTask, JoinOrdering, Runner, WorkerPool,
};
use tracing_subscriber::EnvFilter;


#[derive(Parser, Debug)]
#[command(name = "thread_runner", about = "Runs a small task graph on top of a worker pool")]
struct Args {
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// Job inputs: "N" or "N..M"
    #[arg(long, default_value = "1..20")]
    range: String,

    /// Where results.json goes; committed if the directory is a Git checkout
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Create a Git repository in --state-dir when there is none
    #[arg(long)]
    init_repo: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}


fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    if let Err(err) = run(args) {
        eprintln!("{}", format_error(&err));
        std::process::exit(1);
    }
}


fn run(args: Args) -> anyhow::Result<()> {
    let now = Instant::now();
    let (start, end) = parse_count(&args.range)?;
    let pool = Arc::new(WorkerPool::new(args.workers)?);
    let squares: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    let mut runner = Runner::new();

    let compute = {
        let pool = pool.clone();
        let squares = squares.clone();
        runner.add_task(FnTask::new("compute", move || {
            let handles = (start..end)
                .map(|i| pool.submit(move || Ok(i * i)))
                .collect::<Result<Vec<_>, _>>()?;

            let rt = tokio::runtime::Builder::new_current_thread().build()?;
            let values = rt
                .block_on(join_handles(handles, JoinOrdering::Ordered))
                .into_iter()
                .collect::<Result<Vec<i64>, _>>()?;

            *squares.lock().unwrap_or_else(PoisonError::into_inner) = values;
            Ok(())
        }))
    };

    let persist = {
        let squares = squares.clone();
        let state_dir = args.state_dir.clone();
        let range = args.range.clone();
        runner.add_task(
            FnTask::new("persist", move || {
                let Some(dir) = state_dir else { return Ok(()) };
                std::fs::create_dir_all(&dir)?;

                let values = squares.lock().unwrap_or_else(PoisonError::into_inner).clone();
                let mut store = PropStore::open(dir.join("results.json"))?;
                store.set("run.range", json!(range), false)?;
                store.set("run.count", json!(values.len()), false)?;
                store.set("run.sum", json!(values.iter().sum::<i64>()), false)?;
                store.save()?;
                Ok(())
            })
            .after(&[compute.clone()]),
        )
    };

    {
        let state_dir = args.state_dir.clone();
        let init_repo = args.init_repo;
        runner.add_task(
            FnTask::new("commit", move || {
                let Some(dir) = state_dir else { return Ok(()) };

                let vc = match create_vc(&dir)? {
                    Some(vc) => vc,
                    None if init_repo => GitVersionControl::init(&dir)?,
                    None => return Ok(()),
                };
                for line in vc.status()? {
                    print!("{}", line);
                }
                vc.commit_all("thread_runner results")?;

                let stats = dir_stats(&dir)?;
                tracing::info!(
                    files = stats.file_count,
                    bytes = stats.total_bytes,
                    "committed {}",
                    stats.path.display()
                );
                Ok(())
            })
            .after(&[persist]),
        );
    }

    runner.run_all()?;
    pool.wait_all();

    let metrics = pool.metrics();
    println!(
        "jobs: {} submitted, {} failed; tasks: {}; elapsed: {:?}",
        pool.submitted(),
        metrics.failed_jobs,
        runner.len(),
        now.elapsed()
    );

    if let Some(task) = runner.stopped_order().into_iter().find(|t| !t.succeeded()) {
        let reason = task
            .error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "no outcome recorded".to_string());
        anyhow::bail!("task {} failed: {}", task.name(), reason);
    }

    Ok(())
}
