use console::style;
use log::{info, warn};
use std::fs;
use std::io;
use std::path::Path;
use worker_env::execution::{launch_detached, LaunchSpec};
use worker_env::{
    apply_overrides, force_cleanup, graceful_stop, server, utils, CleanupTargets, DockerExporter,
    Environment, PollPolicy, ReadinessPoller, Result, WorkerConfig,
};

/// Resolve the environment path against the working directory
pub fn resolve_env(path: &Path) -> Result<Environment> {
    let root = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(Environment::new(root))
}

pub fn new_env(env: &Environment, image: &str) -> Result<()> {
    let config = env.init(image, &DockerExporter::new())?;
    print_init_summary(env, &config)
}

fn print_init_summary(env: &Environment, config: &WorkerConfig) -> Result<()> {
    println!("Working Directory: {}\n", env.root().display());
    println!("Worker Defaults:\n{}", config.dump()?);
    println!(
        "You may modify the defaults here: {}\n",
        env.config_path().display()
    );
    println!(
        "You may now start a worker using {}",
        style("worker-ctl up").cyan()
    );
    Ok(())
}

pub fn up(env: &Environment, image: &str, options: Option<&str>, detach: bool) -> Result<()> {
    if env.exists() {
        info!("Using existing environment at {}", env.root().display());
    } else {
        println!("No worker environment found at {}", env.root().display());
        let config = env.init(image, &DockerExporter::new())?;
        print_init_summary(env, &config)?;
    }

    match requested_overrides(options) {
        Some(spec) => apply_overrides(&env.config_path(), &env.overrides_path(), spec)?,
        None => remove_stale_overrides(&env.overrides_path())?,
    }

    let config = env.load_config()?;

    if !detach {
        return server::run_foreground(&config);
    }

    let program = std::env::current_exe()?;
    let spec = LaunchSpec::from_invocation(program, std::env::args_os(), env.log_path())
        .mount_namespace(utils::is_root());
    if !spec.mount_namespace {
        warn!("Not running as root, worker mounts will be visible on the host");
    }

    let child = launch_detached(&spec)?;
    println!(
        "Starting worker: pid={}, port={}, log={}",
        child.pid(),
        config.worker_port,
        child.log_path().display()
    );

    ReadinessPoller::new(PollPolicy::default())?.wait_for_child(&child, config.worker_port)?;
    println!("{}", style("ready").green());
    Ok(())
}

/// An empty `-o` asks for no overrides at all
fn requested_overrides(options: Option<&str>) -> Option<&str> {
    options.filter(|spec| !spec.trim().is_empty())
}

fn remove_stale_overrides(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Removed stale overrides file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn down(env: &Environment) -> Result<()> {
    let config = env.load_config()?;
    let pid = utils::read_pid_file(&config.pid_file())?;

    println!("Stopping worker process with PID {}", pid);
    graceful_stop(pid, PollPolicy::default())?;
    println!("{}", style("Worker process stopped successfully").green());
    Ok(())
}

pub fn status(env: &Environment) -> Result<()> {
    let config = env.load_config()?;
    let reply = ReadinessPoller::new(PollPolicy::default())?.status(config.worker_port)?;

    println!("Worker Ping:");
    println!("  {} => {} [{}]\n", reply.url, reply.body, reply.status_line);
    Ok(())
}

pub fn cleanup(env: &Environment) {
    let targets = CleanupTargets::for_environment(env);
    let report = force_cleanup(&targets);

    print!("{}", report);
    if report.is_clean() {
        println!("{}", style("Nothing left to clean up").green());
    } else {
        println!(
            "{}",
            style(format!(
                "{} step(s) failed, see above",
                report.failures().count()
            ))
            .yellow()
        );
    }
}
