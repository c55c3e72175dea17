use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::deploy::phase::DeployPhase;
use crate::events::{EngineEvent, Observer, TracingObserver};
use crate::model::HostStatus;

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_bar(multi: &MultiProgress, host: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_prefix(host.to_string());
    pb
}

pub fn step(num: usize, total: usize, msg: &str) {
    println!(
        "{} {}",
        style(format!("[{}/{}]", num, total)).bold().cyan(),
        msg
    );
}

pub fn success(msg: &str) {
    println!("{} {}", style("✓").bold().green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").bold().red(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("!").bold().yellow(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("→").bold().blue(), msg);
}

pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Position of a phase on the success path, for `[n/total]` step lines.
fn phase_step(phase: DeployPhase) -> Option<usize> {
    match phase {
        DeployPhase::Fetching => Some(1),
        DeployPhase::ConfiguringBuild => Some(2),
        DeployPhase::Building => Some(3),
        DeployPhase::Swapping => Some(4),
        DeployPhase::Verifying => Some(5),
        _ => None,
    }
}

/// Progress bars on a terminal, plain log lines otherwise.
pub fn observer(verbose: bool) -> Box<dyn Observer> {
    if console::user_attended() {
        Box::new(ConsoleObserver::new(verbose))
    } else {
        Box::new(TracingObserver)
    }
}

/// Renders engine events on the terminal: deploy phases as numbered steps,
/// provisioning as one progress bar per host.
pub struct ConsoleObserver {
    verbose: bool,
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ConsoleObserver {
    /// With `verbose`, every deploy and provisioning log line is printed too.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, host: &str, f: impl FnOnce(&ProgressBar)) {
        let mut bars = self.bars.lock().unwrap_or_else(|p| p.into_inner());
        let bar = bars
            .entry(host.to_string())
            .or_insert_with(|| create_bar(&self.multi, host));
        f(bar);
    }
}

impl Observer for ConsoleObserver {
    fn notify(&self, event: EngineEvent) {
        match event {
            EngineEvent::DeployPhase { phase, .. } => match phase_step(phase) {
                Some(n) => step(n, 5, phase.label()),
                None if phase == DeployPhase::Committed => success("Committed"),
                None if phase == DeployPhase::RolledBack => error("Rolled back"),
                None => {}
            },
            EngineEvent::DeployLog { line, .. } => {
                if self.verbose {
                    println!("  {}", style(line).dim());
                }
            }
            EngineEvent::ProvisionStatus { host, status } => match status {
                HostStatus::Ready => self.with_bar(&host, |b| b.finish_with_message("ready")),
                HostStatus::Error => self.with_bar(&host, |b| b.abandon_with_message("failed")),
                HostStatus::Provisioning => self.with_bar(&host, |b| b.set_position(0)),
                HostStatus::Pending => {}
            },
            EngineEvent::ProvisionProgress {
                host,
                percent,
                message,
            } => self.with_bar(&host, |b| {
                b.set_position(percent as u64);
                b.set_message(message);
            }),
            EngineEvent::ProvisionLog { host, line } => {
                if self.verbose {
                    self.with_bar(&host, |b| b.println(format!("  {} {}", style(&host).dim(), line)));
                }
            }
        }
    }
}
