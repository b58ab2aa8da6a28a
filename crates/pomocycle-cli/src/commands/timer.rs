use chrono::{DateTime, Utc};
use clap::Subcommand;
use pomocycle_core::storage::Database;
use pomocycle_core::timer::{BoundaryTimer, ManualTimer, PomoTimer, TokioTimer};
use pomocycle_core::{Config, Event};
use tracing::{debug, info};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the cycle from its first segment
    Start,
    /// Pause the running cycle
    Pause,
    /// Resume a paused cycle
    Resume,
    /// Pause if running, resume if paused
    Toggle,
    /// Stop and rewind to the first segment
    Reset,
    /// Print current timer state as JSON
    Status,
    /// Change the number of work segments (clamped to 1..=6)
    Resize {
        /// Work segments per cycle
        count: usize,
    },
    /// Keep running in the foreground, printing each segment change
    Run,
}

fn print_event(event: &Event) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(event)?);
    Ok(())
}

/// Rebuild the timer from saved state, then apply any config change made
/// since it was saved.
fn load_timer<T: BoundaryTimer>(
    db: &Database,
    config: &Config,
    timer: T,
    now: DateTime<Utc>,
) -> Result<PomoTimer<T>, Box<dyn std::error::Error>> {
    let mut pomo = PomoTimer::new(config.settings(), timer, now)?;
    let report = pomo.restore_state(db, now);
    if report.is_fresh() {
        debug!("no saved timer state");
    }
    if let Some(event) = pomo.reconcile(now, config.settings())? {
        print_event(&event)?;
    }
    Ok(pomo)
}

/// Deliver boundaries that came due while no process was running.
fn drain_due(pomo: &mut PomoTimer<ManualTimer>, now: DateTime<Utc>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(pending) = pomo.clock().timer().pending() {
        if !pending.delay.is_zero() {
            break;
        }
        pomo.clock_mut().timer_mut().take();
        events.extend(pomo.handle_fire(pending.token, now));
    }
    events
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(action, TimerAction::Run) {
        return run_foreground();
    }

    let mut db = Database::open()?;
    let mut config = Config::load_or_default();
    let now = Utc::now();
    let mut pomo = load_timer(&db, &config, ManualTimer::new(), now)?;
    for event in drain_due(&mut pomo, now) {
        print_event(&event)?;
    }

    let event = match action {
        TimerAction::Start => pomo.start(now),
        TimerAction::Pause => pomo.pause(now),
        TimerAction::Resume => pomo.resume(now),
        TimerAction::Toggle => pomo.toggle(now),
        TimerAction::Reset => pomo.reset(now),
        TimerAction::Status => Some(pomo.snapshot(now)),
        TimerAction::Resize { count } => {
            let event = pomo.resize(now, count)?;
            // Keep the config in step or the next command would undo it.
            config.schedule.pomo_count = u32::try_from(pomo.pomo_count())?;
            config.save()?;
            Some(event)
        }
        TimerAction::Run => None,
    };
    // Commands that change nothing report the state they found.
    print_event(&event.unwrap_or_else(|| pomo.snapshot(now)))?;

    pomo.save_state(&mut db, now)?;
    Ok(())
}

fn run_foreground() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive())
}

async fn drive() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    let config = Config::load_or_default();
    let (timer, mut fired) = TokioTimer::new();
    let now = Utc::now();
    let mut pomo = load_timer(&db, &config, timer, now)?;

    if pomo.clock().is_paused() {
        let event = if pomo.is_finished(now) {
            pomo.start(now)
        } else {
            pomo.resume(now)
        };
        if let Some(event) = event {
            print_event(&event)?;
        }
    }
    pomo.save_state(&mut db, now)?;

    loop {
        tokio::select! {
            token = fired.recv() => {
                let Some(token) = token else { break };
                let now = Utc::now();
                let events = pomo.handle_fire(token, now);
                let finished = events
                    .iter()
                    .any(|e| matches!(e, Event::SequenceFinished { .. }));
                for event in &events {
                    print_event(event)?;
                }
                if finished && config.timer.auto_restart {
                    if let Some(event) = pomo.start(now) {
                        print_event(&event)?;
                    }
                } else if finished {
                    break;
                }
                pomo.save_state(&mut db, now)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, saving timer state");
                break;
            }
        }
    }

    pomo.save_state(&mut db, Utc::now())?;
    Ok(())
}
