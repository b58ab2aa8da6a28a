use clap::Subcommand;
use pomocycle_core::Config;

/// Shown under `config --help`.
pub const KEYS_HELP: &str = "\
Keys are dot paths into config.toml:
  schedule.work_secs        work segment length in seconds (default 1500)
  schedule.rest_secs        rest segment length in seconds (default 300)
  schedule.long_break_secs  closing long break in seconds (default 900)
  schedule.pomo_count       work segments per cycle, clamped to 1..=6 (default 4)
  timer.segment_stagger_ms  extra milliseconds granted to segment i, times i (default 0)
  timer.auto_restart        start a new cycle when `timer run` finishes one (default false)

Timer commands pick up schedule changes on their next invocation and
rebuild the cycle from segment 0.";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value, e.g. `schedule.work_secs`
    Get {
        /// Dot-path key such as `schedule.pomo_count` or `timer.auto_restart`
        key: String,
    },
    /// Change one value and write config.toml
    Set {
        /// Dot-path key such as `schedule.rest_secs`
        key: String,
        /// New value; must parse as the key's type (whole seconds, count, bool)
        value: String,
    },
    /// Print the whole config as JSON
    List,
    /// Overwrite config.toml with the defaults (25/5/15 minutes, 4 pomos)
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
