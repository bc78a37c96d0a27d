use clap::Subcommand;
use focuskit_core::TimerConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// Setting as section.key (e.g. "durations.focus_minutes")
        key: String,
    },
    /// Change one setting and save it
    Set {
        /// Setting as section.key
        key: String,
        /// New value, checked against the setting's type and range
        value: String,
    },
    /// Print every setting
    List {
        /// One `section.key = value` line per setting instead of TOML tables
        #[arg(long)]
        flat: bool,
    },
    /// Print where the config file lives
    Path,
    /// Overwrite the config file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = TimerConfig::load()?
                .get(&key)
                .ok_or_else(|| format!("no setting named {key}; see `focuskit config list --flat`"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = TimerConfig::load()?;
            let before = config.get(&key);
            config.set(&key, &value)?;
            config.save()?;
            println!(
                "{key}: {} -> {}",
                before.unwrap_or_default(),
                config.get(&key).unwrap_or_default()
            );
        }
        ConfigAction::List { flat: true } => {
            for (key, value) in TimerConfig::load()?.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::List { flat: false } => {
            print!("{}", TimerConfig::load()?.to_toml()?);
        }
        ConfigAction::Path => println!("{}", TimerConfig::path()?.display()),
        ConfigAction::Reset => {
            TimerConfig::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
