use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::commands::SwitchState;

#[derive(Parser, Debug)]
#[command(
    name = "climax2mqtt",
    version,
    about = "Climax alarm panel -> MQTT bridge with Home Assistant discovery"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the polling bridge (default).
    Run,
    /// Fetch the device list once and print it as JSON.
    Devices,
    /// Print recent panel history as JSON.
    History(HistoryArgs),
    /// Switch a power switch on or off.
    Switch(SwitchArgs),
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 10)]
    pub max_count: u32,
}

#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Device id, either as the panel shows it (ZB:b02a01) or normalized.
    pub id: String,
    #[arg(value_enum)]
    pub state: SwitchArg,
    #[arg(long)]
    pub pd: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SwitchArg {
    On,
    Off,
}

impl From<SwitchArg> for SwitchState {
    fn from(value: SwitchArg) -> Self {
        match value {
            SwitchArg::On => SwitchState::On,
            SwitchArg::Off => SwitchState::Off,
        }
    }
}
