use crate::device::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Form value for the panel's `switch` field.
    pub fn panel_value(self) -> &'static str {
        match self {
            Self::On => "1",
            Self::Off => "0",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            value if value.eq_ignore_ascii_case("ON") => Some(Self::On),
            value if value.eq_ignore_ascii_case("OFF") => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCommand {
    pub device_id: DeviceId,
    pub state: SwitchState,
}

impl SwitchCommand {
    pub fn panel_id(&self) -> String {
        self.device_id.to_panel_id()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("topic {0} is not a switch command topic")]
    Topic(String),
    #[error("unknown switch state {0:?}")]
    Payload(String),
}

/// Parses `<prefix>/switches/<identity>/set` plus an `ON`/`OFF` payload.
pub fn parse_switch_command(
    prefix: &str,
    topic: &str,
    payload: &[u8],
) -> Result<SwitchCommand, CommandError> {
    // the prefix may itself span several levels
    let rest = topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| CommandError::Topic(topic.to_string()))?;
    let parts: Vec<&str> = rest.split('/').collect();
    let device = match parts.as_slice() {
        ["switches", device, "set"] if !device.is_empty() => *device,
        _ => return Err(CommandError::Topic(topic.to_string())),
    };

    let text = String::from_utf8_lossy(payload);
    let state = SwitchState::parse(&text).ok_or_else(|| CommandError::Payload(text.to_string()))?;

    Ok(SwitchCommand {
        device_id: DeviceId::normalize(device),
        state,
    })
}
