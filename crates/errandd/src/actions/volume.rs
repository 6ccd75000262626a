//! Volume control against the default audio sink.

use std::process::Command;

use serde_json::{json, Value};

use crate::command::{Action, ActionError, Invocation, ParamKind, ParamSpec};

/// Upper clamp for set/incr requests; pactl allows boosting past 100%.
const MAX_VOLUME_PERCENT: i64 = 150;

/// Snapshot of the sink's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerState {
    /// Volume as a percentage of the nominal maximum.
    pub volume: i64,
    /// Whether the sink is muted.
    pub muted: bool,
}

/// Capability boundary over the system mixer.
pub trait Mixer: Send + Sync {
    /// Reads the current volume and mute state.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] when the mixer cannot be queried.
    fn state(&self) -> Result<MixerState, ActionError>;

    /// Sets the volume percentage.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] when the mixer refuses the change.
    fn set_volume(&self, percent: i64) -> Result<(), ActionError>;

    /// Sets the mute state.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] when the mixer refuses the change.
    fn set_muted(&self, muted: bool) -> Result<(), ActionError>;
}

/// Production mixer shelling out to `pactl` for the default sink.
#[derive(Debug, Default)]
pub struct PactlMixer;

impl PactlMixer {
    fn query(&self, args: &[&str]) -> Result<String, ActionError> {
        let output = Command::new("pactl").args(args).output()?;
        if !output.status.success() {
            return Err(ActionError::new(format!(
                "pactl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Mixer for PactlMixer {
    fn state(&self) -> Result<MixerState, ActionError> {
        let volume_output = self.query(&["get-sink-volume", "@DEFAULT_SINK@"])?;
        let volume = parse_volume_percent(&volume_output).ok_or_else(|| {
            ActionError::new(format!("unrecognized pactl volume output: {volume_output}"))
        })?;
        let mute_output = self.query(&["get-sink-mute", "@DEFAULT_SINK@"])?;
        let muted = mute_output.contains("yes");
        Ok(MixerState { volume, muted })
    }

    fn set_volume(&self, percent: i64) -> Result<(), ActionError> {
        self.query(&["set-sink-volume", "@DEFAULT_SINK@", &format!("{percent}%")])?;
        Ok(())
    }

    fn set_muted(&self, muted: bool) -> Result<(), ActionError> {
        let flag = if muted { "1" } else { "0" };
        self.query(&["set-sink-mute", "@DEFAULT_SINK@", flag])?;
        Ok(())
    }
}

/// Extracts the first percentage from `pactl get-sink-volume` output.
fn parse_volume_percent(output: &str) -> Option<i64> {
    output
        .split_whitespace()
        .find_map(|token| token.strip_suffix('%').and_then(|digits| digits.parse().ok()))
}

/// The `volume` command: exactly one of set, incr, or mute.
pub struct VolumeAction<M> {
    mixer: M,
}

impl<M: Mixer> VolumeAction<M> {
    /// Wraps a mixer implementation.
    #[must_use]
    pub fn new(mixer: M) -> Self {
        Self { mixer }
    }
}

impl<M: Mixer> Action for VolumeAction<M> {
    fn spec(&self) -> ParamSpec {
        ParamSpec::new()
            .grouped_param("set", ParamKind::Integer, "operations", "volume percentage to set")
            .grouped_param(
                "incr",
                ParamKind::Integer,
                "operations",
                "signed volume change in percent",
            )
            .grouped_param("mute", ParamKind::Flag, "operations", "toggle mute")
            .group("operations", 1, Some(1))
    }

    fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError> {
        let state = self.mixer.state()?;

        if invocation.parameters.contains("mute") {
            let new_mute = !state.muted;
            self.mixer.set_muted(new_mute)?;
            return Ok(json!({
                "volume": state.volume,
                "old_mute": state.muted,
                "new_mute": new_mute,
            }));
        }

        let target = match invocation.parameters.integer("set") {
            Some(value) => value,
            None => {
                let delta = invocation
                    .parameters
                    .integer("incr")
                    .ok_or_else(|| ActionError::new("no volume operation given"))?;
                // Saturate so an extreme delta still clamps instead of
                // overflowing.
                state.volume.saturating_add(delta)
            }
        };
        let new_volume = target.clamp(0, MAX_VOLUME_PERCENT);
        self.mixer.set_volume(new_volume)?;
        Ok(json!({
            "old_volume": state.volume,
            "new_volume": new_volume,
            "mute": state.muted,
        }))
    }
}
