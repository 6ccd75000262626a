//! Backlight brightness control over a sysfs-style directory.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{json, Value};

use crate::command::{Action, ActionError, Invocation, ParamKind, ParamSpec};

const SYSFS_BACKLIGHT_DIR: &str = "/sys/class/backlight/intel_backlight";

/// The `display brightness` command: set/incr a percentage against a
/// backlight directory exposing `brightness` and `max_brightness` files.
#[derive(Debug)]
pub struct BrightnessAction {
    base: Utf8PathBuf,
}

impl BrightnessAction {
    /// Uses the conventional sysfs backlight directory.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Utf8PathBuf::from(SYSFS_BACKLIGHT_DIR))
    }

    /// Uses `base` as the backlight directory.
    #[must_use]
    pub fn new(base: Utf8PathBuf) -> Self {
        Self { base }
    }

    fn read_value(&self, file: &str) -> Result<i64, ActionError> {
        let path = self.base.join(file);
        let text = fs::read_to_string(&path)
            .map_err(|error| ActionError::new(format!("cannot read {path}: {error}")))?;
        text.trim()
            .parse()
            .map_err(|_| ActionError::new(format!("{path} does not contain an integer")))
    }

    fn write_raw(&self, path: &Utf8Path, raw: i64) -> Result<(), ActionError> {
        fs::write(path, raw.to_string())
            .map_err(|error| ActionError::new(format!("cannot write {path}: {error}")))
    }
}

impl Action for BrightnessAction {
    fn spec(&self) -> ParamSpec {
        ParamSpec::new()
            .grouped_param(
                "set",
                ParamKind::Integer,
                "operations",
                "brightness percentage to set",
            )
            .grouped_param(
                "incr",
                ParamKind::Integer,
                "operations",
                "signed brightness change in percent",
            )
            .group("operations", 1, Some(1))
    }

    fn execute(&self, invocation: &Invocation<'_>) -> Result<Value, ActionError> {
        let max = self.read_value("max_brightness")?;
        if max <= 0 {
            return Err(ActionError::new("backlight reports a non-positive maximum"));
        }
        let raw = self.read_value("brightness")?;
        let old_percent = raw * 100 / max;

        let target = match invocation.parameters.integer("set") {
            Some(value) => value,
            None => {
                let delta = invocation
                    .parameters
                    .integer("incr")
                    .ok_or_else(|| ActionError::new("no brightness operation given"))?;
                // Saturate so an extreme delta still clamps instead of
                // overflowing.
                old_percent.saturating_add(delta)
            }
        };
        let new_percent = target.clamp(0, 100);
        let new_raw = new_percent * max / 100;
        self.write_raw(&self.base.join("brightness"), new_raw)?;

        Ok(json!({
            "old_brightness": old_percent,
            "new_brightness": new_percent,
        }))
    }
}
