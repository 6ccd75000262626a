//! Built-in command groups and the default command tree.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::command::{CommandBuilder, CommandTree, CommandTreeError};
use crate::scheduler::Scheduler;

mod display;
mod info;
mod schedule;
mod volume;

pub use display::BrightnessAction;
pub use info::StatsAction;
pub use schedule::ScheduleAddAction;
pub use volume::{Mixer, MixerState, PactlMixer, VolumeAction};

/// Builds the default command tree served by the daemon.
///
/// The schedule action needs the finished tree to resolve its targets, so it
/// receives a cell that is populated with the tree once built.
///
/// # Errors
///
/// Returns a [`CommandTreeError`] if the registered hierarchy is structurally
/// invalid.
pub fn default_tree(scheduler: &Scheduler) -> Result<Arc<CommandTree>, CommandTreeError> {
    let cell = Arc::new(OnceCell::new());
    let tree = CommandTree::build(
        CommandBuilder::new("errand")
            .description("local automation daemon")
            .child(
                CommandBuilder::new("volume")
                    .alias("vol")
                    .description("adjust the default sink volume")
                    .action(VolumeAction::new(PactlMixer::default())),
            )
            .child(
                CommandBuilder::new("display")
                    .alias("visual")
                    .description("display controls")
                    .child(
                        CommandBuilder::new("brightness")
                            .alias("bri")
                            .description("adjust backlight brightness")
                            .action(BrightnessAction::system()),
                    ),
            )
            .child(
                CommandBuilder::new("info")
                    .description("daemon introspection")
                    .child(
                        CommandBuilder::new("stats")
                            .description("version, start time, and uptime")
                            .action(StatsAction::new()),
                    ),
            )
            .child(
                CommandBuilder::new("schedule")
                    .alias("sch")
                    .alias("delay")
                    .description("deferred command execution")
                    .child(
                        CommandBuilder::new("add")
                            .alias("a")
                            .alias("i")
                            .description("run a command after a delay")
                            .action(ScheduleAddAction::new(
                                scheduler.clone(),
                                Arc::clone(&cell),
                            )),
                    ),
            ),
    )?;
    let tree = Arc::new(tree);
    // Single population point; the cell was created empty above.
    let _ = cell.set(Arc::clone(&tree));
    Ok(tree)
}
