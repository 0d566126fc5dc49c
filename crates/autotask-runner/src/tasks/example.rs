/*
[INPUT]:  Credentials, workbook location and hung-file path from settings
[OUTPUT]: Walks booking ids 1..=10 through the checkpointed main loop
[POS]:    Tasks layer - reference task showing the automate() shape
[UPDATE]: When the task contract changes
*/

use crate::task::{AutomatedTask, TaskContext};
use tracing::{debug, info};

const BOOKING_IDS: std::ops::RangeInclusive<u32> = 1..=10;

/// Reference task; replace the loop body with real page interactions.
#[derive(Debug, Default)]
pub struct ExampleTask;

impl ExampleTask {
    pub const NAME: &'static str = "ExampleTask";

    pub fn boxed() -> Box<dyn AutomatedTask> {
        Box::new(Self)
    }
}

impl AutomatedTask for ExampleTask {
    fn task_name(&self) -> &'static str {
        Self::NAME
    }

    fn mandatory_settings(&self) -> Vec<&'static str> {
        vec![
            "username",
            "password",
            "excel.path",
            "excel.sheet",
            "excel.read_column.start_cell",
            "hung.path",
        ]
    }

    fn automate(&mut self, ctx: &mut TaskContext) -> anyhow::Result<()> {
        info!(username = ctx.setting("username")?, "starting bookings");
        let exit = ctx.perform_mainloop_on_collection(BOOKING_IDS, |ctx, booking_id| {
            info!(booking_id, "processing booking");
            ctx.sleep();
            Ok(())
        })?;
        debug!(?exit, "booking loop ended");
        Ok(())
    }
}
