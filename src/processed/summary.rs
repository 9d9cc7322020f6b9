//! Human readable overview of a path.

use itertools::Itertools;

use super::{Path, ProcessedSong};

impl ProcessedSong {
    /// Describes `path` in the customary notation.
    ///
    /// The first line lists, per activation, the SP phrases gained before it and, in
    /// parentheses, during it, followed by `ES<n>` for phrases left over at the end. The
    /// next lines give the score without SP and the total score, then the measures each
    /// activation spans, counted from one.
    #[must_use]
    pub fn path_summary(&self, path: &Path) -> String {
        let points = self.points();
        let mut start_point = 0;
        let mut sections = Vec::with_capacity(path.activations.len() + 1);
        for act in &path.activations {
            let sp_before = points.sp_granting_notes(start_point, act.act_start).count();
            let sp_during = points
                .sp_granting_notes(act.act_start, act.act_end + 1)
                .count();
            sections.push(if sp_during == 0 {
                sp_before.to_string()
            } else {
                format!("{sp_before}(+{sp_during})")
            });
            start_point = act.act_end + 1;
        }
        let spare_sp = points.sp_granting_notes(start_point, points.len()).count();
        if spare_sp != 0 {
            sections.push(format!("ES{spare_sp}"));
        }
        let sections = if sections.is_empty() {
            "None".to_owned()
        } else {
            sections.join("-")
        };

        let no_sp_score = points.range_score(0, points.len())
            + self.total_solo_boost()
            + self.total_bre_boost();
        let total_score = no_sp_score + path.score_boost;

        let measure = |index: usize| {
            points
                .get(index)
                .map_or(0.0, |point| point.position.measure.value() + 1.0)
        };
        let activations = path
            .activations
            .iter()
            .enumerate()
            .map(|(i, act)| {
                format!(
                    "\nActivation {}: Measure {} to Measure {}",
                    i + 1,
                    measure(act.act_start),
                    measure(act.act_end)
                )
            })
            .join("");

        format!(
            "Path: {sections}\nNo SP score: {no_sp_score}\nTotal score: {total_score}{activations}"
        )
    }
}
