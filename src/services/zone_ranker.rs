use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::cell::{numeric_suffix, zone_of};
use crate::models::{CellCode, Line};

/// Tunables for zone inference and proximity ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    pub history_capacity: usize,
    pub mode_window: usize,
    pub min_entries: usize,
    pub cross_zone_distance: u32,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            mode_window: 5,
            min_entries: 3,
            cross_zone_distance: 100,
        }
    }
}

/// Rolling history of scanned cells for one placement session.
///
/// The assumed zone is derived from the history on every call; nothing else is remembered
/// apart from an operator-chosen zone lock.
#[derive(Debug, Clone)]
pub struct ZoneTracker {
    settings: ZoneSettings,
    history: VecDeque<CellCode>,
    locked_zone: Option<String>,
}

impl ZoneTracker {
    pub fn new(settings: ZoneSettings) -> Self {
        Self {
            settings,
            history: VecDeque::with_capacity(settings.history_capacity),
            locked_zone: None,
        }
    }

    /// Records a scanned cell. Returns the new assumed zone when it changed.
    pub fn record(&mut self, cell: CellCode) -> Option<String> {
        let before = self.assumed_zone();
        if self.history.len() == self.settings.history_capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(cell);
        let after = self.assumed_zone();
        (after != before).then_some(after).flatten()
    }

    pub fn history(&self) -> impl Iterator<Item = &CellCode> {
        self.history.iter()
    }

    pub fn last_cell(&self) -> Option<&CellCode> {
        self.history.back()
    }

    /// Zone of the last scan until enough history exists, then the most frequent zone of the
    /// recent window. Ties go to the zone scanned most recently.
    pub fn assumed_zone(&self) -> Option<String> {
        let last = self.history.back()?;
        if self.history.len() < self.settings.min_entries {
            return Some(last.zone().to_string());
        }

        let window: Vec<&str> = self
            .history
            .iter()
            .rev()
            .take(self.settings.mode_window.max(1))
            .map(|cell| cell.zone())
            .collect();

        // `window` is newest first, so the first zone to reach the top count wins ties.
        let mut best: Option<(&str, usize)> = None;
        for zone in &window {
            let count = window.iter().filter(|z| *z == zone).count();
            match best {
                Some((_, top)) if top >= count => {}
                _ => best = Some((*zone, count)),
            }
        }
        best.map(|(zone, _)| zone.to_string())
    }

    pub fn lock_zone(&mut self, zone: &str) {
        self.locked_zone = Some(zone.trim().to_ascii_uppercase());
    }

    pub fn unlock_zone(&mut self) {
        self.locked_zone = None;
    }

    pub fn locked_zone(&self) -> Option<&str> {
        self.locked_zone.as_deref()
    }

    /// Walking distance proxy between two cell codes.
    pub fn distance(&self, a: &str, b: &str) -> u32 {
        match (zone_of(a), zone_of(b)) {
            (Some(za), Some(zb)) if za == zb => match (numeric_suffix(a), numeric_suffix(b)) {
                (Some(na), Some(nb)) => na.abs_diff(nb),
                _ => self.settings.cross_zone_distance,
            },
            _ => self.settings.cross_zone_distance,
        }
    }

    /// Orders lines for display: unfinished first, then lines in the cell just scanned, then by
    /// distance from it. With `filter` set and a zone locked, only lines in that zone and lines
    /// without a cell are kept.
    pub fn rank<'a>(&self, lines: &'a [Line], filter: bool) -> Vec<&'a Line> {
        let last = self.last_cell();
        let locked = if filter { self.locked_zone() } else { None };

        let mut ranked: Vec<&Line> = lines
            .iter()
            .filter(|line| match (locked, line.cell_id.as_deref()) {
                (Some(zone), Some(cell)) => zone_of(cell).as_deref() == Some(zone),
                _ => true,
            })
            .collect();

        ranked.sort_by_key(|line| {
            let at_current = last.map(|cell| line.in_cell(cell.as_str())).unwrap_or(false);
            let distance = match (last, line.cell_id.as_deref()) {
                (Some(from), Some(to)) => self.distance(from.as_str(), to),
                (Some(_), None) => self.settings.cross_zone_distance,
                (None, _) => 0,
            };
            (line.status.is_done(), !at_current, distance)
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentId, LineId, LineStatus, ProductRef};
    use rstest::rstest;

    fn tracker() -> ZoneTracker {
        ZoneTracker::new(ZoneSettings::default())
    }

    fn scan(tracker: &mut ZoneTracker, codes: &[&str]) {
        for code in codes {
            tracker.record(CellCode::parse(code).unwrap());
        }
    }

    fn line(id: &str, cell: Option<&str>, done: bool) -> Line {
        let mut line = Line::planned(
            LineId::new(id),
            DocumentId::new("pl"),
            ProductRef::new(id, id, id, id),
            1,
            cell.map(str::to_string),
        );
        if done {
            line.quantity_fact = 1;
            line.status = LineStatus::Completed;
        }
        line
    }

    #[rstest]
    #[case("A1-01", "A1-05", 4)]
    #[case("A1-05", "A1-01", 4)]
    #[case("A1-01", "B1-01", 100)]
    #[case("A2-01", "A1-01", 100)]
    #[case("A1-01", "garbage", 100)]
    fn distance_between_cells(#[case] a: &str, #[case] b: &str, #[case] expected: u32) {
        assert_eq!(tracker().distance(a, b), expected);
    }

    #[test]
    fn short_history_follows_latest_scan() {
        let mut t = tracker();
        assert_eq!(t.assumed_zone(), None);
        scan(&mut t, &["A1-01"]);
        assert_eq!(t.assumed_zone().as_deref(), Some("A"));
        scan(&mut t, &["B1-01"]);
        assert_eq!(t.assumed_zone().as_deref(), Some("B"));
    }

    #[test]
    fn mode_of_recent_window_resists_single_stray_scan() {
        let mut t = tracker();
        scan(&mut t, &["A1-01", "A1-02", "A1-03"]);
        assert_eq!(t.record(CellCode::parse("B1-01").unwrap()), None);
        assert_eq!(t.assumed_zone().as_deref(), Some("A"));

        scan(&mut t, &["B1-02", "B1-03"]);
        assert_eq!(t.assumed_zone().as_deref(), Some("B"));
    }

    #[test]
    fn history_is_bounded() {
        let mut t = tracker();
        for slot in 1..=15 {
            t.record(CellCode::parse(&format!("C1-{:02}", slot)).unwrap());
        }
        assert_eq!(t.history().count(), 10);
        assert_eq!(t.history().next().unwrap().as_str(), "C1-06");
    }

    #[test]
    fn ranking_prefers_open_lines_then_current_cell_then_proximity() {
        let mut t = tracker();
        scan(&mut t, &["A1-05"]);
        let lines = vec![
            line("far", Some("B1-01"), false),
            line("done", Some("A1-05"), true),
            line("near", Some("A1-07"), false),
            line("here", Some("A1-05"), false),
            line("loose", None, false),
        ];
        let ids: Vec<&str> = t.rank(&lines, false).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["here", "near", "far", "loose", "done"]);
    }

    #[test]
    fn locked_zone_filters_other_zones_but_keeps_unassigned() {
        let mut t = tracker();
        t.lock_zone("a");
        let lines = vec![
            line("a", Some("A1-01"), false),
            line("b", Some("B1-01"), false),
            line("none", None, false),
        ];
        let ids: Vec<&str> = t.rank(&lines, true).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "none"]);
        assert_eq!(t.rank(&lines, false).len(), 3);

        t.unlock_zone();
        assert_eq!(t.rank(&lines, true).len(), 3);
    }
}
