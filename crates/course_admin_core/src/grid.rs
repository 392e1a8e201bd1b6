//! crates/course_admin_core/src/grid.rs
//!
//! Station/Time-Slot Grid Generator for assessment, scenario-practice and
//! practical-session subjects. Pure display logic: the grid never gates the
//! per-station faculty or room assignments stored alongside it.

use serde::Serialize;

use crate::domain::Group;

/// One cell of the stations x time-slots matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    /// 1-based station number.
    pub station: u32,
    /// 1-based time slot number.
    pub time_slot: u32,
    pub group: Group,
}

/// A full rotation grid. When stations, time slots and groups all count
/// four, every group visits every station exactly once; other shapes get a
/// best-effort cyclic rotation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationGrid {
    pub number_of_stations: u32,
    pub number_of_time_slots: u32,
    pub cells: Vec<GridCell>,
}

impl StationGrid {
    pub fn group_at(&self, station: u32, time_slot: u32) -> Option<Group> {
        self.cells
            .iter()
            .find(|c| c.station == station && c.time_slot == time_slot)
            .map(|c| c.group)
    }
}

/// Assigns a group to every (station, time slot) cell by modular rotation.
pub fn generate_station_grid(number_of_stations: u32, number_of_time_slots: u32) -> StationGrid {
    let group_count = Group::ALL.len();
    let mut cells = Vec::with_capacity(number_of_stations as usize * number_of_time_slots as usize);
    for station in 0..number_of_stations {
        for time_slot in 0..number_of_time_slots {
            cells.push(GridCell {
                station: station + 1,
                time_slot: time_slot + 1,
                group: Group::ALL[(station + time_slot) as usize % group_count],
            });
        }
    }
    StationGrid {
        number_of_stations,
        number_of_time_slots,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_by_four_grid_is_a_latin_square() {
        let grid = generate_station_grid(4, 4);
        for station in 1..=4 {
            let mut row: Vec<Group> = (1..=4)
                .map(|slot| grid.group_at(station, slot).unwrap())
                .collect();
            row.sort();
            assert_eq!(row, Group::ALL.to_vec());
        }
        for slot in 1..=4 {
            let mut column: Vec<Group> = (1..=4)
                .map(|station| grid.group_at(station, slot).unwrap())
                .collect();
            column.sort();
            assert_eq!(column, Group::ALL.to_vec());
        }
    }

    #[test]
    fn grid_cycles_groups_diagonally() {
        let grid = generate_station_grid(2, 3);
        assert_eq!(grid.group_at(1, 1), Some(Group::A));
        assert_eq!(grid.group_at(1, 2), Some(Group::B));
        assert_eq!(grid.group_at(2, 1), Some(Group::B));
        assert_eq!(grid.group_at(2, 3), Some(Group::D));
        assert_eq!(grid.cells.len(), 6);
    }

    #[test]
    fn oversized_grid_wraps_around_the_four_groups() {
        let grid = generate_station_grid(5, 1);
        assert_eq!(grid.group_at(5, 1), Some(Group::A));
    }
}
