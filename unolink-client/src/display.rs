//! Plain-text device tables
//!
//! One table is printed per refresh tick. The counters view shows packets per
//! kind for the last window; the telemetry view shows the latest decoded
//! readings.

use std::fmt::Write;

use clap::ValueEnum;
use unolink_engine::{DeviceRecord, RegistrySnapshot};
use unolink_protocol::PacketKind;

/// Which table(s) to print
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewMode {
    Counters,
    Telemetry,
    /// Switch between the two on every tick
    Alternate,
}

/// A single table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Counters,
    Telemetry,
}

const COUNTER_COLUMNS: [PacketKind; 6] = [
    PacketKind::Instantaneous,
    PacketKind::Cumulative,
    PacketKind::Position,
    PacketKind::OtherData1,
    PacketKind::OtherData2,
    PacketKind::OtherData3,
];

/// Renders snapshots according to a [`ViewMode`]
#[derive(Debug)]
pub struct Display {
    mode: ViewMode,
    ticks: u64,
}

impl Display {
    pub fn new(mode: ViewMode) -> Self {
        Self { mode, ticks: 0 }
    }

    /// View to use for the next snapshot
    pub fn next_view(&mut self) -> View {
        let view = match self.mode {
            ViewMode::Counters => View::Counters,
            ViewMode::Telemetry => View::Telemetry,
            ViewMode::Alternate if self.ticks % 2 == 0 => View::Counters,
            ViewMode::Alternate => View::Telemetry,
        };
        self.ticks += 1;
        view
    }

    /// Render the next table
    pub fn render(&mut self, snapshot: &RegistrySnapshot) -> String {
        let view = self.next_view();
        render_view(view, snapshot)
    }
}

/// Render one snapshot in the given layout
pub fn render_view(view: View, snapshot: &RegistrySnapshot) -> String {
    let (header, rows): (Vec<&str>, Vec<Vec<String>>) = match view {
        View::Counters => {
            let mut header = vec!["Live", "ID", "Slot"];
            header.extend(COUNTER_COLUMNS.iter().map(|k| k.short_name()));
            header.push("TOT");
            (header, snapshot.devices.iter().map(counter_row).collect())
        }
        View::Telemetry => (
            vec![
                "Live", "ID", "Slot", "SoC", "Time", "Speed", "HRM", "Power", "VO2", "Energy",
                "Dist", "EqDist",
            ],
            snapshot.devices.iter().map(telemetry_row).collect(),
        ),
    };

    let mut out = format_table(&header, &rows);
    if view == View::Counters {
        let _ = writeln!(
            out,
            "{} devices, window {:.3}s",
            snapshot.devices.len(),
            snapshot.counter_window.as_secs_f64()
        );
    }
    out
}

fn live_cell(record: &DeviceRecord) -> String {
    if record.live_on { "[x]" } else { "[ ]" }.to_string()
}

fn counter_row(record: &DeviceRecord) -> Vec<String> {
    let mut row = vec![
        live_cell(record),
        record.address.to_hex(),
        record.slot.to_string(),
    ];
    row.extend(
        COUNTER_COLUMNS
            .iter()
            .map(|kind| record.counter.get(*kind).to_string()),
    );
    row.push(record.counter.total().to_string());
    row
}

fn telemetry_row(record: &DeviceRecord) -> Vec<String> {
    let soc = record
        .battery_percent()
        .map_or_else(|| "--".to_string(), |pct| pct.to_string());

    vec![
        live_cell(record),
        record.address.to_hex(),
        record.slot.to_string(),
        soc,
        record.time.to_string(),
        format!("{:.3}", record.speed),
        record.hrm.to_string(),
        format!("{:.3}", record.power),
        format!("{:.3}", record.vo2),
        format!("{:.3}", record.energy),
        format!("{:.3}", record.distance),
        format!("{:.3}", record.equiv_distance),
    ]
}

/// Left-aligned columns, two spaces apart
fn format_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    for row in std::iter::once(&header).chain(rows) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use unolink_engine::RegistryStats;
    use unolink_protocol::RadioAddress;

    fn snapshot() -> RegistrySnapshot {
        let mut live = DeviceRecord::new(RadioAddress::new([0x30, 0x20, 0xAB]));
        live.live_on = true;
        live.slot = 3;
        live.battery = 87;
        live.speed = 1.5;
        live.hrm = 140;
        for _ in 0..4 {
            live.counter.record(PacketKind::Instantaneous);
        }
        live.counter.record(PacketKind::Position);

        let idle = DeviceRecord::new(RadioAddress::new([1, 2, 3]));

        RegistrySnapshot {
            devices: vec![live, idle],
            counter_window: Duration::from_millis(1000),
            stats: RegistryStats::default(),
        }
    }

    #[test]
    fn test_counters_view() {
        let out = render_view(View::Counters, &snapshot());
        let lines: Vec<&str> = out.lines().collect();

        let header: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(
            header,
            vec!["Live", "ID", "Slot", "IN", "CU", "PO", "O1", "O2", "O3", "TOT"]
        );

        assert!(lines[1].starts_with("[x]"));
        assert!(lines[1].contains("3020AB"));
        let cells: Vec<&str> = lines[1][3..].split_whitespace().collect();
        assert_eq!(cells, vec!["3020AB", "3", "4", "0", "1", "0", "0", "0", "5"]);

        assert!(lines[2].starts_with("[ ]"));
        assert!(lines[3].starts_with("2 devices"));
    }

    #[test]
    fn test_telemetry_view_formats_floats_and_unknown_battery() {
        let out = render_view(View::Telemetry, &snapshot());
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].contains("SoC"));
        assert!(lines[0].ends_with("EqDist"));

        let live: Vec<&str> = lines[1][3..].split_whitespace().collect();
        assert_eq!(live[..6], ["3020AB", "3", "87", "0", "1.500", "140"]);

        let idle: Vec<&str> = lines[2][3..].split_whitespace().collect();
        assert_eq!(idle[2], "--");
        assert_eq!(idle[4], "0.000");
    }

    #[test]
    fn test_alternate_mode_switches_each_tick() {
        let mut display = Display::new(ViewMode::Alternate);
        let views: Vec<View> = (0..4).map(|_| display.next_view()).collect();
        assert_eq!(
            views,
            vec![View::Counters, View::Telemetry, View::Counters, View::Telemetry]
        );

        let mut display = Display::new(ViewMode::Telemetry);
        assert_eq!(display.next_view(), View::Telemetry);
        assert_eq!(display.next_view(), View::Telemetry);
    }

    #[test]
    fn test_empty_snapshot_prints_header_only() {
        let empty = RegistrySnapshot {
            devices: Vec::new(),
            counter_window: Duration::ZERO,
            stats: RegistryStats::default(),
        };
        let out = render_view(View::Telemetry, &empty);
        assert_eq!(out.lines().count(), 1);
    }
}
