//! The MTR report: assembly, JSON wire format, and the table rendering.
//!
//! Field names are part of the wire format and deliberately mixed-case:
//! per-hop statistics serialize as `Loss`/`Snt`/`Last`/`Avg`/`Best`/`Wrst`
//! while the outer document uses `ts`/`src`/`dst`/`count`/`hups`.

use crate::hops::HopTable;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Sentinel host for a TTL that never produced a responder.
pub const UNKNOWN_HOST: &str = "???";

/// Statistics for a single hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    /// The TTL that elicited this record.
    pub count: u8,
    /// Responder address, or [`UNKNOWN_HOST`] when the hop never answered.
    pub host: String,
    /// Loss rate as a fraction in `[0, 1]`.
    #[serde(rename = "Loss")]
    pub loss: f64,
    /// Raw lost-probe counter; not part of the wire format.
    #[serde(skip)]
    pub lost: u32,
    /// Probes attributed to this hop.
    #[serde(rename = "Snt")]
    pub sent: f64,
    /// Most recent successful RTT in milliseconds.
    #[serde(rename = "Last")]
    pub last: f64,
    /// Mean RTT in milliseconds.
    #[serde(rename = "Avg")]
    pub avg: f64,
    /// Minimum RTT in milliseconds.
    #[serde(rename = "Best")]
    pub best: f64,
    /// Maximum RTT in milliseconds.
    #[serde(rename = "Wrst")]
    pub wrst: f64,
}

impl Hop {
    /// Whether this hop never produced a responder.
    pub fn is_unknown(&self) -> bool {
        self.host == UNKNOWN_HOST
    }
}

/// The aggregate result of one measurement run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unix seconds, stamped after the discovery sweep completed.
    #[serde(rename = "ts")]
    pub time: i64,
    /// Source address the run probed from.
    pub src: String,
    /// Destination address as given by the caller.
    pub dst: String,
    /// Probes attributed to each hop.
    pub count: u32,
    /// Hop records ordered by TTL, without gaps.
    pub hups: Vec<Hop>,
}

impl Report {
    /// Serializes the report to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Writes the aligned table form.
    ///
    /// Unknown hops render as a bare `N:|-- ???` row with the statistics
    /// columns suppressed.
    pub fn write_pretty<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(
            w,
            "Time: {}\tSrc: {}\tDst: {}\tCount: {}",
            format_time(self.time),
            self.src,
            self.dst,
            self.count
        )?;
        writeln!(
            w,
            "{:>4}    {:<20} {:>5}%  {:>4}  {:>6}  {:>6}  {:>6}  {:>6}",
            "HOP:|", "Address", "Loss", "Snt", "Last", "Avg", "Best", "Wrst"
        )?;
        for hop in &self.hups {
            if hop.is_unknown() {
                writeln!(w, "{:>3}:|-- {}", hop.count, UNKNOWN_HOST)?;
            } else {
                writeln!(
                    w,
                    "{:>3}:|-- {:<20} {:>5.1}%  {:>4}  {:>6.1}  {:>6.1}  {:>6.1}  {:>6.1}",
                    hop.count,
                    hop.host,
                    hop.loss * 100.0,
                    hop.sent,
                    hop.last,
                    hop.avg,
                    hop.best,
                    hop.wrst
                )?;
            }
        }
        Ok(())
    }

    /// The table form as a string.
    pub fn pretty(&self) -> String {
        let mut buf = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_pretty(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn format_time(unix_seconds: i64) -> String {
    Local
        .timestamp_opt(unix_seconds, 0)
        .single()
        .map_or_else(
            || unix_seconds.to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S %z").to_string(),
        )
}

/// Copies the hop table into the final report, restoring TTL order.
pub(crate) fn assemble(
    table: &HopTable,
    time: i64,
    src: &str,
    dst: &str,
    count: u32,
) -> Report {
    let hups = table
        .slots()
        .iter()
        .map(|slot| {
            let stats = slot.stats();
            Hop {
                count: slot.index,
                host: slot
                    .host()
                    .map_or_else(|| UNKNOWN_HOST.to_string(), |ip| ip.to_string()),
                loss: stats.loss,
                lost: stats.lost,
                sent: stats.sent,
                last: stats.last,
                avg: stats.avg,
                best: stats.best,
                wrst: stats.wrst,
            }
        })
        .collect();
    Report {
        time,
        src: src.to_string(),
        dst: dst.to_string(),
        count,
        hups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            time: 1700000000,
            src: "0.0.0.0".to_string(),
            dst: "1.2.3.4".to_string(),
            count: 10,
            hups: vec![
                Hop {
                    count: 1,
                    host: "10.0.0.1".to_string(),
                    loss: 0.0,
                    lost: 0,
                    sent: 10.0,
                    last: 2.1,
                    avg: 2.4,
                    best: 1.9,
                    wrst: 3.0,
                },
                Hop {
                    count: 2,
                    host: UNKNOWN_HOST.to_string(),
                    loss: 1.0,
                    lost: 5,
                    sent: 10.0,
                    last: 0.0,
                    avg: 0.0,
                    best: 0.0,
                    wrst: 0.0,
                },
            ],
        }
    }

    #[test]
    fn json_uses_the_wire_field_names() {
        let json = sample_report().to_json().unwrap();
        assert!(json.contains("\"ts\":1700000000"));
        assert!(json.contains("\"src\":\"0.0.0.0\""));
        assert!(json.contains("\"dst\":\"1.2.3.4\""));
        assert!(json.contains("\"hups\":["));
        assert!(json.contains("\"count\":1"));
        assert!(json.contains("\"host\":\"10.0.0.1\""));
        assert!(json.contains("\"Loss\":"));
        assert!(json.contains("\"Snt\":"));
        assert!(json.contains("\"Last\":"));
        assert!(json.contains("\"Avg\":"));
        assert!(json.contains("\"Best\":"));
        assert!(json.contains("\"Wrst\":"));
        // The raw lost counter never appears on the wire.
        assert!(!json.contains("lost"));
        assert!(!json.contains("LossPoint"));
    }

    #[test]
    fn json_round_trips() {
        let report = sample_report();
        let json = report.to_json().unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to_json().unwrap(), json);
        assert_eq!(parsed.hups.len(), 2);
        assert_eq!(parsed.hups[1].host, UNKNOWN_HOST);
        // `lost` is not serialized and comes back as the default.
        assert_eq!(parsed.hups[1].lost, 0);
    }

    #[test]
    fn pretty_suppresses_stats_for_unknown_hops() {
        let text = sample_report().pretty();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Time: "));
        assert!(lines[0].ends_with("Count: 10"));
        assert!(lines[1].contains("Address"));
        assert!(lines[1].contains("Wrst"));
        assert!(lines[2].contains("10.0.0.1"));
        assert!(lines[2].contains("0.0%"));
        assert_eq!(lines[3].trim(), "2:|-- ???");
    }

    #[test]
    fn pretty_is_deterministic() {
        let report = sample_report();
        assert_eq!(report.pretty(), report.pretty());
    }
}
