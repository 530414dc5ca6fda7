//! Run statistics read from Robot Framework `output.xml`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta};
use kernel::{RunStats, Verdict};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

const ALL_TESTS: &str = "All Tests";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const LEGACY_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";

pub fn read_stats(path: &Path) -> Result<RunStats> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    parse_stats(BufReader::new(file)).map_err(|e| match e {
        Error::Decode(message) => Error::Decode(format!("{}: {message}", path.display())),
        other => other,
    })
}

fn decode(e: quick_xml::Error) -> Error {
    Error::Decode(e.to_string())
}

#[derive(Default)]
struct Counts {
    pass: u32,
    fail: u32,
    skip: u32,
}

#[derive(Default)]
struct SuiteTimes {
    start: Option<String>,
    elapsed: Option<String>,
    legacy_start: Option<String>,
    legacy_end: Option<String>,
}

/// Parses statistics and suite timing.
///
/// The last `status` element in the document belongs to the top level
/// suite, its timing becomes the run timing. Totals that do not fit a
/// `u32` are a decode error.
pub fn parse_stats<R: BufRead>(source: R) -> Result<RunStats> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_statistics = false;
    let mut in_total = false;
    let mut pending: Option<Counts> = None;
    let mut totals = Counts::default();
    let mut times = SuiteTimes::default();

    loop {
        match reader.read_event_into(&mut buf).map_err(decode)? {
            Event::Start(e) => match e.name().as_ref() {
                b"statistics" => in_statistics = true,
                b"total" if in_statistics => in_total = true,
                b"stat" if in_total => pending = Some(counts(&e)?),
                b"status" => times = suite_times(&e)?,
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"status" {
                    times = suite_times(&e)?;
                }
            }
            Event::Text(t) => {
                if pending.is_some() && t.unescape().map_err(decode)?.trim() == ALL_TESTS {
                    if let Some(c) = pending.take() {
                        totals = c;
                    }
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"statistics" => in_statistics = false,
                b"total" => in_total = false,
                b"stat" => pending = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let total = totals
        .pass
        .checked_add(totals.fail)
        .and_then(|n| n.checked_add(totals.skip))
        .ok_or_else(|| Error::Decode("test totals out of range".to_owned()))?;
    let (start_time, end_time) = times.resolve();
    Ok(RunStats {
        total_tests: Some(total),
        passed: Some(totals.pass),
        failed: Some(totals.fail),
        skipped: Some(totals.skip),
        verdict: Some(if totals.fail == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail
        }),
        start_time,
        end_time,
    })
}

fn counts(e: &BytesStart) -> Result<Counts> {
    let mut c = Counts::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| decode(e.into()))?;
        let value = attr.unescape_value().map_err(decode)?;
        let n = value.trim().parse().unwrap_or(0);
        match attr.key.as_ref() {
            b"pass" => c.pass = n,
            b"fail" => c.fail = n,
            b"skip" => c.skip = n,
            _ => {}
        }
    }
    Ok(c)
}

fn suite_times(e: &BytesStart) -> Result<SuiteTimes> {
    let mut t = SuiteTimes::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| decode(e.into()))?;
        let value = attr.unescape_value().map_err(decode)?.into_owned();
        match attr.key.as_ref() {
            b"start" => t.start = Some(value),
            b"elapsed" => t.elapsed = Some(value),
            b"starttime" => t.legacy_start = Some(value),
            b"endtime" => t.legacy_end = Some(value),
            _ => {}
        }
    }
    Ok(t)
}

impl SuiteTimes {
    fn resolve(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        if let Some(start) = self.start.as_deref().and_then(parse_iso) {
            let elapsed = self
                .elapsed
                .as_deref()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            return (Some(start), end_of(start, elapsed));
        }
        let legacy = |s: &Option<String>| {
            s.as_deref()
                .and_then(|v| NaiveDateTime::parse_from_str(v.trim(), LEGACY_FORMAT).ok())
        };
        (legacy(&self.legacy_start), legacy(&self.legacy_end))
    }
}

// `None` when `elapsed` is not a finite number of seconds or the end falls
// outside the representable range
fn end_of(start: NaiveDateTime, elapsed: f64) -> Option<NaiveDateTime> {
    let micros = (elapsed * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let delta = TimeDelta::microseconds(micros as i64);
    start.checked_add_signed(delta)
}

fn parse_iso(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, ISO_FORMAT).ok()
}
