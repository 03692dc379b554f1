use crate::convert::sam_to_bam;
use crate::writer::WriterOptions;
use bam_codec::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::time::{Duration, Instant};

const CHART_WIDTH: usize = 60;
// Two-sided 95% quantile of the normal distribution.
const Z_95: f64 = 1.96;

/// Parameters of a thread-count sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Worker counts tried in every round, in this order.
    pub threads: Vec<usize>,
    pub rounds: usize,
    /// Block size and compression level; `thread_num` is overridden per trial.
    pub writer: WriterOptions,
    pub progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            threads: (1..=16).collect(),
            rounds: 10,
            writer: WriterOptions::default(),
            progress: true,
        }
    }
}

impl BenchmarkConfig {
    /// Loads a config from JSON; missing keys take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file(path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::file(path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    fn trials(&self) -> usize {
        self.rounds * self.threads.len()
    }
}

/// One timed trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub threads: usize,
    pub round: usize,
    #[serde(rename = "time (seconds)")]
    pub elapsed_secs: f64,
}

/// Aggregate of all samples taken with one worker count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub threads: usize,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    pub max: f64,
    /// 95% confidence band of the mean.
    pub ci_low: f64,
    pub ci_high: f64,
}

impl ThreadSummary {
    fn from_times(threads: usize, times: &[f64]) -> Self {
        let n = times.len();
        let mean = times.iter().sum::<f64>() / n as f64;
        let sd = if n > 1 {
            (times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let half_width = Z_95 * sd / (n as f64).sqrt();
        ThreadSummary {
            threads,
            n,
            mean,
            sd,
            min: times.iter().copied().fold(f64::INFINITY, f64::min),
            max: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ci_low: mean - half_width,
            ci_high: mean + half_width,
        }
    }
}

/// Long-form table of samples: one row per (threads, round).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTable {
    samples: Vec<Sample>,
}

#[derive(Serialize)]
struct Report<'a> {
    samples: &'a [Sample],
    summary: Vec<ThreadSummary>,
}

impl TimingTable {
    pub fn new() -> Self {
        TimingTable::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-thread-count statistics, ordered by thread count.
    pub fn summarize(&self) -> Vec<ThreadSummary> {
        self.samples
            .iter()
            .map(|s| (s.threads, s.elapsed_secs))
            .into_group_map()
            .into_iter()
            .sorted_by_key(|(threads, _)| *threads)
            .map(|(threads, times)| ThreadSummary::from_times(threads, &times))
            .collect()
    }

    pub fn write_tsv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "threads\tround\ttime (seconds)")?;
        for sample in &self.samples {
            writeln!(out, "{}\t{}\t{}", sample.threads, sample.round, sample.elapsed_secs)?;
        }
        Ok(())
    }

    /// Samples and summary as one JSON document.
    pub fn write_json<W: Write>(&self, out: W) -> io::Result<()> {
        let report = Report { samples: &self.samples, summary: self.summarize() };
        serde_json::to_writer_pretty(out, &report).map_err(io::Error::from)
    }

    /// Text chart of mean time per thread count. `*` marks the mean, `-` the
    /// 95% band around it.
    pub fn render_chart(&self) -> String {
        let summary = self.summarize();
        if summary.is_empty() {
            return String::from("(no samples)\n");
        }
        let lo = summary.iter().map(|s| s.ci_low.min(s.min)).fold(f64::INFINITY, f64::min).max(0.0);
        let hi = summary.iter().map(|s| s.ci_high.max(s.max)).fold(f64::NEG_INFINITY, f64::max);
        let span = if hi > lo { hi - lo } else { 1.0 };
        let column = |v: f64| (((v - lo) / span) * (CHART_WIDTH - 1) as f64).round().clamp(0.0, (CHART_WIDTH - 1) as f64) as usize;

        let mut chart = format!("time (seconds) {:.3} .. {:.3}\n", lo, hi);
        for s in &summary {
            let mut row = vec![b' '; CHART_WIDTH];
            for cell in &mut row[column(s.ci_low)..=column(s.ci_high)] {
                *cell = b'-';
            }
            row[column(s.mean)] = b'*';
            let row = String::from_utf8_lossy(&row).trim_end().to_string();
            chart.push_str(&format!("{:>3} |{:<width$}| {:.3}\n", s.threads, row, s.mean, width = CHART_WIDTH));
        }
        chart.push_str("threads\n");
        chart
    }
}

fn progress_bar(config: &BenchmarkConfig) -> ProgressBar {
    if !config.progress {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(config.trials() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Runs `trial` for every round and, within a round, for every thread count.
/// Stops at the first failing trial.
pub fn run_sweep<F>(config: &BenchmarkConfig, mut trial: F) -> Result<TimingTable>
where
    F: FnMut(usize) -> Result<Duration>,
{
    let pb = progress_bar(config);
    let mut table = TimingTable::new();
    for round in 0..config.rounds {
        for &threads in &config.threads {
            pb.set_message(format!("round {} threads {}", round, threads));
            let elapsed = trial(threads)?.as_secs_f64();
            info!("round {} threads {}: {:.3}s", round, threads, elapsed);
            table.push(Sample { threads, round, elapsed_secs: elapsed });
            pb.inc(1);
        }
    }
    pb.finish_and_clear();
    Ok(table)
}

/// Times SAM to BAM conversion of `input`. Every trial overwrites `output`.
pub fn benchmark_sam_to_bam<P, Q>(input: P, output: Q, config: &BenchmarkConfig) -> Result<TimingTable>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (input, output) = (input.as_ref(), output.as_ref());
    info!(
        "benchmarking {} -> {}: {} rounds over {:?} threads",
        input.display(),
        output.display(),
        config.rounds,
        config.threads
    );
    run_sweep(config, |threads| {
        let options = WriterOptions { thread_num: threads, ..config.writer.clone() };
        let start = Instant::now();
        sam_to_bam(input, output, &options)?;
        Ok(start.elapsed())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(samples: &[(usize, usize, f64)]) -> TimingTable {
        let mut table = TimingTable::new();
        for &(threads, round, elapsed_secs) in samples {
            table.push(Sample { threads, round, elapsed_secs });
        }
        table
    }

    #[test]
    fn test_sweep_order_is_rounds_then_threads() {
        let config = BenchmarkConfig { threads: vec![1, 2, 4], rounds: 2, progress: false, ..Default::default() };
        let mut calls = Vec::new();
        let table = run_sweep(&config, |threads| {
            calls.push(threads);
            Ok(Duration::from_millis(threads as u64))
        })
        .unwrap();
        assert_eq!(calls, vec![1, 2, 4, 1, 2, 4]);
        let rounds: Vec<usize> = table.samples().iter().map(|s| s.round).collect();
        assert_eq!(rounds, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_sweep_stops_on_failure() {
        let config = BenchmarkConfig { threads: vec![1, 2], rounds: 3, progress: false, ..Default::default() };
        let mut calls = 0;
        let result = run_sweep(&config, |threads| {
            calls += 1;
            if threads == 2 {
                Err(Error::InvalidRecord("boom".to_string()))
            } else {
                Ok(Duration::from_secs(1))
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_summary_statistics() {
        let table = table(&[(2, 0, 1.0), (1, 0, 4.0), (2, 1, 3.0), (1, 1, 4.0)]);
        let summary = table.summarize();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].threads, 1);
        assert_eq!(summary[0].sd, 0.0);
        assert_eq!(summary[0].ci_low, 4.0);
        let two = &summary[1];
        assert_eq!((two.n, two.mean, two.min, two.max), (2, 2.0, 1.0, 3.0));
        assert!((two.sd - 2f64.sqrt()).abs() < 1e-12);
        assert!(two.ci_low < two.mean && two.mean < two.ci_high);
    }

    #[test]
    fn test_tsv_is_long_form() {
        let mut out = Vec::new();
        table(&[(1, 0, 0.5), (2, 0, 0.25)]).write_tsv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "threads\tround\ttime (seconds)\n1\t0\t0.5\n2\t0\t0.25\n"
        );
    }

    #[test]
    fn test_json_report() {
        let mut out = Vec::new();
        table(&[(1, 0, 0.5)]).write_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["samples"][0]["time (seconds)"], 0.5);
        assert_eq!(value["summary"][0]["mean"], 0.5);
    }

    #[test]
    fn test_chart_has_one_row_per_thread_count() {
        let chart = table(&[(1, 0, 2.0), (1, 1, 2.2), (8, 0, 0.5), (8, 1, 0.7)]).render_chart();
        let rows: Vec<&str> = chart.lines().filter(|l| l.contains('|')).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].trim_start().starts_with("1 |"));
        assert!(rows.iter().all(|r| r.contains('*')));
        assert_eq!(TimingTable::new().render_chart(), "(no samples)\n");
    }

    #[test]
    fn test_config_from_json_file() {
        let dir = tempdir::TempDir::new("bench").unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{"threads": [1, 4], "writer": {"compression_level": 1}}"#).unwrap();
        let config = BenchmarkConfig::from_json_file(&path).unwrap();
        assert_eq!(config.threads, vec![1, 4]);
        assert_eq!(config.rounds, 10);
        assert_eq!(config.writer.compression_level, 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(BenchmarkConfig::from_json_file(&path), Err(Error::File { .. })));
    }
}
