use bam_codec::{Error, Result};
use env_logger::Env;
use log::{error, info};
use parabam_tools::bench::benchmark_sam_to_bam;
use parabam_tools::convert::{bam_to_sam, sam_to_bam, sort_bam};
use parabam_tools::{run_pipeline, verify_bams, BenchmarkConfig, Verification, WriterOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "parabam", about = "Parallel SAM to BAM transcoder and benchmark")]
enum Cli {
    /// Convert a SAM file to BAM.
    Convert {
        #[structopt(parse(from_os_str))]
        in_path: PathBuf,
        #[structopt(short, parse(from_os_str))]
        out_path: PathBuf,
        #[structopt(flatten)]
        writer: WriterArgs,
    },
    /// Print a BAM file as SAM.
    View {
        #[structopt(parse(from_os_str))]
        in_path: PathBuf,
        #[structopt(short, parse(from_os_str))]
        out_path: PathBuf,
        /// Omit the header lines.
        #[structopt(long)]
        no_header: bool,
        #[structopt(long, default_value = "1")]
        thread_num: usize,
    },
    /// Sort a BAM file by coordinate.
    Sort {
        #[structopt(parse(from_os_str))]
        in_path: PathBuf,
        #[structopt(short, parse(from_os_str))]
        out_path: PathBuf,
        #[structopt(flatten)]
        writer: WriterArgs,
    },
    /// Time SAM to BAM conversion over a range of thread counts.
    Bench {
        #[structopt(parse(from_os_str))]
        in_path: PathBuf,
        /// Overwritten by every trial.
        #[structopt(short, parse(from_os_str))]
        out_path: PathBuf,
        /// Where to write the samples as TSV.
        #[structopt(long, parse(from_os_str))]
        tsv: Option<PathBuf>,
        #[structopt(flatten)]
        sweep: SweepArgs,
    },
    /// Check that two BAM files hold the same records.
    Verify {
        #[structopt(parse(from_os_str))]
        reference: PathBuf,
        #[structopt(parse(from_os_str))]
        candidate: PathBuf,
        #[structopt(long, default_value = "1")]
        thread_num: usize,
    },
    /// Benchmark, convert sequentially, and verify the results.
    Pipeline {
        #[structopt(parse(from_os_str))]
        in_path: PathBuf,
        #[structopt(flatten)]
        sweep: SweepArgs,
    },
}

#[derive(StructOpt)]
struct WriterArgs {
    #[structopt(long, default_value = "1")]
    thread_num: usize,
    /// Deflate level, 0-9.
    #[structopt(long)]
    level: Option<u32>,
    /// Uncompressed bytes per block.
    #[structopt(long)]
    block_size: Option<usize>,
}

impl WriterArgs {
    fn options(&self) -> WriterOptions {
        let mut options = WriterOptions::with_threads(self.thread_num);
        if let Some(level) = self.level {
            options.compression_level = level;
        }
        if let Some(block_size) = self.block_size {
            options.block_size = block_size;
        }
        options
    }
}

#[derive(StructOpt)]
struct SweepArgs {
    /// JSON benchmark config; flags below override it.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    /// Thread counts to try, e.g. `--threads 1 2 4 8`.
    #[structopt(long)]
    threads: Option<Vec<usize>>,
    #[structopt(long)]
    rounds: Option<usize>,
    #[structopt(long)]
    level: Option<u32>,
    #[structopt(long)]
    no_progress: bool,
}

impl SweepArgs {
    fn config(&self) -> Result<BenchmarkConfig> {
        let mut config = match &self.config {
            Some(path) => BenchmarkConfig::from_json_file(path)?,
            None => BenchmarkConfig::default(),
        };
        if let Some(threads) = &self.threads {
            config.threads = threads.clone();
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(level) = self.level {
            config.writer.compression_level = level;
        }
        if self.no_progress {
            config.progress = false;
        }
        Ok(config)
    }
}

fn report(verification: &Verification) -> i32 {
    if verification.matches {
        println!("identical: {}", verification.reference_digest);
        0
    } else {
        println!(
            "DIFFERENT: {} {} / {} {}",
            verification.reference.display(),
            verification.reference_digest,
            verification.candidate.display(),
            verification.candidate_digest
        );
        2
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli {
        Cli::Convert { in_path, out_path, writer } => {
            sam_to_bam(&in_path, &out_path, &writer.options())?;
        }
        Cli::View { in_path, out_path, no_header, thread_num } => {
            bam_to_sam(&in_path, &out_path, !no_header, thread_num)?;
        }
        Cli::Sort { in_path, out_path, writer } => {
            let count = sort_bam(&in_path, &out_path, &writer.options())?;
            info!("sorted {} records into {}", count, out_path.display());
        }
        Cli::Bench { in_path, out_path, tsv, sweep } => {
            let timings = benchmark_sam_to_bam(&in_path, &out_path, &sweep.config()?)?;
            if let Some(path) = tsv {
                let file = File::create(&path).map_err(|e| Error::file(&path, e))?;
                let mut out = BufWriter::new(file);
                timings
                    .write_tsv(&mut out)
                    .and_then(|_| out.flush())
                    .map_err(|e| Error::file(&path, e))?;
            }
            print!("{}", timings.render_chart());
        }
        Cli::Verify { reference, candidate, thread_num } => {
            return Ok(report(&verify_bams(&reference, &candidate, thread_num)?));
        }
        Cli::Pipeline { in_path, sweep } => {
            let pipeline = run_pipeline(&in_path, &sweep.config()?)?;
            print!("{}", pipeline.timings.render_chart());
            info!(
                "timings written to {} and {}",
                pipeline.paths.timings_tsv.display(),
                pipeline.paths.timings_json.display()
            );
            return Ok(report(&pipeline.verification));
        }
    }
    Ok(0)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let code = match run(Cli::from_args()) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            1
        }
    };
    process::exit(code);
}
