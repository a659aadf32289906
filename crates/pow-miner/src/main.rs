use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use pow_miner::argon2id::{Argon2Config, Argon2Hasher};
use pow_miner::hashrate::format_hashrate;
use pow_miner::target::{difficulty_to_target, parse_target, TARGET_SIZE};
use pow_miner::{MinerError, MiningEngine, MiningJob, Solution};
use serde::Serialize;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

/// Input hashed in benchmark mode when none is given.
const BENCHMARK_INPUT_LEN: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Algo {
    /// Argon2id with a per-thread scratch buffer
    Argon2,
    /// RandomX light mode (requires the `randomx` feature)
    Randomx,
}

#[derive(Parser)]
#[command(name = "pow-miner")]
#[command(about = "Multi-threaded proof-of-work nonce search")]
struct Args {
    /// Input buffer to mine, hex encoded
    #[arg(short, long, required_unless_present = "benchmark")]
    input: Option<String>,

    /// Byte offset of the 4-byte big-endian nonce inside the input
    #[arg(short = 'o', long, default_value_t = 0)]
    nonce_offset: usize,

    /// Target as 64 hex digits (big-endian)
    #[arg(short = 'T', long, conflicts_with = "difficulty")]
    target: Option<String>,

    /// Difficulty; the target becomes (2^256 - 1) / difficulty
    #[arg(short, long)]
    difficulty: Option<u64>,

    /// Number of mining threads
    #[arg(short, long, default_value_t = default_threads())]
    threads: u32,

    /// First nonce to try
    #[arg(long, default_value_t = 0)]
    start_nonce: u32,

    /// Seconds to wait for a solution
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Hash algorithm
    #[arg(long, value_enum, default_value_t = Algo::Argon2)]
    algo: Algo,

    /// Argon2 scratch memory per thread, in KiB
    #[arg(long, default_value_t = 2048)]
    memory_kib: u32,

    /// Argon2 passes over the scratch memory
    #[arg(long, default_value_t = 1)]
    iterations: u32,

    /// Argon2 salt (at least 8 bytes)
    #[arg(long)]
    salt: Option<String>,

    /// RandomX key, hex encoded
    #[arg(long, default_value = "")]
    randomx_key: String,

    /// Print the result as a single JSON line
    #[arg(long)]
    json: bool,

    /// Hash against an unreachable target for this many seconds and report the rate
    #[arg(long, value_name = "SECS")]
    benchmark: Option<u64>,
}

fn default_threads() -> u32 {
    std::cmp::max(1, num_cpus::get().saturating_sub(1)) as u32
}

#[derive(Serialize)]
struct Report {
    event: String,
    threads: u32,
    hashes: u64,
    hashrate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

impl Report {
    fn new(event: &str, engine: &MiningEngine, threads: u32) -> Self {
        Self {
            event: event.to_string(),
            threads,
            hashes: engine.hash_count(),
            hashrate: engine.hash_rate(),
            nonce: None,
            input: None,
            hash: None,
            status: None,
        }
    }

    fn with_solution(mut self, solution: &Solution) -> Self {
        self.nonce = Some(solution.nonce);
        self.input = Some(hex::encode(&solution.input));
        self.hash = Some(hex::encode(solution.hash));
        self
    }
}

fn send(report: &Report) {
    let mut stdout = io::stdout().lock();
    let _ = serde_json::to_writer(&mut stdout, report);
    let _ = stdout.write_all(b"\n");
    let _ = stdout.flush();
}

fn decode_hex(s: &str) -> Result<Vec<u8>, MinerError> {
    let s = s.trim();
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

fn resolve_target(args: &Args) -> Result<[u8; TARGET_SIZE], MinerError> {
    if let Some(hex_target) = &args.target {
        return parse_target(hex_target);
    }
    match args.difficulty {
        Some(d) => difficulty_to_target(d)
            .ok_or_else(|| MinerError::InvalidTarget("difficulty must be non-zero".into())),
        None => Err(MinerError::InvalidTarget(
            "either --target or --difficulty is required".into(),
        )),
    }
}

fn build_engine(args: &Args) -> Result<MiningEngine, MinerError> {
    match args.algo {
        Algo::Argon2 => {
            let mut config = Argon2Config {
                memory_kib: args.memory_kib,
                iterations: args.iterations,
                ..Default::default()
            };
            if let Some(salt) = &args.salt {
                config.salt = salt.as_bytes().to_vec();
            }
            // Reject bad parameters before any worker is spawned.
            Argon2Hasher::new(&config)?;
            Ok(MiningEngine::argon2(config))
        }
        Algo::Randomx => randomx_engine(&args.randomx_key),
    }
}

#[cfg(feature = "randomx")]
fn randomx_engine(key_hex: &str) -> Result<MiningEngine, MinerError> {
    use pow_miner::randomx::RandomXHasher;
    use pow_miner::HashAlgorithm;

    let key = decode_hex(key_hex)?;
    Ok(MiningEngine::new(move |_| {
        Ok(Box::new(RandomXHasher::new(&key)?) as Box<dyn HashAlgorithm>)
    }))
}

#[cfg(not(feature = "randomx"))]
fn randomx_engine(_key_hex: &str) -> Result<MiningEngine, MinerError> {
    Err(MinerError::Hasher(pow_miner::HasherError::Backend(
        "built without the `randomx` feature".into(),
    )))
}

/// Mine the given input. Returns whether a solution was found.
fn mine(args: &Args, engine: &MiningEngine) -> Result<bool, MinerError> {
    let input = decode_hex(args.input.as_deref().unwrap_or_default())?;
    let target = resolve_target(args)?;

    info!(
        "Mining {} bytes, target {}, {} thread(s), timeout {}s",
        input.len(),
        hex::encode(target),
        args.threads,
        args.timeout
    );

    let job = MiningJob::new(input, args.nonce_offset, target)
        .threads(args.threads)
        .start_nonce(args.start_nonce);
    engine.start(job)?;
    engine.wait_for_answer(Duration::from_secs(args.timeout));
    engine.cancel();

    let Some(solution) = engine.solution() else {
        warn!(
            "No solution ({}) after {} hashes at {}",
            engine.status(),
            engine.hash_count(),
            format_hashrate(engine.hash_rate())
        );
        if let Some(e) = engine.last_error() {
            warn!("Last worker error: {}", e);
        }
        if args.json {
            let mut report = Report::new("no_solution", engine, args.threads);
            report.status = Some(engine.status().to_string());
            send(&report);
        }
        return Ok(false);
    };

    if args.json {
        send(&Report::new("solution", engine, args.threads).with_solution(&solution));
    } else {
        println!("nonce:    {}", solution.nonce);
        println!("input:    {}", hex::encode(&solution.input));
        println!("hash:     {}", hex::encode(solution.hash));
        println!(
            "hashrate: {} ({} hashes)",
            format_hashrate(engine.hash_rate()),
            engine.hash_count()
        );
    }
    Ok(true)
}

fn benchmark(args: &Args, engine: &MiningEngine, seconds: u64) -> Result<bool, MinerError> {
    let input = match &args.input {
        Some(hex_input) => decode_hex(hex_input)?,
        None => vec![0u8; BENCHMARK_INPUT_LEN],
    };

    info!("Benchmarking {} thread(s) for {}s", args.threads, seconds);
    let job = MiningJob::new(input, args.nonce_offset, [0u8; TARGET_SIZE]).threads(args.threads);
    engine.start(job)?;
    engine.wait_for_answer(Duration::from_secs(seconds));
    engine.cancel();

    if let Some(e) = engine.last_error() {
        return Err(MinerError::Hasher(e));
    }

    let hr = engine.hash_rate();
    if args.json {
        send(&Report::new("benchmark", engine, args.threads));
    } else {
        println!("=== Benchmark Results ===");
        println!("Threads:  {}", args.threads);
        println!("Duration: {}s", seconds);
        println!("Hashes:   {}", engine.hash_count());
        println!(
            "Hashrate: {} ({:.1} H/s per thread)",
            format_hashrate(hr),
            hr / args.threads.max(1) as f64
        );
    }
    Ok(true)
}

fn run(args: &Args) -> Result<bool, MinerError> {
    let engine = build_engine(args)?;
    match args.benchmark {
        Some(seconds) => benchmark(args, &engine, seconds),
        None => mine(args, &engine),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
